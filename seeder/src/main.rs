mod populate;

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::{MapCacheBlob, PixelStore, Torus, ValkeyStore};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Parser)]
#[command(about = "Offline tooling for the canvas pixel store")]
struct Cli {
    #[arg(long, env = "VALKEY_URL", default_value = "redis://127.0.0.1:6379")]
    valkey_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the sea and land cells of a reference image into the store.
    Populate {
        image: PathBuf,

        #[arg(long, env = "MAP_WIDTH", default_value_t = 1024)]
        width: i32,

        #[arg(long, env = "MAP_HEIGHT", default_value_t = 512)]
        height: i32,

        /// Leave cells that already have a color untouched.
        #[arg(long)]
        skip_existing: bool,

        #[arg(long, default_value_t = 1000)]
        batch_size: usize,

        /// Also clear the persisted map cache when done.
        #[arg(long)]
        clear_cache: bool,
    },
    /// Drop the rendered map so the server rebuilds it on next start.
    ClearCache {
        #[arg(long, default_value_t = 1)]
        version: u64,
    },
}

async fn clear_cache(store: &ValkeyStore, version: u64) -> anyhow::Result<()> {
    let blob = MapCacheBlob::cleared(version).to_json()?;
    store
        .save_map_cache(blob)
        .await
        .context("write cleared map cache")?;
    tracing::info!("Cleared map cache (version {})", version);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("seeder=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let store = ValkeyStore::connect(&cli.valkey_url)
        .await
        .with_context(|| format!("connect to {}", cli.valkey_url))?;

    match cli.command {
        Command::Populate {
            image,
            width,
            height,
            skip_existing,
            batch_size,
            clear_cache: clear,
        } => {
            anyhow::ensure!(width > 0 && height > 0, "map extent must be positive");
            let reference = populate::read_reference(&image)?;
            let (cells, ignored) = populate::seed_cells(&reference, Torus::new(width, height))?;
            tracing::info!(
                "Seeding {} cells from '{}' ({} pixels of other colors ignored)",
                cells.len(),
                image.display(),
                ignored
            );

            // First signal finishes the current batch, a second one exits immediately.
            let stop = Arc::new(AtomicBool::new(false));
            for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
                signal_hook::flag::register_conditional_shutdown(signal, 1, stop.clone())?;
                signal_hook::flag::register(signal, stop.clone())?;
            }

            let stats = populate::populate(&store, cells, batch_size, skip_existing, &stop).await?;
            if stats.interrupted {
                tracing::warn!("Seeding interrupted after {} cells", stats.written);
                return Ok(());
            }
            tracing::info!(
                "Seeding done: {} written, {} already present",
                stats.written,
                stats.skipped_existing
            );

            if clear {
                clear_cache(&store, 1).await?;
            }
        }
        Command::ClearCache { version } => clear_cache(&store, version).await?,
    }

    Ok(())
}
