use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The persisted form of the rendered map, stored under `valkey::MAP_CACHE`.
///
/// `image` is the encoded bitmap (base64 in JSON). A blob with no image is a
/// cleared cache: the version is kept, the bitmap has to be rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapCacheBlob {
    #[serde(default, with = "base64_image")]
    pub image: Option<Vec<u8>>,
    pub version: u64,
    pub last_update: DateTime<Utc>,
}

impl MapCacheBlob {
    pub fn cleared(version: u64) -> Self {
        Self {
            image: None,
            version,
            last_update: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }
}

mod base64_image {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(image: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match image {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
