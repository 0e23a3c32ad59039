use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::CACHE_CONTROL;
use serde::Serialize;

use crate::error::ChartError;
use crate::fs_util;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub cache_control: Option<String>,
}

/// Read-only view of the bucket the tiles are published to.
pub trait ObjectStore: Send + Sync {
    /// `None` when the object does not exist.
    fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, ChartError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "cache_control", rename_all = "snake_case")]
pub enum CacheControlStatus {
    Correct,
    Incorrect(Option<String>),
    Missing,
}

impl CacheControlStatus {
    pub fn exit_code(&self) -> u8 {
        match self {
            CacheControlStatus::Correct => 0,
            CacheControlStatus::Incorrect(_) => 3,
            CacheControlStatus::Missing => 4,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheControlReport {
    pub bucket: String,
    pub key: String,
    pub status: CacheControlStatus,
}

/// Public-read bucket over plain HTTPS. `endpoint` may contain a `{bucket}`
/// placeholder (virtual-hosted style).
#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str) -> Result<Self, ChartError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ChartError::ObjectStoreHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        if self.endpoint.contains("{bucket}") {
            format!("{}/{key}", self.endpoint.replace("{bucket}", bucket))
        } else {
            format!("{}/{bucket}/{key}", self.endpoint)
        }
    }
}

impl ObjectStore for HttpObjectStore {
    fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, ChartError> {
        let response = self
            .client
            .head(self.object_url(bucket, key))
            .send()
            .map_err(|err| ChartError::ObjectStoreHttp(err.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ChartError::ObjectStoreStatus {
                status: response.status().as_u16(),
                key: key.to_string(),
            });
        }
        let cache_control = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        Ok(Some(ObjectHead { cache_control }))
    }
}

pub fn object_key(prefix: &str, tile_dir: &Path, tile: &Path) -> String {
    let prefix = prefix.trim_matches(|ch| ch == '"' || ch == '\'');
    let relative = fs_util::relative_key(tile_dir, tile);
    let mut key = format!("{prefix}/{relative}").replace('\\', "/");
    while key.contains("//") {
        key = key.replace("//", "/");
    }
    key.trim_start_matches('/').to_string()
}

pub fn check_cache_control(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    tile_dir: &Path,
    expected: &str,
) -> Result<CacheControlReport, ChartError> {
    let tile = fs_util::find_sample_tile(tile_dir)
        .ok_or_else(|| ChartError::NoSampleTile(tile_dir.to_path_buf()))?;
    let key = object_key(prefix, tile_dir, &tile);
    let status = match store.head_object(bucket, &key)? {
        None => CacheControlStatus::Missing,
        Some(head) if head.cache_control.as_deref() == Some(expected) => {
            CacheControlStatus::Correct
        }
        Some(head) => CacheControlStatus::Incorrect(head.cache_control),
    };
    Ok(CacheControlReport {
        bucket: bucket.to_string(),
        key,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_normalised() {
        let key = object_key(
            "\"charts/sectional/\"",
            Path::new("/tiles"),
            Path::new("/tiles/7/20/44.png"),
        );
        assert_eq!(key, "charts/sectional/7/20/44.png");
    }

    #[test]
    fn endpoint_styles() {
        let hosted = HttpObjectStore::new("https://{bucket}.s3.amazonaws.com/").unwrap();
        assert_eq!(
            hosted.object_url("tiles", "a/b.png"),
            "https://tiles.s3.amazonaws.com/a/b.png"
        );
        let path_style = HttpObjectStore::new("http://localhost:9000").unwrap();
        assert_eq!(
            path_style.object_url("tiles", "a/b.png"),
            "http://localhost:9000/tiles/a/b.png"
        );
    }
}
