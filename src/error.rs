use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ChartError {
    #[error("invalid chart type: {0}")]
    InvalidChartType(String),

    #[error("invalid zoom range: {0}")]
    InvalidZoom(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("chart site request failed: {0}")]
    Http(String),

    #[error("chart site returned status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("failed to parse chart page: {0}")]
    Html(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("raster conversion failed: {0}")]
    Conversion(String),

    #[error("object store request failed: {0}")]
    ObjectStoreHttp(String),

    #[error("object store returned status {status} for {key}")]
    ObjectStoreStatus { status: u16, key: String },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("chart not found: {0}")]
    ChartNotFound(String),

    #[error("no metadata backup at {0}")]
    MissingBackup(PathBuf),

    #[error("no PNG tile found in {0}")]
    NoSampleTile(PathBuf),
}
