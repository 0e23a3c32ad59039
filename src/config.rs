use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::discovery::IfrRules;
use crate::domain::{ChartType, ZoomRange};
use crate::error::ChartError;

pub const DEFAULT_CONFIG_FILE: &str = "aeronav-tiles.json";
pub const VFR_CHARTS_URL: &str =
    "https://www.faa.gov/air_traffic/flight_info/aeronav/digital_products/vfr/";
pub const IFR_CHARTS_URL: &str =
    "https://www.faa.gov/air_traffic/flight_info/aeronav/digital_products/ifr/";
pub const EXPECTED_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
pub const DEFAULT_OBJECT_ENDPOINT: &str = "https://{bucket}.s3.amazonaws.com";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub vfr_url: Option<String>,
    pub ifr_url: Option<String>,
    pub vfr_tabs: Option<Vec<String>>,
    pub ifr_low_prefixes: Option<Vec<String>>,
    pub ifr_high_prefixes: Option<Vec<String>>,
    pub ifr_skip_prefixes: Option<Vec<String>>,
    pub download_dir: Option<String>,
    pub metadata_path: Option<String>,
    pub zoom: Option<String>,
    pub workers: Option<usize>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub tools: ToolsEntry,
    pub cache_control: CacheControlEntry,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolsEntry {
    pub gdalinfo: Option<String>,
    pub gdal_translate: Option<String>,
    pub gdal2tiles: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheControlEntry {
    pub expected: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPrograms {
    pub gdalinfo: String,
    pub gdal_translate: String,
    pub gdal2tiles: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub vfr_url: String,
    pub ifr_url: String,
    pub vfr_tabs: Vec<String>,
    pub ifr_low: IfrRules,
    pub ifr_high: IfrRules,
    pub download_dir: Utf8PathBuf,
    pub metadata_path: Utf8PathBuf,
    pub zoom: ZoomRange,
    pub workers: usize,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub tools: ToolPrograms,
    pub expected_cache_control: String,
    pub object_endpoint: String,
}

impl ResolvedConfig {
    pub fn listing_url(&self, chart_type: ChartType) -> &str {
        match chart_type {
            ChartType::Sectional => &self.vfr_url,
            ChartType::IfrLow | ChartType::IfrHigh => &self.ifr_url,
        }
    }

    pub fn ifr_rules(&self, chart_type: ChartType) -> Option<&IfrRules> {
        match chart_type {
            ChartType::Sectional => None,
            ChartType::IfrLow => Some(&self.ifr_low),
            ChartType::IfrHigh => Some(&self.ifr_high),
        }
    }

    pub fn chart_dir(&self, chart_type: ChartType) -> Utf8PathBuf {
        self.download_dir.join(chart_type.directory())
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workers: Option<usize>,
    pub zoom: Option<ZoomRange>,
    pub download_dir: Option<Utf8PathBuf>,
    pub metadata_path: Option<Utf8PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicitly named file must exist; the default file is optional.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ChartError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ChartError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ChartError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ChartError> {
        let zoom = match config.zoom {
            Some(value) => value.parse()?,
            None => ZoomRange::default(),
        };
        let workers = config.workers.unwrap_or(4);
        if workers == 0 {
            return Err(ChartError::ConfigInvalid("workers must be at least 1".to_string()));
        }
        let skip = config.ifr_skip_prefixes.unwrap_or_else(default_skip_prefixes);

        Ok(ResolvedConfig {
            vfr_url: config.vfr_url.unwrap_or_else(|| VFR_CHARTS_URL.to_string()),
            ifr_url: config.ifr_url.unwrap_or_else(|| IFR_CHARTS_URL.to_string()),
            vfr_tabs: config.vfr_tabs.unwrap_or_else(default_vfr_tabs),
            ifr_low: IfrRules {
                allow: config
                    .ifr_low_prefixes
                    .unwrap_or_else(|| vec!["ELUS".to_string()]),
                deny: skip.clone(),
            },
            ifr_high: IfrRules {
                allow: config
                    .ifr_high_prefixes
                    .unwrap_or_else(|| vec!["EHUS".to_string()]),
                deny: skip,
            },
            download_dir: Utf8PathBuf::from(
                config.download_dir.unwrap_or_else(|| "downloads".to_string()),
            ),
            metadata_path: Utf8PathBuf::from(
                config
                    .metadata_path
                    .unwrap_or_else(|| "metadata/faa_chart_log.json".to_string()),
            ),
            zoom,
            workers,
            retries: config.retries.unwrap_or(3),
            retry_delay_ms: config.retry_delay_ms.unwrap_or(5000),
            timeout_secs: config.timeout_secs.unwrap_or(300),
            tools: ToolPrograms {
                gdalinfo: config.tools.gdalinfo.unwrap_or_else(|| "gdalinfo".to_string()),
                gdal_translate: config
                    .tools
                    .gdal_translate
                    .unwrap_or_else(|| "gdal_translate".to_string()),
                gdal2tiles: config
                    .tools
                    .gdal2tiles
                    .unwrap_or_else(|| "gdal2tiles.py".to_string()),
            },
            expected_cache_control: config
                .cache_control
                .expected
                .unwrap_or_else(|| EXPECTED_CACHE_CONTROL.to_string()),
            object_endpoint: config
                .cache_control
                .endpoint
                .unwrap_or_else(|| DEFAULT_OBJECT_ENDPOINT.to_string()),
        })
    }

    pub fn apply_overrides(
        mut config: ResolvedConfig,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, ChartError> {
        if let Some(workers) = overrides.workers {
            if workers == 0 {
                return Err(ChartError::ConfigInvalid(
                    "workers must be at least 1".to_string(),
                ));
            }
            config.workers = workers;
        }
        if let Some(zoom) = overrides.zoom {
            config.zoom = zoom;
        }
        if let Some(dir) = overrides.download_dir {
            config.download_dir = dir;
        }
        if let Some(path) = overrides.metadata_path {
            config.metadata_path = path;
        }
        Ok(config)
    }
}

pub fn default_vfr_tabs() -> Vec<String> {
    vec!["sectional".to_string(), "terminalArea".to_string()]
}

/// Alaska, Hawaii, Pacific and area charts are not tiled.
pub fn default_skip_prefixes() -> Vec<String> {
    ["ELAK", "EHAA", "ELHI", "EHPH", "ELPA", "EHPA", "AREA", "EHAK", "EPHI"]
        .iter()
        .map(|prefix| prefix.to_string())
        .collect()
}
