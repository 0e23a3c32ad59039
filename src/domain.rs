use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ChartError;

const MAX_ZOOM: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[value(name = "sectional", alias = "vfr")]
    #[serde(alias = "vfr")]
    Sectional,
    #[value(name = "ifr_low")]
    IfrLow,
    #[value(name = "ifr_high")]
    IfrHigh,
}

impl ChartType {
    pub const ALL: [ChartType; 3] = [ChartType::Sectional, ChartType::IfrLow, ChartType::IfrHigh];

    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::Sectional => "sectional",
            ChartType::IfrLow => "ifr_low",
            ChartType::IfrHigh => "ifr_high",
        }
    }

    /// Key of this chart type's sub-mapping in the metadata log.
    pub fn metadata_section(self) -> &'static str {
        match self {
            ChartType::Sectional => "vfr",
            ChartType::IfrLow => "ifr_low",
            ChartType::IfrHigh => "ifr_high",
        }
    }

    /// Sub-directory of the download root that receives this chart type.
    pub fn directory(self) -> &'static str {
        self.as_str()
    }

    pub fn is_ifr(self) -> bool {
        matches!(self, ChartType::IfrLow | ChartType::IfrHigh)
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartType {
    type Err = ChartError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sectional" | "vfr" => Ok(ChartType::Sectional),
            "ifr_low" | "ifr-low" => Ok(ChartType::IfrLow),
            "ifr_high" | "ifr-high" => Ok(ChartType::IfrHigh),
            _ => Err(ChartError::InvalidChartType(value.to_string())),
        }
    }
}

/// A downloadable chart archive found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartLink {
    pub chart_type: ChartType,
    pub url: String,
    pub chart_code: Option<String>,
    pub published_date: Option<String>,
}

impl ChartLink {
    pub fn vfr(url: impl Into<String>) -> Self {
        Self {
            chart_type: ChartType::Sectional,
            url: url.into(),
            chart_code: None,
            published_date: None,
        }
    }

    pub fn file_name(&self) -> &str {
        file_name_from_url(&self.url)
    }

    /// Metadata key for this chart, scoped to its chart type's sub-mapping.
    pub fn identity(&self) -> String {
        match (&self.chart_code, &self.published_date) {
            (Some(code), Some(date)) if self.chart_type.is_ifr() => format!("{code}_{date}"),
            (Some(code), None) if self.chart_type.is_ifr() => {
                format!("{code}_{}", self.file_name())
            }
            _ => self.file_name().to_string(),
        }
    }
}

pub fn file_name_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Result<Self, ChartError> {
        if min > max || max > MAX_ZOOM {
            return Err(ChartError::InvalidZoom(format!("{min}-{max}")));
        }
        Ok(Self { min, max })
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self { min: 5, max: 12 }
    }
}

impl fmt::Display for ZoomRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl FromStr for ZoomRange {
    type Err = ChartError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ChartError::InvalidZoom(value.to_string());
        let trimmed = value.trim();
        let (min, max) = match trimmed.split_once('-') {
            Some((min, max)) => (min.trim(), max.trim()),
            None => (trimmed, trimmed),
        };
        let min = min.parse::<u8>().map_err(|_| invalid())?;
        let max = max.parse::<u8>().map_err(|_| invalid())?;
        Self::new(min, max).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ZoomRange {
    type Error = ChartError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ZoomRange> for String {
    fn from(value: ZoomRange) -> Self {
        value.to_string()
    }
}
