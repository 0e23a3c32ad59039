use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::Builder;
use tracing::warn;

use crate::domain::{ChartLink, ChartType};
use crate::error::ChartError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRecord {
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    #[serde(default)]
    pub converted: bool,
    pub source: String,
    pub tiles_dir: String,
    pub zoom: String,
    #[serde(default)]
    pub paletted: bool,
    #[serde(default)]
    pub timestamp: String,
}

/// Processing log: one sub-mapping per chart type plus converted TIFFs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartLog {
    #[serde(default)]
    pub vfr: BTreeMap<String, ChartRecord>,
    #[serde(default)]
    pub ifr_low: BTreeMap<String, ChartRecord>,
    #[serde(default)]
    pub ifr_high: BTreeMap<String, ChartRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tiles: BTreeMap<String, TileRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    pub vfr: usize,
    pub ifr_low: usize,
    pub ifr_high: usize,
    pub tiles: usize,
}

impl ChartLog {
    pub fn section(&self, chart_type: ChartType) -> &BTreeMap<String, ChartRecord> {
        match chart_type {
            ChartType::Sectional => &self.vfr,
            ChartType::IfrLow => &self.ifr_low,
            ChartType::IfrHigh => &self.ifr_high,
        }
    }

    pub fn section_mut(&mut self, chart_type: ChartType) -> &mut BTreeMap<String, ChartRecord> {
        match chart_type {
            ChartType::Sectional => &mut self.vfr,
            ChartType::IfrLow => &mut self.ifr_low,
            ChartType::IfrHigh => &mut self.ifr_high,
        }
    }

    pub fn is_current(&self, link: &ChartLink) -> bool {
        self.section(link.chart_type)
            .get(&link.identity())
            .map(|record| record.downloaded)
            .unwrap_or(false)
    }

    pub fn is_vfr_chart_current(&self, url: &str) -> bool {
        self.is_current(&ChartLink::vfr(url))
    }

    pub fn is_ifr_chart_current(
        &self,
        chart_type: ChartType,
        chart_code: &str,
        published_date: &str,
    ) -> bool {
        self.section(chart_type)
            .get(&format!("{chart_code}_{published_date}"))
            .map(|record| record.downloaded)
            .unwrap_or(false)
    }

    pub fn mark_downloaded(&mut self, link: &ChartLink, timestamp: String) {
        let record = ChartRecord {
            downloaded: true,
            published_date: link.published_date.clone(),
            timestamp,
            chart_code: link.chart_code.clone(),
            url: Some(link.url.clone()),
        };
        self.section_mut(link.chart_type)
            .insert(link.identity(), record);
    }

    pub fn is_converted(&self, key: &str) -> bool {
        self.tiles
            .get(key)
            .map(|record| record.converted)
            .unwrap_or(false)
    }

    pub fn mark_converted(&mut self, key: String, record: TileRecord) {
        self.tiles.insert(key, record);
    }

    /// Drops tile records whose source raster was just replaced on disk.
    pub fn invalidate_tiles<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = String>,
    {
        for key in keys {
            self.tiles.remove(&key);
        }
    }

    pub fn summary(&self) -> LogSummary {
        let downloaded = |section: &BTreeMap<String, ChartRecord>| {
            section.values().filter(|record| record.downloaded).count()
        };
        LogSummary {
            vfr: downloaded(&self.vfr),
            ifr_low: downloaded(&self.ifr_low),
            ifr_high: downloaded(&self.ifr_high),
            tiles: self.tiles.values().filter(|record| record.converted).count(),
        }
    }
}

/// The on-disk processing log with a `.bak` copy of the previous version.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: Utf8PathBuf,
}

impl MetadataStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn backup_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.bak", self.path))
    }

    /// Loads the log. A missing, unreadable or corrupt file yields an empty log.
    pub fn load(&self) -> ChartLog {
        let content = match fs::read_to_string(self.path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return ChartLog::default(),
            Err(err) => {
                warn!(path = %self.path, error = %err, "metadata unreadable, starting empty");
                return ChartLog::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(log) => log,
            Err(err) => {
                warn!(path = %self.path, error = %err, "metadata corrupt, starting empty");
                ChartLog::default()
            }
        }
    }

    pub fn save(&self, log: &ChartLog) -> Result<(), ChartError> {
        let mut content = serde_json::to_vec_pretty(log)
            .map_err(|err| ChartError::Filesystem(err.to_string()))?;
        content.push(b'\n');

        if self.path.as_std_path().exists() {
            fs::copy(self.path.as_std_path(), self.backup_path().as_std_path())
                .map_err(|err| ChartError::Filesystem(format!("backup {}: {err}", self.path)))?;
        }
        write_atomic(&self.path, &content)
    }

    pub fn restore_backup(&self) -> Result<ChartLog, ChartError> {
        let backup = self.backup_path();
        let content = fs::read(backup.as_std_path())
            .map_err(|_| ChartError::MissingBackup(backup.clone().into_std_path_buf()))?;
        let log: ChartLog = serde_json::from_slice(&content)
            .map_err(|err| ChartError::Filesystem(format!("backup {backup} is corrupt: {err}")))?;
        write_atomic(&self.path, &content)?;
        Ok(log)
    }
}

fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ChartError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| ChartError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".chart-log")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| ChartError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| ChartError::Filesystem(err.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| ChartError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| ChartError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> MetadataStore {
        let path = Utf8PathBuf::from_path_buf(dir.path().join("faa_chart_log.json")).unwrap();
        MetadataStore::new(path)
    }

    #[test]
    fn missing_file_loads_empty() {
        let temp = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&temp).load(), ChartLog::default());
    }

    #[test]
    fn legacy_record_without_timestamp_loads() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_in(&temp);
        fs::write(
            store.path().as_std_path(),
            r#"{"vfr": {"SEA_20250711.zip": {"downloaded": true}}}"#,
        )
        .unwrap();

        let log = store.load();
        assert!(log.is_vfr_chart_current("https://example.com/SEA_20250711.zip"));
        assert!(log.vfr["SEA_20250711.zip"].timestamp.is_empty());
    }

    #[test]
    fn summary_counts_only_completed() {
        let mut log = ChartLog::default();
        log.mark_downloaded(&ChartLink::vfr("https://x/SEA.zip"), "t".to_string());
        log.vfr.insert(
            "PDX.zip".to_string(),
            ChartRecord {
                downloaded: false,
                published_date: None,
                timestamp: String::new(),
                chart_code: None,
                url: None,
            },
        );
        let summary = log.summary();
        assert_eq!(summary.vfr, 1);
        assert_eq!(summary.ifr_low, 0);
    }
}
