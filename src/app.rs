use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::convert::{self, RasterTool, ToolInfo};
use crate::discovery;
use crate::domain::{ChartLink, ChartType};
use crate::error::ChartError;
use crate::faa::ChartSource;
use crate::fs_util;
use crate::metadata::{ChartLog, LogSummary, MetadataStore, TileRecord};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Downloaded,
    Converted,
    Skipped,
    Planned,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadItemResult {
    pub chart_type: ChartType,
    pub identity: String,
    pub url: String,
    pub published_date: Option<String>,
    pub action: Action,
    pub files: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub items: Vec<DownloadItemResult>,
}

impl DownloadReport {
    pub fn count(&self, action: Action) -> usize {
        self.items.iter().filter(|item| item.action == action).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertItemResult {
    pub source: String,
    pub tiles_dir: Option<String>,
    pub paletted: bool,
    pub action: Action,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertReport {
    pub zoom: String,
    pub items: Vec<ConvertItemResult>,
}

impl ConvertReport {
    pub fn count(&self, action: Action) -> usize {
        self.items.iter().filter(|item| item.action == action).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub metadata_path: String,
    pub backup_exists: bool,
    pub charts: LogSummary,
    pub tools: ToolInfo,
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Phase(String),
    BatchStarted { label: String, total: usize },
    ItemFinished {
        label: String,
        ok: bool,
        elapsed: Duration,
    },
    BatchFinished,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Batch driver: discovery, download/extract and tiling over a bounded pool.
pub struct App<S: ChartSource, T: RasterTool> {
    config: ResolvedConfig,
    store: MetadataStore,
    source: S,
    tool: T,
}

impl<S: ChartSource, T: RasterTool> App<S, T> {
    pub fn new(config: ResolvedConfig, source: S, tool: T) -> Self {
        let store = MetadataStore::new(config.metadata_path.clone());
        Self {
            config,
            store,
            source,
            tool,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn discover(&self, chart_type: ChartType) -> Result<Vec<ChartLink>, ChartError> {
        let url = self.config.listing_url(chart_type);
        let html = self.source.fetch_page(url)?;
        match self.config.ifr_rules(chart_type) {
            None => discovery::extract_vfr_links(&html, url, &self.config.vfr_tabs),
            Some(rules) => discovery::extract_ifr_links(&html, url, chart_type, rules),
        }
    }

    pub fn download(
        &self,
        chart_types: &[ChartType],
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadReport, ChartError> {
        let log = self.store.load();
        let mut items = Vec::new();
        let mut pending = Vec::new();

        for &chart_type in chart_types {
            sink.event(ProgressEvent::Phase(format!(
                "phase=Discover; {chart_type} from {}",
                self.config.listing_url(chart_type)
            )));
            let links = self.discover(chart_type)?;
            let total = links.len();
            let mut skipped = 0usize;
            for link in links {
                if !options.force && log.is_current(&link) {
                    skipped += 1;
                    items.push(item_result(&link, Action::Skipped, Vec::new(), None));
                } else {
                    pending.push(link);
                }
            }
            info!(%chart_type, found = total, skipped, "discovered charts");
        }

        if options.dry_run {
            items.extend(
                pending
                    .iter()
                    .map(|link| item_result(link, Action::Planned, Vec::new(), None)),
            );
            return Ok(DownloadReport { items });
        }

        let processed = self.download_batch(&pending, log, sink)?;
        items.extend(processed);
        Ok(DownloadReport { items })
    }

    /// Downloads the single chart of `chart_type` matching `code`.
    pub fn fetch_one(
        &self,
        chart_type: ChartType,
        code: &str,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadReport, ChartError> {
        sink.event(ProgressEvent::Phase(format!(
            "phase=Discover; {chart_type} {code}"
        )));
        let links = self.discover(chart_type)?;
        let link = select_chart(&links, chart_type, code)
            .ok_or_else(|| ChartError::ChartNotFound(format!("{chart_type}:{code}")))?
            .clone();

        let log = self.store.load();
        if !options.force && log.is_current(&link) {
            return Ok(DownloadReport {
                items: vec![item_result(&link, Action::Skipped, Vec::new(), None)],
            });
        }
        if options.dry_run {
            return Ok(DownloadReport {
                items: vec![item_result(&link, Action::Planned, Vec::new(), None)],
            });
        }
        let items = self.download_batch(std::slice::from_ref(&link), log, sink)?;
        Ok(DownloadReport { items })
    }

    pub fn convert(
        &self,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ConvertReport, ChartError> {
        let root = self.config.download_dir.as_std_path();
        sink.event(ProgressEvent::Phase(format!(
            "phase=Scan; looking for GeoTIFFs under {}",
            self.config.download_dir
        )));
        let log = self.store.load();
        let zoom = self.config.zoom;

        let mut items = Vec::new();
        let mut pending = Vec::new();
        for tiff in fs_util::find_tiff_files(root) {
            let key = fs_util::relative_key(root, &tiff);
            if !options.force && log.is_converted(&key) {
                items.push(convert_result(&key, None, false, Action::Skipped, None));
            } else {
                pending.push((key, tiff));
            }
        }
        info!(found = items.len() + pending.len(), pending = pending.len(), "scanned rasters");

        if options.dry_run {
            items.extend(
                pending
                    .iter()
                    .map(|(key, _)| convert_result(key, None, false, Action::Planned, None)),
            );
            return Ok(ConvertReport {
                zoom: zoom.to_string(),
                items,
            });
        }

        let shared = Mutex::new(log);
        let pool = self.pool()?;
        sink.event(ProgressEvent::BatchStarted {
            label: "convert".to_string(),
            total: pending.len(),
        });
        let converted: Vec<ConvertItemResult> = pool.install(|| {
            pending
                .par_iter()
                .map(|(key, tiff)| {
                    let start = Instant::now();
                    let result = convert::convert_tiff(&self.tool, tiff, zoom).and_then(|outcome| {
                        let record = TileRecord {
                            converted: true,
                            source: key.clone(),
                            tiles_dir: outcome.tiles_dir.display().to_string(),
                            zoom: zoom.to_string(),
                            paletted: outcome.paletted,
                            timestamp: iso_timestamp(),
                        };
                        self.record(&shared, |log| log.mark_converted(key.clone(), record))?;
                        Ok(outcome)
                    });
                    sink.event(ProgressEvent::ItemFinished {
                        label: key.clone(),
                        ok: result.is_ok(),
                        elapsed: start.elapsed(),
                    });
                    match result {
                        Ok(outcome) => convert_result(
                            key,
                            Some(outcome.tiles_dir.display().to_string()),
                            outcome.paletted,
                            Action::Converted,
                            None,
                        ),
                        Err(err) => {
                            warn!(source = %key, error = %err, "conversion failed");
                            convert_result(key, None, false, Action::Failed, Some(err.to_string()))
                        }
                    }
                })
                .collect()
        });
        sink.event(ProgressEvent::BatchFinished);

        items.extend(converted);
        Ok(ConvertReport {
            zoom: zoom.to_string(),
            items,
        })
    }

    pub fn status(&self) -> StatusReport {
        let log = self.store.load();
        StatusReport {
            metadata_path: self.store.path().to_string(),
            backup_exists: self.store.backup_path().as_std_path().exists(),
            charts: log.summary(),
            tools: self.tool.tool_info(),
        }
    }

    pub fn restore_metadata(&self) -> Result<StatusReport, ChartError> {
        self.store.restore_backup()?;
        Ok(self.status())
    }

    fn download_batch(
        &self,
        links: &[ChartLink],
        log: ChartLog,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<DownloadItemResult>, ChartError> {
        let shared = Mutex::new(log);
        let pool = self.pool()?;
        sink.event(ProgressEvent::BatchStarted {
            label: "download".to_string(),
            total: links.len(),
        });
        let results: Vec<DownloadItemResult> = pool.install(|| {
            links
                .par_iter()
                .map(|link| {
                    let start = Instant::now();
                    let result = self.fetch_and_unpack(link).and_then(|files| {
                        let replaced = self.tile_keys(&files);
                        self.record(&shared, |log| {
                            log.mark_downloaded(link, iso_timestamp());
                            log.invalidate_tiles(replaced);
                        })?;
                        Ok(files.iter().map(|path| display_path(path)).collect::<Vec<_>>())
                    });
                    sink.event(ProgressEvent::ItemFinished {
                        label: link.file_name().to_string(),
                        ok: result.is_ok(),
                        elapsed: start.elapsed(),
                    });
                    match result {
                        Ok(files) => item_result(link, Action::Downloaded, files, None),
                        Err(err) => {
                            warn!(url = %link.url, error = %err, "chart download failed");
                            item_result(link, Action::Failed, Vec::new(), Some(err.to_string()))
                        }
                    }
                })
                .collect()
        });
        sink.event(ProgressEvent::BatchFinished);
        Ok(results)
    }

    /// Download, validate and extract one archive into its chart type's
    /// directory. The archive is removed only after a clean extraction.
    fn fetch_and_unpack(&self, link: &ChartLink) -> Result<Vec<PathBuf>, ChartError> {
        let chart_dir = self.config.chart_dir(link.chart_type);
        let zip_path = self.source.download(&link.url, chart_dir.as_std_path())?;
        fs_util::validate_zip(&zip_path)?;
        let files = fs_util::extract_zip(&zip_path, chart_dir.as_std_path())?;
        fs::remove_file(&zip_path).map_err(|err| ChartError::Filesystem(err.to_string()))?;
        Ok(files)
    }

    /// Tile-record keys of the rasters among `files`; a new edition reuses
    /// the previous edition's file names.
    fn tile_keys(&self, files: &[PathBuf]) -> Vec<String> {
        let root = self.config.download_dir.as_std_path();
        files
            .iter()
            .filter(|path| fs_util::is_tiff(path))
            .map(|path| fs_util::relative_key(root, path))
            .collect()
    }

    /// Applies `update` to the shared log and persists it before releasing
    /// the lock, so saves never interleave.
    fn record<F>(&self, shared: &Mutex<ChartLog>, update: F) -> Result<(), ChartError>
    where
        F: FnOnce(&mut ChartLog),
    {
        let mut log = shared
            .lock()
            .map_err(|_| ChartError::Filesystem("metadata lock poisoned".to_string()))?;
        update(&mut log);
        self.store.save(&log)
    }

    fn pool(&self) -> Result<rayon::ThreadPool, ChartError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|idx| format!("chart-worker-{idx}"))
            .build()
            .map_err(|err| ChartError::WorkerPool(err.to_string()))
    }
}

/// VFR codes match anywhere in the URL; IFR codes must equal the chart code.
pub fn select_chart<'a>(
    links: &'a [ChartLink],
    chart_type: ChartType,
    code: &str,
) -> Option<&'a ChartLink> {
    let needle = code.trim().to_lowercase();
    if chart_type.is_ifr() {
        links.iter().find(|link| {
            link.chart_code
                .as_deref()
                .map(|value| value.eq_ignore_ascii_case(&needle))
                .unwrap_or(false)
        })
    } else {
        links
            .iter()
            .find(|link| link.url.to_lowercase().contains(&needle))
    }
}

fn item_result(
    link: &ChartLink,
    action: Action,
    files: Vec<String>,
    error: Option<String>,
) -> DownloadItemResult {
    DownloadItemResult {
        chart_type: link.chart_type,
        identity: link.identity(),
        url: link.url.clone(),
        published_date: link.published_date.clone(),
        action,
        files,
        error,
    }
}

fn convert_result(
    source: &str,
    tiles_dir: Option<String>,
    paletted: bool,
    action: Action,
    error: Option<String>,
) -> ConvertItemResult {
    ConvertItemResult {
        source: source.to_string(),
        tiles_dir,
        paletted,
        action,
        error,
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
