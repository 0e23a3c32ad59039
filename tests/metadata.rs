use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use aeronav_tiles::domain::{ChartLink, ChartType};
use aeronav_tiles::error::ChartError;
use aeronav_tiles::metadata::{ChartLog, ChartRecord, MetadataStore, TileRecord};

fn store(temp: &tempfile::TempDir) -> MetadataStore {
    let path = Utf8PathBuf::from_path_buf(temp.path().join("metadata").join("faa_chart_log.json"))
        .unwrap();
    MetadataStore::new(path)
}

fn record() -> ChartRecord {
    ChartRecord {
        downloaded: true,
        published_date: None,
        timestamp: "2025-07-11T00:00:00+00:00".to_string(),
        chart_code: None,
        url: None,
    }
}

#[test]
fn vfr_current_check() {
    let mut log = ChartLog::default();
    log.vfr.insert("SEA_20250711.zip".to_string(), record());

    assert!(log.is_vfr_chart_current("https://example.com/SEA_20250711.zip"));
    assert!(!log.is_vfr_chart_current("https://example.com/PDX_20250711.zip"));
}

#[test]
fn ifr_current_check_is_scoped_by_chart_type() {
    let mut log = ChartLog::default();
    log.ifr_low.insert("ELUS1_2025-07-11".to_string(), record());

    assert!(log.is_ifr_chart_current(ChartType::IfrLow, "ELUS1", "2025-07-11"));
    assert!(!log.is_ifr_chart_current(ChartType::IfrLow, "ELUS2", "2025-07-11"));
    assert!(!log.is_ifr_chart_current(ChartType::IfrHigh, "ELUS1", "2025-07-11"));

    let newer = ChartLink {
        chart_type: ChartType::IfrLow,
        url: "https://example.com/delus1.zip".to_string(),
        chart_code: Some("ELUS1".to_string()),
        published_date: Some("2025-09-04".to_string()),
    };
    assert!(!log.is_current(&newer));
}

#[test]
fn undownloaded_record_is_not_current() {
    let mut log = ChartLog::default();
    let mut pending = record();
    pending.downloaded = false;
    log.vfr.insert("SEA.zip".to_string(), pending);
    assert!(!log.is_vfr_chart_current("https://example.com/SEA.zip"));
}

#[test]
fn save_and_load_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);

    let mut log = ChartLog::default();
    log.mark_downloaded(
        &ChartLink {
            chart_type: ChartType::IfrHigh,
            url: "https://example.com/dehus3.zip".to_string(),
            chart_code: Some("EHUS3".to_string()),
            published_date: Some("2025-09-04".to_string()),
        },
        "2025-09-05T10:00:00+00:00".to_string(),
    );
    log.mark_converted(
        "ifr_high/EHUS3.tif".to_string(),
        TileRecord {
            converted: true,
            source: "ifr_high/EHUS3.tif".to_string(),
            tiles_dir: "downloads/ifr_high/EHUS3_tiles".to_string(),
            zoom: "5-12".to_string(),
            paletted: true,
            timestamp: "2025-09-05T11:00:00+00:00".to_string(),
        },
    );

    store.save(&log).unwrap();
    assert_eq!(store.load(), log);
    assert!(!store.backup_path().as_std_path().exists());
}

#[test]
fn save_keeps_previous_version_as_backup() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);

    let mut first = ChartLog::default();
    first.vfr.insert("SEA.zip".to_string(), record());
    store.save(&first).unwrap();

    let mut second = first.clone();
    second.vfr.insert("PDX.zip".to_string(), record());
    store.save(&second).unwrap();

    let backup: ChartLog =
        serde_json::from_str(&fs::read_to_string(store.backup_path().as_std_path()).unwrap())
            .unwrap();
    assert_eq!(backup, first);
    assert_eq!(store.load(), second);

    let leftovers: Vec<_> = fs::read_dir(store.path().parent().unwrap().as_std_path())
        .unwrap()
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn corrupt_file_loads_empty() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    fs::create_dir_all(store.path().parent().unwrap().as_std_path()).unwrap();
    fs::write(store.path().as_std_path(), "notjson").unwrap();

    assert_eq!(store.load(), ChartLog::default());
}

#[test]
fn restore_replaces_corrupt_primary() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);

    let mut log = ChartLog::default();
    log.vfr.insert("chart1.zip".to_string(), record());
    store.save(&log).unwrap();
    store.save(&log).unwrap();
    fs::write(store.path().as_std_path(), "corrupt").unwrap();

    let restored = store.restore_backup().unwrap();
    assert_eq!(restored, log);
    assert_eq!(store.load(), log);
}

#[test]
fn restore_without_backup_fails() {
    let temp = tempfile::tempdir().unwrap();
    let err = store(&temp).restore_backup().unwrap_err();
    assert_matches!(err, ChartError::MissingBackup(_));
}

#[test]
fn invalidated_tiles_are_no_longer_converted() {
    let mut log = ChartLog::default();
    for key in ["ifr_low/delus1.tif", "ifr_low/delus2.tif"] {
        log.mark_converted(
            key.to_string(),
            TileRecord {
                converted: true,
                source: key.to_string(),
                tiles_dir: format!("downloads/{key}_tiles"),
                zoom: "5-12".to_string(),
                paletted: false,
                timestamp: "2025-07-11T00:00:00+00:00".to_string(),
            },
        );
    }

    log.invalidate_tiles(vec![
        "ifr_low/delus1.tif".to_string(),
        "ifr_low/never_tiled.tif".to_string(),
    ]);
    assert!(!log.is_converted("ifr_low/delus1.tif"));
    assert!(log.is_converted("ifr_low/delus2.tif"));
    assert_eq!(log.summary().tiles, 1);
}
