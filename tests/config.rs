use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use aeronav_tiles::config::{Config, ConfigLoader, ConfigOverrides, default_skip_prefixes};
use aeronav_tiles::domain::{ChartType, ZoomRange};
use aeronav_tiles::error::ChartError;

#[test]
fn parse_partial_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("aeronav-tiles.json");
    fs::write(
        &path,
        r#"{
            "download_dir": "/srv/charts",
            "zoom": "4-11",
            "workers": 2,
            "ifr_high_prefixes": ["EHUS", "EHAK"],
            "tools": { "gdal2tiles": "/opt/gdal/bin/gdal2tiles.py" },
            "cache_control": { "endpoint": "http://localhost:9000" }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.download_dir, Utf8PathBuf::from("/srv/charts"));
    assert_eq!(resolved.zoom, ZoomRange { min: 4, max: 11 });
    assert_eq!(resolved.workers, 2);
    assert_eq!(resolved.tools.gdal2tiles, "/opt/gdal/bin/gdal2tiles.py");
    assert_eq!(resolved.tools.gdalinfo, "gdalinfo");
    assert_eq!(resolved.object_endpoint, "http://localhost:9000");
    assert_eq!(resolved.ifr_high.deny, default_skip_prefixes());
    assert!(!resolved.ifr_rules(ChartType::IfrHigh).unwrap().accepts("EHAK1"));
    assert!(resolved.ifr_rules(ChartType::Sectional).is_none());
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("nope.json");
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, ChartError::ConfigRead(_));
}

#[test]
fn invalid_values_are_rejected() {
    let zero_workers = Config {
        workers: Some(0),
        ..Default::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(zero_workers),
        Err(ChartError::ConfigInvalid(_))
    );

    let bad_zoom = Config {
        zoom: Some("12-5".to_string()),
        ..Default::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(bad_zoom),
        Err(ChartError::InvalidZoom(_))
    );
}

#[test]
fn overrides_take_precedence() {
    let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
    let resolved = ConfigLoader::apply_overrides(
        resolved,
        ConfigOverrides {
            workers: Some(8),
            zoom: Some("6-10".parse().unwrap()),
            download_dir: Some(Utf8PathBuf::from("cache")),
            metadata_path: None,
        },
    )
    .unwrap();
    assert_eq!(resolved.workers, 8);
    assert_eq!(resolved.zoom.to_string(), "6-10");
    assert_eq!(
        resolved.chart_dir(ChartType::Sectional),
        Utf8PathBuf::from("cache/sectional")
    );
    assert_eq!(
        resolved.metadata_path,
        Utf8PathBuf::from("metadata/faa_chart_log.json")
    );
}

#[test]
fn unknown_legacy_keys_are_ignored() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("aeronav-tiles.json");
    fs::write(&path, r#"{ "schema_version": 1, "workers": 3 }"#).unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.workers, 3);
    assert_eq!(resolved.zoom, ZoomRange::default());
}
