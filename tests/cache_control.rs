use std::fs;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;

use aeronav_tiles::cache_control::{
    CacheControlStatus, ObjectHead, ObjectStore, check_cache_control,
};
use aeronav_tiles::config::EXPECTED_CACHE_CONTROL;
use aeronav_tiles::error::ChartError;

struct MockStore {
    head: Option<ObjectHead>,
    requested: Mutex<Vec<(String, String)>>,
}

impl MockStore {
    fn with(head: Option<ObjectHead>) -> Self {
        Self {
            head,
            requested: Mutex::new(Vec::new()),
        }
    }
}

impl ObjectStore for MockStore {
    fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, ChartError> {
        self.requested
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string()));
        Ok(self.head.clone())
    }
}

fn tile_tree(root: &Path) {
    fs::create_dir_all(root.join("6/10")).unwrap();
    fs::create_dir_all(root.join("5/4")).unwrap();
    fs::write(root.join("6/10/22.png"), b"png").unwrap();
    fs::write(root.join("5/4/11.png"), b"png").unwrap();
    fs::write(root.join("tilemapresource.xml"), b"<xml/>").unwrap();
}

fn header(value: &str) -> Option<ObjectHead> {
    Some(ObjectHead {
        cache_control: Some(value.to_string()),
    })
}

#[test]
fn matching_header_is_correct() {
    let temp = tempfile::tempdir().unwrap();
    tile_tree(temp.path());
    let store = MockStore::with(header(EXPECTED_CACHE_CONTROL));

    let report = check_cache_control(
        &store,
        "chart-tiles",
        "sectional/Seattle",
        temp.path(),
        EXPECTED_CACHE_CONTROL,
    )
    .unwrap();
    assert_eq!(report.status, CacheControlStatus::Correct);
    assert_eq!(report.status.exit_code(), 0);
    assert_eq!(report.key, "sectional/Seattle/5/4/11.png");
    assert_eq!(
        *store.requested.lock().unwrap(),
        vec![(
            "chart-tiles".to_string(),
            "sectional/Seattle/5/4/11.png".to_string()
        )]
    );
}

#[test]
fn different_or_absent_header_is_incorrect() {
    let temp = tempfile::tempdir().unwrap();
    tile_tree(temp.path());

    let stale = MockStore::with(header("max-age=60"));
    let report =
        check_cache_control(&stale, "b", "p", temp.path(), EXPECTED_CACHE_CONTROL).unwrap();
    assert_eq!(
        report.status,
        CacheControlStatus::Incorrect(Some("max-age=60".to_string()))
    );
    assert_eq!(report.status.exit_code(), 3);

    let bare = MockStore::with(Some(ObjectHead {
        cache_control: None,
    }));
    let report =
        check_cache_control(&bare, "b", "p", temp.path(), EXPECTED_CACHE_CONTROL).unwrap();
    assert_eq!(report.status, CacheControlStatus::Incorrect(None));
}

#[test]
fn missing_object_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    tile_tree(temp.path());
    let store = MockStore::with(None);

    let report =
        check_cache_control(&store, "b", "p", temp.path(), EXPECTED_CACHE_CONTROL).unwrap();
    assert_eq!(report.status, CacheControlStatus::Missing);
    assert_eq!(report.status.exit_code(), 4);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"]["status"], "missing");
}

#[test]
fn empty_tile_dir_has_no_sample() {
    let temp = tempfile::tempdir().unwrap();
    let store = MockStore::with(None);

    let err =
        check_cache_control(&store, "b", "p", temp.path(), EXPECTED_CACHE_CONTROL).unwrap_err();
    assert_matches!(err, ChartError::NoSampleTile(_));
    assert!(store.requested.lock().unwrap().is_empty());
}
