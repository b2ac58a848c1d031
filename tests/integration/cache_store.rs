//! On-disk result cache behavior

use chartgate::cache::key::CacheKey;
use chartgate::cache::{CacheConfig, CachedChart, ResultCache};
use chartgate::pipeline::{ChartKind, CodeOrigin};
use chrono::{Duration as ChronoDuration, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn entry(path: &str) -> CachedChart {
    CachedChart {
        artifact_path: PathBuf::from(path),
        chart_kind: ChartKind::Scatter,
        description: "Based on 4 data points: scatter plot".to_string(),
        code: "plt.scatter(x, y)\nplt.savefig(output_path)".to_string(),
        origin: CodeOrigin::Collaborator,
        created_at: Utc::now(),
    }
}

#[test]
fn entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("cache");
    let options = [("chart_type", Some("scatter"))];

    {
        let cache = ResultCache::open(&db_path).unwrap();
        cache
            .set("chart", "x=1,2,3 y=4,5,6", &entry("/tmp/a.png"), &options)
            .unwrap();
    }

    let cache = ResultCache::open(&db_path).unwrap();
    let hit = cache.get("chart", "x=1,2,3 y=4,5,6", &options).unwrap();
    assert_eq!(hit.unwrap().artifact_path, PathBuf::from("/tmp/a.png"));
    assert!(cache
        .get("chart", "x=1,2,3 y=4,5,6", &[("chart_type", None)])
        .unwrap()
        .is_none());
}

#[test]
fn expired_entries_are_misses() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig {
        enabled: true,
        path: Some(dir.path().join("cache")),
        max_age_secs: Some(60),
    };
    let cache = ResultCache::from_config(&config).unwrap();
    let key = CacheKey::new("chart", "old request");

    let mut old = entry("/tmp/old.png");
    old.created_at = Utc::now() - ChronoDuration::seconds(3600);
    cache.store(&key, &old).unwrap();
    assert!(cache.lookup(&key).unwrap().is_none());
    assert!(cache.is_empty());

    cache.store(&key, &entry("/tmp/new.png")).unwrap();
    assert!(cache.lookup(&key).unwrap().is_some());
}

#[test]
fn no_expiry_by_default() {
    let cache = ResultCache::temporary()
        .unwrap()
        .with_max_age(None);
    let key = CacheKey::new("chart", "ancient");
    let mut old = entry("/tmp/ancient.png");
    old.created_at = Utc::now() - ChronoDuration::days(365);
    cache.store(&key, &old).unwrap();
    assert!(cache.lookup(&key).unwrap().is_some());
}

#[test]
fn clear_and_remove() {
    let cache = ResultCache::temporary().unwrap().with_max_age(Some(Duration::from_secs(3600)));
    let a = CacheKey::new("chart", "a");
    let b = CacheKey::new("chart", "b");
    cache.store(&a, &entry("/tmp/a.png")).unwrap();
    cache.store(&b, &entry("/tmp/b.png")).unwrap();
    assert_eq!(cache.len(), 2);

    assert!(cache.remove(&a).unwrap());
    assert!(!cache.remove(&a).unwrap());
    assert_eq!(cache.clear().unwrap(), 1);
    assert!(cache.is_empty());
}
