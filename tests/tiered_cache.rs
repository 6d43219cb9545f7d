//! End-to-end tests for the tiered cache public API

use std::sync::mpsc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use permacache::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Thumbnail {
    id: u64,
    pixels: Vec<u8>,
}

fn thumb(id: u64) -> Thumbnail {
    Thumbnail {
        id,
        pixels: vec![id as u8; 64],
    }
}

fn build_cache(dir: &TempDir) -> Permacache<Thumbnail> {
    Permacache::builder("thumbs", dir.path())
        .build()
        .expect("cache builds")
}

#[test]
fn builder_rejects_empty_name_and_path() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Permacache::<Thumbnail>::builder("", dir.path()).build(),
        Err(CacheOperationError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        Permacache::<Thumbnail>::builder("thumbs", "").build(),
        Err(CacheOperationError::InvalidConfiguration(_))
    ));
}

#[test]
fn set_get_remove_round_trip() {
    let dir = TempDir::new().unwrap();
    let cache = build_cache(&dir);

    cache.set("one", thumb(1));
    assert_eq!(cache.get("one"), Some(thumb(1)));

    cache.remove("one");
    assert_eq!(cache.get("one"), None);
}

#[test]
fn values_survive_a_rebuild_via_disk() {
    let dir = TempDir::new().unwrap();
    {
        let cache = build_cache(&dir);
        cache.set("persisted", thumb(7));
    }

    // A fresh instance starts with an empty memory tier and bootstraps the
    // disk index from file metadata.
    let cache = build_cache(&dir);
    assert_eq!(cache.memory().count(), 0);
    assert_eq!(cache.disk().count(), 1);

    assert_eq!(cache.get("persisted"), Some(thumb(7)));
    // The disk hit was promoted.
    assert!(cache.memory().contains("persisted"));
}

#[test]
fn configured_disk_count_limit_applies() {
    let dir = TempDir::new().unwrap();
    let cache = Permacache::builder("thumbs", dir.path())
        .disk_count_limit(2)
        .build()
        .unwrap();

    cache.set("a", thumb(1));
    cache.set("b", thumb(2));
    cache.set("c", thumb(3));

    assert_eq!(cache.disk().count(), 2);
    assert!(!cache.disk().contains("a"));
    assert!(cache.disk().contains("b"));
    assert!(cache.disk().contains("c"));
}

#[test]
fn setting_a_limit_trims_immediately() {
    let dir = TempDir::new().unwrap();
    let cache = build_cache(&dir);

    cache.set("a", thumb(1));
    cache.set("b", thumb(2));
    cache.set("c", thumb(3));
    assert_eq!(cache.disk().count(), 3);

    cache.disk().set_count_limit(1);
    assert_eq!(cache.disk().count(), 1);
    assert!(cache.disk().contains("c"));
}

#[test]
fn clear_empties_both_tiers_and_directory() {
    let dir = TempDir::new().unwrap();
    let cache = build_cache(&dir);

    cache.set("a", thumb(1));
    cache.set("b", thumb(2));
    cache.clear();

    assert_eq!(cache.memory().count(), 0);
    assert_eq!(cache.disk().count(), 0);
    assert_eq!(cache.disk().total_cost(), 0);
    let files = std::fs::read_dir(cache.disk().directory()).unwrap().count();
    assert_eq!(files, 0);
}

#[test]
fn async_set_completion_sees_both_tiers() {
    let dir = TempDir::new().unwrap();
    let cache = build_cache(&dir);

    let (tx, rx) = mpsc::channel();
    cache.set_async("k", thumb(9), move |cache: &Permacache<Thumbnail>, key, value| {
        tx.send((
            cache.memory().contains(key),
            cache.disk().contains(key),
            value,
        ))
        .unwrap();
    });

    let (in_memory, on_disk, value) = rx.recv().unwrap();
    assert!(in_memory);
    assert!(on_disk);
    assert_eq!(value, Some(thumb(9)));
}

#[test]
fn async_clear_fires_after_both_tiers() {
    let dir = TempDir::new().unwrap();
    let cache = build_cache(&dir);
    cache.set("k", thumb(1));

    let (tx, rx) = mpsc::channel();
    cache.clear_async(move |cache: &Permacache<Thumbnail>| {
        tx.send((cache.memory().count(), cache.disk().count())).unwrap();
    });
    assert_eq!(rx.recv().unwrap(), (0, 0));
}

#[test]
fn age_limit_zero_keeps_the_cache_empty() {
    let dir = TempDir::new().unwrap();
    let cache = Permacache::builder("thumbs", dir.path())
        .memory_age_limit(Duration::ZERO)
        .disk_age_limit(Duration::ZERO)
        .build()
        .unwrap();

    cache.set("a", thumb(1));
    assert_eq!(cache.memory().count(), 0);
    assert_eq!(cache.disk().count(), 0);
    assert_eq!(cache.get("a"), None);
}

#[test]
fn stats_reflect_activity() {
    let dir = TempDir::new().unwrap();
    let cache = build_cache(&dir);

    cache.set("k", thumb(1));
    assert!(cache.get("k").is_some());
    assert!(cache.get("missing").is_none());

    let disk_stats = cache.disk().stats();
    assert_eq!(disk_stats.writes, 1);
    let memory_stats = cache.memory().stats();
    assert_eq!(memory_stats.hits, 1);
    // Both tiers missed on the unknown key.
    assert_eq!(memory_stats.misses, 1);
    assert_eq!(disk_stats.misses, 1);

    let rendered = cache.stats();
    assert!(rendered.contains("\"memory\""));
    assert!(rendered.contains("\"disk\""));
}

#[test]
fn same_name_and_path_share_backing_files() {
    let dir = TempDir::new().unwrap();
    let first = build_cache(&dir);
    first.set("shared", thumb(4));

    let second = build_cache(&dir);
    assert_eq!(second.get("shared"), Some(thumb(4)));
}
