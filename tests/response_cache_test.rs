//! Tests for the disk-backed [`ResponseCache`].

use slipstream::cache::{CacheConfig, CacheDigest, CacheEntry, ResponseCache, key_for};
use slipstream::{Completion, RequestDescriptor, SlipstreamError, Usage};
use tempfile::TempDir;

fn descriptor(prompt: &str) -> RequestDescriptor {
    RequestDescriptor::new(prompt, "router").run("payload-pharma_run_0")
}

fn entry_for(d: &RequestDescriptor, text: &str, actual_model: &str) -> CacheEntry {
    CacheEntry::new(
        Completion {
            text: text.into(),
            model: d.model.clone(),
            actual_model: actual_model.into(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            cost: Some(0.0004),
        },
        d,
    )
}

async fn open(dir: &TempDir, memory_entries: u64) -> ResponseCache {
    ResponseCache::open(&CacheConfig::new(dir.path()).memory_entries(memory_entries))
        .await
        .unwrap()
}

// =========================================================================
// CacheConfig
// =========================================================================

#[test]
fn cache_config_defaults() {
    let config = CacheConfig::default();
    assert_eq!(config.dir, std::path::PathBuf::from("_slipstream_cache"));
    assert_eq!(config.memory_entries, 1_024);
}

#[tokio::test]
async fn open_creates_nested_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let cache = ResponseCache::open(&CacheConfig::new(&nested)).await.unwrap();
    assert!(nested.is_dir());
    assert_eq!(cache.dir(), nested.as_path());
    assert!(cache.is_empty().await.unwrap());
}

// =========================================================================
// get / put
// =========================================================================

#[tokio::test]
async fn miss_then_put_then_hit() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir, 16).await;
    let d = descriptor("hello");
    let digest = key_for(&d);

    assert!(cache.get(&digest).await.is_none());
    assert!(!cache.contains(&digest).await);

    let entry = entry_for(&d, "hi there", "gpt-4o-mini");
    cache.put(&digest, &entry).await.unwrap();

    assert_eq!(cache.get(&digest).await, Some(entry));
    assert!(dir.path().join(digest.file_name()).is_file());
    assert_eq!(cache.len().await.unwrap(), 1);
}

#[tokio::test]
async fn hit_without_memory_front_reads_disk() {
    let dir = TempDir::new().unwrap();
    let d = descriptor("disk only");
    let digest = key_for(&d);
    let entry = entry_for(&d, "from disk", "router");

    open(&dir, 0).await.put(&digest, &entry).await.unwrap();

    let reopened = open(&dir, 0).await;
    assert_eq!(reopened.get(&digest).await, Some(entry));
}

#[tokio::test]
async fn put_is_write_once() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir, 0).await;
    let d = descriptor("once");
    let digest = key_for(&d);

    let first = entry_for(&d, "first", "m");
    cache.put(&digest, &first).await.unwrap();
    cache
        .put(&digest, &entry_for(&d, "second", "m"))
        .await
        .unwrap();

    assert_eq!(cache.get(&digest).await, Some(first));
    assert_eq!(cache.len().await.unwrap(), 1);
}

#[tokio::test]
async fn file_layout_is_plain_json() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir, 0).await;
    let d = descriptor("layout").index(4);
    let digest = key_for(&d);
    cache
        .put(&digest, &entry_for(&d, "text", "gpt-4o"))
        .await
        .unwrap();

    let raw = std::fs::read_to_string(dir.path().join(format!("{digest}.json"))).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["response"], "text");
    assert_eq!(json["model"], "router");
    assert_eq!(json["actual_model"], "gpt-4o");
    assert_eq!(json["run"], "payload-pharma_run_0");
    assert_eq!(json["index"], 4);
    assert_eq!(json["usage"]["total_tokens"], 30);
}

#[tokio::test]
async fn concurrent_puts_of_distinct_digests() {
    let dir = TempDir::new().unwrap();
    let cache = std::sync::Arc::new(open(&dir, 0).await);

    let mut handles = Vec::new();
    for i in 0..16 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            let d = descriptor("parallel").index(i);
            let digest = key_for(&d);
            cache
                .put(&digest, &entry_for(&d, &format!("r{i}"), "m"))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.len().await.unwrap(), 16);
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

// =========================================================================
// Corruption
// =========================================================================

#[tokio::test]
async fn corrupt_entry_is_a_miss_and_gets_replaced() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir, 0).await;
    let d = descriptor("corrupt");
    let digest = key_for(&d);
    std::fs::write(dir.path().join(digest.file_name()), b"{not json").unwrap();

    assert!(cache.get(&digest).await.is_none());
    assert!(matches!(
        cache.try_get(&digest).await,
        Err(SlipstreamError::CacheCorrupt { .. })
    ));

    let entry = entry_for(&d, "repaired", "m");
    cache.put(&digest, &entry).await.unwrap();
    assert_eq!(cache.try_get(&digest).await.unwrap(), Some(entry));
}

// =========================================================================
// clear
// =========================================================================

async fn seeded(dir: &TempDir) -> (ResponseCache, Vec<CacheDigest>) {
    let cache = open(dir, 16).await;
    let specs = [
        ("a", "payload-pharma_run_0", "gpt-4o"),
        ("b", "payload-pharma_run_1", "claude-3-opus"),
        ("c", "payload-legal_run_0", "gpt-4o-mini"),
    ];
    let mut digests = Vec::new();
    for (prompt, run, actual) in specs {
        let d = RequestDescriptor::new(prompt, "router").run(run);
        let digest = key_for(&d);
        cache.put(&digest, &entry_for(&d, prompt, actual)).await.unwrap();
        digests.push(digest);
    }
    (cache, digests)
}

#[tokio::test]
async fn clear_all() {
    let dir = TempDir::new().unwrap();
    let (cache, digests) = seeded(&dir).await;
    std::fs::write(dir.path().join(".stray.tmp"), b"partial").unwrap();

    assert_eq!(cache.clear(None).await.unwrap(), 3);
    assert_eq!(cache.len().await.unwrap(), 0);
    assert!(!dir.path().join(".stray.tmp").exists());
    for digest in &digests {
        assert!(cache.get(digest).await.is_none(), "memory front must be dropped");
    }
}

#[tokio::test]
async fn clear_by_run_tag() {
    let dir = TempDir::new().unwrap();
    let (cache, digests) = seeded(&dir).await;

    assert_eq!(cache.clear(Some("pharma")).await.unwrap(), 2);
    assert!(cache.get(&digests[0]).await.is_none());
    assert!(cache.get(&digests[1]).await.is_none());
    assert!(cache.get(&digests[2]).await.is_some());
}

#[tokio::test]
async fn clear_by_actual_model() {
    let dir = TempDir::new().unwrap();
    let (cache, _) = seeded(&dir).await;

    // "gpt-4o" also matches "gpt-4o-mini"
    assert_eq!(cache.clear(Some("gpt-4o")).await.unwrap(), 2);
    assert_eq!(cache.len().await.unwrap(), 1);
}

#[tokio::test]
async fn clear_by_digest_prefix() {
    let dir = TempDir::new().unwrap();
    let (cache, digests) = seeded(&dir).await;

    let removed = cache.clear(Some(digests[1].short())).await.unwrap();
    assert_eq!(removed, 1);
    assert!(cache.get(&digests[1]).await.is_none());
}

#[tokio::test]
async fn filtered_clear_keeps_corrupt_entries() {
    let dir = TempDir::new().unwrap();
    let (cache, _) = seeded(&dir).await;
    let broken = key_for(&descriptor("broken"));
    std::fs::write(dir.path().join(broken.file_name()), b"garbage").unwrap();

    assert_eq!(cache.clear(Some("no-such-thing")).await.unwrap(), 0);
    assert_eq!(cache.len().await.unwrap(), 4);

    assert_eq!(cache.clear(None).await.unwrap(), 4);
}

#[tokio::test]
async fn unrelated_files_are_ignored() {
    let dir = TempDir::new().unwrap();
    let (cache, _) = seeded(&dir).await;
    std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

    assert_eq!(cache.len().await.unwrap(), 3);
    cache.clear(None).await.unwrap();
    assert!(dir.path().join("notes.txt").exists());
}
