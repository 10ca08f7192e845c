use super::*;
use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

struct CountingFetcher {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingFetcher {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ThumbnailFetcher for CountingFetcher {
    fn fetch(&self, reference: &str) -> crate::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        if reference.contains("missing") {
            return Err(crate::Error::PermanentResolution("HTTP 404".into()));
        }
        Ok(reference.as_bytes().to_vec())
    }
}

#[test]
fn cache_key_is_stable_hex() {
    let k = cache_key("https://i.example/a.jpg");
    assert_eq!(k.len(), 64);
    assert!(k.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(k, cache_key("https://i.example/a.jpg"));
    assert_ne!(k, cache_key("https://i.example/b.jpg"));
}

#[test]
fn concurrent_fetches_for_same_key_are_coalesced() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = CountingFetcher::new(Duration::from_millis(150));
    let cache = ThumbnailCache::open(dir.path(), 16, fetcher.clone()).unwrap();

    const N: usize = 8;
    let gate = Arc::new(Barrier::new(N));
    let handles: Vec<_> = (0..N)
        .map(|_| {
            let cache = cache.clone();
            let gate = gate.clone();
            thread::spawn(move || {
                gate.wait();
                cache.fetch("https://i.example/shared.jpg")
            })
        })
        .collect();

    let results: Vec<Thumbnail> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(fetcher.calls(), 1);
    assert!(results.iter().all(|r| *r == results[0]));
    assert_eq!(results[0].bytes(), Some("https://i.example/shared.jpg".as_bytes()));
}

#[test]
fn cached_entries_are_served_from_memory_and_disk() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = CountingFetcher::new(Duration::ZERO);
    let cache = ThumbnailCache::open(dir.path(), 4, fetcher.clone()).unwrap();

    let first = cache.fetch("ref-a");
    let second = cache.fetch("ref-a");
    assert_eq!(first, second);
    assert_eq!(fetcher.calls(), 1);
    assert!(dir.path().join(cache_key("ref-a")).is_file());
    assert!(cache.peek("ref-a").is_some());

    // A fresh cache over the same directory reuses the file.
    let fetcher2 = CountingFetcher::new(Duration::ZERO);
    let cache2 = ThumbnailCache::open(dir.path(), 4, fetcher2.clone()).unwrap();
    assert_eq!(cache2.fetch("ref-a"), first);
    assert_eq!(fetcher2.calls(), 0);
}

#[test]
fn failed_fetch_yields_unavailable_and_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = CountingFetcher::new(Duration::ZERO);
    let cache = ThumbnailCache::open(dir.path(), 4, fetcher.clone()).unwrap();

    assert_eq!(cache.fetch("missing-thumb"), Thumbnail::Unavailable);
    assert_eq!(cache.fetch("missing-thumb"), Thumbnail::Unavailable);
    assert_eq!(fetcher.calls(), 2);
    assert!(cache.is_empty());
}

#[test]
fn least_recently_used_entry_is_evicted_with_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = CountingFetcher::new(Duration::ZERO);
    let cache = ThumbnailCache::open(dir.path(), 2, fetcher).unwrap();

    cache.fetch("a");
    cache.fetch("b");
    cache.fetch("a"); // touch a, b is now oldest
    cache.fetch("c");

    assert_eq!(cache.len(), 2);
    assert!(cache.peek("a").is_some());
    assert!(cache.peek("b").is_none());
    assert!(!dir.path().join(cache_key("b")).exists());
    assert!(dir.path().join(cache_key("c")).exists());
}

#[test]
fn clear_removes_files_and_orphans() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("orphan-from-crash"), b"x").unwrap();
    let cache = ThumbnailCache::open(dir.path(), 4, CountingFetcher::new(Duration::ZERO)).unwrap();

    assert_eq!(cache.prune_orphans(), 1);
    cache.fetch("a");
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// Panics on its first call, after signalling that it has started.
struct PanickingOnceFetcher {
    calls: AtomicUsize,
    entered: crossbeam_channel::Sender<()>,
}

impl ThumbnailFetcher for PanickingOnceFetcher {
    fn fetch(&self, reference: &str) -> crate::Result<Vec<u8>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let _ = self.entered.send(());
            thread::sleep(Duration::from_millis(150));
            panic!("fetcher blew up");
        }
        Ok(reference.as_bytes().to_vec())
    }
}

#[test]
fn panicking_fetch_releases_waiters_and_the_key() {
    let dir = tempfile::tempdir().unwrap();
    let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
    let fetcher = Arc::new(PanickingOnceFetcher {
        calls: AtomicUsize::new(0),
        entered: entered_tx,
    });
    let cache = ThumbnailCache::open(dir.path(), 4, fetcher).unwrap();
    let reference = "https://i.example/boom.jpg";

    let leader = {
        let cache = cache.clone();
        thread::spawn(move || cache.fetch(reference))
    };
    entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    {
        let cache = cache.clone();
        thread::spawn(move || {
            let _ = done_tx.send(cache.fetch(reference));
        });
    }

    assert!(leader.join().is_err());
    let waited = done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(matches!(waited, Thumbnail::Unavailable | Thumbnail::Image(_)));

    assert_eq!(cache.fetch(reference).bytes(), Some(reference.as_bytes()));
    assert_eq!(cache.len(), 1);
}
