use super::*;
use crate::track::SourceKind;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn fmt(id: &str, acodec: &str, vcodec: &str, abr: Option<f64>, tbr: Option<f64>) -> StreamFormat {
    StreamFormat {
        format_id: id.into(),
        url: Some(format!("https://cdn.example/{id}")),
        audio_codec: Some(acodec.into()),
        video_codec: Some(vcodec.into()),
        audio_bitrate: abr,
        total_bitrate: tbr,
        extension: Some("webm".into()),
        duration_seconds: Some(200.0),
    }
}

#[test]
fn ranking_prefers_audio_only_then_bitrate_then_id() {
    let formats = vec![
        fmt("18", "mp4a", "avc1", Some(320.0), None),
        fmt("250", "opus", "none", Some(70.0), None),
        fmt("251", "opus", "none", Some(160.0), None),
        fmt("140", "mp4a", "none", Some(160.0), None),
    ];
    assert_eq!(best_audio_format(&formats).unwrap().format_id, "140");
}

#[test]
fn ranking_falls_back_to_muxed_and_total_bitrate() {
    let formats = vec![
        fmt("18", "mp4a", "avc1", None, Some(500.0)),
        fmt("22", "mp4a", "avc1", None, Some(900.0)),
        fmt("137", "none", "avc1", None, Some(4000.0)),
    ];
    assert_eq!(best_audio_format(&formats).unwrap().format_id, "22");
}

#[test]
fn ranking_skips_formats_without_url() {
    let mut only = fmt("251", "opus", "none", Some(160.0), None);
    only.url = None;
    assert!(best_audio_format(&[only]).is_none());
    assert!(best_audio_format(&[]).is_none());
}

#[test]
fn backoff_doubles_and_caps() {
    let base = Duration::from_millis(100);
    assert_eq!(backoff_for(base, 0), Duration::from_millis(100));
    assert_eq!(backoff_for(base, 2), Duration::from_millis(400));
    assert_eq!(backoff_for(base, 30), Duration::from_secs(8));
}

/// Backend whose lookups and downloads follow a script.
#[derive(Default)]
struct Scripted {
    lookups: Mutex<VecDeque<Result<StreamLookup>>>,
    downloads: Mutex<VecDeque<Result<()>>>,
    lookup_calls: AtomicUsize,
    download_calls: AtomicUsize,
    seen_dest: Mutex<Vec<std::path::PathBuf>>,
}

impl MediaBackend for Scripted {
    fn search(&self, query: &str, _page: usize) -> Result<Vec<Track>> {
        Ok(vec![Track::new(query, query, query), Track::new("", "blank", "x")])
    }

    fn lookup_stream(&self, _track: &Track) -> Result<StreamLookup> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.lookups
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(StreamLookup::NoStream))
    }

    fn download(&self, _track: &Track, dest: &Path, _token: &CancelToken) -> Result<FormatInfo> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_dest.lock().unwrap().push(dest.to_path_buf());
        std::fs::write(dest, b"partial audio").unwrap();
        self.downloads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
            .map(|_| FormatInfo {
                extension: Some("m4a".into()),
                ..FormatInfo::default()
            })
    }

    fn related_tracks(&self, _seed: Option<&Track>) -> Result<Vec<Track>> {
        Err(Error::TransientNetwork("flaky".into()))
    }
}

fn resolver(backend: Arc<Scripted>, dir: &Path) -> TrackResolver {
    TrackResolver::new(
        backend,
        ResolverPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(1),
            download_retries: 1,
            download_dir: dir.to_path_buf(),
        },
    )
}

fn track() -> Track {
    Track::new("abc", "Song", "https://video.example/abc").with_duration(200)
}

#[test]
fn resolve_prefers_stream_locator() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(Scripted::default());
    backend.lookups.lock().unwrap().push_back(Ok(StreamLookup::Formats(vec![fmt(
        "251", "opus", "none", Some(160.0), None,
    )])));

    let src = resolver(backend.clone(), dir.path())
        .resolve(&track(), &CancelToken::new())
        .unwrap();
    assert_eq!(src.kind, SourceKind::Stream);
    assert_eq!(src.locator, "https://cdn.example/251");
    assert_eq!(src.format.format_id.as_deref(), Some("251"));
    assert_eq!(backend.download_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn resolve_retries_transient_lookup_failures() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(Scripted::default());
    {
        let mut l = backend.lookups.lock().unwrap();
        l.push_back(Err(Error::TransientNetwork("timeout".into())));
        l.push_back(Err(Error::TransientNetwork("timeout".into())));
        l.push_back(Ok(StreamLookup::Formats(vec![fmt("140", "mp4a", "none", Some(128.0), None)])));
    }
    let src = resolver(backend.clone(), dir.path())
        .resolve(&track(), &CancelToken::new())
        .unwrap();
    assert_eq!(src.kind, SourceKind::Stream);
    assert_eq!(backend.lookup_calls.load(Ordering::SeqCst), 3);
}

#[test]
fn resolve_gives_up_after_bounded_retries() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(Scripted::default());
    for _ in 0..5 {
        backend
            .lookups
            .lock()
            .unwrap()
            .push_back(Err(Error::TransientNetwork("timeout".into())));
    }
    let err = resolver(backend.clone(), dir.path())
        .resolve(&track(), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::TransientNetwork(_)));
    assert_eq!(backend.lookup_calls.load(Ordering::SeqCst), 3);
}

#[test]
fn permanent_failures_are_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(Scripted::default());
    backend
        .lookups
        .lock()
        .unwrap()
        .push_back(Err(Error::PermanentResolution("video unavailable".into())));
    let err = resolver(backend.clone(), dir.path())
        .resolve(&track(), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::PermanentResolution(_)));
    assert_eq!(backend.lookup_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.download_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn no_stream_falls_back_to_download_and_file_dies_with_source() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(Scripted::default());
    let src = resolver(backend.clone(), dir.path())
        .resolve(&track(), &CancelToken::new())
        .unwrap();

    assert_eq!(src.kind, SourceKind::LocalFile);
    let path = src.local_path().unwrap().to_path_buf();
    assert!(path.starts_with(dir.path()));
    assert_eq!(std::fs::read(&path).unwrap(), b"partial audio");
    assert_eq!(src.format.extension.as_deref(), Some("m4a"));

    drop(src);
    assert!(!path.exists());
}

#[test]
fn failed_download_is_retried_once_then_partial_files_removed() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(Scripted::default());
    {
        let mut d = backend.downloads.lock().unwrap();
        d.push_back(Err(Error::Download("connection dropped".into())));
        d.push_back(Err(Error::Download("connection dropped".into())));
    }
    let err = resolver(backend.clone(), dir.path())
        .resolve(&track(), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::Download(_)));
    assert_eq!(backend.download_calls.load(Ordering::SeqCst), 2);
    for p in backend.seen_dest.lock().unwrap().iter() {
        assert!(!p.exists(), "partial file left behind: {}", p.display());
    }
}

#[test]
fn download_retries_follow_the_retryable_classification() {
    assert!(Error::TransientNetwork("reset".into()).is_retryable());
    assert!(Error::Download("short read".into()).is_retryable());
    assert!(!Error::PermanentResolution("private".into()).is_retryable());

    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(Scripted::default());
    backend
        .downloads
        .lock()
        .unwrap()
        .push_back(Err(Error::TransientNetwork("reset".into())));
    let src = resolver(backend.clone(), dir.path())
        .resolve(&track(), &CancelToken::new())
        .unwrap();
    assert_eq!(src.kind, SourceKind::LocalFile);
    assert_eq!(backend.download_calls.load(Ordering::SeqCst), 2);

    let backend = Arc::new(Scripted::default());
    backend
        .downloads
        .lock()
        .unwrap()
        .push_back(Err(Error::PermanentResolution("private".into())));
    let err = resolver(backend.clone(), dir.path())
        .resolve(&track(), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::PermanentResolution(_)));
    assert_eq!(backend.download_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn cancelled_before_start_does_no_network_work() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(Scripted::default());
    let token = CancelToken::new();
    token.cancel();
    let err = resolver(backend.clone(), dir.path())
        .resolve(&track(), &token)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(backend.lookup_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn search_and_related_filter_and_retry() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(Scripted::default());
    let r = resolver(backend, dir.path());

    let found = r.search("lofi", 0, &CancelToken::new()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id.as_str(), "lofi");

    let err = r.related(None, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, Error::TransientNetwork(_)));
}
