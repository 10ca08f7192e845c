//! Fakes shared by the unit tests: a scriptable media backend and a sink
//! that records every call.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::dispatch::CancelToken;
use crate::error::{Error, Result};
use crate::playback::PlaybackSink;
use crate::resolver::{MediaBackend, StreamFormat, StreamLookup};
use crate::thumbnails::ThumbnailFetcher;
use crate::track::{FormatInfo, ResolvedSource, Track};

pub(crate) fn track(id: &str) -> Track {
    Track::new(id, format!("Track {id}"), format!("https://media.example/{id}")).with_duration(180)
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    pub related: Mutex<Vec<Track>>,
    /// Ids whose resolution fails permanently.
    pub unavailable: Mutex<HashSet<String>>,
}

impl FakeBackend {
    pub fn with_related(related: Vec<Track>) -> Arc<Self> {
        Arc::new(Self {
            related: Mutex::new(related),
            ..Default::default()
        })
    }
}

impl MediaBackend for FakeBackend {
    /// Queries containing "slow" take a while to answer.
    fn search(&self, query: &str, page: usize) -> Result<Vec<Track>> {
        if query.contains("slow") {
            thread::sleep(Duration::from_millis(300));
        }
        Ok((0..3).map(|i| track(&format!("{query}-{page}-{i}"))).collect())
    }

    fn lookup_stream(&self, track: &Track) -> Result<StreamLookup> {
        if self.unavailable.lock().unwrap().contains(track.id.as_str()) {
            return Err(Error::PermanentResolution("video unavailable".into()));
        }
        Ok(StreamLookup::Formats(vec![StreamFormat {
            format_id: "251".into(),
            url: Some(format!("https://cdn.example/{}", track.id)),
            audio_codec: Some("opus".into()),
            video_codec: Some("none".into()),
            audio_bitrate: Some(160.0),
            ..Default::default()
        }]))
    }

    fn download(&self, _track: &Track, _dest: &Path, _token: &CancelToken) -> Result<FormatInfo> {
        Err(Error::Download("downloads disabled in tests".into()))
    }

    fn related_tracks(&self, _seed: Option<&Track>) -> Result<Vec<Track>> {
        Ok(self.related.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SinkCall {
    Open(String),
    Play,
    Pause,
    Stop,
    Seek(f64),
    Speed(f64),
    Volume(f64),
}

/// Clones share the call log.
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
    fail_play: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn last_seek(&self) -> Option<f64> {
        self.calls().iter().rev().find_map(|c| match c {
            SinkCall::Seek(s) => Some(*s),
            _ => None,
        })
    }

    pub fn opened(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Open(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn fail_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PlaybackSink for RecordingSink {
    fn open(&mut self, source: &ResolvedSource) -> Result<()> {
        self.record(SinkCall::Open(source.locator.clone()));
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.record(SinkCall::Play);
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(Error::SinkPlayback("device lost".into()));
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.record(SinkCall::Pause);
        Ok(())
    }

    fn stop(&mut self) {
        self.record(SinkCall::Stop);
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.record(SinkCall::Seek(seconds));
        Ok(())
    }

    fn set_speed(&mut self, speed: f64) -> Result<()> {
        self.record(SinkCall::Speed(speed));
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) -> Result<()> {
        self.record(SinkCall::Volume(volume));
        Ok(())
    }
}

/// Serves the reference itself as the image bytes.
pub(crate) struct EchoFetcher;

impl ThumbnailFetcher for EchoFetcher {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        Ok(reference.as_bytes().to_vec())
    }
}
