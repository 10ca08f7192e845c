//! Local-file playback sink backed by `rodio`.
//!
//! The output stream is not `Send`, so it lives on a dedicated audio thread
//! that owns the `rodio::Sink`; [`RodioSink`] only forwards commands to it.
//! The thread reports position ticks while playing and `EndOfMedia` once the
//! sink drains.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rodio::{Decoder, OutputStreamBuilder, Sink};

use crate::error::{Error, Result};
use crate::track::{ResolvedSource, SourceKind};

use super::{PlaybackSink, SinkEvent};

const TICK: Duration = Duration::from_millis(250);

#[derive(Debug)]
enum SinkCmd {
    Open(PathBuf),
    Play,
    Pause,
    Stop,
    Seek(f64),
    Speed(f64),
    Volume(f64),
    Quit,
}

pub struct RodioSink {
    tx: Sender<SinkCmd>,
    join: Option<JoinHandle<()>>,
}

impl RodioSink {
    /// Start the audio thread. Status goes to `events`.
    pub fn new(events: crossbeam_channel::Sender<SinkEvent>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<SinkCmd>();
        let join = thread::Builder::new()
            .name("cadenza-audio".to_string())
            .spawn(move || audio_thread(rx, events))
            .map_err(|e| Error::SinkPlayback(format!("cannot start audio thread: {e}")))?;
        Ok(Self { tx, join: Some(join) })
    }

    fn send(&self, cmd: SinkCmd) -> Result<()> {
        self.tx
            .send(cmd)
            .map_err(|_| Error::SinkPlayback("audio thread is gone".to_string()))
    }
}

impl PlaybackSink for RodioSink {
    fn open(&mut self, source: &ResolvedSource) -> Result<()> {
        match (source.kind, source.local_path()) {
            (SourceKind::LocalFile, Some(path)) => self.send(SinkCmd::Open(path.to_path_buf())),
            _ => Err(Error::SinkPlayback(
                "only local files can be played by this sink".to_string(),
            )),
        }
    }

    fn play(&mut self) -> Result<()> {
        self.send(SinkCmd::Play)
    }

    fn pause(&mut self) -> Result<()> {
        self.send(SinkCmd::Pause)
    }

    fn stop(&mut self) {
        let _ = self.send(SinkCmd::Stop);
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.send(SinkCmd::Seek(seconds))
    }

    fn set_speed(&mut self, speed: f64) -> Result<()> {
        self.send(SinkCmd::Speed(speed))
    }

    fn set_volume(&mut self, volume: f64) -> Result<()> {
        self.send(SinkCmd::Volume(volume))
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        let _ = self.tx.send(SinkCmd::Quit);
        if let Some(h) = self.join.take() {
            let _ = h.join();
        }
    }
}

fn audio_thread(rx: Receiver<SinkCmd>, events: crossbeam_channel::Sender<SinkEvent>) {
    let mut stream = match OutputStreamBuilder::open_default_stream() {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "no audio output device");
            let _ = events.send(SinkEvent::Error(format!("no audio output device: {e}")));
            // Keep draining commands so callers never block on a dead channel.
            while let Ok(cmd) = rx.recv() {
                if matches!(cmd, SinkCmd::Quit) {
                    break;
                }
                if let SinkCmd::Open(_) = cmd {
                    let _ = events.send(SinkEvent::Error("no audio output device".to_string()));
                }
            }
            return;
        }
    };
    // rodio logs to stderr when the stream is dropped.
    stream.log_on_drop(false);

    let mut sink: Option<Sink> = None;
    let mut playing = false;
    let mut ended = false;

    loop {
        match rx.recv_timeout(TICK) {
            Ok(SinkCmd::Open(path)) => {
                if let Some(old) = sink.take() {
                    old.stop();
                }
                playing = false;
                ended = false;
                match open_paused(&stream, &path) {
                    Ok(new_sink) => {
                        sink = Some(new_sink);
                        let _ = events.send(SinkEvent::Ready);
                    }
                    Err(msg) => {
                        let _ = events.send(SinkEvent::Error(msg));
                    }
                }
            }
            Ok(SinkCmd::Play) => {
                if let Some(s) = sink.as_ref() {
                    s.play();
                    playing = true;
                }
            }
            Ok(SinkCmd::Pause) => {
                if let Some(s) = sink.as_ref() {
                    s.pause();
                    playing = false;
                }
            }
            Ok(SinkCmd::Stop) => {
                if let Some(s) = sink.take() {
                    s.stop();
                }
                playing = false;
            }
            Ok(SinkCmd::Seek(seconds)) => {
                match (sink.as_ref(), Duration::try_from_secs_f64(seconds.max(0.0))) {
                    (Some(s), Ok(to)) => {
                        if let Err(e) = s.try_seek(to) {
                            tracing::warn!(error = %e, seconds, "seek failed");
                        }
                        ended = false;
                    }
                    (_, Err(_)) => {
                        tracing::warn!(seconds, "ignoring seek to an unrepresentable position")
                    }
                    (None, Ok(_)) => {}
                }
            }
            Ok(SinkCmd::Speed(speed)) => {
                if let Some(s) = sink.as_ref() {
                    s.set_speed(speed as f32);
                }
            }
            Ok(SinkCmd::Volume(volume)) => {
                if let Some(s) = sink.as_ref() {
                    s.set_volume(volume as f32);
                }
            }
            Ok(SinkCmd::Quit) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(s) = sink.take() {
                    s.stop();
                }
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let Some(s) = sink.as_ref() else {
            continue;
        };
        if playing && !ended {
            if s.empty() {
                ended = true;
                let _ = events.send(SinkEvent::EndOfMedia);
            } else {
                let _ = events.send(SinkEvent::PositionTick(s.get_pos().as_secs_f64()));
            }
        }
    }
}

fn open_paused(stream: &rodio::OutputStream, path: &Path) -> std::result::Result<Sink, String> {
    let file = File::open(path).map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| format!("cannot decode {}: {e}", path.display()))?;

    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);
    sink.pause();
    Ok(sink)
}
