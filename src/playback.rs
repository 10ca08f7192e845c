//! Single-session playback: states, the session record, the sink boundary
//! and the controller that drives them.

mod controller;
#[cfg(feature = "rodio-sink")]
mod rodio_sink;
mod session;
mod sink;
mod state;

pub use controller::{PlaybackController, SinkOutcome};
#[cfg(feature = "rodio-sink")]
pub use rodio_sink::RodioSink;
pub use session::{MAX_SPEED, MIN_SPEED, PlaybackSession, clamp_speed, clamp_volume};
pub use sink::{PlaybackSink, SinkEvent};
pub use state::{PlaybackHandle, PlaybackInfo, PlaybackState};
