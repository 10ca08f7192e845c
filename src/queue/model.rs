//! Small queue types.

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RepeatMode {
    /// Stop (or refill) at the end of the queue.
    #[default]
    Off,
    /// Wrap around to the start of the queue.
    All,
    /// Repeat the current track when it ends naturally.
    One,
}

impl RepeatMode {
    pub fn cycle(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::All => "all",
            Self::One => "one",
        }
    }
}

/// Why the queue is being asked for the next track.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdvanceReason {
    /// The current track played to the end.
    TrackEnded,
    /// The user skipped.
    Skip,
}
