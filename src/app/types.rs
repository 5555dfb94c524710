use serde::{Deserialize, Serialize};

/// Stable id the platform assigns to a finger for the lifetime of its contact.
pub type PointerId = u32;

/// One recorded sample of a finger trace.
///
/// `x` is already mirrored (`screen_width - raw_x`) because the surface is
/// touched from the back of the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub x: f32,
    pub y: f32,
    pub t_ms: i64,
    pub orientation_rad: f32,
    pub velocity: f32,
}

/// Raw, unmirrored position of one pointer at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerSample {
    pub pointer_id: PointerId,
    pub x: f32,
    pub y: f32,
    pub t_ms: i64,
    pub orientation_rad: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerAction {
    Down,
    Move,
    Up,
    Cancel,
}

/// Framework-independent pointer event.
///
/// `Down`, `Up` and `Cancel` carry exactly the sample of the pointer that
/// changed. `Move` carries every tracked pointer, historical samples first,
/// in the order the platform batched them.
#[derive(Clone, Debug, PartialEq)]
pub struct PointerEvent {
    pub action: PointerAction,
    pub samples: Vec<PointerSample>,
}

impl PointerEvent {
    pub fn down(sample: PointerSample) -> Self {
        Self {
            action: PointerAction::Down,
            samples: vec![sample],
        }
    }

    pub fn moved(samples: Vec<PointerSample>) -> Self {
        Self {
            action: PointerAction::Move,
            samples,
        }
    }

    pub fn up(sample: PointerSample) -> Self {
        Self {
            action: PointerAction::Up,
            samples: vec![sample],
        }
    }

    pub fn cancel(sample: PointerSample) -> Self {
        Self {
            action: PointerAction::Cancel,
            samples: vec![sample],
        }
    }

    pub(crate) fn primary(&self) -> Option<&PointerSample> {
        self.samples.first()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    #[default]
    Gesture,
    Selection,
}

/// Direction of the valid trace relative to its first point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// No valid trace in the session.
    NoTrace,
    /// Start and end are closer than the click threshold.
    Click,
    Toward {
        /// Counter-clockwise from the positive x axis, in `[0, 360)`.
        angle_deg: i32,
        /// Signed horizontal travel scaled to the reference width.
        distance: i32,
    },
}

impl Direction {
    pub const CLICK_SENTINEL: i32 = -1;
    pub const NO_TRACE_SENTINEL: i32 = -2;

    /// Angle in the legacy sentinel encoding (`-1` click, `-2` no trace).
    pub fn angle(self) -> i32 {
        match self {
            Self::NoTrace => Self::NO_TRACE_SENTINEL,
            Self::Click => Self::CLICK_SENTINEL,
            Self::Toward { angle_deg, .. } => angle_deg,
        }
    }

    /// Distance in the legacy sentinel encoding (`-1` click, `-2` no trace).
    pub fn distance(self) -> i32 {
        match self {
            Self::NoTrace => Self::NO_TRACE_SENTINEL,
            Self::Click => Self::CLICK_SENTINEL,
            Self::Toward { distance, .. } => distance,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEvent {
    /// First finger touched down; a new gesture session began.
    GestureStarted,
    /// Last finger lifted in gesture mode with a usable valid trace.
    GestureFinished { points: Vec<TouchPoint> },
    /// Continuous direction feedback while moving in selection mode.
    DirectionHeard(Direction),
    /// Last finger lifted in selection mode.
    DirectionConfirmed(Direction),
    /// No new point arrived for longer than the stop gap.
    GestureStopped,
}

impl CaptureEvent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::GestureStarted => "start",
            Self::GestureFinished { .. } => "finished",
            Self::DirectionHeard(_) => "heard",
            Self::DirectionConfirmed(_) => "confirmed",
            Self::GestureStopped => "stopped",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub word: String,
    pub score: f64,
}

/// Decoder output in rank order. Never mutated after receipt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateList {
    candidates: Vec<Candidate>,
}

impl CandidateList {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: words
                .into_iter()
                .map(|word| Candidate {
                    word: word.into(),
                    score: 0.0,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(|c| c.word.as_str())
    }

    pub fn truncated(&self, max: usize) -> Self {
        Self {
            candidates: self.candidates.iter().take(max).cloned().collect(),
        }
    }
}
