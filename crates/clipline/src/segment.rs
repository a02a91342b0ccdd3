//! Time range to cut out of the fetched media.

use serde::{Deserialize, Serialize};

use crate::error::StageFailure;

/// Length of the segment used when no analysis is configured.
pub const FALLBACK_SEGMENT_SECS: f64 = 15.0;

/// What the analyzer picked, as returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub summary: String,
}

/// A validated, non-empty `[start, end)` range in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    start: f64,
    end: f64,
}

impl Segment {
    /// Validates raw bounds. Both must be finite, `start >= 0` and
    /// `end > start`.
    pub fn new(start: f64, end: f64) -> Result<Self, StageFailure> {
        if !start.is_finite() || !end.is_finite() {
            return Err(StageFailure::InvalidSegment(format!(
                "bounds must be finite (start={}, end={})",
                start, end
            )));
        }
        if start < 0.0 {
            return Err(StageFailure::InvalidSegment(format!(
                "start {} is negative",
                start
            )));
        }
        if end <= start {
            return Err(StageFailure::InvalidSegment(format!(
                "end {} is not after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// `[0, 15)`.
    pub fn fallback() -> Self {
        Self {
            start: 0.0,
            end: FALLBACK_SEGMENT_SECS,
        }
    }

    pub fn from_highlight(highlight: &Highlight) -> Result<Self, StageFailure> {
        Self::new(highlight.start, highlight.end)
    }

    /// Restricts the segment to `[0, duration)`. Unknown duration leaves it
    /// unchanged; a segment that starts at or past the end of the media is
    /// rejected.
    pub fn clamp_to(self, duration: Option<f64>) -> Result<Self, StageFailure> {
        let Some(duration) = duration.filter(|d| d.is_finite() && *d > 0.0) else {
            return Ok(self);
        };
        if self.start >= duration {
            return Err(StageFailure::InvalidSegment(format!(
                "segment starts at {}s but the media is only {}s long",
                self.start, duration
            )));
        }
        Ok(Self {
            start: self.start,
            end: self.end.min(duration),
        })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}
