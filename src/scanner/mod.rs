//! Scan Session
//!
//! Drives the recognition pipeline from a frame source: a periodic sampling
//! loop feeds the presence classifier and the stability tracker, and every
//! stable capture is processed in the background.
//!
//! Consumers read the latest [`TrackerSnapshot`] and receive [`ScanEvent`]s
//! over a channel.

pub mod pipeline;
pub mod session;

pub use pipeline::CardPipeline;
pub use session::{ScanHandle, ScanSession};

use serde::Serialize;

use crate::capture::DetectedRegion;
use crate::catalog::LookupResult;
use crate::vision::{RecognitionResult, TrackingState};

/// Result of processing one capture
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Name extracted and looked up; `lookup` may still be unsuccessful
    Completed {
        recognition: RecognitionResult,
        name: String,
        lookup: LookupResult,
    },
    /// Another capture is still being processed
    AlreadyInProgress,
    /// The capture had no pixels
    InvalidCapture,
    /// The recognition engine could not be built or failed
    RecognitionFailed(String),
    /// Text came back below the confidence floor
    LowConfidence(RecognitionResult),
    /// No valid name in the recognized text
    NoCandidate(RecognitionResult),
}

/// Notifications delivered to the consumer
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A card entered the detection zone
    Detected,
    /// A card was captured and handed to the pipeline
    Captured { region: DetectedRegion },
    /// The card left before it was captured
    CardLost,
    /// Ready for the next card
    Rearmed,
    /// Processing of a capture finished
    Processed(ProcessOutcome),
}

/// Latest tracker state for display
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerSnapshot {
    pub state: TrackingState,
    /// Progress towards capture (0.0 - 1.0)
    pub progress: f32,
    /// Detection zone while a card is present
    pub region: Option<DetectedRegion>,
    /// Sampling ticks processed so far
    pub ticks: u64,
}
