//! Vision Layer
//!
//! Decides when a card is in front of the camera and turns the captured card
//! into text:
//! - presence classification over the downscaled zone sample
//! - the stability state machine that triggers a capture
//! - enhancement of the captured raster for text recognition
//! - the recognition engine lifecycle (Tesseract by default)

pub mod enhance;
pub mod presence;
pub mod recognition;
pub mod tesseract;
pub mod tracker;

pub use enhance::{
    otsu_threshold, EnhanceInput, EnhanceOptions, EnhancementConfig, EnhancementOutput,
    EnhancementStage, NameRegion,
};
pub use presence::{PresenceAssessment, PresenceScores, PresenceThresholds};
pub use recognition::{
    EngineFactory, EngineOutput, RecognitionConfig, RecognitionEngine, RecognitionInvoker,
    RecognitionResult,
};
pub use tesseract::{TesseractEngine, TesseractFactory};
pub use tracker::{StabilityTracker, TrackerConfig, TrackerEvent, TrackerUpdate, TrackingState};
