//! Recognition invoker
//!
//! Owns the lifecycle of the external text-recognition engine. Construction is
//! slow (language data has to be loaded) so it happens once, on demand, and
//! concurrent callers share the same construction.

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::capture::RasterSample;
use crate::error::RecognitionError;

/// Raw engine answer
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub text: String,
    /// Opaque 0..100 quality score
    pub confidence: f32,
}

/// Result of one recognition invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub text: String,
    /// 0..100
    pub confidence: f32,
    pub processing_time_ms: u64,
}

/// A constructed recognition engine
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Recognize text in an image
    async fn recognize(&self, image: &RgbaImage) -> Result<EngineOutput, RecognitionError>;

    /// Release engine resources
    async fn shutdown(&self) {}
}

/// Builds recognition engines
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Engine name for logging
    fn name(&self) -> &str;

    /// Construct an engine; may take seconds
    async fn create(&self) -> Result<Arc<dyn RecognitionEngine>, RecognitionError>;
}

/// Recognition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Path or name of the tesseract executable
    pub tesseract_path: String,
    /// Tesseract language code
    pub language: String,
    /// Tesseract page segmentation mode
    pub page_seg_mode: u8,
    /// Maximum time for a single invocation
    pub timeout_secs: u64,
    /// Results below this confidence are not looked up
    pub min_confidence: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".to_string(),
            language: "eng".to_string(),
            page_seg_mode: 3,
            timeout_secs: 30,
            min_confidence: 30.0,
        }
    }
}

/// Lazily constructs the engine and serializes invocations
pub struct RecognitionInvoker {
    factory: Arc<dyn EngineFactory>,
    /// Held across construction so concurrent initializers wait for one build
    engine: Mutex<Option<Arc<dyn RecognitionEngine>>>,
    /// One invocation at a time
    invoke_lock: Mutex<()>,
}

impl RecognitionInvoker {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            engine: Mutex::new(None),
            invoke_lock: Mutex::new(()),
        }
    }

    /// Construct the engine if needed
    ///
    /// A failed construction is not remembered; the next call tries again.
    pub async fn initialize(&self) -> Result<Arc<dyn RecognitionEngine>, RecognitionError> {
        let mut slot = self.engine.lock().await;
        if let Some(engine) = slot.as_ref() {
            return Ok(engine.clone());
        }

        info!("Initializing {} recognition engine", self.factory.name());
        let start = Instant::now();
        let engine = self.factory.create().await.map_err(|e| {
            warn!("Failed to initialize {}: {}", self.factory.name(), e);
            match e {
                RecognitionError::InvalidImage(msg) => RecognitionError::EngineUnavailable(msg),
                unavailable => unavailable,
            }
        })?;
        info!(
            "{} engine ready in {:?}",
            self.factory.name(),
            start.elapsed()
        );

        *slot = Some(engine.clone());
        Ok(engine)
    }

    pub async fn is_initialized(&self) -> bool {
        self.engine.lock().await.is_some()
    }

    /// Recognize text in a raster, initializing the engine first if needed
    pub async fn recognize(&self, raster: &RasterSample) -> Result<RecognitionResult, RecognitionError> {
        if raster.is_empty() {
            return Err(RecognitionError::InvalidImage("raster has no pixels".into()));
        }

        let engine = self.initialize().await?;

        let _guard = self.invoke_lock.lock().await;
        let start = Instant::now();
        let output = engine.recognize(raster.image()).await.map_err(|e| {
            warn!("Recognition failed: {}", e);
            e
        })?;
        let elapsed = start.elapsed();

        debug!(
            "Recognized {} chars at {:.1}% in {:?}",
            output.text.len(),
            output.confidence,
            elapsed
        );

        Ok(RecognitionResult {
            text: output.text,
            confidence: output.confidence.clamp(0.0, 100.0),
            processing_time_ms: elapsed.as_millis() as u64,
        })
    }

    /// Shut the engine down; a later `recognize` starts from scratch
    pub async fn terminate(&self) {
        let engine = self.engine.lock().await.take();
        if let Some(engine) = engine {
            let _guard = self.invoke_lock.lock().await;
            engine.shutdown().await;
            info!("{} engine terminated", self.factory.name());
        }
    }
}
