//! Capture processing pipeline
//!
//! enhance -> recognize -> extract name -> look up, strictly in that order.
//! Only one capture is processed at a time; a trigger that arrives while one
//! is outstanding is rejected, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ProcessOutcome;
use crate::catalog::LookupOrchestrator;
use crate::text::{extract_card_name, NameRules};
use crate::vision::{EnhanceInput, EnhanceOptions, EnhancementStage, RecognitionInvoker};

/// Clears the processing flag when the run ends, however it ends
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct CardPipeline {
    enhancer: EnhancementStage,
    options: EnhanceOptions,
    recognizer: Arc<RecognitionInvoker>,
    lookup: Arc<LookupOrchestrator>,
    rules: NameRules,
    min_confidence: f32,
    processing: AtomicBool,
}

impl CardPipeline {
    pub fn new(
        enhancer: EnhancementStage,
        recognizer: Arc<RecognitionInvoker>,
        lookup: Arc<LookupOrchestrator>,
        rules: NameRules,
        min_confidence: f32,
    ) -> Self {
        Self {
            enhancer,
            options: EnhanceOptions::default(),
            recognizer,
            lookup,
            rules,
            min_confidence,
            processing: AtomicBool::new(false),
        }
    }

    pub fn with_options(mut self, options: EnhanceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    pub fn recognizer(&self) -> &Arc<RecognitionInvoker> {
        &self.recognizer
    }

    pub fn lookup(&self) -> &Arc<LookupOrchestrator> {
        &self.lookup
    }

    /// Run one capture through the whole pipeline
    pub async fn process(&self, input: EnhanceInput<'_>) -> ProcessOutcome {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Capture ignored, processing already in progress");
            return ProcessOutcome::AlreadyInProgress;
        }
        let _guard = ProcessingGuard(&self.processing);

        let Some(enhanced) = self.enhancer.process(input, &self.options) else {
            warn!("Captured raster is empty");
            return ProcessOutcome::InvalidCapture;
        };

        let recognition = match self.recognizer.recognize(&enhanced.raster).await {
            Ok(result) => result,
            Err(e) => return ProcessOutcome::RecognitionFailed(e.to_string()),
        };
        debug!(
            "Recognized {:?} ({:.1}%, {} ms)",
            recognition.text, recognition.confidence, recognition.processing_time_ms
        );

        if recognition.confidence < self.min_confidence {
            info!(
                "Recognition confidence {:.1}% below {:.1}%",
                recognition.confidence, self.min_confidence
            );
            return ProcessOutcome::LowConfidence(recognition);
        }

        let Some(name) = extract_card_name(&recognition.text, &self.rules) else {
            info!("No card name in recognized text");
            return ProcessOutcome::NoCandidate(recognition);
        };

        info!("Looking up {:?}", name);
        let lookup = self.lookup.lookup(&name).await;
        ProcessOutcome::Completed {
            recognition,
            name,
            lookup,
        }
    }
}
