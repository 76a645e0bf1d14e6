//! Stability tracker
//!
//! Turns the per-tick presence verdicts into capture decisions. The tracker is
//! an explicit state machine advanced by a single [`StabilityTracker::step`]
//! call per sampling tick; the caller supplies the current time, so the same
//! code runs under a real timer and in simulated tests.
//!
//! ```text
//! NoCard --present--> Stabilizing --elapsed >= delay--> Stable --> Cooldown
//!    ^                 |   ^    |                                   |
//!    |                 |   |    +--moving--> Tracking               |
//!    +--absent x N-----+   +------still------+                      |
//!    +--------------- cooldown over AND absent x N -----------------+
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capture::{CaptureZone, FrameSource, RasterSample};
use crate::vision::presence::frame_difference;

/// Stability tracker timing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Continuous presence required before capturing
    pub capture_delay_ms: u64,
    /// Consecutive absent ticks that end an episode or clear the removal gate
    pub debounce_ticks: u32,
    /// Minimum time between a capture and the next detection
    pub cooldown_ms: u64,
    /// Reset the stability timer while the card moves
    pub motion_check: bool,
    /// Mean luminance change between samples above which the card counts as
    /// moving
    pub motion_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            capture_delay_ms: 1200,
            debounce_ticks: 8,
            cooldown_ms: 1500,
            motion_check: true,
            motion_threshold: 30.0,
        }
    }
}

/// Externally visible tracking state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    #[default]
    NoCard,
    Tracking,
    Stabilizing,
    Stable,
    Cooldown,
}

/// Notifications raised by a tracker step
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// A new detection episode started
    Detected,
    /// The card held still long enough; carries the zone raster of the
    /// current frame. Raised once per episode.
    Stable(RasterSample),
    /// The card disappeared before it became stable
    CardLost,
    /// Cooldown finished and the card was removed; ready for the next card
    Rearmed,
}

/// Result of one tracker step
#[derive(Debug, Clone)]
pub struct TrackerUpdate {
    pub state: TrackingState,
    /// Progress towards capture (0.0 - 1.0)
    pub progress: f32,
    pub event: Option<TrackerEvent>,
}

/// Internal phase; each variant carries only the data valid in that phase
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    NoCard,
    Tracking {
        since_ms: u64,
        absent_ticks: u32,
    },
    Stabilizing {
        since_ms: u64,
        absent_ticks: u32,
    },
    Cooldown {
        until_ms: u64,
        absent_ticks: u32,
        awaiting_removal: bool,
    },
}

/// Presence/stability state machine
pub struct StabilityTracker {
    config: TrackerConfig,
    zone: CaptureZone,
    phase: Phase,
    /// Reported state of the latest step
    state: TrackingState,
    progress: f32,
    /// Classifier verdict of the previous tick, the hysteresis input
    was_detecting: bool,
    previous_luma: Option<Vec<u8>>,
    last_capture: Option<RasterSample>,
}

impl StabilityTracker {
    pub fn new(config: TrackerConfig, zone: CaptureZone) -> Self {
        Self {
            config,
            zone,
            phase: Phase::NoCard,
            state: TrackingState::NoCard,
            progress: 0.0,
            was_detecting: false,
            previous_luma: None,
            last_capture: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Previous presence verdict, to be passed to the classifier
    pub fn was_detecting(&self) -> bool {
        self.was_detecting
    }

    /// Raster captured at the most recent stable transition
    pub fn last_capture(&self) -> Option<&RasterSample> {
        self.last_capture.as_ref()
    }

    /// Return to `NoCard` and forget all transient state
    pub fn reset(&mut self) {
        self.phase = Phase::NoCard;
        self.state = TrackingState::NoCard;
        self.progress = 0.0;
        self.was_detecting = false;
        self.previous_luma = None;
        self.last_capture = None;
    }

    /// Advance the state machine by one sampling tick
    ///
    /// * `now_ms` - monotonic time of this tick
    /// * `present` - classifier verdict for this tick
    /// * `sample` - the sample the verdict was computed from, used for the
    ///   frame-to-frame motion check
    /// * `source` - frame source the capture raster is extracted from when the
    ///   card becomes stable
    pub fn step(
        &mut self,
        now_ms: u64,
        present: bool,
        sample: Option<&RasterSample>,
        source: &dyn FrameSource,
    ) -> TrackerUpdate {
        let motion = self.update_motion(sample);
        self.was_detecting = present;

        let (next_phase, state, progress, event) = match self.phase {
            Phase::NoCard => self.step_no_card(now_ms, present),
            Phase::Tracking { since_ms, absent_ticks }
            | Phase::Stabilizing { since_ms, absent_ticks } => {
                self.step_detecting(now_ms, present, since_ms, absent_ticks, motion, source)
            }
            Phase::Cooldown {
                until_ms,
                absent_ticks,
                awaiting_removal,
            } => self.step_cooldown(now_ms, present, until_ms, absent_ticks, awaiting_removal),
        };

        if state != self.state {
            debug!("Tracking state {:?} -> {:?}", self.state, state);
        }

        self.phase = next_phase;
        self.state = state;
        self.progress = progress;

        TrackerUpdate {
            state,
            progress,
            event,
        }
    }

    fn step_no_card(
        &self,
        now_ms: u64,
        present: bool,
    ) -> (Phase, TrackingState, f32, Option<TrackerEvent>) {
        if present {
            debug!("Card detected, stabilizing");
            (
                Phase::Stabilizing {
                    since_ms: now_ms,
                    absent_ticks: 0,
                },
                TrackingState::Stabilizing,
                0.0,
                Some(TrackerEvent::Detected),
            )
        } else {
            (Phase::NoCard, TrackingState::NoCard, 0.0, None)
        }
    }

    fn step_detecting(
        &mut self,
        now_ms: u64,
        present: bool,
        since_ms: u64,
        absent_ticks: u32,
        motion: Option<f32>,
        source: &dyn FrameSource,
    ) -> (Phase, TrackingState, f32, Option<TrackerEvent>) {
        if !present {
            let absent_ticks = absent_ticks + 1;
            if absent_ticks >= self.config.debounce_ticks {
                debug!("Card lost after {} absent ticks", absent_ticks);
                return (Phase::NoCard, TrackingState::NoCard, 0.0, Some(TrackerEvent::CardLost));
            }

            // Hold the current phase while the debounce window runs
            let phase = match self.phase {
                Phase::Tracking { .. } => Phase::Tracking {
                    since_ms,
                    absent_ticks,
                },
                _ => Phase::Stabilizing {
                    since_ms,
                    absent_ticks,
                },
            };
            return (phase, self.state, self.progress, None);
        }

        let moving = self.config.motion_check
            && motion.is_some_and(|diff| diff > self.config.motion_threshold);
        if moving {
            return (
                Phase::Tracking {
                    since_ms: now_ms,
                    absent_ticks: 0,
                },
                TrackingState::Tracking,
                0.0,
                None,
            );
        }

        let elapsed = now_ms.saturating_sub(since_ms);
        let progress = if self.config.capture_delay_ms == 0 {
            1.0
        } else {
            (elapsed as f32 / self.config.capture_delay_ms as f32).min(1.0)
        };

        if elapsed < self.config.capture_delay_ms {
            return (
                Phase::Stabilizing {
                    since_ms,
                    absent_ticks: 0,
                },
                TrackingState::Stabilizing,
                progress,
                None,
            );
        }

        match self.zone.extract(source) {
            Some(raster) => {
                info!(
                    "Card stable after {} ms, captured {}x{} raster",
                    elapsed,
                    raster.width(),
                    raster.height()
                );
                self.last_capture = Some(raster.clone());
                (
                    Phase::Cooldown {
                        until_ms: now_ms + self.config.cooldown_ms,
                        absent_ticks: 0,
                        awaiting_removal: true,
                    },
                    TrackingState::Stable,
                    1.0,
                    Some(TrackerEvent::Stable(raster)),
                )
            }
            None => {
                warn!("Card stable but frame unavailable, retrying capture next tick");
                (
                    Phase::Stabilizing {
                        since_ms,
                        absent_ticks: 0,
                    },
                    TrackingState::Stabilizing,
                    progress,
                    None,
                )
            }
        }
    }

    fn step_cooldown(
        &self,
        now_ms: u64,
        present: bool,
        until_ms: u64,
        absent_ticks: u32,
        awaiting_removal: bool,
    ) -> (Phase, TrackingState, f32, Option<TrackerEvent>) {
        let (absent_ticks, awaiting_removal) = if present {
            (0, awaiting_removal)
        } else {
            let absent_ticks = absent_ticks.saturating_add(1);
            let removed = absent_ticks >= self.config.debounce_ticks;
            (absent_ticks, awaiting_removal && !removed)
        };

        if !awaiting_removal && now_ms >= until_ms {
            debug!("Cooldown finished, ready for the next card");
            return (Phase::NoCard, TrackingState::NoCard, 0.0, Some(TrackerEvent::Rearmed));
        }

        (
            Phase::Cooldown {
                until_ms,
                absent_ticks,
                awaiting_removal,
            },
            TrackingState::Cooldown,
            0.0,
            None,
        )
    }

    /// Store this tick's luminance and return the difference to the previous one
    fn update_motion(&mut self, sample: Option<&RasterSample>) -> Option<f32> {
        let current = sample.map(|s| s.luminance())?;
        let diff = self
            .previous_luma
            .as_deref()
            .and_then(|previous| frame_difference(previous, &current));
        self.previous_luma = Some(current);
        diff
    }
}
