// src/lib.rs
// Public library surface for integration tests (and embedding applications).

pub mod cache;
pub mod calendar;
pub mod calibration;
pub mod ephemeris;
pub mod error;
pub mod factors;
pub mod scoring;
pub mod weights;
pub mod zodiac;

// ---- Re-exports for stable public API ----
pub use crate::cache::ResultCache;
pub use crate::calibration::{recalibrate, OutcomeFeedback};
pub use crate::ephemeris::{Body, EphemerisSnapshot, ObservationContext, ReferenceProfile};
pub use crate::error::EngineError;
pub use crate::factors::{Factor, FactorProvider};
pub use crate::scoring::{FactorBreakdown, ScoreOutcome, ScoreResult, ScoringEngine};
pub use crate::weights::{JsonFileStore, WeightRegistry, WeightStore, WeightVector};
pub use crate::zodiac::{Element, Modality, Sign};
