//! Error taxonomy for the scoring core.
//!
//! Pure-compute errors (`InvalidInput`) are programmer errors and fail loudly
//! in tests. Data-availability errors (`MissingFactorData`, `Persistence`)
//! degrade gracefully upstream: the scoring engine substitutes neutral values
//! and the weight registry falls back to defaults. `InvariantViolation` is
//! auto-corrected by normalization and only surfaces as a warning.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or unparseable date/position input. Callers should validate
    /// before invoking the core.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An optional astronomical input was absent. Names the missing piece so
    /// the scoring engine can annotate the degraded result.
    #[error("missing factor data: {what}")]
    MissingFactorData { what: String },

    /// Weight load/save I/O failure. Non-fatal: load falls back to defaults,
    /// save surfaces the failure as a return value.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Weight vector failed the sum-to-1 or bounds check. Corrected via
    /// normalization; reported for diagnostics only.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl EngineError {
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingFactorData { what: what.into() }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
