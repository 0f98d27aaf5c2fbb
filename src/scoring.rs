//! # Scoring Engine
//! Pure, testable combination of raw factor values and weights into a single
//! bounded impact score with a full per-factor breakdown. No I/O.
//!
//! Error-fallback policy: any factor the provider cannot compute is
//! substituted with the neutral value 0.5, the reason is recorded on the
//! result, and the outcome is marked `Degraded`. The engine never panics and
//! never returns NaN; callers always get a fully-populated `ScoreResult`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ephemeris::{ObservationContext, ReferenceProfile};
use crate::factors::{Factor, FactorProvider};
use crate::weights::WeightVector;

/// Raw value substituted for a factor that could not be computed.
pub const NEUTRAL_VALUE: f64 = 0.5;

/// One row of the factor breakdown: raw value, the weight applied, and the
/// weighted contribution (`raw × weight`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    pub factor: Factor,
    pub raw: f64,
    pub weight: f64,
    pub contribution: f64,
    /// Set when the raw value is a neutral substitution rather than a
    /// computed one.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub substituted: bool,
}

/// Ordered per-factor breakdown, in canonical factor order.
pub type FactorBreakdown = Vec<FactorContribution>;

/// Final scoring output. Immutable; cacheable per (entity, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Impact score in `[0, 1]`.
    pub score: f64,
    pub factors: FactorBreakdown,
    pub computed_at: DateTime<Utc>,
    /// Set when any factor was substituted; describes what was missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Advisory flag passed through from the snapshot; not part of the
    /// weighted sum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mercury_retrograde: Option<bool>,
}

/// Scoring outcome with the degradation visible in the type: `Clean` when
/// every factor computed, `Degraded` when any was substituted.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Clean(ScoreResult),
    Degraded(ScoreResult),
}

impl ScoreOutcome {
    pub fn result(&self) -> &ScoreResult {
        match self {
            ScoreOutcome::Clean(r) | ScoreOutcome::Degraded(r) => r,
        }
    }

    pub fn into_result(self) -> ScoreResult {
        match self {
            ScoreOutcome::Clean(r) | ScoreOutcome::Degraded(r) => r,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ScoreOutcome::Degraded(_))
    }
}

/// Combines factor values and weights into `ScoreResult`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine {
    provider: FactorProvider,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self {
            provider: FactorProvider::new(),
        }
    }

    /// Score an entity for an observation date under the given weights.
    ///
    /// Deterministic for fixed inputs (apart from the `computed_at`
    /// timestamp): the weighted mean runs in canonical factor order over the
    /// factors the weight vector configures.
    pub fn score(
        &self,
        profile: &ReferenceProfile,
        ctx: &ObservationContext,
        weights: &WeightVector,
    ) -> ScoreOutcome {
        let mut breakdown: FactorBreakdown = Vec::with_capacity(weights.len());
        let mut errors: Vec<String> = Vec::new();
        let mut weighted_sum = 0.0;
        let mut weight_used = 0.0;

        for factor in Factor::ALL {
            let Some(weight) = weights.get(factor) else {
                continue; // factor not configured in this vector
            };
            let (raw, substituted) = match self.provider.value_of(factor, profile, ctx) {
                Ok(v) if v.is_finite() => (v.clamp(0.0, 1.0), false),
                Ok(v) => {
                    errors.push(format!("{factor}: non-finite value {v}"));
                    (NEUTRAL_VALUE, true)
                }
                Err(e) => {
                    debug!(factor = %factor, error = %e, "substituting neutral value");
                    errors.push(format!("{factor}: {e}"));
                    (NEUTRAL_VALUE, true)
                }
            };
            let contribution = raw * weight;
            weighted_sum += contribution;
            weight_used += weight;
            breakdown.push(FactorContribution {
                factor,
                raw,
                weight,
                contribution,
                substituted,
            });
        }

        // Weighted mean over the weights actually used; midpoint when the
        // vector configured nothing.
        let score = if weight_used > 0.0 {
            (weighted_sum / weight_used).clamp(0.0, 1.0)
        } else {
            NEUTRAL_VALUE
        };

        let result = ScoreResult {
            score,
            factors: breakdown,
            computed_at: Utc::now(),
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
            mercury_retrograde: ctx
                .snapshot
                .as_ref()
                .and_then(|s| s.mercury_retrograde),
        };

        if result.error.is_some() {
            ScoreOutcome::Degraded(result)
        } else {
            ScoreOutcome::Clean(result)
        }
    }
}
