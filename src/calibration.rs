//! # Weight Calibration
//! Pure adjustment of the weight vector from labeled prediction feedback.
//! No persistence here; the registry decides whether to save the result.
//!
//! Per factor with at least one observation: accuracy = correct/total, the
//! multiplier scales linearly from 0.8 (0% accurate) to 1.2 (100% accurate),
//! the product is clamped to the registry bounds, and the whole vector is
//! renormalized at the end. Factors without observations keep their weight.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::factors::Factor;
use crate::weights::{WeightVector, WEIGHT_CEILING, WEIGHT_FLOOR};

/// One graded prediction outcome, attributed to the factor that drove it.
/// Produced by an external settlement process; ephemeral input only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeFeedback {
    pub was_correct: bool,
    pub factor: Factor,
}

impl OutcomeFeedback {
    pub fn new(factor: Factor, was_correct: bool) -> Self {
        Self {
            was_correct,
            factor,
        }
    }
}

/// Per-factor tally of a feedback batch.
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    correct: u32,
    total: u32,
}

impl Tally {
    fn accuracy(self) -> f64 {
        f64::from(self.correct) / f64::from(self.total)
    }
}

/// Adjustment multiplier for a given accuracy: 0.8 at 0%, 1.0 at 50%,
/// 1.2 at 100%.
pub fn accuracy_multiplier(accuracy: f64) -> f64 {
    0.8 + 0.4 * accuracy.clamp(0.0, 1.0)
}

/// Propose an updated weight vector from a feedback batch. Pure function:
/// an empty batch returns the input unchanged, and factors absent from the
/// batch keep their current weight (pre-normalization).
pub fn recalibrate(current: &WeightVector, feedback: &[OutcomeFeedback]) -> WeightVector {
    if feedback.is_empty() {
        return current.clone();
    }

    let mut tallies: BTreeMap<Factor, Tally> = BTreeMap::new();
    for fb in feedback {
        let t = tallies.entry(fb.factor).or_default();
        t.total += 1;
        if fb.was_correct {
            t.correct += 1;
        }
    }

    let adjusted = WeightVector::from_entries(current.iter().map(|(factor, weight)| {
        let w = match tallies.get(&factor) {
            Some(t) => {
                (weight * accuracy_multiplier(t.accuracy())).clamp(WEIGHT_FLOOR, WEIGHT_CEILING)
            }
            None => weight,
        };
        (factor, w)
    }));

    adjusted.normalized()
}
