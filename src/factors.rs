//! # Factor Provider
//!
//! Computes every raw factor the scoring engine combines: sign compatibility,
//! lunar phase score, the three Sun aspects, and the element/modality balance
//! of the observed sky. All functions here are deterministic and side-effect
//! free.
//!
//! Missing-data policy: when an aspect or balance factor needs a body
//! longitude the snapshot does not carry, the provider raises
//! `MissingFactorData` naming the input. It never substitutes silently; the
//! scoring engine owns the neutral-value fallback.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::ephemeris::{Body, EphemerisSnapshot, ObservationContext, ReferenceProfile};
use crate::error::EngineError;
use crate::zodiac::{compatibility, Sign};

/// Orb (tolerance window) around each exact aspect angle, in degrees.
pub const ASPECT_ORB: f64 = 10.0;

/// Every factor the engine scores, in canonical order. The `Display` names
/// double as persistence keys for the weight store, so they are stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    SignCompatibility,
    PhaseScore,
    AspectSunMars,
    AspectSunJupiter,
    AspectSunSaturn,
    ElementBalance,
    ModalityBalance,
}

impl Factor {
    pub const ALL: [Factor; 7] = [
        Factor::SignCompatibility,
        Factor::PhaseScore,
        Factor::AspectSunMars,
        Factor::AspectSunJupiter,
        Factor::AspectSunSaturn,
        Factor::ElementBalance,
        Factor::ModalityBalance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Factor::SignCompatibility => "sign_compatibility",
            Factor::PhaseScore => "phase_score",
            Factor::AspectSunMars => "aspect_sun_mars",
            Factor::AspectSunJupiter => "aspect_sun_jupiter",
            Factor::AspectSunSaturn => "aspect_sun_saturn",
            Factor::ElementBalance => "element_balance",
            Factor::ModalityBalance => "modality_balance",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Factor {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Factor::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| EngineError::invalid(format!("unknown factor {s:?}")))
    }
}

/// The five classified angular relationship bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Conjunction,
    Sextile,
    Square,
    Trine,
    Opposition,
}

impl Aspect {
    /// Classify an angular separation (degrees, any finite value) into an
    /// aspect band, `None` when outside every ±10° window.
    pub fn classify(separation_deg: f64) -> Option<Aspect> {
        let sep = wrap_separation(separation_deg, 0.0);
        if sep <= ASPECT_ORB {
            Some(Aspect::Conjunction)
        } else if (sep - 60.0).abs() <= ASPECT_ORB {
            Some(Aspect::Sextile)
        } else if (sep - 90.0).abs() <= ASPECT_ORB {
            Some(Aspect::Square)
        } else if (sep - 120.0).abs() <= ASPECT_ORB {
            Some(Aspect::Trine)
        } else if (180.0 - sep).abs() <= ASPECT_ORB {
            Some(Aspect::Opposition)
        } else {
            None
        }
    }

    /// Signed strength in `[-1, 1]`: harmonious aspects positive, hard
    /// aspects negative, sextile mildly positive.
    pub fn strength(self) -> f64 {
        match self {
            Aspect::Conjunction => 1.0,
            Aspect::Trine => 0.8,
            Aspect::Sextile => 0.3,
            Aspect::Square => -0.6,
            Aspect::Opposition => -1.0,
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aspect::Conjunction => "conjunction",
            Aspect::Sextile => "sextile",
            Aspect::Square => "square",
            Aspect::Trine => "trine",
            Aspect::Opposition => "opposition",
        };
        f.write_str(name)
    }
}

/// Absolute angular separation between two circle positions, wrapped to
/// `[0, 180]`.
pub fn angular_separation(lon_a: f64, lon_b: f64) -> f64 {
    wrap_separation(lon_a, lon_b)
}

fn wrap_separation(a: f64, b: f64) -> f64 {
    ((a - b + 180.0).rem_euclid(360.0) - 180.0).abs()
}

/// Signed pairwise relationship strength for two positions: the classified
/// band's strength, 0.0 when no band applies. Symmetric in its arguments.
pub fn pairwise_strength(lon_a: f64, lon_b: f64) -> f64 {
    Aspect::classify(angular_separation(lon_a, lon_b))
        .map(Aspect::strength)
        .unwrap_or(0.0)
}

/// Map a signed aspect strength into score space `[0, 1]`; the no-aspect
/// strength 0.0 lands on the neutral 0.5 midpoint.
pub fn aspect_score(lon_a: f64, lon_b: f64) -> f64 {
    (pairwise_strength(lon_a, lon_b) + 1.0) / 2.0
}

/// Phase score peaking at the cycle extremes (new and full moon) and lowest
/// at the quarter points. `phase` is taken modulo 1. Always in `[0, 1]`.
pub fn phase_score(phase: f64) -> f64 {
    let p = phase.rem_euclid(1.0);
    // Distance to the nearest extreme (0.0 or 0.5), scaled so a quarter
    // point (0.25 or 0.75) scores 0 and an extreme scores 1.
    let dist = (p - 0.5).abs().min(p.min(1.0 - p));
    1.0 - 4.0 * dist
}

/// Balance of importance-weighted body positions across the 4 elements:
/// `1 - mean(|pct - 25|) / 100`. 1.0 for an even spread.
pub fn element_balance(positions: &[(Body, f64)]) -> Result<f64, EngineError> {
    balance_score(positions, 4, |sign| sign.element() as usize)
}

/// Same method across the 3 modalities, equal share 100/3.
pub fn modality_balance(positions: &[(Body, f64)]) -> Result<f64, EngineError> {
    balance_score(positions, 3, |sign| sign.modality() as usize)
}

fn balance_score(
    positions: &[(Body, f64)],
    buckets: usize,
    bucket_of: impl Fn(Sign) -> usize,
) -> Result<f64, EngineError> {
    if positions.is_empty() {
        return Err(EngineError::missing("body positions for balance"));
    }
    let mut counts = vec![0.0f64; buckets];
    let mut total = 0.0f64;
    for &(body, lon) in positions {
        let w = body.importance();
        counts[bucket_of(Sign::from_longitude(lon))] += w;
        total += w;
    }
    let equal_share = 100.0 / buckets as f64;
    let mean_dev = counts
        .iter()
        .map(|&c| (c / total * 100.0 - equal_share).abs())
        .sum::<f64>()
        / buckets as f64;
    Ok((1.0 - mean_dev / 100.0).clamp(0.0, 1.0))
}

/// Stateless provider of raw factor values for a (profile, observation) pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct FactorProvider;

impl FactorProvider {
    pub fn new() -> Self {
        Self
    }

    /// Raw value of a single factor. Sign compatibility and phase score are
    /// always computable; aspects and balances need snapshot longitudes and
    /// raise `MissingFactorData` when one is absent.
    pub fn value_of(
        &self,
        factor: Factor,
        profile: &ReferenceProfile,
        ctx: &ObservationContext,
    ) -> Result<f64, EngineError> {
        match factor {
            Factor::SignCompatibility => Ok(compatibility(profile.sign(), ctx.observed_sign())),
            Factor::PhaseScore => Ok(phase_score(ctx.lunar_phase())),
            Factor::AspectSunMars => self.sun_aspect(ctx, Body::Mars),
            Factor::AspectSunJupiter => self.sun_aspect(ctx, Body::Jupiter),
            Factor::AspectSunSaturn => self.sun_aspect(ctx, Body::Saturn),
            Factor::ElementBalance => element_balance(&self.positions(ctx)?),
            Factor::ModalityBalance => modality_balance(&self.positions(ctx)?),
        }
    }

    /// All factors at once, failing on the first missing input. The scoring
    /// engine prefers `value_of` so it can degrade per factor.
    pub fn compute(
        &self,
        profile: &ReferenceProfile,
        ctx: &ObservationContext,
    ) -> Result<BTreeMap<Factor, f64>, EngineError> {
        let mut out = BTreeMap::new();
        for factor in Factor::ALL {
            out.insert(factor, self.value_of(factor, profile, ctx)?);
        }
        Ok(out)
    }

    fn sun_aspect(&self, ctx: &ObservationContext, other: Body) -> Result<f64, EngineError> {
        let snap = self.snapshot(ctx)?;
        let sun = snap.longitude_of(Body::Sun)?;
        let lon = snap.longitude_of(other)?;
        Ok(aspect_score(sun, lon))
    }

    fn positions(&self, ctx: &ObservationContext) -> Result<Vec<(Body, f64)>, EngineError> {
        let positions = self.snapshot(ctx)?.available_positions();
        if positions.is_empty() {
            return Err(EngineError::missing("body positions for balance"));
        }
        Ok(positions)
    }

    fn snapshot<'a>(&self, ctx: &'a ObservationContext) -> Result<&'a EphemerisSnapshot, EngineError> {
        ctx.snapshot
            .as_ref()
            .ok_or_else(|| EngineError::missing("ephemeris snapshot"))
    }
}
