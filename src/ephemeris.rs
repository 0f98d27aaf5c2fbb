//! # Ephemeris Inputs
//!
//! Validated record types for the astronomical inputs the factor provider
//! consumes. The caller (data-sync jobs, external ephemeris tables) supplies
//! these; the core never fetches them itself.
//!
//! Optional fields are explicit `Option`s rather than a dynamic bag, so the
//! provider can tell statically which inputs are required and raise a named
//! `MissingFactorData` when one is absent.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::calendar;
use crate::error::EngineError;
use crate::zodiac::Sign;

/// Celestial bodies tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    Sun,
    Moon,
    Mercury,
    Venus,
    Mars,
    Jupiter,
    Saturn,
}

impl Body {
    pub const ALL: [Body; 7] = [
        Body::Sun,
        Body::Moon,
        Body::Mercury,
        Body::Venus,
        Body::Mars,
        Body::Jupiter,
        Body::Saturn,
    ];

    /// Fixed importance multiplier used when bucketing bodies for the
    /// element/modality balance factors. Luminaries count double, the inner
    /// planets full, the slow outer planets half.
    pub fn importance(self) -> f64 {
        match self {
            Body::Sun | Body::Moon => 2.0,
            Body::Mercury | Body::Venus | Body::Mars => 1.0,
            Body::Jupiter | Body::Saturn => 0.5,
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Body::Sun => "sun",
            Body::Moon => "moon",
            Body::Mercury => "mercury",
            Body::Venus => "venus",
            Body::Mars => "mars",
            Body::Jupiter => "jupiter",
            Body::Saturn => "saturn",
        };
        f.write_str(name)
    }
}

/// Per-date astronomical snapshot supplied by the caller.
///
/// Longitudes are ecliptic degrees in `[0, 360)`. Any subset may be present;
/// the factor provider decides which ones it needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EphemerisSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sun: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mercury: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venus: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mars: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jupiter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturn: Option<f64>,
    /// Precomputed lunar phase in `[0, 1)`, when the caller has a better
    /// source than the synodic approximation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moon_phase: Option<f64>,
    /// Advisory flag; reported on results but not part of the weighted sum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mercury_retrograde: Option<bool>,
}

impl EphemerisSnapshot {
    pub fn longitude_of(&self, body: Body) -> Result<f64, EngineError> {
        let lon = match body {
            Body::Sun => self.sun,
            Body::Moon => self.moon,
            Body::Mercury => self.mercury,
            Body::Venus => self.venus,
            Body::Mars => self.mars,
            Body::Jupiter => self.jupiter,
            Body::Saturn => self.saturn,
        };
        match lon {
            Some(v) if v.is_finite() => Ok(v.rem_euclid(360.0)),
            Some(v) => Err(EngineError::invalid(format!(
                "non-finite longitude {v} for {body}"
            ))),
            None => Err(EngineError::missing(format!("{body} longitude"))),
        }
    }

    /// All bodies with a usable longitude, paired with their position.
    pub fn available_positions(&self) -> Vec<(Body, f64)> {
        Body::ALL
            .iter()
            .filter_map(|&b| self.longitude_of(b).ok().map(|lon| (b, lon)))
            .collect()
    }

    /// Builder-style setter, handy in tests and fixtures.
    pub fn with(mut self, body: Body, longitude: f64) -> Self {
        let slot = match body {
            Body::Sun => &mut self.sun,
            Body::Moon => &mut self.moon,
            Body::Mercury => &mut self.mercury,
            Body::Venus => &mut self.venus,
            Body::Mars => &mut self.mars,
            Body::Jupiter => &mut self.jupiter,
            Body::Saturn => &mut self.saturn,
        };
        *slot = Some(longitude);
        self
    }
}

/// An entity's fixed reference profile. Immutable once established.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceProfile {
    entity_id: String,
    reference_date: NaiveDate,
    sign: Sign,
}

impl ReferenceProfile {
    /// Profile with the sign derived from the reference date.
    pub fn new(entity_id: impl Into<String>, reference_date: NaiveDate) -> Self {
        Self {
            entity_id: entity_id.into(),
            reference_date,
            sign: Sign::from_date(reference_date),
        }
    }

    /// Profile with a caller-precomputed sign (e.g. from a stored record).
    pub fn with_sign(entity_id: impl Into<String>, reference_date: NaiveDate, sign: Sign) -> Self {
        Self {
            entity_id: entity_id.into(),
            reference_date,
            sign,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }
}

/// The date a score is requested for, plus whatever astronomical snapshot the
/// caller has for that date. Constructed per request, never persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationContext {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<EphemerisSnapshot>,
}

impl ObservationContext {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            snapshot: None,
        }
    }

    pub fn with_snapshot(date: NaiveDate, snapshot: EphemerisSnapshot) -> Self {
        Self {
            date,
            snapshot: Some(snapshot),
        }
    }

    /// Observed sign: snapshot sun longitude when present, otherwise the
    /// calendar boundary rule.
    pub fn observed_sign(&self) -> Sign {
        if let Some(snap) = &self.snapshot {
            if let Ok(lon) = snap.longitude_of(Body::Sun) {
                return Sign::from_longitude(lon);
            }
        }
        Sign::from_date(self.date)
    }

    /// Lunar phase for the observation date: precomputed when supplied and
    /// in range, otherwise the synodic approximation.
    pub fn lunar_phase(&self) -> f64 {
        if let Some(snap) = &self.snapshot {
            if let Some(p) = snap.moon_phase {
                if (0.0..1.0).contains(&p) {
                    return p;
                }
            }
        }
        calendar::lunar_phase(self.date)
    }

    /// Cache/date key in ISO form.
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}
