//! # Zodiac Classifier
//!
//! Maps dates to the 12 zodiac signs via fixed month/day boundaries, each
//! sign to its element (1-of-4) and modality (1-of-3), and scores pairwise
//! sign compatibility on a fixed ladder.
//!
//! Everything here is a total function: any valid calendar date (leap day
//! included) classifies to exactly one sign, and compatibility never leaves
//! `{0.4, 0.6, 0.8, 1.0}`.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The 12 zodiac signs, in ecliptic order starting at Aries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sign {
    Aries,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Capricorn,
    Aquarius,
    Pisces,
}

/// Classical element grouping (3 signs each).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Element {
    Fire,
    Earth,
    Air,
    Water,
}

/// Modality grouping (4 signs each), cross-cutting the elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    Cardinal,
    Fixed,
    Mutable,
}

impl Sign {
    pub const ALL: [Sign; 12] = [
        Sign::Aries,
        Sign::Taurus,
        Sign::Gemini,
        Sign::Cancer,
        Sign::Leo,
        Sign::Virgo,
        Sign::Libra,
        Sign::Scorpio,
        Sign::Sagittarius,
        Sign::Capricorn,
        Sign::Aquarius,
        Sign::Pisces,
    ];

    /// Tropical date boundaries. Feb 29 falls inside Pisces like the rest of
    /// late February.
    pub fn from_date(date: NaiveDate) -> Sign {
        match (date.month(), date.day()) {
            (3, 21..=31) | (4, 1..=19) => Sign::Aries,
            (4, 20..=30) | (5, 1..=20) => Sign::Taurus,
            (5, 21..=31) | (6, 1..=20) => Sign::Gemini,
            (6, 21..=30) | (7, 1..=22) => Sign::Cancer,
            (7, 23..=31) | (8, 1..=22) => Sign::Leo,
            (8, 23..=31) | (9, 1..=22) => Sign::Virgo,
            (9, 23..=30) | (10, 1..=22) => Sign::Libra,
            (10, 23..=31) | (11, 1..=21) => Sign::Scorpio,
            (11, 22..=30) | (12, 1..=21) => Sign::Sagittarius,
            (12, 22..=31) | (1, 1..=19) => Sign::Capricorn,
            (1, 20..=31) | (2, 1..=18) => Sign::Aquarius,
            // Remaining dates are Feb 19 – Mar 20.
            _ => Sign::Pisces,
        }
    }

    /// Sign occupying an ecliptic longitude (30° per sign, wrapped).
    pub fn from_longitude(longitude_deg: f64) -> Sign {
        let idx = (longitude_deg.rem_euclid(360.0) / 30.0) as usize % 12;
        Sign::ALL[idx]
    }

    pub fn element(self) -> Element {
        match self {
            Sign::Aries | Sign::Leo | Sign::Sagittarius => Element::Fire,
            Sign::Taurus | Sign::Virgo | Sign::Capricorn => Element::Earth,
            Sign::Gemini | Sign::Libra | Sign::Aquarius => Element::Air,
            Sign::Cancer | Sign::Scorpio | Sign::Pisces => Element::Water,
        }
    }

    pub fn modality(self) -> Modality {
        match self {
            Sign::Aries | Sign::Cancer | Sign::Libra | Sign::Capricorn => Modality::Cardinal,
            Sign::Taurus | Sign::Leo | Sign::Scorpio | Sign::Aquarius => Modality::Fixed,
            Sign::Gemini | Sign::Virgo | Sign::Sagittarius | Sign::Pisces => Modality::Mutable,
        }
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Element {
    pub const ALL: [Element; 4] = [Element::Fire, Element::Earth, Element::Air, Element::Water];

    /// Fire feeds Air, Earth holds Water. The two harmonious cross-element
    /// pairs on the compatibility ladder.
    pub fn is_compatible_with(self, other: Element) -> bool {
        matches!(
            (self, other),
            (Element::Fire, Element::Air)
                | (Element::Air, Element::Fire)
                | (Element::Earth, Element::Water)
                | (Element::Water, Element::Earth)
        )
    }
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Cardinal, Modality::Fixed, Modality::Mutable];
}

/// Pairwise sign compatibility: identical 1.0, same element 0.8, compatible
/// elements 0.6, everything else 0.4.
pub fn compatibility(a: Sign, b: Sign) -> f64 {
    if a == b {
        1.0
    } else if a.element() == b.element() {
        0.8
    } else if a.element().is_compatible_with(b.element()) {
        0.6
    } else {
        0.4
    }
}
