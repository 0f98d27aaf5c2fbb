// tests/engine_scenarios.rs
// End-to-end scenarios across the scoring pipeline: factors → weights →
// engine → cache. Synthetic fixtures only, no I/O.

use chrono::{Datelike, NaiveDate};
use std::time::Duration;

use astro_impact_engine::{
    cache::DEFAULT_TTL, calibration::recalibrate, scoring::NEUTRAL_VALUE, Body,
    EphemerisSnapshot, Factor, ObservationContext, OutcomeFeedback, ReferenceProfile,
    ResultCache, ScoringEngine, WeightVector,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn full_snapshot() -> EphemerisSnapshot {
    EphemerisSnapshot::default()
        .with(Body::Sun, 70.0)
        .with(Body::Moon, 190.0)
        .with(Body::Mercury, 85.0)
        .with(Body::Venus, 40.0)
        .with(Body::Mars, 310.0)
        .with(Body::Jupiter, 130.0)
        .with(Body::Saturn, 250.0)
}

#[test]
fn normalize_noop_on_valid_vector() {
    let w = WeightVector::from_entries([
        (Factor::SignCompatibility, 0.5),
        (Factor::PhaseScore, 0.3),
        (Factor::ElementBalance, 0.2),
    ]);
    assert_eq!(w.normalized(), w);
}

#[test]
fn normalize_rescales_oversized_vector() {
    let w = WeightVector::from_entries([
        (Factor::SignCompatibility, 0.6),
        (Factor::PhaseScore, 0.6),
    ]);
    let n = w.normalized();
    assert!((n.get(Factor::SignCompatibility).unwrap() - 0.5).abs() < 1e-9);
    assert!((n.get(Factor::PhaseScore).unwrap() - 0.5).abs() < 1e-9);
}

#[test]
fn trine_band_flows_through_to_the_breakdown() {
    // Sun 10°, Jupiter 130°: separation 120°, the positive trine band.
    let snap = full_snapshot().with(Body::Sun, 10.0).with(Body::Jupiter, 130.0);
    let profile = ReferenceProfile::new("team-1", d(1988, 11, 2));
    let ctx = ObservationContext::with_snapshot(d(2025, 6, 1), snap);

    let outcome = ScoringEngine::new().score(&profile, &ctx, &WeightVector::default());
    let r = outcome.result();
    let jupiter = r
        .factors
        .iter()
        .find(|c| c.factor == Factor::AspectSunJupiter)
        .unwrap();
    // Trine strength 0.8 maps to 0.9 in score space.
    assert!((jupiter.raw - 0.9).abs() < 1e-9);
    assert!(!jupiter.substituted);
}

#[test]
fn missing_body_yields_degraded_but_bounded_result() {
    let snap = EphemerisSnapshot::default().with(Body::Sun, 10.0); // no mars/jupiter/saturn
    let profile = ReferenceProfile::new("team-1", d(1988, 11, 2));
    let ctx = ObservationContext::with_snapshot(d(2025, 6, 1), snap);

    let outcome = ScoringEngine::new().score(&profile, &ctx, &WeightVector::default());
    assert!(outcome.is_degraded());
    let r = outcome.into_result();
    assert!((0.0..=1.0).contains(&r.score));
    assert!(!r.score.is_nan());
    assert!(r.error.is_some());
    for c in r.factors.iter().filter(|c| c.substituted) {
        assert!((c.raw - NEUTRAL_VALUE).abs() < 1e-12);
    }
}

#[test]
fn score_bounded_across_a_year_of_dates() {
    let profile = ReferenceProfile::new("player-23", d(1984, 12, 30));
    let engine = ScoringEngine::new();
    let weights = WeightVector::default();

    let mut date = d(2025, 1, 1);
    while date.year() == 2025 {
        // Alternate between bare contexts and full snapshots.
        let ctx = if date.signed_duration_since(d(2025, 1, 1)).num_days() % 2 == 0 {
            ObservationContext::new(date)
        } else {
            ObservationContext::with_snapshot(date, full_snapshot())
        };
        let r = engine.score(&profile, &ctx, &weights).into_result();
        assert!(
            (0.0..=1.0).contains(&r.score) && !r.score.is_nan(),
            "score {} on {date}",
            r.score
        );
        date = date.succ_opt().unwrap();
    }
}

#[test]
fn half_accurate_feedback_keeps_weights_stable() {
    let weights = WeightVector::default();
    let batch = [
        OutcomeFeedback::new(Factor::PhaseScore, true),
        OutcomeFeedback::new(Factor::PhaseScore, false),
    ];
    let out = recalibrate(&weights, &batch);
    assert!(
        (out.get(Factor::PhaseScore).unwrap() - weights.get(Factor::PhaseScore).unwrap()).abs()
            < 1e-9
    );
}

#[test]
fn recalibrated_weights_change_the_score_consistently() {
    let profile = ReferenceProfile::new("team-1", d(1988, 11, 2));
    let ctx = ObservationContext::with_snapshot(d(2025, 6, 1), full_snapshot());
    let engine = ScoringEngine::new();

    let base = WeightVector::default();
    let boosted = recalibrate(
        &base,
        &vec![OutcomeFeedback::new(Factor::SignCompatibility, true); 5],
    );

    let r1 = engine.score(&profile, &ctx, &base).into_result();
    let r2 = engine.score(&profile, &ctx, &boosted).into_result();
    // Raw factor values are identical; only the weighting moved.
    for (a, b) in r1.factors.iter().zip(r2.factors.iter()) {
        assert_eq!(a.raw.to_bits(), b.raw.to_bits());
    }
    assert!((0.0..=1.0).contains(&r2.score));
}

#[test]
fn cache_round_trip_and_expiry() {
    let profile = ReferenceProfile::new("team-1", d(1988, 11, 2));
    let ctx = ObservationContext::with_snapshot(d(2025, 6, 1), full_snapshot());
    let result = ScoringEngine::new()
        .score(&profile, &ctx, &WeightVector::default())
        .into_result();

    let cache = ResultCache::new();
    let key = ctx.date_key();
    cache.put_at(profile.entity_id(), &key, result.clone(), DEFAULT_TTL, 1_000);

    // Within TTL: identical result back.
    let hit = cache.get_at(profile.entity_id(), &key, 2_000).unwrap();
    assert_eq!(hit, result);

    // Past TTL: absent, caller recomputes.
    let expired_at = 1_000 + DEFAULT_TTL.as_secs() + 1;
    assert!(cache.get_at(profile.entity_id(), &key, expired_at).is_none());
}

#[test]
fn cache_miss_never_blocks_scoring() {
    let cache = ResultCache::new();
    let profile = ReferenceProfile::new("team-1", d(1988, 11, 2));
    let ctx = ObservationContext::new(d(2025, 6, 1));

    let fresh = match cache.get(profile.entity_id(), &ctx.date_key()) {
        Some(hit) => hit,
        None => {
            let computed = ScoringEngine::new()
                .score(&profile, &ctx, &WeightVector::default())
                .into_result();
            cache.put_with_ttl(
                profile.entity_id(),
                &ctx.date_key(),
                computed.clone(),
                Duration::from_secs(3600),
            );
            computed
        }
    };
    assert!((0.0..=1.0).contains(&fresh.score));
    assert!(cache.get(profile.entity_id(), &ctx.date_key()).is_some());
}
