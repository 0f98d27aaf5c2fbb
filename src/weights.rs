//! # Weight Registry
//!
//! Owns the canonical per-factor weight vector. Invariants enforced on every
//! mutation path: the weights sum to 1.0 (tolerance 0.001) and every entry
//! stays inside `[WEIGHT_FLOOR, WEIGHT_CEILING]`, so no single factor can
//! dominate or vanish.
//!
//! Persistence goes through the `WeightStore` trait; the bundled
//! `JsonFileStore` keeps a flat JSON file under `config/`.
//! Load failures fall back to built-in defaults with a warning; save failures
//! are returned to the caller, never swallowed.
//!
//! The registry is an injectable instance, not a process global. Readers take
//! one snapshot via `current()` and use it throughout a scoring call; writers
//! (recalibration + save) are serialized on an internal async mutex.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::calibration::{recalibrate, OutcomeFeedback};
use crate::error::EngineError;
use crate::factors::Factor;

/// Lower bound for any single weight after normalization.
pub const WEIGHT_FLOOR: f64 = 0.05;
/// Upper bound for any single weight after normalization.
pub const WEIGHT_CEILING: f64 = 0.5;
/// Sum-to-1 tolerance below which normalization is a no-op.
pub const SUM_TOLERANCE: f64 = 0.001;

/// Logical identifier the registry persists under.
pub const WEIGHTS_KEY: &str = "current_weights";

/// Ordered factor-name → weight mapping. Weights are non-negative and, for a
/// vector produced by `normalized()`, sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    weights: BTreeMap<Factor, f64>,
}

impl Default for WeightVector {
    /// Built-in priors. Sign compatibility leads, the three Sun aspects and
    /// the balances share the rest. Sums to exactly 1.0, every entry inside
    /// the floor/ceiling bounds.
    fn default() -> Self {
        Self::from_entries([
            (Factor::SignCompatibility, 0.25),
            (Factor::PhaseScore, 0.20),
            (Factor::AspectSunMars, 0.10),
            (Factor::AspectSunJupiter, 0.10),
            (Factor::AspectSunSaturn, 0.10),
            (Factor::ElementBalance, 0.15),
            (Factor::ModalityBalance, 0.10),
        ])
    }
}

impl WeightVector {
    pub fn from_entries(entries: impl IntoIterator<Item = (Factor, f64)>) -> Self {
        Self {
            weights: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, factor: Factor) -> Option<f64> {
        self.weights.get(&factor).copied()
    }

    pub fn set(&mut self, factor: Factor, weight: f64) {
        self.weights.insert(factor, weight.max(0.0));
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, f64)> + '_ {
        self.weights.iter().map(|(&f, &w)| (f, w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Whether the vector already satisfies both invariants (registry
    /// tolerance).
    pub fn is_normalized(&self) -> bool {
        self.is_within(SUM_TOLERANCE)
    }

    fn is_within(&self, sum_eps: f64) -> bool {
        !self.weights.is_empty()
            && (self.sum() - 1.0).abs() <= sum_eps
            && self
                .weights
                .values()
                .all(|&w| (WEIGHT_FLOOR..=WEIGHT_CEILING).contains(&w))
    }

    /// Rescale so the weights sum to 1.0 with every entry inside
    /// `[WEIGHT_FLOOR, WEIGHT_CEILING]`. No-op (returns a clone) when the
    /// vector already satisfies both invariants. Degenerate vectors (empty or
    /// non-positive sum) fall back to the built-in defaults.
    pub fn normalized(&self) -> WeightVector {
        // Tight no-op check: normalize guarantees the sum lands within 1e-6,
        // so a vector merely inside the looser registry tolerance still gets
        // rescaled here.
        if self.is_within(1e-9) {
            return self.clone();
        }
        let sum = self.sum();
        if self.weights.is_empty() || sum <= 0.0 || !sum.is_finite() {
            warn!(sum, "degenerate weight vector, falling back to defaults");
            return WeightVector::default();
        }

        // Proportional rescale, then water-filling: entries that hit a bound
        // are pinned there and the remaining mass is redistributed across the
        // free entries. Converges in at most `len` rounds since every round
        // pins at least one new entry.
        let mut out: BTreeMap<Factor, f64> = self
            .weights
            .iter()
            .map(|(&f, &w)| (f, w.max(0.0) / sum))
            .collect();
        let mut pinned: std::collections::BTreeSet<Factor> = Default::default();
        loop {
            // Ceiling violators first: redistributing their excess raises the
            // small entries and usually clears floor violations for free.
            let over: Vec<Factor> = out
                .iter()
                .filter(|(f, &w)| !pinned.contains(f) && w > WEIGHT_CEILING)
                .map(|(&f, _)| f)
                .collect();
            let newly_pinned: Vec<Factor> = if !over.is_empty() {
                over
            } else {
                out.iter()
                    .filter(|(f, &w)| !pinned.contains(f) && w < WEIGHT_FLOOR)
                    .map(|(&f, _)| f)
                    .collect()
            };
            if newly_pinned.is_empty() {
                break;
            }
            for f in newly_pinned {
                let w = out.get_mut(&f).expect("pinning a known entry");
                *w = w.clamp(WEIGHT_FLOOR, WEIGHT_CEILING);
                pinned.insert(f);
            }
            let pinned_mass: f64 = out
                .iter()
                .filter(|(f, _)| pinned.contains(f))
                .map(|(_, &w)| w)
                .sum();
            let free_mass: f64 = out
                .iter()
                .filter(|(f, _)| !pinned.contains(f))
                .map(|(_, &w)| w)
                .sum();
            if free_mass <= 0.0 {
                break;
            }
            let scale = (1.0 - pinned_mass) / free_mass;
            for (f, w) in out.iter_mut() {
                if !pinned.contains(f) {
                    *w *= scale;
                }
            }
        }

        // Sum-to-1 wins when the bounds make an exact fit impossible (tiny
        // vectors with extreme skew); a plain rescale restores the sum.
        let total: f64 = out.values().sum();
        if (total - 1.0).abs() > SUM_TOLERANCE && total > 0.0 {
            for w in out.values_mut() {
                *w /= total;
            }
        }

        WeightVector { weights: out }
    }
}

/// Persisted form: flat factor-name → weight mapping plus update timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredWeights {
    pub weights: BTreeMap<String, f64>,
    pub updated_at: DateTime<Utc>,
}

impl StoredWeights {
    pub fn from_vector(vector: &WeightVector) -> Self {
        Self {
            weights: vector
                .iter()
                .map(|(f, w)| (f.name().to_string(), w))
                .collect(),
            updated_at: Utc::now(),
        }
    }

    /// Rebuild a `WeightVector`, skipping unknown factor names with a
    /// warning so an older config file cannot poison the vector.
    pub fn to_vector(&self) -> WeightVector {
        let mut entries = BTreeMap::new();
        for (name, &w) in &self.weights {
            match name.parse::<Factor>() {
                Ok(factor) => {
                    entries.insert(factor, w);
                }
                Err(_) => warn!(factor = %name, "ignoring unknown factor in stored weights"),
            }
        }
        WeightVector { weights: entries }
    }
}

/// Persistence interface consumed by the registry.
#[async_trait]
pub trait WeightStore: Send + Sync {
    async fn load(&self, key: &str) -> anyhow::Result<Option<StoredWeights>>;
    async fn save(&self, key: &str, stored: &StoredWeights) -> anyhow::Result<()>;
}

/// JSON file store: one `<dir>/<key>.json` per logical key.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Defaults to the `config/` directory when `None`.
    pub fn new(dir: Option<&Path>) -> Self {
        Self {
            dir: dir
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config")),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl WeightStore for JsonFileStore {
    async fn load(&self, key: &str) -> anyhow::Result<Option<StoredWeights>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let stored: StoredWeights = serde_json::from_slice(&bytes)?;
                Ok(Some(stored))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, stored: &StoredWeights) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(stored)?;
        tokio::fs::write(self.path_for(key), bytes).await?;
        Ok(())
    }
}

/// Injectable owner of the current weight vector.
pub struct WeightRegistry {
    store: Arc<dyn WeightStore>,
    current: RwLock<WeightVector>,
    /// Serializes recalibrate + save sequences so two concurrent calibration
    /// cycles cannot overwrite each other's normalization.
    writer: tokio::sync::Mutex<()>,
    io_timeout: Option<Duration>,
}

impl WeightRegistry {
    pub fn new(store: Arc<dyn WeightStore>) -> Self {
        Self {
            store,
            current: RwLock::new(WeightVector::default()),
            writer: tokio::sync::Mutex::new(()),
            io_timeout: None,
        }
    }

    /// Apply a timeout to every store call; a timeout is treated as an
    /// ordinary I/O failure.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    /// Read-only snapshot of the current weights.
    ///
    /// A poisoned lock is recovered rather than propagated: the vector is
    /// normalized on every install, so a panic elsewhere cannot leave it in
    /// a half-written state.
    pub fn current(&self) -> WeightVector {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Publish a new vector, auto-correcting invariant violations with a
    /// warning. Returns the vector actually installed.
    pub fn install(&self, vector: WeightVector) -> WeightVector {
        let installed = if vector.is_normalized() {
            vector
        } else {
            let violation = EngineError::InvariantViolation(format!(
                "weight vector sum {} or bounds out of range",
                vector.sum()
            ));
            warn!(error = %violation, "normalizing weight vector");
            vector.normalized()
        };
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = installed.clone();
        installed
    }

    /// Load persisted weights, falling back to built-in defaults on any
    /// failure (logged, never raised). Returns the installed vector.
    pub async fn load(&self) -> WeightVector {
        match self.store_load().await {
            Ok(Some(stored)) => {
                debug!(updated_at = %stored.updated_at, "loaded persisted weights");
                self.install(stored.to_vector())
            }
            Ok(None) => {
                debug!("no persisted weights, using defaults");
                self.install(WeightVector::default())
            }
            Err(e) => {
                warn!(error = %e, "weight load failed, using defaults");
                self.install(WeightVector::default())
            }
        }
    }

    /// Persist the current vector. Failures are returned, not swallowed.
    pub async fn save(&self) -> anyhow::Result<()> {
        let stored = StoredWeights::from_vector(&self.current());
        self.store_save(&stored)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()).into())
    }

    /// Serialized recalibrate-then-save cycle. The writer mutex is held
    /// across both steps; scoring reads stay lock-free snapshots.
    pub async fn recalibrate_and_save(
        &self,
        feedback: &[OutcomeFeedback],
    ) -> anyhow::Result<WeightVector> {
        let _guard = self.writer.lock().await;
        let updated = recalibrate(&self.current(), feedback);
        let installed = self.install(updated);
        self.save().await?;
        Ok(installed)
    }

    async fn store_load(&self) -> anyhow::Result<Option<StoredWeights>> {
        match self.io_timeout {
            Some(t) => tokio::time::timeout(t, self.store.load(WEIGHTS_KEY))
                .await
                .map_err(|_| anyhow::anyhow!("weight load timed out after {t:?}"))?,
            None => self.store.load(WEIGHTS_KEY).await,
        }
    }

    async fn store_save(&self, stored: &StoredWeights) -> anyhow::Result<()> {
        match self.io_timeout {
            Some(t) => tokio::time::timeout(t, self.store.save(WEIGHTS_KEY, stored))
                .await
                .map_err(|_| anyhow::anyhow!("weight save timed out after {t:?}"))?,
            None => self.store.save(WEIGHTS_KEY, stored).await,
        }
    }
}

impl std::fmt::Debug for WeightRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightRegistry")
            .field("current", &self.current)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_normalized() {
        let w = WeightVector::default();
        assert!(w.is_normalized());
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert_eq!(w.len(), Factor::ALL.len());
    }

    #[test]
    fn normalize_is_noop_on_valid_vector() {
        let w = WeightVector::from_entries([
            (Factor::SignCompatibility, 0.5),
            (Factor::PhaseScore, 0.3),
            (Factor::ElementBalance, 0.2),
        ]);
        let n = w.normalized();
        assert_eq!(n, w);
    }

    #[test]
    fn oversized_vector_rescales_evenly() {
        // {0.6, 0.6} → {0.5, 0.5}.
        let w = WeightVector::from_entries([
            (Factor::SignCompatibility, 0.6),
            (Factor::PhaseScore, 0.6),
        ]);
        let n = w.normalized();
        assert!((n.get(Factor::SignCompatibility).unwrap() - 0.5).abs() < 1e-9);
        assert!((n.get(Factor::PhaseScore).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            WeightVector::from_entries([
                (Factor::SignCompatibility, 0.9),
                (Factor::PhaseScore, 0.02),
                (Factor::ElementBalance, 0.3),
                (Factor::ModalityBalance, 0.15),
            ]),
            WeightVector::from_entries([
                (Factor::AspectSunMars, 3.0),
                (Factor::AspectSunJupiter, 1.0),
                (Factor::AspectSunSaturn, 1.0),
            ]),
            WeightVector::default(),
        ];
        for w in samples {
            let once = w.normalized();
            let twice = once.normalized();
            assert!((once.sum() - 1.0).abs() < 1e-6, "sum {}", once.sum());
            for (f, a) in once.iter() {
                let b = twice.get(f).unwrap();
                assert!((a - b).abs() < 1e-9, "{f}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn normalize_respects_floor_and_ceiling() {
        let w = WeightVector::from_entries([
            (Factor::SignCompatibility, 100.0),
            (Factor::PhaseScore, 0.001),
            (Factor::ElementBalance, 0.001),
            (Factor::ModalityBalance, 0.001),
        ]);
        let n = w.normalized();
        assert!((n.sum() - 1.0).abs() < 1e-6);
        for (f, v) in n.iter() {
            assert!(
                (WEIGHT_FLOOR - 1e-9..=WEIGHT_CEILING + 1e-9).contains(&v),
                "{f} = {v}"
            );
        }
    }

    #[test]
    fn degenerate_vector_falls_back_to_defaults() {
        let zero = WeightVector::from_entries([(Factor::PhaseScore, 0.0)]);
        assert_eq!(zero.normalized(), WeightVector::default());
        let empty = WeightVector::from_entries([]);
        assert_eq!(empty.normalized(), WeightVector::default());
    }

    #[test]
    fn stored_round_trip_skips_unknown_names() {
        let stored = StoredWeights {
            weights: [
                ("phase_score".to_string(), 0.4),
                ("sign_compatibility".to_string(), 0.4),
                ("not_a_factor".to_string(), 0.2),
            ]
            .into_iter()
            .collect(),
            updated_at: Utc::now(),
        };
        let v = stored.to_vector();
        assert_eq!(v.len(), 2);
        assert!(v.get(Factor::PhaseScore).is_some());
    }

    struct FailingStore;

    #[async_trait]
    impl WeightStore for FailingStore {
        async fn load(&self, _key: &str) -> anyhow::Result<Option<StoredWeights>> {
            anyhow::bail!("backend down")
        }
        async fn save(&self, _key: &str, _stored: &StoredWeights) -> anyhow::Result<()> {
            anyhow::bail!("backend down")
        }
    }

    #[tokio::test]
    async fn load_failure_falls_back_to_defaults() {
        let reg = WeightRegistry::new(Arc::new(FailingStore));
        let w = reg.load().await;
        assert_eq!(w, WeightVector::default());
    }

    #[tokio::test]
    async fn save_failure_is_surfaced() {
        let reg = WeightRegistry::new(Arc::new(FailingStore));
        assert!(reg.save().await.is_err());
    }

    struct SlowStore;

    #[async_trait]
    impl WeightStore for SlowStore {
        async fn load(&self, _key: &str) -> anyhow::Result<Option<StoredWeights>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }
        async fn save(&self, _key: &str, _stored: &StoredWeights) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn timeout_is_treated_as_io_failure() {
        let reg =
            WeightRegistry::new(Arc::new(SlowStore)).with_io_timeout(Duration::from_millis(50));
        // Load: falls back to defaults instead of hanging.
        let w = reg.load().await;
        assert_eq!(w, WeightVector::default());
        // Save: surfaces the timeout.
        assert!(reg.save().await.is_err());
    }

    #[test]
    fn poisoned_weights_lock_recovers() {
        let reg = WeightRegistry::new(Arc::new(FailingStore));

        // Panic while holding the write guard to poison the lock.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = reg.current.write().unwrap();
            panic!("simulated panic while holding the weights lock");
        }));

        assert_eq!(reg.current(), WeightVector::default());
        let installed = reg.install(WeightVector::from_entries([
            (Factor::SignCompatibility, 0.5),
            (Factor::PhaseScore, 0.5),
        ]));
        assert_eq!(reg.current(), installed);
    }

    #[test]
    fn install_normalizes_violating_vector() {
        let reg = WeightRegistry::new(Arc::new(FailingStore));
        let bad = WeightVector::from_entries([
            (Factor::SignCompatibility, 0.9),
            (Factor::PhaseScore, 0.9),
        ]);
        let installed = reg.install(bad);
        assert!(installed.is_normalized());
        assert_eq!(reg.current(), installed);
    }
}
