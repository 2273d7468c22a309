//! Confidence weighting of measurements by index gap.
//!
//! The policy scales the per-axis uncertainty of a measurement according to
//! how far apart its two frames are:
//! - gaps listed in `coef` use their own coefficient
//! - unlisted gaps above `loop_threshold` are loop closures and use `coef_loop`
//! - anything else is an untrusted non-adjacent link and gets
//!   [`DISCARD_COEFFICIENT`], which leaves the edge in the graph with
//!   negligible weight
//!
//! Rotational axes are further multiplied by `rotation_scale`.

use std::collections::BTreeMap;

use nalgebra::Vector6;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Uncertainty multiplier for gaps that are neither listed nor loop closures.
pub const DISCARD_COEFFICIENT: f64 = 1e7;

/// How a gap was classified by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapClass {
    /// Gap has an explicit coefficient.
    Listed,
    /// Gap exceeds the loop threshold.
    LoopClosure,
    /// Short non-adjacent link without a coefficient.
    Untrusted,
}

/// Immutable weighting configuration, owned by each optimizer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightPolicy {
    /// Per-gap coefficient table, keyed by `|to - from|`.
    #[serde(with = "gap_table")]
    pub coef: BTreeMap<u64, f64>,

    /// Coefficient applied to loop-closure gaps.
    pub coef_loop: f64,

    /// Unlisted gaps strictly above this are loop closures.
    pub loop_threshold: u64,

    /// Extra multiplier on the three rotational axes.
    pub rotation_scale: f64,
}

impl Default for WeightPolicy {
    fn default() -> Self {
        Self {
            coef: BTreeMap::from([(1, 1.0)]),
            coef_loop: 1.0,
            loop_threshold: 1,
            rotation_scale: 1.0,
        }
    }
}

impl WeightPolicy {
    /// Classify a signed gap. `None` for a zero gap.
    pub fn classify(&self, diff: i64) -> Option<(GapClass, f64)> {
        if diff == 0 {
            return None;
        }
        let gap = diff.unsigned_abs();
        if let Some(&c) = self.coef.get(&gap) {
            return Some((GapClass::Listed, c));
        }
        if gap > self.loop_threshold {
            Some((GapClass::LoopClosure, self.coef_loop))
        } else {
            Some((GapClass::Untrusted, DISCARD_COEFFICIENT))
        }
    }

    /// Scaled per-axis uncertainty for a measurement with gap `diff`.
    ///
    /// Returns `None` for a zero gap, which marks a malformed measurement.
    pub fn weights(&self, diff: i64, confidence: &Vector6<f64>) -> Option<Vector6<f64>> {
        let (_, coefficient) = self.classify(diff)?;
        let mut scaled = confidence * coefficient;
        for axis in 0..3 {
            scaled[axis] *= self.rotation_scale;
        }
        Some(scaled)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid = |v: f64| v.is_finite() && v >= 0.0;
        if let Some((gap, c)) = self.coef.iter().find(|(_, &c)| !valid(c)) {
            return Err(ConfigError::Invalid(format!(
                "coefficient for gap {gap} must be finite and non-negative, got {c}"
            )));
        }
        if self.coef.contains_key(&0) {
            return Err(ConfigError::Invalid("gap 0 cannot carry a coefficient".into()));
        }
        if !valid(self.coef_loop) {
            return Err(ConfigError::Invalid(format!(
                "coef_loop must be finite and non-negative, got {}",
                self.coef_loop
            )));
        }
        if !valid(self.rotation_scale) {
            return Err(ConfigError::Invalid(format!(
                "rotation_scale must be finite and non-negative, got {}",
                self.rotation_scale
            )));
        }
        Ok(())
    }
}

/// `coef` is written as an array of `{ gap, coefficient }` tables so that it
/// survives formats with string-only map keys.
mod gap_table {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct GapCoefficient {
        gap: u64,
        coefficient: f64,
    }

    pub fn serialize<S: Serializer>(map: &BTreeMap<u64, f64>, s: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<GapCoefficient> = map
            .iter()
            .map(|(&gap, &coefficient)| GapCoefficient { gap, coefficient })
            .collect();
        entries.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<u64, f64>, D::Error> {
        let entries = Vec::<GapCoefficient>::deserialize(d)?;
        Ok(entries.into_iter().map(|e| (e.gap, e.coefficient)).collect())
    }
}
