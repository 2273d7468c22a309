//! Trajectory error metrics.
//!
//! - **ATE**: RMS position error after aligning the prediction onto the
//!   reference over their shared indices
//! - **RMSE_r / RMSE_t**: RMS rotation angle and position error between
//!   corresponding poses, without alignment
//! - **RPE_r / RPE_t**: raw sums of squared rotation angle and squared
//!   translation norm of the relative-pose error over a set of index pairs,
//!   with the pair count in `RPE_divider`
//!
//! RPE stays unnormalized in a fresh record so that records of different
//! lengths can be pooled before dividing; see [`pool_metrics`] and
//! [`normalize_metrics`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;
use crate::geometry::align_points;
use crate::measurement::FrameIndex;
use crate::trajectory::Trajectory;

/// Shared indices needed for ATE alignment.
pub const MIN_SHARED_INDICES: usize = 2;

/// Metrics of one predicted trajectory against its reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    #[serde(rename = "ATE")]
    pub ate: f64,
    #[serde(rename = "RMSE_r")]
    pub rmse_r: f64,
    #[serde(rename = "RMSE_t")]
    pub rmse_t: f64,
    #[serde(rename = "RPE_r")]
    pub rpe_r: f64,
    #[serde(rename = "RPE_t")]
    pub rpe_t: f64,
    #[serde(rename = "RPE_divider")]
    pub rpe_divider: f64,
}

impl MetricsRecord {
    /// `(name, value)` pairs in reporting order.
    pub fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("ATE", self.ate),
            ("RMSE_r", self.rmse_r),
            ("RMSE_t", self.rmse_t),
            ("RPE_r", self.rpe_r),
            ("RPE_t", self.rpe_t),
            ("RPE_divider", self.rpe_divider),
        ]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries()
            .into_iter()
            .find(|(key, _)| *key == name)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for MetricsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries()
            .iter()
            .map(|(k, v)| format!("{k}: {v:.6}"))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Index pairs over which RPE is accumulated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RpeIndicesRepr", into = "RpeIndicesRepr")]
pub enum RpeIndices {
    /// Every pair `(i, j)` of shared indices with `i < j`.
    Full,
    /// Pairs `(i, i + offset)` for each offset.
    Offsets(Vec<usize>),
    /// Explicit pairs.
    Pairs(Vec<(FrameIndex, FrameIndex)>),
}

impl Default for RpeIndices {
    fn default() -> Self {
        Self::Offsets(vec![1])
    }
}

impl RpeIndices {
    /// Pairs to evaluate, restricted to the given shared indices (ascending).
    pub fn pairs(&self, shared: &[FrameIndex]) -> Vec<(FrameIndex, FrameIndex)> {
        let present = |i: &FrameIndex| shared.binary_search(i).is_ok();
        match self {
            Self::Full => shared
                .iter()
                .enumerate()
                .flat_map(move |(k, &i)| shared[k + 1..].iter().map(move |&j| (i, j)))
                .collect(),
            Self::Offsets(offsets) => offsets
                .iter()
                .filter(|&&d| d > 0)
                .flat_map(move |&d| {
                    shared
                        .iter()
                        .filter_map(move |&i| Some((i, i.checked_add(d)?)))
                        .filter(move |(_, j)| present(j))
                })
                .collect(),
            Self::Pairs(pairs) => pairs
                .iter()
                .copied()
                .filter(|(i, j)| present(i) && present(j))
                .collect(),
        }
    }
}

/// Parses `full` or a comma-separated list of offsets.
impl FromStr for RpeIndices {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("full") {
            return Ok(Self::Full);
        }
        s.split(',')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|e| format!("invalid RPE offset '{part}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Offsets)
    }
}

/// Serialized form: `"full"`, `[1, 5]` or `[[0, 10], [3, 7]]`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RpeIndicesRepr {
    Keyword(String),
    Offsets(Vec<usize>),
    Pairs(Vec<(FrameIndex, FrameIndex)>),
}

impl TryFrom<RpeIndicesRepr> for RpeIndices {
    type Error = String;

    fn try_from(repr: RpeIndicesRepr) -> Result<Self, Self::Error> {
        match repr {
            RpeIndicesRepr::Keyword(k) => k.parse(),
            RpeIndicesRepr::Offsets(o) => Ok(Self::Offsets(o)),
            RpeIndicesRepr::Pairs(p) => Ok(Self::Pairs(p)),
        }
    }
}

impl From<RpeIndices> for RpeIndicesRepr {
    fn from(indices: RpeIndices) -> Self {
        match indices {
            RpeIndices::Full => Self::Keyword("full".into()),
            RpeIndices::Offsets(o) => Self::Offsets(o),
            RpeIndices::Pairs(p) => Self::Pairs(p),
        }
    }
}

/// Alignment applied before ATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentMode {
    /// Rotation and translation.
    #[default]
    Rigid,
    /// Rotation, translation and scale.
    Similarity,
}

/// Evaluation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub rpe_indices: RpeIndices,
    pub alignment: AlignmentMode,
}

/// Compare `predicted` against `reference` over their shared indices.
pub fn calculate_metrics(
    reference: &Trajectory,
    predicted: &Trajectory,
    config: &EvaluationConfig,
) -> Result<MetricsRecord, EvaluationError> {
    let shared = reference.shared_indices(predicted);
    if shared.len() < MIN_SHARED_INDICES {
        return Err(EvaluationError::InsufficientOverlap {
            shared: shared.len(),
            required: MIN_SHARED_INDICES,
        });
    }

    let pairs: Vec<_> = shared
        .iter()
        .filter_map(|&i| Some((*reference.get(i)?, *predicted.get(i)?)))
        .collect();
    let n = pairs.len() as f64;

    // ATE
    let source: Vec<_> = pairs.iter().map(|(_, p)| p.translation).collect();
    let target: Vec<_> = pairs.iter().map(|(r, _)| r.translation).collect();
    let alignment = align_points(
        &source,
        &target,
        config.alignment == AlignmentMode::Similarity,
    )
    .ok_or(EvaluationError::DegenerateAlignment)?;
    let ate_sq: f64 = source
        .iter()
        .zip(&target)
        .map(|(p, q)| (alignment.transform_point(p) - q).norm_squared())
        .sum();

    // RMSE, no alignment
    let (rot_sq, trans_sq) = pairs.iter().fold((0.0, 0.0), |(r, t), (gt, pred)| {
        let angle = gt.rotation.angle_to(&pred.rotation);
        (
            r + angle * angle,
            t + (pred.translation - gt.translation).norm_squared(),
        )
    });

    // RPE sums
    let mut rpe_r = 0.0;
    let mut rpe_t = 0.0;
    let mut divider = 0usize;
    for (i, j) in config.rpe_indices.pairs(&shared) {
        let (Some(gt_i), Some(gt_j), Some(pred_i), Some(pred_j)) = (
            reference.get(i),
            reference.get(j),
            predicted.get(i),
            predicted.get(j),
        ) else {
            continue;
        };
        let error = gt_i.between(gt_j).between(&pred_i.between(pred_j));
        let angle = error.rotation_angle();
        rpe_r += angle * angle;
        rpe_t += error.translation.norm_squared();
        divider += 1;
    }

    Ok(MetricsRecord {
        ate: (ate_sq / n).sqrt(),
        rmse_r: (rot_sq / n).sqrt(),
        rmse_t: (trans_sq / n).sqrt(),
        rpe_r,
        rpe_t,
        rpe_divider: divider as f64,
    })
}

/// Per-pair averages: RPE sums divided by the divider, which becomes 1.
///
/// A record with no RPE pairs is returned unchanged. Apply only when
/// reporting; pool raw records first with [`pool_metrics`].
pub fn normalize_metrics(record: &MetricsRecord) -> MetricsRecord {
    if record.rpe_divider <= 0.0 {
        return *record;
    }
    MetricsRecord {
        rpe_r: record.rpe_r / record.rpe_divider,
        rpe_t: record.rpe_t / record.rpe_divider,
        rpe_divider: 1.0,
        ..*record
    }
}

/// Field-wise mean of the records, `None` when empty.
pub fn average_metrics(records: &[MetricsRecord]) -> Option<MetricsRecord> {
    if records.is_empty() {
        return None;
    }
    let n = records.len() as f64;
    let mean = |f: fn(&MetricsRecord) -> f64| records.iter().map(f).sum::<f64>() / n;
    Some(MetricsRecord {
        ate: mean(|r| r.ate),
        rmse_r: mean(|r| r.rmse_r),
        rmse_t: mean(|r| r.rmse_t),
        rpe_r: mean(|r| r.rpe_r),
        rpe_t: mean(|r| r.rpe_t),
        rpe_divider: mean(|r| r.rpe_divider),
    })
}

/// Pool raw records: RPE sums and dividers are added, the remaining
/// metrics averaged. Normalize the result once to get pooled per-pair RPE.
pub fn pool_metrics(records: &[MetricsRecord]) -> Option<MetricsRecord> {
    let averaged = average_metrics(records)?;
    let sum = |f: fn(&MetricsRecord) -> f64| records.iter().map(f).sum::<f64>();
    Some(MetricsRecord {
        rpe_r: sum(|r| r.rpe_r),
        rpe_t: sum(|r| r.rpe_t),
        rpe_divider: sum(|r| r.rpe_divider),
        ..averaged
    })
}
