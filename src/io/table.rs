use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use nalgebra::Vector6;
use serde::{Deserialize, Serialize};

use crate::estimator::MeasurementSet;
use crate::evaluation::GroundTruthTable;
use crate::geometry::SE3;
use crate::measurement::{FrameIndex, RelativeMeasurement, UNIT_CONFIDENCE};
use crate::trajectory::Trajectory;

/// Identifier given to rows without a `trajectory_id` column.
pub const DEFAULT_TRAJECTORY_ID: &str = "default";

fn unit_confidence() -> f64 {
    UNIT_CONFIDENCE
}

/// One row of a measurement or ground-truth table.
///
/// Pose columns are required; confidence columns default to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRow {
    #[serde(default)]
    pub trajectory_id: Option<String>,
    pub from_index: FrameIndex,
    pub to_index: FrameIndex,
    pub euler_x: f64,
    pub euler_y: f64,
    pub euler_z: f64,
    pub t_x: f64,
    pub t_y: f64,
    pub t_z: f64,
    #[serde(default = "unit_confidence")]
    pub euler_x_confidence: f64,
    #[serde(default = "unit_confidence")]
    pub euler_y_confidence: f64,
    #[serde(default = "unit_confidence")]
    pub euler_z_confidence: f64,
    #[serde(default = "unit_confidence")]
    pub t_x_confidence: f64,
    #[serde(default = "unit_confidence")]
    pub t_y_confidence: f64,
    #[serde(default = "unit_confidence")]
    pub t_z_confidence: f64,
}

impl MeasurementRow {
    pub fn to_measurement(&self) -> RelativeMeasurement {
        let pose = SE3::from_components(&[
            self.euler_x,
            self.euler_y,
            self.euler_z,
            self.t_x,
            self.t_y,
            self.t_z,
        ]);
        let confidence = Vector6::new(
            self.euler_x_confidence,
            self.euler_y_confidence,
            self.euler_z_confidence,
            self.t_x_confidence,
            self.t_y_confidence,
            self.t_z_confidence,
        );
        RelativeMeasurement::new(self.from_index, self.to_index, pose, confidence)
    }

    pub fn from_measurement(m: &RelativeMeasurement, trajectory_id: Option<String>) -> Self {
        let [euler_x, euler_y, euler_z, t_x, t_y, t_z] = m.delta_pose.to_components();
        let c = m.confidence;
        Self {
            trajectory_id,
            from_index: m.from_index,
            to_index: m.to_index,
            euler_x,
            euler_y,
            euler_z,
            t_x,
            t_y,
            t_z,
            euler_x_confidence: c[0],
            euler_y_confidence: c[1],
            euler_z_confidence: c[2],
            t_x_confidence: c[3],
            t_y_confidence: c[4],
            t_z_confidence: c[5],
        }
    }
}

/// One global pose of an output trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TrajectoryRow {
    index: FrameIndex,
    euler_x: f64,
    euler_y: f64,
    euler_z: f64,
    t_x: f64,
    t_y: f64,
    t_z: f64,
}

pub fn rows_from_reader<R: Read>(reader: R) -> Result<Vec<MeasurementRow>> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut rows = Vec::new();
    for (line, record) in rdr.deserialize::<MeasurementRow>().enumerate() {
        let row = record.with_context(|| format!("Invalid measurement row {}", line + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

fn read_rows(path: &Path) -> Result<Vec<MeasurementRow>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    rows_from_reader(file).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Group rows by `trajectory_id`, in order of first appearance.
pub fn group_rows(rows: &[MeasurementRow]) -> Vec<MeasurementSet> {
    let mut sets: Vec<MeasurementSet> = Vec::new();
    for row in rows {
        let id = row.trajectory_id.as_deref().unwrap_or(DEFAULT_TRAJECTORY_ID);
        let measurement = row.to_measurement();
        match sets.iter_mut().find(|s| s.id == id) {
            Some(set) => set.measurements.push(measurement),
            None => sets.push(MeasurementSet::new(id, vec![measurement])),
        }
    }
    sets
}

/// Every row of a measurement table, ignoring `trajectory_id`.
pub fn read_measurements(path: &Path) -> Result<Vec<RelativeMeasurement>> {
    Ok(read_rows(path)?.iter().map(MeasurementRow::to_measurement).collect())
}

/// Measurement table split into one set per `trajectory_id`.
pub fn read_measurement_sets(path: &Path) -> Result<Vec<MeasurementSet>> {
    Ok(group_rows(&read_rows(path)?))
}

/// Ground-truth table; each trajectory is rebuilt from its adjacent rows.
pub fn read_ground_truth(path: &Path) -> Result<GroundTruthTable> {
    let sets = read_measurement_sets(path)?;
    Ok(GroundTruthTable::from_measurements(
        sets.into_iter().map(|s| (s.id, s.measurements)),
    ))
}

pub fn write_measurements<W: Write>(
    writer: W,
    measurements: &[RelativeMeasurement],
    trajectory_id: Option<&str>,
) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    for m in measurements {
        wtr.serialize(MeasurementRow::from_measurement(
            m,
            trajectory_id.map(str::to_string),
        ))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn trajectory_to_writer<W: Write>(writer: W, trajectory: &Trajectory) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    for (index, pose) in trajectory.iter() {
        let [euler_x, euler_y, euler_z, t_x, t_y, t_z] = pose.to_components();
        wtr.serialize(TrajectoryRow {
            index,
            euler_x,
            euler_y,
            euler_z,
            t_x,
            t_y,
            t_z,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_trajectory(path: &Path, trajectory: &Trajectory) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    trajectory_to_writer(file, trajectory)
}
