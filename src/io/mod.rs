//! Tabular measurement input and trajectory output.
//!
//! Measurement and ground-truth tables share one CSV schema: `from_index`,
//! `to_index`, the Euler pose delta `euler_x, euler_y, euler_z, t_x, t_y,
//! t_z`, optional `<column>_confidence` columns and an optional
//! `trajectory_id` column grouping rows into several trajectories.

mod table;

pub use table::{
    group_rows, read_ground_truth, read_measurement_sets, read_measurements, rows_from_reader,
    trajectory_to_writer, write_measurements, write_trajectory, MeasurementRow,
    DEFAULT_TRAJECTORY_ID,
};
