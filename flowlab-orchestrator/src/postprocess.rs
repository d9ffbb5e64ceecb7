//! Turn a finished case into a browser-ready 3D asset
//!
//! Reads the latest result time, renders the body surface and velocity
//! streamlines into a [`Scene`] and exports it as GLB next to the case.
//! Every failure maps onto one [`VisualizeError`] variant so callers can
//! report it once and carry on.

use nalgebra::Vector3;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::export::{export_glb, ExportError};
use crate::flow::{self, Colormap, TraceParams, VelocityProbe};
use crate::foam::{CaseReader, FoamError};
use crate::scene::{Scene, SceneNode};
use crate::{CaseConfig, VisualConfig};

const BODY_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

#[derive(Error, Debug)]
pub enum VisualizeError {
    #[error("No simulation results found at {0}")]
    DatasetNotFound(PathBuf),

    #[error("Simulation results could not be read: {0}")]
    DatasetUnreadable(#[source] FoamError),

    #[error("Result field '{field}' is missing at time {time}")]
    FieldMissing { field: String, time: String },

    #[error("Failed to export the 3D view: {0}")]
    ExportFailed(#[from] ExportError),
}

impl VisualizeError {
    /// Stable identifier for API clients
    pub fn kind(&self) -> &'static str {
        match self {
            VisualizeError::DatasetNotFound(_) => "dataset_not_found",
            VisualizeError::DatasetUnreadable(_) => "dataset_unreadable",
            VisualizeError::FieldMissing { .. } => "field_missing",
            VisualizeError::ExportFailed(_) => "export_failed",
        }
    }
}

impl From<FoamError> for VisualizeError {
    fn from(e: FoamError) -> Self {
        match e {
            FoamError::NotFound(path) => VisualizeError::DatasetNotFound(path),
            FoamError::FieldMissing { field, time } => VisualizeError::FieldMissing { field, time },
            other => VisualizeError::DatasetUnreadable(other),
        }
    }
}

/// Result of one post-processing run
#[derive(Debug, Clone)]
pub struct Visualization {
    /// Encoded GLB, identical to the file at `asset_path`
    pub glb: Vec<u8>,
    pub asset_path: PathBuf,
    /// Peak velocity magnitude over the cells, in m/s
    pub max_velocity: f64,
    /// Name of the time step shown
    pub time: String,
    pub has_body: bool,
    pub streamline_count: usize,
}

/// Whether the solver left its completion marker in `case_dir`
pub fn marker_present(case_dir: &Path, case: &CaseConfig) -> bool {
    case_dir.join(&case.marker_file).is_file()
}

/// Largest vector magnitude, 0 for an empty field
pub fn max_velocity(values: &[Vector3<f64>]) -> f64 {
    values.iter().map(|v| v.norm()).fold(0.0, f64::max)
}

/// Post-process the case in `case_dir`.
///
/// This is CPU bound; async callers should run it on a blocking worker.
pub fn visualize(
    case_dir: &Path,
    visual: &VisualConfig,
    case: &CaseConfig,
) -> Result<Visualization, VisualizeError> {
    let started = Instant::now();
    let marker = case_dir.join(&case.marker_file);
    if !marker.is_file() {
        return Err(VisualizeError::DatasetNotFound(marker));
    }

    let reader = CaseReader::open(&marker)?;
    let time = reader
        .latest_time()
        .cloned()
        .ok_or_else(|| FoamError::NoTimeSteps(reader.root().to_path_buf()))?;
    let dataset = reader.read(&time, &[visual.velocity_field.as_str()])?;

    let velocities = dataset
        .internal
        .field(&visual.velocity_field)
        .ok_or_else(|| VisualizeError::FieldMissing {
            field: visual.velocity_field.clone(),
            time: time.name.clone(),
        })?;

    let mut scene = Scene::new(&visual.background);

    let body = dataset.patch(&visual.body_patch);
    let has_body = body.is_some_and(|p| !p.surface.triangles.is_empty());
    match body {
        Some(patch) => scene.push(SceneNode::from_surface(&patch.name, &patch.surface, BODY_COLOR)),
        None => warn!(
            patch = visual.body_patch.as_str(),
            available = ?dataset.patch_names(),
            "Body patch not found, exporting streamlines only"
        ),
    }

    let colormap = visual.colormap.parse::<Colormap>().unwrap_or_else(|e| {
        warn!("{}, using turbo", e);
        Colormap::Turbo
    });

    let mut streamline_count = 0;
    if let Some(probe) = VelocityProbe::new(
        &dataset.internal.cell_centres,
        &dataset.internal.cell_sizes,
        velocities,
        dataset.bounds,
    ) {
        let seeds = flow::seed_sphere(
            Vector3::from(visual.seed_center),
            visual.seed_radius,
            visual.seed_count,
            visual.seed_rng,
        );
        let params = TraceParams {
            step_factor: visual.step_factor,
            max_steps: visual.max_steps,
        };
        let lines = flow::trace_streamlines(&probe, &seeds, &params);
        streamline_count = lines.len();

        let (lo, hi) = lines
            .iter()
            .flat_map(|l| l.speeds.iter().copied())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s), hi.max(s)));

        let mut tubes = flow::TubeMesh::default();
        for line in &lines {
            tubes.append(&flow::sweep_tube(
                &line.points,
                &line.speeds,
                visual.tube_radius,
                visual.tube_sides,
            ));
        }
        scene.push(SceneNode::from_tubes("streamlines", &tubes, |speed| {
            colormap.sample_range(speed, lo, hi)
        }));
    }

    let asset_path = case_dir.join(&case.export_file);
    let glb = export_glb(&scene, &asset_path)?;
    let max_velocity = max_velocity(velocities);

    info!(
        case = %case_dir.display(),
        time = time.name.as_str(),
        streamlines = streamline_count,
        has_body = has_body,
        max_velocity = max_velocity,
        bytes = glb.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Visualization ready"
    );

    Ok(Visualization {
        glb,
        asset_path,
        max_velocity,
        time: time.name,
        has_body,
        streamline_count,
    })
}
