//! FlowLab Orchestrator - session-scoped front-end for an external CFD solver
//!
//! This crate provides:
//! - Per-session case directories with explicit lifecycle and reaping
//! - Asynchronous solver jobs with merged, streamed output and cancellation
//! - A reader for the solver's ASCII result case (mesh, boundary patches, velocity)
//! - Streamline tracing, tube sweeping and binary glTF (GLB) export
//! - REST API and single-page viewer for external integration

pub mod api;
pub mod export;
pub mod flow;
pub mod foam;
pub mod postprocess;
pub mod presentation;
pub mod scene;
pub mod session;
pub mod solver;
pub mod upload;

pub use postprocess::{visualize, Visualization, VisualizeError};
pub use session::{Session, SessionStore};
pub use solver::{JobState, SolverJob, SolverSpec};

use std::path::PathBuf;

/// Configuration for the FlowLab service
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LabConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Directory holding one case directory per session
    #[serde(default = "default_sessions_root")]
    pub sessions_root: PathBuf,

    /// Case directory copied into every new session (solver dictionaries, Allrun)
    #[serde(default)]
    pub template_case: Option<PathBuf>,

    /// Idle time after which a session is reaped
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// How often the reaper looks for idle sessions
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Upload size limit in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default)]
    pub solver: SolverConfig,

    #[serde(default)]
    pub case: CaseConfig,

    #[serde(default)]
    pub visual: VisualConfig,

    #[serde(default)]
    pub viewer: ViewerConfig,
}

fn default_listen_addr() -> String { "0.0.0.0:8501".to_string() }
fn default_sessions_root() -> PathBuf { PathBuf::from("sessions") }
fn default_session_ttl_secs() -> u64 { 3600 }
fn default_reap_interval_secs() -> u64 { 60 }
fn default_max_upload_bytes() -> usize { 256 * 1024 * 1024 }

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            sessions_root: default_sessions_root(),
            template_case: None,
            session_ttl_secs: default_session_ttl_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            solver: SolverConfig::default(),
            case: CaseConfig::default(),
            visual: VisualConfig::default(),
            viewer: ViewerConfig::default(),
        }
    }
}

impl LabConfig {
    /// Parse a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

/// How the external solver is launched
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SolverConfig {
    /// Interpreter used to run the script
    #[serde(default = "default_shell")]
    pub shell: PathBuf,

    /// Script path, relative to the case directory
    #[serde(default = "default_script")]
    pub script: PathBuf,

    /// Kill the solver after this many seconds (None = wait forever)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Output lines retained per job
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

fn default_shell() -> PathBuf { PathBuf::from("/bin/bash") }
fn default_script() -> PathBuf { PathBuf::from("./Allrun") }
fn default_log_capacity() -> usize { 10_000 }

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            script: default_script(),
            timeout_secs: None,
            log_capacity: default_log_capacity(),
        }
    }
}

/// Fixed file layout inside a case directory
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CaseConfig {
    /// Where the uploaded surface mesh is written
    #[serde(default = "default_mesh_path")]
    pub mesh_path: PathBuf,

    /// Accepted upload extensions (lowercase, without dot)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// File whose presence signals that the solver produced results
    #[serde(default = "default_marker_file")]
    pub marker_file: String,

    /// Exported GLB file name
    #[serde(default = "default_export_file")]
    pub export_file: String,

    /// File name offered to the browser on download
    #[serde(default = "default_download_name")]
    pub download_name: String,
}

fn default_mesh_path() -> PathBuf { PathBuf::from("constant/triSurface/car.stl") }
fn default_allowed_extensions() -> Vec<String> { vec!["stl".to_string()] }
fn default_marker_file() -> String { "result.foam".to_string() }
fn default_export_file() -> String { "view.glb".to_string() }
fn default_download_name() -> String { "audi_flow_results.glb".to_string() }

impl Default for CaseConfig {
    fn default() -> Self {
        Self {
            mesh_path: default_mesh_path(),
            allowed_extensions: default_allowed_extensions(),
            marker_file: default_marker_file(),
            export_file: default_export_file(),
            download_name: default_download_name(),
        }
    }
}

/// Parameters of the flow visualization
#[derive(Debug, Clone, serde::Deserialize)]
pub struct VisualConfig {
    /// Boundary patch rendered as the body surface, if present
    #[serde(default = "default_body_patch")]
    pub body_patch: String,

    /// Vector field traced by the streamlines
    #[serde(default = "default_velocity_field")]
    pub velocity_field: String,

    #[serde(default = "default_seed_count")]
    pub seed_count: usize,

    #[serde(default = "default_seed_center")]
    pub seed_center: [f64; 3],

    #[serde(default = "default_seed_radius")]
    pub seed_radius: f64,

    /// RNG seed for seed placement; fixed so exports are reproducible
    #[serde(default)]
    pub seed_rng: u64,

    #[serde(default = "default_tube_radius")]
    pub tube_radius: f64,

    #[serde(default = "default_tube_sides")]
    pub tube_sides: usize,

    /// Integration steps per direction
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Integration step as a fraction of the local cell size
    #[serde(default = "default_step_factor")]
    pub step_factor: f64,

    /// "turbo", "viridis" or "jet"
    #[serde(default = "default_colormap")]
    pub colormap: String,

    #[serde(default = "default_background")]
    pub background: String,
}

fn default_body_patch() -> String { "car".to_string() }
fn default_velocity_field() -> String { "U".to_string() }
fn default_seed_count() -> usize { 100 }
fn default_seed_center() -> [f64; 3] { [0.0, 0.0, 1.0] }
fn default_seed_radius() -> f64 { 2.0 }
fn default_tube_radius() -> f64 { 0.015 }
fn default_tube_sides() -> usize { 8 }
fn default_max_steps() -> usize { 2000 }
fn default_step_factor() -> f64 { 0.2 }
fn default_colormap() -> String { "turbo".to_string() }
fn default_background() -> String { "#111111".to_string() }

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            body_patch: default_body_patch(),
            velocity_field: default_velocity_field(),
            seed_count: default_seed_count(),
            seed_center: default_seed_center(),
            seed_radius: default_seed_radius(),
            seed_rng: 0,
            tube_radius: default_tube_radius(),
            tube_sides: default_tube_sides(),
            max_steps: default_max_steps(),
            step_factor: default_step_factor(),
            colormap: default_colormap(),
            background: default_background(),
        }
    }
}

/// Embedded web viewer settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_script_url")]
    pub script_url: String,

    /// Height of the model-viewer element
    #[serde(default = "default_height_px")]
    pub height_px: u32,

    /// Height of the surrounding frame
    #[serde(default = "default_frame_height_px")]
    pub frame_height_px: u32,
}

fn default_script_url() -> String {
    "https://unpkg.com/@google/model-viewer/dist/model-viewer.min.js".to_string()
}
fn default_height_px() -> u32 { 550 }
fn default_frame_height_px() -> u32 { 600 }

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            script_url: default_script_url(),
            height_px: default_height_px(),
            frame_height_px: default_frame_height_px(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = LabConfig::from_toml("").unwrap();
        assert_eq!(config.case.marker_file, "result.foam");
        assert_eq!(config.case.mesh_path, PathBuf::from("constant/triSurface/car.stl"));
        assert_eq!(config.solver.script, PathBuf::from("./Allrun"));
        assert_eq!(config.visual.seed_count, 100);
        assert_eq!(config.visual.seed_center, [0.0, 0.0, 1.0]);
        assert!(config.solver.timeout_secs.is_none());
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let config = LabConfig::from_toml(include_str!("../../flowlab.toml")).unwrap();
        let defaults = LabConfig::default();
        assert_eq!(config.listen_addr, defaults.listen_addr);
        assert_eq!(config.max_upload_bytes, defaults.max_upload_bytes);
        assert_eq!(config.case.download_name, defaults.case.download_name);
        assert_eq!(config.visual.tube_radius, defaults.visual.tube_radius);
        assert_eq!(config.viewer.frame_height_px, defaults.viewer.frame_height_px);
    }

    #[test]
    fn test_partial_override() {
        let config = LabConfig::from_toml(
            r#"
            sessions_root = "/tmp/flowlab"

            [solver]
            timeout_secs = 600

            [visual]
            body_patch = "vehicle"
            tube_radius = 0.02
            "#,
        )
        .unwrap();

        assert_eq!(config.sessions_root, PathBuf::from("/tmp/flowlab"));
        assert_eq!(config.solver.timeout_secs, Some(600));
        assert_eq!(config.solver.shell, PathBuf::from("/bin/bash"));
        assert_eq!(config.visual.body_patch, "vehicle");
        assert_eq!(config.visual.tube_radius, 0.02);
        assert_eq!(config.visual.colormap, "turbo");
    }
}
