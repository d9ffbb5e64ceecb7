//! Streamline geometry from a sampled velocity field
//!
//! - [`probe`] interpolates cell velocities at arbitrary points
//! - [`streamline`] seeds and integrates streamlines
//! - [`tube`] sweeps streamlines into triangle meshes
//! - [`colormap`] maps speeds to colours

pub mod colormap;
pub mod probe;
pub mod streamline;
pub mod tube;

pub use colormap::Colormap;
pub use probe::{Sample, VelocityProbe};
pub use streamline::{seed_sphere, trace_streamlines, Streamline, TraceParams};
pub use tube::{sweep_tube, TubeMesh};
