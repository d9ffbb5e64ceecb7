//! Reader for the solver's result case
//!
//! The case is opened through its marker file (`result.foam`); the marker's
//! directory is the case root. Only ASCII files are understood. The reader
//! exposes the available time values, the boundary patch names, and loads a
//! single time step into a [`CaseDataset`]:
//!
//! - internal mesh: one sample per cell (centre, local size, vector fields)
//! - boundary patches: triangulated surfaces, one per patch
//!
//! Zero time is skipped: `0/` holds initial conditions, not results.

mod mesh;
mod tokenizer;

pub use mesh::{Aabb, BoundaryPatch, InternalMesh, TriSurface};

use nalgebra::Vector3;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use tokenizer::Parser;

/// Errors from reading a result case
#[derive(Error, Debug)]
pub enum FoamError {
    #[error("Result case not found: {0}")]
    NotFound(PathBuf),

    #[error("No result time steps in {0}")]
    NoTimeSteps(PathBuf),

    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Field '{field}' not found at time {time}")]
    FieldMissing { field: String, time: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One time directory of the case
#[derive(Debug, Clone, PartialEq)]
pub struct TimeValue {
    pub value: f64,
    /// Directory name as written by the solver, e.g. "500" or "0.05"
    pub name: String,
}

/// Opened result case
#[derive(Debug, Clone)]
pub struct CaseReader {
    root: PathBuf,
    times: Vec<TimeValue>,
}

impl CaseReader {
    /// Open the case that `marker` belongs to
    pub fn open(marker: &Path) -> Result<Self, FoamError> {
        if !marker.exists() {
            return Err(FoamError::NotFound(marker.to_path_buf()));
        }
        let root = match marker.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let times = scan_times(&root)?;
        info!(
            case = %root.display(),
            times = times.len(),
            latest = times.last().map(|t| t.name.as_str()),
            "Opened result case"
        );

        Ok(Self { root, times })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Result times in ascending order, zero time excluded
    pub fn time_values(&self) -> &[TimeValue] {
        &self.times
    }

    pub fn latest_time(&self) -> Option<&TimeValue> {
        self.times.last()
    }

    /// Names of the boundary patches of the mesh used at `time`
    pub fn patch_names(&self, time: &TimeValue) -> Result<Vec<String>, FoamError> {
        let dir = self.poly_mesh_dir(time);
        let entries = mesh::read_boundary(&dir.join("boundary"))?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    /// Load mesh, all boundary patches and the requested vector fields at `time`
    pub fn read(&self, time: &TimeValue, vector_fields: &[&str]) -> Result<CaseDataset, FoamError> {
        let poly_mesh = self.poly_mesh_dir(time);
        debug!("Reading mesh from {:?}", poly_mesh);

        let topology = mesh::PolyMesh::read(&poly_mesh)?;
        let mut internal = topology.internal_mesh();
        let patches = topology.boundary_patches();

        let time_dir = self.root.join(&time.name);
        for &field in vector_fields {
            let path = time_dir.join(field);
            if !path.is_file() {
                return Err(FoamError::FieldMissing {
                    field: field.to_string(),
                    time: time.name.clone(),
                });
            }
            let values = read_vector_field(&path, internal.cell_count())?;
            internal.fields.insert(field.to_string(), values);
        }

        info!(
            time = time.name.as_str(),
            cells = internal.cell_count(),
            patches = patches.len(),
            "Loaded result dataset"
        );

        Ok(CaseDataset {
            time: time.clone(),
            bounds: topology.bounds(),
            internal,
            patches,
        })
    }

    /// Meshes that move or change are written per time step
    fn poly_mesh_dir(&self, time: &TimeValue) -> PathBuf {
        let per_time = self.root.join(&time.name).join("polyMesh");
        if per_time.join("points").is_file() {
            per_time
        } else {
            self.root.join("constant").join("polyMesh")
        }
    }
}

/// One time step of the result case in memory
#[derive(Debug, Clone)]
pub struct CaseDataset {
    pub time: TimeValue,
    pub internal: InternalMesh,
    pub patches: Vec<BoundaryPatch>,
    pub bounds: Aabb,
}

impl CaseDataset {
    pub fn patch(&self, name: &str) -> Option<&BoundaryPatch> {
        self.patches.iter().find(|p| p.name == name)
    }

    pub fn patch_names(&self) -> Vec<&str> {
        self.patches.iter().map(|p| p.name.as_str()).collect()
    }
}

fn scan_times(root: &Path) -> Result<Vec<TimeValue>, FoamError> {
    let entries = std::fs::read_dir(root).map_err(|e| FoamError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut times: Vec<TimeValue> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            let value = name.parse::<f64>().ok()?;
            (value.is_finite() && value != 0.0).then_some(TimeValue { value, name })
        })
        .collect();

    times.sort_by(|a, b| a.value.total_cmp(&b.value));
    Ok(times)
}

/// Read `internalField` of a vector field file, expanding uniform values
fn read_vector_field(path: &Path, cells: usize) -> Result<Vec<Vector3<f64>>, FoamError> {
    let mut parser = Parser::open(path)?;
    if !parser.seek_keyword("internalField") {
        return Err(parser.error("no internalField entry"));
    }

    let values = match parser.read_word()?.as_str() {
        "uniform" => {
            let v = parser.read_vector()?;
            vec![Vector3::new(v[0], v[1], v[2]); cells]
        }
        "nonuniform" => {
            let kind = parser.read_word()?;
            if kind != "List<vector>" {
                return Err(parser.error(format!("expected List<vector>, found {}", kind)));
            }
            parser
                .read_list_within(cells, |p| p.read_vector())?
                .into_iter()
                .map(|v| Vector3::new(v[0], v[1], v[2]))
                .collect()
        }
        other => return Err(parser.error(format!("unknown field form '{}'", other))),
    };

    if values.len() != cells {
        return Err(parser.error(format!(
            "field has {} values but the mesh has {} cells",
            values.len(),
            cells
        )));
    }
    Ok(values)
}

/// Lookup of named vector fields on the internal mesh
pub type FieldMap = HashMap<String, Vec<Vector3<f64>>>;


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_missing_marker() {
        let dir = tempfile::tempdir().unwrap();
        let result = CaseReader::open(&dir.path().join("result.foam"));
        assert!(matches!(result, Err(FoamError::NotFound(_))));
    }

    #[test]
    fn test_time_values_skip_zero_and_sort() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["0", "100", "20", "0.5", "constant", "system"] {
            std::fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("result.foam"), "").unwrap();

        let reader = CaseReader::open(&dir.path().join("result.foam")).unwrap();
        let names: Vec<&str> = reader.time_values().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["0.5", "20", "100"]);
        assert_eq!(reader.latest_time().unwrap().name, "100");
    }

    #[test]
    fn test_read_box_case() {
        let dir = tempfile::tempdir().unwrap();
        let cells = write_box_case(dir.path(), 2, 0.0, 2.0, true);
        let velocities: Vec<[f64; 3]> = (0..cells).map(|i| [i as f64, 0.0, 0.0]).collect();
        write_vector_field(dir.path(), "10", "U", &velocities);
        std::fs::write(dir.path().join("result.foam"), "").unwrap();

        let reader = CaseReader::open(&dir.path().join("result.foam")).unwrap();
        let time = reader.latest_time().unwrap().clone();

        let mut names = reader.patch_names(&time).unwrap();
        names.sort();
        assert_eq!(names, vec!["body", "walls"]);

        let dataset = reader.read(&time, &["U"]).unwrap();
        assert_eq!(dataset.internal.cell_count(), 8);
        assert_eq!(dataset.internal.fields["U"][7], Vector3::new(7.0, 0.0, 0.0));

        // Cell 0 spans [0,1]^3
        let c0 = dataset.internal.cell_centres[0];
        assert_relative_eq!(c0.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(c0.y, 0.5, epsilon = 1e-9);
        assert_relative_eq!(c0.z, 0.5, epsilon = 1e-9);
        assert_relative_eq!(dataset.internal.cell_sizes[0], 1.0, epsilon = 1e-9);

        let body = dataset.patch("body").unwrap();
        assert_eq!(body.face_count, 4);
        assert_eq!(body.surface.triangles.len(), 8);
        assert!(body.surface.positions.iter().all(|p| p.x.abs() < 1e-12));

        assert_relative_eq!(dataset.bounds.max.z, 2.0);
    }

    #[test]
    fn test_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        write_box_case(dir.path(), 1, 0.0, 1.0, false);
        std::fs::create_dir_all(dir.path().join("5")).unwrap();
        std::fs::write(dir.path().join("result.foam"), "").unwrap();

        let reader = CaseReader::open(&dir.path().join("result.foam")).unwrap();
        let time = reader.latest_time().unwrap().clone();
        let result = reader.read(&time, &["U"]);
        assert!(matches!(result, Err(FoamError::FieldMissing { ref field, .. }) if field == "U"));
    }

    #[test]
    fn test_uniform_field() {
        let dir = tempfile::tempdir().unwrap();
        write_box_case(dir.path(), 2, 0.0, 1.0, false);
        std::fs::create_dir_all(dir.path().join("1")).unwrap();
        std::fs::write(
            dir.path().join("1/U"),
            "FoamFile { format ascii; class volVectorField; }\ninternalField uniform (10 0 0);\nboundaryField {}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("result.foam"), "").unwrap();

        let reader = CaseReader::open(&dir.path().join("result.foam")).unwrap();
        let dataset = reader.read(&reader.time_values()[0], &["U"]).unwrap();
        assert_eq!(dataset.internal.fields["U"].len(), 8);
        assert!(dataset.internal.fields["U"].iter().all(|u| *u == Vector3::new(10.0, 0.0, 0.0)));
    }

    #[test]
    fn test_field_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_box_case(dir.path(), 2, 0.0, 1.0, false);
        write_vector_field(dir.path(), "3", "U", &[[1.0, 0.0, 0.0]; 3]);
        std::fs::write(dir.path().join("result.foam"), "").unwrap();

        let reader = CaseReader::open(&dir.path().join("result.foam")).unwrap();
        let result = reader.read(&reader.time_values()[0], &["U"]);
        assert!(matches!(result, Err(FoamError::Parse { .. })));
    }
}
