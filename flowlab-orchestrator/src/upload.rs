//! Upload handler for the surface mesh
//!
//! The uploaded bytes are written verbatim into the case directory at the
//! path the solver's case layout expects. The extension filter and a size
//! limit are the only gates; mesh validity is left to the solver.

use crate::CaseConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from storing an uploaded mesh
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File type not allowed: '{name}' (accepted: {allowed})")]
    ExtensionNotAllowed { name: String, allowed: String },

    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What an upload is checked against
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub allowed_extensions: Vec<String>,
    pub max_bytes: usize,
}

impl UploadPolicy {
    pub fn new(case: &CaseConfig, max_bytes: usize) -> Self {
        Self {
            allowed_extensions: case.allowed_extensions.clone(),
            max_bytes,
        }
    }

    /// Check the client-side file name against the extension filter
    pub fn check_name(&self, file_name: &str) -> Result<(), UploadError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext {
            Some(ext) if self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)) => {
                Ok(())
            }
            _ => Err(UploadError::ExtensionNotAllowed {
                name: file_name.to_string(),
                allowed: self.allowed_extensions.join(", "),
            }),
        }
    }
}

/// Write an uploaded mesh into `case_dir/mesh_path`, replacing any previous upload.
///
/// Returns the absolute target path.
pub fn store_mesh(
    case_dir: &Path,
    mesh_path: &Path,
    file_name: &str,
    bytes: &[u8],
    policy: &UploadPolicy,
) -> Result<PathBuf, UploadError> {
    policy.check_name(file_name)?;

    if bytes.len() > policy.max_bytes {
        return Err(UploadError::TooLarge {
            size: bytes.len(),
            limit: policy.max_bytes,
        });
    }

    let target = case_dir.join(mesh_path);
    if let Some(parent) = target.parent() {
        debug!("Ensuring mesh directory {:?}", parent);
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, bytes)?;

    info!(
        file_name = file_name,
        bytes = bytes.len(),
        target = %target.display(),
        "Stored uploaded mesh"
    );

    Ok(target)
}

/// Whether a mesh has been uploaded into the case directory
pub fn has_mesh(case_dir: &Path, mesh_path: &Path) -> bool {
    case_dir.join(mesh_path).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> UploadPolicy {
        UploadPolicy::new(&CaseConfig::default(), 1024)
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mesh_path = CaseConfig::default().mesh_path;
        let bytes: Vec<u8> = (0..=255u8).cycle().take(700).collect();

        let target = store_mesh(dir.path(), &mesh_path, "model.stl", &bytes, &policy()).unwrap();

        assert_eq!(target, dir.path().join("constant/triSurface/car.stl"));
        assert_eq!(std::fs::read(&target).unwrap(), bytes);
        assert!(has_mesh(dir.path(), &mesh_path));
    }

    #[test]
    fn test_store_replaces_previous_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mesh_path = CaseConfig::default().mesh_path;

        store_mesh(dir.path(), &mesh_path, "a.stl", b"first upload, longer", &policy()).unwrap();
        let target = store_mesh(dir.path(), &mesh_path, "b.STL", b"second", &policy()).unwrap();

        assert_eq!(std::fs::read(target).unwrap(), b"second");
    }

    #[test]
    fn test_extension_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mesh_path = CaseConfig::default().mesh_path;

        let result = store_mesh(dir.path(), &mesh_path, "model.obj", b"v 0 0 0", &policy());
        assert!(matches!(result, Err(UploadError::ExtensionNotAllowed { .. })));

        let result = store_mesh(dir.path(), &mesh_path, "noextension", b"data", &policy());
        assert!(matches!(result, Err(UploadError::ExtensionNotAllowed { .. })));

        assert!(!has_mesh(dir.path(), &mesh_path));
    }

    #[test]
    fn test_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mesh_path = CaseConfig::default().mesh_path;
        let big = vec![0u8; 2048];

        let result = store_mesh(dir.path(), &mesh_path, "big.stl", &big, &policy());
        assert!(matches!(result, Err(UploadError::TooLarge { size: 2048, limit: 1024 })));
    }

    #[test]
    fn test_empty_upload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mesh_path = CaseConfig::default().mesh_path;

        store_mesh(dir.path(), &mesh_path, "full.stl", b"solid car\n", &policy()).unwrap();
        let target = store_mesh(dir.path(), &mesh_path, "empty.stl", &[], &policy()).unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), Vec::<u8>::new());
        assert!(has_mesh(dir.path(), &mesh_path));
    }
}
