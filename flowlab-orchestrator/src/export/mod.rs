//! Scene export for the browser viewer

mod glb;

#[cfg(test)]
pub(crate) use glb::testing;
pub use glb::write_glb;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::scene::Scene;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Scene has no geometry to export")]
    EmptyScene,

    #[error("Mesh '{node}' is invalid: {reason}")]
    InvalidMesh { node: String, reason: String },

    #[error("Exported asset would be {0} bytes, over the 4 GiB container limit")]
    TooLarge(usize),

    #[error("Failed to encode scene description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Encode `scene` and write it to `path`, returning the encoded bytes
pub fn export_glb(scene: &Scene, path: &Path) -> Result<Vec<u8>, ExportError> {
    let bytes = write_glb(scene)?;
    std::fs::write(path, &bytes).map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), nodes = scene.nodes.len(), "Wrote GLB");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneNode;

    #[test]
    fn test_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view.glb");
        let mut scene = Scene::new("#111111");
        scene.push(SceneNode {
            name: "car".to_string(),
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            indices: vec![0, 1, 2],
            colors: None,
            base_color: [1.0; 4],
        });

        let bytes = export_glb(&scene, &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_export_to_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("view.glb");
        let mut scene = Scene::new("#111111");
        scene.push(SceneNode {
            name: "car".to_string(),
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            indices: vec![0, 1, 2],
            colors: None,
            base_color: [1.0; 4],
        });

        assert!(matches!(export_glb(&scene, &path), Err(ExportError::Io { .. })));
    }
}
