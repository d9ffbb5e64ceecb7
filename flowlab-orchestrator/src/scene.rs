//! Renderable scene handed to the exporter

use nalgebra::Vector3;

use crate::flow::TubeMesh;
use crate::foam::TriSurface;

/// A named triangle mesh
#[derive(Debug, Clone, Default)]
pub struct SceneNode {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    /// Optional per-vertex RGB
    pub colors: Option<Vec<[f32; 3]>>,
    /// RGBA applied on top of the vertex colours
    pub base_color: [f32; 4],
}

impl SceneNode {
    /// A smooth-shaded surface with averaged vertex normals
    pub fn from_surface(
        name: impl Into<String>,
        surface: &TriSurface,
        base_color: [f32; 4],
    ) -> Self {
        let mut normals = vec![Vector3::<f64>::zeros(); surface.positions.len()];
        for tri in &surface.triangles {
            let [a, b, c] = tri.map(|i| surface.positions[i as usize]);
            // Area weighted
            let n = (b - a).cross(&(c - a));
            for &i in tri {
                normals[i as usize] += n;
            }
        }

        Self {
            name: name.into(),
            positions: surface.positions.iter().map(to_f32).collect(),
            normals: normals.iter().map(|n| to_f32(&safe_normalize(n))).collect(),
            indices: surface.triangles.iter().flatten().copied().collect(),
            colors: None,
            base_color,
        }
    }

    /// Tubes coloured per vertex through `color`
    pub fn from_tubes(
        name: impl Into<String>,
        tubes: &TubeMesh,
        color: impl Fn(f64) -> [f32; 3],
    ) -> Self {
        Self {
            name: name.into(),
            positions: tubes.positions.iter().map(to_f32).collect(),
            normals: tubes.normals.iter().map(to_f32).collect(),
            indices: tubes.indices.clone(),
            colors: Some(tubes.scalars.iter().map(|&s| color(s)).collect()),
            base_color: [1.0, 1.0, 1.0, 1.0],
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// Viewer background, e.g. `#111111`
    pub background: String,
    pub nodes: Vec<SceneNode>,
}

impl Scene {
    pub fn new(background: impl Into<String>) -> Self {
        Self {
            background: background.into(),
            nodes: Vec::new(),
        }
    }

    /// Add a node; empty meshes are skipped
    pub fn push(&mut self, node: SceneNode) {
        if !node.is_empty() {
            self.nodes.push(node);
        }
    }
}

fn to_f32(v: &Vector3<f64>) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}

fn safe_normalize(v: &Vector3<f64>) -> Vector3<f64> {
    v.try_normalize(1e-30).unwrap_or_else(Vector3::z)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> TriSurface {
        TriSurface {
            positions: vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(1.0, 1.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
            ],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    #[test]
    fn test_surface_normals() {
        let node = SceneNode::from_surface("car", &quad(), [1.0; 4]);
        assert_eq!(node.vertex_count(), 4);
        assert_eq!(node.indices, vec![0, 1, 2, 0, 2, 3]);
        assert!(node.colors.is_none());
        for n in &node.normals {
            assert_eq!(*n, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_tube_colours() {
        let tubes = crate::flow::sweep_tube(
            &[Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)],
            &[0.0, 1.0],
            0.1,
            4,
        );
        let node = SceneNode::from_tubes("streamlines", &tubes, |s| [s as f32, 0.0, 0.0]);
        let colors = node.colors.unwrap();
        assert_eq!(colors.len(), 8);
        assert_eq!(colors[0], [0.0, 0.0, 0.0]);
        assert_eq!(colors[7], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_push_skips_empty() {
        let mut scene = Scene::new("#111111");
        scene.push(SceneNode::default());
        assert!(scene.nodes.is_empty());
        scene.push(SceneNode::from_surface("car", &quad(), [1.0; 4]));
        assert_eq!(scene.nodes.len(), 1);
    }
}
