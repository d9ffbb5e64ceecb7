//! Tube surfaces around polylines

use nalgebra::Vector3;

/// Triangle mesh of a swept tube with one scalar per vertex
#[derive(Debug, Clone, Default)]
pub struct TubeMesh {
    pub positions: Vec<Vector3<f64>>,
    pub normals: Vec<Vector3<f64>>,
    pub scalars: Vec<f64>,
    pub indices: Vec<u32>,
}

impl TubeMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Append another tube, offsetting its indices
    pub fn append(&mut self, other: &TubeMesh) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.scalars.extend_from_slice(&other.scalars);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }
}

/// Sweep a circle of `radius` along `points`.
///
/// Frames are parallel transported so the tube does not twist; the ends are
/// left open. `scalars` holds one value per point and is copied onto the
/// ring at that point. Returns an empty mesh for fewer than two distinct
/// points or fewer than three sides.
pub fn sweep_tube(points: &[Vector3<f64>], scalars: &[f64], radius: f64, sides: usize) -> TubeMesh {
    let mut mesh = TubeMesh::default();
    if sides < 3 || points.len() != scalars.len() {
        return mesh;
    }

    // Coincident neighbours have no tangent
    let mut path: Vec<(Vector3<f64>, f64)> = Vec::with_capacity(points.len());
    for (p, s) in points.iter().zip(scalars) {
        if path.last().is_none_or(|(q, _)| (p - q).norm_squared() > 1e-24) {
            path.push((*p, *s));
        }
    }
    if path.len() < 2 {
        return mesh;
    }

    let tangents: Vec<Vector3<f64>> = (0..path.len())
        .map(|i| {
            let prev = path[i.saturating_sub(1)].0;
            let next = path[(i + 1).min(path.len() - 1)].0;
            (next - prev).normalize()
        })
        .collect();

    let mut normal = any_perpendicular(&tangents[0]);
    let step = std::f64::consts::TAU / sides as f64;

    for (i, ((centre, scalar), tangent)) in path.iter().zip(&tangents).enumerate() {
        if i > 0 {
            let projected = normal - tangent * tangent.dot(&normal);
            normal = if projected.norm_squared() > 1e-12 {
                projected.normalize()
            } else {
                any_perpendicular(tangent)
            };
        }
        let binormal = tangent.cross(&normal);

        for j in 0..sides {
            let angle = step * j as f64;
            let radial = normal * angle.cos() + binormal * angle.sin();
            mesh.positions.push(centre + radial * radius);
            mesh.normals.push(radial);
            mesh.scalars.push(*scalar);
        }
    }

    let sides_u = sides as u32;
    for ring in 0..(path.len() as u32 - 1) {
        let here = ring * sides_u;
        let there = here + sides_u;
        for j in 0..sides_u {
            let k = (j + 1) % sides_u;
            let (a, b, c, d) = (here + j, here + k, there + j, there + k);
            mesh.indices.extend_from_slice(&[a, b, c, b, d, c]);
        }
    }

    mesh
}

fn any_perpendicular(t: &Vector3<f64>) -> Vector3<f64> {
    let axis = if t.x.abs() <= t.y.abs() && t.x.abs() <= t.z.abs() {
        Vector3::x()
    } else if t.y.abs() <= t.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    t.cross(&axis).normalize()
}
