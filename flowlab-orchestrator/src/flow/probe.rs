//! Velocity lookup at arbitrary points
//!
//! Cell centres go into an R-tree; the velocity at a point is the inverse
//! distance weighted mean of the nearest cells. A point counts as outside the
//! fluid when it leaves the mesh bounds or is far from every cell centre
//! (e.g. inside the body, where there are no cells).

use nalgebra::Vector3;
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::foam::Aabb;

type CellPoint = GeomWithData<[f64; 3], usize>;

/// Cells blended per lookup
const NEIGHBOURS: usize = 8;
/// Max distance to the nearest centre, in cell sizes
const OUTSIDE_FACTOR: f64 = 2.0;

/// Interpolated field value at a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub velocity: Vector3<f64>,
    /// Size of the nearest cell; used to scale the integration step
    pub cell_size: f64,
}

pub struct VelocityProbe<'a> {
    tree: RTree<CellPoint>,
    sizes: &'a [f64],
    values: &'a [Vector3<f64>],
    bounds: Aabb,
}

impl<'a> VelocityProbe<'a> {
    /// Returns None when there are no cells
    pub fn new(
        centres: &[Vector3<f64>],
        sizes: &'a [f64],
        values: &'a [Vector3<f64>],
        bounds: Aabb,
    ) -> Option<Self> {
        if centres.is_empty() || centres.len() != values.len() || centres.len() != sizes.len() {
            return None;
        }
        let points = centres
            .iter()
            .enumerate()
            .map(|(i, c)| GeomWithData::new([c.x, c.y, c.z], i))
            .collect();

        Some(Self {
            tree: RTree::bulk_load(points),
            sizes,
            values,
            bounds,
        })
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn sample(&self, p: &Vector3<f64>) -> Option<Sample> {
        if !self.bounds.contains(p) {
            return None;
        }

        let query = [p.x, p.y, p.z];
        let nearest: Vec<(usize, f64)> = self
            .tree
            .nearest_neighbor_iter_with_distance_2(&query)
            .take(NEIGHBOURS)
            .map(|(cell, d2)| (cell.data, d2))
            .collect();

        let &(closest, closest_d2) = nearest.first()?;
        let cell_size = self.sizes[closest];
        if closest_d2.sqrt() > OUTSIDE_FACTOR * cell_size {
            return None;
        }

        if closest_d2 < 1e-24 {
            return Some(Sample {
                velocity: self.values[closest],
                cell_size,
            });
        }

        let mut weighted = Vector3::zeros();
        let mut total = 0.0;
        for (cell, d2) in nearest {
            let w = 1.0 / d2;
            weighted += self.values[cell] * w;
            total += w;
        }

        Some(Sample {
            velocity: weighted / total,
            cell_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(n: usize) -> (Vec<Vector3<f64>>, Vec<f64>) {
        let mut centres = Vec::new();
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    centres.push(Vector3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5));
                }
            }
        }
        let sizes = vec![1.0; centres.len()];
        (centres, sizes)
    }

    fn bounds(n: usize) -> Aabb {
        Aabb {
            min: Vector3::zeros(),
            max: Vector3::repeat(n as f64),
        }
    }

    #[test]
    fn test_uniform_field_is_exact() {
        let (centres, sizes) = grid(4);
        let values = vec![Vector3::new(2.0, -1.0, 0.5); centres.len()];
        let probe = VelocityProbe::new(&centres, &sizes, &values, bounds(4)).unwrap();

        let sample = probe.sample(&Vector3::new(1.3, 2.7, 0.2)).unwrap();
        assert_relative_eq!(sample.velocity.x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(sample.velocity.y, -1.0, epsilon = 1e-12);
        assert_relative_eq!(sample.velocity.z, 0.5, epsilon = 1e-12);
        assert_eq!(sample.cell_size, 1.0);
    }

    #[test]
    fn test_at_cell_centre_returns_cell_value() {
        let (centres, sizes) = grid(3);
        let values: Vec<Vector3<f64>> = (0..centres.len())
            .map(|i| Vector3::new(i as f64, 0.0, 0.0))
            .collect();
        let probe = VelocityProbe::new(&centres, &sizes, &values, bounds(3)).unwrap();

        let sample = probe.sample(&centres[13]).unwrap();
        assert_eq!(sample.velocity, values[13]);
    }

    #[test]
    fn test_outside_bounds() {
        let (centres, sizes) = grid(2);
        let values = vec![Vector3::new(1.0, 0.0, 0.0); centres.len()];
        let probe = VelocityProbe::new(&centres, &sizes, &values, bounds(2)).unwrap();

        assert!(probe.sample(&Vector3::new(-0.1, 1.0, 1.0)).is_none());
        assert!(probe.sample(&Vector3::new(1.0, 1.0, 2.5)).is_none());
    }

    #[test]
    fn test_far_from_cells_is_outside() {
        // One cell in the corner of a large bounding box
        let centres = vec![Vector3::new(0.5, 0.5, 0.5)];
        let sizes = vec![1.0];
        let values = vec![Vector3::new(1.0, 0.0, 0.0)];
        let probe = VelocityProbe::new(&centres, &sizes, &values, bounds(10)).unwrap();

        assert!(probe.sample(&Vector3::new(1.0, 1.0, 1.0)).is_some());
        assert!(probe.sample(&Vector3::new(8.0, 8.0, 8.0)).is_none());
    }

    #[test]
    fn test_empty_mesh() {
        assert!(VelocityProbe::new(&[], &[], &[], Aabb::empty()).is_none());
    }
}
