//! Streamline seeding and tracing

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::probe::VelocityProbe;

/// Speeds below this end a streamline
pub const MIN_SPEED: f64 = 1e-9;

/// Integration settings
#[derive(Debug, Clone, Copy)]
pub struct TraceParams {
    /// Step length as a fraction of the local cell size
    pub step_factor: f64,
    /// Max steps in each direction
    pub max_steps: usize,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            step_factor: 0.2,
            max_steps: 2000,
        }
    }
}

/// A traced polyline with the flow speed at each point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Streamline {
    pub points: Vec<Vector3<f64>>,
    pub speeds: Vec<f64>,
}

impl Streamline {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// `n` points uniformly distributed inside a sphere.
///
/// The same `seed` always yields the same points.
pub fn seed_sphere(center: Vector3<f64>, radius: f64, n: usize, seed: u64) -> Vec<Vector3<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seeds = Vec::with_capacity(n);

    // Rejection sampling from the enclosing cube
    while seeds.len() < n {
        let offset = Vector3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if offset.norm_squared() <= 1.0 {
            seeds.push(center + offset * radius);
        }
    }
    seeds
}

/// Trace one streamline per seed in both directions.
///
/// Lines with fewer than two points are dropped, so the result may be
/// shorter than `seeds`.
pub fn trace_streamlines(
    probe: &VelocityProbe<'_>,
    seeds: &[Vector3<f64>],
    params: &TraceParams,
) -> Vec<Streamline> {
    seeds
        .iter()
        .filter_map(|seed| trace_one(probe, seed, params))
        .filter(|line| line.len() >= 2)
        .collect()
}

fn trace_one(
    probe: &VelocityProbe<'_>,
    seed: &Vector3<f64>,
    params: &TraceParams,
) -> Option<Streamline> {
    let start = probe.sample(seed)?;
    let start_speed = start.velocity.norm();

    let backward = integrate(probe, *seed, -1.0, params);
    let forward = integrate(probe, *seed, 1.0, params);

    let mut line = Streamline {
        points: Vec::with_capacity(backward.len() + forward.len() + 1),
        speeds: Vec::with_capacity(backward.len() + forward.len() + 1),
    };
    for (p, s) in backward.into_iter().rev() {
        line.points.push(p);
        line.speeds.push(s);
    }
    line.points.push(*seed);
    line.speeds.push(start_speed);
    for (p, s) in forward {
        line.points.push(p);
        line.speeds.push(s);
    }
    Some(line)
}

/// Points reached from `start` (exclusive) following `direction` × flow
fn integrate(
    probe: &VelocityProbe<'_>,
    start: Vector3<f64>,
    direction: f64,
    params: &TraceParams,
) -> Vec<(Vector3<f64>, f64)> {
    let mut out = Vec::new();
    let mut p = start;

    for _ in 0..params.max_steps {
        let Some(here) = probe.sample(&p) else { break };
        if here.velocity.norm() < MIN_SPEED {
            break;
        }
        let h = params.step_factor * here.cell_size;

        // RK4 on the unit direction field, so `h` is a distance
        let Some(k1) = unit_direction(probe, &p, direction) else { break };
        let Some(k2) = unit_direction(probe, &(p + k1 * (h / 2.0)), direction) else { break };
        let Some(k3) = unit_direction(probe, &(p + k2 * (h / 2.0)), direction) else { break };
        let Some(k4) = unit_direction(probe, &(p + k3 * h), direction) else { break };
        let next = p + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0);

        let Some(there) = probe.sample(&next) else { break };
        let speed = there.velocity.norm();
        out.push((next, speed));
        if speed < MIN_SPEED {
            break;
        }
        p = next;
    }

    out
}

fn unit_direction(
    probe: &VelocityProbe<'_>,
    p: &Vector3<f64>,
    direction: f64,
) -> Option<Vector3<f64>> {
    let v = probe.sample(p)?.velocity;
    let speed = v.norm();
    if speed < MIN_SPEED {
        return None;
    }
    Some(v * (direction / speed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foam::Aabb;
    use approx::assert_relative_eq;

    struct Grid {
        centres: Vec<Vector3<f64>>,
        sizes: Vec<f64>,
        values: Vec<Vector3<f64>>,
    }

    fn uniform_grid(n: usize, velocity: Vector3<f64>) -> Grid {
        let mut centres = Vec::new();
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    centres.push(Vector3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5));
                }
            }
        }
        let count = centres.len();
        Grid {
            centres,
            sizes: vec![1.0; count],
            values: vec![velocity; count],
        }
    }

    fn bounds(n: usize) -> Aabb {
        Aabb {
            min: Vector3::zeros(),
            max: Vector3::repeat(n as f64),
        }
    }

    #[test]
    fn test_seed_sphere_inside_and_deterministic() {
        let center = Vector3::new(0.0, 0.0, 1.0);
        let a = seed_sphere(center, 2.0, 100, 0);
        let b = seed_sphere(center, 2.0, 100, 0);
        let c = seed_sphere(center, 2.0, 100, 1);

        assert_eq!(a.len(), 100);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|p| (p - center).norm() <= 2.0 + 1e-12));
    }

    #[test]
    fn test_seed_sphere_zero() {
        assert!(seed_sphere(Vector3::zeros(), 1.0, 0, 7).is_empty());
    }

    #[test]
    fn test_uniform_flow_gives_straight_line() {
        let grid = uniform_grid(6, Vector3::new(1.0, 0.0, 0.0));
        let probe =
            VelocityProbe::new(&grid.centres, &grid.sizes, &grid.values, bounds(6)).unwrap();
        let seed = Vector3::new(3.0, 3.0, 3.0);

        let lines = trace_streamlines(&probe, &[seed], &TraceParams::default());
        assert_eq!(lines.len(), 1);

        let line = &lines[0];
        assert_eq!(line.points.len(), line.speeds.len());
        assert!(line.len() > 10);

        // Runs upstream first, then downstream, along x only
        let first = line.points.first().unwrap();
        let last = line.points.last().unwrap();
        assert!(first.x < seed.x);
        assert!(last.x > seed.x);
        for p in &line.points {
            assert_relative_eq!(p.y, 3.0, epsilon = 1e-9);
            assert_relative_eq!(p.z, 3.0, epsilon = 1e-9);
            assert!(bounds(6).contains(p));
        }
        for s in &line.speeds {
            assert_relative_eq!(*s, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_step_limit() {
        let grid = uniform_grid(6, Vector3::new(0.0, 1.0, 0.0));
        let probe =
            VelocityProbe::new(&grid.centres, &grid.sizes, &grid.values, bounds(6)).unwrap();
        let params = TraceParams {
            step_factor: 0.1,
            max_steps: 3,
        };

        let lines = trace_streamlines(&probe, &[Vector3::new(3.0, 3.0, 3.0)], &params);
        // Three steps each way plus the seed
        assert_eq!(lines[0].len(), 7);
    }

    #[test]
    fn test_stagnant_flow_is_dropped() {
        let grid = uniform_grid(4, Vector3::zeros());
        let probe =
            VelocityProbe::new(&grid.centres, &grid.sizes, &grid.values, bounds(4)).unwrap();

        let lines =
            trace_streamlines(&probe, &[Vector3::new(2.0, 2.0, 2.0)], &TraceParams::default());
        assert!(lines.is_empty());
    }

    #[test]
    fn test_seed_outside_domain_is_dropped() {
        let grid = uniform_grid(4, Vector3::new(1.0, 0.0, 0.0));
        let probe =
            VelocityProbe::new(&grid.centres, &grid.sizes, &grid.values, bounds(4)).unwrap();

        let lines = trace_streamlines(
            &probe,
            &[Vector3::new(-5.0, 2.0, 2.0), Vector3::new(2.0, 2.0, 2.0)],
            &TraceParams::default(),
        );
        assert_eq!(lines.len(), 1);
    }
}
