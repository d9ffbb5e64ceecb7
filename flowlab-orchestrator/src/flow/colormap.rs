//! Scalar to colour mapping

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colormap {
    #[default]
    Turbo,
    Viridis,
    Jet,
}

const VIRIDIS: [[f64; 3]; 5] = [
    [68.0 / 255.0, 1.0 / 255.0, 84.0 / 255.0],
    [59.0 / 255.0, 82.0 / 255.0, 139.0 / 255.0],
    [33.0 / 255.0, 145.0 / 255.0, 140.0 / 255.0],
    [94.0 / 255.0, 201.0 / 255.0, 98.0 / 255.0],
    [253.0 / 255.0, 231.0 / 255.0, 37.0 / 255.0],
];

impl Colormap {
    /// RGB in [0, 1] for `t` in [0, 1]; `t` is clamped, NaN maps to 0
    pub fn sample(self, t: f64) -> [f32; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let rgb = match self {
            Colormap::Turbo => turbo(t),
            Colormap::Viridis => table(&VIRIDIS, t),
            Colormap::Jet => jet(t),
        };
        rgb.map(|c| c.clamp(0.0, 1.0) as f32)
    }

    /// Colour of `value` within `[min, max]`. A zero-width range maps to
    /// the low end.
    pub fn sample_range(self, value: f64, min: f64, max: f64) -> [f32; 3] {
        let span = max - min;
        if span <= f64::EPSILON {
            return self.sample(0.0);
        }
        self.sample((value - min) / span)
    }

    pub fn name(self) -> &'static str {
        match self {
            Colormap::Turbo => "turbo",
            Colormap::Viridis => "viridis",
            Colormap::Jet => "jet",
        }
    }
}

impl FromStr for Colormap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "turbo" => Ok(Colormap::Turbo),
            "viridis" => Ok(Colormap::Viridis),
            "jet" => Ok(Colormap::Jet),
            other => Err(format!("unknown colormap '{}'", other)),
        }
    }
}

/// Polynomial fit of Google's Turbo, coefficients in ascending powers of t
const TURBO_R: [f64; 6] = [
    0.13572138,
    4.61539260,
    -42.66032258,
    132.13108234,
    -152.94239396,
    59.28637943,
];
const TURBO_G: [f64; 6] = [
    0.09140261,
    2.19418839,
    4.84296658,
    -14.18503333,
    4.27729857,
    2.82956604,
];
const TURBO_B: [f64; 6] = [
    0.10667330,
    12.64194608,
    -60.58204836,
    110.36276771,
    -89.90310912,
    27.34824973,
];

fn polynomial(coefficients: &[f64], t: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * t + c)
}

fn turbo(t: f64) -> [f64; 3] {
    [
        polynomial(&TURBO_R, t),
        polynomial(&TURBO_G, t),
        polynomial(&TURBO_B, t),
    ]
}

fn jet(t: f64) -> [f64; 3] {
    let channel = |offset: f64| (1.5 - (4.0 * t - offset).abs()).clamp(0.0, 1.0);
    [channel(3.0), channel(2.0), channel(1.0)]
}

fn table(stops: &[[f64; 3]], t: f64) -> [f64; 3] {
    let scaled = t * (stops.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(stops.len() - 2);
    let f = scaled - i as f64;
    let (a, b) = (stops[i], stops[i + 1]);
    [0, 1, 2].map(|c| a[c] + (b[c] - a[c]) * f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse() {
        assert_eq!("turbo".parse::<Colormap>().unwrap(), Colormap::Turbo);
        assert_eq!(" Viridis ".parse::<Colormap>().unwrap(), Colormap::Viridis);
        assert_eq!("JET".parse::<Colormap>().unwrap(), Colormap::Jet);
        assert!("rainbow".parse::<Colormap>().is_err());
    }

    #[test]
    fn test_samples_in_unit_range() {
        for map in [Colormap::Turbo, Colormap::Viridis, Colormap::Jet] {
            for i in 0..=100 {
                let rgb = map.sample(i as f64 / 100.0);
                assert!(rgb.iter().all(|c| (0.0..=1.0).contains(c)), "{} at {}", map.name(), i);
            }
        }
    }

    #[test]
    fn test_turbo_runs_blue_to_red() {
        let low = Colormap::Turbo.sample(0.1);
        let high = Colormap::Turbo.sample(1.0);
        assert!(low[2] > low[0]);
        assert!(high[0] > high[2]);
    }

    #[test]
    fn test_viridis_endpoints() {
        let low = Colormap::Viridis.sample(0.0);
        let high = Colormap::Viridis.sample(1.0);
        assert_relative_eq!(low[0], 68.0 / 255.0, epsilon = 1e-6);
        assert_relative_eq!(high[1], 231.0 / 255.0, epsilon = 1e-6);
    }

    #[test]
    fn test_jet_midpoint_is_green() {
        assert_eq!(Colormap::Jet.sample(0.5), [0.5, 1.0, 0.5]);
    }

    #[test]
    fn test_clamping_and_degenerate_range() {
        assert_eq!(Colormap::Jet.sample(-3.0), Colormap::Jet.sample(0.0));
        assert_eq!(Colormap::Jet.sample(f64::NAN), Colormap::Jet.sample(0.0));
        assert_eq!(Colormap::Turbo.sample_range(5.0, 2.0, 2.0), Colormap::Turbo.sample(0.0));
        assert_eq!(Colormap::Turbo.sample_range(4.0, 2.0, 6.0), Colormap::Turbo.sample(0.5));
    }
}
