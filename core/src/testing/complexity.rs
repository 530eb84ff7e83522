//! Empirical complexity classes fitted to `(size, time)` samples.
//!
//! The label is a least-squares fit against a fixed catalogue. It says how the measured times
//! grew, nothing about the algorithm's actual asymptotics.

use std::fmt;

use serde::Serialize;

use crate::shape::Shape;

/// Fits below this coefficient of determination are rejected.
pub const MIN_R_SQUARED: f64 = 0.80;

/// Fits within this distance of the best one count as equally good; the simplest wins.
pub const PARSIMONY_TOLERANCE: f64 = 0.02;

const FLAT_RELATIVE_SPREAD: f64 = 0.15;
const FLAT_MIN_X_RATIO: f64 = 10.0;
const MIN_DISTINCT_X: usize = 3;
const EXPONENTIAL_MAX_X: f64 = 60.0;

/// One timed run that exited normally.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub shape: Option<Shape>,
    /// Whitespace-separated tokens of the raw input; the x-axis when shapes are missing.
    pub input_tokens: usize,
    pub time_ms: f64,
}

impl Sample {
    pub fn new(shape: Option<Shape>, input: &str, time_ms: f64) -> Self {
        Self {
            shape,
            input_tokens: input.split_whitespace().count(),
            time_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum ComplexityLabel {
    Class(String),
    Unknown,
    InsufficientData,
}

impl fmt::Display for ComplexityLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Class(c) => f.write_str(c),
            Self::Unknown => f.write_str("unknown"),
            Self::InsufficientData => f.write_str("insufficient data"),
        }
    }
}

impl From<ComplexityLabel> for String {
    fn from(label: ComplexityLabel) -> Self {
        label.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityEstimate {
    pub label: ComplexityLabel,
    pub r_squared: Option<f64>,
    pub samples: usize,
    /// Shape key the times were fitted against; `None` when the input token count stood in.
    pub axis: Option<String>,
}

impl ComplexityEstimate {
    fn new(label: ComplexityLabel, r_squared: Option<f64>, samples: usize) -> Self {
        Self {
            label,
            r_squared,
            samples,
            axis: None,
        }
    }
}

impl fmt::Display for ComplexityEstimate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if let Some(r2) = self.r_squared {
            write!(f, " (R²={:.3})", r2)?;
        }
        Ok(())
    }
}

struct Candidate {
    label: String,
    xs: Vec<f64>,
}

/// Fits a complexity class to `samples`.
pub fn estimate(samples: &[Sample]) -> ComplexityEstimate {
    if samples.is_empty() {
        return ComplexityEstimate::new(ComplexityLabel::Unknown, None, 0);
    }
    let axes = Axes::of(samples);
    ComplexityEstimate {
        axis: axes.key.clone(),
        ..fit(samples, &axes)
    }
}

fn fit(samples: &[Sample], axes: &Axes) -> ComplexityEstimate {
    let n = samples.len();
    let ts: Vec<f64> = samples.iter().map(|s| s.time_ms).collect();
    let xs = &axes.dominant;

    let mut distinct = xs.clone();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    if distinct.len() < MIN_DISTINCT_X {
        return ComplexityEstimate::new(ComplexityLabel::InsufficientData, None, n);
    }

    if is_flat(xs, &ts) {
        return ComplexityEstimate::new(ComplexityLabel::Class("O(1)".to_owned()), None, n);
    }

    let fits: Vec<(String, f64)> = candidates(axes)
        .into_iter()
        .filter_map(|c| Some((c.label, r_squared(&c.xs, &ts)?)))
        .collect();

    let Some(best) = fits.iter().map(|(_, r2)| *r2).reduce(f64::max) else {
        return ComplexityEstimate::new(ComplexityLabel::Unknown, None, n)
    };
    if best < MIN_R_SQUARED {
        return ComplexityEstimate::new(ComplexityLabel::Unknown, Some(best), n);
    }
    match fits
        .into_iter()
        .find(|(_, r2)| *r2 >= best - PARSIMONY_TOLERANCE)
    {
        Some((label, r2)) => ComplexityEstimate::new(ComplexityLabel::Class(label), Some(r2), n),
        None => ComplexityEstimate::new(ComplexityLabel::Unknown, Some(best), n),
    }
}

/// x-axes derived from the samples: the dominant dimension, and a product of the two
/// largest dimensions when every sample reports at least two.
struct Axes {
    key: Option<String>,
    dominant: Vec<f64>,
    product: Option<(String, Vec<f64>)>,
}

impl Axes {
    fn of(samples: &[Sample]) -> Self {
        let by_tokens = || Self {
            key: None,
            dominant: samples.iter().map(|s| s.input_tokens as f64).collect(),
            product: None,
        };

        let Some(shapes) = samples
            .iter()
            .map(|s| s.shape.as_ref())
            .collect::<Option<Vec<&Shape>>>() else {
            return by_tokens()
        };

        let mut keys: Vec<(&str, f64)> = shapes[0]
            .keys()
            .filter(|k| shapes.iter().all(|s| s.get(k).is_some()))
            .map(|k| (k, variance(&column(&shapes, k))))
            .collect();
        if keys.is_empty() {
            return by_tokens();
        }
        // Largest variance first; ties keep key order.
        keys.sort_by(|a, b| b.1.total_cmp(&a.1));

        let dominant = column(&shapes, keys[0].0);
        let product = match keys.get(1) {
            Some(&(second, _)) => {
                let first = keys[0].0;
                let xs = column(&shapes, first)
                    .into_iter()
                    .zip(column(&shapes, second))
                    .map(|(a, b)| a * b)
                    .collect();
                Some((format!("O({}·{})", first, second), xs))
            }
            None => None,
        };
        Self {
            key: Some(keys[0].0.to_owned()),
            dominant,
            product,
        }
    }
}

fn column(shapes: &[&Shape], key: &str) -> Vec<f64> {
    shapes
        .iter()
        .map(|s| s.get(key).unwrap_or_default() as f64)
        .collect()
}

fn candidates(axes: &Axes) -> Vec<Candidate> {
    let xs = &axes.dominant;
    let map = |label: &str, f: fn(f64) -> f64| Candidate {
        label: label.to_owned(),
        xs: xs.iter().copied().map(f).collect(),
    };
    let log = |x: f64| x.max(1.0).ln();

    let mut cs = vec![
        map("O(log n)", log),
        map("O(n)", |x| x),
        map("O(n log n)", |x| x * x.max(1.0).ln()),
    ];
    if let Some((label, xs)) = &axes.product {
        cs.push(Candidate {
            label: label.clone(),
            xs: xs.clone(),
        });
    }
    cs.push(map("O(n^2)", |x| x * x));
    cs.push(map("O(n^3)", |x| x * x * x));
    if xs.iter().all(|&x| x <= EXPONENTIAL_MAX_X) {
        cs.push(map("O(2^n)", |x| x.exp2()));
    }
    cs
}

fn mean(v: &[f64]) -> f64 {
    v.iter().sum::<f64>() / v.len() as f64
}

fn variance(v: &[f64]) -> f64 {
    let m = mean(v);
    v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / v.len() as f64
}

fn is_flat(xs: &[f64], ts: &[f64]) -> bool {
    let (t_min, t_max) = min_max(ts);
    let (x_min, x_max) = min_max(xs);
    t_max - t_min <= FLAT_RELATIVE_SPREAD * mean(ts) && x_max >= FLAT_MIN_X_RATIO * x_min.max(1.0)
}

fn min_max(v: &[f64]) -> (f64, f64) {
    v.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
        (lo.min(x), hi.max(x))
    })
}

/// R² of the least-squares line `t = a + b·x`; `None` unless `b > 0`.
fn r_squared(xs: &[f64], ts: &[f64]) -> Option<f64> {
    let (mx, mt) = (mean(xs), mean(ts));
    let (mut sxx, mut stt, mut sxt) = (0.0, 0.0, 0.0);
    for (&x, &t) in xs.iter().zip(ts) {
        sxx += (x - mx) * (x - mx);
        stt += (t - mt) * (t - mt);
        sxt += (x - mx) * (t - mt);
    }
    if sxx <= 0.0 || stt <= 0.0 || !sxx.is_finite() || !sxt.is_finite() {
        return None;
    }
    let slope = sxt / sxx;
    if slope <= 0.0 {
        return None;
    }
    Some((sxt * sxt / (sxx * stt)).min(1.0))
}

#[cfg(test)]
mod test {
    use super::*;

    fn samples_n(points: &[(u64, f64)]) -> Vec<Sample> {
        points
            .iter()
            .map(|&(n, t)| Sample {
                shape: Some(Shape::new().with("n", n)),
                input_tokens: 0,
                time_ms: t,
            })
            .collect()
    }

    fn label(e: &ComplexityEstimate) -> String {
        e.label.to_string()
    }

    #[test]
    fn linear_times_fit_linear() {
        let pts: Vec<_> = [100, 1_000, 10_000, 100_000]
            .iter()
            .map(|&n| (n, 0.002 * n as f64 + 0.5))
            .collect();
        let e = estimate(&samples_n(&pts));
        assert_eq!(label(&e), "O(n)");
        assert_eq!(e.samples, 4);
        assert_eq!(e.axis.as_deref(), Some("n"));
        assert!(e.r_squared.unwrap() > 0.99);
    }

    #[test]
    fn noisy_linear_prefers_simpler_class() {
        let e = estimate(&samples_n(&[
            (1000, 1.1),
            (2000, 2.0),
            (4000, 4.3),
            (8000, 7.9),
            (16000, 16.2),
        ]));
        assert_eq!(label(&e), "O(n)");
    }

    #[test]
    fn quadratic_times_fit_quadratic() {
        let pts: Vec<_> = [100, 200, 400, 800, 1600, 3200]
            .iter()
            .map(|&n| (n, (n * n) as f64 / 1e4 + 0.5))
            .collect();
        assert_eq!(label(&estimate(&samples_n(&pts))), "O(n^2)");
    }

    #[test]
    fn flat_times_are_constant() {
        let e = estimate(&samples_n(&[(10, 1.0), (1000, 1.05), (100_000, 0.97)]));
        assert_eq!(label(&e), "O(1)");
        assert_eq!(e.r_squared, None);
    }

    #[test]
    fn too_few_sizes_are_insufficient() {
        let e = estimate(&samples_n(&[(10, 1.0), (20, 2.0)]));
        assert_eq!(e.label, ComplexityLabel::InsufficientData);
        assert_eq!(label(&e), "insufficient data");

        let e = estimate(&samples_n(&[(10, 1.0), (10, 1.1), (20, 2.0), (20, 2.1)]));
        assert_eq!(e.label, ComplexityLabel::InsufficientData);
    }

    #[test]
    fn no_samples_or_shrinking_times_are_unknown() {
        assert_eq!(estimate(&[]), ComplexityEstimate::new(ComplexityLabel::Unknown, None, 0));

        let e = estimate(&samples_n(&[(10, 9.0), (100, 5.0), (1000, 1.0)]));
        assert_eq!(e.label, ComplexityLabel::Unknown);
    }

    #[test]
    fn two_dimensional_shapes_fit_product() {
        let samples: Vec<_> = [
            (10, 1, 10.0),
            (10, 100, 1000.0),
            (1000, 1, 1000.0),
            (1000, 100, 100_000.0),
            (100, 10, 1000.0),
            (500, 50, 25_000.0),
        ]
        .iter()
        .map(|&(n, k, t)| Sample {
            shape: Some(Shape::new().with("n", n).with("k", k)),
            input_tokens: 0,
            time_ms: t,
        })
        .collect();
        assert_eq!(label(&estimate(&samples)), "O(n·k)");
    }

    #[test]
    fn missing_shape_falls_back_to_input_length() {
        let samples = vec![
            Sample::new(None, "1 2 3 4 5 6 7 8 9 10", 1.0),
            Sample::new(Some(Shape::new().with("n", 1)), &"7 ".repeat(100), 10.0),
            Sample::new(None, &"7 ".repeat(1000), 100.0),
        ];
        assert_eq!(samples[1].input_tokens, 100);
        let e = estimate(&samples);
        assert_eq!(label(&e), "O(n)");
        assert_eq!(e.axis, None);
    }

    #[test]
    fn exponential_only_for_small_sizes() {
        let pts: Vec<_> = (10..=20)
            .step_by(2)
            .map(|n| (n as u64, 2f64.powi(n) / 1000.0))
            .collect();
        assert_eq!(label(&estimate(&samples_n(&pts))), "O(2^n)");
    }
}
