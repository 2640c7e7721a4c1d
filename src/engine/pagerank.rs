//! Damped power iteration shared by the team and conference layers.

use rayon::prelude::*;

use super::graph::WeightedDigraph;
use crate::error::SolveError;

/// Graphs with at least this many nodes run the per-iteration product on rayon.
const PARALLEL_THRESHOLD: usize = 256;

/// Row-normalised transition structure stored as incoming lists, so each
/// iteration can pull mass into node `j` independently of every other node.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    n: usize,
    incoming: Vec<Vec<(usize, f64)>>,
    dangling: Vec<usize>,
}

impl Transition {
    pub fn from_graph(graph: &WeightedDigraph) -> Self {
        let n = graph.node_count();
        let out = graph.out_weights();
        let mut incoming: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for (from, to, w) in graph.arcs() {
            if out[from] > 0.0 {
                incoming[to].push((from, w / out[from]));
            }
        }
        let dangling = (0..n).filter(|&i| !(out[i] > 0.0)).collect();
        Self {
            n,
            incoming,
            dangling,
        }
    }

    /// Whether two transitions have the same structure and every probability
    /// agrees within `tolerance`.
    pub fn approx_eq(&self, other: &Transition, tolerance: f64) -> bool {
        if self.n != other.n || self.dangling != other.dangling {
            return false;
        }
        self.incoming.iter().zip(&other.incoming).all(|(a, b)| {
            a.len() == b.len()
                && a
                    .iter()
                    .zip(b)
                    .all(|(&(fa, pa), &(fb, pb))| fa == fb && (pa - pb).abs() <= tolerance)
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IterationSettings {
    pub damping: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub total: f64,
}

/// Result of one power iteration. When `converged` is false the values are
/// the last iterate reached at the cap.
#[derive(Debug, Clone, PartialEq)]
pub struct Stationary {
    pub values: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub residual: f64,
}

/// Scale a non-negative vector so it sums to `total`; degenerate input
/// becomes the uniform vector.
pub fn normalize(values: &[f64], total: f64) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let sum: f64 = values.iter().sum();
    if !(sum > 0.0) || !sum.is_finite() {
        return vec![total / n as f64; n];
    }
    values.iter().map(|v| v * total / sum).collect()
}

pub fn l1_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// Stationary distribution of the damped walk with uniform teleport.
///
/// Dangling nodes spread their mass uniformly. `initial` only changes how
/// many iterations are needed, never the fixed point.
pub fn stationary(
    transition: &Transition,
    settings: &IterationSettings,
    initial: Option<&[f64]>,
    layer: &'static str,
) -> Result<Stationary, SolveError> {
    let n = transition.n;
    if n == 0 {
        return Ok(Stationary {
            values: Vec::new(),
            iterations: 0,
            converged: true,
            residual: 0.0,
        });
    }

    let mut ranks = match initial {
        Some(init) if init.len() == n => normalize(init, settings.total),
        _ => vec![settings.total / n as f64; n],
    };
    let mut next = vec![0.0; n];
    let d = settings.damping;
    let mut residual = f64::INFINITY;

    for iteration in 1..=settings.max_iterations {
        let dangling_mass: f64 = transition.dangling.iter().map(|&i| ranks[i]).sum();
        let base = ((1.0 - d) * settings.total + d * dangling_mass) / n as f64;

        let pull = |j: usize| -> f64 {
            base + d * transition.incoming[j].iter().map(|&(i, p)| ranks[i] * p).sum::<f64>()
        };
        if n >= PARALLEL_THRESHOLD {
            next.par_iter_mut().enumerate().for_each(|(j, v)| *v = pull(j));
        } else {
            for (j, v) in next.iter_mut().enumerate() {
                *v = pull(j);
            }
        }

        // Renormalise to keep rounding drift out of the total.
        let sum: f64 = next.iter().sum();
        if !sum.is_finite() || !(sum > 0.0) {
            return Err(SolveError::NonFiniteRating { layer });
        }
        let scale = settings.total / sum;
        for v in next.iter_mut() {
            *v *= scale;
        }

        residual = l1_distance(&next, &ranks);
        std::mem::swap(&mut ranks, &mut next);

        if residual < settings.tolerance {
            return Ok(Stationary {
                values: ranks,
                iterations: iteration,
                converged: true,
                residual,
            });
        }
    }

    Ok(Stationary {
        values: ranks,
        iterations: settings.max_iterations,
        converged: false,
        residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings() -> IterationSettings {
        IterationSettings {
            damping: 0.85,
            tolerance: 1e-12,
            max_iterations: 1000,
            total: 1.0,
        }
    }

    #[test]
    fn single_arc_favours_the_target() {
        let mut g = WeightedDigraph::new(2);
        g.add_arc(1, 0, 3.0);
        let t = Transition::from_graph(&g);
        assert_eq!(t.dangling, vec![0]);

        let s = stationary(&t, &settings(), None, "team").unwrap();
        assert!(s.converged);
        assert!(s.values[0] > s.values[1]);
        assert_relative_eq!(s.values.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        // r1 = ((1-d) + d*r0) / 2 with r0 = 1 - r1
        let d = 0.85;
        let r1 = 1.0 / (2.0 + d);
        assert_relative_eq!(s.values[1], r1, epsilon = 1e-9);
    }

    #[test]
    fn empty_graph_is_uniform() {
        let t = Transition::from_graph(&WeightedDigraph::new(4));
        let s = stationary(&t, &settings(), None, "team").unwrap();
        for v in &s.values {
            assert_relative_eq!(*v, 0.25, epsilon = 1e-12);
        }
    }

    #[test]
    fn respects_iteration_cap() {
        let mut g = WeightedDigraph::new(3);
        g.add_arc(0, 1, 1.0);
        g.add_arc(1, 2, 1.0);
        g.add_arc(2, 0, 5.0);
        g.add_arc(2, 1, 1.0);
        let capped = IterationSettings {
            max_iterations: 2,
            tolerance: 1e-15,
            ..settings()
        };
        let s = stationary(&Transition::from_graph(&g), &capped, None, "team").unwrap();
        assert!(!s.converged);
        assert_eq!(s.iterations, 2);
        assert_relative_eq!(s.values.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn warm_start_reaches_the_same_fixed_point() {
        let mut g = WeightedDigraph::new(3);
        g.add_arc(0, 1, 2.0);
        g.add_arc(1, 2, 1.0);
        g.add_arc(0, 2, 1.0);
        let t = Transition::from_graph(&g);
        let cold = stationary(&t, &settings(), None, "team").unwrap();
        let warm = stationary(&t, &settings(), Some(&cold.values), "team").unwrap();
        assert!(warm.iterations <= cold.iterations);
        for (a, b) in cold.values.iter().zip(&warm.values) {
            assert_relative_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn transitions_compare_within_tolerance() {
        let mut a = WeightedDigraph::new(2);
        a.add_arc(1, 0, 1.0);
        let mut b = WeightedDigraph::new(2);
        b.add_arc(1, 0, 7.0);
        // Row-normalised, a single outgoing arc is always probability 1.
        assert!(Transition::from_graph(&a).approx_eq(&Transition::from_graph(&b), 1e-12));

        b.add_arc(0, 1, 1.0);
        assert!(!Transition::from_graph(&a).approx_eq(&Transition::from_graph(&b), 1e-12));
    }

    #[test]
    fn normalize_handles_degenerate_input() {
        assert_eq!(normalize(&[0.0, 0.0], 2.0), vec![1.0, 1.0]);
        let v = normalize(&[1.0, 3.0], 1.0);
        assert_relative_eq!(v[1], 0.75, epsilon = 1e-12);
    }
}
