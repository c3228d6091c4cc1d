//! Derivative-free simplex minimiser (Nelder & Mead, 1965).
//!
//! The objective is any closure over a parameter slice; problem data is captured
//! by the closure rather than passed through shared state. A `NaN` objective value
//! is treated as `+∞`, so infeasible points (e.g. a star projected behind the
//! camera) simply repel the simplex.
//!
//! Each axis has its own initial step, which sets the size of the starting
//! simplex and lets parameters of very different scales move comparably.
//! After convergence the search restarts from the best vertex with a fresh
//! simplex until a restart stops improving the objective.
use log::debug;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Result of a minimisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    /// Best parameter vector found
    pub x: Vec<f64>,
    /// Objective value at `x`
    pub value: f64,
    /// Simplex iterations performed, all restarts included
    pub iterations: usize,
    /// `false` when the iteration cap was hit before the tolerances were met
    pub converged: bool,
}

/// Nelder–Mead minimiser configuration.
#[derive(Debug, Clone)]
pub struct NelderMead {
    steps: Vec<f64>,
    xatol: f64,
    fatol: f64,
    max_iterations: usize,
    max_restarts: usize,
}

impl NelderMead {
    /// Minimiser whose initial simplex extends `steps[i]` along axis `i`.
    pub fn new(steps: Vec<f64>) -> Self {
        NelderMead {
            steps,
            xatol: 1e-8,
            fatol: 1e-12,
            max_iterations: 100_000,
            max_restarts: 5,
        }
    }

    /// Absolute tolerance on the simplex extent along every axis.
    pub fn with_xatol(mut self, xatol: f64) -> Self {
        self.xatol = xatol;
        self
    }

    /// Absolute tolerance on the spread of objective values over the simplex.
    pub fn with_fatol(mut self, fatol: f64) -> Self {
        self.fatol = fatol;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Minimise `objective` starting from `x0`.
    ///
    /// Arguments
    /// -----------------
    /// * `objective`: function of the parameter vector; `NaN` is read as `+∞`.
    /// * `x0`: starting point, same length as the configured steps.
    ///
    /// Return
    /// ----------
    /// * The best [`Minimum`] found. Hitting the iteration cap is not an error: the last
    ///   best vertex is returned with `converged = false`.
    pub fn minimize<F>(&self, objective: F, x0: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let f = |x: &[f64]| {
            let v = objective(x);
            if v.is_nan() {
                f64::INFINITY
            } else {
                v
            }
        };

        let mut best = Minimum {
            x: x0.to_vec(),
            value: f(x0),
            iterations: 0,
            converged: false,
        };

        for restart in 0..=self.max_restarts {
            let budget = self.max_iterations.saturating_sub(best.iterations);
            if budget == 0 {
                break;
            }
            let (x, value, iterations, converged) = self.run(&f, &best.x, budget);
            let improvement = best.value - value;
            best.iterations += iterations;
            if value <= best.value {
                best.x = x;
                best.value = value;
            }
            best.converged = converged;
            debug!(
                "nelder-mead pass {restart}: value = {value:.6e}, iterations = {iterations}, converged = {converged}"
            );
            if !converged || !(improvement > self.fatol) {
                break;
            }
        }
        best
    }

    fn run<F>(&self, f: &F, x0: &[f64], budget: usize) -> (Vec<f64>, f64, usize, bool)
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = x0.len();
        if n == 0 {
            return (Vec::new(), f(x0), 0, true);
        }

        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        simplex.push(x0.to_vec());
        for i in 0..n {
            let mut vertex = x0.to_vec();
            let step = self.steps.get(i).copied().unwrap_or(1.0);
            vertex[i] += if step != 0.0 { step } else { 1e-3 };
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();

        let mut iterations = 0;
        let mut converged = false;
        while iterations < budget {
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            let x_spread = simplex[1..]
                .iter()
                .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
                .fold(0.0_f64, f64::max);
            let f_spread = values[1..]
                .iter()
                .map(|v| (v - values[0]).abs())
                .fold(0.0_f64, f64::max);
            if x_spread <= self.xatol && (f_spread <= self.fatol || f_spread.is_nan()) {
                converged = true;
                break;
            }
            iterations += 1;

            let centroid: Vec<f64> = (0..n)
                .map(|k| simplex[..n].iter().map(|v| v[k]).sum::<f64>() / n as f64)
                .collect();
            let along = |coefficient: f64| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(&simplex[n])
                    .map(|(c, w)| c + coefficient * (c - w))
                    .collect()
            };

            let reflected = along(REFLECTION);
            let f_reflected = f(&reflected);

            if f_reflected < values[0] {
                let expanded = along(REFLECTION * EXPANSION);
                let f_expanded = f(&expanded);
                if f_expanded < f_reflected {
                    simplex[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    simplex[n] = reflected;
                    values[n] = f_reflected;
                }
                continue;
            }
            if f_reflected < values[n - 1] {
                simplex[n] = reflected;
                values[n] = f_reflected;
                continue;
            }

            let (contracted, f_contracted) = if f_reflected < values[n] {
                let outside = along(REFLECTION * CONTRACTION);
                let fo = f(&outside);
                (outside, fo)
            } else {
                let inside = along(-CONTRACTION);
                let fi = f(&inside);
                (inside, fi)
            };
            if f_contracted < values[n].min(f_reflected) {
                simplex[n] = contracted;
                values[n] = f_contracted;
                continue;
            }

            let best = simplex[0].clone();
            for i in 1..=n {
                simplex[i] = simplex[i]
                    .iter()
                    .zip(&best)
                    .map(|(v, b)| b + SHRINK * (v - b))
                    .collect();
                values[i] = f(&simplex[i]);
            }
        }

        let (best_index, _) = values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .unwrap_or((0, &values[0]));
        (
            simplex[best_index].clone(),
            values[best_index],
            iterations,
            converged,
        )
    }
}

#[cfg(test)]
mod nelder_mead_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_quadratic_bowl() {
        let nm = NelderMead::new(vec![1.0, 1.0]);
        let min = nm.minimize(|x| (x[0] - 3.0).powi(2) + 10.0 * (x[1] + 1.0).powi(2), &[0.0, 0.0]);
        assert!(min.converged);
        assert_abs_diff_eq!(min.x[0], 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(min.x[1], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rosenbrock() {
        let nm = NelderMead::new(vec![0.5, 0.5]).with_xatol(1e-10).with_fatol(1e-16);
        let min = nm.minimize(
            |x| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2),
            &[-1.2, 1.0],
        );
        assert_abs_diff_eq!(min.x[0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(min.x[1], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_nan_is_infeasible() {
        // Feasible only for x > 0; minimum at the boundary side x = 1
        let nm = NelderMead::new(vec![0.5]);
        let min = nm.minimize(|x| if x[0] <= 0.0 { f64::NAN } else { (x[0] - 1.0).powi(2) }, &[2.0]);
        assert_abs_diff_eq!(min.x[0], 1.0, epsilon = 1e-6);
        assert!(min.value.is_finite());
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let nm = NelderMead::new(vec![1.0, 1.0, 1.0]).with_max_iterations(3);
        let min = nm.minimize(|x| x.iter().map(|v| (v - 5.0).powi(2)).sum(), &[0.0, 0.0, 0.0]);
        assert!(!min.converged);
        assert_eq!(min.iterations, 3);
        assert!(min.value < 75.0);
    }
}
