//! Bounded minimisation of a scalar function of one variable.
//!
//! A coarse grid scan locates the basin of the global minimum on `[lo, hi]`,
//! then Brent's method (parabolic interpolation with golden-section fallback)
//! refines it inside the two grid cells around the best sample.
const GOLDEN: f64 = 0.381_966_011_250_105;
const BRENT_MAX_ITERATIONS: usize = 500;
const BRENT_XATOL: f64 = 1e-6;

/// Minimise `f` on `[lo, hi]`.
///
/// Arguments
/// -----------------
/// * `f`: objective; `NaN` is read as `+∞`.
/// * `lo`, `hi`: bounds, `lo ≤ hi`.
/// * `grid`: number of grid cells of the initial scan (at least 1).
///
/// Return
/// ----------
/// * `(x, f(x))` of the best point found.
pub fn minimize_bounded<F>(f: F, lo: f64, hi: f64, grid: usize) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    let f = |x: f64| {
        let v = f(x);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    };
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    let grid = grid.max(1);
    let step = (hi - lo) / grid as f64;

    let mut best = (lo, f(lo));
    let mut best_index = 0;
    for i in 1..=grid {
        let x = if i == grid { hi } else { lo + step * i as f64 };
        let v = f(x);
        if v < best.1 {
            best = (x, v);
            best_index = i;
        }
    }
    if step == 0.0 {
        return best;
    }

    let a = lo + step * best_index.saturating_sub(1) as f64;
    let b = (lo + step * (best_index + 1) as f64).min(hi);
    let refined = brent(&f, a, b);
    if refined.1 <= best.1 {
        refined
    } else {
        best
    }
}

/// Brent's bounded minimisation on `[a, b]`.
fn brent<F>(f: &F, mut a: f64, mut b: f64) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    let sqrt_eps = f64::EPSILON.sqrt();
    let mut x = a + GOLDEN * (b - a);
    let (mut w, mut v) = (x, x);
    let mut fx = f(x);
    let (mut fw, mut fv) = (fx, fx);
    let (mut d, mut e): (f64, f64) = (0.0, 0.0);

    for _ in 0..BRENT_MAX_ITERATIONS {
        let xm = 0.5 * (a + b);
        let tol1 = sqrt_eps * x.abs() + BRENT_XATOL / 3.0;
        let tol2 = 2.0 * tol1;
        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            break;
        }

        let mut golden = true;
        if e.abs() > tol1 {
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let e_previous = e;
            e = d;
            if p.abs() < (0.5 * q * e_previous).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if (u - a) < tol2 || (b - u) < tol2 {
                    d = tol1.copysign(xm - x);
                }
                golden = false;
            }
        }
        if golden {
            e = if x >= xm { a - x } else { b - x };
            d = GOLDEN * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else {
            x + tol1.copysign(d)
        };
        let fu = f(u);

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            (v, fv) = (w, fw);
            (w, fw) = (x, fx);
            (x, fx) = (u, fu);
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                (v, fv) = (w, fw);
                (w, fw) = (u, fu);
            } else if fu <= fv || v == x || v == w {
                (v, fv) = (u, fu);
            }
        }
    }
    (x, fx)
}

#[cfg(test)]
mod bounded_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parabola() {
        let (x, v) = minimize_bounded(|x| (x - 1.3).powi(2) + 2.0, -20.0, 20.0, 40);
        assert_abs_diff_eq!(x, 1.3, epsilon = 1e-5);
        assert_abs_diff_eq!(v, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_minimum_on_bound() {
        let (x, _) = minimize_bounded(|x| x, -20.0, 20.0, 40);
        assert_abs_diff_eq!(x, -20.0, epsilon = 1e-5);
    }

    #[test]
    fn test_grid_finds_global_basin() {
        // Local minimum near x = -3, global one at x = 4
        let f = |x: f64| ((x + 3.0).powi(2)).min((x - 4.0).powi(2) - 1.0);
        let (x, v) = minimize_bounded(f, -10.0, 10.0, 20);
        assert_abs_diff_eq!(x, 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(v, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nan_regions_ignored() {
        let (x, _) = minimize_bounded(|x| if x < 0.0 { f64::NAN } else { (x - 2.0).abs() }, -5.0, 5.0, 10);
        assert_abs_diff_eq!(x, 2.0, epsilon = 1e-5);
    }
}
