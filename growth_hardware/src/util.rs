//! Least-squares fits used by the simulated data history.

use growth_traits::RegressionFit;

/// Ordinary least squares `y = a + b·x` with its coefficient of determination.
///
/// Returns `None` for fewer than two points or a degenerate X variance.
pub fn fit_linear(xs: &[f64], ys: &[f64]) -> Option<RegressionFit> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean_x = xs[..n].iter().sum::<f64>() / nf;
    let mean_y = ys[..n].iter().sum::<f64>() / nf;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    let mut syy = 0.0f64;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if !sxx.is_finite() || sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    // A perfectly flat series is fitted exactly.
    let r_squared = if syy == 0.0 {
        1.0
    } else {
        (sxy * sxy) / (sxx * syy)
    };
    Some(RegressionFit {
        intercept,
        slope,
        r_squared,
    })
}

/// Exponential fit `y = A·e^(B·x)` via a linear fit of `ln y`.
///
/// `intercept` is `A`; R² is reported in log space. Non-positive samples make
/// the fit undefined.
pub fn fit_exponential(xs: &[f64], ys: &[f64]) -> Option<RegressionFit> {
    if ys.iter().any(|y| !(*y > 0.0)) {
        return None;
    }
    let logs: Vec<f64> = ys.iter().map(|y| y.ln()).collect();
    let lin = fit_linear(xs, &logs)?;
    Some(RegressionFit {
        intercept: lin.intercept.exp(),
        slope: lin.slope,
        r_squared: lin.r_squared,
    })
}
