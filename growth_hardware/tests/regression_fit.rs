use growth_hardware::util::{fit_exponential, fit_linear};
use rstest::rstest;

#[rstest]
#[case(2.0, 0.5)]
#[case(-1.0, 3.0)]
#[case(0.4, 0.0)]
fn linear_fit_recovers_line_exactly(#[case] intercept: f64, #[case] slope: f64) {
    let xs: Vec<f64> = (0..10).map(f64::from).collect();
    let ys: Vec<f64> = xs.iter().map(|x| intercept + slope * x).collect();
    let fit = fit_linear(&xs, &ys).expect("fit");
    assert!((fit.intercept - intercept).abs() < 1e-9);
    assert!((fit.slope - slope).abs() < 1e-9);
    assert!((fit.r_squared - 1.0).abs() < 1e-9);
}

#[rstest]
#[case(0.4, 1e-4)]
#[case(0.05, 2.5e-4)]
#[case(1.2, -5e-5)]
fn exponential_fit_recovers_rate(#[case] a: f64, #[case] rate: f64) {
    let xs: Vec<f64> = (0..50).map(|i| f64::from(i) * 600.0).collect();
    let ys: Vec<f64> = xs.iter().map(|x| a * (rate * x).exp()).collect();
    let fit = fit_exponential(&xs, &ys).expect("fit");
    assert!((fit.intercept - a).abs() / a < 1e-9);
    assert!((fit.slope - rate).abs() < 1e-12);
    assert!(fit.r_squared > 0.999_999);
}

#[rstest]
#[case(&[1.0], &[2.0])]
#[case(&[1.0, 1.0], &[2.0, 3.0])]
fn degenerate_linear_inputs_yield_none(#[case] xs: &[f64], #[case] ys: &[f64]) {
    assert!(fit_linear(xs, ys).is_none());
}

#[rstest]
#[case(&[0.0, 1.0], &[0.5, 0.0])]
#[case(&[0.0, 1.0], &[-0.5, 0.2])]
fn non_positive_od_has_no_exponential_fit(#[case] xs: &[f64], #[case] ys: &[f64]) {
    assert!(fit_exponential(xs, ys).is_none());
}

#[test]
fn noisy_series_has_low_r_squared() {
    let xs: Vec<f64> = (0..20).map(f64::from).collect();
    let ys: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { 3.0 }).collect();
    let fit = fit_linear(&xs, &ys).expect("fit");
    assert!(fit.r_squared < 0.1);
}
