use std::sync::Arc;

use growth_core::error::BuildError;
use growth_core::{
    EvalWindow, GrowthCfg, GrowthOptimizer, ParameterCfg, ParameterChannel, PsoCfg, SetPoint,
    StabilityCfg, StrategyCfg, TurbidostatCfg, from_config,
};
use growth_traits::ManualClock;
use rstest::rstest;

fn expect_build_error(res: growth_core::Result<GrowthOptimizer>) -> BuildError {
    let err = res.expect_err("should fail to build");
    match err.downcast_ref::<BuildError>() {
        Some(e) => e.clone(),
        None => panic!("expected a BuildError, got: {err:?}"),
    }
}

fn pso(search_min: Vec<f64>, search_max: Vec<f64>, max_step: Vec<f64>) -> ParameterCfg {
    ParameterCfg {
        channel: ParameterChannel::Temperature,
        strategy: StrategyCfg::Pso(PsoCfg {
            leader: "pbr-1".into(),
            neighbors: vec![],
            search_min,
            search_max,
            max_step,
            initial: None,
            stale_after_s: 3600,
            mail_recipient: "pso".into(),
        }),
    }
}

#[rstest]
fn missing_unit_yields_typed_build_error() {
    let res = GrowthOptimizer::builder()
        .with_turbidostat(TurbidostatCfg::default())
        .try_build();
    assert!(matches!(expect_build_error(res), BuildError::MissingUnit));
}

#[rstest]
fn blank_unit_is_missing() {
    let res = GrowthOptimizer::builder()
        .with_unit("  ")
        .with_turbidostat(TurbidostatCfg::default())
        .build();
    assert!(matches!(expect_build_error(res), BuildError::MissingUnit));
}

#[rstest]
fn missing_turbidostat_yields_typed_build_error() {
    let res = GrowthOptimizer::builder().with_unit("pbr-1").try_build();
    assert!(matches!(expect_build_error(res), BuildError::MissingTurbidostat));
}

#[rstest]
#[case(TurbidostatCfg { readout_interval_s: 0, ..TurbidostatCfg::default() }, "readout_interval_s")]
#[case(TurbidostatCfg { od_min: 0.0, ..TurbidostatCfg::default() }, "OD bounds")]
#[case(TurbidostatCfg { pump_speed_pct: 120.0, ..TurbidostatCfg::default() }, "percentages")]
#[case(TurbidostatCfg { noise_ratio: 1.0, ..TurbidostatCfg::default() }, "noise_ratio")]
fn invalid_turbidostat_is_rejected(#[case] cfg: TurbidostatCfg, #[case] needle: &str) {
    let res = GrowthOptimizer::builder()
        .with_unit("pbr-1")
        .with_turbidostat(cfg)
        .build();
    match expect_build_error(res) {
        BuildError::InvalidConfig(msg) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[rstest]
#[case(GrowthCfg { r2_min: 1.2, ..GrowthCfg::default() }, "r2_min")]
#[case(GrowthCfg { eval: EvalWindow::Fraction(0.0), ..GrowthCfg::default() }, "eval fraction")]
#[case(GrowthCfg { regression_time_unit_s: 0.0, ..GrowthCfg::default() }, "regression_time_unit_s")]
fn invalid_growth_is_rejected(#[case] cfg: GrowthCfg, #[case] needle: &str) {
    let res = GrowthOptimizer::builder()
        .with_unit("pbr-1")
        .with_turbidostat(TurbidostatCfg::default())
        .with_growth(cfg)
        .build();
    match expect_build_error(res) {
        BuildError::InvalidConfig(msg) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

fn initial_at(x: f64) -> ParameterCfg {
    let mut cfg = pso(vec![20.0], vec![40.0], vec![1.0]);
    if let StrategyCfg::Pso(p) = &mut cfg.strategy {
        p.initial = Some(vec![x]);
    }
    cfg
}

#[rstest]
#[case(ParameterCfg {
    channel: ParameterChannel::Lights,
    strategy: StrategyCfg::Sweep { steps: vec![SetPoint::Scalar(100.0)] },
}, "arity")]
#[case(ParameterCfg {
    channel: ParameterChannel::None,
    strategy: StrategyCfg::Pso(PsoCfg {
        leader: "pbr-1".into(),
        neighbors: vec![],
        search_min: vec![],
        search_max: vec![],
        max_step: vec![],
        initial: None,
        stale_after_s: 3600,
        mail_recipient: "pso".into(),
    }),
}, "parameter channel")]
#[case(pso(vec![20.0, 0.0], vec![40.0, 1.0], vec![1.0, 1.0]), "arity")]
#[case(pso(vec![40.0], vec![20.0], vec![1.0]), "search_min")]
#[case(pso(vec![f64::NAN], vec![40.0], vec![1.0]), "finite")]
#[case(pso(vec![20.0], vec![f64::INFINITY], vec![1.0]), "finite")]
#[case(pso(vec![20.0], vec![40.0], vec![f64::NAN]), "finite")]
#[case(pso(vec![20.0], vec![40.0], vec![0.0]), "max_step")]
#[case(initial_at(f64::NAN), "finite")]
fn invalid_parameter_is_rejected(#[case] cfg: ParameterCfg, #[case] needle: &str) {
    let res = GrowthOptimizer::builder()
        .with_unit("pbr-1")
        .with_turbidostat(TurbidostatCfg::default())
        .with_parameter(cfg)
        .build();
    match expect_build_error(res) {
        BuildError::InvalidConfig(msg) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[rstest]
fn single_analyzed_step_is_rejected() {
    let res = GrowthOptimizer::builder()
        .with_unit("pbr-1")
        .with_turbidostat(TurbidostatCfg::default())
        .with_stability(StabilityCfg {
            analyzed_steps: 1,
            ..StabilityCfg::default()
        })
        .build();
    assert!(matches!(
        expect_build_error(res),
        BuildError::InvalidConfig(_)
    ));
}

#[rstest]
fn reversed_band_builds() {
    let opt = GrowthOptimizer::builder()
        .with_unit("pbr-1")
        .with_turbidostat(TurbidostatCfg {
            od_min: 0.6,
            od_max: 0.4,
            ..TurbidostatCfg::default()
        })
        .build();
    assert!(opt.is_ok());
}

const TOML: &str = r#"
[unit]
name = "pbr-7"

[turbidostat]
od_min = 0.40
od_max = 0.425
od_sensor = 720
readout_interval_s = 30

[stability]
analyzed_steps = 6
min_dwell_h = 12
max_dwell_h = 48

[parameter]
channel = "gms"
steps = [[100, 2], [100, 4]]
"#;

#[rstest]
fn from_config_builds_the_configured_unit() {
    let cfg = growth_config::load_toml(TOML).expect("parse TOML");
    cfg.validate().expect("valid config");
    let opt = from_config(&cfg, Some(Arc::new(ManualClock::new()))).expect("build");
    assert_eq!(opt.unit(), "pbr-7");
    assert_eq!(opt.readout_interval_s(), 30);
    assert_eq!(opt.od_sensor_id(), "od-sensors.od-720");
}

#[rstest]
fn fingerprint_tracks_configuration() {
    let a = growth_config::load_toml(TOML).expect("parse TOML");
    let b = growth_config::load_toml(&TOML.replace("od_max = 0.425", "od_max = 0.45")).expect("parse TOML");
    let fa = from_config(&a, None).expect("build").fingerprint().to_string();
    let fa2 = from_config(&a, None).expect("build").fingerprint().to_string();
    let fb = from_config(&b, None).expect("build").fingerprint().to_string();
    assert_eq!(fa, fa2);
    assert_ne!(fa, fb);
}

#[rstest]
fn from_config_rejects_oversized_set_points() {
    let cfg = growth_config::load_toml(&TOML.replace("[[100, 2], [100, 4]]", "[[1, 2, 3]]"))
        .expect("parse TOML");
    let res = from_config(&cfg, None);
    assert!(matches!(
        expect_build_error(res),
        BuildError::InvalidConfig(_)
    ));
}

#[rstest]
fn from_config_rejects_nan_search_range() {
    let toml = format!(
        "{}\n[pso]\nleader = \"pbr-7\"\nsearch_min = [nan, 0.0]\nsearch_max = [200.0, 10.0]\nmax_step = [10.0, 1.0]\n",
        TOML.replace("steps = [[100, 2], [100, 4]]", "strategy = \"pso\"")
    );
    let cfg = growth_config::load_toml(&toml).expect("parse TOML");
    assert!(matches!(
        expect_build_error(from_config(&cfg, None)),
        BuildError::InvalidConfig(_)
    ));
}
