use growth_config::{ChannelKind, Strategy, load_toml};
use rstest::rstest;

const BASE: &str = r#"
[unit]
name = "PBR-01"

[turbidostat]
od_min = 0.40
od_max = 0.425
readout_interval_s = 60
slow_down_range_pct = 25

[stability]
analyzed_steps = 6
confidence_max_pct = 3.0
trend_max_pct = 1.0
min_dwell_h = 12
"#;

fn with(extra: &str) -> String {
    format!("{BASE}\n{extra}")
}

#[test]
fn accepts_minimal_config_with_defaults() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.turbidostat.od_sensor, 680);
    assert_eq!(cfg.growth.history_capacity, 600);
    assert_eq!(cfg.parameter.channel, ChannelKind::None);
    assert_eq!(cfg.parameter.strategy, Strategy::Sweep);
    assert!(cfg.suspension.enabled);
}

#[test]
fn reversed_band_is_not_a_validation_error() {
    let toml = BASE.replace("od_min = 0.40", "od_min = 0.60");
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("reversed band is corrected at runtime");
}

#[test]
fn parses_scalar_and_pair_steps() {
    let cfg = load_toml(&with(
        r#"
[parameter]
channel = "lights"
strategy = "sweep"
steps = [[55, 25], [110, 25], [220, 25]]
"#,
    ))
    .expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.parameter.steps.len(), 3);
    assert_eq!(cfg.parameter.steps[1].values(), vec![110.0, 25.0]);

    let cfg = load_toml(&with(
        r#"
[parameter]
channel = "temperature"
steps = [28, 32, 34]
"#,
    ))
    .expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.parameter.steps[2].values(), vec![34.0]);
}

#[rstest]
#[case("[turbidostat]\nreadout_interval_s = 0", "readout_interval_s must be >= 1")]
#[case("[growth]\nregression_r2_min = 1.5", "regression_r2_min must be in")]
#[case("[growth]\neval_fraction = 0.5\neval_delay_s = 600", "mutually exclusive")]
#[case("[growth]\neval_fraction = 0.0", "eval_fraction must be in")]
#[case("[parameter]\nchannel = \"temperature\"\nsteps = [[1, 2]]", "expects 1")]
#[case("[parameter]\nchannel = \"gms\"\nstrategy = \"pso\"\n[pso]\nleader = \"PBR-01\"\nsearch_min = [0.0]\nsearch_max = [1.0]\nmax_step = [0.1]", "must have 2 values")]
#[case("[parameter]\nchannel = \"stirrer\"\nstrategy = \"pso\"\n[pso]\nleader = \"PBR-01\"\nsearch_min = [90.0]\nsearch_max = [30.0]\nmax_step = [5.0]", "search_min must be <= search_max")]
#[case("[parameter]\nchannel = \"none\"\nstrategy = \"pso\"", "requires a parameter.channel")]
#[case("[parameter]\nchannel = \"temperature\"\nstrategy = \"pso\"\n[pso]\nleader = \"PBR-01\"\nsearch_min = [nan]\nsearch_max = [40.0]\nmax_step = [2.0]", "must be finite")]
#[case("[parameter]\nchannel = \"temperature\"\nstrategy = \"pso\"\n[pso]\nleader = \"PBR-01\"\nsearch_min = [20.0]\nsearch_max = [inf]\nmax_step = [2.0]", "must be finite")]
#[case("[parameter]\nchannel = \"temperature\"\nstrategy = \"pso\"\n[pso]\nleader = \"PBR-01\"\nsearch_min = [20.0]\nsearch_max = [40.0]\nmax_step = [nan]", "must be finite")]
#[case("[parameter]\nchannel = \"temperature\"\nstrategy = \"pso\"\n[pso]\nleader = \"PBR-01\"\nsearch_min = [20.0]\nsearch_max = [40.0]\nmax_step = [2.0]\ninitial = [nan]", "pso.initial must be finite")]
fn rejects_invalid_sections(#[case] extra: &str, #[case] needle: &str) {
    // Sections in BASE must not be repeated, so patch them in place when needed.
    let toml = if extra.starts_with("[turbidostat]") {
        BASE.replace("readout_interval_s = 60", "readout_interval_s = 0")
    } else {
        with(extra)
    };
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn rejects_unknown_channel_at_parse_time() {
    let res = load_toml(&with("[parameter]\nchannel = \"ph\""));
    assert!(res.is_err());
}

#[test]
fn missing_unit_table_is_a_parse_error() {
    let res = load_toml("[turbidostat]\nod_min = 0.4\nod_max = 0.5\n");
    assert!(res.is_err());
}
