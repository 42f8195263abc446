//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use growth_core::error::{BuildError, OptimizerError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingUnit => {
                "What happened: No unit name was configured.\nLikely causes: [unit].name is empty.\nHow to fix: Give the unit the name its peers use to reach it (e.g. name = \"pbr-1\").".to_string()
            }
            BuildError::MissingTurbidostat => {
                "What happened: No OD band was provided to the optimizer.\nLikely causes: The builder was used without with_turbidostat(...).\nHow to fix: Configure [turbidostat] od_min and od_max.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `growth-optimizer check-config`."
            ),
        };
    }

    if let Some(oe) = err.downcast_ref::<OptimizerError>() {
        return match oe {
            OptimizerError::Channel(msg) => format!(
                "What happened: The controlled parameter could not be applied ({msg}).\nLikely causes: A set point outside the accessory range or the wrong number of values.\nHow to fix: Check [parameter].steps or the [pso] search range against the channel."
            ),
            OptimizerError::Hardware(msg) | OptimizerError::HardwareFault(msg) => format!(
                "What happened: An accessory failed ({msg}).\nLikely causes: The accessory is missing from the unit or reports an error.\nHow to fix: Check the unit's accessories, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass an existing TOML file with --config. Original: {msg}"
        );
    }

    if lower.contains("parse config") || lower.contains("toml") {
        return format!(
            "What happened: The config file is not valid TOML for this program.\nLikely causes: A typo, an unknown channel or strategy, or a missing [unit] table.\nHow to fix: Compare with etc/growth_config.toml. Original: {msg}"
        );
    }

    if lower.contains("invalid configuration") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: Out-of-range or inconsistent values.\nHow to fix: Edit the TOML config and try again. Original: {msg}"
        );
    }

    // OD trace CSV header special-case
    if lower.contains("od trace csv must have headers") {
        return "Invalid headers in OD trace CSV. Expected 'time_s,od'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Configuration problems exit with 2, everything else with 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use growth_core::error::BuildError;
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    let lower = format!("{err:#}").to_ascii_lowercase();
    if lower.contains("invalid configuration") || lower.contains("parse config") || lower.contains("read config") {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use growth_core::error::{BuildError, OptimizerError};
    use serde_json::json;

    let reason = if err.downcast_ref::<BuildError>().is_some() {
        "InvalidConfig"
    } else if let Some(oe) = err.downcast_ref::<OptimizerError>() {
        match oe {
            OptimizerError::Hardware(_) | OptimizerError::HardwareFault(_) => "Hardware",
            OptimizerError::Channel(_) => "Channel",
            OptimizerError::Config(_) => "InvalidConfig",
            OptimizerError::Context(_) | OptimizerError::State(_) => "State",
        }
    } else if exit_code_for_error(err) == 2 {
        "InvalidConfig"
    } else {
        "Error"
    };
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use growth_core::error::BuildError;

    #[test]
    fn build_errors_are_config_failures() {
        let err = eyre::Report::new(BuildError::InvalidConfig("noise_ratio must be in (0, 1)"));
        assert_eq!(exit_code_for_error(&err), 2);
        assert!(humanize(&err).contains("noise_ratio"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "InvalidConfig");
    }

    #[test]
    fn unknown_errors_fall_back() {
        let err = eyre::eyre!("disk on fire");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).starts_with("Something went wrong."));
    }
}
