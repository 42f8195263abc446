#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing and validation of arbitrary TOML must never panic.
    let parsed = toml::from_str::<growth_config::Config>(data);
    if let Ok(cfg) = parsed {
        let _ = cfg.validate();
    }
});
