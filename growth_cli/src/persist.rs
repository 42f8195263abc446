//! Unit contexts and simulation progress persisted as JSON files.

use std::collections::BTreeMap;
use std::{fs, io::Write, path::Path};

use eyre::{Result, WrapErr};
use growth_traits::MemoryContext;
use serde::{Deserialize, Serialize};

pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

/// Simulated time and true culture densities at the last save.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Progress {
    pub time_s: u64,
    pub od: BTreeMap<String, f64>,
}

fn context_path(dir: &Path, unit: &str) -> std::path::PathBuf {
    dir.join(format!("{unit}.json"))
}

pub fn save_context(dir: &Path, unit: &str, ctx: &MemoryContext) -> Result<()> {
    let json = serde_json::to_vec_pretty(ctx).wrap_err("serialize unit context")?;
    let path = context_path(dir, unit);
    write_atomic(&path, &json).wrap_err_with(|| format!("write {}", path.display()))
}

/// Saved context of `unit`, `None` when there is none yet.
pub fn load_context(dir: &Path, unit: &str) -> Result<Option<MemoryContext>> {
    let path = context_path(dir, unit);
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).wrap_err_with(|| format!("read {}", path.display()))?;
    let ctx = serde_json::from_str(&text).wrap_err_with(|| format!("parse unit context {}", path.display()))?;
    Ok(Some(ctx))
}

pub fn save_progress(dir: &Path, progress: &Progress) -> Result<()> {
    let json = serde_json::to_vec_pretty(progress).wrap_err("serialize simulation progress")?;
    write_atomic(&dir.join("simulation.json"), &json).wrap_err("write simulation progress")
}

pub fn load_progress(dir: &Path) -> Result<Option<Progress>> {
    let path = dir.join("simulation.json");
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).wrap_err_with(|| format!("read {}", path.display()))?;
    Ok(Some(serde_json::from_str(&text).wrap_err("parse simulation progress")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use growth_traits::Context;

    #[test]
    fn context_survives_a_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = MemoryContext::new();
        ctx.put("odLast", 0.41.into());
        ctx.put("phase", "measuring-step".into());
        ctx.put("stepDoublingTime", vec![8.1, 8.0].into());
        save_context(dir.path(), "pbr-1", &ctx).unwrap();
        let back = load_context(dir.path(), "pbr-1").unwrap().unwrap();
        assert_eq!(back, ctx);
        assert!(load_context(dir.path(), "pbr-2").unwrap().is_none());
        assert!(!dir.path().join("pbr-1.new").exists());
    }
}
