//! Config and state path resolution helpers.

use std::path::PathBuf;

const FEATURE_DIR: &str = "deep-uninstall";

/// `<config dir>/residue/residue.toml`
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(config_dir.join("residue").join("residue.toml"))
}

/// `<state dir>/residue/runs/deep-uninstall`
pub fn default_run_dir() -> anyhow::Result<PathBuf> {
    let state_dir = dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .ok_or_else(|| anyhow::anyhow!("Could not determine state directory"))?;
    Ok(state_dir.join("residue").join("runs").join(FEATURE_DIR))
}

/// Roots the filesystem heuristic walks when none are configured.
#[cfg(windows)]
pub fn default_search_roots() -> Vec<PathBuf> {
    let vars = [
        "ProgramFiles",
        "ProgramFiles(x86)",
        "ProgramData",
        "APPDATA",
        "LOCALAPPDATA",
    ];
    let mut roots: Vec<PathBuf> = Vec::new();
    for var in vars {
        if let Some(value) = std::env::var_os(var) {
            let path = PathBuf::from(value);
            if !roots.contains(&path) {
                roots.push(path);
            }
        }
    }
    roots
}

/// Roots the filesystem heuristic walks when none are configured.
#[cfg(not(windows))]
pub fn default_search_roots() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    let candidates = [
        dirs::data_dir(),
        dirs::data_local_dir(),
        dirs::config_dir(),
        dirs::cache_dir(),
    ];
    for path in candidates.into_iter().flatten() {
        if !roots.contains(&path) {
            roots.push(path);
        }
    }
    roots
}
