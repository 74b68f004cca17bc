// src/infra/paths.rs — Config path resolution
//
// BREAKTHROUGH_HOME overrides everything. Otherwise config lives in
// ~/.breakthrough/. The engine itself keeps no on-disk state.

use std::path::PathBuf;

/// Returns the BREAKTHROUGH_HOME override, if set.
fn breakthrough_home() -> Option<PathBuf> {
    std::env::var_os("BREAKTHROUGH_HOME").map(PathBuf::from)
}

/// Configuration directory: $BREAKTHROUGH_HOME/ or ~/.breakthrough/
pub fn config_dir() -> Option<PathBuf> {
    if let Some(home) = breakthrough_home() {
        return Some(home);
    }
    dirs_home().map(|home| home.join(".breakthrough"))
}

/// Home directory, when one can be determined.
pub fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf())
}

/// Config file path
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
