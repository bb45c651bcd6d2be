//! Configuration loading and root folder resolution

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(root_folder));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_root_folder())
}

/// Get configuration file path for the platform
fn locate_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("questline").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/questline/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("questline"))
        .unwrap_or_else(|| PathBuf::from("./questline_data"))
}

/// Database file path under the root folder
pub fn database_path(root_folder: &std::path::Path) -> PathBuf {
    root_folder.join("questline.db")
}

/// Engine tuning constants
///
/// Duplicate windows, grade thresholds, and delivery cadence are
/// configuration, not derived values. The defaults below are the
/// documented product behavior; deployments may override them.
#[derive(Debug, Clone)]
pub struct EngineTuning {
    /// Same-type non-start events inside this window are duplicates
    pub duplicate_window: Duration,
    /// View-type XP sources re-award only after this much time
    pub view_reaward_window: Duration,
    /// Grade percent at or above which a graded quest stays validated
    pub grade_pass_threshold: f64,
    /// Grade percent at or above which the excellence bonus is granted
    pub grade_excellence_threshold: f64,
    /// Excellence bonus as a fraction of the quest's base reward
    pub excellence_bonus_ratio: f64,
    /// Idle interval after which a subscriber emits a heartbeat
    pub heartbeat_interval: Duration,
    /// Publish retry attempts for high-value notifications
    pub publish_attempts: u32,
    /// Initial backoff between publish attempts (doubles each retry)
    pub publish_backoff: Duration,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            duplicate_window: Duration::from_secs(5),
            view_reaward_window: Duration::from_secs(3600),
            grade_pass_threshold: 70.0,
            grade_excellence_threshold: 90.0,
            excellence_bonus_ratio: 0.20,
            heartbeat_interval: Duration::from_secs(30),
            publish_attempts: 3,
            publish_backoff: Duration::from_millis(500),
        }
    }
}
