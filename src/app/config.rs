use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::app::error::AppError;
use crate::app::models::SuccessPolicy;

pub const DEFAULT_SPLASH_FILE_NAME: &str = "custom_splash.img";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolSettings {
    pub tools_dir: String,
    pub adb_command_path: String,
    pub fastboot_command_path: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            tools_dir: "ADB".to_string(),
            adb_command_path: String::new(),
            fastboot_command_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandSettings {
    /// 0 waits for the child to exit on its own.
    pub command_timeout_secs: u64,
    pub device_check_timeout_secs: u64,
    pub success_policy: SuccessPolicy,
    pub capture_stdout: bool,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: 0,
            device_check_timeout_secs: 10,
            success_policy: SuccessPolicy::ExitCode,
            capture_stdout: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceSettings {
    pub strict_check: bool,
    /// 0 issues the flash right after the reboot request.
    pub bootloader_wait_secs: u64,
    pub bootloader_poll_interval_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            strict_check: false,
            bootloader_wait_secs: 60,
            bootloader_poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SplashSettings {
    pub output_dir: String,
    pub output_file_name: String,
}

impl Default for SplashSettings {
    fn default() -> Self {
        Self {
            output_dir: String::new(),
            output_file_name: DEFAULT_SPLASH_FILE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskSettings {
    pub cancel_on_exit: bool,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            cancel_on_exit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiSettings {
    pub icon_path: String,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            icon_path: "ezflash.ico".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub command: CommandSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub splash: SplashSettings,
    #[serde(default)]
    pub tasks: TaskSettings,
    #[serde(default)]
    pub ui: UiSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("EZFLASH_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ezflash_config.json")
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config_from_value(&value)))
}

pub fn load_config_or_default(trace_id: &str) -> AppConfig {
    load_config_or_default_from_path(&config_path(), trace_id)
}

/// An unreadable or malformed file yields the defaults, matching startup.
pub fn load_config_or_default_from_path(path: &Path, trace_id: &str) -> AppConfig {
    load_config_from_path(path, trace_id).unwrap_or_else(|err| {
        warn!(trace_id = %trace_id, error = %err, "using default configuration");
        AppConfig::default()
    })
}

/// A section that fails to deserialize falls back to its defaults instead of
/// discarding the whole file.
fn config_from_value(value: &serde_json::Value) -> AppConfig {
    if let Ok(config) = serde_json::from_value::<AppConfig>(value.clone()) {
        return config;
    }
    fn section<T>(value: &serde_json::Value, key: &str) -> T
    where
        T: serde::de::DeserializeOwned + Default,
    {
        value
            .get(key)
            .and_then(|section| serde_json::from_value(section.clone()).ok())
            .unwrap_or_default()
    }
    AppConfig {
        tools: section(value, "tools"),
        command: section(value, "command"),
        device: section(value, "device"),
        splash: section(value, "splash"),
        tasks: section(value, "tasks"),
        ui: section(value, "ui"),
        logging: section(value, "logging"),
    }
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    if config.tools.tools_dir.trim().is_empty() {
        config.tools.tools_dir = ToolSettings::default().tools_dir;
    }
    if config.command.device_check_timeout_secs == 0 {
        config.command.device_check_timeout_secs = 10;
    }
    if config.device.bootloader_poll_interval_ms < 100 {
        config.device.bootloader_poll_interval_ms = 1000;
    }
    let file_name = config.splash.output_file_name.trim();
    if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name == ".." {
        config.splash.output_file_name = DEFAULT_SPLASH_FILE_NAME.to_string();
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = "info".to_string();
    }
    config
}
