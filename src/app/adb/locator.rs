use std::path::{Path, PathBuf};

use crate::app::config::ToolSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Adb,
    Fastboot,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Adb => "adb",
            Tool::Fastboot => "fastboot",
        }
    }

    pub fn version_args(&self) -> Vec<String> {
        match self {
            Tool::Adb => vec!["version".to_string()],
            Tool::Fastboot => vec!["--version".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPrograms {
    pub adb: String,
    pub fastboot: String,
}

impl ToolPrograms {
    pub fn program(&self, tool: Tool) -> &str {
        match tool {
            Tool::Adb => &self.adb,
            Tool::Fastboot => &self.fastboot,
        }
    }
}

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

pub fn executable_file_name(tool: Tool) -> String {
    if cfg!(windows) {
        format!("{}.exe", tool.name())
    } else {
        tool.name().to_string()
    }
}

/// Relative tool directories are resolved against `base_dir`.
pub fn resolve_tools_dir(tools_dir: &str, base_dir: &Path) -> PathBuf {
    let candidate = PathBuf::from(normalize_command_path(tools_dir));
    if candidate.is_absolute() {
        candidate
    } else {
        base_dir.join(candidate)
    }
}

/// Configured path, then the bundled tools directory, then `PATH`.
pub fn resolve_tool_program(configured: &str, tools_dir: &Path, tool: Tool) -> String {
    let normalized = normalize_command_path(configured);
    if !normalized.is_empty() {
        return normalized;
    }
    let bundled = tools_dir.join(executable_file_name(tool));
    if bundled.is_file() {
        return bundled.to_string_lossy().to_string();
    }
    tool.name().to_string()
}

pub fn resolve_tool_programs(settings: &ToolSettings, base_dir: &Path) -> ToolPrograms {
    let tools_dir = resolve_tools_dir(&settings.tools_dir, base_dir);
    ToolPrograms {
        adb: resolve_tool_program(&settings.adb_command_path, &tools_dir, Tool::Adb),
        fastboot: resolve_tool_program(&settings.fastboot_command_path, &tools_dir, Tool::Fastboot),
    }
}

pub fn validate_tool_program(program: &str, tool: Tool) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err(format!("{} command is empty", tool.name()));
    }
    if program == tool.name() {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err(format!("{} path must point to an executable file", tool.name()));
    }
    if !path.exists() {
        return Err(format!(
            "{} executable not found at the configured path",
            tool.name()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn strips_wrapping_double_quotes() {
        assert_eq!(
            normalize_command_path("  \"C:\\Tools\\ADB\\adb.exe\"  "),
            "C:\\Tools\\ADB\\adb.exe"
        );
    }

    #[test]
    fn strips_wrapping_single_quotes() {
        assert_eq!(
            normalize_command_path("  '/opt/android/platform-tools/fastboot'  "),
            "/opt/android/platform-tools/fastboot"
        );
    }

    #[test]
    fn configured_path_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            resolve_tool_program(" '/custom/adb' ", dir.path(), Tool::Adb),
            "/custom/adb"
        );
    }

    #[test]
    fn bundled_tool_is_used_when_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bundled = dir.path().join(executable_file_name(Tool::Fastboot));
        fs::write(&bundled, b"").expect("write");
        assert_eq!(
            resolve_tool_program("", dir.path(), Tool::Fastboot),
            bundled.to_string_lossy()
        );
        assert_eq!(resolve_tool_program("", dir.path(), Tool::Adb), "adb");
    }

    #[test]
    fn relative_tools_dir_is_joined_to_base() {
        let base = Path::new("/work");
        assert_eq!(resolve_tools_dir("ADB", base), PathBuf::from("/work/ADB"));
        assert_eq!(resolve_tools_dir("/opt/tools", base), PathBuf::from("/opt/tools"));
    }

    #[test]
    fn resolves_both_programs_from_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = ToolSettings {
            tools_dir: dir.path().to_string_lossy().to_string(),
            adb_command_path: String::new(),
            fastboot_command_path: "/usr/bin/fastboot".to_string(),
        };
        let programs = resolve_tool_programs(&settings, Path::new("/ignored"));
        assert_eq!(programs.program(Tool::Adb), "adb");
        assert_eq!(programs.program(Tool::Fastboot), "/usr/bin/fastboot");
    }

    #[test]
    fn validates_nonexistent_path() {
        let err = validate_tool_program("/this/path/should/not/exist/adb", Tool::Adb).unwrap_err();
        assert!(err.to_lowercase().contains("not found"));
        assert!(validate_tool_program("fastboot", Tool::Fastboot).is_ok());
        assert!(validate_tool_program("  ", Tool::Adb).is_err());
    }
}
