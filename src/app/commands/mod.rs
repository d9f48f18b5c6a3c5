use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tauri::{AppHandle, Emitter, State};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::actions::{self, ActionContext, ActionSettings, ProcessRunner};
use crate::app::adb::locator::{resolve_tool_programs, validate_tool_program, Tool, ToolPrograms};
use crate::app::adb::runner::{run_command, RunOptions};
use crate::app::config::{load_config, load_config_or_default, AppConfig};
use crate::app::dialogs::{ShutdownAwareDialogs, TauriDialogs};
use crate::app::error::AppError;
use crate::app::models::{
    ActionKind, ActionReport, CommandResponse, TaskInfo, ToolStatus, ToolsInfo,
};
use crate::app::state::AppState;
use crate::app::tasks::BackgroundTasks;


pub const CUSTOM_COMMAND_EVENT: &str = "custom-command-finished";

fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(
            format!("{field} is required"),
            trace_id,
        ));
    }
    Ok(())
}

fn working_dir(trace_id: &str) -> Result<PathBuf, AppError> {
    std::env::current_dir().map_err(|err| {
        AppError::system(format!("Failed to resolve working directory: {err}"), trace_id)
    })
}

struct ActionSetup {
    programs: ToolPrograms,
    settings: ActionSettings,
}

fn load_action_setup(tools: &[Tool], trace_id: &str) -> Result<ActionSetup, AppError> {
    let config = load_config_or_default(trace_id);
    action_setup(&config, &working_dir(trace_id)?, tools, trace_id)
}

fn action_setup(
    config: &AppConfig,
    base_dir: &Path,
    tools: &[Tool],
    trace_id: &str,
) -> Result<ActionSetup, AppError> {
    let programs = resolve_tool_programs(&config.tools, base_dir);
    for tool in tools {
        if let Err(message) = validate_tool_program(programs.program(*tool), *tool) {
            warn!(trace_id = %trace_id, error = %message, "tool validation failed");
            return Err(AppError::dependency(message, trace_id));
        }
    }
    Ok(ActionSetup {
        programs,
        settings: ActionSettings::from_config(config, base_dir),
    })
}

fn tool_status(program: &str, tool: Tool, trace_id: &str) -> ToolStatus {
    if let Err(message) = validate_tool_program(program, tool) {
        return ToolStatus {
            program: program.to_string(),
            available: false,
            version_output: String::new(),
            error: Some(message),
        };
    }

    let options = RunOptions::with_timeout(Duration::from_secs(5));
    let output = match run_command(program, &tool.version_args(), &options, trace_id) {
        Ok(output) => output,
        Err(err) => {
            warn!(
                trace_id = %trace_id,
                tool = tool.name(),
                error = %err.error,
                "tool check failed"
            );
            return ToolStatus {
                program: program.to_string(),
                available: false,
                version_output: String::new(),
                error: Some(err.error),
            };
        }
    };

    let mut version_output = output.stdout.trim().to_string();
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        if !version_output.is_empty() {
            version_output.push('\n');
        }
        version_output.push_str(stderr);
    }

    let available = output.exit_code == Some(0);
    ToolStatus {
        program: program.to_string(),
        available,
        version_output,
        error: if available {
            None
        } else if stderr.is_empty() {
            Some(format!("{} returned a non-zero exit code", tool.name()))
        } else {
            Some(stderr.to_string())
        },
    }
}

/// Validates and registers a custom command worker under `trace_id`.
fn spawn_custom_command_inner(
    tasks: &BackgroundTasks,
    command: &str,
    trace_id: &str,
    work: impl FnOnce(Vec<String>, Arc<AtomicBool>) + Send + 'static,
) -> Result<(), AppError> {
    ensure_non_empty(command, "command", trace_id)?;
    let args = actions::validate_custom_command(command, trace_id)?;
    tasks.spawn(
        trace_id,
        ActionKind::CustomCommand.label(),
        move |cancel_flag| work(args, cancel_flag),
        trace_id,
    )
}

#[tauri::command(async)]
pub fn get_config(trace_id: Option<String>) -> Result<CommandResponse<AppConfig>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let config = load_config(&trace_id)?;
    Ok(CommandResponse {
        trace_id,
        data: config,
    })
}

#[tauri::command(async)]
pub fn check_tools(trace_id: Option<String>) -> Result<CommandResponse<ToolsInfo>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "check_tools");

    let config = load_config_or_default(&trace_id);
    let programs = resolve_tool_programs(&config.tools, &working_dir(&trace_id)?);
    Ok(CommandResponse {
        data: ToolsInfo {
            adb: tool_status(&programs.adb, Tool::Adb, &trace_id),
            fastboot: tool_status(&programs.fastboot, Tool::Fastboot, &trace_id),
        },
        trace_id,
    })
}

#[tauri::command(async)]
pub fn check_device(
    app: AppHandle,
    trace_id: Option<String>,
) -> Result<CommandResponse<bool>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "check_device");

    let setup = load_action_setup(&[Tool::Adb], &trace_id)?;
    let runner = ProcessRunner::new(setup.programs);
    let dialogs = TauriDialogs::new(app);
    let ctx = ActionContext {
        runner: &runner,
        dialogs: &dialogs,
        settings: &setup.settings,
        trace_id: &trace_id,
    };
    let connected = ctx.ensure_device(ActionKind::CustomCommand).is_ok();
    Ok(CommandResponse {
        trace_id,
        data: connected,
    })
}

#[tauri::command(async)]
pub fn flash_firmware(
    app: AppHandle,
    trace_id: Option<String>,
) -> Result<CommandResponse<ActionReport>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "flash_firmware");

    let setup = load_action_setup(&[Tool::Adb, Tool::Fastboot], &trace_id)?;
    let runner = ProcessRunner::new(setup.programs);
    let dialogs = TauriDialogs::new(app);
    let ctx = ActionContext {
        runner: &runner,
        dialogs: &dialogs,
        settings: &setup.settings,
        trace_id: &trace_id,
    };
    let report = actions::flash_firmware(&ctx);
    Ok(CommandResponse {
        trace_id,
        data: report,
    })
}

#[tauri::command(async)]
pub fn create_splash(
    app: AppHandle,
    trace_id: Option<String>,
) -> Result<CommandResponse<ActionReport>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "create_splash");

    let setup = load_action_setup(&[Tool::Adb, Tool::Fastboot], &trace_id)?;
    let runner = ProcessRunner::new(setup.programs);
    let dialogs = TauriDialogs::new(app);
    let ctx = ActionContext {
        runner: &runner,
        dialogs: &dialogs,
        settings: &setup.settings,
        trace_id: &trace_id,
    };
    let report = actions::create_splash(&ctx);
    Ok(CommandResponse {
        trace_id,
        data: report,
    })
}

/// Starts the command on a supervised worker and returns its task id right
/// away. The result arrives as a dialog plus a `custom-command-finished` event.
#[tauri::command(async)]
pub fn run_custom_command(
    app: AppHandle,
    command: String,
    state: State<'_, AppState>,
    trace_id: Option<String>,
) -> Result<CommandResponse<String>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "run_custom_command");

    let setup = load_action_setup(&[Tool::Adb], &trace_id)?;
    let worker_trace = trace_id.clone();
    let shutting_down = state.tasks.shutdown_signal();
    spawn_custom_command_inner(&state.tasks, &command, &trace_id, move |args, cancel_flag| {
        let mut settings = setup.settings;
        settings.command_options.cancel_flag = Some(cancel_flag);
        let runner = ProcessRunner::new(setup.programs);
        let dialogs = ShutdownAwareDialogs::new(TauriDialogs::new(app.clone()), shutting_down);
        let ctx = ActionContext {
            runner: &runner,
            dialogs: &dialogs,
            settings: &settings,
            trace_id: &worker_trace,
        };
        let report = actions::run_custom_command(&ctx, &args);
        if let Err(err) = app.emit(CUSTOM_COMMAND_EVENT, &report) {
            warn!(trace_id = %worker_trace, error = %err, "failed to emit custom command result");
        }
    })?;

    Ok(CommandResponse {
        data: trace_id.clone(),
        trace_id,
    })
}

#[tauri::command(async)]
pub fn list_background_tasks(
    state: State<'_, AppState>,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<TaskInfo>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    Ok(CommandResponse {
        trace_id,
        data: state.tasks.running(),
    })
}

#[tauri::command(async)]
pub fn cancel_background_task(
    task_id: String,
    state: State<'_, AppState>,
    trace_id: Option<String>,
) -> Result<CommandResponse<bool>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_non_empty(&task_id, "task_id", &trace_id)?;
    let cancelled = state.tasks.cancel(task_id.trim());
    info!(trace_id = %trace_id, task_id = %task_id, cancelled, "cancel_background_task");
    Ok(CommandResponse {
        trace_id,
        data: cancelled,
    })
}
