use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use crate::app::adb::locator::{Tool, ToolPrograms};
use crate::app::adb::parse::{is_device_connected, parse_fastboot_devices};
use crate::app::adb::runner::{run_command, split_command, CommandOutput, RunOptions};
use crate::app::config::AppConfig;
use crate::app::dialogs::{Dialogs, NoticeKind, FIRMWARE_PICKER, SPLASH_PICKER};
use crate::app::error::AppError;
use crate::app::models::{ActionKind, ActionOutcome, ActionReport, CommandResult, SuccessPolicy};
use crate::app::outcome::{failure_detail, is_success};
use crate::app::staging::{splash_output_path, stage_splash_image};

pub const NO_DEVICE_MESSAGE: &str = "No devices connected. Please connect a device.";

/// Seam between the action handlers and the child processes they start.
pub trait ToolRunner {
    fn run(
        &self,
        tool: Tool,
        args: &[String],
        options: &RunOptions,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError>;
}

pub struct ProcessRunner {
    programs: ToolPrograms,
}

impl ProcessRunner {
    pub fn new(programs: ToolPrograms) -> Self {
        Self { programs }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(
        &self,
        tool: Tool,
        args: &[String],
        options: &RunOptions,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        run_command(self.programs.program(tool), args, options, trace_id)
    }
}

#[derive(Debug, Clone)]
pub struct ActionSettings {
    pub strict_device_check: bool,
    pub device_check_timeout: Duration,
    pub command_options: RunOptions,
    pub success_policy: SuccessPolicy,
    pub bootloader_wait: Duration,
    pub bootloader_poll_interval: Duration,
    pub splash_output: PathBuf,
}

impl ActionSettings {
    pub fn from_config(config: &AppConfig, base_dir: &Path) -> Self {
        let mut command_options = RunOptions::from_secs(config.command.command_timeout_secs);
        command_options.capture_stdout = config.command.capture_stdout;
        Self {
            strict_device_check: config.device.strict_check,
            device_check_timeout: Duration::from_secs(config.command.device_check_timeout_secs),
            command_options,
            success_policy: config.command.success_policy,
            bootloader_wait: Duration::from_secs(config.device.bootloader_wait_secs),
            bootloader_poll_interval: Duration::from_millis(
                config.device.bootloader_poll_interval_ms,
            ),
            splash_output: splash_output_path(&config.splash, base_dir),
        }
    }
}

pub struct ActionContext<'a, R: ToolRunner, D: Dialogs> {
    pub runner: &'a R,
    pub dialogs: &'a D,
    pub settings: &'a ActionSettings,
    pub trace_id: &'a str,
}

type Step<T> = Result<T, ActionReport>;

impl<R: ToolRunner, D: Dialogs> ActionContext<'_, R, D> {
    fn report(
        &self,
        action: ActionKind,
        outcome: ActionOutcome,
        message: impl Into<String>,
        output: Option<CommandOutput>,
    ) -> ActionReport {
        ActionReport {
            trace_id: self.trace_id.to_string(),
            action,
            outcome,
            message: message.into(),
            result: output.map(CommandResult::from),
            finished_at: Utc::now().to_rfc3339(),
        }
    }

    fn fail(
        &self,
        action: ActionKind,
        outcome: ActionOutcome,
        message: String,
        output: Option<CommandOutput>,
    ) -> ActionReport {
        warn!(
            trace_id = %self.trace_id,
            action = action.label(),
            outcome = ?outcome,
            error = %message,
            "action aborted"
        );
        self.dialogs.notify(NoticeKind::Error, "Error", &message);
        self.report(action, outcome, message, output)
    }

    fn cancelled(&self, action: ActionKind, message: &str) -> ActionReport {
        info!(trace_id = %self.trace_id, action = action.label(), "{message}");
        self.report(action, ActionOutcome::Cancelled, message, None)
    }

    /// Fresh `adb devices` query; nothing is cached between actions.
    pub fn ensure_device(&self, action: ActionKind) -> Step<()> {
        match check_device_connected(self.runner, self.settings, self.trace_id) {
            Ok(true) => Ok(()),
            Ok(false) => Err(self.fail(
                action,
                ActionOutcome::NoDevice,
                NO_DEVICE_MESSAGE.to_string(),
                None,
            )),
            Err(err) => Err(self.fail(
                action,
                ActionOutcome::Failed,
                format!("Failed to query devices: {}", err.error),
                None,
            )),
        }
    }

    fn enter_bootloader(&self, action: ActionKind) -> Step<()> {
        let args = split_command("reboot bootloader");
        let output = self
            .runner
            .run(Tool::Adb, &args, &self.settings.command_options, self.trace_id)
            .map_err(|err| {
                self.fail(
                    action,
                    ActionOutcome::Failed,
                    format!("Failed to reboot into bootloader: {}", err.error),
                    None,
                )
            })?;
        if !is_success(&output, self.settings.success_policy) {
            let message = format!("Failed to reboot into bootloader: {}", failure_detail(&output));
            return Err(self.fail(action, ActionOutcome::Failed, message, Some(output)));
        }
        self.dialogs
            .notify(NoticeKind::Info, "Info", "Device rebooting into bootloader...");

        if self.settings.bootloader_wait.is_zero() {
            return Ok(());
        }
        match wait_for_bootloader(self.runner, self.settings, self.trace_id) {
            Ok(true) => Ok(()),
            Ok(false) => Err(self.fail(
                action,
                ActionOutcome::Failed,
                format!(
                    "Device did not enter bootloader mode within {} s",
                    self.settings.bootloader_wait.as_secs()
                ),
                None,
            )),
            Err(err) => Err(self.fail(
                action,
                ActionOutcome::Failed,
                format!("Failed to query bootloader devices: {}", err.error),
                None,
            )),
        }
    }

    fn execute(
        &self,
        action: ActionKind,
        tool: Tool,
        args: &[String],
        success_message: impl FnOnce(&CommandOutput) -> String,
        failure_prefix: &str,
    ) -> ActionReport {
        info!(
            trace_id = %self.trace_id,
            action = action.label(),
            tool = tool.name(),
            args = ?args,
            "executing"
        );
        let output = match self
            .runner
            .run(tool, args, &self.settings.command_options, self.trace_id)
        {
            Ok(output) => output,
            Err(err) if err.is_cancelled() => return self.cancelled(action, "command cancelled"),
            Err(err) => {
                return self.fail(
                    action,
                    ActionOutcome::Failed,
                    format!("{failure_prefix}: {}", err.error),
                    None,
                )
            }
        };

        if !is_success(&output, self.settings.success_policy) {
            let message = format!("{failure_prefix}: {}", failure_detail(&output));
            return self.fail(action, ActionOutcome::Failed, message, Some(output));
        }

        let message = success_message(&output);
        info!(
            trace_id = %self.trace_id,
            action = action.label(),
            elapsed_ms = output.duration_ms,
            exit_code = ?output.exit_code,
            "action succeeded"
        );
        self.dialogs.notify(NoticeKind::Info, "Success", &message);
        self.report(action, ActionOutcome::Succeeded, message, Some(output))
    }
}

pub fn check_device_connected(
    runner: &impl ToolRunner,
    settings: &ActionSettings,
    trace_id: &str,
) -> Result<bool, AppError> {
    let output = runner.run(
        Tool::Adb,
        &split_command("devices"),
        &RunOptions::with_timeout(settings.device_check_timeout),
        trace_id,
    )?;
    Ok(is_device_connected(&output.stdout, settings.strict_device_check))
}

/// Polls `fastboot devices` until a device shows up or the wait elapses.
pub fn wait_for_bootloader(
    runner: &impl ToolRunner,
    settings: &ActionSettings,
    trace_id: &str,
) -> Result<bool, AppError> {
    let started = Instant::now();
    let args = split_command("devices");
    let options = RunOptions::with_timeout(settings.device_check_timeout);
    loop {
        let output = runner.run(Tool::Fastboot, &args, &options, trace_id)?;
        if !parse_fastboot_devices(&output.stdout).is_empty() {
            info!(
                trace_id = %trace_id,
                waited_ms = started.elapsed().as_millis() as u64,
                "device reached bootloader"
            );
            return Ok(true);
        }
        let elapsed = started.elapsed();
        if elapsed >= settings.bootloader_wait {
            return Ok(false);
        }
        std::thread::sleep(
            settings
                .bootloader_poll_interval
                .min(settings.bootloader_wait - elapsed),
        );
    }
}

fn flash_args(partition: &str, image: &Path) -> Vec<String> {
    vec![
        "flash".to_string(),
        partition.to_string(),
        image.to_string_lossy().to_string(),
    ]
}

fn settle(step: Step<ActionReport>) -> ActionReport {
    step.unwrap_or_else(|report| report)
}

pub fn flash_firmware<R: ToolRunner, D: Dialogs>(ctx: &ActionContext<'_, R, D>) -> ActionReport {
    settle(flash_firmware_steps(ctx))
}

fn flash_firmware_steps<R: ToolRunner, D: Dialogs>(
    ctx: &ActionContext<'_, R, D>,
) -> Step<ActionReport> {
    let action = ActionKind::FlashFirmware;
    ctx.ensure_device(action)?;
    let Some(image) = ctx.dialogs.pick_file(&FIRMWARE_PICKER) else {
        return Err(ctx.cancelled(action, "no firmware image selected"));
    };
    ctx.dialogs.notify(
        NoticeKind::Info,
        "Flashing",
        &format!("Flashing firmware from {}...", image.display()),
    );
    ctx.enter_bootloader(action)?;
    Ok(ctx.execute(
        action,
        Tool::Fastboot,
        &flash_args("system", &image),
        |output| format!("Firmware flashed successfully! ({} ms)", output.duration_ms),
        "Failed to flash firmware",
    ))
}

pub fn create_splash<R: ToolRunner, D: Dialogs>(ctx: &ActionContext<'_, R, D>) -> ActionReport {
    settle(create_splash_steps(ctx))
}

fn create_splash_steps<R: ToolRunner, D: Dialogs>(
    ctx: &ActionContext<'_, R, D>,
) -> Step<ActionReport> {
    let action = ActionKind::CreateSplash;
    ctx.ensure_device(action)?;
    let Some(image) = ctx.dialogs.pick_file(&SPLASH_PICKER) else {
        return Err(ctx.cancelled(action, "no splash image selected"));
    };
    ctx.dialogs.notify(
        NoticeKind::Info,
        "Splash Screen",
        &format!("Creating splash screen from {}...", image.display()),
    );
    let staged = &ctx.settings.splash_output;
    stage_splash_image(&image, staged, ctx.trace_id).map_err(|err| {
        ctx.fail(
            action,
            ActionOutcome::Failed,
            format!("Failed to create splash screen: {}", err.error),
            None,
        )
    })?;
    ctx.enter_bootloader(action)?;
    Ok(ctx.execute(
        action,
        Tool::Fastboot,
        &flash_args("splash", staged),
        |output| format!("Splash screen flashed successfully! ({} ms)", output.duration_ms),
        "Failed to flash splash screen",
    ))
}

/// Splits the free-text command and refuses input that names adb itself.
pub fn validate_custom_command(command: &str, trace_id: &str) -> Result<Vec<String>, AppError> {
    let args = split_command(command);
    let Some(first) = args.first() else {
        return Err(AppError::validation("command is required", trace_id));
    };
    let program = first
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(first.as_str())
        .to_ascii_lowercase();
    if program == "adb" || program == "adb.exe" {
        return Err(AppError::validation(
            "Do not include adb in the command",
            trace_id,
        ));
    }
    Ok(args)
}

pub fn run_custom_command<R: ToolRunner, D: Dialogs>(
    ctx: &ActionContext<'_, R, D>,
    args: &[String],
) -> ActionReport {
    ctx.execute(
        ActionKind::CustomCommand,
        Tool::Adb,
        args,
        |output| {
            format!(
                "Command executed successfully! ({} ms)\nOutput: {}",
                output.duration_ms, output.stdout
            )
        },
        "ADB command failed",
    )
}
