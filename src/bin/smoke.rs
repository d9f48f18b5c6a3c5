use std::time::Instant;

use ezflash_lib::app::actions::{
    check_device_connected, ActionSettings, ProcessRunner, ToolRunner,
};
use ezflash_lib::app::adb::locator::{resolve_tool_programs, Tool};
use ezflash_lib::app::adb::parse::{parse_adb_devices, parse_fastboot_devices};
use ezflash_lib::app::adb::runner::RunOptions;
use ezflash_lib::app::commands::check_tools;
use ezflash_lib::app::config::load_config;
use ezflash_lib::app::logging::init_logging;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    json: bool,
    strict: bool,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    adb_program: Option<String>,
    fastboot_program: Option<String>,
    checks: Vec<SmokeCheck>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|warn
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut json = false;
    let mut strict = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            "--strict" => strict = true,
            "-h" | "--help" => {
                return Err("Usage: cargo run --bin smoke -- [--json] [--strict]\n".to_string());
            }
            other => return Err(format!("Unknown arg: {other}")),
        }
    }
    Ok(Args { json, strict })
}

/// `Ok((detail, warn))` passes or warns, `Err` fails.
fn run_check<F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F) -> bool
where
    F: FnOnce() -> Result<(String, bool), String>,
{
    let start = Instant::now();
    let (status, detail, error) = match f() {
        Ok((detail, false)) => ("pass", Some(detail), None),
        Ok((detail, true)) => ("warn", Some(detail), None),
        Err(err) => ("fail", None, Some(err)),
    };
    checks.push(SmokeCheck {
        name,
        status,
        duration_ms: start.elapsed().as_millis(),
        detail,
        error,
    });
    status != "fail"
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    init_logging("warn");
    let trace_id = Uuid::new_v4().to_string();
    let mut checks = Vec::new();
    let mut status = "pass";
    let mut adb_program = None;
    let mut fastboot_program = None;

    let mut config = None;
    if !run_check(&mut checks, "load_config", || {
        let loaded = load_config(&trace_id).map_err(|err| err.to_string())?;
        let detail = format!("tools_dir={}", loaded.tools.tools_dir);
        config = Some(loaded);
        Ok((detail, false))
    }) {
        status = "fail";
    }

    if let Some(mut config) = config {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| ".".into());
        let programs = resolve_tool_programs(&config.tools, &base_dir);
        adb_program = Some(programs.adb.clone());
        fastboot_program = Some(programs.fastboot.clone());

        if !run_check(&mut checks, "check_tools", || {
            let tools = check_tools(Some(trace_id.clone())).map_err(|err| err.to_string())?;
            if !tools.data.adb.available {
                return Err(tools.data.adb.error.unwrap_or_else(|| "adb unavailable".to_string()));
            }
            let fastboot_missing = !tools.data.fastboot.available;
            Ok((
                tools.data.adb.version_output.lines().next().unwrap_or_default().to_string(),
                fastboot_missing,
            ))
        }) {
            status = "fail";
        }

        if args.strict {
            config.device.strict_check = true;
        }
        let settings = ActionSettings::from_config(&config, &base_dir);
        let runner = ProcessRunner::new(programs);

        if !run_check(&mut checks, "device_connected", || {
            let connected = check_device_connected(&runner, &settings, &trace_id)
                .map_err(|err| err.to_string())?;
            if !connected {
                return Err("No devices connected".to_string());
            }
            let listing_options = RunOptions::with_timeout(settings.device_check_timeout);
            let listing_args = ["devices".to_string(), "-l".to_string()];
            let output = match runner.run(Tool::Adb, &listing_args, &listing_options, &trace_id) {
                Ok(output) => output,
                Err(err) => return Ok((format!("listing failed: {}", err.error), true)),
            };
            let serials = parse_adb_devices(&output.stdout)
                .iter()
                .map(|device| format!("{}({})", device.serial, device.state))
                .collect::<Vec<_>>();
            Ok((serials.join(", "), serials.is_empty()))
        }) {
            status = "fail";
        }

        run_check(&mut checks, "fastboot_devices", || {
            let options = RunOptions::with_timeout(settings.device_check_timeout);
            let output = runner
                .run(Tool::Fastboot, &["devices".to_string()], &options, &trace_id)
                .map_err(|err| err.to_string())?;
            let devices = parse_fastboot_devices(&output.stdout);
            Ok((format!("{} in bootloader", devices.len()), false))
        });
        if status == "pass" && checks.iter().any(|check| check.status != "pass") {
            status = "warn";
        }
    }

    let summary = SmokeSummary {
        tool: "ezflash_smoke",
        status,
        trace_id,
        adb_program,
        fastboot_program,
        checks,
    };

    let output = if args.json {
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut lines = vec![
            format!("status: {}", summary.status),
            format!("trace_id: {}", summary.trace_id),
        ];
        for check in &summary.checks {
            let note = check
                .error
                .as_deref()
                .or(check.detail.as_deref())
                .unwrap_or_default();
            lines.push(format!(
                "  {:<18} {:<5} {:>6} ms  {}",
                check.name, check.status, check.duration_ms, note
            ));
        }
        lines.join("\n")
    };

    println!("{output}");
    if summary.status == "fail" {
        std::process::exit(1);
    }
}
