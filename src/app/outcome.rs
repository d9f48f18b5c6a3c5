use crate::app::adb::runner::CommandOutput;
use crate::app::models::SuccessPolicy;

pub fn is_success(output: &CommandOutput, policy: SuccessPolicy) -> bool {
    match policy {
        SuccessPolicy::ExitCode => output.exit_code == Some(0),
        SuccessPolicy::StderrEmpty => output.stderr.is_empty(),
    }
}

pub fn failure_detail(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match output.exit_code {
        Some(code) => format!("exit code {code}"),
        None => "terminated without an exit code".to_string(),
    }
}
