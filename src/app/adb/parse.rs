use std::sync::OnceLock;

use regex::Regex;

use crate::app::models::DeviceSummary;

pub const DEVICE_MARKER: &str = "device";

/// Substring match on the raw `adb devices` output. The listing header
/// "List of devices attached" contains the marker too, so this reports a
/// device even when none is attached.
pub fn contains_device_marker(output: &str) -> bool {
    output.contains(DEVICE_MARKER)
}

pub fn is_device_connected(output: &str, strict: bool) -> bool {
    if strict {
        parse_adb_devices(output)
            .iter()
            .any(|summary| summary.state == "device")
    } else {
        contains_device_marker(output)
    }
}

pub fn parse_adb_devices(output: &str) -> Vec<DeviceSummary> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            let mut model = None;
            let mut product = None;
            for token in tokens.iter().skip(2) {
                if let Some(value) = token.strip_prefix("model:") {
                    model = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("product:") {
                    product = Some(value.to_string());
                }
            }
            Some(DeviceSummary {
                serial: tokens[0].to_string(),
                state: tokens[1].to_string(),
                model,
                product,
            })
        })
        .collect()
}

fn fastboot_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<serial>\S+)\s+(?P<state>fastboot|fastbootd|bootloader)\s*$")
            .expect("fastboot devices regex should compile")
    })
}

/// Parses `fastboot devices` output, e.g. `a1b2c3d4\tfastboot`.
pub fn parse_fastboot_devices(output: &str) -> Vec<DeviceSummary> {
    output
        .lines()
        .filter_map(|line| fastboot_line_regex().captures(line.trim()))
        .map(|caps| DeviceSummary {
            serial: caps["serial"].to_string(),
            state: caps["state"].to_string(),
            model: None,
            product: None,
        })
        .collect()
}
