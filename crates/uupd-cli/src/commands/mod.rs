pub mod hardware;
pub mod query;
pub mod update;

use console::Style;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_ALREADY_RUNNING: u8 = 2;
pub const EXIT_PREFLIGHT: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn mark_ok(msg: &str) -> String {
    format!("{} {msg}", Style::new().green().apply_to("✓"))
}

pub fn mark_fail(msg: &str) -> String {
    format!("{} {msg}", Style::new().red().bold().apply_to("✗"))
}

pub fn mark_warn(msg: &str) -> String {
    format!("{} {msg}", Style::new().yellow().apply_to("⚠"))
}
