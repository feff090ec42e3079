use super::{json_pretty, EXIT_SUCCESS};
use crate::host::SelectedHost;
use std::sync::Arc;
use uupd_core::{Orchestrator, RunOptions};

pub fn update_check(options: RunOptions, host: &SelectedHost, json_output: bool) -> Result<u8, String> {
    let available = Orchestrator::new(options, Arc::clone(&host.host))
        .check_system_update()
        .map_err(|e| e.to_string())?;
    if json_output {
        let json = serde_json::json!({ "update_available": available });
        println!("{}", json_pretty(&json)?);
    } else if available {
        println!("System update available");
    } else {
        println!("No system update available");
    }
    Ok(EXIT_SUCCESS)
}

pub fn image_outdated(options: RunOptions, host: &SelectedHost, json_output: bool) -> Result<u8, String> {
    let outdated = Orchestrator::new(options, Arc::clone(&host.host))
        .image_outdated()
        .map_err(|e| e.to_string())?;
    if json_output {
        let json = serde_json::json!({ "outdated": outdated });
        println!("{}", json_pretty(&json)?);
    } else if outdated {
        println!("The booted image is more than a month old");
    } else {
        println!("The booted image is up to date");
    }
    Ok(EXIT_SUCCESS)
}
