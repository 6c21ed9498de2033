//! Providers Command
//!
//! Probes every configured provider and prints its routing status.

use std::collections::BTreeMap;

use serde_json::json;
use tokio::runtime::Runtime;

use crate::cli::ui::Output;
use crate::cli::util::load_runtime;
use crate::types::Result;

pub fn run(offline: bool, format: &str) -> Result<()> {
    let runtime = load_runtime(offline)?;
    let rt = Runtime::new()?;
    let reachable: BTreeMap<String, bool> = rt.block_on(runtime.manager.test_connections());
    let statuses = runtime.manager.provider_statuses();

    if format == "json" {
        let report = json!({
            "connections": reachable,
            "providers": statuses,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let output = Output::new();
    output.header("Providers");
    for status in &statuses {
        output.provider_status(status, reachable.get(&status.provider).copied());
    }

    let down = reachable.values().filter(|ok| !**ok).count();
    println!();
    if down == 0 {
        output.success(&format!("All {} providers reachable", reachable.len()));
    } else {
        output.warning(&format!("{} of {} providers unreachable", down, reachable.len()));
    }
    Ok(())
}
