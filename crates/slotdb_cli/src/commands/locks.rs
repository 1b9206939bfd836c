//! Lock maintenance.

use slotdb_core::Driver;

use super::{print_json, CommandResult};

/// Runs the unlock-all command.
pub async fn unlock_all(driver: &Driver, format: &str) -> CommandResult {
    let released = driver.unlock_all().await?;
    match format {
        "json" => print_json(&serde_json::json!({ "released": released })),
        _ => {
            println!("Released {released} lock(s)");
            Ok(())
        }
    }
}
