//! Kind-level commands.

use slotdb_core::Driver;

use super::{print_json, CommandResult};

/// Runs the resources command.
pub async fn resources(driver: &Driver, format: &str) -> CommandResult {
    let resources = driver.resources().await?;
    match format {
        "json" => print_json(&resources),
        _ => {
            if resources.is_empty() {
                println!("No resources");
            }
            for resource in &resources {
                println!("{resource}");
            }
            Ok(())
        }
    }
}

/// Runs the drop command.
pub async fn drop(driver: &Driver, kind: &str) -> CommandResult {
    driver.drop(kind).await?;
    println!("Dropped {kind}");
    Ok(())
}

/// Runs the usage command.
pub async fn usage(driver: &Driver, kind: &str, format: &str) -> CommandResult {
    let counts = driver.usage(kind).await?;
    match format {
        "json" => print_json(&counts),
        _ => {
            for (title, bucket) in [
                ("where", &counts.where_cols),
                ("order", &counts.order_cols),
                ("filter", &counts.filter),
            ] {
                println!("{title}:");
                for (key, count) in bucket {
                    println!("  {key:<24} {count}");
                }
            }
            println!("indexed first: {:?}", counts.top_columns(driver.config().index_top_k));
            Ok(())
        }
    }
}
