//! List command implementation.

use slotdb_codec::Value;
use slotdb_core::{Driver, ListCondition};

use super::{parse_json, print_json, CommandResult};

/// Runs the list command.
pub async fn run(
    driver: &Driver,
    kind: &str,
    filter: Option<&str>,
    sort: Vec<String>,
    page: u64,
    size: u64,
    format: &str,
) -> CommandResult {
    let filter = match filter {
        Some(text) => parse_json(text)?,
        None => Value::Null,
    };
    let condition = ListCondition::all()
        .filter(filter)
        .sort(sort)
        .page(page, size);
    let collection = driver.list(kind, &condition).await?;

    match format {
        "json" => print_json(&collection.to_json()),
        _ => {
            let meta = collection.meta;
            println!(
                "{} {}-{} of {}",
                kind,
                meta.offset + u64::from(meta.length > 0),
                meta.offset + meta.length,
                meta.total
            );
            for entity in &collection.entities {
                let attributes = Value::Map(entity.attributes.clone()).to_json();
                println!("  {:<34} {}", entity.id, attributes);
            }
            Ok(())
        }
    }
}
