//! Single entity commands.

use slotdb_core::{Driver, Entity};

use super::{parse_json, print_json, CommandResult};

fn print_entity(entity: &Entity, format: &str) -> CommandResult {
    match format {
        "json" => print_json(&entity.to_json()),
        _ => {
            println!("{} {} (#{}, updated {})", entity.kind, entity.id, entity.num, entity.at);
            for (name, value) in &entity.attributes {
                println!("  {:<20} {}", name, value.to_json());
            }
            Ok(())
        }
    }
}

/// Runs the one command.
pub async fn one(driver: &Driver, kind: &str, id: &str, format: &str) -> CommandResult {
    match driver.one(kind, id).await? {
        Some(entity) => print_entity(&entity, format),
        None => Err(format!("No {kind} with id {id}").into()),
    }
}

/// Runs the create command.
pub async fn create(driver: &Driver, kind: &str, attributes: &str, format: &str) -> CommandResult {
    let attributes = parse_json(attributes)?;
    let entity = driver.create(kind, &attributes).await?;
    print_entity(&entity, format)
}

/// Runs the update command.
pub async fn update(
    driver: &Driver,
    kind: &str,
    id: &str,
    attributes: &str,
    format: &str,
) -> CommandResult {
    let attributes = parse_json(attributes)?;
    let entity = driver.update(kind, id, &attributes).await?;
    print_entity(&entity, format)
}

/// Runs the destroy command.
pub async fn destroy(driver: &Driver, kind: &str, id: &str, format: &str) -> CommandResult {
    let removed = driver.destroy(kind, id).await?;
    match format {
        "json" => print_json(&serde_json::json!({ "removed": removed })),
        _ => {
            println!("Removed {removed} entity(ies)");
            Ok(())
        }
    }
}
