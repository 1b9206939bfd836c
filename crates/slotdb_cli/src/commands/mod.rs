//! CLI command implementations.

pub mod entity;
pub mod kind;
pub mod list;
pub mod locks;

use serde::Serialize;
use slotdb_codec::Value;

/// Boxed error returned by every command.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Parses a JSON argument into a value.
pub fn parse_json(text: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("Invalid JSON argument: {e}"))?;
    Ok(Value::from_json(json))
}

/// Prints `value` as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_arguments() {
        assert_eq!(
            parse_json(r#"{"age": 3}"#).unwrap(),
            Value::map([("age", Value::Integer(3))])
        );
        assert!(parse_json("{age: 3}").is_err());
    }
}
