pub mod analytics;
pub mod goals;
pub mod portfolio;
pub mod rebalance;
pub mod risk;
pub mod tax;
pub mod transactions;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse a snake_case enum name the way the JSON bodies spell it,
/// accepting dashes in place of underscores.
pub fn parse_name<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, Box<dyn std::error::Error>> {
    let name = raw.trim().to_lowercase().replace('-', "_");
    serde_json::from_value(Value::String(name)).map_err(|_| format!("Unknown {what}: '{raw}'").into())
}
