pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Result fields that hold the main row set of a response, in lookup order.
pub const SERIES_KEYS: [&str; 6] = [
    "efficient_frontier",
    "simulation_results",
    "backtest_results",
    "opportunities",
    "trades",
    "drifts",
];

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The first row set found in a response's `result`, if any.
pub fn primary_series(value: &Value) -> Option<&Vec<Value>> {
    let result = value.get("result").unwrap_or(value);
    SERIES_KEYS
        .iter()
        .find_map(|k| {
            result
                .get(*k)
                .and_then(Value::as_array)
                .filter(|rows| !rows.is_empty())
        })
}
