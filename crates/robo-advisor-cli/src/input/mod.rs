pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Typed request body from `--input <file>`, else piped stdin.
pub fn read_request<T: DeserializeOwned>(
    path: &Option<String>,
    what: &str,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return Ok(Some(file::read_json(path)?));
    }
    match stdin::read_stdin()? {
        Some(data) => serde_json::from_value(data)
            .map(Some)
            .map_err(|e| format!("Invalid {what} request: {e}").into()),
        None => Ok(None),
    }
}
