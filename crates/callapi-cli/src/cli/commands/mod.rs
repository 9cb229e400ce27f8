//! CLI command handlers.

mod config;
mod get;
mod send;

use anyhow::{bail, Context, Result};
use std::collections::HashMap;

pub use config::run_config;
pub use get::run_get;
pub use send::{run_send, SendArgs};

/// Parse repeated `-H "Name: value"` arguments.
pub(crate) fn parse_header_args(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut headers = HashMap::new();
    for h in raw {
        let Some((name, value)) = h.split_once(':') else {
            bail!("header {:?} is not in \"Name: value\" form", h);
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("header {:?} has an empty name", h);
        }
        headers.insert(name.to_string(), value.trim().to_string());
    }
    Ok(headers)
}

/// Request body from `-d`: literal text, or file contents for "@path".
pub(crate) fn read_body(data: Option<&str>) -> Result<Vec<u8>> {
    match data {
        None => Ok(Vec::new()),
        Some(d) => match d.strip_prefix('@') {
            Some(path) => std::fs::read(path).with_context(|| format!("reading body from {}", path)),
            None => Ok(d.as_bytes().to_vec()),
        },
    }
}
