//! `callapi get <URL>` – blocking GET through the retrying client.

use anyhow::{bail, Result};
use callapi_core::config::CallConfig;
use callapi_core::{CallFactory, Client, Outcome};

use super::parse_header_args;

pub async fn run_get(cfg: &CallConfig, url: &str, raw_headers: &[String]) -> Result<()> {
    let headers = parse_header_args(raw_headers)?;
    let client = Client::new(CallFactory::from_config(cfg));
    let resp = client.get(url, headers).await;

    match resp.outcome() {
        Outcome::Success => {
            print!("{}", resp.text());
            Ok(())
        }
        Outcome::HttpFailure(status) => {
            print!("{}", resp.text());
            bail!("GET {} returned HTTP {}", url, status)
        }
        Outcome::TransportFailure(reason) => bail!("GET {} failed: {}", url, reason),
    }
}
