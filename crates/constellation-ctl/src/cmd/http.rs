//! Shared HTTP request helpers for CLI commands.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Operator endpoints.
pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

/// Peer protocol endpoints.
pub fn node_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    failed_nodes: Vec<String>,
}

async fn read_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => {
                let code = body.code.map(|c| format!(" [{}]", c)).unwrap_or_default();
                if body.failed_nodes.is_empty() {
                    bail!("{}{}: {}", status, code, body.error);
                }
                bail!(
                    "{}{}: {} (failed nodes: {})",
                    status,
                    code,
                    body.error,
                    body.failed_nodes.join(", ")
                );
            }
            Err(_) => bail!("{}: {}", status, text),
        }
    }
    response.json::<T>().await.context("failed to parse response")
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to constellationd at {}, is it running?", url))?;
    read_json(response).await
}

pub async fn post_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    let response = reqwest::Client::new()
        .post(url)
        .send()
        .await
        .with_context(|| format!("failed to connect to constellationd at {}, is it running?", url))?;
    read_json(response).await
}

pub async fn post_json_body<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    let response = reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("failed to connect to constellationd at {}, is it running?", url))?;
    read_json(response).await
}
