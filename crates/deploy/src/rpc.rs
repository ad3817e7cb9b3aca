//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// Default timeout for a single RPC request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    // A missing result is a legitimate `null` (e.g. a receipt that is not mined yet).
    let result_value = result.get("result").cloned().unwrap_or(Value::Null);

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_u64(s: &str) -> Result<u64, anyhow::Error> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity: {}", s))
}

/// Parse a `0x`-prefixed hex quantity that may exceed 64 bits (gas prices).
pub fn parse_hex_u128(s: &str) -> Result<u128, anyhow::Error> {
    u128::from_str_radix(s.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity: {}", s))
}

/// Deserialize a u64 from a hex string (with 0x prefix).
pub fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

/// Poll `check_fn` until it yields a value.
///
/// # Arguments
/// * `name` - What is being waited for (for logs and error messages)
/// * `interval` - Delay between two checks
/// * `timeout` - Maximum time to wait, `None` to wait forever
/// * `check_fn` - Returns `Ok(Some(_))` when done, `Ok(None)` to keep waiting
///
/// Errors from `check_fn` are returned immediately.
pub async fn poll_until<T, F, Fut>(
    name: &str,
    interval: Duration,
    timeout: Option<Duration>,
    check_fn: F,
) -> Result<T, anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = std::time::Instant::now();

    loop {
        if let Some(value) = check_fn().await? {
            return Ok(value);
        }

        if let Some(max_duration) = timeout.filter(|max| start.elapsed() > *max) {
            anyhow::bail!(
                "Timeout waiting for {} after {}s",
                name,
                max_duration.as_secs()
            );
        }

        tracing::trace!(waiting_for = %name, "Not ready yet, polling again...");
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_parse_hex_quantities() {
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u64("0x7a69").unwrap(), 31337);
        assert_eq!(parse_hex_u128("0x3b9aca00").unwrap(), 1_000_000_000);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn test_deserialize_u64_from_hex() {
        #[derive(Deserialize)]
        struct Block {
            #[serde(deserialize_with = "deserialize_u64_from_hex")]
            number: u64,
        }

        let block: Block = serde_json::from_str(r#"{ "number": "0x10" }"#).unwrap();
        assert_eq!(block.number, 16);
    }

    #[tokio::test]
    async fn test_poll_until_returns_first_value() {
        let calls = AtomicU32::new(0);
        let value = poll_until("counter", Duration::from_millis(1), None, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>((n >= 2).then_some(n))
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let err = poll_until::<(), _, _>(
            "nothing",
            Duration::from_millis(1),
            Some(Duration::from_millis(5)),
            || async { Ok::<_, anyhow::Error>(None) },
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("Timeout waiting for nothing"));
    }

    #[tokio::test]
    async fn test_poll_until_propagates_errors() {
        let err = poll_until::<(), _, _>("broken", Duration::from_millis(1), None, || async {
            Err::<Option<()>, _>(anyhow::anyhow!("node unreachable"))
        })
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "node unreachable");
    }
}
