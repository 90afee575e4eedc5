use async_trait::async_trait;
use serde_json::{Value, json};

use crate::security::Permission;

use super::traits::{Tool, ToolContext, ToolResult};

/// Response bodies larger than this are truncated.
const MAX_BODY_BYTES: usize = 262_144;

/// Fetches a URL over HTTP(S), subject to the agent's network profile.
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return the response body as text. \
         Only domains allowed by the agent's network profile are reachable."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The http(s) URL to fetch." }
            },
            "required": ["url"]
        })
    }

    fn required_permission(&self) -> Permission {
        Permission::Web
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let raw = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'url'")?;

        let url = url::Url::parse(raw).map_err(|e| format!("invalid URL '{raw}': {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported URL scheme '{}'", url.scheme()));
        }

        let host = url.host_str().ok_or("URL has no host")?;
        if !ctx.sandbox.net.allows_domain(host) {
            return Err(format!("domain '{host}' denied by network profile"));
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| format!("fetch failed: {e}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read response body: {e}"))?;

        let truncated = body.len() > MAX_BODY_BYTES;
        let body = if truncated {
            body.chars().take(MAX_BODY_BYTES).collect()
        } else {
            body
        };

        let meta = json!({ "status": status.as_u16(), "truncated": truncated });
        if status.is_success() {
            Ok(ToolResult::ok(body).with_metadata(meta))
        } else {
            Ok(ToolResult::err(format!("HTTP {status}: {body}")).with_metadata(meta))
        }
    }
}
