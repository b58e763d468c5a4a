//! Claude Messages API provider.
//!
//! One HTTP round trip per decision, bounded by a hard client timeout.
//! Every failure mode resolves to a deny verdict; the service never sees
//! an error from this module.

use crate::config::{AnthropicConfig, Schedule};
use crate::gatekeeper::prompt::{build_user_message, FALLBACK_SYSTEM_PROMPT};
use crate::gatekeeper::{parse_verdict, DecisionContext, DecisionProvider, Verdict};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct ClaudeGatekeeper {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    system_prompt: String,
    schedule: Schedule,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ClaudeGatekeeper {
    pub fn new(config: &AnthropicConfig, schedule: Schedule) -> anyhow::Result<Self> {
        let system_prompt = match &config.system_prompt_path {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "System prompt not readable, using strict fallback"
                    );
                    FALLBACK_SYSTEM_PROMPT.to_string()
                }
            },
            None => FALLBACK_SYSTEM_PROMPT.to_string(),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt,
            schedule,
            api_url: API_URL.to_string(),
        })
    }

    /// Point the provider at a different endpoint. For tests.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    async fn call(&self, context: &DecisionContext) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": self.system_prompt,
            "messages": [{
                "role": "user",
                "content": build_user_message(context, &self.schedule),
            }],
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let response = response.error_for_status()?;
        let parsed: MessagesResponse = response.json().await?;

        let mut text = String::new();
        for block in parsed.content {
            if block.kind == "text" {
                text.push_str(&block.text);
            }
        }
        Ok(text)
    }
}

#[async_trait]
impl DecisionProvider for ClaudeGatekeeper {
    async fn decide(&self, context: &DecisionContext) -> Verdict {
        match self.call(context).await {
            Ok(text) => parse_verdict(&text),
            Err(e) => {
                tracing::error!(error = %e, "Reasoning provider call failed");
                Verdict::deny("The gatekeeper could not be reached. Defaulting to deny.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn config(timeout_secs: u64) -> AnthropicConfig {
        AnthropicConfig {
            api_key: "test-key".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 500,
            temperature: 0.2,
            timeout_secs,
            system_prompt_path: None,
        }
    }

    fn context() -> DecisionContext {
        DecisionContext {
            url: "https://reddit.com/r/esp32".to_string(),
            reason: "pinout".to_string(),
            device_name: None,
            device_kind: None,
            room: None,
            request_count_today: 0,
            recent: vec![],
            now: Local::now(),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_denies() {
        // Nothing listens on this port; the connection is refused quickly.
        let gatekeeper = ClaudeGatekeeper::new(&config(2), Schedule::default())
            .unwrap()
            .with_api_url("http://127.0.0.1:1/v1/messages");

        let verdict = gatekeeper.decide(&context()).await;
        assert!(!verdict.approved);
        assert!(verdict.message.contains("deny"));
    }

    #[test]
    fn test_missing_prompt_file_falls_back() {
        let mut cfg = config(5);
        cfg.system_prompt_path = Some("/nonexistent/prompt.txt".into());
        let gatekeeper = ClaudeGatekeeper::new(&cfg, Schedule::default()).unwrap();
        assert_eq!(gatekeeper.system_prompt, FALLBACK_SYSTEM_PROMPT);
    }
}
