use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use clausematch_core::config::LlmSettings;
use clausematch_core::error::{Error, Result};
use clausematch_core::traits::Adjudicator;
use clausematch_core::types::{AdjudicationRequest, Verdict};

use crate::parse::parse_verdicts;
use crate::prompt::{build_user_prompt, SYSTEM_PROMPT};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// 408, 429 and 5xx may succeed on retry; every other failure status will not.
pub fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

pub struct LlmAdjudicator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_excerpt_chars: usize,
    timeout: Duration,
}

impl LlmAdjudicator {
    /// `timeout` bounds one HTTP exchange; the runner applies its own
    /// per-call timeout on top.
    pub fn from_settings(settings: &LlmSettings, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Operation(format!("http client: {e}")))?;
        let api_key = std::env::var(&settings.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(env = %settings.api_key_env, "LLM API key not set; sending unauthenticated requests");
        }
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_excerpt_chars: settings.max_excerpt_chars,
            timeout,
        })
    }

    fn send_error(&self, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::AdjudicationTimeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            Error::adjudication(format!("request failed: {e}"), true)
        }
    }
}

#[async_trait]
impl Adjudicator for LlmAdjudicator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn adjudicate(&self, request: &AdjudicationRequest) -> Result<Vec<Verdict>> {
        let prompt = build_user_prompt(request, self.max_excerpt_chars);
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: &prompt },
            ],
            response_format: ResponseFormat { kind: "json_object" },
        };

        tracing::debug!(clause_id = %request.clause_id, candidates = request.candidates.len(), "requesting adjudication");
        let mut call = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let response = call.send().await.map_err(|e| self.send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::adjudication(
                format!("LLM API error {}: {}", status.as_u16(), text),
                is_transient_status(status.as_u16()),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::adjudication(format!("unreadable completion: {e}"), true))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::adjudication("completion without content", true))?;
        let verdicts = parse_verdicts(&content)?;
        tracing::debug!(
            clause_id = %request.clause_id,
            matches = verdicts.iter().filter(|v| v.is_match).count(),
            "adjudication reply parsed"
        );
        Ok(verdicts)
    }
}
