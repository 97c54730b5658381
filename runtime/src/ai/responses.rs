use anyhow::Context;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 5;

/// Minimal client for the OpenAI Responses and Embeddings endpoints.
pub struct ResponsesClient {
    http: Client,
    api_key: String,
    base: String,
}

/// Reasoning knobs forwarded to the Responses API.
#[derive(Clone, Debug, Default)]
pub struct ResponseOptions {
    pub reasoning_effort: Option<String>,
    pub service_tier: Option<String>,
    pub background: bool,
}

pub fn input_text(text: &str) -> Value {
    json!({ "type": "input_text", "text": text })
}

pub fn input_file(file_id: &str) -> Value {
    json!({ "type": "input_file", "file_id": file_id })
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl ResponsesClient {
    pub fn new(api_key: String, base: Option<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(600))
            .build()
            .expect("client");
        Self {
            http,
            api_key,
            base: base.unwrap_or_else(|| "https://api.openai.com".into()),
        }
    }

    fn extract_structured_output<T: DeserializeOwned>(root: &Value) -> Option<T> {
        for key in ["output_parsed", "output_text"] {
            if let Some(parsed) = root.get(key).and_then(Self::parse_candidate::<T>) {
                return Some(parsed);
            }
        }

        let items = root.get("output").and_then(Value::as_array)?;
        for item in items {
            for key in ["parsed", "text"] {
                if let Some(parsed) = item.get(key).and_then(Self::parse_candidate::<T>) {
                    return Some(parsed);
                }
            }

            let Some(blocks) = item.get("content").and_then(Value::as_array) else {
                continue;
            };
            for block in blocks {
                for key in ["parsed", "text"] {
                    if let Some(parsed) = block.get(key).and_then(Self::parse_candidate::<T>) {
                        return Some(parsed);
                    }
                }
            }
        }
        None
    }

    fn parse_candidate<T: DeserializeOwned>(value: &Value) -> Option<T> {
        match value {
            Value::String(s) => serde_json::from_str::<T>(s).ok(),
            Value::Array(items) => items.iter().find_map(Self::parse_candidate::<T>),
            _ => serde_json::from_value(value.clone()).ok(),
        }
    }

    async fn poll_oai_response(&self, raw_response: Value, path: &str) -> anyhow::Result<Value> {
        if raw_response.get("status").and_then(Value::as_str) == Some("completed") {
            return Ok(raw_response);
        }
        let Some(id) = raw_response.get("id").and_then(Value::as_str) else {
            anyhow::bail!("OpenAI response carried no id to poll");
        };

        loop {
            let res = self
                .http
                .get(format!("{}/v1{}/{id}", self.base, path))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|err| anyhow::anyhow!("Network error | {err}"))?;

            if !res.status().is_success() {
                let err_txt = res.text().await.unwrap_or_default();
                anyhow::bail!("{}", err_txt);
            }

            let v: Value = res
                .json()
                .await
                .with_context(|| format!("Error getting OpenAI response with id: {id}"))?;
            match v.get("status").and_then(Value::as_str) {
                Some("completed") => return Ok(v),
                Some(status @ ("failed" | "cancelled" | "incomplete")) => {
                    let detail = v
                        .get("error")
                        .and_then(|e| e.get("message"))
                        .or_else(|| v.get("last_error").and_then(|e| e.get("message")))
                        .and_then(Value::as_str);
                    match detail {
                        Some(detail) => {
                            anyhow::bail!("OpenAI background response {status} | {detail}")
                        }
                        None => anyhow::bail!("OpenAI background response {status}"),
                    }
                }
                _ => debug!(response_id = %id, "response still in progress"),
            }
            sleep(Duration::from_secs(2)).await;
        }
    }

    async fn post_json(&self, path: &str, body: &Value) -> reqwest::Result<Response> {
        self.http
            .post(format!("{}/v1{}", self.base, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
    }

    /// POSTs `body`, retrying 429 and 5xx with exponential backoff plus jitter.
    async fn post_with_retry(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let mut delay = Duration::from_millis(300);
        for attempt in 0..MAX_ATTEMPTS {
            let resp = self
                .post_json(path, body)
                .await
                .with_context(|| format!("Network error calling OpenAI {path}"))?;
            let status = resp.status();
            if status.is_success() {
                return resp
                    .json()
                    .await
                    .with_context(|| format!("Error decoding OpenAI {path} response"));
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt + 1 < MAX_ATTEMPTS {
                warn!(%status, attempt, path, "OpenAI request throttled, retrying");
                sleep(delay).await;
                delay = Duration::from_millis((delay.as_millis() as f64 * 1.8) as u64)
                    + Duration::from_millis(fastrand::u64(0..250));
                continue;
            }

            let err_txt = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI error {}: {}", status, err_txt);
        }
        anyhow::bail!("Retries exhausted")
    }

    /// Structured output call: `content` is the user message's content
    /// blocks (see [`input_text`] and [`input_file`]).
    pub async fn responses_structured<T: DeserializeOwned>(
        &self,
        model: &str,
        instructions: &str,
        content: Vec<Value>,
        schema_name: &str,
        schema: Value,
        options: &ResponseOptions,
    ) -> anyhow::Result<T> {
        let mut body = json!({
            "model": model,
            "instructions": instructions,
            "input": [{ "role": "user", "content": content }],
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": schema_name,
                    "strict": true,
                    "schema": schema
                }
            },
            "background": options.background,
        });
        if let Some(effort) = &options.reasoning_effort {
            body["reasoning"] = json!({ "effort": effort });
        }
        if let Some(tier) = &options.service_tier {
            body["service_tier"] = json!(tier);
        }

        let mut v = self
            .post_with_retry("/responses", &body)
            .await
            .context("Error from OpenAI responses api")?;
        if options.background {
            v = self
                .poll_oai_response(v, "/responses")
                .await
                .context("Error polling OpenAI responses api")?;
        }

        Self::extract_structured_output(&v)
            .ok_or_else(|| anyhow::anyhow!("Structured output not found in response"))
    }

    /// One embedding per input, in input order.
    pub async fn embeddings(&self, model: &str, inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({ "model": model, "input": inputs });
        let v = self
            .post_with_retry("/embeddings", &body)
            .await
            .context("Error from OpenAI embeddings api")?;
        let mut parsed: EmbeddingsResponse =
            serde_json::from_value(v).context("Malformed OpenAI embeddings response")?;
        parsed.data.sort_by_key(|item| item.index);

        if parsed.data.len() != inputs.len() {
            anyhow::bail!(
                "OpenAI returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            );
        }
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Answer {
        value: u32,
    }

    #[test]
    fn structured_output_found_in_content_blocks() {
        let root = json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                { "type": "message", "content": [{ "type": "output_text", "text": "{\"value\": 7}" }] }
            ]
        });
        let parsed: Option<Answer> = ResponsesClient::extract_structured_output(&root);
        assert_eq!(parsed, Some(Answer { value: 7 }));
    }

    #[test]
    fn structured_output_prefers_output_text() {
        let root = json!({ "output_text": "{\"value\": 1}", "output": [] });
        let parsed: Option<Answer> = ResponsesClient::extract_structured_output(&root);
        assert_eq!(parsed, Some(Answer { value: 1 }));
    }

    #[test]
    fn missing_structured_output_is_none() {
        let root = json!({ "output": [{ "content": [{ "text": "not json" }] }] });
        let parsed: Option<Answer> = ResponsesClient::extract_structured_output(&root);
        assert!(parsed.is_none());
    }
}
