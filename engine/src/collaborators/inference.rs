//! Inference over an OpenAI-compatible chat-completions endpoint.
//!
//! Sends the system prompt plus one user message holding the context text
//! and the annotated frame as a `data:` URL. Reads back
//! `choices[0].message.content` and `usage`.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{Inference, InferenceRequest, InferenceResponse};
use crate::config::InferenceConfig;

pub struct OpenAiInference {
    client: reqwest::Client,
    config: InferenceConfig,
}

impl OpenAiInference {
    pub fn new(config: InferenceConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn payload(&self, request: &InferenceRequest) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": self.config.system_prompt},
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": request.context.trim()},
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": format!("data:image/png;base64,{}", request.image_b64)
                            }
                        }
                    ]
                }
            ],
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
            "max_tokens": self.config.max_tokens,
        })
    }

    async fn post(&self, payload: &Value) -> Result<Value, String> {
        let mut builder = self.client.post(&self.config.url).json(payload);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("inference endpoint returned {status}: {}", body.trim()));
        }
        response.json::<Value>().await.map_err(|e| e.to_string())
    }
}

/// Pull the completion text and usage out of a chat-completions body.
fn decode_completion(body: &Value) -> InferenceResponse {
    match body["choices"][0]["message"]["content"].as_str() {
        Some(text) => {
            let usage = body.get("usage").cloned().unwrap_or_else(|| json!({}));
            InferenceResponse::completed(text, usage)
        }
        None => {
            let reason = body["error"]["message"]
                .as_str()
                .unwrap_or("response has no choices[0].message.content");
            InferenceResponse::failed(reason)
        }
    }
}

#[async_trait]
impl Inference for OpenAiInference {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn infer(&self, request: InferenceRequest) -> InferenceResponse {
        let payload = self.payload(&request);
        match self.post(&payload).await {
            Ok(body) => {
                let response = decode_completion(&body);
                debug!(
                    chars = response.text.len(),
                    success = response.success,
                    "inference completed"
                );
                response
            }
            Err(e) => {
                warn!(error = %e, url = %self.config.url, "inference request failed");
                InferenceResponse::failed(e)
            }
        }
    }
}
