use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::{
  ApiBlob, ApiContent, ApiErrorResponse, ApiGenerateRequest, ApiGenerateResponse,
  ApiGenerationConfig, ApiPart,
};
use crate::config::ServiceConfig;
use crate::resilience::CallError;

/// One piece of prompt content
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
  Text(String),
  /// Base64-encoded image bytes
  InlineImage { mime_type: String, data: String },
}

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
  pub model: String,
  pub parts: Vec<Part>,
  pub response_mime_type: Option<String>,
  pub response_schema: Option<Value>,
}

impl CompletionRequest {
  pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
    Self {
      model: model.into(),
      parts: vec![Part::Text(prompt.into())],
      response_mime_type: None,
      response_schema: None,
    }
  }

  /// Ask for a JSON response.
  pub fn json(mut self) -> Self {
    self.response_mime_type = Some("application/json".to_string());
    self
  }

  /// Ask for JSON matching `schema`.
  pub fn with_schema(self, schema: Value) -> Self {
    let mut request = self.json();
    request.response_schema = Some(schema);
    request
  }

  /// The text prompt, concatenated across text parts.
  pub fn prompt(&self) -> String {
    self
      .parts
      .iter()
      .filter_map(|p| match p {
        Part::Text(text) => Some(text.as_str()),
        Part::InlineImage { .. } => None,
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  fn to_api(&self) -> ApiGenerateRequest {
    let parts = self
      .parts
      .iter()
      .map(|part| match part {
        Part::Text(text) => ApiPart::Text { text: text.clone() },
        Part::InlineImage { mime_type, data } => ApiPart::InlineData {
          inline_data: ApiBlob {
            mime_type: mime_type.clone(),
            data: data.clone(),
          },
        },
      })
      .collect();

    let generation_config = if self.response_mime_type.is_some() || self.response_schema.is_some() {
      Some(ApiGenerationConfig {
        response_mime_type: self.response_mime_type.clone(),
        response_schema: self.response_schema.clone(),
      })
    } else {
      None
    };

    ApiGenerateRequest {
      contents: vec![ApiContent { parts }],
      generation_config,
    }
  }
}

/// A text/JSON generation service.
///
/// Returns the raw response text; parsing is left to the caller.
pub trait CompletionService: Send + Sync {
  fn generate<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, Result<String, CallError>>;
}

/// Gemini REST client
#[derive(Clone)]
pub struct GeminiClient {
  http: Client,
  base_url: Url,
  api_key: String,
}

impl GeminiClient {
  pub fn new(config: &ServiceConfig, api_key: String) -> color_eyre::Result<Self> {
    let http = Client::builder()
      .timeout(Duration::from_secs(config.request_timeout_secs))
      .build()
      .map_err(|e| color_eyre::eyre::eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url: config.parsed_base_url()?,
      api_key,
    })
  }

  fn endpoint(&self, model: &str) -> Result<Url, CallError> {
    self
      .base_url
      .join(&format!("v1beta/models/{}:generateContent", model))
      .map_err(|e| CallError::transport(format!("Invalid endpoint for model {}: {}", model, e)))
  }

  async fn generate_content(&self, request: &CompletionRequest) -> Result<String, CallError> {
    let url = self.endpoint(&request.model)?;
    debug!(
      model = %request.model,
      prompt_chars = request.prompt().len(),
      "Sending generateContent request"
    );

    let response = self
      .http
      .post(url)
      .header("x-goog-api-key", &self.api_key)
      .json(&request.to_api())
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          CallError::transport(format!("Request timed out: {}", e))
        } else {
          CallError::transport(format!("HTTP request failed: {}", e))
        }
      })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(error_from_body(status.as_u16(), &body));
    }

    let body: ApiGenerateResponse = response
      .json()
      .await
      .map_err(|e| CallError::malformed(format!("Failed to decode response envelope: {}", e)))?;

    Ok(body.text())
  }
}

/// Build a classified error from a non-2xx response body.
fn error_from_body(status: u16, body: &str) -> CallError {
  match serde_json::from_str::<ApiErrorResponse>(body) {
    Ok(parsed) => {
      let code = parsed.error.code.unwrap_or(status);
      let message = if parsed.error.message.is_empty() {
        format!("HTTP {}", code)
      } else {
        parsed.error.message
      };
      CallError::from_response(status, parsed.error.status.as_deref(), message)
    }
    Err(_) => CallError::from_response(status, None, body.to_string()),
  }
}

impl CompletionService for GeminiClient {
  fn generate<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, Result<String, CallError>> {
    Box::pin(self.generate_content(request))
  }
}

impl std::fmt::Debug for GeminiClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GeminiClient")
      .field("base_url", &self.base_url.as_str())
      .field("api_key", &"[REDACTED]")
      .finish()
  }
}
