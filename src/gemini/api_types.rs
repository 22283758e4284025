//! Serde types matching the `generateContent` REST API.
//!
//! These are kept separate from the domain types; only the client touches them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGenerateRequest {
  pub contents: Vec<ApiContent>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub generation_config: Option<ApiGenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiContent {
  pub parts: Vec<ApiPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ApiPart {
  Text {
    text: String,
  },
  InlineData {
    #[serde(rename = "inlineData")]
    inline_data: ApiBlob,
  },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBlob {
  pub mime_type: String,
  pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGenerationConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub response_mime_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub response_schema: Option<Value>,
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiGenerateResponse {
  #[serde(default)]
  pub candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCandidate {
  pub content: Option<ApiCandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCandidateContent {
  #[serde(default)]
  pub parts: Vec<ApiResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ApiResponsePart {
  pub text: Option<String>,
}

impl ApiGenerateResponse {
  /// Concatenated text of the first candidate. Empty when the model returned nothing.
  pub fn text(&self) -> String {
    self
      .candidates
      .first()
      .and_then(|c| c.content.as_ref())
      .map(|content| {
        content
          .parts
          .iter()
          .filter_map(|p| p.text.as_deref())
          .collect::<String>()
      })
      .unwrap_or_default()
  }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
  pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
  #[serde(default)]
  pub code: Option<u16>,
  #[serde(default)]
  pub message: String,
  /// Symbolic status such as `RESOURCE_EXHAUSTED`
  #[serde(default)]
  pub status: Option<String>,
}
