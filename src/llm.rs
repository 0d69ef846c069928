use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::RelayError;
use crate::session::{Role, Turn};

/// A generative-language backend: full transcript in, reply text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, transcript: &[Turn]) -> Result<String, RelayError>;
}

/// Client for the Gemini `generateContent` API
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    error: Option<ApiError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: &ModelConfig, api_key: &str) -> Result<Self, RelayError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

fn to_contents(transcript: &[Turn]) -> Vec<Content> {
    transcript
        .iter()
        .map(|turn| Content {
            role: match turn.role {
                Role::User => "user".to_string(),
                Role::Assistant => "model".to_string(),
            },
            parts: vec![Part {
                text: turn.text.clone(),
            }],
        })
        .collect()
}

/// Pull the reply text out of a successful response body.
fn extract_text(response: GenerateContentResponse) -> Result<(String, UsageMetadata), RelayError> {
    if let Some(err) = response.error {
        return Err(RelayError::Upstream(
            err.message.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    let candidate = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| RelayError::Upstream("no candidates in response".to_string()))?;

    debug!(finish_reason = ?candidate.finish_reason, "candidate received");

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    Ok((text, response.usage_metadata.unwrap_or_default()))
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, transcript: &[Turn]) -> Result<String, RelayError> {
        let request = GenerateContentRequest {
            contents: to_contents(transcript),
        };

        info!(
            model = %self.model,
            turns = transcript.len(),
            "sending Gemini request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayError::Upstream(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Upstream(e.to_string()))?;

        if !status.is_success() {
            if let Ok(ErrorResponse {
                error: Some(ApiError { message: Some(msg) }),
            }) = serde_json::from_str::<ErrorResponse>(&body)
            {
                return Err(RelayError::Upstream(format!("{}: {}", status, msg)));
            }
            return Err(RelayError::Upstream(format!("{}: {}", status, body)));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| RelayError::Upstream(format!("invalid response body: {}", e)))?;
        let (text, usage) = extract_text(parsed)?;

        info!(
            model = %self.model,
            input_tokens = usage.prompt_token_count,
            output_tokens = usage.candidates_token_count,
            "Gemini response received"
        );

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ModelConfig {
        ModelConfig {
            base_url: "https://api.example.com/".to_string(),
            model: "gemini-test".to_string(),
            request_timeout_secs: Some(5),
        }
    }

    #[test]
    fn test_client_new() {
        let client = GeminiClient::new(&test_config(), "test-key").unwrap();
        assert_eq!(client.base_url, "https://api.example.com");
        assert_eq!(client.api_key, "test-key");
        assert_eq!(
            client.endpoint(),
            "https://api.example.com/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn test_endpoint_strips_models_prefix() {
        let mut config = test_config();
        config.model = "models/gemini-2.0-flash".to_string();
        let client = GeminiClient::new(&config, "k").unwrap();
        assert!(client
            .endpoint()
            .ends_with("/v1beta/models/gemini-2.0-flash:generateContent"));
    }

    #[test]
    fn test_request_serialization_maps_roles() {
        let request = GenerateContentRequest {
            contents: to_contents(&[Turn::user("ls"), Turn::assistant("README.md")]),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "ls");
        assert_eq!(json["contents"][1]["role"], "model");
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "CLI "}, {"text": "Ready."}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3, "totalTokenCount": 15}
        }"#;

        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        let (text, usage) = extract_text(response).unwrap();
        assert_eq!(text, "CLI Ready.");
        assert_eq!(usage.prompt_token_count, 12);
        assert_eq!(usage.candidates_token_count, 3);
    }

    #[test]
    fn test_response_without_candidates() {
        let response: GenerateContentResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        let err = extract_text(response).unwrap_err();
        assert!(matches!(err, RelayError::Upstream(_)));
    }

    mod http {
        use super::*;
        use serde_json::json;
        use wiremock::matchers::{body_partial_json, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn client_for(server: &MockServer) -> GeminiClient {
            let config = ModelConfig {
                base_url: server.uri(),
                model: "gemini-test".to_string(),
                request_timeout_secs: Some(5),
            };
            GeminiClient::new(&config, "test-key").unwrap()
        }

        fn transcript() -> Vec<Turn> {
            vec![Turn::user("whoami"), Turn::assistant("root"), Turn::user("pwd")]
        }

        #[tokio::test]
        async fn test_generate_success() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1beta/models/gemini-test:generateContent"))
                .and(header("x-goog-api-key", "test-key"))
                .and(body_partial_json(json!({
                    "contents": [
                        {"role": "user", "parts": [{"text": "whoami"}]},
                        {"role": "model", "parts": [{"text": "root"}]},
                        {"role": "user", "parts": [{"text": "pwd"}]}
                    ]
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": "/root"}]},
                        "finishReason": "STOP"
                    }],
                    "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 1}
                })))
                .expect(1)
                .mount(&server)
                .await;

            let reply = client_for(&server).generate(&transcript()).await.unwrap();
            assert_eq!(reply, "/root");
        }

        #[tokio::test]
        async fn test_generate_client_error_with_json_body() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                    "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
                })))
                .mount(&server)
                .await;

            let err = client_for(&server).generate(&transcript()).await.unwrap_err();
            assert!(matches!(err, RelayError::Upstream(_)));
            assert_eq!(
                err.to_string(),
                "Gemini API error: 400 Bad Request: API key not valid"
            );
        }

        #[tokio::test]
        async fn test_generate_server_error_plain_body() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
                .mount(&server)
                .await;

            let err = client_for(&server).generate(&transcript()).await.unwrap_err();
            assert_eq!(
                err.to_string(),
                "Gemini API error: 503 Service Unavailable: upstream down"
            );
        }

        #[tokio::test]
        async fn test_generate_invalid_body() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
                .mount(&server)
                .await;

            let err = client_for(&server).generate(&transcript()).await.unwrap_err();
            assert!(err.to_string().contains("invalid response body"));
        }
    }

    #[test]
    fn test_response_with_error_object() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"error": {"code": 429, "message": "quota exceeded"}}"#).unwrap();
        let err = extract_text(response).unwrap_err();
        assert_eq!(err.to_string(), "Gemini API error: quota exceeded");
    }
}
