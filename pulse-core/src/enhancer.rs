//! Optional rewriting of technical diagnoses into patient-friendly prose.
//!
//! The enhancer is best-effort: every failure path ends with the original
//! technical text, reported through [`Enhanced::enhanced`] = `false`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::EnhancerConfig;

const SYSTEM_PROMPT: &str = "You are a compassionate medical AI assistant that explains medical \
information in simple, patient-friendly language. Always use proper medical specialty names like \
'cardiologist', 'neurologist', 'dermatologist' instead of informal terms.";

// ============================================================================
// TextEnhancer trait
// ============================================================================

/// What the enhancer is asked to rewrite, plus supporting context.
#[derive(Debug, Clone, Default)]
pub struct EnhancementRequest {
    pub technical_diagnosis: String,
    pub matched_rules: u32,
    pub risk_factors: Vec<String>,
    pub confidence: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enhanced {
    pub text: String,
    pub enhanced: bool,
}

#[async_trait]
pub trait TextEnhancer: Send + Sync {
    /// Rewrite the diagnosis. `Ok(None)` means the service had nothing to add.
    async fn enhance(&self, request: &EnhancementRequest) -> Result<Option<String>, EnhancerError>;

    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum EnhancerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

/// Run `enhancer`, keeping the technical text on error, empty output or
/// output identical to the input.
pub async fn enhance_or_original(
    enhancer: &dyn TextEnhancer,
    request: &EnhancementRequest,
) -> Enhanced {
    let original = || Enhanced {
        text: request.technical_diagnosis.clone(),
        enhanced: false,
    };

    if !enhancer.is_available() {
        return original();
    }

    match enhancer.enhance(request).await {
        Ok(Some(text)) => {
            let text = text.trim();
            if text.is_empty() || text == request.technical_diagnosis.trim() {
                original()
            } else {
                Enhanced {
                    text: text.to_string(),
                    enhanced: true,
                }
            }
        }
        Ok(None) => original(),
        Err(e) => {
            tracing::warn!(
                enhancer = enhancer.name(),
                error = %e,
                "Text enhancement failed, keeping technical diagnosis"
            );
            original()
        }
    }
}

/// Build the enhancer described by `config`. Missing credentials disable it.
pub fn create_enhancer(config: &EnhancerConfig) -> Arc<dyn TextEnhancer> {
    if !config.enabled {
        return Arc::new(DisabledEnhancer);
    }
    match ChatCompletionEnhancer::new(config.clone()) {
        Ok(enhancer) => {
            tracing::info!(model = %config.model, "Text enhancer enabled");
            Arc::new(enhancer)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Text enhancer disabled");
            Arc::new(DisabledEnhancer)
        }
    }
}

// ============================================================================
// DisabledEnhancer
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEnhancer;

#[async_trait]
impl TextEnhancer for DisabledEnhancer {
    async fn enhance(&self, _request: &EnhancementRequest) -> Result<Option<String>, EnhancerError> {
        Ok(None)
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

// ============================================================================
// Chat-completions API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CompletionMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionContent,
}

#[derive(Debug, Deserialize)]
struct CompletionContent {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// ChatCompletionEnhancer
// ============================================================================

/// Calls an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionEnhancer {
    client: Client,
    config: EnhancerConfig,
    api_key: String,
    url: String,
}

impl ChatCompletionEnhancer {
    pub fn new(config: EnhancerConfig) -> Result<Self, EnhancerError> {
        let url = config.api_url.clone();
        Self::with_base_url(config, url)
    }

    /// Create a client against a custom endpoint (for testing / integration)
    pub fn with_base_url(config: EnhancerConfig, url: String) -> Result<Self, EnhancerError> {
        let api_key = config.resolve_api_key().ok_or(EnhancerError::MissingApiKey)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            config,
            api_key,
            url,
        })
    }

    fn prompt(request: &EnhancementRequest) -> String {
        let mut context = format!(
            "Medical Analysis Details:\n- {} clinical rules evaluated\n",
            request.matched_rules
        );
        if !request.risk_factors.is_empty() {
            context.push_str(&format!(
                "- Risk factors: {}\n",
                request.risk_factors.join(", ")
            ));
        }
        context.push_str(&format!(
            "- Confidence: {:.0}%\n",
            request.confidence * 100.0
        ));

        let recommendations = if request.recommendations.is_empty() {
            String::new()
        } else {
            let lines: Vec<String> = request
                .recommendations
                .iter()
                .take(3)
                .map(|r| format!("- {}", r))
                .collect();
            format!("Recommendations:\n{}\n", lines.join("\n"))
        };

        format!(
            "Translate this technical medical diagnosis into patient-friendly language that is \
clear, reassuring but honest, and action-oriented. Use proper medical specialty names \
(cardiologist, neurologist, dermatologist), not informal terms.\n\n\
Technical Diagnosis:\n{}\n\n{}\n{}\n\
Write a brief explanation (2-3 sentences) that helps the patient understand what is \
happening and what to do next.",
            request.technical_diagnosis, context, recommendations
        )
    }

    async fn enhance_once(&self, request: &EnhancementRequest) -> Result<Option<String>, EnhancerError> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages: vec![
                CompletionMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                CompletionMessage {
                    role: "user",
                    content: Self::prompt(request),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "Enhancer API error");
            return Err(EnhancerError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()))
    }
}

#[async_trait]
impl TextEnhancer for ChatCompletionEnhancer {
    async fn enhance(&self, request: &EnhancementRequest) -> Result<Option<String>, EnhancerError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.config.max_retries);

        match Retry::spawn(retry_strategy, || self.enhance_once(request)).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All enhancer retry attempts failed"
                );
                Err(EnhancerError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "chat-completion"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: Option<&str>) -> EnhancerConfig {
        EnhancerConfig {
            enabled: true,
            api_key: api_key.map(str::to_string),
            api_key_env: "PULSE_TEST_UNSET_ENHANCER_KEY".to_string(),
            max_retries: 2,
            retry_delay_ms: 10,
            ..EnhancerConfig::default()
        }
    }

    fn request() -> EnhancementRequest {
        EnhancementRequest {
            technical_diagnosis: "Patient symptoms suggest possible Angina.".to_string(),
            matched_rules: 4,
            risk_factors: vec!["hypertension".to_string()],
            confidence: 0.98,
            recommendations: vec!["Stress test recommended".to_string()],
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn test_enhance_returns_rewritten_text() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("  You should see a cardiologist soon.  ")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let enhancer =
            ChatCompletionEnhancer::with_base_url(test_config(Some("test-key")), mock_server.uri())
                .expect("Failed to create enhancer");
        let result = enhance_or_original(&enhancer, &request()).await;

        assert!(result.enhanced);
        assert_eq!(result.text, "You should see a cardiologist soon.");
    }

    #[tokio::test]
    async fn test_server_error_keeps_technical_text() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let enhancer =
            ChatCompletionEnhancer::with_base_url(test_config(Some("test-key")), mock_server.uri())
                .expect("Failed to create enhancer");

        let err = enhancer.enhance(&request()).await.unwrap_err();
        assert!(matches!(err, EnhancerError::RetryExhausted { attempts: 2 }));

        let result = enhance_or_original(&enhancer, &request()).await;
        assert!(!result.enhanced);
        assert_eq!(result.text, request().technical_diagnosis);
    }

    #[tokio::test]
    async fn test_retries_on_429_then_succeeds() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Friendly text.")))
            .mount(&mock_server)
            .await;

        let enhancer =
            ChatCompletionEnhancer::with_base_url(test_config(Some("test-key")), mock_server.uri())
                .expect("Failed to create enhancer");
        let text = enhancer.enhance(&request()).await.unwrap();
        assert_eq!(text.as_deref(), Some("Friendly text."));
    }

    #[tokio::test]
    async fn test_unchanged_or_empty_output_is_not_enhanced() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("Patient symptoms suggest possible Angina.")),
            )
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
            .mount(&mock_server)
            .await;

        let enhancer =
            ChatCompletionEnhancer::with_base_url(test_config(Some("test-key")), mock_server.uri())
                .expect("Failed to create enhancer");

        let unchanged = enhance_or_original(&enhancer, &request()).await;
        assert!(!unchanged.enhanced);
        let empty = enhance_or_original(&enhancer, &request()).await;
        assert!(!empty.enhanced);
        assert_eq!(empty.text, request().technical_diagnosis);
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let result = ChatCompletionEnhancer::new(test_config(None));
        assert!(matches!(result, Err(EnhancerError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_disabled_config_yields_unavailable_enhancer() {
        let config = EnhancerConfig::default();
        let enhancer = create_enhancer(&config);
        assert!(!enhancer.is_available());
        let result = enhance_or_original(enhancer.as_ref(), &request()).await;
        assert!(!result.enhanced);
    }

    #[test]
    fn test_prompt_includes_context() {
        let prompt = ChatCompletionEnhancer::prompt(&request());
        assert!(prompt.contains("4 clinical rules evaluated"));
        assert!(prompt.contains("Risk factors: hypertension"));
        assert!(prompt.contains("- Stress test recommended"));
        assert!(prompt.contains("Confidence: 98%"));
    }
}
