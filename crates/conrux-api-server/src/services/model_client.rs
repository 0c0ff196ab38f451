use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{GeminiConfig, RetryConfig};
use crate::services::conversation::HistoryTurn;
use crate::services::gemini::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    GenerativeBackend, ModelError, Part, SafetySetting,
};
use crate::utils::retry::RetryExecutor;

pub const TEXT_FALLBACK: &str =
    "I'm sorry, I couldn't generate a response. Please try rephrasing your question.";
pub const IMAGE_FALLBACK: &str = "I'm sorry, I couldn't analyze the image. Please try again.";
pub const DOCUMENT_FALLBACK: &str =
    "I'm sorry, I couldn't process the document. Please try again.";

/// Characters of document content submitted per request
pub const DEFAULT_DOCUMENT_CHAR_BUDGET: usize = 30_000;

/// Model output, or the apology substituted when the response held no usable text
#[derive(Debug, Clone, PartialEq)]
pub enum ModelText {
    Generated(String),
    Fallback(String),
}

impl ModelText {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ModelText::Fallback(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ModelText::Generated(text) | ModelText::Fallback(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ModelText::Generated(text) | ModelText::Fallback(text) => text,
        }
    }

    /// Treat the fallback apology as a failure
    pub fn into_strict(self) -> Result<String, ModelError> {
        match self {
            ModelText::Generated(text) => Ok(text),
            ModelText::Fallback(_) => Err(ModelError::NoUsableText),
        }
    }
}

/// Raw image bytes plus their mime type
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Generation parameters for the client, taken from `GeminiConfig` at startup
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub text_model: String,
    pub vision_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
    pub document_char_budget: usize,
}

impl ModelSettings {
    pub fn from_config(config: &GeminiConfig, document_char_budget: usize) -> Self {
        Self {
            text_model: config.text_model.clone(),
            vision_model: config.vision_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            top_k: config.top_k,
            document_char_budget,
        }
    }
}

/// Adapter over the generative backend: prompt assembly, retry and response extraction.
pub struct ModelClient {
    backend: Arc<dyn GenerativeBackend>,
    settings: ModelSettings,
    retry: RetryConfig,
}

impl ModelClient {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        settings: ModelSettings,
        retry: RetryConfig,
    ) -> Self {
        Self {
            backend,
            settings,
            retry,
        }
    }

    pub fn text_model(&self) -> &str {
        &self.settings.text_model
    }

    pub fn vision_model(&self) -> &str {
        &self.settings.vision_model
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Single-turn completion
    pub async fn generate(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<ModelText, ModelError> {
        let contents = vec![Content::text("user", format!("User: {}", prompt))];
        let request = self.build_request(contents, system_instruction, temperature);
        let response = self
            .call_with_retry(
                &self.retry,
                "generate",
                &self.settings.text_model,
                &request,
            )
            .await?;
        Ok(extract_text(&response, TEXT_FALLBACK))
    }

    /// Multi-turn completion: prior turns followed by the new prompt
    pub async fn generate_with_history(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
        system_instruction: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<ModelText, ModelError> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content::text(turn.role.as_str(), turn.text.clone()))
            .collect();
        contents.push(Content::text("user", prompt));

        let request = self.build_request(contents, system_instruction, temperature);
        let response = self
            .call_with_retry(
                &self.retry,
                "generate_with_history",
                &self.settings.text_model,
                &request,
            )
            .await?;
        Ok(extract_text(&response, TEXT_FALLBACK))
    }

    pub async fn analyze_image(
        &self,
        image: &ImageInput,
        prompt: &str,
        system_instruction: Option<&str>,
    ) -> Result<ModelText, ModelError> {
        let contents = vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part::text(prompt),
                Part::inline(image.mime_type.clone(), STANDARD.encode(&image.data)),
            ],
        }];
        let request = self.build_request(contents, system_instruction, None);
        let response = self
            .call_with_retry(
                &self.retry,
                "analyze_image",
                &self.settings.vision_model,
                &request,
            )
            .await?;
        Ok(extract_text(&response, IMAGE_FALLBACK))
    }

    /// Content beyond the character budget is dropped silently; the query is sent whole.
    pub async fn analyze_document(
        &self,
        content: &str,
        query: &str,
        file_type: &str,
        system_instruction: Option<&str>,
    ) -> Result<ModelText, ModelError> {
        let prompt = build_document_prompt(
            content,
            query,
            file_type,
            self.settings.document_char_budget,
        );
        let contents = vec![Content::text("user", prompt)];
        let request = self.build_request(contents, system_instruction, None);
        let response = self
            .call_with_retry(
                &self.retry,
                "analyze_document",
                &self.settings.text_model,
                &request,
            )
            .await?;
        Ok(extract_text(&response, DOCUMENT_FALLBACK))
    }

    /// Short single-turn probe used by the health endpoint. One attempt, no backoff.
    pub async fn test_connection(&self) -> Result<String, ModelError> {
        let contents = vec![Content::text(
            "user",
            "User: Hello, this is a connection test.",
        )];
        let request = self.build_request(contents, None, None);
        let single_attempt = RetryConfig {
            max_attempts: 1,
            ..self.retry.clone()
        };
        let response = self
            .call_with_retry(
                &single_attempt,
                "test_connection",
                &self.settings.text_model,
                &request,
            )
            .await?;
        let text = extract_text(&response, TEXT_FALLBACK).into_text();
        Ok(text.chars().take(100).collect())
    }

    fn build_request(
        &self,
        contents: Vec<Content>,
        system_instruction: Option<&str>,
        temperature: Option<f32>,
    ) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: system_instruction
                .filter(|s| !s.trim().is_empty())
                .map(Content::system),
            contents,
            generation_config: GenerationConfig {
                temperature: temperature.unwrap_or(self.settings.temperature),
                max_output_tokens: self.settings.max_tokens,
                top_p: self.settings.top_p,
                top_k: self.settings.top_k,
                candidate_count: 1,
            },
            safety_settings: SafetySetting::defaults(),
        }
    }

    async fn call_with_retry(
        &self,
        retry: &RetryConfig,
        op_name: &'static str,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ModelError> {
        RetryExecutor::execute(retry, op_name, move |attempt| async move {
            debug!("{} attempt={} model={}", op_name, attempt + 1, model);
            self.backend.generate_content(model, request).await
        })
        .await
    }
}

/// First candidate's first part, then any text, then the fixed fallback
pub fn extract_text(response: &GenerateContentResponse, fallback: &str) -> ModelText {
    if let Some(text) = response.first_part_text() {
        return ModelText::Generated(text.to_string());
    }
    if let Some(text) = response.text() {
        return ModelText::Generated(text);
    }
    warn!(
        "Model response had no usable text (finish_reason={:?}, block_reason={:?}), returning fallback",
        response.candidates.first().and_then(|c| c.finish_reason.as_deref()),
        response.block_reason()
    );
    ModelText::Fallback(fallback.to_string())
}

/// Truncate to at most `budget` characters, on a char boundary
pub fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn build_document_prompt(content: &str, query: &str, file_type: &str, budget: usize) -> String {
    let submitted = truncate_chars(content, budget);
    if submitted.len() < content.len() {
        debug!(
            "Document content truncated to {} of {} characters",
            budget,
            content.chars().count()
        );
    }

    [
        format!("Document Type: {}", file_type.to_uppercase()),
        format!("Document Content:\n```\n{}\n```", submitted),
        format!("User Query: {}", query),
        "\nPlease analyze the document and provide a comprehensive response to the user's query."
            .to_string(),
    ]
    .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::TurnRole;
    use crate::services::gemini::{Candidate, MockGenerativeBackend};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    fn settings() -> ModelSettings {
        ModelSettings::from_config(&crate::config::Settings::default().gemini, 50)
    }

    fn text_response(text: &str) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content::text("model", text)),
                finish_reason: Some("STOP".to_string()),
            }],
            prompt_feedback: None,
        }
    }

    fn client(mock: MockGenerativeBackend) -> ModelClient {
        ModelClient::new(Arc::new(mock), settings(), fast_retry())
    }

    #[tokio::test]
    async fn test_generate_single_turn_prompt() {
        let mut mock = MockGenerativeBackend::new();
        mock.expect_generate_content()
            .withf(|model, req| {
                model.to_string() == "gemini-2.0-flash-exp"
                    && req.contents.len() == 1
                    && req.contents[0].parts[0].text.as_deref() == Some("User: Hello")
                    && req.generation_config.temperature == 0.2
                    && req.system_instruction.is_some()
            })
            .times(1)
            .returning(|_, _| Ok(text_response("Hi!")));

        let text = client(mock)
            .generate("Hello", Some("persona"), Some(0.2))
            .await
            .unwrap();
        assert_eq!(text, ModelText::Generated("Hi!".to_string()));
    }

    #[tokio::test]
    async fn test_generate_with_history_appends_prompt() {
        let mut mock = MockGenerativeBackend::new();
        mock.expect_generate_content()
            .withf(|_, req| {
                let roles: Vec<Option<&str>> =
                    req.contents.iter().map(|c| c.role.as_deref()).collect();
                roles == vec![Some("user"), Some("model"), Some("user")]
                    && req.contents[2].parts[0].text.as_deref() == Some("follow up")
            })
            .times(1)
            .returning(|_, _| Ok(text_response("answer")));

        let history = vec![
            HistoryTurn { role: TurnRole::User, text: "Hello".to_string() },
            HistoryTurn { role: TurnRole::Model, text: "Hi".to_string() },
        ];
        let text = client(mock)
            .generate_with_history("follow up", &history, None, None)
            .await
            .unwrap();
        assert_eq!(text.as_str(), "answer");
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let mut mock = MockGenerativeBackend::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_generate_content()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ModelError::Http("connection reset".to_string())));
        mock.expect_generate_content()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(text_response("finally")));

        let text = client(mock).generate("x", None, None).await.unwrap();
        assert_eq!(text.as_str(), "finally");
    }

    #[tokio::test]
    async fn test_retry_exhaustion_propagates_last_error() {
        let mut mock = MockGenerativeBackend::new();
        mock.expect_generate_content()
            .times(3)
            .returning(|_, _| {
                Err(ModelError::Api {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            });

        let err = client(mock).generate("x", None, None).await.unwrap_err();
        assert!(matches!(err, ModelError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_empty_response_falls_back_without_retry() {
        let mut mock = MockGenerativeBackend::new();
        mock.expect_generate_content()
            .times(1)
            .returning(|_, _| Ok(GenerateContentResponse::default()));

        let text = client(mock).generate("x", None, None).await.unwrap();
        assert!(text.is_fallback());
        assert_eq!(text.as_str(), TEXT_FALLBACK);
        assert!(matches!(text.into_strict(), Err(ModelError::NoUsableText)));
    }

    #[tokio::test]
    async fn test_connection_makes_a_single_attempt() {
        let mut mock = MockGenerativeBackend::new();
        mock.expect_generate_content()
            .times(1)
            .returning(|_, _| Err(ModelError::Http("connection refused".to_string())));

        // Backoff this long would stall the test if the probe retried
        let slow_retry = RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 60_000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        let client = ModelClient::new(Arc::new(mock), settings(), slow_retry);

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.test_connection(),
        )
        .await
        .expect("health probe must not wait on backoff")
        .unwrap_err();
        assert!(matches!(err, ModelError::Http(_)));
    }

    #[tokio::test]
    async fn test_analyze_image_sends_inline_data() {
        let mut mock = MockGenerativeBackend::new();
        mock.expect_generate_content()
            .withf(|_, req| {
                let parts = &req.contents[0].parts;
                parts.len() == 2
                    && parts[0].text.as_deref() == Some("Describe")
                    && parts[1]
                        .inline_data
                        .as_ref()
                        .map(|d| d.mime_type == "image/png" && d.data == "AQID")
                        .unwrap_or(false)
            })
            .times(1)
            .returning(|_, _| Ok(GenerateContentResponse::default()));

        let image = ImageInput {
            mime_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        };
        let text = client(mock).analyze_image(&image, "Describe", None).await.unwrap();
        assert_eq!(text, ModelText::Fallback(IMAGE_FALLBACK.to_string()));
    }

    #[tokio::test]
    async fn test_analyze_document_truncates_content_not_query() {
        let long_query = "q".repeat(200);
        let expected_query = format!("User Query: {}", long_query);

        let mut mock = MockGenerativeBackend::new();
        mock.expect_generate_content()
            .withf(move |_, req| {
                let prompt = req.contents[0].parts[0].text.clone().unwrap_or_default();
                prompt.contains(&format!("```\n{}\n```", "x".repeat(50)))
                    && !prompt.contains(&"x".repeat(51))
                    && prompt.contains(&expected_query)
                    && prompt.starts_with("Document Type: TXT")
            })
            .times(1)
            .returning(|_, _| Ok(text_response("summary")));

        let content = "x".repeat(500);
        let text = client(mock)
            .analyze_document(&content, &long_query, "txt", None)
            .await
            .unwrap();
        assert_eq!(text.as_str(), "summary");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_extract_text_prefers_first_part() {
        let response = GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![Part::text("first"), Part::text("second")],
                }),
                finish_reason: None,
            }],
            prompt_feedback: None,
        };
        assert_eq!(
            extract_text(&response, TEXT_FALLBACK),
            ModelText::Generated("first".to_string())
        );
    }

    #[test]
    fn test_extract_text_falls_back_to_any_text() {
        let response = GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![
                        Part::inline("image/png", "AA".to_string()),
                        Part::text("later"),
                    ],
                }),
                finish_reason: None,
            }],
            prompt_feedback: None,
        };
        assert_eq!(
            extract_text(&response, TEXT_FALLBACK),
            ModelText::Generated("later".to_string())
        );
    }
}
