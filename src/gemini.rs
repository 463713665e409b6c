//! Google Gemini chat backend
//!
//! Speaks the `generateContent` REST API directly: the session keeps the
//! conversation history client-side and replays it with every turn, together
//! with the system instruction, generation config, and safety settings.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::chat::ChatSession;
use crate::config::Config;
use crate::error::ChatError;
use crate::prompt::SYSTEM_INSTRUCTION;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used unless the config overrides it
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Per-request HTTP timeout; a whole turn is additionally bounded by the
/// controller's turn timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

impl Content {
    fn user(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }

    // "model" is Gemini's wire name for the assistant role
    fn model(text: &str) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            top_k: 1,
            top_p: 1.0,
            max_output_tokens: 2048,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

fn safety_settings() -> Vec<SafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: "BLOCK_MEDIUM_AND_ABOVE",
    })
    .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: SystemInstruction,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Factory for chat sessions against one model with one credential.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self, ChatError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                ChatError::InitializationFailed(format!("could not build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Resolve the credential and model from the environment and config file.
    pub fn from_config(config: &Config) -> Result<Self, ChatError> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            ChatError::InitializationFailed(
                "GEMINI_API_KEY is not set and no key is stored in the config file".to_string(),
            )
        })?;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self::new(&api_key, &model)
    }

    /// Establish a chat session, checking up front that the model is
    /// reachable with this credential. Key and quota problems surface here
    /// instead of on the first turn.
    pub async fn start_chat(&self) -> Result<GeminiSession, ChatError> {
        let url = format!("{}/models/{}?key={}", API_BASE, self.model, self.api_key);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ChatError::InitializationFailed(describe_request_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::InitializationFailed(api_error_message(
                status, &body,
            )));
        }

        debug!("started chat session against {}", self.model);

        Ok(GeminiSession {
            http: self.http.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            history: Vec::new(),
        })
    }
}

/// One multi-turn conversation with the model.
///
/// The session owns its history. A turn is committed to the history only
/// after the model replies, so a failed turn changes nothing and the next
/// attempt replays the same context.
pub struct GeminiSession {
    http: Client,
    api_key: String,
    model: String,
    history: Vec<Content>,
}

impl GeminiSession {
    pub async fn send_message(&mut self, prompt: &str) -> Result<String, ChatError> {
        let request = self.build_request(prompt);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            API_BASE, self.model, self.api_key
        );

        debug!(
            "sending turn to {} with {} prior messages",
            self.model,
            self.history.len()
        );

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::SubmissionFailed(describe_request_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::SubmissionFailed(api_error_message(
                status, &body,
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            ChatError::SubmissionFailed(format!("could not parse response: {}", e))
        })?;

        let reply = extract_reply(parsed)?;
        self.commit(request.contents, &reply);
        Ok(reply)
    }

    fn build_request(&self, prompt: &str) -> GenerateRequest {
        let mut contents = self.history.clone();
        contents.push(Content::user(prompt));

        GenerateRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            contents,
            generation_config: GenerationConfig::default(),
            safety_settings: safety_settings(),
        }
    }

    // The request's contents already end with the new user turn, so on
    // success they become the history, plus the model's reply.
    fn commit(&mut self, contents: Vec<Content>, reply: &str) {
        self.history = contents;
        self.history.push(Content::model(reply));
    }
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn submit(&mut self, prompt: &str) -> Result<String, ChatError> {
        self.send_message(prompt).await
    }
}

fn extract_reply(response: GenerateResponse) -> Result<String, ChatError> {
    if let Some(feedback) = &response.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            return Err(ChatError::SubmissionFailed(format!(
                "prompt was blocked by the safety filter ({})",
                reason
            )));
        }
    }

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        ChatError::SubmissionFailed("response contained no candidates".to_string())
    })?;

    // A SAFETY stop may carry partial text; it is never surfaced as a reply.
    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(ChatError::SubmissionFailed(
            "reply was blocked by the safety filter (finish reason SAFETY)".to_string(),
        ));
    }

    let text: String = candidate
        .content
        .map(|content| content.parts.into_iter().map(|part| part.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate
            .finish_reason
            .unwrap_or_else(|| "unknown".to_string());
        return Err(ChatError::SubmissionFailed(format!(
            "reply contained no text (finish reason {})",
            reason
        )));
    }

    Ok(text)
}

fn api_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = v["error"]["message"].as_str() {
            return message.to_string();
        }
    }
    format!("HTTP {}: {}", status, body)
}

fn describe_request_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("could not reach the Gemini API: {}", err)
    } else {
        format!("network error: {}", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> GeminiSession {
        GeminiSession {
            http: Client::new(),
            api_key: "test-key".to_string(),
            model: DEFAULT_MODEL.to_string(),
            history: Vec::new(),
        }
    }

    #[test]
    fn test_request_payload_shape() {
        let session = test_session();
        let request = session.build_request("who teaches chemistry?");
        let v = serde_json::to_value(&request).unwrap();

        assert!(v["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Rate My Professor"));

        let contents = v["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "who teaches chemistry?");

        let config = &v["generationConfig"];
        assert_eq!(config["temperature"].as_f64(), Some(0.9));
        assert_eq!(config["topK"].as_u64(), Some(1));
        assert_eq!(config["topP"].as_f64(), Some(1.0));
        assert_eq!(config["maxOutputTokens"].as_u64(), Some(2048));

        let safety = v["safetySettings"].as_array().unwrap();
        assert_eq!(safety.len(), 4);
        for setting in safety {
            assert_eq!(setting["threshold"], "BLOCK_MEDIUM_AND_ABOVE");
        }
        let categories: Vec<&str> = safety
            .iter()
            .map(|s| s["category"].as_str().unwrap())
            .collect();
        assert!(categories.contains(&"HARM_CATEGORY_HARASSMENT"));
        assert!(categories.contains(&"HARM_CATEGORY_HATE_SPEECH"));
        assert!(categories.contains(&"HARM_CATEGORY_SEXUALLY_EXPLICIT"));
        assert!(categories.contains(&"HARM_CATEGORY_DANGEROUS_CONTENT"));
    }

    #[test]
    fn test_request_replays_history_with_model_role() {
        let mut session = test_session();
        session.history = vec![Content::user("Hi"), Content::model("Hello!")];

        let request = session.build_request("How are you?");
        let v = serde_json::to_value(&request).unwrap();
        let contents = v["contents"].as_array().unwrap();

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "How are you?");
    }

    #[test]
    fn test_history_commits_only_after_a_reply() {
        let mut session = test_session();
        let request = session.build_request("Hi");
        // building a request never touches the history
        assert!(session.history.is_empty());

        session.commit(request.contents, "Hello!");
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[0], Content::user("Hi"));
        assert_eq!(session.history[1], Content::model("Hello!"));
    }

    #[test]
    fn test_extract_reply_reads_candidate_text() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Here are your matches."}], "role": "model"}, "finishReason": "STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_reply(response).unwrap(), "Here are your matches.");
    }

    #[test]
    fn test_extract_reply_concatenates_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Top pick: "}, {"text": "Dr. A"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_reply(response).unwrap(), "Top pick: Dr. A");
    }

    #[test]
    fn test_extract_reply_blocked_prompt() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"promptFeedback": {"blockReason": "SAFETY"}, "candidates": []}"#,
        )
        .unwrap();
        let err = extract_reply(response).unwrap_err();
        assert!(matches!(err, ChatError::SubmissionFailed(_)));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_reply_no_candidates() {
        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        let err = extract_reply(response).unwrap_err();
        assert!(err.to_string().contains("no candidates"));
    }

    #[test]
    fn test_extract_reply_safety_cutoff_has_no_text() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        let err = extract_reply(response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_reply_rejects_partial_text_on_safety_stop() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "partial answer"}]}, "finishReason": "SAFETY"}]}"#,
        )
        .unwrap();
        let err = extract_reply(response).unwrap_err();
        assert!(matches!(err, ChatError::SubmissionFailed(_)));
        assert!(err.to_string().contains("safety filter"));
    }

    #[test]
    fn test_extract_reply_skips_textless_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"functionCall": {"name": "noop"}}, {"text": "real text"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_reply(response).unwrap(), "real text");
    }

    #[test]
    fn test_api_error_message_prefers_json_detail() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(
            api_error_message(StatusCode::BAD_REQUEST, body),
            "API key not valid."
        );
    }

    #[test]
    fn test_api_error_message_falls_back_to_raw_body() {
        let message = api_error_message(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded");
        assert!(message.contains("500"));
        assert!(message.contains("upstream exploded"));
    }
}
