use crate::event::AppEvent;
use crate::project::{Message, Role};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::mpsc;
use thiserror::Error;
use tokio::runtime::Handle;

const API_BASE: &str = "https://generativelanguage.googleapis.com";
const GENERATE_MODEL: &str = "gemini-3-pro-preview";
const SUGGEST_MODEL: &str = "gemini-3-flash-preview";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// How many suggestions the UI will surface at most.
pub const MAX_SUGGESTIONS: usize = 3;

const SYSTEM_INSTRUCTION: &str = "You are a senior product designer working inside Maquette, \
a desktop playground that renders declarative component documents.

Your task: turn the user's request (and optional reference image) into a component document.

DOCUMENT FORMAT:
- A document is JSON: {\"schema_version\": 1, \"definitions\": [{\"name\": ..., \"node\": ...}, ...]}.
- Each definition names a component; the entry component MUST be named \"Component\".
- A node is an object with a \"kind\" plus kind-specific fields:
  stack (direction \"vertical\"|\"horizontal\", gap, children), heading (level 1-3, text),
  text (text), button (label, variant \"primary\"|\"secondary\"), input (id, label, placeholder),
  image (src, alt, height), card (title, children), badge (label, tone
  \"neutral\"|\"success\"|\"warning\"|\"danger\"), divider, and ref (name) to reuse another definition.
- Do not invent other kinds or fields.

GUIDELINES:
1. Compose layouts that hold up at narrow widths; prefer vertical stacks with clear hierarchy.
2. Keep copy short and purposeful; use placeholder imagery from picsum.photos when an image helps.
3. Factor repeated fragments into named definitions referenced with ref nodes.
4. If the user provides an image, treat it as a reference for layout and style.

REPLY SHAPE:
Return ONLY a JSON object {\"code\": <the full component document as a string>, \
\"description\": <a brief explanation of what was built and why>}. No markdown fences.";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedReply {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerateError {
    #[error("no API key configured (set {API_KEY_ENV})")]
    MissingApiKey,
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model reply did not match the expected shape: {0}")]
    MalformedResponse(String),
}

/// Everything the orchestrator hands over when it enters Generating.
/// `history` is the conversation as it stood before the triggering
/// message was appended; `project_id` tags the request so a result
/// arriving after a project switch can be discarded.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub project_id: String,
    pub prompt: String,
    pub history: Vec<Message>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub project_id: String,
    pub description: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: &'static str,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn image(data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: "image/png".to_string(),
                data: data.into(),
            }),
        }
    }
}

/// Drop a data-URL prefix (`data:image/png;base64,`) if present; the API
/// wants bare base64.
pub fn strip_data_url(image: &str) -> &str {
    image.rsplit(',').next().unwrap_or(image)
}

/// Ordered turn list: the conversation replayed with user/model roles,
/// then the new prompt (plus optional inline image) as the final user
/// turn.
pub fn build_turns(history: &[Message], prompt: &str, image: Option<&str>) -> Vec<Turn> {
    let mut turns: Vec<Turn> = history
        .iter()
        .map(|message| {
            let mut parts = vec![Part::text(message.content.clone())];
            if let Some(image) = &message.image {
                parts.push(Part::image(strip_data_url(image)));
            }
            Turn {
                role: match message.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                },
                parts,
            }
        })
        .collect();

    let mut parts = vec![Part::text(prompt)];
    if let Some(image) = image {
        parts.push(Part::image(strip_data_url(image)));
    }
    turns.push(Turn {
        role: "user",
        parts,
    });
    turns
}

fn generation_body(turns: &[Turn]) -> Value {
    json!({
        "contents": turns,
        "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "code": { "type": "STRING" },
                    "description": { "type": "STRING" }
                },
                "required": ["code", "description"]
            }
        }
    })
}

fn suggestion_prompt(description: &str, code: &str) -> String {
    format!(
        "Based on this component description: \"{description}\" and its document below, \
suggest {MAX_SUGGESTIONS} concise, high-impact next steps a user might want. \
Each suggestion is a short phrase (max 6 words).\n\n{code}\n\n\
Return ONLY a JSON object: {{\"suggestions\": [\"...\", \"...\", \"...\"]}}"
    )
}

fn suggestion_body(description: &str, code: &str) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": suggestion_prompt(description, code) }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "suggestions": { "type": "ARRAY", "items": { "type": "STRING" } }
                },
                "required": ["suggestions"]
            }
        }
    })
}

/// Pull the model's text payload out of a generateContent response body.
fn response_text(body: &Value) -> Option<&str> {
    body["candidates"][0]["content"]["parts"][0]["text"].as_str()
}

/// Enforce the `{code, description}` reply contract.
pub fn parse_reply(body: &Value) -> Result<GeneratedReply, GenerateError> {
    let text = response_text(body)
        .ok_or_else(|| GenerateError::MalformedResponse("no text candidate".to_string()))?;
    serde_json::from_str(text).map_err(|err| GenerateError::MalformedResponse(err.to_string()))
}

/// Best-effort suggestion extraction; anything unexpected collapses to an
/// empty list.
pub fn parse_suggestions(body: &Value) -> Vec<String> {
    let Some(text) = response_text(body) else {
        return Vec::new();
    };
    let Ok(parsed) = serde_json::from_str::<Value>(text) else {
        return Vec::new();
    };
    parsed["suggestions"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(str::to_string)
                .take(MAX_SUGGESTIONS)
                .collect()
        })
        .unwrap_or_default()
}

/// Client for the hosted model. Request methods spawn onto the shared
/// runtime and deliver results over the app event channel; nothing here
/// blocks the UI thread.
#[derive(Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    api_key: Option<String>,
    tx: mpsc::Sender<AppEvent>,
    runtime: Handle,
}

impl GenerationClient {
    pub fn new(runtime: Handle, tx: mpsc::Sender<AppEvent>) -> Self {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self {
            http: reqwest::Client::new(),
            api_key,
            tx,
            runtime,
        }
    }

    pub fn request_generation(&self, request: GenerationRequest) {
        let tx = self.tx.clone();
        let http = self.http.clone();
        let api_key = self.api_key.clone();
        self.runtime.spawn(async move {
            let result = match api_key {
                Some(key) => generate_once(&http, &key, &request).await,
                None => Err(GenerateError::MissingApiKey),
            };
            let _ = tx.send(AppEvent::GenerationFinished {
                project_id: request.project_id,
                result,
            });
        });
    }

    pub fn request_suggestions(&self, request: SuggestionRequest) {
        let tx = self.tx.clone();
        let http = self.http.clone();
        let api_key = self.api_key.clone();
        self.runtime.spawn(async move {
            let suggestions = match api_key {
                Some(key) => suggest_once(&http, &key, &request).await,
                None => Vec::new(),
            };
            let _ = tx.send(AppEvent::SuggestionsReady {
                project_id: request.project_id,
                suggestions,
            });
        });
    }
}

fn endpoint(model: &str, key: &str) -> String {
    format!("{API_BASE}/v1beta/models/{model}:generateContent?key={key}")
}

async fn generate_once(
    http: &reqwest::Client,
    key: &str,
    request: &GenerationRequest,
) -> Result<GeneratedReply, GenerateError> {
    let turns = build_turns(&request.history, &request.prompt, request.image.as_deref());
    let response = http
        .post(endpoint(GENERATE_MODEL, key))
        .json(&generation_body(&turns))
        .send()
        .await
        .map_err(|err| GenerateError::Transport(err.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        return Err(GenerateError::Transport(format!("{status}: {detail}")));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|err| GenerateError::MalformedResponse(err.to_string()))?;
    parse_reply(&body)
}

async fn suggest_once(
    http: &reqwest::Client,
    key: &str,
    request: &SuggestionRequest,
) -> Vec<String> {
    let response = match http
        .post(endpoint(SUGGEST_MODEL, key))
        .json(&suggestion_body(&request.description, &request.code))
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(error = %err, "suggestion request failed");
            return Vec::new();
        }
    };

    match response.json::<Value>().await {
        Ok(body) => parse_suggestions(&body),
        Err(err) => {
            tracing::debug!(error = %err, "suggestion response unreadable");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: Role, content: &str, image: Option<&str>) -> Message {
        Message {
            role,
            content: content.to_string(),
            timestamp: 0,
            image: image.map(str::to_string),
        }
    }

    #[test]
    fn strip_data_url_drops_prefix() {
        assert_eq!(strip_data_url("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_url("QUJD"), "QUJD");
    }

    #[test]
    fn build_turns_alternates_roles_and_appends_prompt() {
        let history = vec![
            message(Role::User, "Build a button", None),
            message(Role::Assistant, "Done", None),
        ];
        let turns = build_turns(&history, "Make it blue", None);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, "user");
        assert_eq!(turns[1].role, "model");
        assert_eq!(turns[2].role, "user");
        assert_eq!(turns[2].parts[0].text.as_deref(), Some("Make it blue"));
    }

    #[test]
    fn build_turns_inlines_images_without_prefix() {
        let history = vec![message(
            Role::User,
            "like this",
            Some("data:image/png;base64,QUJD"),
        )];
        let turns = build_turns(&history, "again", Some("data:image/png;base64,REVG"));
        let history_image = turns[0].parts[1].inline_data.as_ref().unwrap();
        assert_eq!(history_image.data, "QUJD");
        assert_eq!(history_image.mime_type, "image/png");
        let prompt_image = turns[1].parts[1].inline_data.as_ref().unwrap();
        assert_eq!(prompt_image.data, "REVG");
    }

    fn wrap_text(text: &str) -> Value {
        json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        })
    }

    #[test]
    fn parse_reply_accepts_the_expected_shape() {
        let body = wrap_text(r#"{"code":"{\"schema_version\":1}","description":"A button"}"#);
        let reply = parse_reply(&body).expect("reply should parse");
        assert_eq!(reply.description, "A button");
    }

    #[test]
    fn parse_reply_rejects_missing_fields() {
        let body = wrap_text(r#"{"code":"only half"}"#);
        assert!(matches!(
            parse_reply(&body),
            Err(GenerateError::MalformedResponse(_))
        ));
    }

    #[test]
    fn parse_reply_rejects_empty_body() {
        assert!(matches!(
            parse_reply(&json!({})),
            Err(GenerateError::MalformedResponse(_))
        ));
    }

    #[test]
    fn parse_suggestions_caps_at_three() {
        let body = wrap_text(r#"{"suggestions":["a","b","c","d","e"]}"#);
        assert_eq!(parse_suggestions(&body), vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_suggestions_swallows_malformed_payloads() {
        assert!(parse_suggestions(&json!({})).is_empty());
        assert!(parse_suggestions(&wrap_text("not json")).is_empty());
        assert!(parse_suggestions(&wrap_text(r#"{"suggestions":"nope"}"#)).is_empty());
    }
}
