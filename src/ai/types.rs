//! AI コラボレーター関連の型定義
//!
//! 会話履歴のドメイン表現と Gemini generateContent API のワイヤ型を
//! 定義します。ワイヤ型はこのモジュールの外に漏らさないこと。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// AI リクエストのエラー型
#[derive(Debug, Error)]
pub enum AiError {
    /// No API key was configured at startup
    #[error("AI API Key not configured")]
    NotConfigured,

    /// Transport-level failure (connect, timeout, body read)
    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// A success response carried no usable text
    #[error("no text in response")]
    EmptyResponse,

    /// A success response could not be decoded
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Map an AI failure to the short, user-facing line shown in chat.
/// Details stay in the server log.
pub fn user_facing_ai_error(err: &AiError) -> &'static str {
    let detail = err.to_string();
    if detail.contains("rate limit") {
        "AI Error: Rate limit reached. Please wait and try again."
    } else if detail.contains("quota") {
        "AI Error: Quota reached. Try later."
    } else if detail.contains("invalid prompt") {
        "AI Error: Your prompt is invalid."
    } else {
        "AI Error: Please try again later."
    }
}

/// 会話ターンの話者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// 会話履歴の 1 ターン
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// ロビーごとの AI 会話履歴
#[derive(Debug, Default)]
pub struct ConversationHistory {
    pub turns: Vec<Turn>,
    /// Unix millis of the last request touching this conversation
    pub last_active: i64,
}

// --- Gemini generateContent wire types ---

#[derive(Debug, Serialize)]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<WireContent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireContent {
    pub role: Role,
    pub parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WirePart {
    pub text: String,
}

impl From<&Turn> for WireContent {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            parts: vec![WirePart {
                text: turn.text.clone(),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Candidate {
    pub content: CandidateContent,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

impl GenerateContentResponse {
    /// First candidate's first part, the reply text.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.as_str())
    }
}
