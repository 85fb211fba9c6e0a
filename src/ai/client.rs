//! Gemini-backed AI collaborator.
//!
//! One conversation history per lobby, shared by everyone in it. Requests
//! for the same lobby are serialized by the per-lobby history lock, so the
//! wire history always alternates user/model turns; different lobbies talk
//! to the API concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ai::prompts::PRIMER_ACK;
use crate::ai::types::{
    AiError, ConversationHistory, GenerateContentRequest, GenerateContentResponse, Turn,
    WireContent,
};
use crate::common::time::Clock;

/// Conversation turns kept per lobby; older turns are dropped.
pub const MAX_CONTEXT_TURNS: usize = 20;

/// An untouched conversation is restarted from scratch after this long.
pub const CONTEXT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const GEMINI_MODEL: &str = "gemini-2.5-flash";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 会話型 AI コラボレーターのインターフェース
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AiAssistant: Send + Sync {
    /// Ask a question on behalf of `username` in `lobby`. `chatter` is the
    /// recent lobby conversation digest, `guideline` the effective
    /// personality prompt for the lobby.
    async fn ask(
        &self,
        question: &str,
        lobby: &str,
        username: &str,
        chatter: &str,
        guideline: &str,
    ) -> Result<String, AiError>;

    /// Drop the lobby's conversation history.
    async fn clear_conversation(&self, lobby: &str);
}

/// Gemini generateContent client with per-lobby conversation state.
pub struct GeminiClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    conversations: Mutex<HashMap<String, Arc<Mutex<ConversationHistory>>>>,
    clock: Arc<dyn Clock>,
}

impl GeminiClient {
    /// Build a client from the `GEMINI_API_KEY` environment variable.
    pub fn from_env(clock: Arc<dyn Clock>) -> Result<Self, AiError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or(AiError::NotConfigured)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            api_key,
            model: GEMINI_MODEL.to_string(),
            http,
            conversations: Mutex::new(HashMap::new()),
            clock,
        })
    }

    async fn conversation_for(&self, lobby: &str) -> Arc<Mutex<ConversationHistory>> {
        let mut conversations = self.conversations.lock().await;
        Arc::clone(conversations.entry(lobby.to_string()).or_default())
    }

    fn endpoint(&self) -> String {
        format!(
            "{GEMINI_API_BASE}/models/{model}:generateContent?key={key}",
            model = self.model,
            key = self.api_key
        )
    }
}

#[async_trait]
impl AiAssistant for GeminiClient {
    async fn ask(
        &self,
        question: &str,
        lobby: &str,
        username: &str,
        chatter: &str,
        guideline: &str,
    ) -> Result<String, AiError> {
        let conversation = self.conversation_for(lobby).await;
        let mut conversation = conversation.lock().await;

        let now = self.clock.now_millis();
        if now - conversation.last_active > CONTEXT_IDLE_TIMEOUT.as_millis() as i64 {
            conversation.turns.clear();
        }
        conversation.last_active = now;

        if conversation.turns.is_empty() {
            conversation.turns.push(Turn::user(primer_text(guideline, chatter)));
            conversation.turns.push(Turn::model(PRIMER_ACK));
        }

        conversation
            .turns
            .push(Turn::user(ask_prompt(chatter, username, question)));
        trim_turns(&mut conversation.turns, MAX_CONTEXT_TURNS);

        let request = GenerateContentRequest {
            contents: conversation.turns.iter().map(WireContent::from).collect(),
        };

        let response = self.http.post(self.endpoint()).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        let reply = parsed
            .first_text()
            .ok_or(AiError::EmptyResponse)?
            .to_string();
        conversation.turns.push(Turn::model(reply.clone()));
        Ok(reply)
    }

    async fn clear_conversation(&self, lobby: &str) {
        let mut conversations = self.conversations.lock().await;
        conversations.remove(lobby);
    }
}

/// First user turn of a fresh conversation: the lobby's personality prompt,
/// plus the current lobby chatter when there is any.
fn primer_text(guideline: &str, chatter: &str) -> String {
    if chatter.is_empty() {
        guideline.to_string()
    } else {
        format!("{guideline}\n\n{chatter}")
    }
}

/// The per-question prompt, attributing the question to its asker.
fn ask_prompt(chatter: &str, username: &str, question: &str) -> String {
    if chatter.is_empty() {
        format!("{username} asked: {question}")
    } else {
        format!("{chatter}\n{username} asked: {question}")
    }
}

/// Keep only the newest `max` turns.
fn trim_turns(turns: &mut Vec<Turn>, max: usize) {
    if turns.len() > max {
        turns.drain(..turns.len() - max);
    }
}
