//! AI コラボレーターレイヤー
//!
//! ロビー単位の会話履歴を持つ Gemini クライアントと、その差し替えを
//! 可能にするトレイトを提供します。API キーが設定されていない場合、
//! サーバーはこのレイヤーなしで動作します。

mod client;
mod prompts;
mod types;

pub use client::{AiAssistant, CONTEXT_IDLE_TIMEOUT, GeminiClient, MAX_CONTEXT_TURNS};
pub use prompts::{DEFAULT_GUIDELINE, PRIMER_ACK};
pub use types::{AiError, ConversationHistory, Role, Turn, user_facing_ai_error};

#[cfg(test)]
pub use client::MockAiAssistant;
