//! ロビーレジストリ
//!
//! ## 責務
//!
//! - ロビーメタデータ（作成・参加検証・AI プロンプト設定）の管理
//! - ロビーごとの直近メッセージリングバッファ（履歴リプレイと AI 文脈の供給源）
//! - 放置されたコンテキストの定期回収
//!
//! ## 設計ノート
//!
//! コンテキストはロビーごとに `Arc<Mutex<LobbyContext>>` で分離されています。
//! 外側のマップロックは Arc の取得だけに使い、リングバッファの操作は
//! ロビー単位のロックで行うため、あるロビーへの書き込みが他のロビーの
//! 読み書きを妨げません。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::RwLock;

use crate::domain::{DEFAULT_LOBBY, Lobby, LobbyError, LobbyMessage};

/// ロビー 1 つ分の直近メッセージリングバッファ
#[derive(Debug, Default)]
pub struct LobbyContext {
    recent: VecDeque<LobbyMessage>,
}

impl LobbyContext {
    /// Unix millis of the newest entry, if any.
    fn newest_at(&self) -> Option<i64> {
        self.recent.back().map(|msg| msg.sent_at)
    }
}

/// ロビーメタデータとコンテキストのレジストリ
pub struct LobbyRegistry {
    lobbies: RwLock<HashMap<String, Lobby>>,
    contexts: RwLock<HashMap<String, Arc<Mutex<LobbyContext>>>>,
    /// Entries kept per ring buffer; older entries are dropped on insert
    capacity: usize,
}

impl LobbyRegistry {
    /// Create a registry seeded with the spawn lobby.
    pub fn new(capacity: usize) -> Self {
        let mut lobbies = HashMap::new();
        lobbies.insert(DEFAULT_LOBBY.to_string(), Lobby::general());
        Self {
            lobbies: RwLock::new(lobbies),
            contexts: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Create a new lobby. The name must be unused; the spawn lobby name is
    /// reserved.
    pub async fn create(
        &self,
        name: &str,
        password: &str,
        description: &str,
        creator: &str,
    ) -> Result<Lobby, LobbyError> {
        let mut lobbies = self.lobbies.write().await;
        if lobbies.contains_key(name) {
            return Err(LobbyError::AlreadyExists);
        }
        let lobby = Lobby::new(name, password, description, creator);
        lobbies.insert(name.to_string(), lobby.clone());
        Ok(lobby)
    }

    /// Validate a join request. Membership itself lives in the client
    /// registry; this only checks existence and password.
    pub async fn validate_join(&self, name: &str, password: &str) -> Result<(), LobbyError> {
        let lobbies = self.lobbies.read().await;
        let lobby = lobbies.get(name).ok_or(LobbyError::NotFound)?;
        if !lobby.accepts_password(password) {
            return Err(LobbyError::IncorrectPassword);
        }
        Ok(())
    }

    /// Metadata for one lobby.
    pub async fn get(&self, name: &str) -> Option<Lobby> {
        let lobbies = self.lobbies.read().await;
        lobbies.get(name).cloned()
    }

    /// Snapshot of every lobby's metadata.
    pub async fn all(&self) -> Vec<Lobby> {
        let lobbies = self.lobbies.read().await;
        lobbies.values().cloned().collect()
    }

    /// Set a lobby's custom AI prompt. Only the creator may do this and the
    /// spawn lobby always keeps the default personality.
    pub async fn set_ai_prompt(
        &self,
        name: &str,
        username: &str,
        prompt: &str,
    ) -> Result<(), LobbyError> {
        let mut lobbies = self.lobbies.write().await;
        let lobby = lobbies.get_mut(name).ok_or(LobbyError::NotFound)?;
        if name == DEFAULT_LOBBY {
            return Err(LobbyError::GeneralIsReserved);
        }
        if lobby.creator != username {
            return Err(LobbyError::NotCreator);
        }
        lobby.ai_prompt = Some(prompt.to_string());
        Ok(())
    }

    /// The lobby's custom AI prompt, or `None` when the default applies.
    pub async fn ai_prompt(&self, name: &str) -> Option<String> {
        let lobbies = self.lobbies.read().await;
        lobbies.get(name).and_then(|lobby| lobby.ai_prompt.clone())
    }

    /// Append a message to the lobby's ring buffer, creating the context on
    /// first use and dropping the oldest entry when the buffer is full.
    pub async fn store_message(&self, lobby: &str, message: LobbyMessage) {
        let context = self.context_for(lobby).await;
        let mut context = context.lock().unwrap_or_else(|e| e.into_inner());
        context.recent.push_back(message);
        while context.recent.len() > self.capacity {
            context.recent.pop_front();
        }
    }

    /// Entries no older than `max_age` relative to `now`, oldest first.
    pub async fn recent_messages(
        &self,
        lobby: &str,
        max_age: Duration,
        now_millis: i64,
    ) -> Vec<LobbyMessage> {
        let context = {
            let contexts = self.contexts.read().await;
            match contexts.get(lobby) {
                Some(context) => Arc::clone(context),
                None => return Vec::new(),
            }
        };
        let cutoff = now_millis - max_age.as_millis() as i64;
        let context = context.lock().unwrap_or_else(|e| e.into_inner());
        context
            .recent
            .iter()
            .filter(|msg| msg.sent_at >= cutoff)
            .cloned()
            .collect()
    }

    /// Recent lobby chatter rendered as plain `username: text` lines, fed to
    /// the AI collaborator as ambient context. Empty when nothing was said.
    pub async fn chatter_digest(&self, lobby: &str) -> String {
        let context = {
            let contexts = self.contexts.read().await;
            match contexts.get(lobby) {
                Some(context) => Arc::clone(context),
                None => return String::new(),
            }
        };
        let context = context.lock().unwrap_or_else(|e| e.into_inner());
        context
            .recent
            .iter()
            .map(|msg| format!("{}: {}\n", msg.username, msg.text))
            .collect()
    }

    /// Drop contexts whose newest entry is older than `idle_timeout`. The
    /// spawn lobby's context is never swept. Returns the swept lobby names.
    pub async fn sweep_idle_contexts(
        &self,
        idle_timeout: Duration,
        now_millis: i64,
    ) -> Vec<String> {
        let cutoff = now_millis - idle_timeout.as_millis() as i64;
        let mut contexts = self.contexts.write().await;
        let stale: Vec<String> = contexts
            .iter()
            .filter(|(name, _)| name.as_str() != DEFAULT_LOBBY)
            .filter(|(_, context)| {
                let context = context.lock().unwrap_or_else(|e| e.into_inner());
                matches!(context.newest_at(), Some(newest) if newest < cutoff)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in &stale {
            contexts.remove(name);
            tracing::info!("Swept idle context for lobby '{}'", name);
        }
        stale
    }

    async fn context_for(&self, lobby: &str) -> Arc<Mutex<LobbyContext>> {
        {
            let contexts = self.contexts.read().await;
            if let Some(context) = contexts.get(lobby) {
                return Arc::clone(context);
            }
        }
        let mut contexts = self.contexts.write().await;
        Arc::clone(contexts.entry(lobby.to_string()).or_default())
    }
}
