//! クライアントレジストリ
//!
//! ## 責務
//!
//! - 接続中クライアントの二方向インデックス（SessionId とユーザー名）を管理
//! - ユーザー名の予約（重複チェックと登録を 1 回のロック取得で行う）
//! - ロビー単位の同期配信（参加・退出通知、DM、タグ）と死んだ接続の回収
//!
//! ## 設計ノート
//!
//! 各クライアントへの配信は容量制限付きの `Sender<String>` 経由で行われ
//! ます。ソケットへの書き込みはクライアントごとの writer タスクが担当する
//! ため、レジストリのロックが I/O をまたいで保持されることはありません。
//! `try_send` が失敗するのは受信側が閉じた場合（writer タスクの終了）か
//! キューが満杯の場合（書き込みが詰まったままのクライアント）で、
//! どちらも dead peer として退場させます。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};

use crate::domain::{RegistryError, SessionId, Username};
use crate::server::format;

/// 接続中クライアントのレジストリエントリ
pub struct ClientEntry {
    /// Unique username, immutable for the session's lifetime
    pub username: String,
    /// Cosmetic profile glyph, mutable via `/sp`
    pub glyph: String,
    /// Current lobby, mutated only by the owning session (through this lock)
    pub lobby: String,
    /// Delivery endpoint feeding the session's writer task
    pub outbox: mpsc::Sender<String>,
}

/// Read-only copy of a client's visible state, safe to use after the lock
/// is released.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    pub username: String,
    pub glyph: String,
    pub lobby: String,
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<SessionId, ClientEntry>,
    by_username: HashMap<String, SessionId>,
}

/// インメモリのクライアントレジストリ実装
pub struct ClientRegistry {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Atomically reserve `username` and register the client.
    ///
    /// The uniqueness check and both index inserts happen under a single
    /// write-lock acquisition, so two sessions racing for the same name
    /// cannot both win.
    pub async fn try_register(
        &self,
        username: &Username,
        glyph: &str,
        lobby: &str,
        outbox: mpsc::Sender<String>,
    ) -> Result<SessionId, RegistryError> {
        let mut inner = self.inner.write().await;
        if inner.by_username.contains_key(username.as_str()) {
            return Err(RegistryError::UsernameTaken);
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        inner.by_username.insert(username.as_str().to_string(), id);
        inner.by_id.insert(
            id,
            ClientEntry {
                username: username.as_str().to_string(),
                glyph: glyph.to_string(),
                lobby: lobby.to_string(),
                outbox,
            },
        );
        Ok(id)
    }

    /// Remove a client from both indices, returning the removed entry so the
    /// caller can announce the departure. Idempotent: a second call for the
    /// same id returns `None`.
    pub async fn remove(&self, id: SessionId) -> Option<ClientEntry> {
        let mut inner = self.inner.write().await;
        let entry = inner.by_id.remove(&id)?;
        inner.by_username.remove(&entry.username);
        Some(entry)
    }

    /// Whether a currently-connected client holds `username`.
    pub async fn is_username_taken(&self, username: &str) -> bool {
        let inner = self.inner.read().await;
        inner.by_username.contains_key(username)
    }

    /// Number of currently-connected clients.
    pub async fn count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.by_id.len()
    }

    /// Visible state of one client.
    pub async fn snapshot(&self, id: SessionId) -> Option<ClientSnapshot> {
        let inner = self.inner.read().await;
        inner.by_id.get(&id).map(|entry| ClientSnapshot {
            username: entry.username.clone(),
            glyph: entry.glyph.clone(),
            lobby: entry.lobby.clone(),
        })
    }

    /// Snapshot of every client currently in `lobby`, safe to iterate without
    /// holding the lock.
    pub async fn users_in_lobby(&self, lobby: &str) -> Vec<ClientSnapshot> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .values()
            .filter(|entry| entry.lobby == lobby)
            .map(|entry| ClientSnapshot {
                username: entry.username.clone(),
                glyph: entry.glyph.clone(),
                lobby: entry.lobby.clone(),
            })
            .collect()
    }

    /// Number of clients currently in `lobby`.
    pub async fn lobby_member_count(&self, lobby: &str) -> usize {
        let inner = self.inner.read().await;
        inner
            .by_id
            .values()
            .filter(|entry| entry.lobby == lobby)
            .count()
    }

    /// Move a client to another lobby, returning the previous lobby name.
    pub async fn set_lobby(&self, id: SessionId, lobby: &str) -> Option<String> {
        let mut inner = self.inner.write().await;
        let entry = inner.by_id.get_mut(&id)?;
        let old = std::mem::replace(&mut entry.lobby, lobby.to_string());
        Some(old)
    }

    /// Change a client's profile glyph.
    pub async fn set_glyph(&self, id: SessionId, glyph: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.by_id.get_mut(&id) {
            Some(entry) => {
                entry.glyph = glyph.to_string();
                true
            }
            None => false,
        }
    }

    /// Point-to-point delivery by username (DMs, tag notifications). A peer
    /// whose outbox is closed or full is evicted and reported as not found.
    pub async fn push_to(&self, username: &str, line: String) -> Result<(), RegistryError> {
        let (id, outbox) = {
            let inner = self.inner.read().await;
            let id = *inner
                .by_username
                .get(username)
                .ok_or(RegistryError::UserNotFound)?;
            let outbox = inner
                .by_id
                .get(&id)
                .ok_or(RegistryError::UserNotFound)?
                .outbox
                .clone();
            (id, outbox)
        };

        if outbox.try_send(line).is_err() {
            self.evict(&[id]).await;
            return Err(RegistryError::UserNotFound);
        }
        Ok(())
    }

    /// Deliver an already-formatted line to every current member of `lobby`,
    /// evicting peers whose delivery channel is closed or full. Returns the
    /// number of members reached. One peer's failure never affects the others.
    pub async fn fan_out(&self, lobby: &str, line: &str) -> usize {
        let targets: Vec<(SessionId, mpsc::Sender<String>)> = {
            let inner = self.inner.read().await;
            inner
                .by_id
                .iter()
                .filter(|(_, entry)| entry.lobby == lobby)
                .map(|(id, entry)| (*id, entry.outbox.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, outbox) in targets {
            if outbox.try_send(line.to_string()).is_err() {
                dead.push(id);
            } else {
                delivered += 1;
            }
        }

        if !dead.is_empty() {
            self.evict(&dead).await;
        }
        delivered
    }

    /// Lobby-scoped service announcement ("has joined", "has left", AI
    /// traffic). Wraps the text in the `[LOBBY]` notice format.
    pub async fn broadcast_to_lobby(&self, lobby: &str, text: &str) -> usize {
        self.fan_out(lobby, &format::lobby_notice(text)).await
    }

    /// Remove the given sessions from both indices.
    pub async fn evict(&self, ids: &[SessionId]) -> Vec<ClientEntry> {
        let mut inner = self.inner.write().await;
        let mut removed = Vec::new();
        for id in ids {
            if let Some(entry) = inner.by_id.remove(id) {
                inner.by_username.remove(&entry.username);
                tracing::debug!("Evicted dead connection for '{}'", entry.username);
                removed.push(entry);
            }
        }
        removed
    }

    /// Drain the whole registry, returning every entry. Used at shutdown
    /// after the closing announcement has been delivered.
    pub async fn clear(&self) -> Vec<ClientEntry> {
        let mut inner = self.inner.write().await;
        inner.by_username.clear();
        inner.by_id.drain().map(|(_, entry)| entry).collect()
    }

    /// Outboxes of every connected client, for process-wide announcements.
    pub async fn all_outboxes(&self) -> Vec<mpsc::Sender<String>> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .values()
            .map(|entry| entry.outbox.clone())
            .collect()
    }
}
