//! ロビー（チャットルーム）のドメインモデル
//!
//! ロビーのメタデータはプロセスの生存期間中保持されます。
//! 直近メッセージのバッファはロビーレジストリ側で管理され、
//! 一定時間アイドルなロビーのバッファのみ回収されます。

use thiserror::Error;

/// Name of the default lobby every client starts in. It exists from server
/// startup, is never deleted and rejects custom AI prompt overrides.
pub const DEFAULT_LOBBY: &str = "general";

/// Lobby registry errors, surfaced to the requesting client as a chat line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LobbyError {
    /// A lobby with the same name already exists
    #[error("Lobby already exists!")]
    AlreadyExists,

    /// The requested lobby does not exist
    #[error("Lobby does not exist!")]
    NotFound,

    /// Wrong password supplied for a private lobby
    #[error("Incorrect password for private lobby!")]
    IncorrectPassword,

    /// Only the lobby creator may change the AI prompt
    #[error("Only the lobby creator can set the AI prompt")]
    NotCreator,

    /// The default lobby keeps the built-in AI personality
    #[error("Cannot set prompt for the general lobby")]
    GeneralIsReserved,
}

/// チャットロビーのメタデータ
#[derive(Debug, Clone)]
pub struct Lobby {
    /// Unique, case-sensitive lobby name
    pub name: String,
    /// Derived: a non-empty password makes the lobby private
    pub is_private: bool,
    /// Password compared exactly on join (empty for public lobbies)
    password: String,
    /// Username of the creator at creation time
    pub creator: String,
    /// Free-form description shown in `/lobbies`
    pub description: String,
    /// Custom AI prompt override (`None` = built-in default personality)
    pub ai_prompt: Option<String>,
}

impl Lobby {
    /// Create a new lobby. Privacy is derived from the password.
    pub fn new(name: &str, password: &str, description: &str, creator: &str) -> Self {
        Self {
            name: name.to_string(),
            is_private: !password.is_empty(),
            password: password.to_string(),
            creator: creator.to_string(),
            description: description.to_string(),
            ai_prompt: None,
        }
    }

    /// The default lobby created at server startup.
    pub fn general() -> Self {
        Self::new(
            DEFAULT_LOBBY,
            "",
            "Welcome to the General Lobby — this is where everyone spawns when they enter the server.",
            "server",
        )
    }

    /// Exact password check. Public lobbies accept anything.
    pub fn accepts_password(&self, supplied: &str) -> bool {
        !self.is_private || self.password == supplied
    }
}

/// ロビーの直近メッセージ（リングバッファの 1 エントリ）
#[derive(Debug, Clone)]
pub struct LobbyMessage {
    /// Sender's username
    pub username: String,
    /// Sender's profile glyph at send time
    pub glyph: String,
    /// Message text
    pub text: String,
    /// Unix timestamp in milliseconds
    pub sent_at: i64,
}
