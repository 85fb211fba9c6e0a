//! ドメインモデル定義
//!
//! チャットサーバーの中心となる値オブジェクトとエンティティを定義します。
//! ここにはトランスポートやストレージへの依存を持ち込まないこと。

mod error;
mod lobby;
mod message;
mod username;

pub use error::RegistryError;
pub use lobby::{DEFAULT_LOBBY, Lobby, LobbyError, LobbyMessage};
pub use message::{OutboundMessage, SessionId};
pub use username::{Username, UsernameError};
