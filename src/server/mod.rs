//! サーバーレイヤー
//!
//! TCP 接続の受け入れからコマンド処理・配信までを担当します。
//! ドメインモデルは `crate::domain`、AI コラボレーターは `crate::ai` を参照。

pub mod admission;
pub mod broadcast;
pub mod commands;
pub mod config;
pub mod format;
pub mod line_reader;
pub mod lobby_registry;
pub mod rate_limit;
pub mod registry;
pub mod runner;
pub mod session;
pub mod signal;

pub use config::ServerConfig;
pub use runner::{Server, ServerHandle};
