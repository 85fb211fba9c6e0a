//! ユーザー名の値オブジェクト
//!
//! 接続中のクライアントを一意に識別する表示名。検証済みの値のみが
//! `Username` として存在できます（不正な値はコンストラクタで弾く）。

use thiserror::Error;

/// Minimum username length in characters
pub const MIN_USERNAME_LENGTH: usize = 2;
/// Maximum username length in characters
pub const MAX_USERNAME_LENGTH: usize = 20;

/// Username validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsernameError {
    /// Username is shorter than the minimum length
    #[error("Username too short (min {MIN_USERNAME_LENGTH} characters)")]
    TooShort,

    /// Username is longer than the maximum length
    #[error("Username too long (max {MAX_USERNAME_LENGTH} characters)")]
    TooLong,

    /// Username contains characters outside the allowed set
    #[error("Username can only contain letters, numbers, - and _")]
    InvalidCharacter,
}

/// 検証済みユーザー名
///
/// 許可される文字は英数字と `-` `_` のみ、長さは 2〜20 文字。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// Validate and construct a username from raw input.
    pub fn new(raw: &str) -> Result<Self, UsernameError> {
        let trimmed = raw.trim();
        let len = trimmed.chars().count();

        if len < MIN_USERNAME_LENGTH {
            return Err(UsernameError::TooShort);
        }
        if len > MAX_USERNAME_LENGTH {
            return Err(UsernameError::TooLong);
        }
        if !trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            return Err(UsernameError::InvalidCharacter);
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Get the username as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the value object, returning the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
