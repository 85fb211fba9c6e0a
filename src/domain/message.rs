//! ブロードキャスト用メッセージのドメインモデル

/// Opaque identifier for one client session, allocated at registration.
///
/// 接続（セッション）ごとに 1 つ割り当てられる ID。レジストリの
/// コネクション側インデックスのキーとして使用します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A chat message in flight towards the broadcaster.
///
/// This is a snapshot taken at send time: the sender's name, glyph and
/// *origin lobby* are frozen here, while destination membership is resolved
/// live when the broadcaster delivers. A sender that switches lobbies before
/// delivery therefore does not receive its own message in the old lobby.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Sender's username at send time
    pub sender: String,
    /// Sender's profile glyph at send time
    pub glyph: String,
    /// The lobby the sender was in when the message was sent
    pub lobby: String,
    /// Raw message text
    pub text: String,
    /// Unix timestamp in milliseconds at send time
    pub sent_at: i64,
}
