//! End-to-end tests driving the chat server over real TCP connections.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use idobata::common::time::SystemClock;
use idobata::server::{Server, ServerConfig, ServerHandle};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Start an in-process server on a free port.
async fn start_server(config: ServerConfig) -> ServerHandle {
    let config = ServerConfig { port: 0, ..config };
    Server::with_parts(config, Arc::new(SystemClock), None)
        .start()
        .await
        .expect("failed to start test server")
}

/// Raw TCP client. Prompts are not newline-terminated and output carries
/// ANSI colors, so assertions read bytes until a plain substring shows up.
struct TestClient {
    stream: TcpStream,
    buffer: String,
}

impl TestClient {
    async fn connect(handle: &ServerHandle) -> Self {
        let stream = TcpStream::connect(handle.local_addr())
            .await
            .expect("failed to connect");
        Self {
            stream,
            buffer: String::new(),
        }
    }

    /// Connect and complete username negotiation.
    async fn join(handle: &ServerHandle, username: &str) -> Self {
        let mut client = Self::connect(handle).await;
        client.expect_contains("Enter your username:").await;
        client.send_line(username).await;
        client.expect_contains("has joined the lobby").await;
        client
    }

    async fn send_line(&mut self, line: &str) {
        self.stream
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("failed to write");
    }

    /// Read until the accumulated output contains `needle`.
    async fn expect_contains(&mut self, needle: &str) {
        let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
        let mut chunk = [0u8; 4096];
        while !self.buffer.contains(needle) {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                panic!("timed out waiting for {needle:?}; got so far: {:?}", self.buffer);
            }
            match timeout(remaining, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) => panic!("connection closed waiting for {needle:?}"),
                Ok(Ok(n)) => self.buffer.push_str(&String::from_utf8_lossy(&chunk[..n])),
                Ok(Err(err)) => panic!("read error waiting for {needle:?}: {err}"),
                Err(_) => panic!("timed out waiting for {needle:?}; got so far: {:?}", self.buffer),
            }
        }
        // Consume everything up to and including the match so later
        // expectations see only newer output.
        if let Some(pos) = self.buffer.find(needle) {
            self.buffer.drain(..pos + needle.len());
        }
    }

    /// Read for `window` and assert `needle` never shows up.
    async fn expect_absent(&mut self, needle: &str, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        let mut chunk = [0u8; 4096];
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => self.buffer.push_str(&String::from_utf8_lossy(&chunk[..n])),
                _ => break,
            }
        }
        assert!(
            !self.buffer.contains(needle),
            "unexpected {needle:?} in output: {:?}",
            self.buffer
        );
    }
}

#[tokio::test]
async fn test_two_clients_chat_in_general() {
    // テスト項目: general ロビーで 2 クライアントがメッセージを交換できる
    // given (前提条件):
    let handle = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::join(&handle, "alice").await;
    let mut bob = TestClient::join(&handle, "bob").await;
    alice.expect_contains("bob").await; // bob の入室通知

    // when (操作):
    alice.send_line("hello bob").await;

    // then (期待する結果): 双方に配信される
    bob.expect_contains("hello bob").await;
    alice.expect_contains("hello bob").await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_username_must_pick_another() {
    // テスト項目: 使用中のユーザー名は拒否され、別名で入室できる
    // given (前提条件):
    let handle = start_server(ServerConfig::default()).await;
    let _alice = TestClient::join(&handle, "alice").await;

    // when (操作):
    let mut impostor = TestClient::connect(&handle).await;
    impostor.expect_contains("Enter your username:").await;
    impostor.send_line("alice").await;

    // then (期待する結果):
    impostor
        .expect_contains("Username already taken, try another.")
        .await;
    impostor.expect_contains("Enter your username:").await;
    impostor.send_line("bob").await;
    impostor.expect_contains("has joined the lobby").await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_invalid_username_rejected() {
    // テスト項目: 不正な文字を含むユーザー名は再入力を求められる
    let handle = start_server(ServerConfig::default()).await;
    let mut client = TestClient::connect(&handle).await;
    client.expect_contains("Enter your username:").await;

    client.send_line("bad name!").await;
    client
        .expect_contains("Username can only contain letters, numbers, - and _")
        .await;
    client.send_line("a").await;
    client.expect_contains("Username too short").await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_private_lobby_password_flow() {
    // テスト項目: private ロビーは誤パスワードを拒否し、正パスワードで入れる
    // given (前提条件):
    let handle = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::join(&handle, "alice").await;
    let mut bob = TestClient::join(&handle, "bob").await;
    alice.expect_contains("bob").await;

    alice.send_line("/create den hunter2 the hideout").await;
    alice.expect_contains("Created private lobby 'den'").await;
    alice.send_line("/join den hunter2").await;
    alice.expect_contains("Joined lobby 'den'").await;

    // when (操作):
    bob.send_line("/join den wrong").await;
    bob.expect_contains("Incorrect password for private lobby!")
        .await;
    bob.send_line("/join den hunter2").await;
    bob.expect_contains("Joined lobby 'den'").await;

    // then (期待する結果): den 内の発言は den のメンバーに届く
    alice.send_line("welcome to the den").await;
    bob.expect_contains("welcome to the den").await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_sixth_message_rate_limited_and_not_delivered() {
    // テスト項目: ウィンドウ内 6 通目は拒否され、他クライアントに届かない
    // given (前提条件):
    let handle = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::join(&handle, "alice").await;
    let mut bob = TestClient::join(&handle, "bob").await;
    alice.expect_contains("bob").await;

    // when (操作): 5 通は通り、6 通目で制限に当たる
    for i in 1..=5 {
        alice.send_line(&format!("msg{i}")).await;
    }
    alice.send_line("msg6").await;

    // then (期待する結果):
    alice.expect_contains("Rate limited!").await;
    bob.expect_contains("msg5").await;
    bob.expect_absent("msg6", Duration::from_millis(500)).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_connection_cap_per_ip() {
    // テスト項目: 同一 IP からの 11 本目の接続は拒否される
    // given (前提条件): 既定の上限（10）で起動し、10 本を受け入れさせる
    let handle = start_server(ServerConfig::default()).await;
    let mut held = Vec::new();
    for _ in 0..10 {
        let mut client = TestClient::connect(&handle).await;
        // プロンプトの受信をもって入場処理の完了を確認する
        client.expect_contains("Enter your username:").await;
        held.push(client);
    }

    // when (操作):
    let mut eleventh = TestClient::connect(&handle).await;

    // then (期待する結果):
    eleventh
        .expect_contains("Too many connections from your IP. Try again later.")
        .await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_oversized_line_rejected_but_session_survives() {
    // テスト項目: 上限超過の行は拒否され、その後の発言は普通に届く
    // given (前提条件):
    let handle = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::join(&handle, "alice").await;
    let mut bob = TestClient::join(&handle, "bob").await;
    alice.expect_contains("bob").await;

    // when (操作): 上限（1000 文字）をはるかに超える 1 行を送る
    let oversized = "a".repeat(6000);
    alice.send_line(&oversized).await;

    // then (期待する結果): 拒否され、バッファもされず、接続は生きている
    alice.expect_contains("Message too long").await;
    alice.send_line("still here").await;
    bob.expect_contains("still here").await;
    bob.expect_absent("aaaa", Duration::from_millis(300)).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_quit_announces_departure() {
    // テスト項目: /quit で切断され、退出がロビーに通知される
    // given (前提条件):
    let handle = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::join(&handle, "alice").await;
    let mut bob = TestClient::join(&handle, "bob").await;
    alice.expect_contains("bob").await;

    // when (操作):
    bob.send_line("/quit").await;

    // then (期待する結果):
    bob.expect_contains("Goodbye!").await;
    alice.expect_contains("bob").await;
    alice.expect_contains("has left the lobby").await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_join_replays_recent_history() {
    // テスト項目: 後から /join したクライアントに直近の発言がリプレイされる
    // given (前提条件):
    let handle = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::join(&handle, "alice").await;
    alice.send_line("/create attic a-roomy-loft").await;
    alice.expect_contains("Created public lobby 'attic'").await;
    alice.send_line("/join attic").await;
    alice.expect_contains("Joined lobby 'attic'").await;
    alice.send_line("remember this").await;
    alice.expect_contains("remember this").await;

    // when (操作):
    let mut bob = TestClient::join(&handle, "bob").await;
    bob.send_line("/join attic").await;

    // then (期待する結果):
    bob.expect_contains("Joined lobby 'attic'").await;
    bob.expect_contains("remember this").await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_graceful_shutdown_notifies_clients() {
    // テスト項目: シャットダウン時に接続中クライアントへ通知される
    // given (前提条件):
    let handle = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::join(&handle, "alice").await;

    // when (操作):
    handle.shutdown().await;

    // then (期待する結果):
    alice.expect_contains("Server is shutting down").await;
}
