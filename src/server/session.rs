//! 接続 1 本分のセッションライフサイクル
//!
//! ## 責務
//!
//! - 入場管理（IP 上限）とウェルカムバナーの送出
//! - ユーザー名ネゴシエーションとレジストリへの登録
//! - 読み取りループ（コマンド委譲・レート制限・ブロードキャスト投入）
//! - 切断時の後片付け（レジストリ削除・退出通知・スロット返却）
//!
//! ## 設計ノート
//!
//! ソケットへの書き込みはセッション専属の writer タスクに集約されます。
//! 他のタスクは容量制限付きの `Sender<String>` 経由でしか書き込めないため、
//! 遅いクライアントがレジストリや他のセッションを巻き込むことはありません。
//! キューを溢れさせたクライアントは dead peer としてレジストリから
//! 退場させられます。

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{mpsc, watch};

use crate::domain::{
    DEFAULT_LOBBY, LobbyMessage, OutboundMessage, SessionId, Username, UsernameError,
};
use crate::server::commands::CommandOutcome;
use crate::server::format;
use crate::server::line_reader::{LineReader, ReadLine};
use crate::server::rate_limit::RateWindow;
use crate::server::runner::ServerState;

/// Drive one client connection from accept to teardown.
pub async fn run_session(
    state: Arc<ServerState>,
    stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let Some(_guard) = state.admission.try_admit(peer.ip()) else {
        tracing::warn!("Rejected connection from {} (per-IP cap reached)", peer);
        let mut stream = stream;
        let _ = stream
            .write_all(
                format::error_line("Too many connections from your IP. Try again later.")
                    .as_bytes(),
            )
            .await;
        return;
    };
    tracing::debug!("Accepted connection from {}", peer);

    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<String>(state.config.client_outbox_capacity);

    // Writer task: sole owner of the write half. Runs until every sender is
    // gone, which also flushes whatever goodbye is still queued.
    let writer = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if write_half.write_all(chunk.as_bytes()).await.is_err() {
                break;
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
    });

    // Lines are read through a hard byte cap so a client streaming bytes
    // without a newline cannot grow server memory. Four bytes per allowed
    // character covers any UTF-8 input of valid length; the character-count
    // check in the read loop enforces the exact limit.
    let mut lines = LineReader::new(
        BufReader::new(read_half),
        state.config.max_line_length * 4,
    );
    let _ = tx.try_send(format::welcome_banner());

    let Some((session_id, username)) =
        negotiate_username(&state, &mut lines, &tx, &mut shutdown).await
    else {
        drop(tx);
        let _ = writer.await;
        return;
    };
    tracing::info!(
        "{} connected to the server (lobby: {})",
        username,
        DEFAULT_LOBBY
    );

    state
        .registry
        .broadcast_to_lobby(DEFAULT_LOBBY, &format::joined_announcement(username.as_str()))
        .await;

    // Replay what was recently said so the newcomer has context.
    let now = state.clock.now_millis();
    for msg in state
        .lobbies
        .recent_messages(DEFAULT_LOBBY, state.config.connect_replay_window, now)
        .await
    {
        let _ = tx.try_send(format::chat_message(
            &msg.glyph,
            &msg.username,
            &msg.text,
            msg.sent_at,
            now,
        ));
    }

    read_loop(&state, session_id, &mut lines, &tx, &mut shutdown).await;

    // Teardown is idempotent against broadcaster-side eviction: whoever
    // removes the entry first announces the departure.
    if let Some(entry) = state.registry.remove(session_id).await {
        tracing::info!("{} disconnected from the server", entry.username);
        state
            .registry
            .broadcast_to_lobby(&entry.lobby, &format::left_announcement(&entry.username))
            .await;
    }
    drop(tx);
    let _ = writer.await;
}

/// Prompt until the client supplies a valid, unreserved username. Returns
/// `None` when the connection ends or the server shuts down first.
async fn negotiate_username(
    state: &Arc<ServerState>,
    lines: &mut LineReader<BufReader<OwnedReadHalf>>,
    tx: &mpsc::Sender<String>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<(SessionId, Username)> {
    loop {
        let _ = tx.try_send(format::username_prompt());
        let raw = tokio::select! {
            _ = shutdown.changed() => return None,
            read = lines.next_line() => match read {
                Ok(ReadLine::Line(line)) => line,
                Ok(ReadLine::TooLong) => {
                    let _ = tx.try_send(format::error_line(
                        &UsernameError::TooLong.to_string(),
                    ));
                    continue;
                }
                _ => return None,
            },
        };

        let username = match Username::new(&raw) {
            Ok(username) => username,
            Err(err) => {
                let _ = tx.try_send(format::error_line(&err.to_string()));
                continue;
            }
        };

        match state
            .registry
            .try_register(&username, format::DEFAULT_GLYPH, DEFAULT_LOBBY, tx.clone())
            .await
        {
            Ok(id) => return Some((id, username)),
            Err(err) => {
                let _ = tx.try_send(format::error_line(&err.to_string()));
            }
        }
    }
}

async fn read_loop(
    state: &Arc<ServerState>,
    session_id: SessionId,
    lines: &mut LineReader<BufReader<OwnedReadHalf>>,
    tx: &mpsc::Sender<String>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let mut window = RateWindow::new(state.clock.now_millis());

    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => break,
            read = lines.next_line() => match read {
                Ok(ReadLine::Line(line)) => line,
                Ok(ReadLine::TooLong) => {
                    let _ = tx.try_send(format::error_line(&format!(
                        "Message too long (max {} chars)",
                        state.config.max_line_length
                    )));
                    continue;
                }
                _ => break,
            },
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.chars().count() > state.config.max_line_length {
            let _ = tx.try_send(format::error_line(&format!(
                "Message too long (max {} chars)",
                state.config.max_line_length
            )));
            continue;
        }

        if text.starts_with('/') {
            let outcome = state.commands.handle(session_id, &mut window, tx, text).await;
            if outcome == CommandOutcome::Disconnect {
                break;
            }
            continue;
        }

        let now = state.clock.now_millis();
        if let Err(err) = state.limiter.check(&mut window, now) {
            let _ = tx.try_send(format::rate_warning(&err.to_string()));
            continue;
        }
        state.limiter.record(&mut window, now);

        let Some(me) = state.registry.snapshot(session_id).await else {
            break;
        };
        state
            .lobbies
            .store_message(
                &me.lobby,
                LobbyMessage {
                    username: me.username.clone(),
                    glyph: me.glyph.clone(),
                    text: text.to_string(),
                    sent_at: now,
                },
            )
            .await;
        state
            .broadcaster
            .enqueue(OutboundMessage {
                sender: me.username,
                glyph: me.glyph,
                lobby: me.lobby,
                text: text.to_string(),
                sent_at: now,
            })
            .await;
    }
}
