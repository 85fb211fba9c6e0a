//! スラッシュコマンドのディスパッチャ
//!
//! ## 責務
//!
//! - `/` で始まる入力行の解釈と各レジストリへの委譲
//! - `/quit` 以外の全コマンドへのレート制限の適用
//! - コマンド結果のクライアントへの返信とロビーへの通知
//!
//! ## 設計ノート
//!
//! ハンドラはセッションタスクの上で直接実行されます。AI への問い合わせも
//! ここで await するため、質問中のクライアントは自分の返信を待ちますが、
//! 他のクライアントには影響しません。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::ai::{AiAssistant, DEFAULT_GUIDELINE, user_facing_ai_error};
use crate::common::time::Clock;
use crate::domain::{LobbyMessage, SessionId};
use crate::server::config::ServerConfig;
use crate::server::format;
use crate::server::lobby_registry::LobbyRegistry;
use crate::server::rate_limit::{RateLimiter, RateWindow};
use crate::server::registry::{ClientRegistry, ClientSnapshot};

/// What the session loop should do after a command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Disconnect,
}

/// コマンドハンドラ（依存をまとめて保持する）
pub struct CommandHandler {
    registry: Arc<ClientRegistry>,
    lobbies: Arc<LobbyRegistry>,
    ai: Option<Arc<dyn AiAssistant>>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    config: ServerConfig,
}

impl CommandHandler {
    pub fn new(
        registry: Arc<ClientRegistry>,
        lobbies: Arc<LobbyRegistry>,
        ai: Option<Arc<dyn AiAssistant>>,
        clock: Arc<dyn Clock>,
        config: ServerConfig,
    ) -> Self {
        Self {
            registry,
            lobbies,
            ai,
            limiter: RateLimiter::new(config.rate_limit_budget, config.rate_limit_window),
            clock,
            config,
        }
    }

    /// Handle one slash command from `session`. `reply` is the caller's own
    /// outbox; `window` its rate-limiter state.
    pub async fn handle(
        &self,
        session: SessionId,
        window: &mut RateWindow,
        reply: &mpsc::Sender<String>,
        line: &str,
    ) -> CommandOutcome {
        // /quit always works, even while rate limited.
        if line == "/quit" {
            send(reply, format::goodbye());
            return CommandOutcome::Disconnect;
        }

        let now = self.clock.now_millis();
        if let Err(err) = self.limiter.check(window, now) {
            send(reply, format::rate_warning(&err.to_string()));
            return CommandOutcome::Continue;
        }
        self.limiter.record(window, now);

        let Some(me) = self.registry.snapshot(session).await else {
            return CommandOutcome::Disconnect;
        };

        match line {
            "/users" => self.show_users(reply, &me).await,
            "/help" => send(reply, format::help_text()),
            "/lobbies" => self.show_lobbies(reply).await,
            "/ai clear" => self.clear_ai(reply, &me).await,
            "/showai" => self.show_ai_prompt(reply, &me).await,
            _ if line.starts_with("/ai ") => {
                self.ask_ai(reply, &me, line.trim_start_matches("/ai ").trim())
                    .await
            }
            _ if line.starts_with("/msg ") => {
                self.private_message(reply, &me, &line["/msg ".len()..]).await
            }
            _ if line.starts_with("/tag ") => {
                self.tag(reply, &me, &line["/tag ".len()..]).await
            }
            _ if line.starts_with("/setai ") => {
                self.set_ai_prompt(reply, &me, line["/setai ".len()..].trim())
                    .await
            }
            _ if line.starts_with("/create ") => {
                self.create_lobby(reply, &me, line["/create ".len()..].trim())
                    .await
            }
            _ if line.starts_with("/join ") => {
                self.join_lobby(session, reply, &me, line["/join ".len()..].trim())
                    .await
            }
            _ if line.starts_with("/sp") => {
                self.set_profile(session, reply, line["/sp".len()..].trim())
                    .await
            }
            _ => send(
                reply,
                format::error_line("Unknown command. Type /help for available commands."),
            ),
        }
        CommandOutcome::Continue
    }

    async fn show_users(&self, reply: &mpsc::Sender<String>, me: &ClientSnapshot) {
        let users: Vec<(String, String)> = self
            .registry
            .users_in_lobby(&me.lobby)
            .await
            .into_iter()
            .map(|user| (user.glyph, user.username))
            .collect();
        send(reply, format::user_list(&me.lobby, &users));
    }

    async fn show_lobbies(&self, reply: &mpsc::Sender<String>) {
        let mut listings = Vec::new();
        for lobby in self.lobbies.all().await {
            let member_count = self.registry.lobby_member_count(&lobby.name).await;
            listings.push(format::LobbyListing {
                has_custom_ai: lobby.ai_prompt.is_some(),
                name: lobby.name,
                is_private: lobby.is_private,
                creator: lobby.creator,
                description: lobby.description,
                member_count,
            });
        }
        listings.sort_by(|a, b| a.name.cmp(&b.name));
        send(reply, format::lobby_list(&listings));
    }

    async fn ask_ai(
        &self,
        reply: &mpsc::Sender<String>,
        me: &ClientSnapshot,
        question: &str,
    ) {
        if question.is_empty() {
            send(reply, format::error_line("Usage: /ai <your question>"));
            return;
        }
        if question.chars().count() > self.config.max_line_length {
            send(
                reply,
                format::error_line(&format!(
                    "AI question too long. Max: {} characters",
                    self.config.max_line_length
                )),
            );
            return;
        }
        let Some(ai) = &self.ai else {
            send(reply, format::error_line("AI API Key not configured"));
            return;
        };

        send(reply, format::ai_thinking());
        self.registry
            .broadcast_to_lobby(
                &me.lobby,
                &format::ai_question_announcement(&me.username, question),
            )
            .await;

        let guideline = self
            .lobbies
            .ai_prompt(&me.lobby)
            .await
            .unwrap_or_else(|| DEFAULT_GUIDELINE.to_string());
        let chatter = self.lobbies.chatter_digest(&me.lobby).await;

        match ai
            .ask(question, &me.lobby, &me.username, &chatter, &guideline)
            .await
        {
            Ok(answer) => {
                self.registry
                    .broadcast_to_lobby(
                        &me.lobby,
                        &format::ai_response_announcement(&me.username, &answer),
                    )
                    .await;
            }
            Err(err) => {
                tracing::error!("AI error for user '{}': {}", me.username, err);
                send(reply, format::error_line(user_facing_ai_error(&err)));
            }
        }
    }

    async fn clear_ai(&self, reply: &mpsc::Sender<String>, me: &ClientSnapshot) {
        let Some(ai) = &self.ai else {
            send(reply, format::error_line("AI API Key not configured"));
            return;
        };
        ai.clear_conversation(&me.lobby).await;
        send(
            reply,
            format::success_line("AI conversation history cleared."),
        );
    }

    async fn show_ai_prompt(&self, reply: &mpsc::Sender<String>, me: &ClientSnapshot) {
        let prompt = self.lobbies.ai_prompt(&me.lobby).await;
        send(reply, format::ai_prompt_display(&me.lobby, prompt.as_deref()));
    }

    async fn set_ai_prompt(
        &self,
        reply: &mpsc::Sender<String>,
        me: &ClientSnapshot,
        prompt: &str,
    ) {
        if prompt.is_empty() {
            send(reply, format::error_line("Usage: /setai <prompt>"));
            return;
        }
        if let Err(err) = self
            .lobbies
            .set_ai_prompt(&me.lobby, &me.username, prompt)
            .await
        {
            send(reply, format::error_line(&err.to_string()));
            return;
        }
        // A new personality starts from a clean conversation.
        if let Some(ai) = &self.ai {
            ai.clear_conversation(&me.lobby).await;
        }
        send(reply, format::success_line("AI prompt updated!"));
        self.registry
            .broadcast_to_lobby(
                &me.lobby,
                &format!(
                    "{}{}{} updated the AI prompt",
                    format::YELLOW,
                    me.username,
                    format::RESET
                ),
            )
            .await;
    }

    async fn private_message(
        &self,
        reply: &mpsc::Sender<String>,
        me: &ClientSnapshot,
        args: &str,
    ) {
        let Some((target, text)) = args.split_once(' ') else {
            send(reply, format::error_line("Usage: /msg <username> <message>"));
            return;
        };
        if self
            .registry
            .push_to(target, format::dm_to_target(&me.username, text))
            .await
            .is_err()
        {
            send(reply, format::error_line("User not found."));
            return;
        }
        send(reply, format::dm_to_sender(target, text));
    }

    async fn tag(
        &self,
        reply: &mpsc::Sender<String>,
        me: &ClientSnapshot,
        args: &str,
    ) {
        let Some((target, text)) = args.split_once(' ') else {
            send(reply, format::error_line("Usage: /tag <username> <message>"));
            return;
        };
        if !self.registry.is_username_taken(target).await {
            send(reply, format::error_line("User not found."));
            return;
        }

        self.lobbies
            .store_message(
                &me.lobby,
                LobbyMessage {
                    username: me.username.clone(),
                    glyph: me.glyph.clone(),
                    text: format!("@{target}: {text}"),
                    sent_at: self.clock.now_millis(),
                },
            )
            .await;

        let broadcast = format::tag_broadcast(&me.glyph, &me.username, target, text);
        self.registry.fan_out(&me.lobby, &broadcast).await;

        if target != me.username {
            let _ = self
                .registry
                .push_to(target, format::tag_notification(&me.username))
                .await;
        }
    }

    async fn create_lobby(
        &self,
        reply: &mpsc::Sender<String>,
        me: &ClientSnapshot,
        args: &str,
    ) {
        let parts: Vec<&str> = args.splitn(3, ' ').collect();
        if parts.len() < 2 {
            send(
                reply,
                format::error_line("Usage: /create <name> [password] <description>"),
            );
            return;
        }
        let name = parts[0];
        let (password, description) = if parts.len() == 3 {
            (parts[1], parts[2])
        } else {
            ("", parts[1])
        };

        match self
            .lobbies
            .create(name, password, description, &me.username)
            .await
        {
            Ok(lobby) => {
                let kind = if lobby.is_private { "private" } else { "public" };
                tracing::info!("{} created {} lobby '{}'", me.username, kind, name);
                send(
                    reply,
                    format::success_line(&format!(
                        "Created {kind} lobby '{name}'. Use /join {name} to enter."
                    )),
                );
            }
            Err(err) => send(reply, format::error_line(&err.to_string())),
        }
    }

    async fn join_lobby(
        &self,
        session: SessionId,
        reply: &mpsc::Sender<String>,
        me: &ClientSnapshot,
        args: &str,
    ) {
        let (name, password) = match args.split_once(' ') {
            Some((name, password)) => (name, password),
            None => (args, ""),
        };
        if name.is_empty() {
            send(reply, format::error_line("Usage: /join <name> [password]"));
            return;
        }
        if let Err(err) = self.lobbies.validate_join(name, password).await {
            send(reply, format::error_line(&err.to_string()));
            return;
        }

        self.registry
            .broadcast_to_lobby(&me.lobby, &format::left_announcement(&me.username))
            .await;
        self.registry.set_lobby(session, name).await;
        tracing::info!("{} moved from '{}' to '{}'", me.username, me.lobby, name);
        send(
            reply,
            format::success_line(&format!("Joined lobby '{name}'")),
        );
        self.registry
            .broadcast_to_lobby(name, &format::joined_announcement(&me.username))
            .await;

        let now = self.clock.now_millis();
        for msg in self
            .lobbies
            .recent_messages(name, self.config.join_replay_window, now)
            .await
        {
            send(
                reply,
                format::chat_message(&msg.glyph, &msg.username, &msg.text, msg.sent_at, now),
            );
        }
    }

    async fn set_profile(
        &self,
        session: SessionId,
        reply: &mpsc::Sender<String>,
        name: &str,
    ) {
        if name.is_empty() || name == "default" {
            self.registry.set_glyph(session, format::DEFAULT_GLYPH).await;
            send(
                reply,
                format::success_line("Profile picture reset to default."),
            );
            return;
        }
        if name == "list" {
            send(reply, format::glyph_list());
            return;
        }
        match format::glyph(name) {
            Some(pic) => {
                self.registry.set_glyph(session, pic).await;
                send(
                    reply,
                    format::success_line(&format!("Profile picture changed to: {pic}")),
                );
            }
            None => send(
                reply,
                format::error_line("Profile picture not found. Use /sp list to see options."),
            ),
        }
    }
}

/// Best-effort write to an outbox. A closed channel means the session is
/// already tearing down; a full one is handled by registry-side eviction.
fn send(outbox: &mpsc::Sender<String>, line: String) {
    let _ = outbox.try_send(line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockAiAssistant;
    use crate::common::time::FixedClock;
    use crate::domain::Username;
    use tokio::sync::mpsc::Receiver;

    const NOW: i64 = 1_700_000_000_000;

    struct Fixture {
        handler: CommandHandler,
        registry: Arc<ClientRegistry>,
        lobbies: Arc<LobbyRegistry>,
    }

    fn fixture(ai: Option<Arc<dyn AiAssistant>>) -> Fixture {
        let config = ServerConfig::default();
        let registry = Arc::new(ClientRegistry::new());
        let lobbies = Arc::new(LobbyRegistry::new(config.recent_buffer_capacity));
        let handler = CommandHandler::new(
            Arc::clone(&registry),
            Arc::clone(&lobbies),
            ai,
            Arc::new(FixedClock::new(NOW)),
            config,
        );
        Fixture {
            handler,
            registry,
            lobbies,
        }
    }

    async fn connect(
        registry: &ClientRegistry,
        name: &str,
    ) -> (SessionId, mpsc::Sender<String>, Receiver<String>) {
        let (tx, rx) = mpsc::channel(64);
        let id = registry
            .try_register(
                &Username::new(name).unwrap(),
                format::DEFAULT_GLYPH,
                "general",
                tx.clone(),
            )
            .await
            .unwrap();
        (id, tx, rx)
    }

    fn drain(rx: &mut Receiver<String>) -> String {
        let mut out = String::new();
        while let Ok(line) = rx.try_recv() {
            out.push_str(&line);
        }
        out
    }

    #[tokio::test]
    async fn test_quit_disconnects_without_rate_limit() {
        // テスト項目: /quit はレート制限中でも成功し Disconnect を返す
        // given (前提条件): レート制限の枠を使い切る
        let f = fixture(None);
        let (id, tx, mut rx) = connect(&f.registry, "alice").await;
        let mut window = RateWindow::new(NOW);
        for _ in 0..5 {
            f.handler.handle(id, &mut window, &tx, "/help").await;
        }
        assert!(!drain(&mut rx).contains("Rate limited!"));
        let denied = f.handler.handle(id, &mut window, &tx, "/help").await;
        assert_eq!(denied, CommandOutcome::Continue);
        assert!(drain(&mut rx).contains("Rate limited!"));

        // when (操作):
        let outcome = f.handler.handle(id, &mut window, &tx, "/quit").await;

        // then (期待する結果):
        assert_eq!(outcome, CommandOutcome::Disconnect);
        assert!(drain(&mut rx).contains("Goodbye!"));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        // テスト項目: 未知のコマンドはエラーメッセージを返す
        let f = fixture(None);
        let (id, tx, mut rx) = connect(&f.registry, "alice").await;
        let mut window = RateWindow::new(NOW);

        f.handler.handle(id, &mut window, &tx, "/dance").await;

        assert!(drain(&mut rx).contains("Unknown command"));
    }

    #[tokio::test]
    async fn test_create_and_join_private_lobby() {
        // テスト項目: 作成した private ロビーへ正しいパスワードで参加できる
        // given (前提条件):
        let f = fixture(None);
        let (alice, tx_a, mut rx_a) = connect(&f.registry, "alice").await;
        let (bob, tx_b, mut rx_b) = connect(&f.registry, "bob").await;
        let mut win_a = RateWindow::new(NOW);
        let mut win_b = RateWindow::new(NOW);

        // when (操作):
        f.handler
            .handle(alice, &mut win_a, &tx_a, "/create den pw cozy corner")
            .await;
        f.handler.handle(alice, &mut win_a, &tx_a, "/join den pw").await;
        f.handler.handle(bob, &mut win_b, &tx_b, "/join den wrong").await;

        // then (期待する結果):
        let output_a = drain(&mut rx_a);
        assert!(output_a.contains("Created private lobby 'den'"));
        assert!(output_a.contains("Joined lobby 'den'"));
        assert_eq!(f.registry.snapshot(alice).await.unwrap().lobby, "den");
        let output_b = drain(&mut rx_b);
        assert!(output_b.contains("Incorrect password for private lobby!"));
        assert_eq!(f.registry.snapshot(bob).await.unwrap().lobby, "general");
    }

    #[tokio::test]
    async fn test_join_replays_recent_history() {
        // テスト項目: /join はロビーの直近メッセージをリプレイする
        // given (前提条件):
        let f = fixture(None);
        let (alice, tx_a, mut rx_a) = connect(&f.registry, "alice").await;
        let mut win_a = RateWindow::new(NOW);
        f.lobbies
            .create("dev", "", "dev talk", "server")
            .await
            .unwrap();
        f.lobbies
            .store_message(
                "dev",
                LobbyMessage {
                    username: "bob".to_string(),
                    glyph: "[@_@]".to_string(),
                    text: "earlier chatter".to_string(),
                    sent_at: NOW - 60_000,
                },
            )
            .await;

        // when (操作):
        f.handler.handle(alice, &mut win_a, &tx_a, "/join dev").await;

        // then (期待する結果):
        let output = drain(&mut rx_a);
        assert!(output.contains("Joined lobby 'dev'"));
        assert!(output.contains("earlier chatter"));
    }

    #[tokio::test]
    async fn test_private_message_both_sides() {
        // テスト項目: /msg は送信側・受信側の両方に届く
        // given (前提条件):
        let f = fixture(None);
        let (alice, tx_a, mut rx_a) = connect(&f.registry, "alice").await;
        let (_bob, _tx_b, mut rx_b) = connect(&f.registry, "bob").await;
        let mut win_a = RateWindow::new(NOW);

        // when (操作):
        f.handler
            .handle(alice, &mut win_a, &tx_a, "/msg bob psst secret")
            .await;
        f.handler
            .handle(alice, &mut win_a, &tx_a, "/msg ghost boo")
            .await;

        // then (期待する結果):
        assert!(drain(&mut rx_b).contains("psst secret"));
        let sender_output = drain(&mut rx_a);
        assert!(sender_output.contains("bob"));
        assert!(sender_output.contains("User not found."));
    }

    #[tokio::test]
    async fn test_tag_broadcasts_and_notifies() {
        // テスト項目: /tag はロビー全体への配信とタグ対象への通知を行う
        // given (前提条件):
        let f = fixture(None);
        let (alice, tx_a, mut rx_a) = connect(&f.registry, "alice").await;
        let (_bob, _tx_b, mut rx_b) = connect(&f.registry, "bob").await;
        let mut win_a = RateWindow::new(NOW);

        // when (操作):
        f.handler
            .handle(alice, &mut win_a, &tx_a, "/tag bob look at this")
            .await;

        // then (期待する結果):
        let bob_output = drain(&mut rx_b);
        assert!(bob_output.contains("look at this"));
        assert!(bob_output.contains("alice tagged you"));
        // 送信者はブロードキャストのみ受け取り、通知は受け取らない
        let alice_output = drain(&mut rx_a);
        assert!(alice_output.contains("look at this"));
        assert!(!alice_output.contains("tagged you"));
        // タグはロビーコンテキストに記録される
        assert!(f.lobbies.chatter_digest("general").await.contains("@bob"));
    }

    #[tokio::test]
    async fn test_sp_changes_glyph() {
        // テスト項目: /sp でグリフが変わり、未知の名前は拒否される
        let f = fixture(None);
        let (alice, tx_a, mut rx_a) = connect(&f.registry, "alice").await;
        let mut win_a = RateWindow::new(NOW);

        f.handler.handle(alice, &mut win_a, &tx_a, "/sp cat").await;
        assert_eq!(f.registry.snapshot(alice).await.unwrap().glyph, "(=^･^=)");
        assert!(drain(&mut rx_a).contains("Profile picture changed to:"));

        f.handler.handle(alice, &mut win_a, &tx_a, "/sp nosuch").await;
        assert!(drain(&mut rx_a).contains("Profile picture not found."));

        f.handler.handle(alice, &mut win_a, &tx_a, "/sp").await;
        assert_eq!(
            f.registry.snapshot(alice).await.unwrap().glyph,
            format::DEFAULT_GLYPH
        );
    }

    #[tokio::test]
    async fn test_setai_rules_and_history_reset() {
        // テスト項目: /setai は作成者のみ許可され、会話履歴をリセットする
        // given (前提条件):
        let mut mock = MockAiAssistant::new();
        mock.expect_clear_conversation()
            .withf(|lobby| lobby == "den")
            .times(1)
            .return_const(());
        let f = fixture(Some(Arc::new(mock)));
        let (alice, tx_a, mut rx_a) = connect(&f.registry, "alice").await;
        let mut win_a = RateWindow::new(NOW);
        f.handler
            .handle(alice, &mut win_a, &tx_a, "/create den cozy")
            .await;
        f.handler.handle(alice, &mut win_a, &tx_a, "/join den").await;
        drain(&mut rx_a);

        // when (操作): general では拒否、den では成功
        let (bob, tx_b, mut rx_b) = connect(&f.registry, "bob").await;
        let mut win_b = RateWindow::new(NOW);
        f.handler
            .handle(bob, &mut win_b, &tx_b, "/setai be a pirate")
            .await;
        assert!(drain(&mut rx_b).contains("Cannot set prompt for the general lobby"));

        f.handler
            .handle(alice, &mut win_a, &tx_a, "/setai be a pirate")
            .await;

        // then (期待する結果):
        assert!(drain(&mut rx_a).contains("AI prompt updated!"));
        assert_eq!(
            f.lobbies.ai_prompt("den").await.as_deref(),
            Some("be a pirate")
        );
    }

    #[tokio::test]
    async fn test_ai_without_key() {
        // テスト項目: AI 未設定時の /ai はエラーメッセージを返す
        let f = fixture(None);
        let (alice, tx_a, mut rx_a) = connect(&f.registry, "alice").await;
        let mut win_a = RateWindow::new(NOW);

        f.handler
            .handle(alice, &mut win_a, &tx_a, "/ai what is rust?")
            .await;

        assert!(drain(&mut rx_a).contains("AI API Key not configured"));
    }

    #[tokio::test]
    async fn test_ai_answer_broadcast_to_lobby() {
        // テスト項目: /ai の質問と回答はロビー全体に配信される
        // given (前提条件):
        let mut mock = MockAiAssistant::new();
        mock.expect_ask()
            .withf(|question, lobby, username, _chatter, _guideline| {
                question == "what is rust?" && lobby == "general" && username == "alice"
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok("A systems language.".to_string()));
        let f = fixture(Some(Arc::new(mock)));
        let (alice, tx_a, mut rx_a) = connect(&f.registry, "alice").await;
        let (_bob, _tx_b, mut rx_b) = connect(&f.registry, "bob").await;
        let mut win_a = RateWindow::new(NOW);

        // when (操作):
        f.handler
            .handle(alice, &mut win_a, &tx_a, "/ai what is rust?")
            .await;

        // then (期待する結果):
        let alice_output = drain(&mut rx_a);
        assert!(alice_output.contains("[AI] Thinking..."));
        assert!(alice_output.contains("A systems language."));
        let bob_output = drain(&mut rx_b);
        assert!(bob_output.contains("asked AI: what is rust?"));
        assert!(bob_output.contains("[AI Response to alice]"));
    }

    #[tokio::test]
    async fn test_lobbies_listing() {
        // テスト項目: /lobbies は各ロビーの属性と人数を表示する
        let f = fixture(None);
        let (alice, tx_a, mut rx_a) = connect(&f.registry, "alice").await;
        let mut win_a = RateWindow::new(NOW);
        f.handler
            .handle(alice, &mut win_a, &tx_a, "/create den pw cozy corner")
            .await;
        drain(&mut rx_a);

        f.handler.handle(alice, &mut win_a, &tx_a, "/lobbies").await;

        let output = drain(&mut rx_a);
        assert!(output.contains("Lobby: general"));
        assert!(output.contains("Lobby: den"));
        assert!(output.contains("Privacy: private"));
        assert!(output.contains("Created by: alice"));
    }
}
