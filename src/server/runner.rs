//! サーバー本体の組み立てと起動
//!
//! ## 責務
//!
//! - 各コンポーネント（レジストリ・ブロードキャスター・AI）の配線
//! - TCP リスナーのバインドと accept ループ
//! - アイドルコンテキストの定期スイープ
//! - グレースフルシャットダウン（通知 → レジストリ解放 → accept 停止）

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use crate::ai::{AiAssistant, AiError, GeminiClient};
use crate::common::time::{Clock, SystemClock};
use crate::domain::OutboundMessage;
use crate::server::admission::AdmissionControl;
use crate::server::broadcast::{self, Broadcaster};
use crate::server::commands::CommandHandler;
use crate::server::config::ServerConfig;
use crate::server::format;
use crate::server::lobby_registry::LobbyRegistry;
use crate::server::rate_limit::RateLimiter;
use crate::server::registry::ClientRegistry;
use crate::server::session;

/// Shared dependencies handed to every session task.
pub struct ServerState {
    pub config: ServerConfig,
    pub admission: Arc<AdmissionControl>,
    pub registry: Arc<ClientRegistry>,
    pub lobbies: Arc<LobbyRegistry>,
    pub broadcaster: Broadcaster,
    pub commands: CommandHandler,
    pub limiter: RateLimiter,
    pub clock: Arc<dyn Clock>,
}

/// チャットサーバー（未起動状態）
pub struct Server {
    state: Arc<ServerState>,
    queue_rx: mpsc::Receiver<OutboundMessage>,
}

impl Server {
    /// Wire a server with the system clock and, when `GEMINI_API_KEY` is
    /// set, the Gemini collaborator.
    pub fn new(config: ServerConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ai: Option<Arc<dyn AiAssistant>> =
            match GeminiClient::from_env(Arc::clone(&clock)) {
                Ok(client) => {
                    tracing::info!("AI collaborator enabled");
                    Some(Arc::new(client))
                }
                Err(AiError::NotConfigured) => {
                    tracing::warn!("GEMINI_API_KEY not set, AI commands disabled");
                    None
                }
                Err(err) => {
                    tracing::warn!("Failed to build AI client ({}), AI commands disabled", err);
                    None
                }
            };
        Self::with_parts(config, clock, ai)
    }

    /// Wire a server from explicit parts. Tests inject fixed clocks and
    /// mock assistants through this.
    pub fn with_parts(
        config: ServerConfig,
        clock: Arc<dyn Clock>,
        ai: Option<Arc<dyn AiAssistant>>,
    ) -> Self {
        let admission = AdmissionControl::new(config.max_connections_per_ip);
        let registry = Arc::new(ClientRegistry::new());
        let lobbies = Arc::new(LobbyRegistry::new(config.recent_buffer_capacity));
        let (broadcaster, queue_rx) = Broadcaster::new(config.broadcast_queue_capacity);
        let limiter = RateLimiter::new(config.rate_limit_budget, config.rate_limit_window);
        let commands = CommandHandler::new(
            Arc::clone(&registry),
            Arc::clone(&lobbies),
            ai,
            Arc::clone(&clock),
            config.clone(),
        );

        let state = Arc::new(ServerState {
            config,
            admission,
            registry,
            lobbies,
            broadcaster,
            commands,
            limiter,
            clock,
        });
        Self { state, queue_rx }
    }

    /// Bind and start accepting. Returns once the listener is live; the
    /// accept loop, broadcaster and sweeper keep running as background
    /// tasks until the handle shuts them down.
    pub async fn start(self) -> io::Result<ServerHandle> {
        let state = self.state;
        let addr = format!("{}:{}", state.config.host, state.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Chat server listening on {}", local_addr);
        tracing::info!(
            "Rate limiting enabled: max {} messages per {:?}, max {} connections per IP",
            state.config.rate_limit_budget,
            state.config.rate_limit_window,
            state.config.max_connections_per_ip
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        broadcast::spawn_consumer(
            self.queue_rx,
            Arc::clone(&state.registry),
            Arc::clone(&state.clock),
            shutdown_rx.clone(),
        );
        spawn_sweeper(Arc::clone(&state), shutdown_rx.clone());

        let accept_state = Arc::clone(&state);
        let mut accept_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_shutdown.changed() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tokio::spawn(session::run_session(
                                Arc::clone(&accept_state),
                                stream,
                                peer,
                                accept_shutdown.clone(),
                            ));
                        }
                        Err(err) => {
                            tracing::warn!("Failed to accept connection: {}", err);
                        }
                    },
                }
            }
            tracing::debug!("Accept loop stopped");
        });

        Ok(ServerHandle {
            local_addr,
            shutdown: shutdown_tx,
            state,
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    state: Arc<ServerState>,
}

impl ServerHandle {
    /// Address the listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Graceful shutdown: tell every connected client, stop accepting, and
    /// release all sessions. Background tasks (accept loop, broadcast
    /// consumer, sweeper) all exit on the same signal.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down chat server");
        for outbox in self.state.registry.all_outboxes().await {
            let _ = outbox.try_send(format::shutdown_notice());
        }
        let _ = self.shutdown.send(true);
        self.state.registry.clear().await;
    }
}

/// Periodically drop recent-message buffers of lobbies nobody has written
/// to for a long time.
fn spawn_sweeper(state: Arc<ServerState>, mut shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.config.sweep_interval);
        ticker.tick().await; // first tick completes immediately
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let swept = state
                        .lobbies
                        .sweep_idle_contexts(
                            state.config.context_idle_timeout,
                            state.clock.now_millis(),
                        )
                        .await;
                    if !swept.is_empty() {
                        tracing::info!("Swept {} idle lobby context(s)", swept.len());
                    }
                }
            }
        }
    });
}
