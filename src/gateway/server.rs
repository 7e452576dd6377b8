//! WebSocket 网关
//!
//! 每个连接一个读循环、一个写任务、一个请求队列：同一连接上的请求排队依次成为会话，
//! 不同连接的会话并发执行。连接断开或网关停止时取消该连接上正在运行的会话。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::message::{
    parse_client_frame, to_frame, ClientMessage, ControlMessage, ERR_HISTORY,
    ERR_INVALID_REQUEST, ERR_TOO_MANY_CONNECTIONS,
};
use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator, SessionEvent};

const MAX_HISTORY_LIMIT: usize = 1000;

/// Gateway 配置
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// WebSocket 监听地址
    pub bind_addr: String,
    /// 最大并发连接数
    pub max_connections: usize,
    /// get_history 未给 limit 时返回的条数
    pub history_limit: usize,
    /// stop() 等待连接收尾的最长时间
    pub shutdown_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for GatewayConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            bind_addr: cfg.gateway.bind_addr.clone(),
            max_connections: cfg.gateway.max_connections.max(1),
            history_limit: cfg.memory.recent_limit,
            shutdown_timeout: Duration::from_secs(cfg.gateway.shutdown_timeout_secs),
        }
    }
}

/// 连接处理需要的共享状态
struct Shared {
    orchestrator: Arc<Orchestrator>,
    history_limit: usize,
}

pub struct Gateway {
    config: GatewayConfig,
    shared: Arc<Shared>,
    permits: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    cancel_all: CancellationToken,
    tasks: TaskTracker,
}

impl Gateway {
    pub fn new(config: GatewayConfig, orchestrator: Arc<Orchestrator>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            permits: Arc::new(Semaphore::new(config.max_connections)),
            shared: Arc::new(Shared {
                orchestrator,
                history_limit: config.history_limit,
            }),
            config,
            shutdown: shutdown_tx,
            cancel_all: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// 绑定端口并在后台接受连接，返回实际监听地址（bind_addr 端口为 0 时由系统分配）
    pub async fn start(&self) -> Result<SocketAddr, AgentError> {
        let addr: SocketAddr = self
            .config
            .bind_addr
            .parse()
            .map_err(|e| AgentError::ConfigError(format!("Invalid bind address: {}", e)))?;

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AgentError::Transport(format!("Failed to bind {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        tracing::info!("Gateway listening on ws://{}", local_addr);

        let mut shutdown_rx = self.shutdown.subscribe();
        let shared = Arc::clone(&self.shared);
        let permits = Arc::clone(&self.permits);
        let cancel_all = self.cancel_all.clone();
        let tasks = self.tasks.clone();

        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                let permit = Arc::clone(&permits).try_acquire_owned().ok();
                                let shared = Arc::clone(&shared);
                                let token = cancel_all.child_token();

                                tasks.spawn(async move {
                                    if let Err(e) = handle_connection(stream, peer, shared, token, permit).await {
                                        tracing::error!("Connection error from {}: {}", peer, e);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                            }
                        }
                    }
                }
            }
            tracing::info!("Gateway accept loop stopped");
        });

        Ok(local_addr)
    }

    /// 停止接受新连接，取消所有进行中的会话并等待它们收尾（落盘、发出终态事件），
    /// 超过 shutdown_timeout 不再等待；最后关闭 MemoryStore
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        self.cancel_all.cancel();
        let cancelled = self.shared.orchestrator.sessions().cancel_all().await;
        if cancelled > 0 {
            tracing::info!("Cancelled {} running sessions", cancelled);
        }

        self.tasks.close();
        if tokio::time::timeout(self.config.shutdown_timeout, self.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                "{} connection tasks still running after {:?}, giving up",
                self.tasks.len(),
                self.config.shutdown_timeout
            );
        }

        self.shared.orchestrator.memory().close().await;
        tracing::info!("Gateway stopped");
    }

    /// 获取活跃连接数
    pub fn connection_count(&self) -> usize {
        self.config.max_connections - self.permits.available_permits()
    }

    /// 获取运行中的会话数
    pub async fn session_count(&self) -> usize {
        self.shared.orchestrator.sessions().active_count().await
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    shared: Arc<Shared>,
    conn_token: CancellationToken,
    permit: Option<OwnedSemaphorePermit>,
) -> Result<(), String> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| format!("WebSocket handshake failed: {}", e))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let Some(_permit) = permit else {
        tracing::warn!("Connection limit reached, rejecting {}", addr);
        if let Some(frame) = to_frame(&ControlMessage::error(
            ERR_TOO_MANY_CONNECTIONS,
            "connection limit reached",
        )) {
            let _ = ws_tx.send(WsMessage::Text(frame)).await;
        }
        let _ = ws_tx.close().await;
        return Ok(());
    };

    tracing::info!("New WebSocket connection from {}", addr);

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(msg)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let (request_tx, request_rx) = mpsc::unbounded_channel::<String>();
    let worker = tokio::spawn(run_request_queue(
        Arc::clone(&shared.orchestrator),
        request_rx,
        tx.clone(),
        conn_token.clone(),
    ));

    loop {
        let msg = tokio::select! {
            _ = conn_token.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        let msg = match msg {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                tracing::warn!("WebSocket receive error: {}", e);
                break;
            }
            None => break,
        };

        match msg {
            WsMessage::Text(text) => match parse_client_frame(&text) {
                Ok(ClientMessage::Request { text }) => {
                    if request_tx.send(text).is_err() {
                        break;
                    }
                }
                Ok(ClientMessage::GetHistory { session_id, limit }) => {
                    let reply = query_history(&shared, session_id.as_deref(), limit).await;
                    send_control(&tx, &reply);
                }
                Ok(ClientMessage::Ping { timestamp }) => {
                    send_control(&tx, &ControlMessage::Pong { timestamp });
                }
                Err(reply) => send_control(&tx, &reply),
            },
            WsMessage::Binary(_) => {
                send_control(
                    &tx,
                    &ControlMessage::error(ERR_INVALID_REQUEST, "binary frames are not supported"),
                );
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    // 读端结束即客户端离开：取消当前会话，丢弃排队中的请求
    conn_token.cancel();
    drop(request_tx);
    if let Err(e) = worker.await {
        tracing::error!("Request worker for {} failed: {}", addr, e);
    }
    drop(tx);
    let _ = writer.await;

    tracing::info!("WebSocket connection closed: {}", addr);
    Ok(())
}

/// 依次执行同一连接上的请求；会话事件经转发任务写入连接
async fn run_request_queue(
    orchestrator: Arc<Orchestrator>,
    mut requests: mpsc::UnboundedReceiver<String>,
    out: mpsc::UnboundedSender<String>,
    conn_token: CancellationToken,
) {
    while let Some(text) = requests.recv().await {
        if conn_token.is_cancelled() {
            break;
        }

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();
        let out_for_events = out.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let Some(frame) = to_frame(&event) else {
                    continue;
                };
                if out_for_events.send(frame).is_err() {
                    break;
                }
            }
        });

        let report = orchestrator
            .run_session(&text, &event_tx, conn_token.child_token())
            .await;
        drop(event_tx);
        let _ = forwarder.await;

        tracing::debug!(
            session_id = %report.session_id,
            phase = %report.phase,
            "session finished"
        );
    }
}

async fn query_history(
    shared: &Shared,
    session_id: Option<&str>,
    limit: Option<usize>,
) -> ControlMessage {
    let memory = shared.orchestrator.memory();
    let result = match session_id {
        Some(id) => memory.query_by_session(id).await,
        None => {
            let limit = limit
                .unwrap_or(shared.history_limit)
                .clamp(1, MAX_HISTORY_LIMIT);
            memory.recent(limit).await
        }
    };
    match result {
        Ok(records) => ControlMessage::History { records },
        Err(e) => {
            tracing::error!("History query failed: {}", e);
            ControlMessage::error(ERR_HISTORY, e.to_string())
        }
    }
}

fn send_control(tx: &mpsc::UnboundedSender<String>, message: &ControlMessage) {
    if let Some(frame) = to_frame(message) {
        let _ = tx.send(frame);
    }
}
