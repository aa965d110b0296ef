use std::ops::ControlFlow;
use std::time::Duration;

use application::{event_channel, ApplicationError, ChatHub, Connection, EventReceiver, FrameOutcome};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::state::AppState;

/// 关闭时等待发送任务写出关闭帧的最长时间
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// WebSocket 连接管理器
///
/// 封装单条 WebSocket 连接的读写循环：
/// - 接收帧并交给中枢处理
/// - 把中枢推送的事件写回客户端
/// - 心跳检测与匿名连接超时
/// - 断开时注销
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    credential: Option<String>,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, credential: Option<String>) -> Self {
        Self {
            socket,
            state,
            credential,
        }
    }

    /// 运行连接主循环，直到对端关闭、传输出错、心跳超时或匿名超时
    pub async fn run(self) {
        let Self {
            socket,
            state,
            credential,
        } = self;
        let settings = state.ws_settings;

        let (outbound, events) = event_channel(settings.outbound_buffer);
        let mut connection = state.hub.on_connect(credential.as_deref(), outbound).await;
        let connection_id = connection.id();
        tracing::info!(
            connection_id = %connection_id,
            authenticated = connection.is_authenticated(),
            "WebSocket 连接已建立"
        );

        let (sink, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, cmd_rx) = mpsc::channel::<WsCommand>(32);
        let mut send_task = tokio::spawn(send_loop(sink, cmd_rx, events));
        let send_abort = send_task.abort_handle();
        let mut send_finished = false;

        let mut heartbeat = time::interval_at(
            Instant::now() + settings.heartbeat_interval,
            settings.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let anonymous_deadline = time::sleep(settings.anonymous_timeout);
        tokio::pin!(anonymous_deadline);

        loop {
            tokio::select! {
                frame = incoming.next() => {
                    let message = match frame {
                        Some(Ok(message)) => message,
                        Some(Err(err)) => {
                            tracing::warn!(connection_id = %connection_id, error = %err, "WebSocket 传输错误");
                            break;
                        }
                        None => break,
                    };
                    if handle_incoming(message, &mut connection, &state.hub, &cmd_tx)
                        .await
                        .is_break()
                    {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if !connection.take_alive() {
                        tracing::info!(connection_id = %connection_id, "心跳超时，关闭连接");
                        break;
                    }
                    if cmd_tx.send(WsCommand::Ping).await.is_err() {
                        break;
                    }
                }
                _ = &mut anonymous_deadline, if !connection.is_authenticated() => {
                    tracing::info!(connection_id = %connection_id, "连接超时未认证，关闭连接");
                    break;
                }
                _ = &mut send_task => {
                    send_finished = true;
                    break;
                }
            }
        }

        state.hub.on_close(&connection).await;
        drop(connection);

        if !send_finished {
            let drained = time::timeout(CLOSE_GRACE, async move {
                let _ = cmd_tx.send(WsCommand::Close).await;
                let _ = send_task.await;
            })
            .await;
            if drained.is_err() {
                tracing::warn!(connection_id = %connection_id, "发送任务未能及时结束，强制终止");
                send_abort.abort();
            }
        }

        tracing::info!(connection_id = %connection_id, "WebSocket 连接已断开");
    }
}

/// 统一处理所有对 WebSocket sender 的写操作
async fn send_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut cmd_rx: mpsc::Receiver<WsCommand>,
    mut events: EventReceiver,
) {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(WsCommand::Ping) => {
                    if sink.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                Some(WsCommand::Pong(data)) => {
                    if sink.send(WsMessage::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(WsCommand::Close) | None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            event = events.recv() => {
                let Some(event) = event else {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                };
                let payload = match event.to_json() {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize websocket payload");
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(payload.into())).await.is_err() {
                    tracing::warn!("Failed to send text message");
                    break;
                }
            }
        }
    }
    tracing::debug!("WebSocket发送任务结束");
}

/// 处理来自客户端的帧。返回 `Break` 表示应当关闭连接。
async fn handle_incoming(
    message: WsMessage,
    connection: &mut Connection,
    hub: &ChatHub,
    cmd_tx: &mpsc::Sender<WsCommand>,
) -> ControlFlow<()> {
    match message {
        WsMessage::Text(text) => match hub.on_frame(connection, text.as_str()).await {
            Ok(FrameOutcome::Routed(report)) => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    message_id = %report.message.id,
                    delivered = report.delivered,
                    failed = report.failed,
                    "消息已路由"
                );
            }
            Ok(FrameOutcome::Authenticated(_)) | Ok(FrameOutcome::Ignored) => {}
            Err(err) if err.is_validation() => {
                tracing::debug!(connection_id = %connection.id(), error = %err, "非法发送帧已丢弃");
            }
            Err(ApplicationError::Authentication(err)) => {
                tracing::info!(connection_id = %connection.id(), error = %err, "帧认证失败");
            }
            Err(err) => {
                tracing::error!(connection_id = %connection.id(), error = %err, "处理客户端帧失败");
            }
        },
        WsMessage::Binary(_) => {
            connection.mark_alive();
            tracing::debug!(connection_id = %connection.id(), "忽略二进制帧");
        }
        WsMessage::Ping(data) => {
            connection.mark_alive();
            if cmd_tx.send(WsCommand::Pong(data)).await.is_err() {
                return ControlFlow::Break(());
            }
        }
        WsMessage::Pong(_) => connection.mark_alive(),
        WsMessage::Close(_) => {
            tracing::debug!(connection_id = %connection.id(), "WebSocket收到关闭消息");
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    Ping,
    Pong(Bytes),
    Close,
}
