use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordinator::Coordinator;
use crate::error::{AppError, SessionError};
use crate::network::command::{Command, Reply};
use crate::network::mjpeg;

const VIDEO_PATH: &str = "/video";

async fn bind(host: &str, port: u16) -> Result<TcpListener, AppError> {
    let address = format!("{}:{}", host, port);
    TcpListener::bind(&address)
        .await
        .map_err(|e| AppError::Bind(e, address))
}

/// JSON-lines control endpoint: one command per line, one reply per line.
pub struct ControlServer {
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
}

impl ControlServer {
    pub async fn bind(
        host: &str,
        port: u16,
        coordinator: Arc<Coordinator>,
    ) -> Result<Self, AppError> {
        let listener = bind(host, port).await?;
        Ok(Self {
            listener,
            coordinator,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn serve(self, cancel: CancellationToken) {
        info!("Control server listening on {:?}", self.listener.local_addr());
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    debug!("Control client connected: {:?}", peer);
                    let coordinator = self.coordinator.clone();
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = handle_control_client(stream, coordinator, cancel).await {
                            debug!("Control client {:?} disconnected: {}", peer, e);
                        }
                    });
                }
                Err(e) => error!("Error accepting control connection: {}", e),
            }
        }
        info!("Control server stopped");
    }
}

async fn handle_control_client(
    stream: TcpStream,
    coordinator: Arc<Coordinator>,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                write_json(&mut writer, &Reply::error(format!("invalid command: {}", e))).await?;
                continue;
            }
        };
        match command {
            Command::Subscribe => {
                write_json(&mut writer, &Reply::ok().streaming("labels")).await?;
                return forward(&mut writer, coordinator.subscribe_labels(), cancel).await;
            }
            Command::Events => {
                write_json(&mut writer, &Reply::ok().streaming("events")).await?;
                return forward(&mut writer, coordinator.subscribe_events(), cancel).await;
            }
            command => {
                let reply = execute(&coordinator, command);
                write_json(&mut writer, &reply).await?;
            }
        }
    }
}

fn execute(coordinator: &Coordinator, command: Command) -> Reply {
    match command {
        Command::Start => match coordinator.start_session() {
            Ok(session) => Reply::ok().with_session(session),
            Err(e) => Reply::error(e.to_string()),
        },
        Command::Stop => {
            coordinator.stop_session();
            Reply::ok()
        }
        Command::Status => Reply::ok().with_status(coordinator.status()),
        Command::SetMode { mode } => {
            coordinator.set_mode(mode);
            Reply::ok().with_mode(mode)
        }
        Command::Subscribe | Command::Events => {
            Reply::error("streaming commands are handled per connection")
        }
    }
}

/// Copies a broadcast channel to the client as JSON lines until the client
/// goes away. A lagging client skips what it missed.
async fn forward<W, T>(
    writer: &mut W,
    receiver: broadcast::Receiver<T>,
    cancel: CancellationToken,
) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + Clone + Send + 'static,
{
    let mut stream = BroadcastStream::new(receiver);
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            item = stream.next() => item,
        };
        match item {
            Some(Ok(item)) => write_json(writer, &item).await?,
            Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                debug!(skipped, "Subscriber lagging, skipped messages");
            }
            None => return Ok(()),
        }
    }
}

async fn write_json<W, T>(writer: &mut W, value: &T) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value).map_err(std::io::Error::other)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

/// Serves the annotated frames as an MJPEG stream on `/video`.
pub struct VideoServer {
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
    auto_start: bool,
}

impl VideoServer {
    pub async fn bind(
        host: &str,
        port: u16,
        coordinator: Arc<Coordinator>,
        auto_start: bool,
    ) -> Result<Self, AppError> {
        let listener = bind(host, port).await?;
        Ok(Self {
            listener,
            coordinator,
            auto_start,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn serve(self, cancel: CancellationToken) {
        info!("Video server listening on {:?}", self.listener.local_addr());
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    debug!("Viewer connected: {:?}", peer);
                    let coordinator = self.coordinator.clone();
                    let auto_start = self.auto_start;
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        let viewer = handle_viewer(stream, coordinator, auto_start, cancel);
                        if let Err(e) = viewer.await {
                            debug!("Viewer {:?} disconnected: {}", peer, e);
                        }
                    });
                }
                Err(e) => error!("Error accepting viewer connection: {}", e),
            }
        }
        info!("Video server stopped");
    }
}

async fn handle_viewer(
    stream: TcpStream,
    coordinator: Arc<Coordinator>,
    auto_start: bool,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let request_line = lines.next_line().await?.unwrap_or_default();
    // Drain the headers, nothing in them matters here
    while let Some(header) = lines.next_line().await? {
        if header.trim().is_empty() {
            break;
        }
    }

    let path = request_line.split_whitespace().nth(1).unwrap_or_default();
    if !request_line.starts_with("GET ") || path != VIDEO_PATH {
        let response = mjpeg::error_response("404 Not Found", "not found");
        writer.write_all(response.as_bytes()).await?;
        return Ok(());
    }

    // Subscribe first so the first frames of an auto-started session are seen
    let mut frames = BroadcastStream::new(coordinator.subscribe_frames());
    if auto_start && !coordinator.is_streaming() {
        match coordinator.start_session() {
            Ok(session) => info!(session, "Session started by viewer"),
            Err(SessionError::AlreadyStreaming) => {}
            Err(e) => {
                warn!("Viewer could not start a session: {}", e);
                let response = mjpeg::error_response("503 Service Unavailable", &e.to_string());
                writer.write_all(response.as_bytes()).await?;
                return Ok(());
            }
        }
    }

    writer.write_all(mjpeg::response_head().as_bytes()).await?;
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            item = frames.next() => item,
        };
        match item {
            Some(Ok(frame)) => mjpeg::write_part(&mut writer, &frame.jpeg).await?,
            Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                debug!(skipped, "Viewer lagging, skipped frames");
            }
            None => return Ok(()),
        }
    }
}
