/// Query API for the CLI and external renderers
///
/// Line-delimited JSON over TCP: one request object per line, one response
/// object per line.
use crate::error::{FlowError, Result};
use crate::message::{Message, RawMessage};
use crate::service::FlowHandle;
use crate::view::{live_feed, room, thread_cards, DashboardStats};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// API request
#[derive(Debug, Deserialize)]
#[serde(tag = "command")]
enum ApiRequest {
    #[serde(rename = "stats")]
    Stats,
    #[serde(rename = "threads")]
    Threads,
    #[serde(rename = "feed")]
    Feed { limit: Option<usize> },
    #[serde(rename = "room")]
    Room { thread_id: String },
    #[serde(rename = "status")]
    Status,
    #[serde(rename = "push")]
    Push { message: RawMessage },
}

/// API response
#[derive(Debug, Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

/// Bind and serve the API
pub async fn start_api_server(
    handle: FlowHandle,
    api_addr: SocketAddr,
    feed_size: usize,
) -> Result<()> {
    let listener = TcpListener::bind(&api_addr).await?;
    serve_api(listener, handle, feed_size).await
}

/// Serve the API on an already bound listener
pub async fn serve_api(listener: TcpListener, handle: FlowHandle, feed_size: usize) -> Result<()> {
    info!("API server listening on {}", listener.local_addr()?);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("API client connected from {}", addr);
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_api_client(stream, handle, feed_size).await {
                        error!("Error handling API client: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept API connection: {}", e);
            }
        }
    }
}

/// Handle API client connection
async fn handle_api_client(
    mut stream: TcpStream,
    handle: FlowHandle,
    feed_size: usize,
) -> Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("API client disconnected");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let response = match handle_request(trimmed, &handle, feed_size) {
                    Ok(resp) => resp,
                    Err(e) => ApiResponse::error(format!("{}", e)),
                };

                let json = serde_json::to_string(&response)?;
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            Err(e) => {
                error!("Error reading from API client: {}", e);
                break;
            }
        }
    }

    Ok(())
}

/// Handle API request
fn handle_request(request: &str, handle: &FlowHandle, feed_size: usize) -> Result<ApiResponse> {
    let req: ApiRequest = serde_json::from_str(request)
        .map_err(|e| FlowError::Protocol(format!("Invalid request: {}", e)))?;

    let snapshot = handle.snapshot();
    let board = &snapshot.board;

    let data = match req {
        ApiRequest::Stats => serde_json::to_value(DashboardStats::from_aggregator(board))?,
        ApiRequest::Threads => serde_json::json!({ "threads": thread_cards(board) }),
        ApiRequest::Feed { limit } => {
            serde_json::json!({ "feed": live_feed(board, limit.unwrap_or(feed_size)) })
        }
        ApiRequest::Room { thread_id } => {
            let view = room(board, &thread_id).ok_or(FlowError::UnknownThread(thread_id))?;
            serde_json::to_value(view)?
        }
        ApiRequest::Status => serde_json::to_value(&snapshot.status)?,
        ApiRequest::Push { message } => {
            let message = Message::try_from(message)?;
            let message_id = message.id.clone();
            handle.push(message)?;
            serde_json::json!({ "message_id": message_id })
        }
    };

    Ok(ApiResponse::success(data))
}
