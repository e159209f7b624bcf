//! Client for the hosted realtime service: a Phoenix channel over a websocket
//! that streams `postgres_changes` notifications for one owner's snippet rows.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::repositories::{ChangeEvent, ChangeKind};

const SNIPPETS_TABLE: &str = "snippets";
const PROTOCOL_VERSION: &str = "1.0.0";
const JOIN_REF: &str = "1";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Websocket endpoint of the realtime service for `base_url`
pub fn realtime_url(base_url: &str, api_key: &str) -> Result<String> {
    let base = base_url.trim_end_matches('/');
    let socket_base = if let Some(host) = base.strip_prefix("https://") {
        format!("wss://{}", host)
    } else if let Some(host) = base.strip_prefix("http://") {
        format!("ws://{}", host)
    } else {
        bail!("unsupported store URL scheme: {}", base_url);
    };
    Ok(format!(
        "{}/realtime/v1/websocket?apikey={}&vsn={}",
        socket_base, api_key, PROTOCOL_VERSION
    ))
}

pub fn channel_topic(owner: Uuid) -> String {
    format!("realtime:{}-{}", SNIPPETS_TABLE, owner)
}

/// `phx_join` for a channel carrying every change to `owner`'s rows
pub fn join_message(owner: Uuid, access_token: &str) -> Value {
    json!({
        "topic": channel_topic(owner),
        "event": "phx_join",
        "ref": JOIN_REF,
        "join_ref": JOIN_REF,
        "payload": {
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": SNIPPETS_TABLE,
                    "filter": format!("user_id=eq.{}", owner),
                }],
            },
            "access_token": access_token,
        },
    })
}

pub fn heartbeat_message(message_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": message_ref.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct Envelope {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(default, rename = "ref")]
    message_ref: Option<String>,
}

/// What the listener should do with one frame from the socket
#[derive(Debug, PartialEq)]
pub enum Frame {
    Change(ChangeEvent),
    JoinRejected(String),
    Closed,
    Ignored,
}

/// Classify a text frame received on `owner`'s channel
pub fn parse_frame(text: &str, owner: Uuid) -> Frame {
    let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
        debug!("Ignoring non-JSON realtime frame");
        return Frame::Ignored;
    };
    if envelope.topic != channel_topic(owner) {
        return Frame::Ignored;
    }

    match envelope.event.as_str() {
        "postgres_changes" => parse_change(&envelope.payload["data"], owner)
            .map(Frame::Change)
            .unwrap_or(Frame::Ignored),
        "phx_reply" if envelope.message_ref.as_deref() == Some(JOIN_REF) => {
            match envelope.payload["status"].as_str() {
                Some("ok") => Frame::Ignored,
                _ => Frame::JoinRejected(envelope.payload["response"].to_string()),
            }
        }
        "phx_close" | "phx_error" => Frame::Closed,
        _ => Frame::Ignored,
    }
}

fn parse_change(data: &Value, owner: Uuid) -> Option<ChangeEvent> {
    let kind = data
        .get("type")
        .or_else(|| data.get("eventType"))
        .and_then(|kind| serde_json::from_value::<ChangeKind>(kind.clone()).ok())?;

    // Deletes only carry the old row, and possibly only its primary key
    let row = match kind {
        ChangeKind::Delete => data.get("old_record").or_else(|| data.get("old")),
        _ => data.get("record").or_else(|| data.get("new")),
    }?;
    let snippet_id = row["id"].as_str().and_then(|id| Uuid::parse_str(id).ok())?;
    let owner_id = row["user_id"]
        .as_str()
        .and_then(|id| Uuid::parse_str(id).ok())
        .unwrap_or(owner);
    if owner_id != owner {
        warn!("Dropping change to snippet {} of another account", snippet_id);
        return None;
    }

    Some(ChangeEvent {
        kind,
        owner_id,
        snippet_id,
    })
}

/// Connect, join `owner`'s channel and forward its changes until the receiver is dropped
#[instrument(skip(api_key, access_token))]
pub async fn subscribe(
    base_url: &str,
    api_key: &str,
    access_token: &str,
    owner: Uuid,
    timeout: Duration,
) -> Result<UnboundedReceiver<ChangeEvent>> {
    let url = realtime_url(base_url, api_key)?;
    let (socket, _) = tokio::time::timeout(timeout, connect_async(url.as_str()))
        .await
        .context("connect to realtime service timed out")?
        .context("connect to realtime service")?;
    let (mut sink, mut stream) = socket.split();

    sink.send(Message::text(join_message(owner, access_token).to_string()))
        .await
        .context("join snippet change channel")?;
    info!("Joined realtime channel {}", channel_topic(owner));

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                _ = tx.closed() => {
                    debug!("Change receiver dropped, leaving realtime channel");
                    break;
                }
                _ = heartbeat.tick() => {
                    let beat = Message::text(heartbeat_message(next_ref).to_string());
                    next_ref += 1;
                    if let Err(e) = sink.send(beat).await {
                        warn!("Realtime heartbeat failed: {}", e);
                        break;
                    }
                }
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Realtime connection closed by server");
                            break;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!("Realtime connection failed: {}", e);
                            break;
                        }
                    };
                    match parse_frame(&text, owner) {
                        Frame::Change(event) => {
                            debug!("Realtime {:?}", event);
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Frame::JoinRejected(reason) => {
                            warn!("Realtime channel join rejected: {}", reason);
                            break;
                        }
                        Frame::Closed => {
                            info!("Realtime channel closed");
                            break;
                        }
                        Frame::Ignored => {}
                    }
                }
            }
        }
        let _ = sink.close().await;
    });

    Ok(rx)
}
