//! Agent-facing websocket endpoint. Each connection is one agent on the
//! listener's VLAN; every frame is acknowledged with `ok` and then fed
//! to the ingestor.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderMap, StatusCode};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use phxnet_core::{AgentHandshake, CoreError, Service};

pub async fn accept_loop(
    listener: TcpListener,
    vlan: Arc<str>,
    service: Service,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(
                        stream,
                        peer,
                        Arc::clone(&vlan),
                        service.clone(),
                        cancel.child_token(),
                    ));
                }
                Err(e) => warn!(%vlan, error = %e, "agent accept failed"),
            },
        }
    }
    debug!(%vlan, "agent listener stopped");
}

/// Read the registration headers out of the upgrade request.
pub fn read_handshake(headers: &HeaderMap, vlan: &str) -> Result<AgentHandshake, CoreError> {
    AgentHandshake::from_metadata(
        |name| headers.get(name).and_then(|value| value.to_str().ok()),
        vlan,
    )
}

fn reject(message: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    vlan: Arc<str>,
    service: Service,
    cancel: CancellationToken,
) {
    let mut handshake = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match read_handshake(request.headers(), &vlan) {
            Ok(parsed) => {
                handshake = Some(parsed);
                Ok(response)
            }
            Err(e) => Err(reject(e.public_message())),
        }
    };

    let mut ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, %vlan, error = %e, "agent handshake rejected");
            return;
        }
    };
    let Some(handshake) = handshake else {
        return;
    };

    match service.registry().register_or_touch(&handshake).await {
        Ok(outcome) => {
            info!(agent_id = %handshake.id, %vlan, %peer, status = %outcome.status, "agent connected");
        }
        Err(e) => {
            warn!(agent_id = %handshake.id, %vlan, %peer, error = %e, "agent registration failed");
            let frame = CloseFrame {
                code: CloseCode::Policy,
                reason: e.public_message().into(),
            };
            if let Err(e) = ws.close(Some(frame)).await {
                debug!(%peer, error = %e, "close after failed registration");
            }
            return;
        }
    }

    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = write.send(Message::text("ok")).await {
                        warn!(agent_id = %handshake.id, error = %e, "failed to acknowledge frame");
                        break;
                    }
                    service.ingestor().handle_text(text.as_str(), &vlan).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(agent_id = %handshake.id, error = %e, "agent connection error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    service.registry().mark_disconnected(&handshake.id).await;
}
