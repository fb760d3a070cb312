//! Viewer-facing websocket endpoint. Joined viewers receive every
//! broadcast view and may ask for a view on demand.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use phxnet_core::Service;

pub async fn accept_loop(listener: TcpListener, service: Service, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(stream, peer, service.clone(), cancel.child_token()));
                }
                Err(e) => warn!(error = %e, "viewer accept failed"),
            },
        }
    }
    debug!("viewer listener stopped");
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Service,
    cancel: CancellationToken,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "viewer handshake failed");
            return;
        }
    };

    let publisher = service.publisher();
    let mut subscription = publisher.join();
    debug!(%peer, subscriber = %subscription.id, "viewer connected");

    let (mut write, mut read) = ws.split();
    loop {
        let outgoing = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            pushed = subscription.messages.recv() => match pushed {
                Some(message) => message.to_text(),
                None => break,
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = service.api().handle_text(text.as_str()).await;
                    match serde_json::to_string(&reply) {
                        Ok(encoded) => encoded,
                        Err(e) => {
                            warn!(%peer, error = %e, "failed to encode reply");
                            continue;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(%peer, error = %e, "viewer connection error");
                    break;
                }
                Some(Ok(_)) => continue,
            },
        };

        if let Err(e) = write.send(Message::text(outgoing)).await {
            debug!(%peer, error = %e, "viewer send failed");
            break;
        }
    }

    publisher.leave(subscription.id);
    debug!(%peer, "viewer disconnected");
}
