//! WebSocket live feed handler

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, StreamExt};
use ode_feed::{FeedError, FeedMessage, SubscriberId};
use tracing::{debug, info, warn};

use crate::api::state::AppState;

/// Upgrade to a WebSocket speaking the `init` / `new` feed protocol.
pub async fn feed_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (snapshot, mut subscription) = match state.feed.subscribe().await {
        Ok(registered) => registered,
        Err(e) => {
            warn!(error = %e, "Could not register feed subscriber");
            return;
        }
    };
    let id = subscription.id();
    info!(subscriber = %id, snapshot = snapshot.len(), "Feed client connected");

    let (mut sender, mut receiver) = socket.split();

    if let Err(e) = send(&mut sender, id, &FeedMessage::Init { entries: snapshot }).await {
        debug!(subscriber = %id, error = %e, "Feed client gone before init");
        state.feed.unsubscribe(id).await;
        return;
    }

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else {
                    // The feed dropped us
                    break;
                };
                if let Err(e) = send(&mut sender, id, &message).await {
                    debug!(subscriber = %id, error = %e, "Feed send failed");
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(subscriber = %id, error = %e, "Feed client read error");
                        break;
                    }
                    // Clients have nothing to say; pings are answered by axum
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.feed.unsubscribe(id).await;
    info!(subscriber = %id, "Feed client disconnected");
}

async fn send<S>(sender: &mut S, id: SubscriberId, message: &FeedMessage) -> Result<(), FeedError>
where
    S: Sink<Message> + Unpin,
{
    let text = message.to_json()?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(|_| FeedError::SubscriberDelivery(id))
}
