use crate::receiver::{self, Disposition, SignaturePolicy};
use crate::types::{Ack, PendingEvent, Subscription};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};

/// Read-only snapshot of subscriptions for the HTTP server.
/// Refreshed whenever the store is mutated.
pub type SubscriptionMap = Arc<RwLock<HashMap<String, Subscription>>>;

#[derive(Clone)]
struct ServerState {
    subscriptions: SubscriptionMap,
    policy: SignaturePolicy,
    event_tx: mpsc::UnboundedSender<PendingEvent>,
}

pub fn router(
    subscriptions: SubscriptionMap,
    policy: SignaturePolicy,
    event_tx: mpsc::UnboundedSender<PendingEvent>,
) -> Router {
    let state = ServerState {
        subscriptions,
        policy,
        event_tx,
    };
    Router::new()
        .route("/hooks/{trigger_id}", post(handle_delivery))
        .with_state(state)
}

/// Spawn the axum server on `bind_addr` and return the bound address and
/// a channel receiver for accepted deliveries.
pub async fn start(
    bind_addr: &str,
    subscriptions: SubscriptionMap,
    policy: SignaturePolicy,
) -> Result<(SocketAddr, mpsc::UnboundedReceiver<PendingEvent>), std::io::Error> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let app = router(subscriptions, policy, event_tx);

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "webhook receiver listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "webhook receiver stopped");
        }
    });

    Ok((addr, event_rx))
}

async fn handle_delivery(
    Path(trigger_id): Path<String>,
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let subscriptions = state.subscriptions.read().await;
    let Some(sub) = subscriptions.get(&trigger_id).cloned() else {
        tracing::debug!(%trigger_id, "delivery for unknown trigger");
        return (StatusCode::NOT_FOUND, "unknown trigger");
    };
    drop(subscriptions);

    let payload = match receiver::process(&sub, state.policy, &headers, &body) {
        Ok(Disposition::Forward(payload)) => payload,
        Ok(Disposition::Reject(ack @ Ack::InvalidSignature)) => {
            return (StatusCode::UNAUTHORIZED, ack.as_str())
        }
        Ok(Disposition::Reject(ack)) => return (StatusCode::OK, ack.as_str()),
        Err(e) => {
            tracing::warn!(%trigger_id, error = %e, "rejecting delivery");
            return (StatusCode::BAD_REQUEST, "invalid payload");
        }
    };

    let event = PendingEvent {
        delivery_id: uuid::Uuid::new_v4().to_string(),
        event: payload.get("event").and_then(Value::as_str).map(String::from),
        trigger_id,
        received_at: Utc::now(),
        data: payload,
    };
    tracing::info!(
        trigger_id = %event.trigger_id,
        delivery_id = %event.delivery_id,
        event = event.event.as_deref().unwrap_or("<none>"),
        "delivery accepted"
    );

    // Acked before the host sees it. The channel only closes during shutdown.
    if state.event_tx.send(event).is_err() {
        tracing::warn!("event channel closed, dropping delivery");
    }

    (StatusCode::OK, Ack::Received.as_str())
}
