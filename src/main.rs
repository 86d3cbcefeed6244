mod client;
mod config;
mod error;
mod http_server;
mod lifecycle;
mod operations;
mod payload;
mod receiver;
mod store;
mod types;
mod verification;

use client::ApiClient;
use config::Config;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use store::SubscriptionStore;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, RwLock};
use tracing_subscriber::EnvFilter;
use types::{EventFilter, PendingEvent, Subscription, WILDCARD};

const EVENT_TYPE: &str = "allscreenshots.webhook";

// ─── JSON-RPC wire types ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

#[derive(Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

#[derive(Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Host-bound message without an id; the host sends no reply.
#[derive(Serialize)]
struct JsonRpcNotification {
    jsonrpc: &'static str,
    method: &'static str,
    params: Value,
}

fn ok_response(id: Value, data: Value) -> JsonRpcResponse {
    raw_response(
        id,
        json!({
            "success": true,
            "data": data,
            "message": null
        }),
    )
}

fn raw_response(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        result: Some(result),
        error: None,
        id,
    }
}

fn err_response(id: Value, code: i64, message: String) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        result: None,
        error: Some(JsonRpcError { code, message }),
        id,
    }
}

// ─── Stdout ─────────────────────────────────────────────────────────────────

enum Outgoing {
    Line(String),
    Close,
}

/// Sole owner of stdout. Responses and event notifications are serialized
/// through here so lines never interleave.
async fn write_stdout(mut rx: mpsc::UnboundedReceiver<Outgoing>) {
    let mut stdout = tokio::io::stdout();
    while let Some(msg) = rx.recv().await {
        let Outgoing::Line(mut line) = msg else {
            break;
        };
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            tracing::error!(error = %e, "stdout write failed");
            break;
        }
        let _ = stdout.flush().await;
    }
}

fn emit<T: Serialize>(out: &mpsc::UnboundedSender<Outgoing>, message: &T) {
    match serde_json::to_string(message) {
        Ok(line) => {
            let _ = out.send(Outgoing::Line(line));
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize outgoing message"),
    }
}

// ─── Shared app state ────────────────────────────────────────────────────────

struct AppState {
    config: Option<Config>,
    store: SubscriptionStore,
    /// Mirror of subscriptions for the HTTP server (refreshed on mutation).
    subscription_map: http_server::SubscriptionMap,
    client: Option<ApiClient>,
    addr: Option<SocketAddr>,
    public_url: String,
    out: mpsc::UnboundedSender<Outgoing>,
}

impl AppState {
    fn new(out: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self {
            config: None,
            store: SubscriptionStore::new(PathBuf::from(".")),
            subscription_map: Arc::new(RwLock::new(HashMap::new())),
            client: None,
            addr: None,
            public_url: String::new(),
            out,
        }
    }

    async fn refresh_subscription_map(&self) {
        let mut map = self.subscription_map.write().await;
        *map = self.store.snapshot();
    }

    fn client(&self) -> Result<&ApiClient, String> {
        self.client
            .as_ref()
            .ok_or_else(|| "no API credentials configured (set api_key)".to_string())
    }
}

// ─── Entry point ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_stdout(out_rx));

    let state: Arc<RwLock<AppState>> = Arc::new(RwLock::new(AppState::new(out_tx.clone())));
    let handle = tokio::runtime::Handle::current();

    // Stdin loop on a blocking thread to avoid blocking the async runtime.
    let out = out_tx.clone();
    let reader = tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        let mut line = String::new();

        loop {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                _ => {}
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    emit(&out, &err_response(Value::Null, -32700, format!("Parse error: {e}")));
                    continue;
                }
            };

            let is_shutdown = request.method == "shutdown";
            let response = handle.block_on(handle_request(&request, &state));
            emit(&out, &response);

            if is_shutdown {
                break;
            }
        }
    });

    if let Err(e) = reader.await {
        tracing::error!(error = %e, "stdin loop panicked");
    }
    let _ = out_tx.send(Outgoing::Close);
    let _ = writer.await;
}

// ─── Request dispatch ─────────────────────────────────────────────────────────

async fn handle_request(req: &JsonRpcRequest, state: &Arc<RwLock<AppState>>) -> JsonRpcResponse {
    match req.method.as_str() {
        "initialize" => handle_initialize(req, state).await,
        "shutdown" => handle_shutdown(req, state).await,
        "execute" => handle_execute(req, state).await,
        m if m.starts_with("trigger.") => handle_trigger(req, state).await,
        _ => err_response(req.id.clone(), -32601, format!("Unknown method: {}", req.method)),
    }
}

async fn handle_initialize(req: &JsonRpcRequest, state: &Arc<RwLock<AppState>>) -> JsonRpcResponse {
    match Config::from_params(&req.params) {
        Ok(config) => initialize(req.id.clone(), config, state).await,
        Err(e) => err_response(req.id.clone(), -32602, e.to_string()),
    }
}

async fn initialize(id: Value, config: Config, state: &Arc<RwLock<AppState>>) -> JsonRpcResponse {
    let (subscription_map, out) = {
        let st = state.read().await;
        if st.addr.is_some() {
            return err_response(id.clone(), -32603, "already initialized".into());
        }
        (st.subscription_map.clone(), st.out.clone())
    };

    let client = match config.credentials() {
        Ok(creds) => match ApiClient::new(&creds, config.request_timeout()) {
            Ok(c) => Some(c),
            Err(e) => {
                return err_response(id.clone(), -32603, format!("API client failed: {e}"))
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "starting without API credentials, operations disabled");
            None
        }
    };

    let (addr, pending_rx) = match http_server::start(
        &config.bind_addr,
        subscription_map,
        config.signature_policy(),
    )
    .await
    {
        Ok(r) => r,
        Err(e) => {
            return err_response(id.clone(), -32603, format!("HTTP server failed: {e}"));
        }
    };

    let public_url = config
        .public_url
        .clone()
        .unwrap_or_else(|| format!("http://{addr}"))
        .trim_end_matches('/')
        .to_string();

    let mut st = state.write().await;
    st.store = SubscriptionStore::new(config.data_dir.clone());
    if let Err(e) = st.store.load() {
        tracing::error!(error = %e, "failed to load subscriptions");
    }

    // Stored target URLs follow the current public address.
    st.store.rebase_target_urls(&public_url);
    if st.store.len() > 0 {
        if let Err(e) = st.store.save() {
            tracing::error!(error = %e, "failed to save subscriptions");
        }
    }

    st.addr = Some(addr);
    st.public_url = public_url.clone();
    st.client = client;
    st.config = Some(config);
    st.refresh_subscription_map().await;

    tokio::spawn(forward_deliveries(pending_rx, out));

    tracing::info!(%addr, %public_url, subscriptions = st.store.len(), "initialized");
    raw_response(id, json!({ "ready": true, "public_url": public_url }))
}

async fn handle_shutdown(req: &JsonRpcRequest, state: &Arc<RwLock<AppState>>) -> JsonRpcResponse {
    let st = state.read().await;
    if st.config.is_some() {
        if let Err(e) = st.store.save() {
            tracing::error!(error = %e, "failed to save subscriptions on shutdown");
        }
    }
    raw_response(req.id.clone(), json!({}))
}

// ─── Delivery forwarding ──────────────────────────────────────────────────────

/// Publish each accepted delivery to the host as an `event.publish` notification.
async fn forward_deliveries(
    mut pending_rx: mpsc::UnboundedReceiver<PendingEvent>,
    out: mpsc::UnboundedSender<Outgoing>,
) {
    while let Some(event) = pending_rx.recv().await {
        tracing::debug!(delivery_id = %event.delivery_id, "publishing delivery");
        emit(&out, &event_notification(event));
    }
}

fn event_notification(event: PendingEvent) -> JsonRpcNotification {
    JsonRpcNotification {
        jsonrpc: "2.0",
        method: "event.publish",
        params: json!({
            "type": EVENT_TYPE,
            "subject": event.trigger_id,
            "data": {
                "delivery_id": event.delivery_id,
                "received_at": event.received_at.to_rfc3339(),
                "event": event.event,
                "items": [{ "json": event.data }],
            },
        }),
    }
}

// ─── Execute handler ──────────────────────────────────────────────────────────

async fn handle_execute(req: &JsonRpcRequest, state: &Arc<RwLock<AppState>>) -> JsonRpcResponse {
    let operation = req
        .params
        .get("operation")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let input = req.params.get("input").cloned().unwrap_or(Value::Null);
    let continue_on_fail = req
        .params
        .get("continue_on_fail")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let result = match operation {
        "get_server_info" => op_get_server_info(state).await,
        "test_credentials" => op_test_credentials(state).await,
        _ => match operation.split_once('.') {
            Some((resource, op)) => {
                op_run(resource, op, input, continue_on_fail, state).await
            }
            None => Err(format!("Unknown operation: {operation}")),
        },
    };

    match result {
        Ok(data) => ok_response(req.id.clone(), data),
        Err(msg) => err_response(req.id.clone(), -32000, msg),
    }
}

fn input_records(input: Value) -> Vec<Value> {
    match input {
        Value::Array(items) => items,
        Value::Null => vec![json!({})],
        other => vec![other],
    }
}

async fn op_run(
    resource: &str,
    operation: &str,
    input: Value,
    continue_on_fail: bool,
    state: &Arc<RwLock<AppState>>,
) -> Result<Value, String> {
    let client = {
        let st = state.read().await;
        st.client()?.clone()
    };
    let inputs = input_records(input);
    let records =
        operations::run_batch(&client, resource, operation, &inputs, continue_on_fail)
            .await
            .map_err(|e| e.to_string())?;
    let items = serde_json::to_value(records).map_err(|e| e.to_string())?;
    Ok(json!({ "items": items }))
}

async fn op_get_server_info(state: &Arc<RwLock<AppState>>) -> Result<Value, String> {
    let st = state.read().await;
    let addr = st.addr.ok_or("server not initialized")?;
    let registered = st
        .store
        .list()
        .into_iter()
        .filter(|s| s.remote_id.is_some())
        .count();
    Ok(json!({
        "address": addr.to_string(),
        "public_url": st.public_url,
        "api_base_url": st.client.as_ref().map(ApiClient::base_url),
        "subscription_count": st.store.len(),
        "registered_count": registered,
    }))
}

async fn op_test_credentials(state: &Arc<RwLock<AppState>>) -> Result<Value, String> {
    let client = {
        let st = state.read().await;
        st.client()?.clone()
    };
    match client.test_credentials().await {
        Ok(quota) => Ok(json!({ "valid": true, "quota": quota })),
        Err(e) => Ok(json!({ "valid": false, "message": e.to_string() })),
    }
}

// ─── Trigger lifecycle ────────────────────────────────────────────────────────

async fn handle_trigger(req: &JsonRpcRequest, state: &Arc<RwLock<AppState>>) -> JsonRpcResponse {
    let method = req.method.strip_prefix("trigger.").unwrap_or("");
    let trigger_id = req.params.get("trigger_id").and_then(|v| v.as_str());

    let result = match (method, trigger_id) {
        ("list", _) => trigger_list(state).await,
        ("activate" | "deactivate" | "exists", None) => {
            return err_response(
                req.id.clone(),
                -32602,
                "missing required field: trigger_id".into(),
            )
        }
        ("activate", Some(id)) => {
            let event = req
                .params
                .get("event")
                .and_then(|v| v.as_str())
                .unwrap_or(WILDCARD);
            trigger_activate(id, event, state).await
        }
        ("deactivate", Some(id)) => trigger_deactivate(id, state).await,
        ("exists", Some(id)) => trigger_exists(id, state).await,
        _ => {
            return err_response(
                req.id.clone(),
                -32601,
                format!("Unknown method: {}", req.method),
            )
        }
    };

    match result {
        Ok(data) => ok_response(req.id.clone(), data),
        Err(msg) => err_response(req.id.clone(), -32000, msg),
    }
}

fn subscription_json(sub: &Subscription) -> Value {
    json!({
        "trigger_id": sub.trigger_id,
        "remote_id": sub.remote_id,
        "target_url": sub.target_url,
        "event": sub.event_filter.to_string(),
        "signed": sub.signing_secret().is_some(),
        "created_at": sub.created_at,
    })
}

async fn trigger_activate(
    trigger_id: &str,
    event: &str,
    state: &Arc<RwLock<AppState>>,
) -> Result<Value, String> {
    let filter = EventFilter::parse(event)?;

    let mut st = state.write().await;
    if st.addr.is_none() {
        return Err("server not initialized".into());
    }
    let target_url = store::target_url(&st.public_url, trigger_id);
    let mut sub = st
        .store
        .get(trigger_id)
        .cloned()
        .unwrap_or_else(|| Subscription::new(trigger_id, target_url.clone(), filter.clone()));
    sub.target_url = target_url;

    let registered = match st.client.as_ref() {
        Some(client) => {
            if sub.event_filter != filter {
                tracing::info!(%trigger_id, from = %sub.event_filter, to = %filter, "event filter changed");
                lifecycle::deregister(client, &mut sub).await;
                sub.event_filter = filter;
            }
            lifecycle::activate(client, &mut sub).await
        }
        None => {
            tracing::warn!(%trigger_id, "no API credentials, trigger will not be registered");
            sub.event_filter = filter;
            false
        }
    };

    let body = subscription_json(&sub);
    st.store.set(sub);
    st.store.save().map_err(|e| e.to_string())?;
    st.refresh_subscription_map().await;

    Ok(json!({ "registered": registered, "subscription": body }))
}

async fn trigger_deactivate(
    trigger_id: &str,
    state: &Arc<RwLock<AppState>>,
) -> Result<Value, String> {
    let mut st = state.write().await;
    let Some(mut sub) = st.store.get(trigger_id).cloned() else {
        return Ok(json!({ "deleted": false }));
    };

    match st.client.as_ref() {
        Some(client) => lifecycle::deregister(client, &mut sub).await,
        None if sub.remote_id.is_some() => {
            tracing::warn!(%trigger_id, "no API credentials, remote webhook left in place")
        }
        None => {}
    }

    st.store.delete(trigger_id);
    st.store.save().map_err(|e| e.to_string())?;
    st.refresh_subscription_map().await;
    Ok(json!({ "deleted": true }))
}

async fn trigger_exists(trigger_id: &str, state: &Arc<RwLock<AppState>>) -> Result<Value, String> {
    let st = state.read().await;
    let exists = match (st.store.get(trigger_id), st.client.as_ref()) {
        (Some(sub), Some(client)) => lifecycle::exists(client, sub).await,
        _ => false,
    };
    Ok(json!({ "exists": exists }))
}

async fn trigger_list(state: &Arc<RwLock<AppState>>) -> Result<Value, String> {
    let st = state.read().await;
    let items: Vec<Value> = st.store.list().into_iter().map(subscription_json).collect();
    let total = items.len();
    Ok(json!({ "items": items, "total": total }))
}
