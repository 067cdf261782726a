use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::binding::BindingInfo;
use crate::error::RoutingError;
use crate::message::{Headers, InstanceProperties, Message, DEFAULT_PRIORITY};
use crate::router::{PublishResult, SharedRouter};

#[derive(Clone)]
struct AppState {
    router: SharedRouter,
}

pub fn app(router: SharedRouter) -> Router {
    let state = AppState { router };

    Router::new()
        .route("/exchanges", get(list_exchanges))
        .route("/exchanges/:exchange/bindings", post(bind).delete(unbind))
        .route("/exchanges/:exchange/publish", post(publish))
        .route("/queues", get(list_queues))
        .route("/queues/:queue/messages", get(get_queue_messages).delete(delete_queue_messages))
        .with_state(state)
}

type ApiResponse = (StatusCode, Json<JsonValue>);

fn error_response(err: RoutingError) -> ApiResponse {
    let status = match &err {
        RoutingError::UnknownExchange(_)
        | RoutingError::UnknownQueue(_)
        | RoutingError::UnknownBinding { .. } => StatusCode::NOT_FOUND,
        RoutingError::DuplicateBinding { .. }
        | RoutingError::ExchangeExists(_)
        | RoutingError::QueueExists(_) => StatusCode::CONFLICT,
        RoutingError::ReservedExchange(_) => StatusCode::FORBIDDEN,
        RoutingError::FilterCompilation { .. } | RoutingError::InvalidBindingKey { .. } => {
            StatusCode::BAD_REQUEST
        }
    };
    (status, Json(json!({ "error": err.to_string() })))
}

#[derive(Debug, Deserialize)]
struct BindRequest {
    queue: String,
    #[serde(default)]
    binding_key: String,
    #[serde(default)]
    arguments: Headers,
}

#[derive(Debug, Deserialize)]
struct UnbindRequest {
    queue: String,
    #[serde(default)]
    binding_key: String,
}

#[derive(Debug, Deserialize)]
struct PublishRequest {
    #[serde(default)]
    routing_key: String,
    #[serde(default)]
    headers: Headers,
    #[serde(default)]
    body: String,
    correlation_id: Option<String>,
    message_type: Option<String>,
    priority: Option<u8>,
    #[serde(default)]
    persistent: bool,
    origin: Option<String>,
    #[serde(default)]
    redelivered: bool,
}

impl PublishRequest {
    fn into_parts(self) -> (Message, InstanceProperties) {
        let mut builder = Message::builder()
            .routing_key(self.routing_key)
            .body(self.body)
            .priority(self.priority.unwrap_or(DEFAULT_PRIORITY))
            .persistent(self.persistent);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        if let Some(id) = self.correlation_id {
            builder = builder.correlation_id(id);
        }
        if let Some(message_type) = self.message_type {
            builder = builder.message_type(message_type);
        }
        if let Some(origin) = self.origin {
            builder = builder.origin(origin);
        }
        let instance = InstanceProperties {
            persistent: None,
            redelivered: self.redelivered,
        };
        (builder.build(), instance)
    }
}

async fn list_exchanges(State(state): State<AppState>) -> impl IntoResponse {
    let exchanges: Vec<JsonValue> = state
        .router
        .exchanges()
        .iter()
        .map(|exchange| {
            let bindings: Vec<BindingInfo> =
                exchange.bindings().iter().map(|b| b.info()).collect();
            json!({
                "name": exchange.name(),
                "type": exchange.kind(),
                "bindings": bindings,
            })
        })
        .collect();
    Json(exchanges)
}

async fn bind(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    Json(request): Json<BindRequest>,
) -> impl IntoResponse {
    match state.router.bind(
        &exchange,
        &request.queue,
        &request.binding_key,
        request.arguments,
    ) {
        Ok(binding) => (StatusCode::CREATED, Json(json!(binding.info()))),
        Err(err) => {
            warn!(exchange = %exchange, queue = %request.queue, error = %err, "Bind rejected");
            error_response(err)
        }
    }
}

async fn unbind(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    Json(request): Json<UnbindRequest>,
) -> impl IntoResponse {
    match state
        .router
        .unbind(&exchange, &request.queue, &request.binding_key)
    {
        Ok(binding) => (StatusCode::OK, Json(json!(binding.info()))),
        Err(err) => error_response(err),
    }
}

async fn publish(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    Json(request): Json<PublishRequest>,
) -> impl IntoResponse {
    let (message, instance) = request.into_parts();
    match state.router.publish(&exchange, message, &instance) {
        PublishResult::Accepted(routed_to) => {
            (StatusCode::OK, Json(json!({ "routed_to": routed_to })))
        }
        PublishResult::UnknownExchange => {
            error_response(RoutingError::UnknownExchange(exchange))
        }
    }
}

async fn list_queues(State(state): State<AppState>) -> impl IntoResponse {
    let queues: Vec<JsonValue> = state
        .router
        .queues()
        .iter()
        .map(|queue| {
            json!({
                "name": queue.name(),
                "owner": queue.owner(),
                "sort_key": queue.sort_key(),
                "depth": queue.depth(),
                "enqueued_total": queue.enqueued_total(),
            })
        })
        .collect();
    Json(queues)
}

async fn get_queue_messages(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> impl IntoResponse {
    if let Some(target) = state.router.queue(&queue) {
        (StatusCode::OK, Json(json!(target.snapshot())))
    } else {
        error_response(RoutingError::UnknownQueue(queue))
    }
}

async fn delete_queue_messages(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> impl IntoResponse {
    if let Some(target) = state.router.queue(&queue) {
        let count = target.clear();
        info!(queue = %queue, count = count, "Deleted queue messages");
        (StatusCode::OK, Json(json!({ "deleted": count })))
    } else {
        error_response(RoutingError::UnknownQueue(queue))
    }
}
