//! RPC method handlers.
//!
//! Every method runs synchronously on the connection's reader task, so the
//! frames from one client are applied in the order they arrived.

use std::sync::Arc;

use huddle_core::{Command, ParticipantId, SessionId};
use huddle_telemetry::MetricsRecorder;

use crate::client::{Attachment, ClientId, ClientRegistry};
use crate::hub::SessionHub;
use crate::rpc::{self, Ack, RpcRequest, RpcResponse};
use crate::wire::{self, ParticipantParams};

pub const CLIENTS: &str = "huddle.clients";

type RequestId = Option<serde_json::Value>;

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub hub: Arc<SessionHub>,
    pub clients: Arc<ClientRegistry>,
    pub metrics: Arc<MetricsRecorder>,
}

impl HandlerState {
    pub fn new(
        hub: Arc<SessionHub>,
        clients: Arc<ClientRegistry>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            hub,
            clients,
            metrics,
        }
    }

    pub fn record_client_count(&self) {
        self.metrics
            .gauge_set(CLIENTS, &[], self.clients.count() as f64);
    }
}

/// Handle one inbound text frame and return the response frame.
pub fn handle_text(state: &Arc<HandlerState>, client_id: &ClientId, text: &str) -> String {
    let response = match serde_json::from_str::<RpcRequest>(text) {
        Ok(request) => {
            let params = request.params.unwrap_or_else(|| serde_json::json!({}));
            dispatch(state, client_id, &request.method, &params, request.id)
        }
        Err(e) => {
            tracing::debug!(client_id = %client_id, error = %e, "unparseable frame");
            RpcResponse::parse_error()
        }
    };
    serde_json::to_string(&response).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize response");
        r#"{"id":null,"success":false,"error":{"code":"INTERNAL_ERROR","message":"serialization failed"}}"#
            .to_string()
    })
}

/// Dispatch an RPC method to the appropriate handler.
///
/// Normalizes camelCase and legacy params before routing, so all handlers
/// receive consistent snake_case keys.
pub fn dispatch(
    state: &Arc<HandlerState>,
    client_id: &ClientId,
    method: &str,
    params: &serde_json::Value,
    id: RequestId,
) -> RpcResponse {
    let params = wire::normalize_params(params);

    match method {
        "joinSession" => join_session(state, client_id, &params, id),
        "chooseCard" => choose_card(state, &params, id),
        "revealCards" => session_command(state, &params, id, Command::Reveal),
        "resetGame" => session_command(state, &params, id, Command::Reset),
        "userExited" => user_exited(state, client_id, &params, id),
        "getSession" => get_session(state, &params, id),
        "ping" => ping(id),
        _ => RpcResponse::method_not_found(id, method),
    }
}

/// The socket behind `client_id` closed. Its seat is vacated unless another
/// live connection still holds the same participant in the same session.
pub fn disconnect(state: &Arc<HandlerState>, client_id: &ClientId) {
    let attachment = state.clients.unregister(client_id);
    state.record_client_count();
    tracing::info!(client_id = %client_id, "client disconnected");

    if let Some(seat) = attachment {
        release_seat(state, &seat);
    }
}

/// Apply a transport-level leave for a seat nobody holds any more.
///
/// The check runs with the session locked, so a second tab rejoining the same
/// participant either lands before it (and keeps the seat) or after the leave.
fn release_seat(state: &Arc<HandlerState>, seat: &Attachment) {
    let command = Command::Leave {
        participant_id: seat.participant_id.clone(),
    };
    let released = state
        .hub
        .apply_if(&seat.session_id, command, || !state.clients.is_held(seat));
    if released.is_none() {
        tracing::debug!(
            session_id = %seat.session_id,
            participant_id = %seat.participant_id,
            "seat still held by another connection"
        );
    }
    // A rejected leave means the seat was already gone after userExited.
}

fn require_session_id(params: &serde_json::Value) -> Result<SessionId, String> {
    let raw = rpc::require_str(params, "session_id")?;
    let session_id = SessionId::from_raw(raw);
    if session_id.is_empty() {
        return Err("Parameter must not be empty: session_id".into());
    }
    Ok(session_id)
}

// ── Commands ──

fn join_session(
    state: &Arc<HandlerState>,
    client_id: &ClientId,
    params: &serde_json::Value,
    id: RequestId,
) -> RpcResponse {
    let session_id = match require_session_id(params) {
        Ok(s) => s,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let Some(raw) = params.get("participant") else {
        return RpcResponse::invalid_params(id, "Missing required parameter: participant");
    };
    let participant = match serde_json::from_value::<ParticipantParams>(raw.clone()) {
        Ok(p) => p.into_participant(),
        Err(e) => return RpcResponse::invalid_params(id, format!("Invalid participant: {e}")),
    };
    let seat_id = participant.id.clone();

    let command = Command::Join { participant };
    if seat_id.is_empty() {
        // Rejected by the session; the connection keeps whatever seat it had.
        let result = state.hub.apply(&session_id, command);
        return RpcResponse::ack(id, Ack::from(&result));
    }

    let seat = Attachment {
        session_id: session_id.clone(),
        participant_id: seat_id,
    };
    // Attached under the session lock, before the join is applied, so the
    // joiner is among the recipients of its own joinedSession.
    let mut previous = None;
    let outcome = state.hub.apply_if(&session_id, command, || {
        match state.clients.attach(client_id, seat.clone()) {
            Ok(held) => {
                previous = held;
                true
            }
            Err(_) => false,
        }
    });
    let Some(result) = outcome else {
        return RpcResponse::error(id, rpc::INTERNAL_ERROR, "Connection closed");
    };

    match (&result, previous) {
        (Ok(_), Some(previous)) if previous != seat => release_seat(state, &previous),
        (Err(_), Some(previous)) => {
            let _ = state.clients.attach(client_id, previous);
        }
        (Err(_), None) => {
            state.clients.detach_if(client_id, &seat);
        }
        _ => {}
    }
    if result.is_ok() {
        tracing::info!(
            client_id = %client_id,
            session_id = %seat.session_id,
            participant_id = %seat.participant_id,
            "client joined session"
        );
    }

    RpcResponse::ack(id, Ack::from(&result))
}

fn choose_card(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: RequestId,
) -> RpcResponse {
    let session_id = match require_session_id(params) {
        Ok(s) => s,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let participant_id = match rpc::require_str(params, "participant_id") {
        Ok(p) => ParticipantId::from_raw(p),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let card = match rpc::require_i64(params, "card") {
        Ok(c) => c,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    let result = state.hub.apply(
        &session_id,
        Command::ChooseCard {
            participant_id,
            card,
        },
    );
    RpcResponse::ack(id, Ack::from(&result))
}

fn session_command(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: RequestId,
    command: Command,
) -> RpcResponse {
    let session_id = match require_session_id(params) {
        Ok(s) => s,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let result = state.hub.apply(&session_id, command);
    RpcResponse::ack(id, Ack::from(&result))
}

fn user_exited(
    state: &Arc<HandlerState>,
    client_id: &ClientId,
    params: &serde_json::Value,
    id: RequestId,
) -> RpcResponse {
    let session_id = match require_session_id(params) {
        Ok(s) => s,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    // Older clients send the whole participant object instead of an id.
    let participant_id = rpc::optional_str(params, "participant_id").or_else(|| {
        params
            .get("participant")
            .and_then(|p| p.get("id"))
            .and_then(|v| v.as_str())
    });
    let Some(participant_id) = participant_id.map(ParticipantId::from_raw) else {
        return RpcResponse::invalid_params(id, "Missing required parameter: participant_id");
    };

    let seat = Attachment {
        session_id: session_id.clone(),
        participant_id: participant_id.clone(),
    };
    let result = state.hub.apply(&session_id, Command::Leave { participant_id });
    if state.clients.detach_if(client_id, &seat) {
        tracing::info!(
            client_id = %client_id,
            session_id = %seat.session_id,
            participant_id = %seat.participant_id,
            "client left session"
        );
    }

    RpcResponse::ack(id, Ack::from(&result))
}

// ── Queries ──

fn get_session(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: RequestId,
) -> RpcResponse {
    let session_id = match require_session_id(params) {
        Ok(s) => s,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    match state.hub.snapshot(&session_id) {
        Some(snapshot) => match serde_json::to_value(snapshot) {
            Ok(value) => RpcResponse::success(id, value),
            Err(e) => RpcResponse::error(id, rpc::INTERNAL_ERROR, e.to_string()),
        },
        None => RpcResponse::session_not_found(id, session_id.as_str()),
    }
}

fn ping(id: RequestId) -> RpcResponse {
    RpcResponse::success(
        id,
        serde_json::json!({
            "pong": true,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}
