//! One task per accepted connection: read request frames, demultiplex by
//! opcode, keep per-frame error isolation so one bad request never takes the
//! connection down.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

use elephant_core::{ActivateRequest, MenuRequest, ProviderUpdates, QueryRequest, StateRequest};
use elephant_proto::{decode, read_request, FrameError, RequestOp, ResponseOp, WireFormat};

use crate::activate::handle_activate;
use crate::query::Dispatcher;
use crate::registry::ProviderRegistry;
use crate::state::handle_state;
use crate::updates::ConnectionHandle;

/// Result budget for queries synthesized from a `MenuRequest`.
const MENU_MAX_RESULTS: i32 = 50;

/// Shared daemon state handed to every connection task.
pub struct ServerState {
    pub registry: Arc<ProviderRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub updates: ProviderUpdates,
    next_cid: AtomicU32,
}

impl ServerState {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        dispatcher: Arc<Dispatcher>,
        updates: ProviderUpdates,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            dispatcher,
            updates,
            next_cid: AtomicU32::new(0),
        })
    }
}

/// Serve one client connection until it closes.
pub async fn handle_connection(stream: UnixStream, state: Arc<ServerState>) {
    let cid = state.next_cid.fetch_add(1, Ordering::Relaxed) + 1;
    let (mut reader, writer) = stream.into_split();
    let handle = ConnectionHandle::new(cid, writer);

    // provider names this connection wants state-update relays for
    let subscriptions: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut relay_running = false;
    let closed = CancellationToken::new();

    tracing::debug!(cid, "Client connected");

    loop {
        let frame = match read_request(&mut reader).await {
            Ok(frame) => frame,
            Err(FrameError::Closed) => break,
            Err(e) => {
                tracing::error!(cid, error = %e, "Request read failed");
                break;
            }
        };

        let op = RequestOp::from_byte(frame.op);
        let Some(format) = WireFormat::from_byte(frame.format) else {
            tracing::error!(cid, format = frame.format, "Unknown wire format");
            release_client(&handle, op).await;
            continue;
        };

        match op {
            Some(RequestOp::Query) => match decode::<QueryRequest>(format, &frame.payload) {
                Ok(req) => spawn_query(&state, cid, &handle, format, req),
                Err(e) => {
                    tracing::error!(cid, error = %e, "Query decode failed");
                    release_client(&handle, op).await;
                }
            },
            Some(RequestOp::Menu) => match decode::<MenuRequest>(format, &frame.payload) {
                Ok(req) => {
                    let synthesized = QueryRequest {
                        providers: vec![format!("menus:{}", req.menu_name)],
                        query: String::new(),
                        maxresults: MENU_MAX_RESULTS,
                        exactsearch: false,
                    };
                    spawn_query(&state, cid, &handle, format, synthesized);
                }
                Err(e) => {
                    tracing::error!(cid, error = %e, "Menu decode failed");
                    release_client(&handle, op).await;
                }
            },
            Some(RequestOp::Activate) => match decode::<ActivateRequest>(format, &frame.payload) {
                Ok(req) => handle_activate(&state.registry, &handle, format, req).await,
                Err(e) => {
                    tracing::error!(cid, error = %e, "Activate decode failed");
                    release_client(&handle, op).await;
                }
            },
            Some(RequestOp::State) => match decode::<StateRequest>(format, &frame.payload) {
                Ok(req) => {
                    handle_state(&state.registry, &handle, format, &req).await;
                    subscriptions.lock().insert(req.provider.clone());
                    if !relay_running {
                        relay_running = true;
                        start_state_relay(
                            &state,
                            Arc::clone(&handle),
                            Arc::clone(&subscriptions),
                            format,
                            closed.clone(),
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(cid, error = %e, "State decode failed");
                    release_client(&handle, op).await;
                }
            },
            None => {
                tracing::error!(cid, op = frame.op, "Unknown request opcode");
                release_client(&handle, None).await;
            }
        }
    }

    closed.cancel();
    state.dispatcher.drop_connection(cid);
    tracing::debug!(cid, "Client disconnected");
}

/// Queries run concurrently with the read loop so a newer request on the
/// same connection can supersede them.
fn spawn_query(
    state: &Arc<ServerState>,
    cid: u32,
    handle: &Arc<ConnectionHandle>,
    format: WireFormat,
    req: QueryRequest,
) {
    let dispatcher = Arc::clone(&state.dispatcher);
    let handle = Arc::clone(handle);
    tokio::spawn(async move {
        dispatcher.dispatch(cid, handle, format, req).await;
    });
}

/// A request we could not decode still terminates its exchange, so the
/// client never hangs waiting on a response that cannot come.
async fn release_client(handle: &Arc<ConnectionHandle>, op: Option<RequestOp>) {
    let terminator = match op {
        Some(RequestOp::Query) | Some(RequestOp::Menu) => ResponseOp::QueryDone,
        Some(RequestOp::Activate) => ResponseOp::ActivationFinished,
        Some(RequestOp::State) | None => ResponseOp::StatusDone,
    };
    let _ = handle.write_status(terminator).await;
}

/// Relay `ProviderUpdated` tokens to this connection as fresh
/// `ProviderState` frames, for the providers it subscribed to.
fn start_state_relay(
    state: &Arc<ServerState>,
    handle: Arc<ConnectionHandle>,
    subscriptions: Arc<Mutex<HashSet<String>>>,
    format: WireFormat,
    closed: CancellationToken,
) {
    let mut rx = state.updates.subscribe();
    let registry = Arc::clone(&state.registry);

    tokio::spawn(async move {
        loop {
            let token = tokio::select! {
                _ = closed.cancelled() => break,
                token = rx.recv() => token,
            };
            let token = match token {
                Ok(token) => token,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "State relay lagged");
                    continue;
                }
                Err(_) => break,
            };

            let provider_name = token.split(':').next().unwrap_or_default().to_string();
            if !subscriptions.lock().contains(&provider_name) {
                continue;
            }
            let Some(provider) = registry.get(&provider_name) else {
                continue;
            };

            let mut resp = provider.state();
            resp.provider = provider_name;
            let Ok(payload) = elephant_proto::encode(format, &resp) else {
                continue;
            };
            if handle
                .write_frame(ResponseOp::ProviderState, &payload)
                .await
                .is_err()
            {
                break;
            }
        }
    });
}
