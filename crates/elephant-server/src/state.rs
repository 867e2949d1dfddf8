//! Provider-state endpoint: reports a provider's state tokens and its
//! provider-level actions, so clients can render affordances like "Start
//! scanning".

use std::sync::Arc;

use elephant_core::StateRequest;
use elephant_proto::{encode, ResponseOp, WireFormat};

use crate::registry::ProviderRegistry;
use crate::updates::ConnectionHandle;

/// Forward the provider's state and terminate the exchange with
/// `StatusDone`. Unknown providers get an empty exchange.
pub async fn handle_state(
    registry: &ProviderRegistry,
    handle: &Arc<ConnectionHandle>,
    format: WireFormat,
    req: &StateRequest,
) {
    if let Some(provider) = registry.get(&req.provider) {
        let mut resp = provider.state();
        resp.provider = req.provider.clone();
        match encode(format, &resp) {
            Ok(payload) => {
                if let Err(e) = handle.write_frame(ResponseOp::ProviderState, &payload).await {
                    tracing::debug!(cid = handle.cid, error = %e, "State write failed");
                    return;
                }
            }
            Err(e) => tracing::error!(provider = %req.provider, error = %e, "State encode failed"),
        }
    } else {
        tracing::error!(provider = %req.provider, "State request for unknown provider");
    }

    if let Err(e) = handle.write_status(ResponseOp::StatusDone).await {
        tracing::debug!(cid = handle.cid, error = %e, "State terminator failed");
    }
}
