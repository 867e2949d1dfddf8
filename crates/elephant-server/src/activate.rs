//! Activation dispatch. The identifier is opaque to the core; the provider
//! looks the item up and runs the action. Activation never touches the
//! connection's pending query.

use std::sync::Arc;

use elephant_core::{ActivateContext, ActivateRequest};
use elephant_proto::{ResponseOp, WireFormat};

use crate::registry::ProviderRegistry;
use crate::updates::{AsyncItemSink, ConnectionHandle};

/// Run the named provider's activation and acknowledge with
/// `ActivationFinished`. Failures are provider-defined: they are logged and
/// the client is unblocked regardless.
pub async fn handle_activate(
    registry: &ProviderRegistry,
    handle: &Arc<ConnectionHandle>,
    format: WireFormat,
    req: ActivateRequest,
) {
    match registry.dispatchable(&req.provider) {
        Some(provider) => {
            let ctx = ActivateContext {
                identifier: req.identifier,
                action: req.action,
                query: req.query,
                arguments: req.arguments,
                sink: AsyncItemSink::new(Arc::clone(handle), format),
            };
            if let Err(e) = provider.activate(ctx).await {
                tracing::error!(provider = %req.provider, error = %e, "Activation failed");
            }
        }
        None => {
            tracing::error!(provider = %req.provider, "Activation for unknown provider");
        }
    }

    if let Err(e) = handle.write_status(ResponseOp::ActivationFinished).await {
        tracing::debug!(cid = handle.cid, error = %e, "Activation acknowledgement failed");
    }
}
