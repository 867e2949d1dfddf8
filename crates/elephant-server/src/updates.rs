//! Per-connection write handle and the sink providers use for asynchronous
//! item updates after activation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::Mutex;

use elephant_core::{Item, QueryResponse, UpdateSink};
use elephant_proto::{encode, write_frame, FrameError, ResponseOp, WireFormat};

/// All writes to one client connection go through this handle; the lock
/// keeps concurrent emitters (query dispatcher, async updaters, state
/// relays) from interleaving frames.
pub struct ConnectionHandle {
    pub cid: u32,
    writer: Mutex<OwnedWriteHalf>,
}

impl ConnectionHandle {
    pub fn new(cid: u32, writer: OwnedWriteHalf) -> Arc<Self> {
        Arc::new(Self {
            cid,
            writer: Mutex::new(writer),
        })
    }

    pub async fn write_frame(&self, op: ResponseOp, payload: &[u8]) -> Result<(), FrameError> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, op, payload).await
    }

    pub async fn write_status(&self, op: ResponseOp) -> Result<(), FrameError> {
        self.write_frame(op, &[]).await
    }
}

/// Provider-facing sink bound to one exchange: it captures the connection
/// and the exchange's wire format so later updates encode consistently.
pub struct AsyncItemSink {
    handle: Arc<ConnectionHandle>,
    format: WireFormat,
}

impl AsyncItemSink {
    pub fn new(handle: Arc<ConnectionHandle>, format: WireFormat) -> Arc<Self> {
        Arc::new(Self { handle, format })
    }
}

#[async_trait]
impl UpdateSink for AsyncItemSink {
    async fn push_item(&self, query: &str, item: Item) {
        let resp = QueryResponse {
            qid: 0,
            query: query.to_string(),
            item,
        };
        let payload = match encode(self.format, &resp) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "Async update encode failed");
                return;
            }
        };
        if let Err(e) = self
            .handle
            .write_frame(ResponseOp::QueryAsyncItem, &payload)
            .await
        {
            tracing::debug!(cid = self.handle.cid, error = %e, "Async update write failed");
        }
    }
}
