//! Per-worker execution context.
//!
//! # Responsibilities
//! - Own one worker's slot table, connection row, and chunk pool
//! - Choreograph the per-request lifecycle: slot → connection → chunks → release
//!
//! # Design Decisions
//! - Exactly one worker owns a Context; nothing here is synchronized
//! - Field order fixes teardown order: slots release their borrows before
//!   the row and the pool they borrow from are dropped

use crate::error::{GatewayError, GatewayResult};
use crate::mux::chunk::{Chunk, ChunkBufferPool};
use crate::mux::matrix::{ConnectionRow, LocationId};
use crate::mux::registry::WorkerId;
use crate::mux::slots::{RequestSlotTable, SlotId, SlotState};
use crate::net::upstream::UpstreamConnection;

/// One worker's private request-multiplexing state.
#[derive(Debug)]
pub struct Context {
    worker_id: WorkerId,
    // Declaration order is drop order: slots first, they hold borrows.
    slots: RequestSlotTable,
    row: ConnectionRow,
    chunks: ChunkBufferPool,
}

impl Context {
    /// Assemble a context from its pre-built parts. `offset` and `capacity`
    /// come from the registry, which has already bounds-checked them.
    pub(crate) fn new(
        row: ConnectionRow,
        worker_id: WorkerId,
        offset: u16,
        capacity: u16,
    ) -> Self {
        Self {
            worker_id,
            slots: RequestSlotTable::new(offset, capacity),
            row,
            chunks: ChunkBufferPool::new(),
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Resolve a configured location name to its index in this row.
    pub fn location_id(&self, name: &str) -> Option<LocationId> {
        self.row.location_id(name)
    }

    /// Number of requests currently in flight on this worker.
    pub fn in_flight(&self) -> usize {
        self.slots.in_flight()
    }

    /// Idle chunks held by this worker's pool.
    pub fn idle_chunks(&self) -> usize {
        self.chunks.idle()
    }

    /// Admit a request bound for `location`. Slot exhaustion is the
    /// backpressure signal: reject or defer, the table never queues.
    pub fn begin_request(&mut self, location: LocationId) -> GatewayResult<SlotId> {
        if location.as_usize() >= self.row.location_count() {
            return Err(GatewayError::Range {
                what: "location",
                index: location.as_usize(),
                len: self.row.location_count(),
            });
        }
        let id = self.slots.allocate()?;
        self.slots.get_mut(id)?.bind_location(location);
        tracing::trace!(worker = %self.worker_id, slot = %id, "request admitted");
        Ok(id)
    }

    /// The backend connection serving `id`'s location, reconnecting a
    /// broken cell first. Failure is scoped to this request.
    pub async fn connection(&mut self, id: SlotId) -> GatewayResult<&mut UpstreamConnection> {
        let slot = self.slots.get_mut(id)?;
        let location = slot.location().ok_or(GatewayError::Missing {
            what: "slot location",
            index: id.as_u16() as usize,
        })?;
        self.row.get(location).await
    }

    /// Borrow a pooled buffer into the slot for body streaming.
    pub fn acquire_chunk(&mut self, id: SlotId, size_hint: usize) -> GatewayResult<&mut Chunk> {
        let chunk = self.chunks.acquire(size_hint);
        let slot = match self.slots.get_mut(id) {
            Ok(slot) => slot,
            Err(e) => {
                // Stale id: the buffer goes straight back to the pool.
                self.chunks.release(chunk);
                return Err(e);
            }
        };
        slot.set_state(SlotState::Streaming);
        Ok(slot.push_chunk(chunk))
    }

    /// Complete a request: return every borrowed chunk to the pool and
    /// release the slot.
    pub fn end_request(&mut self, id: SlotId) -> GatewayResult<()> {
        self.slots.get_mut(id)?.set_state(SlotState::Ended);
        for chunk in self.slots.release(id) {
            self.chunks.release(chunk);
        }
        tracing::trace!(worker = %self.worker_id, slot = %id, "request complete");
        Ok(())
    }

    /// Abort a request at any lifecycle point (client disconnect, timeout).
    ///
    /// Releases the slot and its chunks without leaking. The shared
    /// connection stays open unless the transport itself is corrupted, in
    /// which case the cell is flagged so the next use redials.
    pub fn abort_request(&mut self, id: SlotId, transport_broken: bool) -> GatewayResult<()> {
        let location = self.slots.get_mut(id)?.location();
        if transport_broken {
            if let Some(location) = location {
                self.row.mark_broken(location);
            }
        }
        for chunk in self.slots.release(id) {
            self.chunks.release(chunk);
        }
        tracing::debug!(
            worker = %self.worker_id,
            slot = %id,
            transport_broken,
            "request aborted"
        );
        Ok(())
    }

    /// Apply the configured dial policy; called once at worker startup.
    /// Cells that fail to dial stay Broken and redial on first use.
    pub async fn connect_eager(&mut self) {
        self.row.connect_eager().await;
    }

    #[cfg(test)]
    pub(crate) fn row(&self) -> &ConnectionRow {
        &self.row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, LocationConfig};
    use crate::mux::matrix::ConnectionMatrix;
    use crate::net::upstream::ConnectionState;

    fn test_context(capacity: u16, address: &str) -> Context {
        let mut config = GatewayConfig::default();
        config.locations.push(LocationConfig {
            name: "app".into(),
            address: address.into(),
            dial: Default::default(),
            connect_timeout_secs: 1,
        });
        let mut matrix = ConnectionMatrix::build(&config, 1).unwrap();
        let row = matrix.claim_row(WorkerId::new(0)).unwrap();
        Context::new(row, WorkerId::new(0), 1, capacity)
    }

    #[test]
    fn test_begin_and_end_request() {
        let mut ctx = test_context(4, "127.0.0.1:9000");
        let loc = ctx.location_id("app").unwrap();

        let id = ctx.begin_request(loc).unwrap();
        assert_eq!(ctx.in_flight(), 1);

        ctx.acquire_chunk(id, 1024).unwrap();
        ctx.end_request(id).unwrap();
        assert_eq!(ctx.in_flight(), 0);
        assert_eq!(ctx.idle_chunks(), 1);
    }

    #[test]
    fn test_backpressure_on_exhaustion() {
        let mut ctx = test_context(2, "127.0.0.1:9000");
        let loc = ctx.location_id("app").unwrap();

        ctx.begin_request(loc).unwrap();
        ctx.begin_request(loc).unwrap();
        assert!(matches!(
            ctx.begin_request(loc),
            Err(GatewayError::Exhausted { .. })
        ));
    }

    #[test]
    fn test_abort_returns_chunks_without_breaking_connection() {
        let mut ctx = test_context(4, "127.0.0.1:9000");
        let loc = ctx.location_id("app").unwrap();

        let id = ctx.begin_request(loc).unwrap();
        ctx.acquire_chunk(id, 64).unwrap();
        ctx.acquire_chunk(id, 64).unwrap();

        ctx.abort_request(id, false).unwrap();
        assert_eq!(ctx.in_flight(), 0);
        assert_eq!(ctx.idle_chunks(), 2);
        assert_eq!(
            ctx.row().state_of(loc),
            Some(ConnectionState::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_abort_with_broken_transport_flags_cell() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let mut ctx = test_context(4, &addr);
        let loc = ctx.location_id("app").unwrap();

        let id = ctx.begin_request(loc).unwrap();
        ctx.connection(id).await.unwrap();
        assert_eq!(ctx.row().state_of(loc), Some(ConnectionState::Connected));

        ctx.abort_request(id, true).unwrap();
        assert_eq!(ctx.row().state_of(loc), Some(ConnectionState::Broken));
        assert_eq!(ctx.in_flight(), 0);
    }

    #[test]
    fn test_stale_id_does_not_leak_chunk() {
        let mut ctx = test_context(4, "127.0.0.1:9000");
        let loc = ctx.location_id("app").unwrap();

        let id = ctx.begin_request(loc).unwrap();
        ctx.end_request(id).unwrap();

        assert!(ctx.acquire_chunk(id, 64).is_err());
        // The chunk acquired for the stale id was returned to the pool.
        assert_eq!(ctx.idle_chunks(), 1);
    }
}
