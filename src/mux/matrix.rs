//! Backend connection partitioning.
//!
//! # Responsibilities
//! - Build one connection handle per (location, worker) pair, row-major
//! - Transfer exclusive ownership of each row to its worker's Context
//! - Redial broken connections on a row's next use
//!
//! # Design Decisions
//! - Built exactly once, at registry init; no I/O during the build
//! - A row can be claimed once; a second claim fails rather than ever
//!   producing two closable handles for the same cell
//! - Rows still held by the matrix at drop close their own connections;
//!   distributed rows are their Context's responsibility

use std::time::Duration;

use crate::config::{DialPolicy, GatewayConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::mux::registry::WorkerId;
use crate::net::upstream::{ConnectionState, Endpoint, UpstreamConnection};

/// Index of a configured upstream location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocationId(u16);

impl LocationId {
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loc-{}", self.0)
    }
}

/// One (location, worker) cell.
#[derive(Debug)]
struct Cell {
    name: String,
    dial: DialPolicy,
    conn: UpstreamConnection,
}

/// One worker's private slice of the matrix: one connection per location.
#[derive(Debug)]
pub struct ConnectionRow {
    worker_id: WorkerId,
    cells: Vec<Cell>,
}

impl ConnectionRow {
    pub fn location_count(&self) -> usize {
        self.cells.len()
    }

    /// Resolve a configured location name to its index.
    pub fn location_id(&self, name: &str) -> Option<LocationId> {
        self.cells
            .iter()
            .position(|c| c.name == name)
            .map(|i| LocationId(i as u16))
    }

    /// The dedicated connection for `location`, dialing first when the cell
    /// is broken or not yet connected. Redial failure is scoped to the
    /// requesting call.
    pub async fn get(&mut self, location: LocationId) -> GatewayResult<&mut UpstreamConnection> {
        let len = self.cells.len();
        let cell = self
            .cells
            .get_mut(location.as_usize())
            .ok_or(GatewayError::Range {
                what: "location",
                index: location.as_usize(),
                len,
            })?;

        if cell.conn.state() != ConnectionState::Connected {
            cell.conn
                .connect()
                .await
                .map_err(|source| GatewayError::Connection {
                    location: cell.name.clone(),
                    source,
                })?;
        }
        Ok(&mut cell.conn)
    }

    /// Dial every eager-policy cell. Called once when the worker starts;
    /// lazy cells wait for their first request. A failed dial leaves that
    /// cell Broken to redial on first use; the remaining cells still get
    /// their startup dial.
    pub async fn connect_eager(&mut self) {
        for cell in &mut self.cells {
            if cell.dial != DialPolicy::Eager {
                continue;
            }
            match cell.conn.connect().await {
                Ok(()) => tracing::debug!(
                    worker = %self.worker_id,
                    location = %cell.name,
                    "eager dial complete"
                ),
                Err(e) => tracing::warn!(
                    worker = %self.worker_id,
                    location = %cell.name,
                    error = %e,
                    "eager dial failed; will retry on use"
                ),
            }
        }
    }

    /// Flag a cell's transport as corrupted so the next use redials.
    pub fn mark_broken(&mut self, location: LocationId) {
        if let Some(cell) = self.cells.get_mut(location.as_usize()) {
            cell.conn.mark_broken();
        }
    }

    #[cfg(test)]
    pub(crate) fn state_of(&self, location: LocationId) -> Option<ConnectionState> {
        self.cells.get(location.as_usize()).map(|c| c.conn.state())
    }
}

/// Shared, built-once table of backend connections: rows = workers,
/// columns = locations.
#[derive(Debug)]
pub struct ConnectionMatrix {
    rows: Vec<Option<ConnectionRow>>,
}

impl ConnectionMatrix {
    /// Create `worker_count` independent connection handles per location.
    /// Fails when a location address does not parse; creates no sockets.
    pub fn build(config: &GatewayConfig, worker_count: u16) -> GatewayResult<Self> {
        let mut endpoints = Vec::with_capacity(config.locations.len());
        for location in &config.locations {
            let endpoint = Endpoint::parse(&location.address).ok_or_else(|| {
                GatewayError::Config(format!(
                    "location '{}' has invalid address '{}'",
                    location.name, location.address
                ))
            })?;
            endpoints.push(endpoint);
        }

        let rows = (0..worker_count)
            .map(|w| {
                let cells = config
                    .locations
                    .iter()
                    .zip(&endpoints)
                    .map(|(location, endpoint)| Cell {
                        name: location.name.clone(),
                        dial: location.dial,
                        conn: UpstreamConnection::new(
                            endpoint.clone(),
                            Duration::from_secs(location.connect_timeout_secs),
                        ),
                    })
                    .collect();
                Some(ConnectionRow {
                    worker_id: WorkerId::new(w),
                    cells,
                })
            })
            .collect();

        Ok(Self { rows })
    }

    /// Transfer exclusive ownership of a worker's row. A second claim for
    /// the same worker fails: the handles are already live elsewhere.
    pub fn claim_row(&mut self, worker_id: WorkerId) -> GatewayResult<ConnectionRow> {
        let len = self.rows.len();
        let entry = self
            .rows
            .get_mut(worker_id.as_usize())
            .ok_or(GatewayError::Range {
                what: "worker row",
                index: worker_id.as_usize(),
                len,
            })?;
        entry.take().ok_or(GatewayError::Missing {
            what: "worker row",
            index: worker_id.as_usize(),
        })
    }

    /// Rows not yet distributed to a Context.
    pub fn remaining(&self) -> usize {
        self.rows.iter().filter(|r| r.is_some()).count()
    }
}
