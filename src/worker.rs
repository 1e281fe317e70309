//! Worker startup and run loop.
//!
//! # Responsibilities
//! - Obtain the worker's identity from the registry, exactly once
//! - Claim the worker's Context and apply the configured dial policy
//! - Hold the Context for the worker's lifetime
//!
//! # Design Decisions
//! - Identity assignment and Context claim are the worker's only registry
//!   calls; everything afterwards is on privately owned state
//! - Request dispatch enters through `context_mut`; the accept loop and
//!   FastCGI record codec live in the host server

use tokio::sync::broadcast;

use crate::error::GatewayResult;
use crate::mux::{Context, ContextRegistry, WorkerId};

/// One worker's identity and private multiplexing state.
#[derive(Debug)]
pub struct Worker {
    id: WorkerId,
    ctx: Context,
}

impl Worker {
    /// Called once from each worker task at startup: takes the next
    /// identity and the matching Context.
    pub fn attach(registry: &ContextRegistry) -> GatewayResult<Worker> {
        let id = registry.assign_worker_id()?;
        let ctx = registry.claim(id)?;
        tracing::debug!(worker = %id, capacity = registry.capacity(), "worker attached");
        Ok(Worker { id, ctx })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// The worker's private multiplexing state.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Dial eager-policy locations before serving traffic. Failures are
    /// logged per cell, not fatal: broken cells redial on first use.
    pub async fn start(&mut self) {
        self.ctx.connect_eager().await;
    }

    /// Run until shutdown.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        self.start().await;
        tracing::info!(worker = %self.id, "worker running");

        let _ = shutdown.recv().await;

        tracing::info!(
            worker = %self.id,
            in_flight = self.ctx.in_flight(),
            "worker stopped"
        );
        // Dropping the Context releases slots, then the connection row,
        // then the chunk pool.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, LocationConfig};
    use crate::error::GatewayError;

    fn config(workers: u16) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.workers = workers;
        config.request_capacity = 8;
        config.locations.push(LocationConfig {
            name: "app".into(),
            address: "127.0.0.1:9000".into(),
            dial: Default::default(),
            connect_timeout_secs: 1,
        });
        config
    }

    #[test]
    fn test_attach_assigns_sequential_identities() {
        let registry = ContextRegistry::init(&config(2)).unwrap();

        let w0 = Worker::attach(&registry).unwrap();
        let w1 = Worker::attach(&registry).unwrap();
        assert_eq!(w0.id(), WorkerId::new(0));
        assert_eq!(w1.id(), WorkerId::new(1));

        assert!(matches!(
            Worker::attach(&registry),
            Err(GatewayError::Exhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let registry = ContextRegistry::init(&config(1)).unwrap();
        let worker = Worker::attach(&registry).unwrap();

        let shutdown = crate::lifecycle::Shutdown::new();
        let rx = shutdown.subscribe();
        let handle = tokio::spawn(worker.run(rx));

        shutdown.trigger();
        handle.await.unwrap();
    }
}
