//! Everything an application needs, built once from a [`Config`].

use crate::backend::{Backend, ClientSpec, Server};
use crate::config::Config;
use crate::error::{ContextError, GraphError};
use crate::graph::Graph;
use crate::workers::WorkPerformer;

/// The graph, the worker pools and the settings they were built from.
///
/// Pass it by reference to whatever needs access; there is no global instance.
pub struct Context {
    config: Config,
    graph: Graph,
    workers: WorkPerformer,
}

impl Context {
    pub fn new(config: Config) -> Result<Self, ContextError> {
        config.validate()?;
        let graph = Graph::with_event_capacity(config.graph.params(), config.graph.event_capacity)?;
        let workers = WorkPerformer::new(&config.workers)?;
        tracing::info!(
            buffer_size = config.graph.buffer_size,
            sample_rate = config.graph.sample_rate,
            high_priority = config.workers.high_priority,
            low_priority = config.workers.low_priority,
            "context ready"
        );
        Ok(Self {
            config,
            graph,
            workers,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn workers(&self) -> &WorkPerformer {
        &self.workers
    }

    /// How the configured client presents itself to a server.
    pub fn client_spec(&self) -> ClientSpec {
        ClientSpec::from(&self.config.backend)
    }

    /// Attach `server` to the graph as the configured client. Not yet connected.
    pub fn backend<S: Server>(&self, server: S) -> Result<Backend<S>, GraphError> {
        Backend::new(&self.graph, server, self.client_spec())
    }

    /// Join the worker threads. The graph stays usable.
    pub fn shutdown(&mut self) {
        self.workers.shutdown();
    }
}
