//! State registry: the conversion graph.
//!
//! Backends are registered explicitly, in order, then [`RegistryBuilder::build`]
//! runs each availability probe exactly once and indexes what survives:
//!
//! - **Nodes**: the state types of available backends, in registration order.
//! - **Edges**: converters whose endpoints are both nodes, in registration
//!   order, indexed by source.
//!
//! A backend is included whole or not at all. It is excluded (and recorded
//! in [`Registry::unavailable`]) when:
//!
//! 1. it is disabled by configuration,
//! 2. its availability probe fails,
//! 3. it declares a state type another backend already owns.
//!
//! Exclusion is never an error. It surfaces later as
//! [`StateError::NoConversionPath`] or [`StateError::OperationNotSupported`].
//!
//! The built registry is immutable and `Sync`; [`Registry::global`] holds the
//! default one for the whole process.

use crate::backends::default_backends;
use crate::config::Config;
use crate::router;
use crate::state::{Backend, Converter, ImageState, OperationKind, StateError, StateType};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// A backend left out of the graph, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub backend: &'static str,
    pub reason: String,
}

/// A registered state type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub state: StateType,
    pub backend: &'static str,
    pub operations: Vec<OperationKind>,
}

/// A registered conversion edge with the backend that declared it.
#[derive(Debug)]
pub struct Edge {
    pub backend: &'static str,
    pub converter: Converter,
}

pub struct Registry {
    backends: Vec<&'static str>,
    nodes: Vec<Node>,
    index: HashMap<StateType, usize>,
    edges: Vec<Edge>,
    /// Edge indices by source node index.
    adjacency: Vec<Vec<usize>>,
    unavailable: Vec<Exclusion>,
}

#[derive(Default)]
pub struct RegistryBuilder {
    backends: Vec<Box<dyn Backend>>,
    disabled: Vec<String>,
}

impl RegistryBuilder {
    /// Add a backend. A second backend with an already registered name is ignored.
    pub fn register(self, backend: impl Backend + 'static) -> Self {
        self.register_boxed(Box::new(backend))
    }

    pub fn register_boxed(mut self, backend: Box<dyn Backend>) -> Self {
        let name = backend.name();
        if self.backends.iter().any(|b| b.name() == name) {
            log::debug!("backend '{name}' already registered, ignoring");
            return self;
        }
        self.backends.push(backend);
        self
    }

    /// Exclude a backend by name without probing it.
    pub fn disable(mut self, name: impl Into<String>) -> Self {
        self.disabled.push(name.into());
        self
    }

    pub fn build(self) -> Registry {
        let mut registry = Registry {
            backends: Vec::new(),
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            adjacency: Vec::new(),
            unavailable: Vec::new(),
        };
        let mut pending = Vec::new();

        for backend in self.backends {
            let name = backend.name();
            if self.disabled.iter().any(|d| d == name) {
                registry.exclude(name, "disabled by configuration".into());
                continue;
            }
            if let Err(e) = backend.check() {
                registry.exclude(name, e.to_string());
                continue;
            }
            let states = backend.states();
            if let Some(reason) = registry.state_conflict(&states) {
                registry.exclude(name, reason);
                continue;
            }
            for decl in states {
                registry.index.insert(decl.state, registry.nodes.len());
                registry.nodes.push(Node {
                    state: decl.state,
                    backend: name,
                    operations: decl.operations,
                });
                registry.adjacency.push(Vec::new());
            }
            pending.extend(
                backend
                    .converters()
                    .into_iter()
                    .map(|converter| Edge {
                        backend: name,
                        converter,
                    }),
            );
            registry.backends.push(name);
        }

        for edge in pending {
            let from = registry.index.get(&edge.converter.from).copied();
            let to_known = registry.index.contains_key(&edge.converter.to);
            match from {
                Some(from) if to_known => {
                    registry.adjacency[from].push(registry.edges.len());
                    registry.edges.push(edge);
                }
                _ => log::debug!(
                    "dropping edge {} -> {} from '{}': endpoint not registered",
                    edge.converter.from,
                    edge.converter.to,
                    edge.backend
                ),
            }
        }

        log::debug!(
            "registry: {} backends, {} states, {} edges, {} excluded",
            registry.backends.len(),
            registry.nodes.len(),
            registry.edges.len(),
            registry.unavailable.len()
        );
        registry
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The built-in backend set shaped by `config`.
    pub fn from_config(config: &Config) -> Registry {
        let mut builder = Registry::builder();
        for backend in default_backends(config) {
            if config.is_disabled(backend.name()) {
                builder = builder.disable(backend.name());
            }
            builder = builder.register_boxed(backend);
        }
        builder.build()
    }

    /// Process-wide registry with the default configuration, built on first use.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(|| Registry::from_config(&Config::default()))
    }

    fn exclude(&mut self, backend: &'static str, reason: String) {
        log::warn!("backend '{backend}' excluded: {reason}");
        self.unavailable.push(Exclusion { backend, reason });
    }

    fn state_conflict(&self, states: &[crate::state::StateDecl]) -> Option<String> {
        let mut seen = Vec::new();
        for decl in states {
            if let Some(&i) = self.index.get(&decl.state) {
                return Some(format!(
                    "state type '{}' already registered by '{}'",
                    decl.state, self.nodes[i].backend
                ));
            }
            if seen.contains(&decl.state) {
                return Some(format!("state type '{}' declared twice", decl.state));
            }
            seen.push(decl.state);
        }
        None
    }

    /// Names of the included backends, in registration order.
    pub fn backends(&self) -> &[&'static str] {
        &self.backends
    }

    pub fn state_types(&self) -> Vec<StateType> {
        self.nodes.iter().map(|n| n.state).collect()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, state: StateType) -> Option<&Node> {
        self.index.get(&state).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, state: StateType) -> bool {
        self.index.contains_key(&state)
    }

    /// Whether `state` declares `kind`. Unknown states support nothing.
    pub fn supports(&self, state: StateType, kind: OperationKind) -> bool {
        self.node(state)
            .is_some_and(|n| n.operations.contains(&kind))
    }

    /// State types implementing `kind`, in registration order.
    pub fn find_operation(&self, kind: OperationKind) -> Vec<StateType> {
        self.nodes
            .iter()
            .filter(|n| n.operations.contains(&kind))
            .map(|n| n.state)
            .collect()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn unavailable(&self) -> &[Exclusion] {
        &self.unavailable
    }

    pub(crate) fn node_index(&self, state: StateType) -> Option<usize> {
        self.index.get(&state).copied()
    }

    /// Edge indices leaving node `index`, in registration order.
    pub(crate) fn outgoing(&self, index: usize) -> &[usize] {
        &self.adjacency[index]
    }

    /// Convert `state` to `target` along the cheapest path.
    pub fn convert(
        &self,
        state: Box<dyn ImageState>,
        target: StateType,
    ) -> Result<Box<dyn ImageState>, StateError> {
        router::convert(self, state, target)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.backends)
            .field("states", &self.state_types())
            .field("edges", &self.edges.len())
            .field("unavailable", &self.unavailable)
            .finish()
    }
}
