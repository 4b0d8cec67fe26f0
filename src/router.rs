//! Cheapest-path routing over the registry graph.
//!
//! Plain Dijkstra with two determinism rules:
//!
//! - nodes settle in `(cost, registration index)` order,
//! - an edge replaces a node's predecessor only on a strictly lower cost, so
//!   among equal-cost routes the earliest registered edge wins.
//!
//! Identical registries therefore always yield identical paths.

use crate::registry::Registry;
use crate::state::{ImageState, StateError, StateType};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

/// One conversion in a [`ConversionPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub from: StateType,
    pub to: StateType,
    pub backend: &'static str,
    pub name: &'static str,
    pub cost: u32,
}

/// An ordered chain of edges from one state type to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPath {
    pub from: StateType,
    pub to: StateType,
    edges: Vec<usize>,
    steps: Vec<Step>,
}

impl ConversionPath {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn cost(&self) -> u64 {
        self.steps.iter().map(|s| u64::from(s.cost)).sum()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for ConversionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.from)?;
        for step in &self.steps {
            write!(f, " -> {}", step.to)?;
        }
        Ok(())
    }
}

/// Run Dijkstra from `start` until `stop` accepts a settled node.
///
/// Returns the accepted node and the predecessor edge of every reached node.
fn search(
    registry: &Registry,
    start: usize,
    mut stop: impl FnMut(usize) -> bool,
) -> Option<(usize, Vec<Option<usize>>)> {
    let count = registry.nodes().len();
    let mut dist = vec![u64::MAX; count];
    let mut prev: Vec<Option<usize>> = vec![None; count];
    let mut settled = vec![false; count];
    let mut heap = BinaryHeap::new();

    dist[start] = 0;
    heap.push(Reverse((0u64, start)));

    while let Some(Reverse((cost, node))) = heap.pop() {
        if settled[node] {
            continue;
        }
        settled[node] = true;
        if stop(node) {
            return Some((node, prev));
        }
        for &edge_index in registry.outgoing(node) {
            let converter = &registry.edges()[edge_index].converter;
            let Some(next) = registry.node_index(converter.to) else {
                continue;
            };
            if settled[next] {
                continue;
            }
            let candidate = cost + u64::from(converter.cost);
            if candidate < dist[next] {
                dist[next] = candidate;
                prev[next] = Some(edge_index);
                heap.push(Reverse((candidate, next)));
            }
        }
    }
    None
}

fn build_path(
    registry: &Registry,
    from: StateType,
    target: usize,
    prev: &[Option<usize>],
) -> ConversionPath {
    let mut edges = Vec::new();
    let mut node = target;
    while let Some(edge_index) = prev[node] {
        edges.push(edge_index);
        let source = registry.edges()[edge_index].converter.from;
        match registry.node_index(source) {
            Some(i) => node = i,
            None => break,
        }
    }
    edges.reverse();

    let steps = edges
        .iter()
        .map(|&i| {
            let edge = &registry.edges()[i];
            Step {
                from: edge.converter.from,
                to: edge.converter.to,
                backend: edge.backend,
                name: edge.converter.name,
                cost: edge.converter.cost,
            }
        })
        .collect();

    ConversionPath {
        from,
        to: registry.nodes()[target].state,
        edges,
        steps,
    }
}

/// Cheapest path from `from` to `to`.
pub fn find_path(
    registry: &Registry,
    from: StateType,
    to: StateType,
) -> Result<ConversionPath, StateError> {
    let no_path = StateError::NoConversionPath { from, to };
    let (Some(start), Some(goal)) = (registry.node_index(from), registry.node_index(to)) else {
        return Err(no_path);
    };
    let (found, prev) = search(registry, start, |node| node == goal).ok_or(no_path)?;
    Ok(build_path(registry, from, found, &prev))
}

/// Cheapest path from `from` to the nearest state type satisfying `accept`.
///
/// `from` itself is considered first and yields an empty path.
pub fn find_nearest(
    registry: &Registry,
    from: StateType,
    mut accept: impl FnMut(StateType) -> bool,
) -> Option<ConversionPath> {
    let start = registry.node_index(from)?;
    let (found, prev) = search(registry, start, |node| accept(registry.nodes()[node].state))?;
    Some(build_path(registry, from, found, &prev))
}

/// Run every step of `path`, feeding each output into the next converter.
///
/// Each intermediate state is consumed by its converter.
pub fn execute(
    registry: &Registry,
    mut state: Box<dyn ImageState>,
    path: &ConversionPath,
) -> Result<Box<dyn ImageState>, StateError> {
    let found = state.state_type();
    if found != path.from {
        return Err(StateError::WrongState {
            expected: path.from,
            found,
        });
    }
    for &edge_index in &path.edges {
        let edge = registry
            .edges()
            .get(edge_index)
            .ok_or(StateError::NoConversionPath {
                from: path.from,
                to: path.to,
            })?;
        log::trace!(
            "{} -> {} via {}.{}",
            edge.converter.from,
            edge.converter.to,
            edge.backend,
            edge.converter.name
        );
        state = edge.converter.apply(state)?;
    }
    Ok(state)
}

/// Convert `state` to `target` along the cheapest path.
pub fn convert(
    registry: &Registry,
    state: Box<dyn ImageState>,
    target: StateType,
) -> Result<Box<dyn ImageState>, StateError> {
    let path = find_path(registry, state.state_type(), target)?;
    log::debug!("converting {path} (cost {})", path.cost());
    execute(registry, state, &path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OperationKind;
    use crate::state::backend::tests::{MockBackend, mock_state};
    use std::sync::{Arc, Mutex};

    const A: StateType = StateType::new("a");
    const B: StateType = StateType::new("b");
    const C: StateType = StateType::new("c");
    const D: StateType = StateType::new("d");

    fn diamond() -> (Registry, Arc<Mutex<Vec<String>>>) {
        // a -> b -> d and a -> c -> d both cost 2
        let backend = MockBackend::new("diamond")
            .state(A, &[])
            .state(B, &[])
            .state(C, &[OperationKind::Crop])
            .state(D, &[OperationKind::Crop])
            .edge(A, B, 1)
            .edge(A, C, 1)
            .edge(B, D, 1)
            .edge(C, D, 1);
        let calls = backend.calls.clone();
        (Registry::builder().register(backend).build(), calls)
    }

    fn route(path: &ConversionPath) -> Vec<StateType> {
        std::iter::once(path.from)
            .chain(path.steps().iter().map(|s| s.to))
            .collect()
    }

    #[test]
    fn same_type_is_empty_path() {
        let (registry, _) = diamond();
        let path = find_path(&registry, B, B).unwrap();
        assert!(path.is_empty());
        assert_eq!(path.cost(), 0);
        assert_eq!(path.to_string(), "b");
    }

    #[test]
    fn cheapest_path_wins_over_fewer_hops() {
        let registry = Registry::builder()
            .register(
                MockBackend::new("m")
                    .state(A, &[])
                    .state(B, &[])
                    .state(C, &[])
                    .edge(A, C, 10)
                    .edge(A, B, 2)
                    .edge(B, C, 3),
            )
            .build();
        let path = find_path(&registry, A, C).unwrap();
        assert_eq!(route(&path), vec![A, B, C]);
        assert_eq!(path.cost(), 5);
    }

    #[test]
    fn ties_resolve_to_first_registered_edge() {
        let (registry, _) = diamond();
        let path = find_path(&registry, A, D).unwrap();
        assert_eq!(route(&path), vec![A, B, D]);
        assert_eq!(path.to_string(), "a -> b -> d");
    }

    #[test]
    fn routing_is_deterministic() {
        let (first, _) = diamond();
        let expected = find_path(&first, A, D).unwrap();
        for _ in 0..20 {
            assert_eq!(find_path(&first, A, D).unwrap(), expected);
            let (rebuilt, _) = diamond();
            assert_eq!(find_path(&rebuilt, A, D).unwrap().steps(), expected.steps());
        }
    }

    #[test]
    fn missing_path_is_reported() {
        let (registry, _) = diamond();
        assert!(matches!(
            find_path(&registry, D, A),
            Err(StateError::NoConversionPath { from: D, to: A })
        ));
        let unknown = StateType::new("unknown");
        assert!(matches!(
            find_path(&registry, A, unknown),
            Err(StateError::NoConversionPath { .. })
        ));
    }

    #[test]
    fn nearest_includes_start_and_prefers_cheapest() {
        let (registry, _) = diamond();
        let crop = |s: StateType| registry.supports(s, OperationKind::Crop);

        assert!(find_nearest(&registry, C, crop).unwrap().is_empty());
        let path = find_nearest(&registry, A, crop).unwrap();
        assert_eq!(path.to, C);
        assert_eq!(path.len(), 1);
        assert!(find_nearest(&registry, A, |_| false).is_none());
    }

    #[test]
    fn execute_runs_each_step_in_order() {
        let (registry, calls) = diamond();
        let path = find_path(&registry, A, D).unwrap();
        let out = execute(&registry, mock_state(A), &path).unwrap();
        assert_eq!(out.state_type(), D);
        assert_eq!(*calls.lock().unwrap(), vec!["a->b", "b->d"]);
    }

    #[test]
    fn execute_rejects_mismatched_start() {
        let (registry, calls) = diamond();
        let path = find_path(&registry, A, D).unwrap();
        let err = execute(&registry, mock_state(C), &path).unwrap_err();
        assert!(matches!(err, StateError::WrongState { expected: A, found: C }));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn unavailable_backend_breaks_route() {
        let registry = Registry::builder()
            .register(MockBackend::new("base").state(A, &[]).state(C, &[]))
            .register(
                MockBackend::new("bridge")
                    .unavailable()
                    .state(B, &[])
                    .edge(A, B, 1)
                    .edge(B, C, 1),
            )
            .build();
        let err = convert(&registry, mock_state(A), C).unwrap_err();
        assert!(matches!(err, StateError::NoConversionPath { from: A, to: C }));
    }

    #[test]
    fn builtin_jpeg_to_png_image_path() {
        let registry = Registry::from_config(&crate::config::Config::default());
        let path = find_path(&registry, StateType::JPEG_FILE, StateType::PNG_IMAGE).unwrap();
        assert_eq!(path.from, StateType::JPEG_FILE);
        assert_eq!(path.to, StateType::PNG_IMAGE);
        // jpeg -> raster -> rgba-buffer -> png-image
        assert_eq!(path.cost(), 3);
        assert_eq!(path.steps()[0].backend, "raster");
        assert_eq!(path.steps()[1].to, StateType::RGBA_BUFFER);
    }
}
