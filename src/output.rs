//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Graph
//!
//! ```text
//! States
//!     jpeg-file (files)
//!     raster (raster)
//!         get_size, has_alpha, has_animation, resize, crop, save_as_jpeg, ...
//!
//! Edges
//!     jpeg-file -> raster  raster.open (cost 1)
//!
//! Unavailable
//!     frames: disabled by configuration
//! ```
//!
//! ## Path
//!
//! ```text
//! jpeg-file -> png-image (cost 3)
//!     001 jpeg-file -> raster  raster.open (cost 1)
//!     002 raster -> rgba-buffer  raster.to_buffer_rgba (cost 1)
//!     003 rgba-buffer -> png-image  png.from_buffer (cost 1)
//! ```
//!
//! ## Convert
//!
//! ```text
//! photo.jpg → out/photo.png (640x480, via raster)
//! broken.jpg: open: decode failed: ...
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::batch::Converted;
use crate::registry::Registry;
use crate::router::{ConversionPath, Step};
use crate::state::StateError;
use serde_json::{Value, json};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `from -> to  backend.name (cost n)`
fn step_line(step: &Step) -> String {
    format!(
        "{} -> {}  {}.{} (cost {})",
        step.from, step.to, step.backend, step.name, step.cost
    )
}

// ============================================================================
// Graph
// ============================================================================

/// Format the registry: states with their owner and operations, every edge,
/// and the excluded backends.
pub fn format_graph(registry: &Registry) -> Vec<String> {
    let mut lines = vec!["States".to_string()];
    for node in registry.nodes() {
        lines.push(format!("{}{} ({})", indent(1), node.state, node.backend));
        if !node.operations.is_empty() {
            let ops: Vec<_> = node.operations.iter().map(|k| k.name()).collect();
            lines.push(format!("{}{}", indent(2), ops.join(", ")));
        }
    }

    lines.push(String::new());
    lines.push("Edges".to_string());
    for edge in registry.edges() {
        let c = &edge.converter;
        lines.push(format!(
            "{}{} -> {}  {}.{} (cost {})",
            indent(1),
            c.from,
            c.to,
            edge.backend,
            c.name,
            c.cost
        ));
    }

    if !registry.unavailable().is_empty() {
        lines.push(String::new());
        lines.push("Unavailable".to_string());
        for excluded in registry.unavailable() {
            lines.push(format!(
                "{}{}: {}",
                indent(1),
                excluded.backend,
                excluded.reason
            ));
        }
    }
    lines
}

pub fn print_graph(registry: &Registry) {
    for line in format_graph(registry) {
        println!("{}", line);
    }
}

/// The registry as a JSON document for `graph --json`.
pub fn graph_json(registry: &Registry) -> Value {
    let states: Vec<Value> = registry
        .nodes()
        .iter()
        .map(|n| {
            json!({
                "state": n.state.name(),
                "backend": n.backend,
                "operations": n.operations,
            })
        })
        .collect();
    let edges: Vec<Value> = registry
        .edges()
        .iter()
        .map(|e| {
            json!({
                "from": e.converter.from.name(),
                "to": e.converter.to.name(),
                "backend": e.backend,
                "name": e.converter.name,
                "cost": e.converter.cost,
            })
        })
        .collect();
    json!({
        "backends": registry.backends(),
        "states": states,
        "edges": edges,
        "unavailable": registry.unavailable(),
    })
}

// ============================================================================
// Path
// ============================================================================

/// Format a conversion path: a summary header then one numbered line per step.
pub fn format_path(path: &ConversionPath) -> Vec<String> {
    let mut lines = vec![format!("{} -> {} (cost {})", path.from, path.to, path.cost())];
    if path.is_empty() {
        lines.push(format!("{}already {}", indent(1), path.to));
    }
    for (i, step) in path.steps().iter().enumerate() {
        lines.push(format!(
            "{}{} {}",
            indent(1),
            format_index(i + 1),
            step_line(step)
        ));
    }
    lines
}

pub fn print_path(path: &ConversionPath) {
    for line in format_path(path) {
        println!("{}", line);
    }
}

// ============================================================================
// Convert
// ============================================================================

/// Format the result of converting one input file.
pub fn format_convert_result(input: &Path, result: &Result<Converted, StateError>) -> Vec<String> {
    match result {
        Ok(done) => vec![format!(
            "{} → {} ({}, via {})",
            input.display(),
            done.output.display(),
            done.size,
            done.saved_from
        )],
        Err(error) => vec![format!("{}: {}", input.display(), error)],
    }
}

pub fn print_convert_result(input: &Path, result: &Result<Converted, StateError>) {
    for line in format_convert_result(input, result) {
        println!("{}", line);
    }
}

/// Totals line printed after a batch conversion.
pub fn format_convert_summary(ok: usize, failed: usize) -> String {
    if failed == 0 {
        format!("Converted {} image{}", ok, if ok == 1 { "" } else { "s" })
    } else {
        format!("Converted {} image{}, {} failed", ok, if ok == 1 { "" } else { "s" }, failed)
    }
}
