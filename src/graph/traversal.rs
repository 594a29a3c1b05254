//! Bounded multi-hop traversal from a named seed.
//!
//! Paths follow relations in either direction and never reuse a relation
//! within one path. Each distinct (seed, last relation, reached node, path
//! length) tuple is reported once; shorter paths come first.

use std::collections::HashSet;

use super::store::{Edge, GraphStore};
use super::{GraphNode, NodeId};
use crate::error::Result;

/// Upper bound on open paths per level; keeps dense neighborhoods finite.
const MAX_FRONTIER: usize = 5_000;

/// One reached node and the last relation of the path that reached it.
#[derive(Debug, Clone)]
pub struct Hop {
    pub center: GraphNode,
    pub edge: Edge,
    pub neighbor: GraphNode,
    pub degree: usize,
}

/// Maximum path length and result cap for a configured degree.
pub fn traversal_limits(max_degree: usize) -> (usize, usize) {
    match max_degree {
        0 | 1 => (1, 10),
        2 => (2, 15),
        d => (d, 20),
    }
}

struct OpenPath {
    seed: NodeId,
    at: NodeId,
    used: Vec<i64>,
}

/// Traverse from every node named `seed_name` up to the configured degree.
pub fn bounded_traversal(
    store: &GraphStore<'_>,
    seed_name: &str,
    max_degree: usize,
) -> Result<Vec<Hop>> {
    let (max_len, cap) = traversal_limits(max_degree);
    let seeds = store.nodes_named(seed_name)?;

    let mut hops = Vec::new();
    let mut seen: HashSet<(NodeId, i64, NodeId, usize)> = HashSet::new();
    let mut frontier: Vec<OpenPath> = seeds
        .iter()
        .map(|s| OpenPath { seed: s.id, at: s.id, used: Vec::new() })
        .collect();

    for degree in 1..=max_len {
        let mut next = Vec::new();

        for path in &frontier {
            for edge in store.incident_edges(path.at)? {
                if path.used.contains(&edge.relation_id) {
                    continue;
                }
                let reached = edge.other(path.at);

                if reached != path.seed
                    && seen.insert((path.seed, edge.relation_id, reached, degree))
                {
                    hops.push(Hop {
                        center: store.node(path.seed)?,
                        neighbor: store.node(reached)?,
                        edge: edge.clone(),
                        degree,
                    });
                    if hops.len() >= cap {
                        return Ok(hops);
                    }
                }

                if degree < max_len && next.len() < MAX_FRONTIER {
                    let mut used = path.used.clone();
                    used.push(edge.relation_id);
                    next.push(OpenPath { seed: path.seed, at: reached, used });
                }
            }
        }

        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    log::debug!(
        "Traversal from {} (degree {}): {} relations",
        seed_name,
        max_degree,
        hops.len()
    );
    Ok(hops)
}
