//! Read-only access to the SQLite property graph.
//!
//! One `GraphStore` wraps one connection for the length of a retrieval pass.
//! Node and adjacency reads are memoized for that pass only.

use std::cell::RefCell;
use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};

use super::{GraphNode, NodeId, Properties};
use crate::error::{Result, ShopgraphError};

/// A stored relation with id endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub relation_id: i64,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub relation_type: String,
    pub properties: Properties,
}

impl Edge {
    /// Endpoint opposite `node`; a self-loop returns `node`.
    pub fn other(&self, node: NodeId) -> NodeId {
        if self.source_id == node {
            self.target_id
        } else {
            self.source_id
        }
    }
}

pub struct GraphStore<'c> {
    conn: &'c Connection,
    node_cache: RefCell<HashMap<NodeId, GraphNode>>,
    edge_cache: RefCell<HashMap<NodeId, Vec<Edge>>>,
}

fn parse_properties(raw: &str) -> Result<Properties> {
    if raw.trim().is_empty() {
        return Ok(Properties::new());
    }
    serde_json::from_str(raw)
        .map_err(|e| ShopgraphError::Graph(format!("Invalid properties JSON {:?}: {}", raw, e)))
}

impl<'c> GraphStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            node_cache: RefCell::new(HashMap::new()),
            edge_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Load a node with its labels and properties.
    pub fn node(&self, id: NodeId) -> Result<GraphNode> {
        if let Some(node) = self.node_cache.borrow().get(&id) {
            return Ok(node.clone());
        }

        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT name, properties FROM nodes WHERE node_id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (name, raw_props) =
            row.ok_or_else(|| ShopgraphError::Graph(format!("Node {} not found", id)))?;

        let mut stmt = self
            .conn
            .prepare_cached("SELECT label FROM node_labels WHERE node_id = ?1 ORDER BY label")?;
        let labels = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let node = GraphNode {
            id,
            name,
            labels,
            properties: parse_properties(&raw_props)?,
        };
        self.node_cache.borrow_mut().insert(id, node.clone());
        Ok(node)
    }

    /// All nodes carrying `name`, oldest first.
    pub fn nodes_named(&self, name: &str) -> Result<Vec<GraphNode>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT node_id FROM nodes WHERE name = ?1 ORDER BY node_id")?;
        let ids = stmt
            .query_map(params![name], |row| row.get::<_, NodeId>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        ids.into_iter().map(|id| self.node(id)).collect()
    }

    pub fn edge(&self, relation_id: i64) -> Result<Edge> {
        self.conn
            .query_row(
                "SELECT relation_id, source_id, target_id, relation_type, properties \
                 FROM relations WHERE relation_id = ?1",
                params![relation_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, NodeId>(1)?,
                        row.get::<_, NodeId>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| ShopgraphError::Graph(format!("Relation {} not found", relation_id)))
            .and_then(|(relation_id, source_id, target_id, relation_type, raw)| {
                Ok(Edge {
                    relation_id,
                    source_id,
                    target_id,
                    relation_type,
                    properties: parse_properties(&raw)?,
                })
            })
    }

    /// Relations touching `node` in either direction, ordered by relation id.
    pub fn incident_edges(&self, node: NodeId) -> Result<Vec<Edge>> {
        if let Some(edges) = self.edge_cache.borrow().get(&node) {
            return Ok(edges.clone());
        }

        let mut stmt = self.conn.prepare_cached(
            "SELECT relation_id, source_id, target_id, relation_type, properties \
             FROM relations WHERE source_id = ?1 OR target_id = ?1 \
             ORDER BY relation_id",
        )?;
        let rows = stmt
            .query_map(params![node], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, NodeId>(1)?,
                    row.get::<_, NodeId>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let mut edges = Vec::with_capacity(rows.len());
        for (relation_id, source_id, target_id, relation_type, raw) in rows {
            edges.push(Edge {
                relation_id,
                source_id,
                target_id,
                relation_type,
                properties: parse_properties(&raw)?,
            });
        }
        self.edge_cache.borrow_mut().insert(node, edges.clone());
        Ok(edges)
    }

    /// Rows of `(root:Decision)-[:INCLUDES]->(stage:Stage)-[:CONTAINS]->(factor:Factor)`
    /// for the root named `root_name`, at most `limit` rows.
    pub fn decision_paths(
        &self,
        root_name: &str,
        limit: usize,
    ) -> Result<Vec<(GraphNode, GraphNode, GraphNode)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT root.node_id, stage.node_id, factor.node_id \
             FROM nodes root \
             JOIN node_labels rl ON rl.node_id = root.node_id AND rl.label = 'Decision' \
             JOIN relations inc ON inc.source_id = root.node_id AND inc.relation_type = 'INCLUDES' \
             JOIN nodes stage ON stage.node_id = inc.target_id \
             JOIN node_labels sl ON sl.node_id = stage.node_id AND sl.label = 'Stage' \
             JOIN relations con ON con.source_id = stage.node_id AND con.relation_type = 'CONTAINS' \
             JOIN nodes factor ON factor.node_id = con.target_id \
             JOIN node_labels fl ON fl.node_id = factor.node_id AND fl.label = 'Factor' \
             WHERE root.name = ?1 \
             ORDER BY inc.relation_id, con.relation_id \
             LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![root_name, limit as i64], |row| {
                Ok((
                    row.get::<_, NodeId>(0)?,
                    row.get::<_, NodeId>(1)?,
                    row.get::<_, NodeId>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        ids.into_iter()
            .map(|(root, stage, factor)| Ok((self.node(root)?, self.node(stage)?, self.node(factor)?)))
            .collect()
    }

    /// Factor rows whose name contains `token` or is listed in `names`, each
    /// joined with an optional incident relation. At most `limit` rows.
    pub fn anchor_rows(
        &self,
        token: &str,
        names: &[String],
        limit: usize,
    ) -> Result<Vec<(GraphNode, Option<Edge>)>> {
        let placeholders = names.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT f.node_id, r.relation_id \
             FROM nodes f \
             JOIN node_labels fl ON fl.node_id = f.node_id AND fl.label = 'Factor' \
             LEFT JOIN relations r ON r.source_id = f.node_id OR r.target_id = f.node_id \
             WHERE (? <> '' AND instr(f.name, ?) > 0) OR f.name IN ({}) \
             ORDER BY f.node_id, r.relation_id \
             LIMIT ?",
            placeholders
        );

        let mut params: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(token.to_string()), Box::new(token.to_string())];
        for name in names {
            params.push(Box::new(name.clone()));
        }
        params.push(Box::new(limit as i64));

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                Ok((row.get::<_, NodeId>(0)?, row.get::<_, Option<i64>>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (factor_id, relation_id) in rows {
            let factor = self.node(factor_id)?;
            let edge = match relation_id {
                Some(id) => Some(self.edge(id)?),
                None => None,
            };
            out.push((factor, edge));
        }
        Ok(out)
    }

    /// Distinct Factor names containing `needle`, at most `limit`.
    pub fn factor_names_containing(&self, needle: &str, limit: usize) -> Result<Vec<String>> {
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare_cached(
            "SELECT n.name FROM nodes n \
             JOIN node_labels l ON l.node_id = n.node_id AND l.label = 'Factor' \
             WHERE instr(n.name, ?1) > 0 \
             GROUP BY n.name \
             ORDER BY MIN(n.node_id) \
             LIMIT ?2",
        )?;
        let names = stmt
            .query_map(params![needle, limit as i64], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        Ok(names)
    }
}
