//! Boundary to the automatic layout engine.
//!
//! The graph hands an engine a node list with size hints and an edge list;
//! the engine answers with centre points, which are shifted to top-left
//! anchors before they reach the canvas.

use crate::graph::{ComponentInstance, Graph};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const NODE_WIDTH: f64 = 320.0;
const HEADER_HEIGHT: f64 = 48.0;
const ROW_HEIGHT: f64 = 28.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: String,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A replaceable layout algorithm.
pub trait LayoutEngine {
    /// Returns the centre point of every node it placed.
    fn layout(&self, nodes: &[LayoutNode], edges: &[LayoutEdge]) -> HashMap<String, Position>;
}

/// Top-to-bottom layered placement: a node's rank is the longest path from
/// any source, ranks are stacked vertically and nodes within a rank are laid
/// out left to right in input order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayeredLayout {
    pub node_gap: f64,
    pub rank_gap: f64,
}

impl Default for LayeredLayout {
    fn default() -> Self {
        Self {
            node_gap: 50.0,
            rank_gap: 50.0,
        }
    }
}

impl LayeredLayout {
    fn ranks(nodes: &[LayoutNode], edges: &[LayoutEdge]) -> Vec<usize> {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        let links: Vec<(usize, usize)> = edges
            .iter()
            .filter_map(|e| Some((*index.get(e.source.as_str())?, *index.get(e.target.as_str())?)))
            .filter(|(s, t)| s != t)
            .collect();

        let mut rank = vec![0usize; nodes.len()];
        // Bounded relaxation so cycles cannot push ranks forever.
        for _ in 0..nodes.len() {
            let mut changed = false;
            for &(s, t) in &links {
                if rank[t] < rank[s] + 1 && rank[s] + 1 < nodes.len() {
                    rank[t] = rank[s] + 1;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        rank
    }
}

impl LayoutEngine for LayeredLayout {
    fn layout(&self, nodes: &[LayoutNode], edges: &[LayoutEdge]) -> HashMap<String, Position> {
        let ranks = Self::ranks(nodes, edges);
        let depth = ranks.iter().copied().max().map_or(0, |r| r + 1);

        let mut rank_height = vec![0.0f64; depth];
        for (node, &r) in nodes.iter().zip(&ranks) {
            rank_height[r] = rank_height[r].max(node.height);
        }
        let mut rank_top = Vec::with_capacity(depth);
        let mut top = 0.0;
        for height in &rank_height {
            rank_top.push(top);
            top += height + self.rank_gap;
        }

        let mut cursor = vec![0.0f64; depth];
        let mut positions = HashMap::with_capacity(nodes.len());
        for (node, &r) in nodes.iter().zip(&ranks) {
            let x = cursor[r] + node.width / 2.0;
            cursor[r] += node.width + self.node_gap;
            let y = rank_top[r] + rank_height[r] / 2.0;
            positions.insert(node.id.clone(), Position { x, y });
        }
        positions
    }
}

/// Size hint from the rows a rendered instance shows: its checked arguments,
/// exports and checked blocks.
pub fn size_hint(instance: &ComponentInstance) -> (f64, f64) {
    let rows = instance.arguments.iter().filter(|a| a.checked).count()
        + instance.exports.len()
        + instance.blocks.iter().filter(|b| b.checked).count();
    (NODE_WIDTH, HEADER_HEIGHT + ROW_HEIGHT * rows as f64)
}

impl Graph {
    /// Nodes with size hints and deduplicated instance-to-instance edges.
    pub fn layout_input(&self) -> (Vec<LayoutNode>, Vec<LayoutEdge>) {
        let nodes = self
            .instances()
            .iter()
            .map(|inst| {
                let (width, height) = size_hint(inst);
                LayoutNode {
                    id: inst.id.clone(),
                    width,
                    height,
                }
            })
            .collect();
        let mut edges: Vec<LayoutEdge> = Vec::new();
        for edge in self.edges() {
            let link = LayoutEdge {
                source: edge.source.clone(),
                target: edge.target.clone(),
            };
            if !edges.contains(&link) {
                edges.push(link);
            }
        }
        (nodes, edges)
    }

    /// Runs `engine` and returns top-left positions keyed by instance id.
    pub fn apply_layout(&self, engine: &dyn LayoutEngine) -> HashMap<String, Position> {
        let (nodes, edges) = self.layout_input();
        let centres = engine.layout(&nodes, &edges);
        let placed: HashMap<String, Position> = nodes
            .iter()
            .filter_map(|node| {
                let centre = centres.get(&node.id)?;
                Some((
                    node.id.clone(),
                    Position {
                        x: centre.x - node.width / 2.0,
                        y: centre.y - node.height / 2.0,
                    },
                ))
            })
            .collect();
        debug!("laid out {} of {} nodes", placed.len(), nodes.len());
        placed
    }
}
