//! Flattening of the OpenHardwareMonitor sensor tree.
//!
//! The tree is walked once, depth-first and pre-order, to find every metric
//! leaf and fix its path of child indices. Every later refresh re-walks those
//! same paths against the new snapshot instead of searching the tree again.

use std::collections::BTreeMap;
use std::collections::HashMap;

use tracing::debug;
use tracing::trace;

use super::tree::SensorNode;

/// Value OpenHardwareMonitor reports when a sensor has no reading
const NO_READING: &str = "-";

/// A metric leaf found in the sensor tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Child indices from the root to the leaf
    pub path: Vec<usize>,
    /// Ancestor labels (root excluded) and the leaf label, deduplicated
    pub display_name: String,
    /// Unit exactly as reported by the daemon
    pub unit_token: String,
}

/// Find every metric leaf below `root`.
///
/// Leaves are returned in pre-order, children in their original order. When
/// two leaves produce the same display name, the k-th occurrence gets `" k"`
/// appended.
pub fn derive_entities(root: &SensorNode) -> Vec<EntityDescriptor> {
    let mut seen = HashMap::new();
    let mut descriptors = Vec::new();
    collect(root, &mut Vec::new(), &mut Vec::new(), &mut seen, &mut descriptors);
    descriptors
}

fn collect<'a>(
    node: &'a SensorNode,
    path: &mut Vec<usize>,
    names: &mut Vec<&'a str>,
    seen: &mut HashMap<String, usize>,
    out: &mut Vec<EntityDescriptor>,
) {
    if !node.is_leaf() {
        // The root's own label never takes part in names
        let is_root = path.is_empty();
        if !is_root {
            names.push(&node.label);
        }
        for (index, child) in node.children.iter().enumerate() {
            path.push(index);
            collect(child, path, names, seen, out);
            path.pop();
        }
        if !is_root {
            names.pop();
        }
        return;
    }

    let Some((initial_value, unit_token)) = node.value_parts() else {
        trace!("Skipping {:?} at {:?}: not a metric leaf", node.label, path);
        return;
    };

    let mut display_name = names
        .iter()
        .copied()
        .chain(std::iter::once(node.label.as_str()))
        .collect::<Vec<_>>()
        .join(" ");

    let count = seen.entry(display_name.clone()).or_insert(0);
    *count += 1;
    if *count > 1 {
        display_name = format!("{} {}", display_name, count);
    }

    debug!(
        "[{}] - {:?} - {} {}",
        display_name, path, initial_value, unit_token
    );

    out.push(EntityDescriptor {
        path: path.clone(),
        display_name,
        unit_token: unit_token.to_string(),
    });
}

/// Why a recorded path could not be followed in a newer snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReindexFailure {
    #[error("no child at index {index} at depth {depth}")]
    ShapeChanged { depth: usize, index: usize },

    #[error("node is no longer a leaf")]
    NotALeaf,

    #[error("leaf has no value")]
    MissingValue,

    #[error("value {0:?} is not a number")]
    InvalidNumber(String),
}

/// Current reading of one metric leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// `None` when the daemon has no reading for the sensor
    pub value: Option<f64>,
    /// `level_N` for each node between the root and the leaf, plus `name`
    pub attributes: BTreeMap<String, String>,
}

/// Follow `path` from `root` and read the leaf it lands on.
pub fn read_path(root: &SensorNode, path: &[usize]) -> Result<Reading, ReindexFailure> {
    let mut attributes = BTreeMap::new();
    let mut node = root;

    for (depth, &index) in path.iter().enumerate() {
        node = node
            .children
            .get(index)
            .ok_or(ReindexFailure::ShapeChanged { depth, index })?;
        if depth + 1 < path.len() {
            attributes.insert(format!("level_{}", depth), node.label.clone());
        }
    }

    if !node.is_leaf() {
        return Err(ReindexFailure::NotALeaf);
    }

    let raw = node
        .raw_value
        .as_deref()
        .ok_or(ReindexFailure::MissingValue)?;
    let token = raw.split_once(' ').map_or(raw, |(number, _)| number);
    let value = parse_number(token)?;

    attributes.insert("name".to_string(), node.label.clone());

    Ok(Reading { value, attributes })
}

/// Parse a number token, accepting `,` as the decimal separator.
///
/// The daemon's `-` placeholder yields `Ok(None)`.
pub fn parse_number(token: &str) -> Result<Option<f64>, ReindexFailure> {
    if token == NO_READING {
        return Ok(None);
    }

    token
        .replace(',', ".")
        .parse::<f64>()
        .map(Some)
        .map_err(|_| ReindexFailure::InvalidNumber(token.to_string()))
}
