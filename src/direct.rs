//! Direct transfer: source to target without an intermediate script
//!
//! Runs `ReadSourceStats -> WipeTarget -> TransferNodes ->
//! TransferRelationships` in order. Nodes are created with per-node bind
//! variables and a `RETURN ID(..)` clause to learn their new target ids;
//! relationships are then staged against those real ids through the
//! capability's batch contract. There is no resume: a re-run starts from
//! the wipe again, which makes it idempotent by construction.

use std::collections::HashMap;

use crate::client::{CypherExecutor, StagedRelationship};
use crate::cursor::{node_stats, relationship_stats, NodeWindows, RelationshipWindows};
use crate::dump::{REMOVE_ALL_NODES, REMOVE_ALL_RELATIONS};
use crate::encode::{node_literal, node_var};
use crate::error::{Phase, Result, TransferError};
use crate::graph::{NodeRecord, RelationshipRecord};
use crate::progress::Progress;

#[derive(Debug, Clone)]
pub struct DirectOptions {
    pub read_batch_size: usize,
    pub node_batch_size: usize,
    pub relation_batch_size: usize,
    pub ignored_relation_properties: Vec<String>,
}

impl Default for DirectOptions {
    fn default() -> Self {
        Self {
            read_batch_size: 300,
            node_batch_size: 100,
            relation_batch_size: 150,
            ignored_relation_properties: Vec::new(),
        }
    }
}

/// Source-id to target-id map. Append-only, scoped to one run, never
/// persisted.
#[derive(Debug, Default)]
pub struct IdMapping {
    map: HashMap<i64, i64>,
}

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source_id: i64, target_id: i64) {
        self.map.insert(source_id, target_id);
    }

    pub fn get(&self, source_id: i64) -> Option<i64> {
        self.map.get(&source_id).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Source id embedded in a RETURN column label, e.g. `ID(_10)` -> 10.
/// Binding by this name instead of column position keeps the mapping
/// correct even if the server reorders result columns.
fn source_id_from_column(label: &str) -> Option<i64> {
    let start = label.find('_')? + 1;
    let digits: &str = label[start..]
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or("");
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Delete all target relationships, then all target nodes. Idempotent.
pub fn wipe_target<T: CypherExecutor>(target: &T, progress: &mut Progress) -> Result<()> {
    let relations = relationship_stats(target).map_err(|e| e.in_phase(Phase::WipeTarget))?;
    progress.info(&format!(
        "Removing relations:  {} {}",
        relations.count,
        relations.range()
    ));
    target
        .execute(REMOVE_ALL_RELATIONS, serde_json::Value::Null)
        .map_err(|e| e.in_phase(Phase::WipeTarget))?;
    progress.separator();
    let nodes = node_stats(target).map_err(|e| e.in_phase(Phase::WipeTarget))?;
    progress.info(&format!(
        "Removing nodes:      {} {}",
        nodes.count,
        nodes.range()
    ));
    target
        .execute(REMOVE_ALL_NODES, serde_json::Value::Null)
        .map_err(|e| e.in_phase(Phase::WipeTarget))?;
    progress.separator();
    Ok(())
}

/// Create one node sub-batch on the target and record the new ids.
fn transfer_node_batch<T: CypherExecutor>(
    target: &T,
    batch: &[NodeRecord],
    mapping: &mut IdMapping,
) -> Result<()> {
    let mut literals = Vec::with_capacity(batch.len());
    let mut returns = Vec::with_capacity(batch.len());
    for node in batch {
        literals.push(node_literal(node.id, &node.labels, &node.properties, true));
        returns.push(format!("ID({})", node_var(node.id)));
    }
    let query = format!("CREATE {} RETURN {};", literals.join(","), returns.join(","));
    let result = target.execute(&query, serde_json::Value::Null)?;
    let row = result.data.first().ok_or_else(|| {
        TransferError::UnexpectedResult("node create returned no rows".into())
    })?;
    for (column, cell) in result.columns.iter().zip(row) {
        let source_id = source_id_from_column(column).ok_or_else(|| {
            TransferError::UnexpectedResult(format!("column `{column}` carries no node variable"))
        })?;
        let target_id = cell.as_i64().ok_or_else(|| {
            TransferError::UnexpectedResult(format!("column `{column}` is not an id"))
        })?;
        mapping.insert(source_id, target_id);
    }
    Ok(())
}

/// Resolve a relationship's endpoints through the mapping and drop
/// ignored properties. Both endpoints must already be mapped.
fn stage_relationship(
    rel: &RelationshipRecord,
    mapping: &IdMapping,
    ignore: Option<&[String]>,
) -> Result<StagedRelationship> {
    let start_target_id = mapping.get(rel.start_id).ok_or(TransferError::MissingMapping {
        node_id: rel.start_id,
        relation_id: rel.id,
    })?;
    let end_target_id = mapping.get(rel.end_id).ok_or(TransferError::MissingMapping {
        node_id: rel.end_id,
        relation_id: rel.id,
    })?;
    let properties = rel
        .properties
        .iter()
        .filter(|(key, _)| !ignore.is_some_and(|ignored| ignored.iter().any(|i| i == key)))
        .cloned()
        .collect();
    Ok(StagedRelationship {
        start_target_id,
        end_target_id,
        rel_type: rel.rel_type.clone(),
        properties,
    })
}

/// Transfer the whole source graph into the target, remapping ids live.
pub fn direct_transfer<S: CypherExecutor, T: CypherExecutor>(
    source: &S,
    source_address: &str,
    target: &T,
    target_address: &str,
    options: &DirectOptions,
    progress: &mut Progress,
) -> Result<()> {
    let ignore = if options.ignored_relation_properties.is_empty() {
        None
    } else {
        Some(options.ignored_relation_properties.as_slice())
    };

    progress.info(&format!("Reading from:        {source_address}"));
    progress.separator();
    progress.info(&format!("Read batch size:     {}", options.read_batch_size));
    let nodes = node_stats(source)?;
    progress.info(&format!(
        "Number of nodes:     {} {}",
        nodes.count,
        nodes.range()
    ));
    let relations = relationship_stats(source)?;
    progress.info(&format!(
        "Number of relations: {} {}",
        relations.count,
        relations.range()
    ));
    progress.separator();

    progress.info(&format!("Writing to:          {target_address}"));
    progress.separator();
    progress.info(&format!("Node batch size:     {}", options.node_batch_size));
    progress.info(&format!(
        "Relation batch size: {}",
        options.relation_batch_size
    ));
    progress.separator();
    wipe_target(target, progress)?;

    let mut mapping = IdMapping::new();

    progress.info(&format!(
        "Node transfer:       {} ({} batches of {})",
        nodes.count,
        nodes.batches(options.node_batch_size),
        options.node_batch_size
    ));
    progress.separator();
    for window in NodeWindows::new(source, options.read_batch_size, nodes.max_id) {
        progress.window_tick();
        let window = window?;
        for batch in window.chunks(options.node_batch_size) {
            transfer_node_batch(target, batch, &mut mapping)
                .map_err(|e| e.in_phase(Phase::WriteNodeBatch))?;
            progress.batch_tick();
        }
    }
    progress.finish_ticks();
    progress.separator();
    tracing::info!(mapped = mapping.len(), "node transfer complete");

    progress.info(&format!(
        "Relation transfer:   {} ({} batches of {})",
        relations.count,
        relations.batches(options.relation_batch_size),
        options.relation_batch_size
    ));
    progress.separator();
    for window in RelationshipWindows::new(source, options.read_batch_size, relations.max_id) {
        progress.window_tick();
        let window = window?;
        for batch in window.chunks(options.relation_batch_size) {
            let staged = batch
                .iter()
                .map(|rel| stage_relationship(rel, &mapping, ignore))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| e.in_phase(Phase::WriteRelationBatch))?;
            target
                .create_relationships(&staged)
                .map_err(|e| e.in_phase(Phase::WriteRelationBatch))?;
            progress.batch_tick();
        }
    }
    progress.finish_ticks();
    progress.separator();
    tracing::info!(
        nodes = nodes.count,
        relations = relations.count,
        "direct transfer complete"
    );
    Ok(())
}
