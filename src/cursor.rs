//! Batch cursor over ascending entity IDs
//!
//! Fetches successive bounded windows with `id >= from_id ORDER BY id
//! LIMIT n`, advancing the cursor past the highest id seen. The max id is
//! snapshotted once per phase via the stats queries; entities created
//! beyond it mid-run are not chased. Sparse ranges (deletions mid-run)
//! are fine, an empty whole-window is the only termination signal.

use serde_json::json;

use crate::client::{CypherExecutor, ResultSet};
use crate::error::{Phase, Result, TransferError};
use crate::graph::{node_from_cell, relationship_from_cell, NodeRecord, RelationshipRecord};

pub const NODE_STATS: &str = "MATCH (n) RETURN count(n), min(id(n)), max(id(n));";
pub const RELATION_STATS: &str = "MATCH ()-[r]->() RETURN count(r), min(id(r)), max(id(r));";
pub const READ_NODES: &str =
    "MATCH (n) WHERE ID(n) >= {fromId} RETURN n ORDER BY ID(n) ASC LIMIT {batchSize};";
pub const READ_RELATIONS: &str =
    "MATCH ()-[r]->() WHERE ID(r) >= {fromId} RETURN r ORDER BY ID(r) ASC LIMIT {batchSize};";

/// Half-open cursor over ascending IDs.
#[derive(Debug, Clone, Copy)]
pub struct BatchWindow {
    pub from_id: i64,
    pub size: usize,
}

impl BatchWindow {
    pub fn new(size: usize) -> Self {
        Self { from_id: 0, size }
    }

    /// Advance to `last_id + 1` after a fetch.
    pub fn advance_past(&mut self, last_id: i64) {
        self.from_id = last_id + 1;
    }
}

/// Entity counts and id range from one stats query. `min_id`/`max_id`
/// are absent on an empty database.
#[derive(Debug, Clone, Copy)]
pub struct EntityStats {
    pub count: i64,
    pub min_id: Option<i64>,
    pub max_id: Option<i64>,
}

impl EntityStats {
    /// Number of write batches of `batch_size` the entities re-slice into.
    pub fn batches(&self, batch_size: usize) -> usize {
        if self.count <= 0 {
            return 0;
        }
        (self.count as usize).div_ceil(batch_size)
    }

    /// `[min->max]` range text for progress lines.
    pub fn range(&self) -> String {
        format!(
            "[{}->{}]",
            self.min_id.unwrap_or(0),
            self.max_id.unwrap_or(0)
        )
    }
}

fn parse_stats(result: &ResultSet) -> Result<EntityStats> {
    let row = result
        .data
        .first()
        .ok_or_else(|| TransferError::UnexpectedResult("stats query returned no rows".into()))?;
    let count = row
        .first()
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| TransferError::UnexpectedResult("stats query without a count".into()))?;
    Ok(EntityStats {
        count,
        min_id: row.get(1).and_then(serde_json::Value::as_i64),
        max_id: row.get(2).and_then(serde_json::Value::as_i64),
    })
}

pub fn node_stats<C: CypherExecutor>(client: &C) -> Result<EntityStats> {
    let result = client
        .execute(NODE_STATS, serde_json::Value::Null)
        .map_err(|e| e.in_phase(Phase::ReadStats))?;
    parse_stats(&result).map_err(|e| e.in_phase(Phase::ReadStats))
}

pub fn relationship_stats<C: CypherExecutor>(client: &C) -> Result<EntityStats> {
    let result = client
        .execute(RELATION_STATS, serde_json::Value::Null)
        .map_err(|e| e.in_phase(Phase::ReadStats))?;
    parse_stats(&result).map_err(|e| e.in_phase(Phase::ReadStats))
}

/// Iterator over node windows, ascending by id.
pub struct NodeWindows<'a, C: CypherExecutor> {
    client: &'a C,
    window: BatchWindow,
    snapshot_max_id: Option<i64>,
    done: bool,
}

impl<'a, C: CypherExecutor> NodeWindows<'a, C> {
    pub fn new(client: &'a C, read_batch_size: usize, snapshot_max_id: Option<i64>) -> Self {
        Self {
            client,
            window: BatchWindow::new(read_batch_size),
            snapshot_max_id,
            done: false,
        }
    }
}

impl<C: CypherExecutor> Iterator for NodeWindows<'_, C> {
    type Item = Result<Vec<NodeRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.snapshot_max_id {
            Some(max_id) if self.window.from_id <= max_id => {}
            _ => {
                self.done = true;
                return None;
            }
        }
        let result = self.client.execute(
            READ_NODES,
            json!({"fromId": self.window.from_id, "batchSize": self.window.size}),
        );
        let result = match result {
            Ok(rs) => rs,
            Err(e) => {
                self.done = true;
                return Some(Err(e.in_phase(Phase::ReadNodeWindow)));
            }
        };
        if result.is_empty() {
            self.done = true;
            return None;
        }
        let mut records = Vec::with_capacity(result.data.len());
        for row in &result.data {
            let cell = match row.first() {
                Some(cell) => cell,
                None => {
                    self.done = true;
                    return Some(Err(TransferError::UnexpectedResult(
                        "node window returned an empty row".into(),
                    )));
                }
            };
            match node_from_cell(cell) {
                Ok(record) => records.push(record),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.in_phase(Phase::ReadNodeWindow)));
                }
            }
        }
        if let Some(last) = records.last() {
            self.window.advance_past(last.id);
        }
        Some(Ok(records))
    }
}

/// Iterator over relationship windows, ascending by id.
pub struct RelationshipWindows<'a, C: CypherExecutor> {
    client: &'a C,
    window: BatchWindow,
    snapshot_max_id: Option<i64>,
    done: bool,
}

impl<'a, C: CypherExecutor> RelationshipWindows<'a, C> {
    pub fn new(client: &'a C, read_batch_size: usize, snapshot_max_id: Option<i64>) -> Self {
        Self {
            client,
            window: BatchWindow::new(read_batch_size),
            snapshot_max_id,
            done: false,
        }
    }
}

impl<C: CypherExecutor> Iterator for RelationshipWindows<'_, C> {
    type Item = Result<Vec<RelationshipRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.snapshot_max_id {
            Some(max_id) if self.window.from_id <= max_id => {}
            _ => {
                self.done = true;
                return None;
            }
        }
        let result = self.client.execute(
            READ_RELATIONS,
            json!({"fromId": self.window.from_id, "batchSize": self.window.size}),
        );
        let result = match result {
            Ok(rs) => rs,
            Err(e) => {
                self.done = true;
                return Some(Err(e.in_phase(Phase::ReadRelationWindow)));
            }
        };
        if result.is_empty() {
            self.done = true;
            return None;
        }
        let mut records = Vec::with_capacity(result.data.len());
        for row in &result.data {
            let cell = match row.first() {
                Some(cell) => cell,
                None => {
                    self.done = true;
                    return Some(Err(TransferError::UnexpectedResult(
                        "relation window returned an empty row".into(),
                    )));
                }
            };
            match relationship_from_cell(cell) {
                Ok(record) => records.push(record),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.in_phase(Phase::ReadRelationWindow)));
                }
            }
        }
        if let Some(last) = records.last() {
            self.window.advance_past(last.id);
        }
        Some(Ok(records))
    }
}
