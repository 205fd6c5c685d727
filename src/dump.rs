//! Script writer: serialize a full source graph into a replayable
//! Cypher script
//!
//! The script is a flat, line-oriented log: `//` comments, then
//! statements terminated by `;`. It sets up a temporary marker index,
//! optionally wipes the target, creates all nodes tagged with the marker
//! property, creates all relationships by matching endpoints through the
//! marker, and finally removes every trace of the marker.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::Write;

use chrono::{DateTime, Local};

use crate::client::CypherExecutor;
use crate::cursor::{node_stats, relationship_stats, NodeWindows, RelationshipWindows};
use crate::encode::{node_literal, relationship_literal};
use crate::error::{Phase, Result, TransferError};
use crate::graph::{NodeRecord, RelationshipRecord, Value};
use crate::progress::Progress;

pub const REMOVE_ALL_RELATIONS: &str = "MATCH ()-[r]->() DELETE r;";
pub const REMOVE_ALL_NODES: &str = "MATCH (n) DELETE n;";

#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub import_label: String,
    pub import_id_key: String,
    pub read_batch_size: usize,
    pub node_batch_size: usize,
    pub relation_batch_size: usize,
    pub clean: bool,
    pub transactional: bool,
    pub ignored_relation_properties: Vec<String>,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            import_label: "_ilb".to_string(),
            import_id_key: "_iid".to_string(),
            read_batch_size: 300,
            node_batch_size: 150,
            relation_batch_size: 25,
            clean: true,
            transactional: false,
            ignored_relation_properties: Vec::new(),
        }
    }
}

impl DumpOptions {
    fn ignore_list(&self) -> Option<&[String]> {
        if self.ignored_relation_properties.is_empty() {
            None
        } else {
            Some(&self.ignored_relation_properties)
        }
    }
}

/// `dump-{host}-{YYYYMMDD}-{HHMMSS}.cypher`
pub fn default_dump_file_name(source_host: &str, now: DateTime<Local>) -> String {
    format!("dump-{}-{}.cypher", source_host, now.format("%Y%m%d-%H%M%S"))
}

pub fn create_marker_index_statement(import_label: &str, import_id_key: &str) -> String {
    format!("CREATE INDEX ON :`{import_label}`(`{import_id_key}`);")
}

pub fn drop_marker_index_statement(import_label: &str, import_id_key: &str) -> String {
    format!("DROP INDEX ON :`{import_label}`(`{import_id_key}`);")
}

/// Remove the marker label and marker property from every tagged node.
pub fn strip_marker_statement(import_label: &str, import_id_key: &str) -> String {
    format!("MATCH (n:`{import_label}`) REMOVE n:`{import_label}`, n.`{import_id_key}`;")
}

/// One `CREATE` covering a whole node sub-batch. Every node gets the
/// marker label and the marker property holding its source id, which is
/// what relationship statements later match on. A node that already
/// carries the marker key is a collision and fails the dump.
pub fn node_create_statement(
    batch: &[NodeRecord],
    import_label: &str,
    import_id_key: &str,
) -> Result<String> {
    let mut literals = Vec::with_capacity(batch.len());
    for node in batch {
        if node.has_property(import_id_key) {
            return Err(TransferError::MarkerCollision {
                id: node.id,
                key: import_id_key.to_string(),
            });
        }
        let mut labels = node.labels.clone();
        labels.push(import_label.to_string());
        let mut properties = node.properties.clone();
        properties.push((import_id_key.to_string(), Value::integer(node.id)));
        literals.push(node_literal(node.id, &labels, &properties, false));
    }
    Ok(format!("CREATE {};", literals.join(",")))
}

/// One `MATCH ... CREATE ...` covering a relationship sub-batch. Each
/// distinct endpoint is matched once by `(marker_label, marker_key)` and
/// bound to a sequential `_n` alias shared by every relationship in the
/// sub-batch that references it.
pub fn relationship_create_statement(
    batch: &[RelationshipRecord],
    import_label: &str,
    import_id_key: &str,
    ignore: Option<&[String]>,
) -> String {
    let mut vars: HashMap<i64, usize> = HashMap::new();
    let mut matches = Vec::new();
    let mut creates = Vec::with_capacity(batch.len());
    for rel in batch {
        let left = endpoint_var(rel.start_id, import_label, import_id_key, &mut vars, &mut matches);
        let right = endpoint_var(rel.end_id, import_label, import_id_key, &mut vars, &mut matches);
        creates.push(relationship_literal(
            &rel.rel_type,
            &rel.properties,
            &left,
            &right,
            ignore,
        ));
    }
    format!("MATCH {} CREATE {};", matches.join(","), creates.join(","))
}

fn endpoint_var(
    node_id: i64,
    import_label: &str,
    import_id_key: &str,
    vars: &mut HashMap<i64, usize>,
    matches: &mut Vec<String>,
) -> String {
    let next = vars.len();
    match vars.entry(node_id) {
        Entry::Occupied(slot) => format!("_{}", slot.get()),
        Entry::Vacant(slot) => {
            slot.insert(next);
            let var = format!("_{next}");
            matches.push(format!(
                "({var}:`{import_label}`{{`{import_id_key}`:{node_id}}})"
            ));
            var
        }
    }
}

/// Serialize the whole source graph into `out`. The sink is flushed after
/// each phase so a failed run leaves a readable prefix.
pub fn dump<C: CypherExecutor, W: Write>(
    source: &C,
    source_address: &str,
    options: &DumpOptions,
    out: &mut W,
    progress: &mut Progress,
) -> Result<()> {
    progress.info(&format!("Reading from:        {source_address}"));
    progress.info(&format!("Read batch size:     {}", options.read_batch_size));
    progress.separator();
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

    writeln!(out, "//")?;
    writeln!(out, "// CYPHER DUMP OF GRAPH DATABASE")?;
    writeln!(out, "// host: {source_address}")?;
    writeln!(out, "// time: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "// tool: neoport {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "//")?;
    writeln!(out)?;
    writeln!(out, "// CREATE IMPORT PROPERTY INDEX")?;
    writeln!(
        out,
        "{}",
        create_marker_index_statement(&options.import_label, &options.import_id_key)
    )?;
    if options.transactional {
        writeln!(out)?;
        writeln!(out, "// BEGIN TRANSACTION")?;
        writeln!(out, "BEGIN;")?;
    }
    if options.clean {
        // relationships first, nodes depend on them being gone
        writeln!(out)?;
        writeln!(out, "// REMOVE ALL RELATIONS AND NODES")?;
        writeln!(out, "{REMOVE_ALL_RELATIONS}")?;
        writeln!(out, "{REMOVE_ALL_NODES}")?;
    }

    let node_batches = nodes.batches(options.node_batch_size);
    progress.info(&format!(
        "Dumping nodes:       {} batches of {}",
        node_batches, options.node_batch_size
    ));
    writeln!(out)?;
    writeln!(
        out,
        "// {} NODES IN {} BATCHES OF {}",
        nodes.count, node_batches, options.node_batch_size
    )?;
    writeln!(out)?;
    for window in NodeWindows::new(source, options.read_batch_size, nodes.max_id) {
        progress.window_tick();
        let window = window?;
        for batch in window.chunks(options.node_batch_size) {
            let statement =
                node_create_statement(batch, &options.import_label, &options.import_id_key)
                    .map_err(|e| e.in_phase(Phase::WriteNodeBatch))?;
            writeln!(out, "{statement}")?;
            progress.batch_tick();
        }
    }
    progress.finish_ticks();
    progress.separator();
    out.flush()?;

    let relation_batches = relations.batches(options.relation_batch_size);
    progress.info(&format!(
        "Dumping relations:   {} batches of {}",
        relation_batches, options.relation_batch_size
    ));
    writeln!(out)?;
    writeln!(
        out,
        "// {} RELATIONS IN {} BATCHES OF {}",
        relations.count, relation_batches, options.relation_batch_size
    )?;
    writeln!(out)?;
    for window in RelationshipWindows::new(source, options.read_batch_size, relations.max_id) {
        progress.window_tick();
        let window = window?;
        for batch in window.chunks(options.relation_batch_size) {
            let statement = relationship_create_statement(
                batch,
                &options.import_label,
                &options.import_id_key,
                options.ignore_list(),
            );
            writeln!(out, "{statement}")?;
            progress.batch_tick();
        }
    }
    progress.finish_ticks();
    progress.separator();
    out.flush()?;

    writeln!(out)?;
    writeln!(out, "// REMOVE IMPORT LABEL AND PROPERTY FROM NODES")?;
    writeln!(
        out,
        "{}",
        strip_marker_statement(&options.import_label, &options.import_id_key)
    )?;
    if options.transactional {
        writeln!(out)?;
        writeln!(out, "// COMMIT TRANSACTION")?;
        writeln!(out, "COMMIT;")?;
    }
    writeln!(out)?;
    writeln!(out, "// REMOVE IMPORT PROPERTY INDEX")?;
    writeln!(
        out,
        "{}",
        drop_marker_index_statement(&options.import_label, &options.import_id_key)
    )?;
    out.flush()?;

    tracing::info!(
        nodes = nodes.count,
        relations = relations.count,
        "dump complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{node_cell, rel_cell, MockDb};
    use chrono::TimeZone;
    use serde_json::json;

    fn person(id: i64, name: &str) -> serde_json::Value {
        node_cell(id, &["Person"], json!({"name": name}))
    }

    fn scenario_db() -> MockDb {
        MockDb::with_data(
            vec![person(10, "ann"), person(11, "bob"), person(12, "cee")],
            vec![rel_cell(0, "KNOWS", 10, 11, json!({}))],
        )
    }

    fn dump_to_string(db: &MockDb, options: &DumpOptions) -> String {
        let mut out = Vec::new();
        dump(db, "localhost:7474", options, &mut out, &mut Progress::silent()).unwrap();
        String::from_utf8(out).unwrap()
    }

    mod statement_tests {
        use super::*;
        use crate::graph::{NodeRecord, RelationshipRecord, Value};

        fn node(id: i64) -> NodeRecord {
            NodeRecord {
                id,
                labels: vec!["Person".to_string()],
                properties: vec![("name".to_string(), Value::String(format!("p{id}")))],
            }
        }

        fn rel(id: i64, start: i64, end: i64) -> RelationshipRecord {
            RelationshipRecord {
                id,
                rel_type: "KNOWS".to_string(),
                start_id: start,
                end_id: end,
                properties: vec![],
            }
        }

        #[test]
        fn test_node_create_statement_tags_marker() {
            let statement = node_create_statement(&[node(10)], "_ilb", "_iid").unwrap();
            assert_eq!(
                statement,
                "CREATE (:`Person`:`_ilb`{`name`:\"p10\",`_iid`:10});"
            );
        }

        #[test]
        fn test_node_create_statement_joins_batch() {
            let statement = node_create_statement(&[node(1), node(2)], "_ilb", "_iid").unwrap();
            assert_eq!(statement.matches("),(").count(), 1);
            assert!(statement.ends_with(");"));
        }

        #[test]
        fn test_marker_collision_is_fatal() {
            let mut colliding = node(5);
            colliding
                .properties
                .push(("_iid".to_string(), Value::integer(99)));
            let err = node_create_statement(&[colliding], "_ilb", "_iid").unwrap_err();
            assert!(matches!(
                err,
                TransferError::MarkerCollision { id: 5, ref key } if key == "_iid"
            ));
        }

        #[test]
        fn test_relationship_statement_matches_endpoints_by_marker() {
            let statement = relationship_create_statement(&[rel(0, 10, 11)], "_ilb", "_iid", None);
            assert_eq!(
                statement,
                "MATCH (_0:`_ilb`{`_iid`:10}),(_1:`_ilb`{`_iid`:11}) \
                 CREATE _0-[:`KNOWS`]->_1;"
            );
        }

        #[test]
        fn test_shared_endpoint_is_matched_once() {
            let statement = relationship_create_statement(
                &[rel(0, 10, 11), rel(1, 10, 12)],
                "_ilb",
                "_iid",
                None,
            );
            // three distinct endpoints across two relationships
            assert_eq!(statement.matches(":`_ilb`{").count(), 3);
            assert!(statement.contains("_0-[:`KNOWS`]->_1"));
            assert!(statement.contains("_0-[:`KNOWS`]->_2"));
        }
    }

    #[test]
    fn test_scenario_dump_shape() {
        // 3 nodes with node_batch_size=2 -> one batch of 2, one of 1
        let db = scenario_db();
        let options = DumpOptions {
            node_batch_size: 2,
            ..DumpOptions::default()
        };
        let script = dump_to_string(&db, &options);

        let node_creates: Vec<&str> = script
            .lines()
            .filter(|l| l.starts_with("CREATE (:"))
            .collect();
        assert_eq!(node_creates.len(), 2);
        assert!(node_creates[0].contains("`_iid`:10"));
        assert!(node_creates[0].contains("`_iid`:11"));
        assert!(node_creates[1].contains("`_iid`:12"));

        let rel_creates: Vec<&str> = script
            .lines()
            .filter(|l| l.starts_with("MATCH (_0:"))
            .collect();
        assert_eq!(rel_creates.len(), 1);
        assert!(rel_creates[0].contains("_0-[:`KNOWS`]->_1"));
    }

    #[test]
    fn test_dump_protocol_order() {
        let db = scenario_db();
        let script = dump_to_string(&db, &DumpOptions::default());
        let index_of = |needle: &str| script.find(needle).unwrap();

        let create_index = index_of("CREATE INDEX ON :`_ilb`(`_iid`);");
        let remove_relations = index_of(REMOVE_ALL_RELATIONS);
        let remove_nodes = index_of(REMOVE_ALL_NODES);
        let first_create = index_of("CREATE (:");
        let strip = index_of("MATCH (n:`_ilb`) REMOVE n:`_ilb`, n.`_iid`;");
        let drop_index = index_of("DROP INDEX ON :`_ilb`(`_iid`);");

        assert!(create_index < remove_relations);
        assert!(remove_relations < remove_nodes);
        assert!(remove_nodes < first_create);
        assert!(first_create < strip);
        assert!(strip < drop_index);
    }

    #[test]
    fn test_clean_false_omits_deletions() {
        let db = scenario_db();
        let options = DumpOptions {
            clean: false,
            ..DumpOptions::default()
        };
        let script = dump_to_string(&db, &options);
        assert!(!script.contains(REMOVE_ALL_RELATIONS));
        assert!(!script.contains(REMOVE_ALL_NODES));
    }

    #[test]
    fn test_transactional_wraps_statements() {
        let db = scenario_db();
        let options = DumpOptions {
            transactional: true,
            ..DumpOptions::default()
        };
        let script = dump_to_string(&db, &options);
        let begin = script.find("BEGIN;").unwrap();
        let commit = script.find("COMMIT;").unwrap();
        let first_create = script.find("CREATE (:").unwrap();
        let drop_index = script.find("DROP INDEX").unwrap();
        assert!(begin < first_create);
        assert!(first_create < commit);
        // the index drop stays outside the transaction
        assert!(commit < drop_index);
    }

    #[test]
    fn test_ignored_relation_properties_are_dropped() {
        let db = MockDb::with_data(
            vec![person(1, "a"), person(2, "b")],
            vec![rel_cell(
                0,
                "KNOWS",
                1,
                2,
                json!({"since": 1999, "modified": 2020}),
            )],
        );
        let options = DumpOptions {
            ignored_relation_properties: vec!["modified".to_string()],
            ..DumpOptions::default()
        };
        let script = dump_to_string(&db, &options);
        assert!(script.contains("`since`:1999"));
        assert!(!script.contains("modified"));
    }

    #[test]
    fn test_empty_database_dumps_no_create_statements() {
        let db = MockDb::empty();
        let script = dump_to_string(&db, &DumpOptions::default());
        assert!(script.contains("// 0 NODES IN 0 BATCHES OF 150"));
        assert!(!script.contains("\nCREATE (:"));
        assert!(script.contains("DROP INDEX"));
    }

    #[test]
    fn test_default_dump_file_name() {
        let now = Local.with_ymd_and_hms(2026, 8, 4, 9, 30, 5).unwrap();
        assert_eq!(
            default_dump_file_name("db.example.org", now),
            "dump-db.example.org-20260804-093005.cypher"
        );
    }
}
