//! Clone a database by dumping a script and replaying it against the
//! target in one run
//!
//! With a script path the dump lands on disk first and is re-read for
//! the replay, leaving the script behind as an artifact. Without one the
//! script only ever lives in memory.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::client::CypherExecutor;
use crate::dump::{dump, DumpOptions};
use crate::error::Result;
use crate::progress::Progress;
use crate::replay::replay;

/// Dump `source` and replay the script against `target`. Returns the
/// number of replayed statements.
pub fn transfer<S: CypherExecutor, T: CypherExecutor>(
    source: &S,
    source_address: &str,
    target: &T,
    target_address: &str,
    options: &DumpOptions,
    script_path: Option<&Path>,
    progress: &mut Progress,
) -> Result<usize> {
    match script_path {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            dump(source, source_address, options, &mut out, progress)?;
            out.flush()?;
            drop(out);
            progress.info(&format!("Target: {target_address}"));
            progress.separator();
            replay(target, BufReader::new(File::open(path)?), progress)
        }
        None => {
            let mut buffer = Vec::new();
            dump(source, source_address, options, &mut buffer, progress)?;
            progress.info(&format!("Target: {target_address}"));
            progress.separator();
            replay(target, buffer.as_slice(), progress)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{node_cell, rel_cell, MockDb};
    use serde_json::json;

    fn scenario_source() -> MockDb {
        MockDb::with_data(
            vec![
                node_cell(10, &["Person"], json!({"name": "ann"})),
                node_cell(11, &["Person"], json!({"name": "bob"})),
                node_cell(12, &["Person"], json!({"name": "cee"})),
            ],
            vec![rel_cell(0, "KNOWS", 10, 11, json!({}))],
        )
    }

    #[test]
    fn test_transfer_replays_the_full_script() {
        let source = scenario_source();
        let target = MockDb::empty();
        let options = DumpOptions {
            node_batch_size: 2,
            ..DumpOptions::default()
        };
        let executed = transfer(
            &source,
            "src:7474",
            &target,
            "dst:7474",
            &options,
            None,
            &mut Progress::silent(),
        )
        .unwrap();

        // index + wipe (2) + node creates (2) + relation create (1)
        // + marker strip + index drop
        assert_eq!(executed, 8);
        let statements = target.statements();
        assert_eq!(statements.len(), 8);
        assert!(statements[0].starts_with("CREATE INDEX ON :`_ilb`"));
        assert!(statements.last().unwrap().starts_with("DROP INDEX"));
        let node_creates = statements
            .iter()
            .filter(|q| q.starts_with("CREATE (:"))
            .count();
        assert_eq!(node_creates, 2);
    }

    #[test]
    fn test_transfer_through_script_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump-test.cypher");
        let source = scenario_source();
        let target = MockDb::empty();
        transfer(
            &source,
            "src:7474",
            &target,
            "dst:7474",
            &DumpOptions::default(),
            Some(&path),
            &mut Progress::silent(),
        )
        .unwrap();

        let script = std::fs::read_to_string(&path).unwrap();
        assert!(script.contains("// CYPHER DUMP OF GRAPH DATABASE"));
        assert!(!target.statements().is_empty());
    }
}
