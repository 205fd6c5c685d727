//! Script reader: stream statements out of a dump and replay them
//! against a target
//!
//! Line protocol: blank lines are skipped, `//` lines are surfaced as
//! progress annotations, everything else accumulates (space-joined) into
//! the pending statement, which is executed once a line ends with `;`.
//! `BEGIN;`/`COMMIT;` markers are forwarded like any other statement;
//! honoring them is the target's business.

use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::client::CypherExecutor;
use crate::error::{Result, TransferError};
use crate::progress::Progress;

pub const COMMENT_PREFIX: &str = "//";
pub const STATEMENT_TERMINATOR: char = ';';

/// Replay a script in strict file order. Returns the number of executed
/// statements. EOF with a partial statement still buffered is a
/// malformed script.
pub fn replay<C: CypherExecutor, R: BufRead>(
    target: &C,
    input: R,
    progress: &mut Progress,
) -> Result<usize> {
    let mut pending: Vec<String> = Vec::new();
    let mut pending_start = 0;
    let mut executed = 0;
    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(text) = line.strip_prefix(COMMENT_PREFIX) {
            progress.annotation(text.trim_start());
            continue;
        }
        if pending.is_empty() {
            pending_start = line_number;
        }
        pending.push(line.to_string());
        if line.ends_with(STATEMENT_TERMINATOR) {
            let statement = pending.join(" ");
            target
                .execute(&statement, serde_json::Value::Null)
                .map_err(|e| e.at_line(line_number))?;
            pending.clear();
            executed += 1;
            progress.statement_tick();
        }
    }
    if !pending.is_empty() {
        return Err(TransferError::MalformedScript {
            line: pending_start,
        });
    }
    progress.finish_ticks();
    tracing::info!(statements = executed, "replay complete");
    Ok(executed)
}

/// Most recent `dump-*.cypher` in `dir` by modification time, for the
/// `latest` input selector.
pub fn latest_dump_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("dump-") || !name.ends_with(".cypher") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }
    Ok(newest.map(|(_, path)| path))
}
