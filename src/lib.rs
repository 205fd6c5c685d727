//! neoport - full-contents transfer between graph databases
//!
//! # Architecture
//!
//! - **Cursor pagination**: bounded windows over the ascending id range,
//!   max id snapshotted once per phase
//! - **Script dump**: the whole graph serialized into a flat, replayable
//!   Cypher script (`//` comments + `;`-terminated statements)
//! - **Replay**: streaming line-by-line import of such a script
//! - **Direct transfer**: no script, live source-id to target-id
//!   remapping with relationships batched against real target ids
//!
//! # Usage example
//!
//! ```no_run
//! use neoport::{dump, ConnectionSettings, DumpOptions, Progress};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = ConnectionSettings::new("localhost", 7474, "neo4j", "neo4j");
//! let client = source.open()?;
//!
//! let mut script = Vec::new();
//! dump(
//!     &client,
//!     &source.address(),
//!     &DumpOptions::default(),
//!     &mut script,
//!     &mut Progress::stderr(),
//! )?;
//! println!("{}", String::from_utf8_lossy(&script));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod cursor;
pub mod direct;
pub mod dump;
pub mod encode;
pub mod error;
pub mod graph;
pub mod progress;
pub mod replay;
pub mod transfer;

pub use client::{ConnectionSettings, CypherExecutor, RestClient, ResultSet, StagedRelationship};
pub use cursor::{BatchWindow, EntityStats, NodeWindows, RelationshipWindows};
pub use direct::{direct_transfer, DirectOptions, IdMapping};
pub use dump::{default_dump_file_name, dump, DumpOptions};
pub use error::{Phase, Result, TransferError};
pub use graph::{NodeRecord, Properties, RelationshipRecord, Value};
pub use progress::Progress;
pub use replay::{latest_dump_file, replay};
pub use transfer::transfer;
