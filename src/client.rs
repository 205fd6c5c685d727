//! Database capability: connection settings, the Cypher execution
//! contract, and its REST implementation
//!
//! The engine only ever talks to the [`CypherExecutor`] trait. The REST
//! client is one implementation of it; tests plug in an in-memory mock.

use serde::Deserialize;
use serde_json::json;

use crate::error::{Result, TransferError};
use crate::graph::Properties;

/// Rows and column labels from one executed query. Cells are raw JSON;
/// the graph module validates them into records at the boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<serde_json::Value>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A relationship staged for batched creation against real target ids.
#[derive(Debug, Clone)]
pub struct StagedRelationship {
    pub start_target_id: i64,
    pub end_target_id: i64,
    pub rel_type: String,
    pub properties: Properties,
}

/// Minimal public contract of the database collaborator: execute a query,
/// and submit a batch of relationship-create operations.
pub trait CypherExecutor {
    fn execute(&self, query: &str, params: serde_json::Value) -> Result<ResultSet>;

    /// Create all staged relationships in one round trip. Only the direct
    /// transfer engine uses this; confirmation is success or error.
    fn create_relationships(&self, staged: &[StagedRelationship]) -> Result<()>;
}

/// Connection settings for one database instance.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 7474,
            username: "neo4j".to_string(),
            password: "neo4j".to_string(),
        }
    }
}

impl ConnectionSettings {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    /// `host:port`, as shown in progress output and dump headers.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn open(&self) -> Result<RestClient> {
        RestClient::connect(self)
    }
}

/// Blocking REST client for the Cypher endpoint.
pub struct RestClient {
    http: reqwest::blocking::Client,
    cypher_url: String,
    batch_url: String,
    username: String,
    password: String,
}

impl RestClient {
    pub fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| TransferError::Connection(e.to_string()))?;
        let base = format!("http://{}:{}/db/data", settings.host, settings.port);
        Ok(Self {
            http,
            cypher_url: format!("{base}/cypher"),
            batch_url: format!("{base}/batch"),
            username: settings.username.clone(),
            password: settings.password.clone(),
        })
    }

    fn post(&self, url: &str, body: serde_json::Value) -> Result<reqwest::blocking::Response> {
        let response = self
            .http
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .map_err(|e| TransferError::Connection(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TransferError::Connection(format!(
                "authentication rejected ({status})"
            )));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TransferError::Query(format!("{status}: {body}")));
        }
        Ok(response)
    }
}

impl CypherExecutor for RestClient {
    fn execute(&self, query: &str, params: serde_json::Value) -> Result<ResultSet> {
        let params = if params.is_null() { json!({}) } else { params };
        tracing::debug!(query, "executing cypher");
        let response = self.post(&self.cypher_url, json!({"query": query, "params": params}))?;
        response
            .json()
            .map_err(|e| TransferError::UnexpectedResult(e.to_string()))
    }

    fn create_relationships(&self, staged: &[StagedRelationship]) -> Result<()> {
        let operations: Vec<serde_json::Value> = staged
            .iter()
            .enumerate()
            .map(|(i, rel)| {
                let data: serde_json::Map<String, serde_json::Value> = rel
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                json!({
                    "method": "POST",
                    "to": format!("/node/{}/relationships", rel.start_target_id),
                    "body": {
                        "to": format!("/node/{}", rel.end_target_id),
                        "type": rel.rel_type,
                        "data": data,
                    },
                    "id": i,
                })
            })
            .collect();
        self.post(&self.batch_url, serde_json::Value::Array(operations))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory stand-in for a graph database behind the REST capability.
    //! Answers the stats, window, wipe and create-with-return query shapes
    //! the engine issues, and records everything else.

    use std::cell::RefCell;

    use serde_json::json;

    use super::*;

    pub(crate) fn node_cell(id: i64, labels: &[&str], data: serde_json::Value) -> serde_json::Value {
        json!({
            "self": format!("http://mock:7474/db/data/node/{id}"),
            "metadata": {"id": id, "labels": labels},
            "data": data,
        })
    }

    pub(crate) fn rel_cell(
        id: i64,
        rel_type: &str,
        start_id: i64,
        end_id: i64,
        data: serde_json::Value,
    ) -> serde_json::Value {
        json!({
            "metadata": {"id": id},
            "type": rel_type,
            "data": data,
            "start": format!("http://mock:7474/db/data/node/{start_id}"),
            "end": format!("http://mock:7474/db/data/node/{end_id}"),
        })
    }

    pub(crate) struct MockDb {
        pub nodes: RefCell<Vec<serde_json::Value>>,
        pub relations: RefCell<Vec<serde_json::Value>>,
        pub executed: RefCell<Vec<String>>,
        pub staged: RefCell<Vec<Vec<StagedRelationship>>>,
        next_id: RefCell<i64>,
        /// Return RETURN-clause columns in reverse request order, to make
        /// positional id binding fail loudly in tests.
        pub reverse_return_columns: bool,
    }

    impl MockDb {
        pub fn empty() -> Self {
            Self::with_data(vec![], vec![])
        }

        pub fn with_data(
            nodes: Vec<serde_json::Value>,
            relations: Vec<serde_json::Value>,
        ) -> Self {
            Self {
                nodes: RefCell::new(nodes),
                relations: RefCell::new(relations),
                executed: RefCell::new(Vec::new()),
                staged: RefCell::new(Vec::new()),
                next_id: RefCell::new(1000),
                reverse_return_columns: false,
            }
        }

        pub fn statements(&self) -> Vec<String> {
            self.executed.borrow().clone()
        }

        fn cell_id(cell: &serde_json::Value) -> i64 {
            cell["metadata"]["id"].as_i64().unwrap()
        }

        fn stats(cells: &[serde_json::Value]) -> ResultSet {
            let ids: Vec<i64> = cells.iter().map(Self::cell_id).collect();
            let row = vec![
                json!(ids.len()),
                ids.iter().min().map_or(json!(null), |v| json!(v)),
                ids.iter().max().map_or(json!(null), |v| json!(v)),
            ];
            ResultSet {
                columns: vec!["count".into(), "min".into(), "max".into()],
                data: vec![row],
            }
        }

        fn window(cells: &[serde_json::Value], params: &serde_json::Value) -> ResultSet {
            let from_id = params["fromId"].as_i64().unwrap_or(0);
            let batch_size = params["batchSize"].as_u64().unwrap_or(u64::MAX) as usize;
            let mut selected: Vec<&serde_json::Value> = cells
                .iter()
                .filter(|cell| Self::cell_id(cell) >= from_id)
                .collect();
            selected.sort_by_key(|cell| Self::cell_id(cell));
            selected.truncate(batch_size);
            ResultSet {
                columns: vec!["entity".into()],
                data: selected.into_iter().map(|cell| vec![cell.clone()]).collect(),
            }
        }

        fn create_with_return(&self, query: &str) -> ResultSet {
            let clause = query
                .rsplit_once(" RETURN ")
                .map(|(_, tail)| tail.trim_end_matches(';'))
                .unwrap_or("");
            let mut columns: Vec<String> = clause.split(',').map(|c| c.trim().to_string()).collect();
            let mut row: Vec<serde_json::Value> = Vec::with_capacity(columns.len());
            for _ in &columns {
                let mut next = self.next_id.borrow_mut();
                row.push(json!(*next));
                *next += 1;
            }
            if self.reverse_return_columns {
                columns.reverse();
                row.reverse();
            }
            ResultSet { columns, data: vec![row] }
        }
    }

    impl CypherExecutor for MockDb {
        fn execute(&self, query: &str, params: serde_json::Value) -> Result<ResultSet> {
            self.executed.borrow_mut().push(query.to_string());
            if query.contains("count(n)") {
                return Ok(Self::stats(&self.nodes.borrow()));
            }
            if query.contains("count(r)") {
                return Ok(Self::stats(&self.relations.borrow()));
            }
            if query.starts_with("MATCH (n) WHERE ID(n) >=") {
                return Ok(Self::window(&self.nodes.borrow(), &params));
            }
            if query.starts_with("MATCH ()-[r]->() WHERE ID(r) >=") {
                return Ok(Self::window(&self.relations.borrow(), &params));
            }
            if query.starts_with("MATCH ()-[r]->() DELETE r") {
                self.relations.borrow_mut().clear();
                return Ok(ResultSet::default());
            }
            if query.starts_with("MATCH (n) DELETE n") {
                self.nodes.borrow_mut().clear();
                return Ok(ResultSet::default());
            }
            if query.starts_with("CREATE") && query.contains(" RETURN ") {
                return Ok(self.create_with_return(query));
            }
            Ok(ResultSet::default())
        }

        fn create_relationships(&self, staged: &[StagedRelationship]) -> Result<()> {
            self.staged.borrow_mut().push(staged.to_vec());
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_mock_stats_on_empty_db() {
            let db = MockDb::empty();
            let rs = db
                .execute("MATCH (n) RETURN count(n), min(id(n)), max(id(n));", json!(null))
                .unwrap();
            assert_eq!(rs.data[0][0], json!(0));
            assert!(rs.data[0][1].is_null());
        }

        #[test]
        fn test_mock_window_filters_and_limits() {
            let db = MockDb::with_data(
                vec![
                    node_cell(1, &[], json!({})),
                    node_cell(5, &[], json!({})),
                    node_cell(9, &[], json!({})),
                ],
                vec![],
            );
            let rs = db
                .execute(
                    "MATCH (n) WHERE ID(n) >= {fromId} RETURN n ORDER BY ID(n) ASC LIMIT {batchSize};",
                    json!({"fromId": 2, "batchSize": 1}),
                )
                .unwrap();
            assert_eq!(rs.data.len(), 1);
            assert_eq!(rs.data[0][0]["metadata"]["id"], json!(5));
        }
    }
}
