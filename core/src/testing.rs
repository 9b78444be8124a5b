//! Scripted connection shared by the unit tests.

use crate::error::PortError;
use crate::port::{Connection, Row, Value};

/// Answers queries from canned responses keyed by a SQL fragment and records
/// every statement it sees.
#[derive(Default)]
pub(crate) struct ScriptedConnection {
    responses: Vec<(String, Vec<Row>)>,
    pub(crate) queries: Vec<(String, Vec<Value>)>,
    pub(crate) executed: Vec<(String, Vec<Value>)>,
    /// `begin`, `commit` and `rollback` calls in order.
    pub(crate) transactions: Vec<&'static str>,
    fail_on: Option<String>,
}

impl ScriptedConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queries containing `fragment` return `rows`. First match wins.
    pub(crate) fn respond(mut self, fragment: &str, rows: Vec<Row>) -> Self {
        self.responses.push((fragment.to_string(), rows));
        self
    }

    /// Any statement or query containing `fragment` fails.
    pub(crate) fn fail_on(mut self, fragment: &str) -> Self {
        self.fail_on = Some(fragment.to_string());
        self
    }

    fn check(&self, sql: &str) -> Result<(), PortError> {
        match &self.fail_on {
            Some(fragment) if sql.contains(fragment.as_str()) => {
                Err(format!("scripted failure on '{fragment}'").into())
            }
            _ => Ok(()),
        }
    }
}

impl Connection for ScriptedConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, PortError> {
        self.check(sql)?;
        self.executed.push((sql.to_string(), params.to_vec()));
        Ok(1)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, PortError> {
        self.check(sql)?;
        self.queries.push((sql.to_string(), params.to_vec()));
        Ok(self
            .responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn begin(&mut self) -> Result<(), PortError> {
        self.transactions.push("begin");
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PortError> {
        self.transactions.push("commit");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), PortError> {
        self.transactions.push("rollback");
        Ok(())
    }
}

pub(crate) fn count_row(count: i64) -> Vec<Row> {
    vec![Row::from_pairs([("count", Value::Integer(count))])]
}
