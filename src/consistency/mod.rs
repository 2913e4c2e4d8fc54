//! Cross-node data comparison.
//!
//! Each node is checksummed independently with `CHECKSUM TABLE`, which is
//! insensitive to physical row order and sensitive to row content. The
//! comparison itself is a pure function so the verdict does not depend on
//! which node is passed first.


use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::validate_identifier;
use crate::CommandError;
use crate::CommandRunner;
use crate::NodeHandle;
use crate::ProcessSupervisor;
use crate::Result;

/// Per-table checksums of one database on one node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChecksumResult {
    pub database: String,
    /// `None` when the server could not checksum the table
    pub tables: BTreeMap<String, Option<u64>>,
}

impl ChecksumResult {
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// Verdict of comparing two nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonResult {
    Consistent {
        table_count: usize,
    },
    Divergent {
        /// Table counts of the two sides, in argument order
        table_counts: (usize, usize),
        /// First mismatching table in sorted order
        first_table: Option<String>,
        /// Every table missing on one side or with different checksums
        mismatched: BTreeSet<String>,
    },
}

impl ComparisonResult {
    pub fn is_consistent(&self) -> bool {
        matches!(self, ComparisonResult::Consistent { .. })
    }

    pub fn mismatched(&self) -> BTreeSet<String> {
        match self {
            ComparisonResult::Consistent { .. } => BTreeSet::new(),
            ComparisonResult::Divergent { mismatched, .. } => mismatched.clone(),
        }
    }
}

impl fmt::Display for ComparisonResult {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ComparisonResult::Consistent { table_count } => {
                write!(f, "consistent ({} tables)", table_count)
            }
            ComparisonResult::Divergent {
                table_counts,
                first_table,
                mismatched,
            } => write!(
                f,
                "divergent: {} vs {} tables, first mismatch {:?}, {} mismatched",
                table_counts.0,
                table_counts.1,
                first_table,
                mismatched.len()
            ),
        }
    }
}

/// Compare two checksum sets.
///
/// Consistent only if both sides list the same number of tables and every
/// table has an identical, known checksum on both. A table the server could
/// not checksum (`NULL`) is a mismatch even when it is `NULL` on both nodes,
/// since equal content cannot be shown. Swapping `a` and `b` yields the same
/// mismatch set.
pub fn compare(
    a: &ChecksumResult,
    b: &ChecksumResult,
) -> ComparisonResult {
    let names: BTreeSet<&String> = a.tables.keys().chain(b.tables.keys()).collect();

    let mismatched: BTreeSet<String> = names
        .into_iter()
        .filter(|name| {
            match (a.tables.get(*name), b.tables.get(*name)) {
                (Some(Some(x)), Some(Some(y))) => x != y,
                // missing on one side or not checksummable
                _ => true,
            }
        })
        .cloned()
        .collect();

    if mismatched.is_empty() && a.table_count() == b.table_count() {
        ComparisonResult::Consistent {
            table_count: a.table_count(),
        }
    } else {
        ComparisonResult::Divergent {
            table_counts: (a.table_count(), b.table_count()),
            first_table: mismatched.iter().next().cloned(),
            mismatched,
        }
    }
}

/// Parse `CHECKSUM TABLE` batch output: `<db>.<table>\t<checksum|NULL>`
pub fn parse_checksums(
    database: &str,
    output: &str,
) -> Result<ChecksumResult> {
    let mut tables = BTreeMap::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let (name, value) = line.split_once('\t').ok_or_else(|| CommandError::UnexpectedOutput {
            program: "CHECKSUM TABLE".to_string(),
            output: line.to_string(),
        })?;
        let table = name
            .strip_prefix(database)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(name);
        let checksum = value.trim().parse::<u64>().ok();
        tables.insert(table.to_string(), checksum);
    }
    Ok(ChecksumResult {
        database: database.to_string(),
        tables,
    })
}

pub struct ConsistencyChecker<R: CommandRunner> {
    supervisor: ProcessSupervisor<R>,
}

impl<R: CommandRunner> ConsistencyChecker<R> {
    pub fn new(supervisor: ProcessSupervisor<R>) -> Self {
        Self { supervisor }
    }

    /// Checksum every base table of `database` on one node
    pub async fn node_checksums(
        &self,
        database: &str,
        node: &NodeHandle,
    ) -> Result<ChecksumResult> {
        let database = validate_identifier(database)?;
        let listing = self
            .supervisor
            .query(
                node,
                &format!(
                    "SELECT table_name FROM information_schema.tables \
                     WHERE table_schema='{}' AND table_type='BASE TABLE' ORDER BY table_name",
                    database
                ),
            )
            .await?;
        let tables: Vec<&str> = listing.lines().map(str::trim).filter(|t| !t.is_empty()).collect();
        if tables.is_empty() {
            debug!("node{} has no tables in {}", node.index, database);
            return Ok(ChecksumResult {
                database: database.to_string(),
                tables: BTreeMap::new(),
            });
        }

        let list = tables
            .iter()
            .map(|t| format!("`{}`.`{}`", database, t.replace('`', "``")))
            .collect::<Vec<_>>()
            .join(", ");
        let output = self.supervisor.query(node, &format!("CHECKSUM TABLE {}", list)).await?;
        parse_checksums(database, &output)
    }

    /// Checksum `database` on both nodes and compare
    pub async fn checksum(
        &self,
        database: &str,
        a: &NodeHandle,
        b: &NodeHandle,
    ) -> Result<ComparisonResult> {
        let left = self.node_checksums(database, a).await?;
        let right = self.node_checksums(database, b).await?;
        let verdict = compare(&left, &right);
        if verdict.is_consistent() {
            info!("{} is consistent between node{} and node{}", database, a.index, b.index);
        } else {
            warn!("{} differs between node{} and node{}: {}", database, a.index, b.index, verdict);
        }
        Ok(verdict)
    }
}
