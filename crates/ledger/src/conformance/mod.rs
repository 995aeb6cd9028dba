//! Backend-agnostic checks for `Ledger` implementations.
//!
//! Each check gets a fresh, empty ledger from the caller's factory and
//! reports pass/fail instead of panicking, so one run lists every broken
//! behaviour at once. Categories:
//!
//! - **state**: point reads/writes, reads-your-writes, abort, deletes
//! - **history**: per-key version order, transaction ids, delete markers
//! - **query**: partial composite key scans and rich selector queries
//! - **concurrent**: MVCC read-set conflicts at commit
//!
//! ```ignore
//! use visanet_ledger::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn couch_conformance() {
//!     let report = run_conformance_suite(|| async { connect_test_ledger().await }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod history;
mod query;
mod state;

use std::fmt;
use std::future::Future;

use crate::traits::{BoxedResults, ResultsIterator};
use crate::Ledger;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "state", "history", "query").
    pub category: String,
    /// Test name (e.g. "put_then_get_after_commit").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a ledger backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// ledger, ensuring test isolation.
pub async fn run_conformance_suite<L, F, Fut>(factory: F) -> ConformanceReport
where
    L: Ledger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let mut results = Vec::new();

    results.extend(state::run_state_tests(&factory).await);
    results.extend(history::run_history_tests(&factory).await);
    results.extend(query::run_query_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Put `value` at `key` in its own committed transaction.
async fn put_committed<L: Ledger>(ledger: &L, key: &str, value: &[u8]) -> Result<(), String> {
    let mut tx = ledger
        .begin_transaction("put")
        .await
        .map_err(|e| e.to_string())?;
    ledger
        .put_state(&mut tx, key, value.to_vec())
        .await
        .map_err(|e| e.to_string())?;
    ledger
        .commit_transaction(tx)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Read `key` in a fresh transaction that is then aborted.
async fn read_committed<L: Ledger>(ledger: &L, key: &str) -> Result<Option<Vec<u8>>, String> {
    let mut tx = ledger
        .begin_transaction("get")
        .await
        .map_err(|e| e.to_string())?;
    let value = ledger
        .get_state(&mut tx, key)
        .await
        .map_err(|e| e.to_string())?;
    ledger
        .abort_transaction(tx)
        .await
        .map_err(|e| e.to_string())?;
    Ok(value)
}

/// Drain and close a cursor.
async fn drain<T: Send + 'static>(mut cursor: BoxedResults<T>) -> Result<Vec<T>, String> {
    let mut items = Vec::new();
    let outcome = loop {
        match cursor.next().await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => break Ok(()),
            Err(e) => break Err(e.to_string()),
        }
    };
    cursor.close().await.map_err(|e| e.to_string())?;
    outcome.map(|()| items)
}
