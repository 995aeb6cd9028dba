//! Runs the backend-agnostic ledger conformance suite against the
//! in-memory backend.

use visanet_ledger::conformance::run_conformance_suite;
use visanet_ledger::InMemoryLedger;

#[tokio::test]
async fn in_memory_ledger_passes_conformance_suite() {
    let report = run_conformance_suite(|| async { InMemoryLedger::new() }).await;
    assert!(report.total > 0);
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test]
async fn conformance_report_lists_every_category() {
    let report = run_conformance_suite(|| async { InMemoryLedger::new() }).await;
    for category in ["state", "history", "query", "concurrent"] {
        assert!(
            report.results.iter().any(|r| r.category == category),
            "no results for category {}",
            category
        );
    }
}
