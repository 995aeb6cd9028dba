use std::future::Future;

use super::{put_committed, read_committed, TestResult};
use crate::{Ledger, LedgerError};

pub(super) async fn run_state_tests<L, F, Fut>(factory: &F) -> Vec<TestResult>
where
    L: Ledger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    vec![
        TestResult::from_result(
            "state",
            "absent_key_reads_none",
            absent_key_reads_none(factory().await).await,
        ),
        TestResult::from_result(
            "state",
            "put_then_get_after_commit",
            put_then_get_after_commit(factory().await).await,
        ),
        TestResult::from_result(
            "state",
            "uncommitted_write_invisible_to_other_transactions",
            uncommitted_write_invisible(factory().await).await,
        ),
        TestResult::from_result(
            "state",
            "aborted_write_not_applied",
            aborted_write_not_applied(factory().await).await,
        ),
        TestResult::from_result(
            "state",
            "overwrite_replaces_value",
            overwrite_replaces_value(factory().await).await,
        ),
        TestResult::from_result(
            "state",
            "delete_makes_key_absent",
            delete_makes_key_absent(factory().await).await,
        ),
        TestResult::from_result(
            "state",
            "empty_key_rejected",
            empty_key_rejected(factory().await).await,
        ),
        TestResult::from_result(
            "state",
            "transaction_ids_distinct",
            transaction_ids_distinct(factory().await).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn absent_key_reads_none<L: Ledger>(l: L) -> Result<(), String> {
    match read_committed(&l, "missing").await? {
        None => Ok(()),
        Some(v) => Err(format!("expected None, got {} bytes", v.len())),
    }
}

async fn put_then_get_after_commit<L: Ledger>(l: L) -> Result<(), String> {
    put_committed(&l, "app-1", b"{\"n\":1}").await?;
    match read_committed(&l, "app-1").await? {
        Some(v) if v == b"{\"n\":1}" => Ok(()),
        other => Err(format!("unexpected value after commit: {:?}", other)),
    }
}

async fn uncommitted_write_invisible<L: Ledger>(l: L) -> Result<(), String> {
    let mut writer = l.begin_transaction("w").await.map_err(|e| e.to_string())?;
    l.put_state(&mut writer, "app-1", b"x".to_vec())
        .await
        .map_err(|e| e.to_string())?;

    let seen = read_committed(&l, "app-1").await?;
    l.abort_transaction(writer).await.map_err(|e| e.to_string())?;
    match seen {
        None => Ok(()),
        Some(_) => Err("uncommitted write was visible to another transaction".to_string()),
    }
}

async fn aborted_write_not_applied<L: Ledger>(l: L) -> Result<(), String> {
    let mut tx = l.begin_transaction("w").await.map_err(|e| e.to_string())?;
    l.put_state(&mut tx, "app-1", b"x".to_vec())
        .await
        .map_err(|e| e.to_string())?;
    l.abort_transaction(tx).await.map_err(|e| e.to_string())?;

    match read_committed(&l, "app-1").await? {
        None => Ok(()),
        Some(_) => Err("aborted write was applied".to_string()),
    }
}

async fn overwrite_replaces_value<L: Ledger>(l: L) -> Result<(), String> {
    put_committed(&l, "app-1", b"one").await?;
    put_committed(&l, "app-1", b"two").await?;
    match read_committed(&l, "app-1").await? {
        Some(v) if v == b"two" => Ok(()),
        other => Err(format!("expected \"two\", got {:?}", other)),
    }
}

async fn delete_makes_key_absent<L: Ledger>(l: L) -> Result<(), String> {
    put_committed(&l, "app-1", b"one").await?;
    let mut tx = l.begin_transaction("del").await.map_err(|e| e.to_string())?;
    l.delete_state(&mut tx, "app-1")
        .await
        .map_err(|e| e.to_string())?;
    l.commit_transaction(tx).await.map_err(|e| e.to_string())?;

    match read_committed(&l, "app-1").await? {
        None => Ok(()),
        Some(_) => Err("deleted key still readable".to_string()),
    }
}

async fn empty_key_rejected<L: Ledger>(l: L) -> Result<(), String> {
    let mut tx = l.begin_transaction("w").await.map_err(|e| e.to_string())?;
    let result = l.put_state(&mut tx, "", b"x".to_vec()).await;
    l.abort_transaction(tx).await.map_err(|e| e.to_string())?;
    match result {
        Err(LedgerError::InvalidKey { .. }) => Ok(()),
        other => Err(format!("expected InvalidKey, got {:?}", other.map(|_| ()))),
    }
}

async fn transaction_ids_distinct<L: Ledger>(l: L) -> Result<(), String> {
    let a = l.begin_transaction("f").await.map_err(|e| e.to_string())?;
    let b = l.begin_transaction("f").await.map_err(|e| e.to_string())?;
    let distinct = l.transaction_id(&a) != l.transaction_id(&b);
    l.abort_transaction(a).await.map_err(|e| e.to_string())?;
    l.abort_transaction(b).await.map_err(|e| e.to_string())?;
    if distinct {
        Ok(())
    } else {
        Err("two transactions received the same id".to_string())
    }
}
