use std::future::Future;

use super::{put_committed, read_committed, TestResult};
use crate::{Ledger, LedgerError};

pub(super) async fn run_concurrent_tests<L, F, Fut>(factory: &F) -> Vec<TestResult>
where
    L: Ledger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "stale_read_conflicts_at_commit",
            stale_read_conflicts_at_commit(factory().await).await,
        ),
        TestResult::from_result(
            "concurrent",
            "conflicting_transaction_applies_nothing",
            conflicting_transaction_applies_nothing(factory().await).await,
        ),
        TestResult::from_result(
            "concurrent",
            "phantom_create_conflicts",
            phantom_create_conflicts(factory().await).await,
        ),
        TestResult::from_result(
            "concurrent",
            "disjoint_keys_commit_independently",
            disjoint_keys_commit_independently(factory().await).await,
        ),
        TestResult::from_result(
            "concurrent",
            "blind_write_does_not_conflict",
            blind_write_does_not_conflict(factory().await).await,
        ),
    ]
}

/// Two transactions read the same version; only the first commit wins.
async fn stale_read_conflicts_at_commit<L: Ledger>(l: L) -> Result<(), String> {
    put_committed(&l, "app-1", b"v1").await?;

    let mut first = l.begin_transaction("approve").await.map_err(|e| e.to_string())?;
    let mut second = l.begin_transaction("decline").await.map_err(|e| e.to_string())?;
    l.get_state(&mut first, "app-1").await.map_err(|e| e.to_string())?;
    l.get_state(&mut second, "app-1").await.map_err(|e| e.to_string())?;
    l.put_state(&mut first, "app-1", b"approved".to_vec())
        .await
        .map_err(|e| e.to_string())?;
    l.put_state(&mut second, "app-1", b"declined".to_vec())
        .await
        .map_err(|e| e.to_string())?;

    l.commit_transaction(first).await.map_err(|e| e.to_string())?;
    match l.commit_transaction(second).await {
        Err(LedgerError::ConcurrentConflict { key, .. }) if key == "app-1" => Ok(()),
        Err(other) => Err(format!("expected ConcurrentConflict, got {}", other)),
        Ok(_) => Err("second commit on a stale read succeeded".to_string()),
    }
}

async fn conflicting_transaction_applies_nothing<L: Ledger>(l: L) -> Result<(), String> {
    put_committed(&l, "app-1", b"v1").await?;

    let mut stale = l.begin_transaction("w").await.map_err(|e| e.to_string())?;
    l.get_state(&mut stale, "app-1").await.map_err(|e| e.to_string())?;
    l.put_state(&mut stale, "app-1", b"stale".to_vec())
        .await
        .map_err(|e| e.to_string())?;
    l.put_state(&mut stale, "app-2", b"side".to_vec())
        .await
        .map_err(|e| e.to_string())?;

    put_committed(&l, "app-1", b"v2").await?;
    if l.commit_transaction(stale).await.is_ok() {
        return Err("stale transaction committed".to_string());
    }

    let app1 = read_committed(&l, "app-1").await?;
    let app2 = read_committed(&l, "app-2").await?;
    if app1.as_deref() == Some(b"v2".as_slice()) && app2.is_none() {
        Ok(())
    } else {
        Err(format!(
            "partial apply detected: app-1={:?} app-2={:?}",
            app1, app2
        ))
    }
}

/// Reading an absent key and then racing another creator must conflict.
async fn phantom_create_conflicts<L: Ledger>(l: L) -> Result<(), String> {
    let mut tx = l.begin_transaction("submit").await.map_err(|e| e.to_string())?;
    if l.get_state(&mut tx, "app-1")
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Err("fresh ledger returned a value".to_string());
    }
    l.put_state(&mut tx, "app-1", b"mine".to_vec())
        .await
        .map_err(|e| e.to_string())?;

    put_committed(&l, "app-1", b"theirs").await?;
    match l.commit_transaction(tx).await {
        Err(LedgerError::ConcurrentConflict {
            expected_version: 0,
            ..
        }) => Ok(()),
        Err(other) => Err(format!("expected ConcurrentConflict at version 0, got {}", other)),
        Ok(_) => Err("create over a concurrently created key succeeded".to_string()),
    }
}

async fn disjoint_keys_commit_independently<L: Ledger>(l: L) -> Result<(), String> {
    put_committed(&l, "app-1", b"a").await?;
    put_committed(&l, "app-2", b"b").await?;

    let mut first = l.begin_transaction("w").await.map_err(|e| e.to_string())?;
    let mut second = l.begin_transaction("w").await.map_err(|e| e.to_string())?;
    l.get_state(&mut first, "app-1").await.map_err(|e| e.to_string())?;
    l.get_state(&mut second, "app-2").await.map_err(|e| e.to_string())?;
    l.put_state(&mut first, "app-1", b"a2".to_vec())
        .await
        .map_err(|e| e.to_string())?;
    l.put_state(&mut second, "app-2", b"b2".to_vec())
        .await
        .map_err(|e| e.to_string())?;

    l.commit_transaction(first).await.map_err(|e| e.to_string())?;
    l.commit_transaction(second).await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn blind_write_does_not_conflict<L: Ledger>(l: L) -> Result<(), String> {
    let mut blind = l.begin_transaction("w").await.map_err(|e| e.to_string())?;
    l.put_state(&mut blind, "app-1", b"blind".to_vec())
        .await
        .map_err(|e| e.to_string())?;
    put_committed(&l, "app-1", b"other").await?;
    l.commit_transaction(blind).await.map_err(|e| e.to_string())?;

    match read_committed(&l, "app-1").await? {
        Some(v) if v == b"blind" => Ok(()),
        other => Err(format!("expected last writer to win, got {:?}", other)),
    }
}
