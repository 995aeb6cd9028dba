use std::future::Future;

use super::{drain, put_committed, TestResult};
use crate::Ledger;

pub(super) async fn run_history_tests<L, F, Fut>(factory: &F) -> Vec<TestResult>
where
    L: Ledger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    vec![
        TestResult::from_result(
            "history",
            "history_of_absent_key_is_empty",
            history_of_absent_key_is_empty(factory().await).await,
        ),
        TestResult::from_result(
            "history",
            "history_lists_versions_oldest_first",
            history_lists_versions_oldest_first(factory().await).await,
        ),
        TestResult::from_result(
            "history",
            "history_entries_carry_receipt_tx_id",
            history_entries_carry_receipt_tx_id(factory().await).await,
        ),
        TestResult::from_result(
            "history",
            "delete_recorded_as_marker",
            delete_recorded_as_marker(factory().await).await,
        ),
        TestResult::from_result(
            "history",
            "aborted_transaction_leaves_no_history",
            aborted_transaction_leaves_no_history(factory().await).await,
        ),
    ]
}

async fn history_of_absent_key_is_empty<L: Ledger>(l: L) -> Result<(), String> {
    let cursor = l.get_history_for_key("nothing").await.map_err(|e| e.to_string())?;
    let entries = drain(cursor).await?;
    if entries.is_empty() {
        Ok(())
    } else {
        Err(format!("expected no history, got {} entries", entries.len()))
    }
}

async fn history_lists_versions_oldest_first<L: Ledger>(l: L) -> Result<(), String> {
    for v in ["v1", "v2", "v3"] {
        put_committed(&l, "app-1", v.as_bytes()).await?;
    }
    let cursor = l.get_history_for_key("app-1").await.map_err(|e| e.to_string())?;
    let values: Vec<Vec<u8>> = drain(cursor).await?.into_iter().map(|m| m.value).collect();
    if values == vec![b"v1".to_vec(), b"v2".to_vec(), b"v3".to_vec()] {
        Ok(())
    } else {
        Err(format!("unexpected history order: {:?}", values))
    }
}

async fn history_entries_carry_receipt_tx_id<L: Ledger>(l: L) -> Result<(), String> {
    let mut tx = l.begin_transaction("put").await.map_err(|e| e.to_string())?;
    let expected = l.transaction_id(&tx).to_string();
    l.put_state(&mut tx, "app-1", b"x".to_vec())
        .await
        .map_err(|e| e.to_string())?;
    let receipt = l.commit_transaction(tx).await.map_err(|e| e.to_string())?;
    if receipt.tx_id != expected {
        return Err(format!(
            "receipt tx id {} differs from transaction id {}",
            receipt.tx_id, expected
        ));
    }

    let cursor = l.get_history_for_key("app-1").await.map_err(|e| e.to_string())?;
    let entries = drain(cursor).await?;
    match entries.as_slice() {
        [only] if only.tx_id == expected && only.timestamp == receipt.timestamp => Ok(()),
        other => Err(format!("unexpected history entries: {:?}", other)),
    }
}

async fn delete_recorded_as_marker<L: Ledger>(l: L) -> Result<(), String> {
    put_committed(&l, "app-1", b"x").await?;
    let mut tx = l.begin_transaction("del").await.map_err(|e| e.to_string())?;
    l.delete_state(&mut tx, "app-1")
        .await
        .map_err(|e| e.to_string())?;
    l.commit_transaction(tx).await.map_err(|e| e.to_string())?;

    let cursor = l.get_history_for_key("app-1").await.map_err(|e| e.to_string())?;
    let entries = drain(cursor).await?;
    match entries.as_slice() {
        [put, del] if !put.is_delete && del.is_delete => Ok(()),
        other => Err(format!("expected put then delete marker, got {:?}", other)),
    }
}

async fn aborted_transaction_leaves_no_history<L: Ledger>(l: L) -> Result<(), String> {
    put_committed(&l, "app-1", b"x").await?;
    let mut tx = l.begin_transaction("w").await.map_err(|e| e.to_string())?;
    l.put_state(&mut tx, "app-1", b"y".to_vec())
        .await
        .map_err(|e| e.to_string())?;
    l.abort_transaction(tx).await.map_err(|e| e.to_string())?;

    let cursor = l.get_history_for_key("app-1").await.map_err(|e| e.to_string())?;
    let entries = drain(cursor).await?;
    if entries.len() == 1 {
        Ok(())
    } else {
        Err(format!("expected 1 history entry, got {}", entries.len()))
    }
}
