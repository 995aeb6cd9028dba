use std::future::Future;

use super::{drain, put_committed, TestResult};
use crate::composite::create_composite_key;
use crate::{Ledger, LedgerError, ResultsIterator};

pub(super) async fn run_query_tests<L, F, Fut>(factory: &F) -> Vec<TestResult>
where
    L: Ledger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    vec![
        TestResult::from_result(
            "query",
            "partial_key_scan_matches_prefix_only",
            partial_key_scan_matches_prefix_only(factory().await).await,
        ),
        TestResult::from_result(
            "query",
            "partial_key_scan_skips_deleted",
            partial_key_scan_skips_deleted(factory().await).await,
        ),
        TestResult::from_result(
            "query",
            "rich_query_selects_by_field",
            rich_query_selects_by_field(factory().await).await,
        ),
        TestResult::from_result(
            "query",
            "rich_query_respects_limit",
            rich_query_respects_limit(factory().await).await,
        ),
        TestResult::from_result(
            "query",
            "rich_query_ignores_non_json_values",
            rich_query_ignores_non_json_values(factory().await).await,
        ),
        TestResult::from_result(
            "query",
            "malformed_rich_query_rejected",
            malformed_rich_query_rejected(factory().await).await,
        ),
    ]
}

fn key(object_type: &str, parts: &[&str]) -> Result<String, String> {
    create_composite_key(object_type, parts).map_err(|e| e.to_string())
}

async fn partial_key_scan_matches_prefix_only<L: Ledger>(l: L) -> Result<(), String> {
    put_committed(&l, &key("app", &["VisaWorld", "00001"])?, b"{}").await?;
    put_committed(&l, &key("app", &["VisaWorld", "00002"])?, b"{}").await?;
    put_committed(&l, &key("app", &["VisaWorld2", "00001"])?, b"{}").await?;
    put_committed(&l, &key("other", &["VisaWorld", "00001"])?, b"{}").await?;

    let cursor = l
        .get_state_by_partial_composite_key("app", &["VisaWorld"])
        .await
        .map_err(|e| e.to_string())?;
    let keys: Vec<String> = drain(cursor).await?.into_iter().map(|kv| kv.key).collect();
    let expected = vec![
        key("app", &["VisaWorld", "00001"])?,
        key("app", &["VisaWorld", "00002"])?,
    ];
    if keys == expected {
        Ok(())
    } else {
        Err(format!("expected {:?}, got {:?}", expected, keys))
    }
}

async fn partial_key_scan_skips_deleted<L: Ledger>(l: L) -> Result<(), String> {
    let k = key("app", &["VisaWorld", "00001"])?;
    put_committed(&l, &k, b"{}").await?;
    let mut tx = l.begin_transaction("del").await.map_err(|e| e.to_string())?;
    l.delete_state(&mut tx, &k).await.map_err(|e| e.to_string())?;
    l.commit_transaction(tx).await.map_err(|e| e.to_string())?;

    let cursor = l
        .get_state_by_partial_composite_key("app", &[])
        .await
        .map_err(|e| e.to_string())?;
    let found = drain(cursor).await?;
    if found.is_empty() {
        Ok(())
    } else {
        Err(format!("deleted key returned by scan: {:?}", found))
    }
}

async fn rich_query_selects_by_field<L: Ledger>(l: L) -> Result<(), String> {
    put_committed(&l, "a", br#"{"owner":"VisaWorld","currentState":1}"#).await?;
    put_committed(&l, "b", br#"{"owner":"Embassy","currentState":6}"#).await?;
    put_committed(&l, "c", br#"{"owner":"VisaWorld","currentState":6}"#).await?;

    let cursor = l
        .get_query_result(r#"{"selector":{"owner":"VisaWorld","currentState":6}}"#)
        .await
        .map_err(|e| e.to_string())?;
    let keys: Vec<String> = drain(cursor).await?.into_iter().map(|kv| kv.key).collect();
    if keys == vec!["c".to_string()] {
        Ok(())
    } else {
        Err(format!("expected [c], got {:?}", keys))
    }
}

async fn rich_query_respects_limit<L: Ledger>(l: L) -> Result<(), String> {
    for k in ["a", "b", "c"] {
        put_committed(&l, k, br#"{"owner":"VisaWorld"}"#).await?;
    }
    let cursor = l
        .get_query_result(r#"{"selector":{"owner":"VisaWorld"},"limit":2}"#)
        .await
        .map_err(|e| e.to_string())?;
    let found = drain(cursor).await?;
    if found.len() == 2 {
        Ok(())
    } else {
        Err(format!("expected 2 results, got {}", found.len()))
    }
}

async fn rich_query_ignores_non_json_values<L: Ledger>(l: L) -> Result<(), String> {
    put_committed(&l, "a", b"not json").await?;
    put_committed(&l, "b", br#"{"owner":"x"}"#).await?;
    let cursor = l
        .get_query_result(r#"{"selector":{}}"#)
        .await
        .map_err(|e| e.to_string())?;
    let keys: Vec<String> = drain(cursor).await?.into_iter().map(|kv| kv.key).collect();
    if keys == vec!["b".to_string()] {
        Ok(())
    } else {
        Err(format!("expected [b], got {:?}", keys))
    }
}

async fn malformed_rich_query_rejected<L: Ledger>(l: L) -> Result<(), String> {
    match l.get_query_result("{\"selector\":").await {
        Err(LedgerError::InvalidQuery { .. }) => Ok(()),
        Err(other) => Err(format!("expected InvalidQuery, got {}", other)),
        Ok(mut cursor) => {
            cursor.close().await.map_err(|e| e.to_string())?;
            Err("malformed query was accepted".to_string())
        }
    }
}
