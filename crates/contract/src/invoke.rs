//! String-argument entry point: `(function, args[])` as submitted by clients.

use serde_json::Value;
use visanet_ledger::{CallerIdentity, Ledger};

use crate::contract::{Transition, TransactionContext, TransitionRequest, VisaApplicationContract};
use crate::error::{ContractError, StoreError};
use crate::visa::VISA_APPLICATION_CLASS;

/// A parsed contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Instantiate,
    Submit {
        submitter: String,
        application_number: String,
        submission_date_time: String,
    },
    Transition {
        transition: Transition,
        request: TransitionRequest,
    },
    QueryHistory {
        submitter: String,
        application_number: String,
    },
    QueryOwner {
        owner: String,
    },
    QueryPartial {
        prefix: String,
    },
    QueryAdhoc {
        query: String,
    },
    QueryNamed {
        name: String,
    },
}

impl Invocation {
    /// Every function name accepted by [`Invocation::parse`].
    pub const FUNCTIONS: [&'static str; 13] = [
        "instantiate",
        "appsubmit",
        "documentcheckpass",
        "documentcheckfail",
        "historycheckpass",
        "historycheckfail",
        "approve",
        "decline",
        "queryHistory",
        "queryOwner",
        "queryPartial",
        "queryAdhoc",
        "queryNamed",
    ];

    pub fn parse(function: &str, args: &[String]) -> Result<Self, ContractError> {
        if let Some(transition) = Transition::ALL
            .into_iter()
            .find(|t| t.function_name() == function)
        {
            let [submitter_org, number, approving, previous, at] = expect_args(function, args)?;
            return Ok(Invocation::Transition {
                transition,
                request: TransitionRequest::new(submitter_org, number, approving, previous, at),
            });
        }

        match function {
            "instantiate" => {
                let [] = expect_args(function, args)?;
                Ok(Invocation::Instantiate)
            }
            "appsubmit" => {
                let [submitter, number, at] = expect_args(function, args)?;
                Ok(Invocation::Submit {
                    submitter,
                    application_number: number,
                    submission_date_time: at,
                })
            }
            "queryHistory" => {
                let [submitter, number] = expect_args(function, args)?;
                Ok(Invocation::QueryHistory {
                    submitter,
                    application_number: number,
                })
            }
            "queryOwner" => {
                let [owner] = expect_args(function, args)?;
                Ok(Invocation::QueryOwner { owner })
            }
            "queryPartial" => {
                let [prefix] = expect_args(function, args)?;
                Ok(Invocation::QueryPartial { prefix })
            }
            "queryAdhoc" => {
                let [query] = expect_args(function, args)?;
                Ok(Invocation::QueryAdhoc { query })
            }
            "queryNamed" => {
                let [name] = expect_args(function, args)?;
                Ok(Invocation::QueryNamed { name })
            }
            other => Err(ContractError::InvalidArguments {
                function: other.to_string(),
                reason: format!(
                    "unknown function, expected one of: {}",
                    Self::FUNCTIONS.join(", ")
                ),
            }),
        }
    }

    pub fn function_name(&self) -> &'static str {
        match self {
            Invocation::Instantiate => "instantiate",
            Invocation::Submit { .. } => "appsubmit",
            Invocation::Transition { transition, .. } => transition.function_name(),
            Invocation::QueryHistory { .. } => "queryHistory",
            Invocation::QueryOwner { .. } => "queryOwner",
            Invocation::QueryPartial { .. } => "queryPartial",
            Invocation::QueryAdhoc { .. } => "queryAdhoc",
            Invocation::QueryNamed { .. } => "queryNamed",
        }
    }

    /// Queries run against committed state and never open a transaction.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Invocation::QueryHistory { .. }
                | Invocation::QueryOwner { .. }
                | Invocation::QueryPartial { .. }
                | Invocation::QueryAdhoc { .. }
                | Invocation::QueryNamed { .. }
        )
    }
}

fn expect_args<const N: usize>(
    function: &str,
    args: &[String],
) -> Result<[String; N], ContractError> {
    <[String; N]>::try_from(args.to_vec()).map_err(|got| ContractError::InvalidArguments {
        function: function.to_string(),
        reason: format!("expected {} argument(s), got {}", N, got.len()),
    })
}

impl VisaApplicationContract {
    /// Execute one invocation on behalf of `caller`.
    ///
    /// Mutating calls run in a fresh ledger transaction that is committed
    /// when the call succeeds and aborted when it fails, so a rejected call
    /// leaves no trace. The result is the JSON the client receives.
    pub async fn invoke<L: Ledger>(
        &self,
        ledger: &L,
        caller: &CallerIdentity,
        invocation: Invocation,
    ) -> Result<Value, ContractError> {
        if invocation.is_read_only() {
            return self.query(ledger, invocation).await;
        }

        let function = invocation.function_name();
        let mut tx = ledger.begin_transaction(function).await?;
        let result = {
            let mut ctx = TransactionContext::new(ledger, &mut tx, caller);
            self.execute(&mut ctx, invocation).await
        };

        match result {
            Ok(value) => {
                let receipt = ledger.commit_transaction(tx).await?;
                tracing::debug!(tx_id = %receipt.tx_id, writes = receipt.writes, "committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = ledger.abort_transaction(tx).await {
                    tracing::warn!(function, error = %abort, "abort failed");
                }
                Err(e)
            }
        }
    }

    async fn execute<L: Ledger>(
        &self,
        ctx: &mut TransactionContext<'_, L>,
        invocation: Invocation,
    ) -> Result<Value, ContractError> {
        let app = match invocation {
            Invocation::Instantiate => {
                self.instantiate();
                return Ok(Value::Null);
            }
            Invocation::Submit {
                submitter,
                application_number,
                submission_date_time,
            } => {
                self.submit(ctx, &submitter, &application_number, &submission_date_time)
                    .await?
            }
            Invocation::Transition {
                transition,
                request,
            } => self.transition(ctx, transition, &request).await?,
            other => {
                return Err(ContractError::InvalidArguments {
                    function: other.function_name().to_string(),
                    reason: "queries do not run inside a transaction".to_string(),
                })
            }
        };
        to_json(&app)
    }

    async fn query<L: Ledger>(
        &self,
        ledger: &L,
        invocation: Invocation,
    ) -> Result<Value, ContractError> {
        let queries = self.queries(ledger);
        match invocation {
            Invocation::QueryHistory {
                submitter,
                application_number,
            } => to_json(
                &queries
                    .get_asset_history(&submitter, &application_number)
                    .await?,
            ),
            Invocation::QueryOwner { owner } => {
                to_json(&queries.query_key_by_owner(&owner).await?)
            }
            Invocation::QueryPartial { prefix } => {
                to_json(&queries.query_key_by_partial(&prefix).await?)
            }
            Invocation::QueryAdhoc { query } => to_json(&queries.query_by_adhoc(&query).await?),
            Invocation::QueryNamed { name } => to_json(&queries.query_named(&name).await?),
            other => Err(ContractError::InvalidArguments {
                function: other.function_name().to_string(),
                reason: "not a query".to_string(),
            }),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ContractError> {
    serde_json::to_value(value).map_err(|source| {
        ContractError::Store(StoreError::Encode {
            class: VISA_APPLICATION_CLASS,
            source,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_transition_functions() {
        let inv = Invocation::parse(
            "approve",
            &args(&["VisaWorld", "00001", "Org1MSP", "Org3MSP", "2024-05-03"]),
        )
        .unwrap();
        assert_eq!(
            inv,
            Invocation::Transition {
                transition: Transition::Approve,
                request: TransitionRequest::new(
                    "VisaWorld",
                    "00001",
                    "Org1MSP",
                    "Org3MSP",
                    "2024-05-03"
                ),
            }
        );
        assert_eq!(inv.function_name(), "approve");
        assert!(!inv.is_read_only());
    }

    #[test]
    fn parses_submit_and_queries() {
        assert_eq!(
            Invocation::parse("appsubmit", &args(&["VisaWorld", "00001", "2024-05-01"])).unwrap(),
            Invocation::Submit {
                submitter: "VisaWorld".to_string(),
                application_number: "00001".to_string(),
                submission_date_time: "2024-05-01".to_string(),
            }
        );
        let named = Invocation::parse("queryNamed", &args(&["approved"])).unwrap();
        assert!(named.is_read_only());
        assert_eq!(named.function_name(), "queryNamed");
    }

    #[test]
    fn every_listed_function_parses_with_some_arity() {
        for function in Invocation::FUNCTIONS {
            let parsed = (0..=5).any(|n| {
                let supplied = vec!["x".to_string(); n];
                Invocation::parse(function, &supplied).is_ok()
            });
            assert!(parsed, "{} never parsed", function);
        }
    }

    #[test]
    fn wrong_arity_is_invalid_arguments() {
        let err = Invocation::parse("decline", &args(&["VisaWorld", "00001"])).unwrap_err();
        match err {
            ContractError::InvalidArguments { function, reason } => {
                assert_eq!(function, "decline");
                assert!(reason.contains("expected 5"), "{}", reason);
            }
            other => panic!("expected InvalidArguments, got {:?}", other),
        }
    }

    #[test]
    fn unknown_function_is_invalid_arguments() {
        assert!(matches!(
            Invocation::parse("buy", &[]),
            Err(ContractError::InvalidArguments { .. })
        ));
    }
}
