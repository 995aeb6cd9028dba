//! Visa application workflow engine.
//!
//! Each transition is an organization-gated state change of one application.
//! Execution follows:
//! 1. Load the application through the entity store
//! 2. State guards: terminal, sub-check already concluded, disqualifying
//!    failure, pending prerequisite
//! 3. Organization guards: declared approving org vs. caller org, recorded
//!    owner org vs. declared previous org
//! 4. Apply the transition and hand `ownerMSP` to the caller's organization
//! 5. Write the application back through the entity store
//!
//! Guards run against the in-memory copy; nothing is written unless all of
//! them pass.

use std::fmt;

use visanet_ledger::{CallerIdentity, Ledger};

use crate::error::ContractError;
use crate::queries::QueryUtils;
use crate::store::StateList;
use crate::visa::{ApplicationState, CheckStatus, VisaApplication, VISA_APPLICATION_CLASS};

/// Certificate attribute carrying the approving principal's distinguished name.
pub const DN_ATTRIBUTE: &str = "DN";

/// Explicit per-invocation context: the ledger, the open transaction and the
/// authenticated caller.
pub struct TransactionContext<'a, L: Ledger> {
    pub ledger: &'a L,
    pub tx: &'a mut L::Transaction,
    pub caller: &'a CallerIdentity,
}

impl<'a, L: Ledger> TransactionContext<'a, L> {
    pub fn new(ledger: &'a L, tx: &'a mut L::Transaction, caller: &'a CallerIdentity) -> Self {
        Self { ledger, tx, caller }
    }
}

/// A lifecycle transition after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    DocumentCheckPass,
    DocumentCheckFail,
    HistoryCheckPass,
    HistoryCheckFail,
    Approve,
    Decline,
}

impl Transition {
    pub const ALL: [Transition; 6] = [
        Transition::DocumentCheckPass,
        Transition::DocumentCheckFail,
        Transition::HistoryCheckPass,
        Transition::HistoryCheckFail,
        Transition::Approve,
        Transition::Decline,
    ];

    /// Contract function name used by string invocations.
    pub fn function_name(self) -> &'static str {
        match self {
            Transition::DocumentCheckPass => "documentcheckpass",
            Transition::DocumentCheckFail => "documentcheckfail",
            Transition::HistoryCheckPass => "historycheckpass",
            Transition::HistoryCheckFail => "historycheckfail",
            Transition::Approve => "approve",
            Transition::Decline => "decline",
        }
    }

    /// State the application is in after the transition.
    pub fn target(self) -> ApplicationState {
        match self {
            Transition::DocumentCheckPass => ApplicationState::DocsCheckPassed,
            Transition::DocumentCheckFail => ApplicationState::DocsCheckFailed,
            Transition::HistoryCheckPass => ApplicationState::HistoryCheckPassed,
            Transition::HistoryCheckFail => ApplicationState::HistoryCheckFailed,
            Transition::Approve => ApplicationState::Approved,
            Transition::Decline => ApplicationState::Declined,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

/// Arguments shared by every post-submission transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    /// Submitting agency; first key part of the application.
    pub submitter_org: String,
    pub application_number: String,
    /// Organization the caller claims to act for. Must equal the caller's own.
    pub approving_org: String,
    /// Organization the caller expects to currently hold the application.
    pub previous_org: String,
    pub approving_date_time: String,
}

impl TransitionRequest {
    pub fn new(
        submitter_org: impl Into<String>,
        application_number: impl Into<String>,
        approving_org: impl Into<String>,
        previous_org: impl Into<String>,
        approving_date_time: impl Into<String>,
    ) -> Self {
        Self {
            submitter_org: submitter_org.into(),
            application_number: application_number.into(),
            approving_org: approving_org.into(),
            previous_org: previous_org.into(),
            approving_date_time: approving_date_time.into(),
        }
    }
}

/// The visa application contract.
#[derive(Debug, Default)]
pub struct VisaApplicationContract {
    applications: StateList<VisaApplication>,
}

impl VisaApplicationContract {
    pub const NAMESPACE: &'static str = VISA_APPLICATION_CLASS;

    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger setup hook. Nothing to migrate for this contract version.
    pub fn instantiate(&self) {
        tracing::info!(namespace = Self::NAMESPACE, "instantiate the contract");
    }

    /// Read-only queries over this contract's namespace.
    pub fn queries<'a, L: Ledger>(&self, ledger: &'a L) -> QueryUtils<'a, L> {
        QueryUtils::new(ledger, Self::NAMESPACE)
    }

    /// Record a new application in state NEW, owned by the submitting org.
    pub async fn submit<L: Ledger>(
        &self,
        ctx: &mut TransactionContext<'_, L>,
        submitter: &str,
        application_number: &str,
        submission_date_time: &str,
    ) -> Result<VisaApplication, ContractError> {
        let app = VisaApplication::create(
            submitter,
            application_number,
            submission_date_time,
            ctx.caller.organization_id(),
        );
        self.applications.add(ctx.ledger, ctx.tx, &app).await?;
        tracing::info!(
            application = %app.label(),
            owner_msp = app.owner_msp(),
            "application submitted"
        );
        Ok(app)
    }

    pub async fn document_check_pass<L: Ledger>(
        &self,
        ctx: &mut TransactionContext<'_, L>,
        request: &TransitionRequest,
    ) -> Result<VisaApplication, ContractError> {
        self.transition(ctx, Transition::DocumentCheckPass, request)
            .await
    }

    pub async fn document_check_fail<L: Ledger>(
        &self,
        ctx: &mut TransactionContext<'_, L>,
        request: &TransitionRequest,
    ) -> Result<VisaApplication, ContractError> {
        self.transition(ctx, Transition::DocumentCheckFail, request)
            .await
    }

    pub async fn history_check_pass<L: Ledger>(
        &self,
        ctx: &mut TransactionContext<'_, L>,
        request: &TransitionRequest,
    ) -> Result<VisaApplication, ContractError> {
        self.transition(ctx, Transition::HistoryCheckPass, request)
            .await
    }

    pub async fn history_check_fail<L: Ledger>(
        &self,
        ctx: &mut TransactionContext<'_, L>,
        request: &TransitionRequest,
    ) -> Result<VisaApplication, ContractError> {
        self.transition(ctx, Transition::HistoryCheckFail, request)
            .await
    }

    pub async fn approve<L: Ledger>(
        &self,
        ctx: &mut TransactionContext<'_, L>,
        request: &TransitionRequest,
    ) -> Result<VisaApplication, ContractError> {
        self.transition(ctx, Transition::Approve, request).await
    }

    pub async fn decline<L: Ledger>(
        &self,
        ctx: &mut TransactionContext<'_, L>,
        request: &TransitionRequest,
    ) -> Result<VisaApplication, ContractError> {
        self.transition(ctx, Transition::Decline, request).await
    }

    /// Load, guard, apply and write back one transition.
    pub async fn transition<L: Ledger>(
        &self,
        ctx: &mut TransactionContext<'_, L>,
        transition: Transition,
        request: &TransitionRequest,
    ) -> Result<VisaApplication, ContractError> {
        let key = self
            .applications
            .compose_key(&[&request.submitter_org, &request.application_number])?;
        let mut app = self.applications.get(ctx.ledger, ctx.tx, &key).await?;

        if let Err(e) = authorize(&app, transition, ctx.caller, request) {
            tracing::warn!(
                application = %app.label(),
                %transition,
                caller_msp = ctx.caller.organization_id(),
                error = %e,
                "transition rejected"
            );
            return Err(e);
        }

        let from = app.current_state();
        apply(&mut app, transition, ctx.caller, request);
        self.applications.update(ctx.ledger, ctx.tx, &app).await?;

        tracing::info!(
            application = %app.label(),
            %transition,
            %from,
            to = %app.current_state(),
            owner_msp = app.owner_msp(),
            "transition applied"
        );
        Ok(app)
    }
}

/// Run every guard for `transition` against `app`, in order:
///
/// 1. terminal state
/// 2. the sub-check this transition concerns already concluded
/// 3. a disqualifying earlier failure, or (approve only) a pending prerequisite
/// 4. declared approving org differs from the caller's org
/// 5. recorded owner org differs from the declared previous org
pub fn authorize(
    app: &VisaApplication,
    transition: Transition,
    caller: &CallerIdentity,
    request: &TransitionRequest,
) -> Result<(), ContractError> {
    check_state(app, transition)?;
    check_organizations(app, transition, caller, request)
}

fn check_state(app: &VisaApplication, transition: Transition) -> Result<(), ContractError> {
    let invalid = |reason: String| ContractError::InvalidState {
        application: app.label(),
        state: app.current_state(),
        reason,
    };

    if app.is_terminal() {
        return Err(invalid(format!(
            "decision is already given, final decision: {}",
            app.current_state()
        )));
    }

    match transition {
        Transition::DocumentCheckPass | Transition::DocumentCheckFail => {
            if app.document_check().is_concluded() {
                return Err(invalid(format!(
                    "document check already concluded ({})",
                    app.document_check()
                )));
            }
            if app.history_check().is_concluded() {
                return Err(invalid(format!(
                    "history check already concluded ({}), document check can no longer run",
                    app.history_check()
                )));
            }
        }
        Transition::HistoryCheckPass | Transition::HistoryCheckFail => {
            if app.history_check().is_concluded() {
                return Err(invalid(format!(
                    "history check already concluded ({})",
                    app.history_check()
                )));
            }
            if transition == Transition::HistoryCheckFail
                && app.document_check() == CheckStatus::Failed
            {
                return Err(invalid(
                    "document check failed, application cannot receive a history verdict"
                        .to_string(),
                ));
            }
        }
        Transition::Approve => {
            if app.document_check() == CheckStatus::Failed {
                return Err(invalid("document check failed".to_string()));
            }
            if app.history_check() == CheckStatus::Failed {
                return Err(invalid("history check failed".to_string()));
            }
            if app.history_check() == CheckStatus::Pending {
                return Err(ContractError::PendingPrerequisite {
                    application: app.label(),
                    prerequisite: "history",
                });
            }
        }
        Transition::Decline => {}
    }
    Ok(())
}

fn check_organizations(
    app: &VisaApplication,
    transition: Transition,
    caller: &CallerIdentity,
    request: &TransitionRequest,
) -> Result<(), ContractError> {
    let caller_msp = caller.organization_id();
    if request.approving_org != caller_msp {
        return Err(ContractError::Authorization {
            application: app.label(),
            reason: format!(
                "cannot {} as {}: caller belongs to {}, not the authorised organisation",
                transition, request.approving_org, caller_msp
            ),
        });
    }
    if app.owner_msp() != request.previous_org {
        return Err(ContractError::Authorization {
            application: app.label(),
            reason: format!(
                "{} does not currently own the application (owner organisation is {})",
                request.previous_org,
                app.owner_msp()
            ),
        });
    }
    Ok(())
}

/// Apply an already-authorized transition.
fn apply(
    app: &mut VisaApplication,
    transition: Transition,
    caller: &CallerIdentity,
    request: &TransitionRequest,
) {
    match transition {
        Transition::DocumentCheckPass => app.set_docs_check_passed(),
        Transition::DocumentCheckFail => app.set_docs_check_failed(),
        Transition::HistoryCheckPass => app.set_history_check_passed(),
        Transition::HistoryCheckFail => app.set_history_check_failed(),
        Transition::Approve => {
            let principal = caller
                .attribute(DN_ATTRIBUTE)
                .unwrap_or_else(|| caller.principal_id());
            app.set_owner(principal);
            app.set_approved();
        }
        Transition::Decline => app.set_declined(),
    }
    app.set_owner_msp(caller.organization_id());
    app.set_approving_date_time(request.approving_date_time.as_str());
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn new_app() -> VisaApplication {
        VisaApplication::create("VisaWorld", "00001", "2024-05-01", "Org1MSP")
    }

    fn caller(msp: &str) -> CallerIdentity {
        CallerIdentity::new(msp, format!("x509::/CN=user@{}", msp))
    }

    fn request(approving: &str, previous: &str) -> TransitionRequest {
        TransitionRequest::new("VisaWorld", "00001", approving, previous, "2024-05-02")
    }

    /// Authorize and apply, the way the engine does.
    fn step(
        app: &mut VisaApplication,
        transition: Transition,
        msp: &str,
        previous: &str,
    ) -> Result<(), ContractError> {
        let who = caller(msp);
        let req = request(msp, previous);
        authorize(app, transition, &who, &req)?;
        apply(app, transition, &who, &req);
        Ok(())
    }

    #[test]
    fn every_transition_rejected_once_terminal() {
        for terminal in [Transition::Approve, Transition::Decline] {
            let mut app = new_app();
            step(&mut app, Transition::HistoryCheckPass, "Org3MSP", "Org1MSP").unwrap();
            step(&mut app, terminal, "Org1MSP", "Org3MSP").unwrap();
            assert!(app.is_terminal());

            for t in Transition::ALL {
                let err = authorize(&app, t, &caller("Org1MSP"), &request("Org1MSP", "Org1MSP"))
                    .unwrap_err();
                assert!(
                    matches!(err, ContractError::InvalidState { .. }),
                    "{} after {}: {:?}",
                    t,
                    terminal,
                    err
                );
            }
        }
    }

    #[test]
    fn terminal_check_precedes_organization_checks() {
        let mut app = new_app();
        step(&mut app, Transition::Decline, "Org3MSP", "Org1MSP").unwrap();
        // Wrong org on both axes, but the terminal guard fires first.
        let err = authorize(
            &app,
            Transition::Approve,
            &caller("Org9MSP"),
            &request("Org1MSP", "Nobody"),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InvalidState { .. }));
    }

    #[test]
    fn document_check_only_from_new() {
        let mut app = new_app();
        step(&mut app, Transition::DocumentCheckPass, "Org3MSP", "Org1MSP").unwrap();
        for t in [Transition::DocumentCheckPass, Transition::DocumentCheckFail] {
            assert!(matches!(
                step(&mut app.clone(), t, "Org3MSP", "Org3MSP"),
                Err(ContractError::InvalidState { .. })
            ));
        }

        let mut after_history = new_app();
        step(&mut after_history, Transition::HistoryCheckPass, "Org3MSP", "Org1MSP").unwrap();
        assert!(matches!(
            step(&mut after_history, Transition::DocumentCheckPass, "Org3MSP", "Org3MSP"),
            Err(ContractError::InvalidState { .. })
        ));
    }

    #[test]
    fn history_check_allowed_after_either_document_verdict() {
        let mut passed = new_app();
        step(&mut passed, Transition::DocumentCheckPass, "Org3MSP", "Org1MSP").unwrap();
        step(&mut passed, Transition::HistoryCheckPass, "Org3MSP", "Org3MSP").unwrap();
        assert_eq!(passed.current_state(), ApplicationState::HistoryCheckPassed);

        let mut failed = new_app();
        step(&mut failed, Transition::DocumentCheckFail, "Org3MSP", "Org1MSP").unwrap();
        step(&mut failed, Transition::HistoryCheckPass, "Org3MSP", "Org3MSP").unwrap();
        assert_eq!(failed.document_check(), CheckStatus::Failed);
    }

    #[test]
    fn history_check_fail_rejected_after_failed_documents() {
        let mut app = new_app();
        step(&mut app, Transition::DocumentCheckFail, "Org3MSP", "Org1MSP").unwrap();
        assert!(matches!(
            step(&mut app, Transition::HistoryCheckFail, "Org3MSP", "Org3MSP"),
            Err(ContractError::InvalidState { .. })
        ));
    }

    #[test]
    fn history_check_cannot_conclude_twice() {
        let mut app = new_app();
        step(&mut app, Transition::HistoryCheckFail, "Org3MSP", "Org1MSP").unwrap();
        for t in [Transition::HistoryCheckPass, Transition::HistoryCheckFail] {
            assert!(matches!(
                step(&mut app.clone(), t, "Org3MSP", "Org3MSP"),
                Err(ContractError::InvalidState { .. })
            ));
        }
    }

    #[test]
    fn approve_pending_history_is_pending_prerequisite() {
        let mut app = new_app();
        step(&mut app, Transition::DocumentCheckPass, "Org3MSP", "Org1MSP").unwrap();
        assert!(matches!(
            step(&mut app, Transition::Approve, "Org1MSP", "Org3MSP"),
            Err(ContractError::PendingPrerequisite {
                prerequisite: "history",
                ..
            })
        ));
    }

    #[test]
    fn approve_rejected_after_any_failure() {
        let mut docs_failed = new_app();
        step(&mut docs_failed, Transition::DocumentCheckFail, "Org3MSP", "Org1MSP").unwrap();
        step(&mut docs_failed, Transition::HistoryCheckPass, "Org3MSP", "Org3MSP").unwrap();
        assert!(matches!(
            step(&mut docs_failed, Transition::Approve, "Org1MSP", "Org3MSP"),
            Err(ContractError::InvalidState { .. })
        ));

        let mut history_failed = new_app();
        step(&mut history_failed, Transition::HistoryCheckFail, "Org3MSP", "Org1MSP").unwrap();
        assert!(matches!(
            step(&mut history_failed, Transition::Approve, "Org1MSP", "Org3MSP"),
            Err(ContractError::InvalidState { .. })
        ));
    }

    #[test]
    fn declared_org_must_match_caller() {
        let app = new_app();
        let err = authorize(
            &app,
            Transition::DocumentCheckPass,
            &caller("Org4MSP"),
            &request("Org3MSP", "Org1MSP"),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::Authorization { .. }));
    }

    #[test]
    fn previous_org_must_match_recorded_owner() {
        let app = new_app();
        let err = authorize(
            &app,
            Transition::Decline,
            &caller("Org3MSP"),
            &request("Org3MSP", "Org2MSP"),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::Authorization { .. }));
    }

    #[test]
    fn decline_allowed_from_every_non_terminal_state() {
        let paths: [&[Transition]; 5] = [
            &[],
            &[Transition::DocumentCheckPass],
            &[Transition::DocumentCheckFail],
            &[Transition::HistoryCheckPass],
            &[Transition::HistoryCheckFail],
        ];
        for path in paths {
            let mut app = new_app();
            let mut owner = "Org1MSP";
            for t in path {
                step(&mut app, *t, "Org3MSP", owner).unwrap();
                owner = "Org3MSP";
            }
            step(&mut app, Transition::Decline, "Org1MSP", owner).unwrap();
            assert_eq!(app.current_state(), ApplicationState::Declined);
        }
    }

    #[test]
    fn approve_records_dn_attribute_as_owner() {
        let mut app = new_app();
        step(&mut app, Transition::HistoryCheckPass, "Org3MSP", "Org1MSP").unwrap();
        let officer = caller("Org1MSP").with_attribute(DN_ATTRIBUTE, "CN=officer,O=Embassy");
        let req = TransitionRequest::new("VisaWorld", "00001", "Org1MSP", "Org3MSP", "2024-05-03");
        authorize(&app, Transition::Approve, &officer, &req).unwrap();
        apply(&mut app, Transition::Approve, &officer, &req);

        assert_eq!(app.current_state(), ApplicationState::Approved);
        assert_eq!(app.owner(), "CN=officer,O=Embassy");
        assert_eq!(app.owner_msp(), "Org1MSP");
        assert_eq!(app.approving_date_time(), Some("2024-05-03"));
    }

    #[test]
    fn approve_without_dn_falls_back_to_principal_id() {
        let mut app = new_app();
        step(&mut app, Transition::HistoryCheckPass, "Org3MSP", "Org1MSP").unwrap();
        step(&mut app, Transition::Approve, "Org1MSP", "Org3MSP").unwrap();
        assert_eq!(app.owner(), "x509::/CN=user@Org1MSP");
    }

    #[test]
    fn checks_hand_over_owner_org_but_keep_owner_name() {
        let mut app = new_app();
        step(&mut app, Transition::DocumentCheckPass, "Org3MSP", "Org1MSP").unwrap();
        assert_eq!(app.owner_msp(), "Org3MSP");
        assert_eq!(app.owner(), "VisaWorld");
    }

    #[test]
    fn transition_targets() {
        for t in Transition::ALL {
            let expected = matches!(t, Transition::Approve | Transition::Decline);
            assert_eq!(t.target().is_terminal(), expected, "{}", t);
        }
    }
}
