//! The visa application entity.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::store::State;

/// Namespace of visa application records.
pub const VISA_APPLICATION_CLASS: &str = "org.visanet.visaapp";

/// Lifecycle state of a visa application.
///
/// Stored on the ledger as its numeric code, which is what rich queries
/// select on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationState {
    New,
    DocsCheckPassed,
    DocsCheckFailed,
    HistoryCheckPassed,
    HistoryCheckFailed,
    Approved,
    Declined,
}

impl ApplicationState {
    pub const ALL: [ApplicationState; 7] = [
        ApplicationState::New,
        ApplicationState::DocsCheckPassed,
        ApplicationState::DocsCheckFailed,
        ApplicationState::HistoryCheckPassed,
        ApplicationState::HistoryCheckFailed,
        ApplicationState::Approved,
        ApplicationState::Declined,
    ];

    pub fn code(self) -> u8 {
        match self {
            ApplicationState::New => 1,
            ApplicationState::DocsCheckPassed => 2,
            ApplicationState::DocsCheckFailed => 3,
            ApplicationState::HistoryCheckPassed => 4,
            ApplicationState::HistoryCheckFailed => 5,
            ApplicationState::Approved => 6,
            ApplicationState::Declined => 7,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| u64::from(s.code()) == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            ApplicationState::New => "NEW",
            ApplicationState::DocsCheckPassed => "DOCS_CHK_PASS",
            ApplicationState::DocsCheckFailed => "DOCS_CHK_FAIL",
            ApplicationState::HistoryCheckPassed => "HISTORY_CHK_PASS",
            ApplicationState::HistoryCheckFailed => "HISTORY_CHK_FAIL",
            ApplicationState::Approved => "APPROVED",
            ApplicationState::Declined => "DECLINED",
        }
    }

    /// Label for a raw stored code; `UNKNOWN` for codes outside the enum.
    pub fn label_for_code(code: u64) -> &'static str {
        Self::from_code(code).map_or("UNKNOWN", Self::label)
    }

    /// APPROVED and DECLINED are absorbing.
    pub fn is_terminal(self) -> bool {
        matches!(self, ApplicationState::Approved | ApplicationState::Declined)
    }
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ApplicationState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ApplicationState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u64::deserialize(deserializer)?;
        ApplicationState::from_code(code).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown application state code {}", code))
        })
    }
}

/// Verdict of one verification sub-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    #[default]
    Pending,
    Passed,
    Failed,
}

impl CheckStatus {
    pub fn is_concluded(self) -> bool {
        self != CheckStatus::Pending
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Pending => "PENDING",
            CheckStatus::Passed => "PASSED",
            CheckStatus::Failed => "FAILED",
        })
    }
}

/// A visa application as recorded on the ledger.
///
/// Keyed by `(submitter, applicationNumber)`. `ownerMSP` is the organization
/// that performed the last accepted transition and anchors authorization of
/// the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisaApplication {
    submitter: String,
    application_number: String,
    submission_date_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    approving_date_time: Option<String>,
    owner: String,
    #[serde(rename = "ownerMSP", alias = "mspid")]
    owner_msp: String,
    current_state: ApplicationState,
    #[serde(default)]
    document_check: CheckStatus,
    #[serde(default)]
    history_check: CheckStatus,
}

impl VisaApplication {
    /// A freshly submitted application in state NEW, owned by its submitter.
    pub fn create(
        submitter: impl Into<String>,
        application_number: impl Into<String>,
        submission_date_time: impl Into<String>,
        submitting_msp: impl Into<String>,
    ) -> Self {
        let submitter = submitter.into();
        Self {
            owner: submitter.clone(),
            submitter,
            application_number: application_number.into(),
            submission_date_time: submission_date_time.into(),
            approving_date_time: None,
            owner_msp: submitting_msp.into(),
            current_state: ApplicationState::New,
            document_check: CheckStatus::Pending,
            history_check: CheckStatus::Pending,
        }
    }

    pub fn submitter(&self) -> &str {
        &self.submitter
    }

    pub fn application_number(&self) -> &str {
        &self.application_number
    }

    pub fn submission_date_time(&self) -> &str {
        &self.submission_date_time
    }

    pub fn approving_date_time(&self) -> Option<&str> {
        self.approving_date_time.as_deref()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn owner_msp(&self) -> &str {
        &self.owner_msp
    }

    pub fn current_state(&self) -> ApplicationState {
        self.current_state
    }

    pub fn document_check(&self) -> CheckStatus {
        self.document_check
    }

    pub fn history_check(&self) -> CheckStatus {
        self.history_check
    }

    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    /// `submitter:applicationNumber`, used in messages and logs.
    pub fn label(&self) -> String {
        format!("{}:{}", self.submitter, self.application_number)
    }

    pub(crate) fn set_owner(&mut self, owner: impl Into<String>) {
        self.owner = owner.into();
    }

    pub(crate) fn set_owner_msp(&mut self, msp_id: impl Into<String>) {
        self.owner_msp = msp_id.into();
    }

    pub(crate) fn set_approving_date_time(&mut self, at: impl Into<String>) {
        self.approving_date_time = Some(at.into());
    }

    pub(crate) fn set_docs_check_passed(&mut self) {
        self.document_check = CheckStatus::Passed;
        self.current_state = ApplicationState::DocsCheckPassed;
    }

    pub(crate) fn set_docs_check_failed(&mut self) {
        self.document_check = CheckStatus::Failed;
        self.current_state = ApplicationState::DocsCheckFailed;
    }

    pub(crate) fn set_history_check_passed(&mut self) {
        self.history_check = CheckStatus::Passed;
        self.current_state = ApplicationState::HistoryCheckPassed;
    }

    pub(crate) fn set_history_check_failed(&mut self) {
        self.history_check = CheckStatus::Failed;
        self.current_state = ApplicationState::HistoryCheckFailed;
    }

    pub(crate) fn set_approved(&mut self) {
        self.current_state = ApplicationState::Approved;
    }

    pub(crate) fn set_declined(&mut self) {
        self.current_state = ApplicationState::Declined;
    }
}

impl State for VisaApplication {
    const CLASS: &'static str = VISA_APPLICATION_CLASS;

    fn key_parts(&self) -> Vec<String> {
        vec![self.submitter.clone(), self.application_number.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{deserialize, serialize};
    use serde_json::json;

    fn sample() -> VisaApplication {
        VisaApplication::create("VisaWorld", "00001", "2024-05-01", "Org2MSP")
    }

    #[test]
    fn create_starts_new_and_owned_by_submitter() {
        let app = sample();
        assert_eq!(app.current_state(), ApplicationState::New);
        assert_eq!(app.owner(), "VisaWorld");
        assert_eq!(app.owner_msp(), "Org2MSP");
        assert_eq!(app.document_check(), CheckStatus::Pending);
        assert_eq!(app.history_check(), CheckStatus::Pending);
        assert_eq!(app.approving_date_time(), None);
        assert_eq!(app.label(), "VisaWorld:00001");
        assert_eq!(
            app.key_parts(),
            vec!["VisaWorld".to_string(), "00001".to_string()]
        );
    }

    #[test]
    fn wire_format_uses_camel_case_and_state_codes() {
        let mut app = sample();
        app.set_docs_check_passed();
        let value = serde_json::to_value(&app).unwrap();
        assert_eq!(
            value,
            json!({
                "submitter": "VisaWorld",
                "applicationNumber": "00001",
                "submissionDateTime": "2024-05-01",
                "owner": "VisaWorld",
                "ownerMSP": "Org2MSP",
                "currentState": 2,
                "documentCheck": "PASSED",
                "historyCheck": "PENDING"
            })
        );
    }

    #[test]
    fn every_attribute_survives_serialize_deserialize() {
        let mut app = sample();
        app.set_history_check_passed();
        app.set_owner("CN=embassy-officer");
        app.set_owner_msp("Org1MSP");
        app.set_approving_date_time("2024-05-03T10:00:00Z");
        app.set_approved();

        let bytes = serialize(&app).unwrap();
        let back: VisaApplication = deserialize(&bytes).unwrap();
        assert_eq!(back, app);
    }

    #[test]
    fn reads_legacy_records_without_sub_check_fields() {
        let legacy = br#"{"submitter":"VisaWorld","applicationNumber":"00001",
            "submissionDateTime":"2024-05-01","owner":"VisaWorld","mspid":"Org2MSP",
            "currentState":1}"#;
        let app: VisaApplication = deserialize(legacy).unwrap();
        assert_eq!(app.owner_msp(), "Org2MSP");
        assert_eq!(app.document_check(), CheckStatus::Pending);
        assert_eq!(app.history_check(), CheckStatus::Pending);
    }

    #[test]
    fn unknown_state_code_fails_to_decode() {
        let bad = br#"{"submitter":"V","applicationNumber":"1","submissionDateTime":"d",
            "owner":"V","ownerMSP":"M","currentState":9}"#;
        assert!(deserialize::<VisaApplication>(bad).is_err());
    }

    #[test]
    fn state_codes_and_labels() {
        for state in ApplicationState::ALL {
            assert_eq!(
                ApplicationState::from_code(u64::from(state.code())),
                Some(state)
            );
        }
        assert_eq!(ApplicationState::label_for_code(6), "APPROVED");
        assert_eq!(ApplicationState::label_for_code(0), "UNKNOWN");
        assert_eq!(ApplicationState::label_for_code(42), "UNKNOWN");
        assert!(ApplicationState::Approved.is_terminal());
        assert!(ApplicationState::Declined.is_terminal());
        assert!(!ApplicationState::HistoryCheckPassed.is_terminal());
    }
}
