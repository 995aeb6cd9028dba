use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The already-authenticated principal invoking a transaction.
///
/// Credential verification happens before this value is constructed; the
/// ledger and the contracts built on it only read the organization
/// identifier, the principal id and the signed attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Membership service provider id of the caller's organization, e.g. `Org1MSP`.
    pub msp_id: String,
    /// Distinguished identity of the principal, e.g. `x509::/CN=isabella`.
    pub id: String,
    /// Attributes carried in the caller's certificate.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl CallerIdentity {
    pub fn new(msp_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            msp_id: msp_id.into(),
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn organization_id(&self) -> &str {
        &self.msp_id
    }

    pub fn principal_id(&self) -> &str {
        &self.id
    }

    /// Value of a signed certificate attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_lookup() {
        let caller = CallerIdentity::new("Org1MSP", "x509::/CN=isabella")
            .with_attribute("DN", "CN=isabella,OU=client");
        assert_eq!(caller.organization_id(), "Org1MSP");
        assert_eq!(caller.principal_id(), "x509::/CN=isabella");
        assert_eq!(caller.attribute("DN"), Some("CN=isabella,OU=client"));
        assert_eq!(caller.attribute("role"), None);
    }
}
