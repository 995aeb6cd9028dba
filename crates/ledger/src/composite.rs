//! Composite key encoding.
//!
//! A composite key is `U+0000 objectType U+0000 (attribute U+0000)*`. The
//! delimiter and `U+10FFFF` (the upper bound used for range scans) are
//! rejected inside components, so two distinct (object type, attributes)
//! pairs can never encode to the same key.

use crate::error::LedgerError;

pub const COMPOSITE_KEY_NAMESPACE: char = '\u{0000}';
const MAX_UNICODE_RUNE: char = '\u{10FFFF}';

/// Build a composite key from an object type and its ordered attributes.
///
/// Passing a prefix of the attributes yields the partial key used by
/// prefix scans.
pub fn create_composite_key(object_type: &str, attributes: &[&str]) -> Result<String, LedgerError> {
    if object_type.is_empty() {
        return Err(LedgerError::InvalidKey {
            reason: "composite key object type must not be empty".to_string(),
        });
    }
    validate_component(object_type)?;

    let mut key = String::with_capacity(
        2 + object_type.len() + attributes.iter().map(|a| a.len() + 1).sum::<usize>(),
    );
    key.push(COMPOSITE_KEY_NAMESPACE);
    key.push_str(object_type);
    key.push(COMPOSITE_KEY_NAMESPACE);
    for attribute in attributes {
        validate_component(attribute)?;
        key.push_str(attribute);
        key.push(COMPOSITE_KEY_NAMESPACE);
    }
    Ok(key)
}

/// Split a composite key back into its object type and attributes.
pub fn split_composite_key(key: &str) -> Result<(String, Vec<String>), LedgerError> {
    let body = key
        .strip_prefix(COMPOSITE_KEY_NAMESPACE)
        .and_then(|rest| rest.strip_suffix(COMPOSITE_KEY_NAMESPACE))
        .ok_or_else(|| LedgerError::InvalidKey {
            reason: format!("{:?} is not a composite key", key),
        })?;

    let mut parts = body.split(COMPOSITE_KEY_NAMESPACE);
    let object_type = parts.next().unwrap_or_default().to_string();
    if object_type.is_empty() {
        return Err(LedgerError::InvalidKey {
            reason: format!("{:?} has an empty object type", key),
        });
    }
    Ok((object_type, parts.map(str::to_string).collect()))
}

fn validate_component(component: &str) -> Result<(), LedgerError> {
    if let Some(bad) = component
        .chars()
        .find(|c| *c == COMPOSITE_KEY_NAMESPACE || *c == MAX_UNICODE_RUNE)
    {
        return Err(LedgerError::InvalidKey {
            reason: format!(
                "composite key component {:?} contains reserved character U+{:04X}",
                component, bad as u32
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_nul_delimiters() {
        let key = create_composite_key("org.visanet.visaapp", &["VisaWorld", "00001"]).unwrap();
        assert_eq!(key, "\u{0}org.visanet.visaapp\u{0}VisaWorld\u{0}00001\u{0}");
    }

    #[test]
    fn split_inverts_create() {
        let key = create_composite_key("org.visanet.visaapp", &["VisaWorld", "00001"]).unwrap();
        let (object_type, parts) = split_composite_key(&key).unwrap();
        assert_eq!(object_type, "org.visanet.visaapp");
        assert_eq!(parts, vec!["VisaWorld".to_string(), "00001".to_string()]);
    }

    #[test]
    fn split_keeps_empty_attributes() {
        let key = create_composite_key("t", &["", "x"]).unwrap();
        let (_, parts) = split_composite_key(&key).unwrap();
        assert_eq!(parts, vec![String::new(), "x".to_string()]);
    }

    #[test]
    fn partial_key_is_prefix_of_full_key() {
        let full = create_composite_key("t", &["VisaWorld", "00001"]).unwrap();
        let partial = create_composite_key("t", &["VisaWorld"]).unwrap();
        assert!(full.starts_with(&partial));
        // "VisaWorld2" must not fall under the "VisaWorld" prefix.
        let other = create_composite_key("t", &["VisaWorld2", "00001"]).unwrap();
        assert!(!other.starts_with(&partial));
    }

    #[test]
    fn distinct_part_splits_do_not_collide() {
        let a = create_composite_key("t", &["ab", "c"]).unwrap();
        let b = create_composite_key("t", &["a", "bc"]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_reserved_characters() {
        assert!(matches!(
            create_composite_key("t", &["a\u{0}b"]),
            Err(LedgerError::InvalidKey { .. })
        ));
        assert!(matches!(
            create_composite_key("t", &["\u{10FFFF}"]),
            Err(LedgerError::InvalidKey { .. })
        ));
        assert!(matches!(
            create_composite_key("", &["a"]),
            Err(LedgerError::InvalidKey { .. })
        ));
    }

    #[test]
    fn split_rejects_simple_keys() {
        assert!(split_composite_key("plain-key").is_err());
    }
}
