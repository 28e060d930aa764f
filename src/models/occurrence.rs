//! The canonical identity of one thing-that-happened.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DemuxError;

/// Attributes that identify a signal occurrence.
///
/// Field order is fixed and the context map is ordered, so serialization is
/// canonical: two occurrences with identical field values produce identical
/// fingerprints regardless of how their context maps were populated.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub account_id: i64,
    pub account_type: String,
    pub action: String,
    pub context: BTreeMap<String, serde_json::Value>,
    pub object_id: i64,
    pub signal_class: String,
}

impl Occurrence {
    /// Compute the deterministic content hash identifying this occurrence.
    ///
    /// Serializes the canonical field order to JSON and hashes it with
    /// SHA-256, returning the hex digest. Nested objects in context values
    /// serialize with sorted keys (serde_json's default map is key-ordered),
    /// so the encoding is stable end to end.
    ///
    /// This is the basis for delivery deduplication.
    pub fn fingerprint(&self) -> Result<String, DemuxError> {
        let encoded = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&encoded)))
    }

    /// Reject occurrences missing required identity fields.
    ///
    /// Runs before any delivery is enqueued; a malformed occurrence never
    /// produces a delivery row.
    pub fn validate(&self) -> Result<(), DemuxError> {
        if self.action.is_empty() {
            return Err(DemuxError::InvalidOccurrence("action is required".into()));
        }
        if self.account_type.is_empty() {
            return Err(DemuxError::InvalidOccurrence(
                "account_type is required".into(),
            ));
        }
        if self.signal_class.is_empty() {
            return Err(DemuxError::InvalidOccurrence(
                "signal_class is required".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn occurrence() -> Occurrence {
        Occurrence {
            account_id: 1,
            account_type: "account".to_string(),
            action: "updated".to_string(),
            context: BTreeMap::new(),
            object_id: 42,
            signal_class: "lesson".to_string(),
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let occ = occurrence();
        assert_eq!(occ.fingerprint().unwrap(), occ.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = occurrence().fingerprint().unwrap();
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_ignores_context_insertion_order() {
        let mut a = occurrence();
        a.context.insert("alpha".into(), json!(1));
        a.context.insert("beta".into(), json!(2));

        let mut b = occurrence();
        b.context.insert("beta".into(), json!(2));
        b.context.insert("alpha".into(), json!(1));

        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_changes_with_each_field() {
        let base = occurrence();
        let base_fp = base.fingerprint().unwrap();

        let mut changed = base.clone();
        changed.action = "destroyed".into();
        assert_ne!(changed.fingerprint().unwrap(), base_fp);

        let mut changed = base.clone();
        changed.object_id = 43;
        assert_ne!(changed.fingerprint().unwrap(), base_fp);

        let mut changed = base.clone();
        changed.account_id = 2;
        assert_ne!(changed.fingerprint().unwrap(), base_fp);

        let mut changed = base.clone();
        changed.account_type = "user".into();
        assert_ne!(changed.fingerprint().unwrap(), base_fp);

        let mut changed = base.clone();
        changed.signal_class = "course".into();
        assert_ne!(changed.fingerprint().unwrap(), base_fp);

        let mut changed = base.clone();
        changed.context.insert("note".into(), json!("x"));
        assert_ne!(changed.fingerprint().unwrap(), base_fp);
    }

    #[test]
    fn test_validate_accepts_complete_occurrence() {
        assert!(occurrence().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let mut occ = occurrence();
        occ.action = String::new();
        assert!(matches!(
            occ.validate(),
            Err(DemuxError::InvalidOccurrence(_))
        ));

        let mut occ = occurrence();
        occ.account_type = String::new();
        assert!(occ.validate().is_err());

        let mut occ = occurrence();
        occ.signal_class = String::new();
        assert!(occ.validate().is_err());
    }
}
