//! Event descriptors and their registry.
//!
//! A signal describes an occurrence from the caller's side: the subject
//! object, the owning account, and how to build the outbound payload for an
//! action. Signal types form a closed set registered at startup; the
//! dispatcher uses the registry to rebuild payload builders from persisted
//! delivery rows.

use std::collections::{BTreeMap, HashMap};

use crate::error::DemuxError;
use crate::models::Occurrence;

/// An event descriptor bound to one subject object and account.
pub trait Signal: Send + Sync {
    /// Event name connections subscribe to (e.g. `"lesson"`).
    fn signal_name(&self) -> &str;

    /// Event-class name identifying this signal type in the registry.
    fn signal_class(&self) -> &str;

    /// Account type this signal's account id belongs to.
    fn account_type(&self) -> &str {
        "account"
    }

    fn account_id(&self) -> i64;

    fn object_id(&self) -> i64;

    /// Context this signal carries by default; merged with caller context at
    /// trigger time.
    fn context(&self) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::new()
    }

    /// Build the event-specific payload fields for an action.
    ///
    /// The dispatcher merges the result with `{"action": ...}` to form the
    /// outbound body.
    fn payload_for(
        &self,
        action: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, DemuxError>;

    /// Assemble an occurrence for an action, merging the caller's context
    /// over the signal's own. Caller keys win on collision.
    fn trigger(
        &self,
        action: &str,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Occurrence {
        let mut merged = self.context();
        merged.extend(context);

        Occurrence {
            account_id: self.account_id(),
            account_type: self.account_type().to_string(),
            action: action.to_string(),
            context: merged,
            object_id: self.object_id(),
            signal_class: self.signal_class().to_string(),
        }
    }
}

type SignalFactory = dyn Fn(&Occurrence) -> Result<Box<dyn Signal>, DemuxError> + Send + Sync;

/// Closed registry of signal types, keyed by event-class name.
///
/// Populated at startup and immutable afterwards. Each factory rebuilds a
/// signal from the identity fields of a persisted occurrence so the payload
/// can be produced at transmit time.
#[derive(Default)]
pub struct SignalRegistry {
    factories: HashMap<String, Box<SignalFactory>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a signal class.
    pub fn register<F>(&mut self, signal_class: impl Into<String>, factory: F)
    where
        F: Fn(&Occurrence) -> Result<Box<dyn Signal>, DemuxError> + Send + Sync + 'static,
    {
        self.factories.insert(signal_class.into(), Box::new(factory));
    }

    /// Is a factory registered for the signal class?
    pub fn contains(&self, signal_class: &str) -> bool {
        self.factories.contains_key(signal_class)
    }

    /// Rebuild a signal for an occurrence.
    pub fn build(&self, occurrence: &Occurrence) -> Result<Box<dyn Signal>, DemuxError> {
        let factory = self
            .factories
            .get(&occurrence.signal_class)
            .ok_or_else(|| DemuxError::UnknownSignalClass(occurrence.signal_class.clone()))?;
        factory(occurrence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct LessonSignal {
        lesson_id: i64,
        account_id: i64,
    }

    impl Signal for LessonSignal {
        fn signal_name(&self) -> &str {
            "lesson"
        }

        fn signal_class(&self) -> &str {
            "lesson"
        }

        fn account_id(&self) -> i64 {
            self.account_id
        }

        fn object_id(&self) -> i64 {
            self.lesson_id
        }

        fn payload_for(
            &self,
            _action: &str,
        ) -> Result<serde_json::Map<String, serde_json::Value>, DemuxError> {
            let mut payload = serde_json::Map::new();
            payload.insert("lesson".to_string(), json!({ "id": self.lesson_id }));
            Ok(payload)
        }
    }

    fn registry() -> SignalRegistry {
        let mut registry = SignalRegistry::new();
        registry.register("lesson", |occ| {
            Ok(Box::new(LessonSignal {
                lesson_id: occ.object_id,
                account_id: occ.account_id,
            }) as Box<dyn Signal>)
        });
        registry
    }

    #[test]
    fn test_trigger_assembles_occurrence() {
        let signal = LessonSignal {
            lesson_id: 42,
            account_id: 1,
        };

        let mut context = BTreeMap::new();
        context.insert("reason".to_string(), json!("manual"));
        let occurrence = signal.trigger("updated", context);

        assert_eq!(occurrence.account_id, 1);
        assert_eq!(occurrence.account_type, "account");
        assert_eq!(occurrence.action, "updated");
        assert_eq!(occurrence.object_id, 42);
        assert_eq!(occurrence.signal_class, "lesson");
        assert_eq!(occurrence.context["reason"], json!("manual"));
    }

    #[test]
    fn test_registry_builds_registered_class() {
        let registry = registry();
        let occurrence = LessonSignal {
            lesson_id: 42,
            account_id: 1,
        }
        .trigger("updated", BTreeMap::new());

        let signal = registry.build(&occurrence).unwrap();
        assert_eq!(signal.signal_name(), "lesson");
        assert_eq!(signal.object_id(), 42);
    }

    #[test]
    fn test_registry_rejects_unknown_class() {
        let registry = registry();
        let mut occurrence = LessonSignal {
            lesson_id: 42,
            account_id: 1,
        }
        .trigger("updated", BTreeMap::new());
        occurrence.signal_class = "course".to_string();

        assert!(matches!(
            registry.build(&occurrence),
            Err(DemuxError::UnknownSignalClass(_))
        ));
    }
}
