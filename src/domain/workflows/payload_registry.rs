use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A unit of deferred work.
#[async_trait]
pub trait Payload: Send + Sync {
    /// Run the work. Any error is recorded on the job and retried later.
    async fn perform(&self) -> Result<(), PayloadError>;

    /// Human readable name used in logs. Defaults to the registered kind.
    fn display_name(&self) -> Option<String> {
        None
    }
}

/// A payload type that can be stored in a job's `handler` field.
///
/// `KIND` is the tag written into the serialized envelope and looked up in the
/// [`PayloadRegistry`] when the job is loaded again.
pub trait JobPayload: Payload + Serialize + DeserializeOwned + 'static {
    const KIND: &'static str;
}

/// Failure raised by a payload's own work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PayloadError {
    pub message: String,
    pub trace: Vec<String>,
}

impl PayloadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: Vec::new(),
        }
    }

    /// Append a context frame, innermost first.
    pub fn with_context(mut self, frame: impl Into<String>) -> Self {
        self.trace.push(frame.into());
        self
    }
}

impl From<String> for PayloadError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for PayloadError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeserializationError {
    #[error("job failed to load: malformed handler: {0}")]
    Malformed(String),

    #[error("job failed to load: unknown handler kind `{0}`")]
    UnknownKind(String),

    #[error("job failed to load: invalid `{kind}` data: {reason}")]
    InvalidData { kind: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("payload kind `{0}` is not registered")]
    UnregisteredKind(&'static str),

    #[error("payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    kind: String,
    data: serde_json::Value,
}

type Decoder =
    Arc<dyn Fn(serde_json::Value) -> Result<Arc<dyn Payload>, serde_json::Error> + Send + Sync>;

/// Maps payload kinds to typed decoders.
///
/// Populated once at startup and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct PayloadRegistry {
    decoders: HashMap<String, Decoder>,
}

impl PayloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: JobPayload>(&mut self) -> &mut Self {
        let decoder: Decoder = Arc::new(|data| {
            let payload: T = serde_json::from_value(data)?;
            Ok(Arc::new(payload) as Arc<dyn Payload>)
        });
        self.decoders.insert(T::KIND.to_string(), decoder);
        self
    }

    pub fn with<T: JobPayload>(mut self) -> Self {
        self.register::<T>();
        self
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.decoders.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Encode a payload into the text stored in a job's `handler` field.
    pub fn serialize<T: JobPayload>(&self, payload: &T) -> Result<String, SerializationError> {
        if !self.is_registered(T::KIND) {
            return Err(SerializationError::UnregisteredKind(T::KIND));
        }

        let envelope = Envelope {
            kind: T::KIND.to_string(),
            data: serde_json::to_value(payload)?,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Rebuild a payload from a `handler` value.
    pub fn deserialize(&self, handler: &str) -> Result<Arc<dyn Payload>, DeserializationError> {
        let envelope: Envelope = serde_json::from_str(handler)
            .map_err(|e| DeserializationError::Malformed(e.to_string()))?;

        let decoder = self
            .decoders
            .get(&envelope.kind)
            .ok_or_else(|| DeserializationError::UnknownKind(envelope.kind.clone()))?;

        decoder(envelope.data).map_err(|e| DeserializationError::InvalidData {
            kind: envelope.kind,
            reason: e.to_string(),
        })
    }

    /// The kind tag of a `handler` value, without decoding its data.
    pub fn kind_of(handler: &str) -> Option<String> {
        serde_json::from_str::<Envelope>(handler)
            .ok()
            .map(|envelope| envelope.kind)
    }
}

impl fmt::Debug for PayloadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static GREETINGS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, Serialize, Deserialize)]
    struct Greet {
        name: String,
    }

    #[async_trait]
    impl Payload for Greet {
        async fn perform(&self) -> Result<(), PayloadError> {
            GREETINGS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn display_name(&self) -> Option<String> {
            Some(format!("Greet({})", self.name))
        }
    }

    impl JobPayload for Greet {
        const KIND: &'static str = "greet";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Unregistered;

    #[async_trait]
    impl Payload for Unregistered {
        async fn perform(&self) -> Result<(), PayloadError> {
            Ok(())
        }
    }

    impl JobPayload for Unregistered {
        const KIND: &'static str = "unregistered";
    }

    #[tokio::test]
    async fn given_registered_payload_when_round_tripped_should_perform_same_work() {
        let registry = PayloadRegistry::new().with::<Greet>();
        let handler = registry
            .serialize(&Greet {
                name: "ada".to_string(),
            })
            .unwrap();

        let payload = registry.deserialize(&handler).unwrap();
        let before = GREETINGS.load(Ordering::SeqCst);
        payload.perform().await.unwrap();

        assert_eq!(GREETINGS.load(Ordering::SeqCst), before + 1);
        assert_eq!(payload.display_name().as_deref(), Some("Greet(ada)"));
    }

    #[test]
    fn given_unregistered_kind_when_serialize_should_refuse() {
        let registry = PayloadRegistry::new().with::<Greet>();
        let result = registry.serialize(&Unregistered);
        assert!(matches!(
            result,
            Err(SerializationError::UnregisteredKind("unregistered"))
        ));
    }

    #[test]
    fn given_unknown_kind_when_deserialize_should_return_unknown_kind() {
        let registry = PayloadRegistry::new();
        let result = registry.deserialize(r#"{"kind":"greet","data":{"name":"x"}}"#);
        assert_eq!(
            result.err(),
            Some(DeserializationError::UnknownKind("greet".to_string()))
        );
    }

    #[test]
    fn given_garbage_handler_when_deserialize_should_return_malformed() {
        let registry = PayloadRegistry::new().with::<Greet>();
        let result = registry.deserialize("--- !yaml/object:Greet");
        assert!(matches!(result, Err(DeserializationError::Malformed(_))));
    }

    #[test]
    fn given_wrong_shape_when_deserialize_should_return_invalid_data() {
        let registry = PayloadRegistry::new().with::<Greet>();
        let result = registry.deserialize(r#"{"kind":"greet","data":{"nom":1}}"#);
        assert!(matches!(
            result,
            Err(DeserializationError::InvalidData { ref kind, .. }) if kind == "greet"
        ));
    }

    #[test]
    fn given_handler_when_kind_of_should_read_tag_only() {
        assert_eq!(
            PayloadRegistry::kind_of(r#"{"kind":"greet","data":null}"#).as_deref(),
            Some("greet")
        );
        assert_eq!(PayloadRegistry::kind_of("nope"), None);
    }

    #[test]
    fn given_payload_error_when_context_added_should_keep_order() {
        let err = PayloadError::new("boom").with_context("inner").with_context("outer");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.trace, vec!["inner".to_string(), "outer".to_string()]);
    }
}
