//! Method Dispatch Bridge.
//!
//! Public methods come in two classes:
//! - blocking: called on the live guest handle, result returned to the caller
//! - non-blocking: sent as a one-way message addressed by guest instance id
//!
//! Non-blocking calls made before the guest id is known wait in a per-instance
//! outbox and are flushed, in order, ahead of any later call.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;

use guestview_core::{ConfigError, EngineError, GuestInstanceId, MethodConfig};

use crate::service::{GuestHandle, GuestMessageSink};
use crate::transport::GuestMessage;

/// How a method is forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    Blocking,
    NonBlocking,
}

/// Result of invoking a public method.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodOutcome {
    /// Blocking call returned.
    Returned(Value),
    /// Non-blocking call handed to the transport.
    Sent,
    /// Non-blocking call waiting for a guest.
    Queued,
}

/// Method name → class.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    classes: HashMap<String, MethodClass>,
}

impl MethodTable {
    /// Build the table from configuration. Names must be unique across both lists.
    pub fn from_config(config: &MethodConfig) -> Result<Self, ConfigError> {
        let mut classes = HashMap::new();
        let entries = config
            .blocking
            .iter()
            .map(|m| (m, MethodClass::Blocking))
            .chain(config.non_blocking.iter().map(|m| (m, MethodClass::NonBlocking)));

        for (name, class) in entries {
            if classes.insert(name.clone(), class).is_some() {
                return Err(ConfigError::InvalidMethodTable(format!(
                    "'{}' is listed more than once",
                    name
                )));
            }
        }
        Ok(Self { classes })
    }

    pub fn classify(&self, method: &str) -> Option<MethodClass> {
        self.classes.get(method).copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Forward a blocking call to the guest.
///
/// Fails fast when there is no guest or no resolved handle.
pub fn call_blocking(
    guest: Option<GuestInstanceId>,
    handle: Option<&Arc<dyn GuestHandle>>,
    method: &str,
    args: &[Value],
) -> Result<Value, EngineError> {
    let precondition = |reason: &str| EngineError::PreconditionViolation {
        method: method.to_string(),
        reason: reason.to_string(),
    };

    let guest = guest.ok_or_else(|| precondition("no guest instance"))?;
    let handle = handle.ok_or_else(|| precondition("guest handle not resolved"))?;

    tracing::debug!(%guest, method, "Blocking guest call");
    handle.call(method, args).map_err(|message| EngineError::GuestCall {
        method: method.to_string(),
        message,
    })
}

/// A non-blocking call waiting for a guest id.
#[derive(Debug, Clone, PartialEq)]
struct PendingCall {
    method: String,
    args: Vec<Value>,
}

/// Per-instance FIFO of non-blocking calls.
#[derive(Debug, Default)]
pub struct AsyncOutbox {
    pending: VecDeque<PendingCall>,
}

impl AsyncOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send now if the guest is known, otherwise queue.
    pub fn send_or_queue(
        &mut self,
        guest: Option<GuestInstanceId>,
        sink: &dyn GuestMessageSink,
        method: &str,
        args: Vec<Value>,
    ) -> Result<MethodOutcome, EngineError> {
        let call = PendingCall {
            method: method.to_string(),
            args,
        };
        match guest {
            Some(guest) => {
                self.flush(guest, sink)?;
                send(sink, guest, call)?;
                Ok(MethodOutcome::Sent)
            }
            None => {
                tracing::debug!(
                    method,
                    queued = self.pending.len() + 1,
                    "Queued async call until guest exists"
                );
                self.pending.push_back(call);
                Ok(MethodOutcome::Queued)
            }
        }
    }

    /// Like [`send_or_queue`](Self::send_or_queue), but a queued call to the
    /// same method is replaced, so at most one is ever pending.
    pub fn send_or_replace(
        &mut self,
        guest: Option<GuestInstanceId>,
        sink: &dyn GuestMessageSink,
        method: &str,
        args: Vec<Value>,
    ) -> Result<MethodOutcome, EngineError> {
        if guest.is_none() {
            self.pending.retain(|call| call.method != method);
        }
        self.send_or_queue(guest, sink, method, args)
    }

    /// Send every queued call to `guest`, oldest first.
    ///
    /// On a transport error the failed call stays at the front of the queue.
    pub fn flush(
        &mut self,
        guest: GuestInstanceId,
        sink: &dyn GuestMessageSink,
    ) -> Result<usize, EngineError> {
        let mut sent = 0;
        while let Some(call) = self.pending.pop_front() {
            if let Err(e) = send(sink, guest, call.clone()) {
                self.pending.push_front(call);
                return Err(e);
            }
            sent += 1;
        }
        if sent > 0 {
            tracing::debug!(%guest, sent, "Flushed queued async calls");
        }
        Ok(sent)
    }

    /// Drop all queued calls, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn send(
    sink: &dyn GuestMessageSink,
    guest: GuestInstanceId,
    call: PendingCall,
) -> Result<(), EngineError> {
    sink.send(GuestMessage {
        guest_instance_id: guest,
        method: call.method,
        args: call.args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{MockGuestHandle, MockGuestMessageSink};
    use crate::test_support::RecordingSink;
    use serde_json::json;

    fn table() -> MethodTable {
        MethodTable::from_config(&MethodConfig::default()).unwrap()
    }

    #[test]
    fn test_classify_default_table() {
        let table = table();
        assert_eq!(table.classify("goBack"), Some(MethodClass::Blocking));
        assert_eq!(table.classify("executeJavaScript"), Some(MethodClass::NonBlocking));
        assert_eq!(table.classify("launchMissiles"), None);
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let config = MethodConfig {
            blocking: vec!["send".to_string()],
            non_blocking: vec!["send".to_string()],
        };
        assert!(MethodTable::from_config(&config).is_err());
    }

    #[test]
    fn test_blocking_without_guest_fails_fast() {
        let mut handle = MockGuestHandle::new();
        handle.expect_call().never();
        let handle: Arc<dyn GuestHandle> = Arc::new(handle);

        let err = call_blocking(None, Some(&handle), "reload", &[]).unwrap_err();
        assert!(matches!(err, EngineError::PreconditionViolation { ref method, .. } if method == "reload"));
    }

    #[test]
    fn test_blocking_returns_guest_result() {
        let mut handle = MockGuestHandle::new();
        handle
            .expect_call()
            .withf(|method, args| method == "canGoToOffset" && args.len() == 1 && args[0] == json!(-1))
            .times(1)
            .returning(|_, _| Ok(json!(true)));
        let handle: Arc<dyn GuestHandle> = Arc::new(handle);

        let value = call_blocking(
            Some(GuestInstanceId::new(1)),
            Some(&handle),
            "canGoToOffset",
            &[json!(-1)],
        )
        .unwrap();
        assert_eq!(value, json!(true));
    }

    #[test]
    fn test_blocking_guest_error() {
        let mut handle = MockGuestHandle::new();
        handle
            .expect_call()
            .returning(|_, _| Err("renderer gone".to_string()));
        let handle: Arc<dyn GuestHandle> = Arc::new(handle);

        let err = call_blocking(Some(GuestInstanceId::new(1)), Some(&handle), "stop", &[]).unwrap_err();
        assert!(matches!(err, EngineError::GuestCall { ref message, .. } if message == "renderer gone"));
    }

    #[test]
    fn test_outbox_fifo() {
        let sink = RecordingSink::new();
        let mut outbox = AsyncOutbox::new();
        let guest = GuestInstanceId::new(3);

        assert_eq!(
            outbox.send_or_queue(None, &sink, "A", vec![]).unwrap(),
            MethodOutcome::Queued
        );
        outbox.send_or_queue(None, &sink, "B", vec![]).unwrap();
        assert!(sink.methods().is_empty());

        assert_eq!(
            outbox.send_or_queue(Some(guest), &sink, "C", vec![]).unwrap(),
            MethodOutcome::Sent
        );
        assert_eq!(sink.methods(), vec!["A", "B", "C"]);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_outbox_replace_keeps_latest_only() {
        let sink = RecordingSink::new();
        let mut outbox = AsyncOutbox::new();

        outbox.send_or_queue(None, &sink, "A", vec![]).unwrap();
        for level in 0..100 {
            outbox
                .send_or_replace(None, &sink, "Z", vec![json!(level)])
                .unwrap();
        }
        assert_eq!(outbox.len(), 2);

        outbox.flush(GuestInstanceId::new(1), &sink).unwrap();
        assert_eq!(sink.methods(), vec!["A", "Z"]);
        assert_eq!(sink.messages()[1].args, vec![json!(99)]);
    }

    #[test]
    fn test_outbox_keeps_call_on_transport_error() {
        let mut sink = MockGuestMessageSink::new();
        sink.expect_send()
            .returning(|_| Err(EngineError::Channel("closed".to_string())));

        let mut outbox = AsyncOutbox::new();
        outbox.send_or_queue(None, &sink, "A", vec![]).unwrap();
        assert!(outbox.flush(GuestInstanceId::new(1), &sink).is_err());
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox.clear(), 1);
    }
}
