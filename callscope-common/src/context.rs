//! Execution-context records.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ApplicationId, ContextId, Timestamp};
use crate::value::{Payload, Value};

/// Attempted to write into a context that has already been closed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("context {id} ('{name}') is closed and can no longer be modified")]
pub struct ContextClosed {
    pub id: ContextId,
    pub name: String,
}

/// One node in the execution-context tree.
///
/// Identity (id, parent, application, name, tag, start time) is fixed at
/// creation. The payload stays writable until [`Context::close`] sets the end
/// time; from then on the record is read-only.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Context {
    id: ContextId,
    parent_id: Option<ContextId>,
    application_id: ApplicationId,
    name: String,
    tag: String,
    payload: Payload,
    start_time: Timestamp,
    end_time: Option<Timestamp>,
}

impl Context {
    /// Open a new context starting now.
    #[must_use]
    pub fn open(
        name: impl Into<String>,
        tag: impl Into<String>,
        parent_id: Option<ContextId>,
        application_id: ApplicationId,
    ) -> Self {
        Self {
            id: ContextId::generate(),
            parent_id,
            application_id,
            name: name.into(),
            tag: tag.into(),
            payload: Payload::new(),
            start_time: Timestamp::now(),
            end_time: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<ContextId> {
        self.parent_id
    }

    #[must_use]
    pub fn application_id(&self) -> &ApplicationId {
        &self.application_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    #[must_use]
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    #[must_use]
    pub fn end_time(&self) -> Option<Timestamp> {
        self.end_time
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Write one payload entry, replacing any previous value for `key`.
    ///
    /// # Errors
    /// Returns [`ContextClosed`] once the context has been closed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), ContextClosed> {
        self.ensure_open()?;
        self.payload.insert(key.into(), value.into());
        Ok(())
    }

    /// Write every entry of `entries` into the payload.
    ///
    /// # Errors
    /// Returns [`ContextClosed`] once the context has been closed; nothing is
    /// written in that case.
    pub fn extend<I>(&mut self, entries: I) -> Result<(), ContextClosed>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.ensure_open()?;
        self.payload.extend(entries);
        Ok(())
    }

    /// Set the end time. Returns false if the context was already closed, in
    /// which case the original end time is kept.
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.end_time = Some(Timestamp::now());
        true
    }

    fn ensure_open(&self) -> Result<(), ContextClosed> {
        if self.is_closed() {
            Err(ContextClosed { id: self.id, name: self.name.clone() })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> ApplicationId {
        ApplicationId::generate("test")
    }

    #[test]
    fn test_open_context_accepts_writes() {
        let mut ctx = Context::open("checkout", "http", None, app());
        ctx.set("user", "alice").unwrap();
        assert_eq!(ctx.get("user").and_then(Value::as_str), Some("alice"));
        assert!(!ctx.is_closed());
        assert!(ctx.end_time().is_none());
    }

    #[test]
    fn test_closed_context_is_read_only() {
        let mut ctx = Context::open("checkout", "http", None, app());
        assert!(ctx.close());
        let first_end = ctx.end_time();

        let err = ctx.set("late", 1i64).unwrap_err();
        assert_eq!(err.id, ctx.id());
        assert!(err.to_string().contains("checkout"));
        assert!(ctx.payload().is_empty());

        // Closing twice keeps the first end time
        assert!(!ctx.close());
        assert_eq!(ctx.end_time(), first_end);
    }

    #[test]
    fn test_end_not_before_start() {
        let mut ctx = Context::open("a", "t", None, app());
        ctx.close();
        assert!(ctx.end_time().unwrap() >= ctx.start_time());
    }
}
