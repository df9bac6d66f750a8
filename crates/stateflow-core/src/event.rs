use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved event-name prefix that marks a platform-generated error.
///
/// Any incoming event whose name starts with this token is escalated to
/// the error-listener set if the current state has no explicit handler
/// for it.
pub const PLATFORM_ERROR_TOKEN: &str = "error.platform";

/// The name used for the action-execution forwarding event sent to a
/// parent actor when a guarded action panics.
pub const ACTION_ERROR_EVENT: &str = "stateflow.error";

/// The event that is sent to an interpreter by itself as the very first
/// thing processed by `start()`.
pub const INIT_EVENT: &str = "stateflow.init";

/// A normalized event, as it flows through the interpreter.
///
/// Events arrive at the boundary in one of a few shapes (a bare
/// type-string, a record with a `kind` field, or an already-normalized
/// snapshot) and are normalized into this type at every entry point, the
/// same way the source's `toSCXMLEvent` does.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// The event name, e.g. `"TICK"` or `"done.invoke.child"`.
    pub name: String,
    /// Event payload. Defaults to `Value::Null` for bare type-strings.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    /// The actor id that originated this event, if it was forwarded or
    /// produced by a child actor rather than an external caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Event {
    /// Construct a bare event with no payload and no origin.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Value::Null,
            origin: None,
        }
    }

    /// Construct an event carrying a JSON payload.
    pub fn with_data(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            origin: None,
        }
    }

    /// Tag this event with the id of the actor that produced it.
    pub fn from_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Whether this event's name marks it as a platform error.
    pub fn is_platform_error(&self) -> bool {
        self.name.starts_with(PLATFORM_ERROR_TOKEN)
    }

    /// Build the `done.invoke.<id>` event dispatched when a child (or the
    /// interpreter itself) reaches a terminal configuration.
    pub fn done_invoke(id: &str, data: Option<Value>) -> Self {
        Self {
            name: format!("done.invoke.{id}"),
            data: data.unwrap_or(Value::Null),
            origin: Some(id.to_string()),
        }
    }

    /// Build the `error.platform.<id>` event dispatched to a parent when a
    /// guarded action panics, or when child construction fails.
    pub fn error(id: &str, message: impl fmt::Display) -> Self {
        Self {
            name: format!("error.platform.{id}"),
            data: Value::String(message.to_string()),
            origin: Some(id.to_string()),
        }
    }
}

/// Normalizes anything shaped like an event into an [`Event`].
///
/// Implemented for `&str`/`String` (bare type-strings) and for `Event`
/// itself (normalized snapshots pass through unchanged), matching the
/// three shapes the source's `toSCXMLEvent` accepts.
pub trait IntoEvent {
    fn into_event(self) -> Event;
}

impl IntoEvent for Event {
    fn into_event(self) -> Event {
        self
    }
}

impl IntoEvent for &str {
    fn into_event(self) -> Event {
        Event::new(self)
    }
}

impl IntoEvent for String {
    fn into_event(self) -> Event {
        Event::new(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_strings_normalize_to_null_payload() {
        let event = "PING".into_event();
        assert_eq!(event.name, "PING");
        assert_eq!(event.data, Value::Null);
        assert!(event.origin.is_none());
    }

    #[test]
    fn platform_error_detection() {
        assert!(Event::new("error.platform.foo").is_platform_error());
        assert!(!Event::new("TICK").is_platform_error());
    }

    #[test]
    fn done_invoke_carries_origin() {
        let event = Event::done_invoke("child-1", Some(Value::from(42)));
        assert_eq!(event.name, "done.invoke.child-1");
        assert_eq!(event.origin.as_deref(), Some("child-1"));
        assert_eq!(event.data, Value::from(42));
    }
}
