//! Dispatch trace for observability.
//!
//! A [`Context`](crate::Context) with tracing enabled records one
//! [`DispatchEvent`] per registry decision, so callers can see which handlers
//! a program actually reached without coupling to the dispatch internals.

use serde::{Deserialize, Serialize};

/// One step of event dispatch, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchEvent {
    Raised {
        name: String,
        depth: usize,
    },
    Overridden {
        base: String,
        by: String,
    },
    BaseCalled {
        name: String,
    },
    Unhandled {
        name: String,
    },
    Registered {
        name: String,
        scope: Option<String>,
    },
    Unregistered {
        scope: String,
        handlers: usize,
        overrides: usize,
    },
}

impl DispatchEvent {
    /// The event name this step concerns, when there is one.
    pub fn name(&self) -> Option<&str> {
        match self {
            DispatchEvent::Raised { name, .. }
            | DispatchEvent::BaseCalled { name }
            | DispatchEvent::Unhandled { name }
            | DispatchEvent::Registered { name, .. } => Some(name),
            DispatchEvent::Overridden { by, .. } => Some(by),
            DispatchEvent::Unregistered { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_variant_tag() {
        let event = DispatchEvent::Overridden {
            base: "greet".into(),
            by: "greet.loud".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"Overridden":{"base":"greet","by":"greet.loud"}}"#);
        let back: DispatchEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn name_accessor() {
        assert_eq!(
            DispatchEvent::Raised {
                name: "set".into(),
                depth: 0
            }
            .name(),
            Some("set")
        );
        assert_eq!(
            DispatchEvent::Unregistered {
                scope: "s".into(),
                handlers: 1,
                overrides: 0
            }
            .name(),
            None
        );
    }
}
