//! Event handler trait, invocation payload, and the load-time registry.

use std::sync::Arc;

use arbor_types::{NodeId, Result, Tree};
use indexmap::IndexMap;

use crate::context::Context;

// ---------------------------------------------------------------------------
// EventHandler trait
// ---------------------------------------------------------------------------

/// A callable bound to an event name.
///
/// Handlers receive the dispatching [`Context`] (to raise nested events) and
/// the [`Invocation`], whose `args` node they read and mutate in place.
pub trait EventHandler: Send + Sync {
    fn handle(&self, ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()>;
}

/// Adapter that turns a function or closure into an [`EventHandler`].
pub struct FnHandler<F>(pub F);

impl<F> FnHandler<F>
where
    F: Fn(&mut Context, &mut Invocation<'_>) -> Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&mut Context, &mut Invocation<'_>) -> Result<()> + Send + Sync,
{
    fn handle(&self, ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
        (self.0)(ctx, call)
    }
}

/// The overridden event an invocation may fall back to with
/// [`Context::call_base`].
///
/// Frames chain through `parent` when overrides are themselves overridden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseFrame {
    pub name: String,
    pub parent: Option<Arc<BaseFrame>>,
}

impl BaseFrame {
    /// Returns `true` if `name` appears anywhere in this chain.
    pub fn contains(&self, name: &str) -> bool {
        let mut frame = Some(self);
        while let Some(f) = frame {
            if f.name == name {
                return true;
            }
            frame = f.parent.as_deref();
        }
        false
    }
}

/// One handler call: the raised name, the tree, and the argument node.
///
/// The argument node is mutated in place; there is no separate return value.
pub struct Invocation<'a> {
    pub name: &'a str,
    pub tree: &'a mut Tree,
    pub args: NodeId,
    pub base: Option<Arc<BaseFrame>>,
}

// ---------------------------------------------------------------------------
// Registrations
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) handler: Arc<dyn EventHandler>,
    /// `None` for static (load-time) handlers.
    pub(crate) scope: Option<String>,
}

/// One overriding event name for a base event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OverrideEntry {
    pub(crate) name: String,
    pub(crate) scope: Option<String>,
}

// ---------------------------------------------------------------------------
// Loader: static registrations
// ---------------------------------------------------------------------------

/// Process-wide handler set, established once and shared through `Arc`.
///
/// Every [`Context`] starts from a copy of these registrations; nothing a
/// context does is written back here.
#[derive(Default, Clone)]
pub struct Loader {
    pub(crate) handlers: IndexMap<String, Vec<Registration>>,
    pub(crate) overrides: IndexMap<String, Vec<OverrideEntry>>,
}

impl Loader {
    /// An empty loader with no events.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: impl EventHandler + 'static) {
        self.handlers
            .entry(name.into())
            .or_default()
            .push(Registration {
                handler: Arc::new(handler),
                scope: None,
            });
    }

    /// Register a function or closure as a static handler.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Context, &mut Invocation<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.register(name, FnHandler::new(handler));
    }

    /// Register a handler for `name` that overrides `base`.
    pub fn register_override(
        &mut self,
        name: impl Into<String>,
        base: impl Into<String>,
        handler: impl EventHandler + 'static,
    ) {
        let name = name.into();
        self.overrides
            .entry(base.into())
            .or_default()
            .push(OverrideEntry {
                name: name.clone(),
                scope: None,
            });
        self.register(name, handler);
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Static event names in registration order.
    pub fn event_names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Default loader factory
// ---------------------------------------------------------------------------

/// A loader with every built-in statement registered.
pub fn default_loader() -> Loader {
    use crate::handlers::{branching, dynamic, exceptions, lambda, loops, mutation};

    let mut loader = Loader::new();
    loader.register_fn("set", mutation::set);
    loader.register_fn("add", mutation::add);
    loader.register_fn("append", mutation::append);
    loader.register_fn("insert-before", mutation::insert_before);
    loader.register_fn("insert-after", mutation::insert_after);
    loader.register_fn("if", branching::if_statement);
    loader.register_fn("else-if", branching::else_if_statement);
    loader.register_fn("else", branching::else_statement);
    loader.register_fn("while", loops::while_statement);
    loader.register_fn("for-each", loops::for_each);
    loader.register_fn("lambda", lambda::lambda);
    loader.register_fn("lambda.copy", lambda::lambda_copy);
    loader.register_fn("lambda.immutable", lambda::lambda_immutable);
    loader.register_fn("event", dynamic::event);
    loader.register_fn("delete-event", dynamic::delete_event);
    loader.register_fn("override", dynamic::override_event);
    loader.register_fn("delete-override", dynamic::delete_override);
    loader.register_fn("call-base", dynamic::call_base);
    loader.register_fn("try", exceptions::try_statement);
    loader.register_fn("catch", exceptions::catch_statement);
    loader.register_fn("throw", exceptions::throw);
    loader
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_loader_has_all_statements() {
        let loader = default_loader();
        for name in [
            "set",
            "add",
            "append",
            "insert-before",
            "insert-after",
            "if",
            "else-if",
            "else",
            "while",
            "for-each",
            "lambda",
            "lambda.copy",
            "lambda.immutable",
            "event",
            "delete-event",
            "override",
            "delete-override",
            "call-base",
            "try",
            "catch",
            "throw",
        ] {
            assert!(loader.has_event(name), "missing built-in '{name}'");
        }
        assert_eq!(loader.event_names()[0], "set");
    }

    #[test]
    fn base_frame_chain_lookup() {
        let inner = Arc::new(BaseFrame {
            name: "a".into(),
            parent: None,
        });
        let outer = BaseFrame {
            name: "b".into(),
            parent: Some(inner),
        };
        assert!(outer.contains("a"));
        assert!(outer.contains("b"));
        assert!(!outer.contains("c"));
    }

    #[test]
    fn register_override_records_relationship() {
        let mut loader = Loader::new();
        loader.register_fn("a", |_: &mut Context, _: &mut Invocation<'_>| Ok(()));
        loader.register_override("b", "a", FnHandler::new(|_: &mut Context, _: &mut Invocation<'_>| Ok(())));
        assert_eq!(loader.overrides["a"][0].name, "b");
        assert!(loader.has_event("b"));
    }
}
