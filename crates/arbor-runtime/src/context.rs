//! Dispatch sessions.
//!
//! A [`Context`] owns a live copy of the loader's registrations plus its own
//! scope-bound handlers and overrides. Dropping it discards all of that; two
//! contexts never see each other's dynamic state.

use std::collections::HashMap;
use std::sync::Arc;

use arbor_types::{NodeId, Result, Tree};
use indexmap::IndexMap;

use crate::events::DispatchEvent;
use crate::handler::{BaseFrame, EventHandler, Invocation, Loader, OverrideEntry, Registration};

/// Event raised once on a scratch tree when a context is created.
pub const INITIALIZE_CONTEXT: &str = "arbor.initialize-context";

pub struct Context {
    handlers: IndexMap<String, Vec<Registration>>,
    overrides: IndexMap<String, Vec<OverrideEntry>>,
    branch_frames: Vec<HashMap<NodeId, bool>>,
    base_stack: Vec<Option<Arc<BaseFrame>>>,
    trace: Option<Vec<DispatchEvent>>,
    depth: usize,
}

impl Context {
    /// Build a fresh live view from `loader` and raise
    /// [`INITIALIZE_CONTEXT`] so static handlers can seed dynamic state.
    pub fn new(loader: Arc<Loader>) -> Result<Self> {
        let mut ctx = Self {
            handlers: loader.handlers.clone(),
            overrides: loader.overrides.clone(),
            branch_frames: Vec::new(),
            base_stack: Vec::new(),
            trace: None,
            depth: 0,
        };
        let mut scratch = Tree::new();
        let root = scratch.root();
        ctx.raise(INITIALIZE_CONTEXT, &mut scratch, root)?;
        Ok(ctx)
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a handler for `name` owned by `scope`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        scope: impl Into<String>,
        handler: impl EventHandler + 'static,
    ) {
        let (name, scope) = (name.into(), scope.into());
        tracing::debug!(event = %name, scope = %scope, "registering handler");
        self.record(|| DispatchEvent::Registered {
            name: name.clone(),
            scope: Some(scope.clone()),
        });
        self.handlers.entry(name).or_default().push(Registration {
            handler: Arc::new(handler),
            scope: Some(scope),
        });
    }

    /// Make `name` override `base`, removed again when `scope` is unregistered.
    pub fn declare_override(
        &mut self,
        base: impl Into<String>,
        name: impl Into<String>,
        scope: Option<String>,
    ) {
        let (base, name) = (base.into(), name.into());
        tracing::debug!(base = %base, by = %name, "declaring override");
        self.overrides
            .entry(base)
            .or_default()
            .push(OverrideEntry { name, scope });
    }

    /// Dynamic `override(base, name)` owned by nobody; lives until removed
    /// or until the context is dropped.
    pub fn override_event(&mut self, base: impl Into<String>, name: impl Into<String>) {
        self.declare_override(base, name, None);
    }

    /// Remove every override of `base` by `name`. Returns how many went.
    pub fn remove_override(&mut self, base: &str, name: &str) -> usize {
        let Some(entries) = self.overrides.get_mut(base) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|e| e.name != name);
        let removed = before - entries.len();
        if entries.is_empty() {
            self.overrides.shift_remove(base);
        }
        removed
    }

    /// Remove every handler and override declared by `scope`.
    ///
    /// Returns the number of handlers removed.
    pub fn unregister(&mut self, scope: &str) -> usize {
        let owned = |s: &Option<String>| s.as_deref() == Some(scope);

        let mut handlers = 0;
        let mut emptied: Vec<String> = Vec::new();
        self.handlers.retain(|name, regs| {
            let before = regs.len();
            regs.retain(|r| !owned(&r.scope));
            handlers += before - regs.len();
            if regs.is_empty() {
                emptied.push(name.clone());
            }
            !regs.is_empty()
        });
        // Overrides by an event that just lost its last handler go too,
        // whoever declared them.
        let mut overrides = 0;
        self.overrides.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| !owned(&e.scope) && !emptied.contains(&e.name));
            overrides += before - entries.len();
            !entries.is_empty()
        });

        if handlers + overrides > 0 {
            tracing::debug!(scope, handlers, overrides, "unregistered scope");
            self.record(|| DispatchEvent::Unregistered {
                scope: scope.to_string(),
                handlers,
                overrides,
            });
        }
        handlers
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Raise `name` with `args` as its argument node.
    ///
    /// Returns `args` itself after mutation. A name without handlers is a
    /// no-op.
    pub fn raise(&mut self, name: &str, tree: &mut Tree, args: NodeId) -> Result<NodeId> {
        self.dispatch(name, tree, args, None)?;
        Ok(args)
    }

    /// Invoke the base handlers of the override `call` was dispatched as.
    ///
    /// Does nothing when `call` is not an override invocation.
    pub fn call_base(&mut self, call: &mut Invocation<'_>) -> Result<()> {
        match call.base.clone() {
            Some(frame) => self.raise_base(&frame, call.tree, call.args),
            None => Ok(()),
        }
    }

    /// Raise the handlers `frame` names directly, skipping override lookup.
    pub fn raise_base(&mut self, frame: &BaseFrame, tree: &mut Tree, args: NodeId) -> Result<()> {
        tracing::debug!(event = %frame.name, "calling base");
        self.record(|| DispatchEvent::BaseCalled {
            name: frame.name.clone(),
        });
        self.raise_directly(&frame.name, tree, args, frame.parent.clone())
    }

    /// Base frame of the innermost lambda-defined event currently running.
    pub fn base_frame(&self) -> Option<Arc<BaseFrame>> {
        self.base_stack.last().cloned().flatten()
    }

    fn dispatch(
        &mut self,
        name: &str,
        tree: &mut Tree,
        args: NodeId,
        base: Option<Arc<BaseFrame>>,
    ) -> Result<()> {
        let overriding = self.overriding_names(name, base.as_deref());
        if overriding.is_empty() {
            return self.raise_directly(name, tree, args, base);
        }
        let frame = Arc::new(BaseFrame {
            name: name.to_string(),
            parent: base,
        });
        for by in overriding {
            tracing::debug!(base = %name, by = %by, "dispatching override");
            self.record(|| DispatchEvent::Overridden {
                base: name.to_string(),
                by: by.clone(),
            });
            self.dispatch(&by, tree, args, Some(frame.clone()))?;
        }
        Ok(())
    }

    /// Distinct names overriding `name`, minus any already in the base chain
    /// and any that would dispatch to nothing.
    fn overriding_names(&self, name: &str, base: Option<&BaseFrame>) -> Vec<String> {
        let Some(entries) = self.overrides.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            let cyclic = entry.name == name || base.is_some_and(|b| b.contains(&entry.name));
            let live = self.handlers.contains_key(&entry.name)
                || self.overrides.contains_key(&entry.name);
            if !cyclic && live && !names.contains(&entry.name) {
                names.push(entry.name.clone());
            }
        }
        names
    }

    fn raise_directly(
        &mut self,
        name: &str,
        tree: &mut Tree,
        args: NodeId,
        base: Option<Arc<BaseFrame>>,
    ) -> Result<()> {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .get(name)
            .map(|regs| regs.iter().map(|r| r.handler.clone()).collect())
            .unwrap_or_default();
        if handlers.is_empty() {
            tracing::trace!(event = %name, "no handler registered");
            self.record(|| DispatchEvent::Unhandled {
                name: name.to_string(),
            });
            return Ok(());
        }

        tracing::debug!(event = %name, depth = self.depth, "raising event");
        let depth = self.depth;
        self.record(|| DispatchEvent::Raised {
            name: name.to_string(),
            depth,
        });
        self.depth += 1;
        let mut result = Ok(());
        for handler in handlers {
            let mut call = Invocation {
                name,
                tree: &mut *tree,
                args,
                base: base.clone(),
            };
            result = handler.handle(self, &mut call);
            if result.is_err() {
                break;
            }
        }
        self.depth -= 1;
        result
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Live event names in registration order.
    pub fn event_names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Live `(base, overriding)` pairs in declaration order.
    pub fn overrides(&self) -> Vec<(String, String)> {
        self.overrides
            .iter()
            .flat_map(|(base, entries)| entries.iter().map(move |e| (base.clone(), e.name.clone())))
            .collect()
    }

    /// Current nesting depth of raised events.
    pub fn depth(&self) -> usize {
        self.depth
    }

    // -----------------------------------------------------------------------
    // Trace
    // -----------------------------------------------------------------------

    pub fn enable_trace(&mut self) {
        self.trace.get_or_insert_with(Vec::new);
    }

    pub fn is_tracing(&self) -> bool {
        self.trace.is_some()
    }

    /// Drain the recorded dispatch steps; tracing stays enabled.
    pub fn take_trace(&mut self) -> Vec<DispatchEvent> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }

    fn record(&mut self, event: impl FnOnce() -> DispatchEvent) {
        if let Some(trace) = self.trace.as_mut() {
            trace.push(event());
        }
    }

    // -----------------------------------------------------------------------
    // Statement engine state
    // -----------------------------------------------------------------------

    /// Open a scope for the branch outcomes of one executing block.
    pub(crate) fn push_branch_frame(&mut self) {
        self.branch_frames.push(HashMap::new());
    }

    pub(crate) fn pop_branch_frame(&mut self) {
        self.branch_frames.pop();
    }

    /// Outcomes live in the innermost block frame; outside any block they
    /// are not kept.
    pub(crate) fn set_branch_outcome(&mut self, node: NodeId, matched: bool) {
        if let Some(frame) = self.branch_frames.last_mut() {
            frame.insert(node, matched);
        }
    }

    pub(crate) fn branch_outcome(&self, node: NodeId) -> Option<bool> {
        self.branch_frames.last()?.get(&node).copied()
    }

    pub(crate) fn clear_branch_outcome(&mut self, node: NodeId) {
        if let Some(frame) = self.branch_frames.last_mut() {
            frame.remove(&node);
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_branch_outcomes(&self) -> usize {
        self.branch_frames.iter().map(HashMap::len).sum()
    }

    pub(crate) fn push_base(&mut self, frame: Option<Arc<BaseFrame>>) {
        self.base_stack.push(frame);
    }

    pub(crate) fn pop_base(&mut self) {
        self.base_stack.pop();
    }
}
