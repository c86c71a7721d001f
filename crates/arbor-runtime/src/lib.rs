//! Event registry, override dispatch, and the built-in statements.
//!
//! A program is a node tree: every child whose name is not data (empty or
//! `_`-prefixed) is raised as an event, with the child itself as arguments.
//! Events are registered in a shared [`Loader`] (built-ins, via
//! [`default_loader`]) or in a per-thread [`Context`] (dynamic events created
//! by the `event` statement). Overrides redirect one event to others, which
//! may reach the overridden implementation again through `call-base`.

pub mod condition;
pub mod config;
pub mod context;
pub mod events;
pub mod handler;
pub mod handlers;

pub use condition::{evaluate_condition, is_condition_child, Comparison};
pub use config::RuntimeConfig;
pub use context::{Context, INITIALIZE_CONTEXT};
pub use events::DispatchEvent;
pub use handler::{default_loader, BaseFrame, EventHandler, FnHandler, Invocation, Loader};
pub use handlers::loops::CURRENT;
pub use handlers::{execute_block, execute_body, LambdaEvent};
