//! Runtime configuration loaded from JSON.
//!
//! Every field is optional; a missing file section falls back to
//! [`RuntimeConfig::default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::Context;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Record a dispatch trace in every context this config is applied to.
    pub trace: bool,
    /// Event raised on a program's root when it is run.
    pub entry_event: String,
    /// Programs run into every fresh context before the main program.
    pub preload: Vec<PathBuf>,
    /// `tracing` filter directive used when none is given on the command line.
    pub log_filter: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trace: false,
            entry_event: "lambda".to_string(),
            preload: Vec::new(),
            log_filter: None,
        }
    }
}

impl RuntimeConfig {
    /// Read a config file. Relative `preload` paths resolve against the
    /// file's directory.
    pub fn load(path: &Path) -> arbor_types::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let mut config: RuntimeConfig = serde_json::from_str(&json)?;
        if let Some(dir) = path.parent() {
            for preload in &mut config.preload {
                if preload.is_relative() {
                    *preload = dir.join(&*preload);
                }
            }
        }
        tracing::debug!(path = %path.display(), preload = config.preload.len(), "Config loaded");
        Ok(config)
    }

    pub fn apply(&self, ctx: &mut Context) {
        if self.trace {
            ctx.enable_trace();
        }
    }
}
