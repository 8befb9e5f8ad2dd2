//! Run-scoped allow-list of action tools.
//!
//! The execution surface only carries out calls whose tool is on this list.
//! Before a run session is attached the registry reports the full vocabulary.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use shared_types::Tool;
use tracing::info;

pub const ALLOWED_TOOLS_FILE: &str = "allowed_tools.json";

#[derive(Debug, thiserror::Error)]
pub enum ToolRegistryError {
    #[error("no run session attached")]
    NoSession,
    #[error("failed to persist allowed tools: {0}")]
    Persist(#[from] std::io::Error),
    #[error("failed to encode allowed tools: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct ToolRegistry {
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    /// `allowed_tools.json` inside the run directory, once attached
    file: Option<PathBuf>,
    allowed: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                file: None,
                allowed: Tool::ALL.to_vec(),
            }),
        }
    }

    /// Bind the registry to a run directory and persist the full vocabulary.
    pub fn attach(&self, run_dir: &Path) -> Result<(), ToolRegistryError> {
        let file = run_dir.join(ALLOWED_TOOLS_FILE);
        let mut inner = self.inner.lock().expect("ToolRegistry lock poisoned");
        let allowed = Tool::ALL.to_vec();
        persist(&file, &allowed)?;
        inner.file = Some(file);
        inner.allowed = allowed;
        Ok(())
    }

    pub fn get(&self) -> Vec<Tool> {
        self.inner
            .lock()
            .expect("ToolRegistry lock poisoned")
            .allowed
            .clone()
    }

    /// Replace the allow-list. Unknown names are dropped silently; the
    /// filtered list is persisted and returned.
    pub fn set<S: AsRef<str>>(&self, candidates: &[S]) -> Result<Vec<Tool>, ToolRegistryError> {
        let allowed = filter_known(candidates);
        let mut inner = self.inner.lock().expect("ToolRegistry lock poisoned");
        let file = inner.file.as_ref().ok_or(ToolRegistryError::NoSession)?;
        persist(file, &allowed)?;
        inner.allowed = allowed.clone();
        info!(allowed = ?names(&allowed), "allowed tools updated");
        Ok(allowed)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep names from the vocabulary, first occurrence wins.
pub fn filter_known<S: AsRef<str>>(candidates: &[S]) -> Vec<Tool> {
    let mut out: Vec<Tool> = Vec::new();
    for tool in candidates
        .iter()
        .filter_map(|name| Tool::from_name(name.as_ref()))
    {
        if !out.contains(&tool) {
            out.push(tool);
        }
    }
    out
}

pub fn names(tools: &[Tool]) -> Vec<&'static str> {
    tools.iter().map(Tool::as_str).collect()
}

fn persist(file: &Path, allowed: &[Tool]) -> Result<(), ToolRegistryError> {
    let json = serde_json::to_string_pretty(allowed)?;
    std::fs::write(file, json)?;
    Ok(())
}
