use std::sync::RwLock;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::def::ToolDef;
use crate::error::ToolsError;

/// The live tool registry of one server instance.
pub trait ToolHost: Send + Sync {
    /// Expose `def` to the client.
    ///
    /// # Errors
    ///
    /// Implementations reject names they already expose.
    fn add_tool(&self, def: ToolDef) -> Result<(), ToolsError>;

    /// Tell the client that the visible tool list changed.
    fn notify_tools_changed(&self);
}

/// Host that keeps its tools in memory and counts change notifications.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    tools: RwLock<Vec<ToolDef>>,
    notifications: AtomicUsize,
}

impl InMemoryHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tools(&self) -> Vec<ToolDef> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<ToolDef> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    #[must_use]
    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::Acquire)
    }
}

impl ToolHost for InMemoryHost {
    fn add_tool(&self, def: ToolDef) -> Result<(), ToolsError> {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.iter().any(|t| t.name == def.name) {
            return Err(ToolsError::Duplicate { name: def.name });
        }
        tracing::debug!(tool = %def.name, "tool added to host");
        tools.push(def);
        Ok(())
    }

    fn notify_tools_changed(&self) {
        self.notifications.fetch_add(1, Ordering::AcqRel);
    }
}
