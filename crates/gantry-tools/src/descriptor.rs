use std::fmt;
use std::sync::Arc;

use crate::def::ToolDef;
use crate::error::ToolsError;
use crate::host::ToolHost;

type RegisterFn = dyn Fn(&dyn ToolHost) -> Result<(), ToolsError> + Send + Sync;

/// A tool the server knows about, with the capability that attaches it to a
/// live host.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub is_core: bool,
    register: Arc<RegisterFn>,
}

impl ToolDescriptor {
    #[must_use]
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, register: F) -> Self
    where
        F: Fn(&dyn ToolHost) -> Result<(), ToolsError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            is_core: false,
            register: Arc::new(register),
        }
    }

    /// Descriptor whose registration adds `def` to the host as is.
    #[must_use]
    pub fn from_def(def: ToolDef) -> Self {
        let name = def.name.clone();
        let description = def.description.clone();
        Self::new(name, description, move |host| host.add_tool(def.clone()))
    }

    #[must_use]
    pub fn core(mut self, is_core: bool) -> Self {
        self.is_core = is_core;
        self
    }

    pub(crate) fn register(&self, host: &dyn ToolHost) -> Result<(), ToolsError> {
        (self.register)(host)
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("is_core", &self.is_core)
            .finish_non_exhaustive()
    }
}

/// Server-level policy deciding which tools exist and which are core.
pub trait ToolFilter: Send + Sync {
    fn should_register_tool(&self, name: &str) -> bool;

    fn is_core_tool(&self, name: &str) -> bool;
}

/// Registers everything, marks nothing as core.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl ToolFilter for NoFilter {
    fn should_register_tool(&self, _name: &str) -> bool {
        true
    }

    fn is_core_tool(&self, _name: &str) -> bool {
        false
    }
}
