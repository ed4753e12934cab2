//! Deferred tool registration. Rarely used tools stay hidden from the client
//! until a `discover-tools` call brings them in.

pub mod def;
pub mod descriptor;
pub mod error;
pub mod host;
pub mod manager;

pub use def::ToolDef;
pub use descriptor::{NoFilter, ToolDescriptor, ToolFilter};
pub use error::ToolsError;
pub use host::{InMemoryHost, ToolHost};
pub use manager::{
    DISCOVER_TOOL_NAME, DiscoverParams, Discovery, DiscoveryReport, InstallSummary,
    LazyToolManager,
};
