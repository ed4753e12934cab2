use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::Arc;

use gantry_output::{OutputEnvelope, Render};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::def::ToolDef;
use crate::descriptor::{ToolDescriptor, ToolFilter};
use crate::error::ToolsError;
use crate::host::ToolHost;

pub const DISCOVER_TOOL_NAME: &str = "discover-tools";

/// Parameters of the `discover-tools` tool.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct DiscoverParams {
    /// Names of deferred tools to enable
    #[serde(default)]
    pub tools: Vec<String>,
    /// Enable every deferred tool
    #[serde(default)]
    pub all: bool,
}

/// Which deferred tools a discovery call targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    All,
    /// An empty list registers nothing and only reports.
    Named(Vec<String>),
}

impl From<DiscoverParams> for Discovery {
    fn from(params: DiscoverParams) -> Self {
        if params.all {
            Self::All
        } else {
            Self::Named(params.tools)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub registered: Vec<String>,
    pub already_registered: Vec<String>,
    pub unknown: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
    pub visible: Vec<String>,
    pub deferred: Vec<String>,
}

impl Render for DiscoveryReport {
    fn render(&self) -> String {
        let mut out = String::new();
        let sections = [
            ("Registered", &self.registered),
            ("Already registered", &self.already_registered),
            ("Unknown", &self.unknown),
            ("Failed", &self.failed),
            ("Still deferred", &self.deferred),
        ];
        for (label, names) in sections {
            if !names.is_empty() {
                let _ = writeln!(out, "{label}: {}", names.join(", "));
            }
        }
        if self.deferred.is_empty() {
            out.push_str("No deferred tools remain.\n");
        }
        let _ = write!(out, "Visible tools: {}", self.visible.len());
        out
    }
}

/// What [`LazyToolManager::install`] did with each descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub registered: Vec<String>,
    pub deferred: Vec<String>,
    pub dropped: Vec<String>,
}

enum ToolState {
    Deferred(ToolDescriptor),
    Registered,
}

#[derive(Default)]
struct State {
    tools: HashMap<String, ToolState>,
}

impl State {
    fn sorted_names(&self, registered: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .iter()
            .filter(|(_, s)| matches!(s, ToolState::Registered) == registered)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }
}

/// Tracks which tools of one server are exposed and which wait for
/// discovery. A tool is visible iff it is core or was discovered during
/// this manager's lifetime.
pub struct LazyToolManager {
    host: Arc<dyn ToolHost>,
    state: Mutex<State>,
}

impl LazyToolManager {
    #[must_use]
    pub fn new(host: Arc<dyn ToolHost>) -> Self {
        Self {
            host,
            state: Mutex::new(State::default()),
        }
    }

    /// Definition of the synthetic tool exposed while anything is deferred.
    #[must_use]
    pub fn discover_tool_def() -> ToolDef {
        ToolDef::new(
            DISCOVER_TOOL_NAME,
            "Enable additional tools that are not loaded yet. Pass `tools` with names, \
             `all: true` for everything, or nothing to list what is available.",
            schemars::schema_for!(DiscoverParams),
        )
    }

    /// Apply `filter` to `descriptors`: drop, register now, or defer when
    /// `lazy` is set and the tool is not core.
    ///
    /// # Errors
    ///
    /// Returns the first registration failure of a non-deferred tool.
    pub async fn install(
        &self,
        descriptors: Vec<ToolDescriptor>,
        filter: &dyn ToolFilter,
        lazy: bool,
    ) -> Result<InstallSummary, ToolsError> {
        let mut summary = InstallSummary::default();
        for descriptor in descriptors {
            let name = descriptor.name.clone();
            if !filter.should_register_tool(&name) {
                tracing::debug!(tool = %name, "tool disabled by filter");
                summary.dropped.push(name);
            } else if !lazy || descriptor.is_core || filter.is_core_tool(&name) {
                self.register_now(descriptor).await?;
                summary.registered.push(name);
            } else {
                self.register_lazy(descriptor).await?;
                summary.deferred.push(name);
            }
        }
        tracing::info!(
            registered = summary.registered.len(),
            deferred = summary.deferred.len(),
            dropped = summary.dropped.len(),
            "tools installed"
        );
        Ok(summary)
    }

    /// Defer `descriptor` until discovery. Known names are left untouched.
    /// The first deferred tool brings `discover-tools` with it.
    ///
    /// # Errors
    ///
    /// Returns an error if `discover-tools` cannot be added to the host.
    pub async fn register_lazy(&self, descriptor: ToolDescriptor) -> Result<(), ToolsError> {
        let mut state = self.state.lock().await;
        if state.tools.contains_key(&descriptor.name) {
            tracing::debug!(tool = %descriptor.name, "already known, not deferring");
            return Ok(());
        }
        self.ensure_discover_tool(&mut state)?;
        tracing::debug!(tool = %descriptor.name, "tool deferred");
        state
            .tools
            .insert(descriptor.name.clone(), ToolState::Deferred(descriptor));
        Ok(())
    }

    /// Register `descriptor` with the host right away. A no-op for names that
    /// are already registered.
    ///
    /// # Errors
    ///
    /// Propagates the descriptor's registration failure.
    pub async fn register_now(&self, descriptor: ToolDescriptor) -> Result<(), ToolsError> {
        let mut state = self.state.lock().await;
        let was_deferred = match state.tools.get(&descriptor.name) {
            Some(ToolState::Registered) => return Ok(()),
            Some(ToolState::Deferred(_)) => true,
            None => false,
        };
        descriptor.register(self.host.as_ref())?;
        tracing::debug!(tool = %descriptor.name, "tool registered");
        state
            .tools
            .insert(descriptor.name.clone(), ToolState::Registered);
        if was_deferred {
            self.host.notify_tools_changed();
        }
        Ok(())
    }

    pub async fn has_deferred_tools(&self) -> bool {
        self.state
            .lock()
            .await
            .tools
            .values()
            .any(|s| matches!(s, ToolState::Deferred(_)))
    }

    /// Names currently exposed through the host, sorted.
    pub async fn visible_tools(&self) -> Vec<String> {
        self.state.lock().await.sorted_names(true)
    }

    /// Names still waiting for discovery, sorted.
    pub async fn deferred_tools(&self) -> Vec<String> {
        self.state.lock().await.sorted_names(false)
    }

    /// Register the deferred tools selected by `selection`. The host is
    /// notified once if anything changed.
    pub async fn discover(&self, selection: Discovery) -> DiscoveryReport {
        let mut state = self.state.lock().await;
        let mut report = DiscoveryReport::default();

        let targets = match selection {
            Discovery::All => state.sorted_names(false),
            Discovery::Named(mut names) => {
                let mut seen = HashSet::new();
                names.retain(|n| seen.insert(n.clone()));
                names
            }
        };

        for name in targets {
            let descriptor = match state.tools.get(&name) {
                None => {
                    report.unknown.push(name);
                    continue;
                }
                Some(ToolState::Registered) => {
                    report.already_registered.push(name);
                    continue;
                }
                Some(ToolState::Deferred(descriptor)) => descriptor.clone(),
            };
            match descriptor.register(self.host.as_ref()) {
                Ok(()) => {
                    tracing::info!(tool = %name, "tool discovered");
                    state.tools.insert(name.clone(), ToolState::Registered);
                    report.registered.push(name);
                }
                Err(e) => {
                    tracing::warn!(tool = %name, "discovery registration failed: {e}");
                    report.failed.push(name);
                }
            }
        }

        if !report.registered.is_empty() {
            self.host.notify_tools_changed();
        }
        report.visible = state.sorted_names(true);
        report.deferred = state.sorted_names(false);
        report
    }

    /// Handle a `discover-tools` call.
    ///
    /// # Errors
    ///
    /// Returns [`ToolsError::InvalidParams`] for malformed parameters.
    pub async fn handle_discover(
        &self,
        params: serde_json::Value,
    ) -> Result<OutputEnvelope, ToolsError> {
        let params: DiscoverParams = if params.is_null() {
            DiscoverParams::default()
        } else {
            serde_json::from_value(params)?
        };
        let report = self.discover(params.into()).await;
        Ok(gantry_output::dual_output(&report)?)
    }

    fn ensure_discover_tool(&self, state: &mut State) -> Result<(), ToolsError> {
        if state.tools.contains_key(DISCOVER_TOOL_NAME) {
            return Ok(());
        }
        self.host.add_tool(Self::discover_tool_def())?;
        state
            .tools
            .insert(DISCOVER_TOOL_NAME.to_owned(), ToolState::Registered);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::descriptor::NoFilter;
    use crate::host::InMemoryHost;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::from_def(ToolDef::new(
            name,
            format!("{name} tool"),
            schemars::json_schema!({"type": "object"}),
        ))
    }

    fn setup() -> (Arc<InMemoryHost>, LazyToolManager) {
        let host = Arc::new(InMemoryHost::new());
        let manager = LazyToolManager::new(host.clone());
        (host, manager)
    }

    struct CoreOnly(&'static [&'static str]);

    impl ToolFilter for CoreOnly {
        fn should_register_tool(&self, name: &str) -> bool {
            name != "disabled"
        }

        fn is_core_tool(&self, name: &str) -> bool {
            self.0.contains(&name)
        }
    }

    #[tokio::test]
    async fn eager_install_registers_everything() {
        let (host, manager) = setup();
        let summary = manager
            .install(vec![descriptor("a"), descriptor("b")], &NoFilter, false)
            .await
            .unwrap();
        assert_eq!(summary.registered, vec!["a", "b"]);
        assert!(!manager.has_deferred_tools().await);
        assert!(host.find(DISCOVER_TOOL_NAME).is_none());
    }

    #[tokio::test]
    async fn lazy_install_defers_non_core() {
        let (host, manager) = setup();
        let summary = manager
            .install(
                vec![
                    descriptor("git-status"),
                    descriptor("docker-run"),
                    descriptor("disabled"),
                ],
                &CoreOnly(&["git-status"]),
                true,
            )
            .await
            .unwrap();
        assert_eq!(summary.registered, vec!["git-status"]);
        assert_eq!(summary.deferred, vec!["docker-run"]);
        assert_eq!(summary.dropped, vec!["disabled"]);
        assert!(manager.has_deferred_tools().await);
        assert_eq!(host.tool_names(), vec!["git-status", DISCOVER_TOOL_NAME]);
        assert_eq!(
            manager.visible_tools().await,
            vec![DISCOVER_TOOL_NAME, "git-status"]
        );
    }

    #[tokio::test]
    async fn descriptor_core_flag_is_honored() {
        let (host, manager) = setup();
        manager
            .install(vec![descriptor("pinned").core(true)], &NoFilter, true)
            .await
            .unwrap();
        assert!(host.find("pinned").is_some());
        assert!(!manager.has_deferred_tools().await);
    }

    #[tokio::test]
    async fn discover_named_registers_and_notifies_once() {
        let (host, manager) = setup();
        for name in ["a", "b", "c"] {
            manager.register_lazy(descriptor(name)).await.unwrap();
        }
        let report = manager
            .discover(Discovery::Named(vec!["a".into(), "b".into(), "zzz".into()]))
            .await;
        assert_eq!(report.registered, vec!["a", "b"]);
        assert_eq!(report.unknown, vec!["zzz"]);
        assert_eq!(report.deferred, vec!["c"]);
        assert_eq!(host.notifications(), 1);
        assert!(host.find("a").is_some());
        assert!(host.find("c").is_none());
    }

    #[tokio::test]
    async fn discovery_is_idempotent() {
        let (host, manager) = setup();
        manager.register_lazy(descriptor("a")).await.unwrap();

        let first = manager.discover(Discovery::Named(vec!["a".into()])).await;
        assert_eq!(first.registered, vec!["a"]);

        let second = manager.discover(Discovery::Named(vec!["a".into()])).await;
        assert!(second.registered.is_empty());
        assert_eq!(second.already_registered, vec!["a"]);
        assert_eq!(host.notifications(), 1);
        assert_eq!(
            host.tool_names().iter().filter(|n| *n == "a").count(),
            1
        );
    }

    #[tokio::test]
    async fn discover_all() {
        let (host, manager) = setup();
        manager.register_lazy(descriptor("x")).await.unwrap();
        manager.register_lazy(descriptor("y")).await.unwrap();
        let report = manager.discover(Discovery::All).await;
        assert_eq!(report.registered, vec!["x", "y"]);
        assert!(report.deferred.is_empty());
        assert!(!manager.has_deferred_tools().await);
        assert_eq!(host.notifications(), 1);

        let again = manager.discover(Discovery::All).await;
        assert!(again.registered.is_empty());
        assert_eq!(host.notifications(), 1);
    }

    #[tokio::test]
    async fn empty_selection_only_lists() {
        let (host, manager) = setup();
        manager.register_lazy(descriptor("x")).await.unwrap();
        let report = manager.discover(Discovery::Named(Vec::new())).await;
        assert!(report.registered.is_empty());
        assert_eq!(report.deferred, vec!["x"]);
        assert_eq!(host.notifications(), 0);
    }

    #[tokio::test]
    async fn register_lazy_is_noop_for_registered() {
        let (host, manager) = setup();
        manager.register_now(descriptor("a")).await.unwrap();
        manager.register_lazy(descriptor("a")).await.unwrap();
        assert!(!manager.has_deferred_tools().await);
        assert!(host.find(DISCOVER_TOOL_NAME).is_none());
    }

    #[tokio::test]
    async fn register_now_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_host, manager) = setup();
        let make = || {
            let calls = calls.clone();
            ToolDescriptor::new("counted", "", move |_host| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        manager.register_now(make()).await.unwrap();
        manager.register_now(make()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_registration_stays_deferred() {
        let (host, manager) = setup();
        manager
            .register_lazy(ToolDescriptor::new("broken", "", |_host| {
                Err(ToolsError::Registration {
                    name: "broken".into(),
                    message: "adapter missing".into(),
                })
            }))
            .await
            .unwrap();
        let report = manager.discover(Discovery::All).await;
        assert_eq!(report.failed, vec!["broken"]);
        assert_eq!(report.deferred, vec!["broken"]);
        assert_eq!(host.notifications(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_discovery_registers_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (host, manager) = setup();
        let counted = calls.clone();
        manager
            .register_lazy(ToolDescriptor::new("shared", "", move |host| {
                counted.fetch_add(1, Ordering::SeqCst);
                host.add_tool(ToolDef::new(
                    "shared",
                    "",
                    schemars::json_schema!({"type": "object"}),
                ))
            }))
            .await
            .unwrap();

        let manager = Arc::new(manager);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .discover(Discovery::Named(vec!["shared".into()]))
                        .await
                })
            })
            .collect();
        let mut newly = 0;
        for handle in handles {
            newly += handle.await.unwrap().registered.len();
        }
        assert_eq!(newly, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(host.notifications(), 1);
    }

    #[tokio::test]
    async fn visibility_tracks_core_and_discovered() {
        let (_host, manager) = setup();
        manager
            .install(
                vec![descriptor("core"), descriptor("lazy1"), descriptor("lazy2")],
                &CoreOnly(&["core"]),
                true,
            )
            .await
            .unwrap();
        let visible = manager.visible_tools().await;
        assert!(visible.contains(&"core".to_owned()));
        assert!(!visible.contains(&"lazy1".to_owned()));

        manager.discover(Discovery::Named(vec!["lazy1".into()])).await;
        let visible = manager.visible_tools().await;
        assert!(visible.contains(&"lazy1".to_owned()));
        assert!(!visible.contains(&"lazy2".to_owned()));
    }

    #[tokio::test]
    async fn handle_discover_returns_envelope() {
        let (_host, manager) = setup();
        manager.register_lazy(descriptor("npm-install")).await.unwrap();
        let env = manager
            .handle_discover(serde_json::json!({"tools": ["npm-install"]}))
            .await
            .unwrap();
        assert_eq!(env.structured["registered"][0], "npm-install");
        insta::assert_snapshot!(env.human_text, @r"
        Registered: npm-install
        No deferred tools remain.
        Visible tools: 2
        ");
    }

    #[tokio::test]
    async fn handle_discover_accepts_null_and_rejects_bad_params() {
        let (_host, manager) = setup();
        manager.register_lazy(descriptor("x")).await.unwrap();
        let env = manager.handle_discover(serde_json::Value::Null).await.unwrap();
        assert_eq!(env.structured["deferred"][0], "x");

        let err = manager
            .handle_discover(serde_json::json!({"tools": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolsError::InvalidParams(_)));
    }

    #[test]
    fn discover_schema_describes_params() {
        let def = LazyToolManager::discover_tool_def();
        assert_eq!(def.name, DISCOVER_TOOL_NAME);
        let schema = def.schema.as_value();
        let props = &schema["properties"];
        assert_eq!(props["all"]["type"], "boolean");
        assert_eq!(props["all"]["description"], "Enable every deferred tool");
        assert_eq!(props["tools"]["type"], "array");
        assert_eq!(props["tools"]["items"]["type"], "string");
        assert_eq!(props["tools"]["description"], "Names of deferred tools to enable");
        assert!(
            schema
                .get("required")
                .and_then(serde_json::Value::as_array)
                .is_none_or(Vec::is_empty)
        );
    }
}
