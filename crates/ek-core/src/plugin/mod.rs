//! Plugin namespaces.
//!
//! A plugin is a [`Capability`] registered under a namespace: `ek <namespace>
//! <args...>` dispatches to it. Discovery sources yield candidates in order;
//! [`PluginRegistry::load_all`] registers them eagerly at startup. Namespace
//! names never shadow builtin verbs or each other: the later plugin fails to
//! load and the earlier one stays active.

pub mod external;

use crate::task::TaskEnv;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub use external::{ExecDiscovery, ExecPlugin};

// ---------------------------------------------------------------------------
// Capability surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubCommand {
    pub name: String,
    pub about: String,
}

/// Handed to [`Capability::register`]; collects the namespace's sub-commands.
#[derive(Debug)]
pub struct NamespaceHandle {
    namespace: String,
    commands: Vec<SubCommand>,
}

impl NamespaceHandle {
    fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            commands: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn command(&mut self, name: &str, about: &str) -> Result<(), String> {
        if name.trim().is_empty() {
            return Err("sub-command name is empty".to_string());
        }
        if self.commands.iter().any(|c| c.name == name) {
            return Err(format!("sub-command '{name}' registered twice"));
        }
        self.commands.push(SubCommand {
            name: name.to_string(),
            about: about.to_string(),
        });
        Ok(())
    }
}

/// A loaded namespace and its sub-commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Namespace {
    pub name: String,
    pub commands: Vec<SubCommand>,
}

/// What a plugin sees when dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginContext {
    pub project_root: Option<PathBuf>,
    pub branch: Option<String>,
    pub env: TaskEnv,
}

pub trait Capability {
    fn register(&self, handle: &mut NamespaceHandle) -> Result<(), String>;

    /// Run with the arguments after the namespace; returns the exit code.
    fn dispatch(&self, args: &[String], ctx: &PluginContext) -> Result<i32, String>;
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

pub enum EntryRef {
    Resolved(Box<dyn Capability>),
    Unresolved(String),
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryRef::Resolved(_) => f.write_str("Resolved(..)"),
            EntryRef::Unresolved(reason) => f.debug_tuple("Unresolved").field(reason).finish(),
        }
    }
}

#[derive(Debug)]
pub struct Discovered {
    pub namespace: String,
    /// Human-readable origin, e.g. the executable path.
    pub source: String,
    pub entry: EntryRef,
}

pub trait Discovery {
    fn discover(&self) -> Vec<Discovered>;
}

// ---------------------------------------------------------------------------
// Errors and state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginLoadError {
    #[error("plugin '{namespace}' collides with the builtin command of the same name")]
    CollidesWithBuiltin { namespace: String },

    #[error("plugin namespace '{namespace}' is already provided by {existing}")]
    DuplicateNamespace { namespace: String, existing: String },

    #[error("plugin '{namespace}' could not be resolved: {reason}")]
    EntryUnresolved { namespace: String, reason: String },

    #[error("plugin '{namespace}' failed to register: {reason}")]
    Registration { namespace: String, reason: String },

    #[error("no plugin at index {0}")]
    NoSuchPlugin(usize),
}

#[derive(Debug, Error)]
pub enum PluginDispatchError {
    #[error("plugin '{0}' is not loaded")]
    NotLoaded(String),

    #[error("plugin '{namespace}' failed: {reason}")]
    Failed { namespace: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginState {
    Unloaded,
    Loaded(Namespace),
    Failed(PluginLoadError),
}

impl PluginState {
    pub fn label(&self) -> &'static str {
        match self {
            PluginState::Unloaded => "unloaded",
            PluginState::Loaded(_) => "loaded",
            PluginState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
pub struct PluginDescriptor {
    namespace: String,
    source: String,
    entry: EntryRef,
    state: PluginState,
}

impl PluginDescriptor {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> &PluginState {
        &self.state
    }

    pub fn commands(&self) -> &[SubCommand] {
        match &self.state {
            PluginState::Loaded(ns) => &ns.commands,
            _ => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// PluginRegistry
// ---------------------------------------------------------------------------

pub struct PluginRegistry {
    builtins: BTreeSet<String>,
    descriptors: Vec<PluginDescriptor>,
    /// Loaded namespace name → descriptor index.
    active: BTreeMap<String, usize>,
}

impl PluginRegistry {
    pub fn new<I, S>(builtins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            builtins: builtins.into_iter().map(Into::into).collect(),
            descriptors: Vec::new(),
            active: BTreeMap::new(),
        }
    }

    /// Append candidates from every source, in order. Entries that could not
    /// be resolved are kept and marked failed.
    pub fn discover(&mut self, sources: &[&dyn Discovery]) -> &[PluginDescriptor] {
        let start = self.descriptors.len();
        for source in sources {
            for found in source.discover() {
                let state = match &found.entry {
                    EntryRef::Resolved(_) => PluginState::Unloaded,
                    EntryRef::Unresolved(reason) => PluginState::Failed(PluginLoadError::EntryUnresolved {
                        namespace: found.namespace.clone(),
                        reason: reason.clone(),
                    }),
                };
                tracing::debug!(namespace = %found.namespace, source = %found.source, "discovered plugin");
                self.descriptors.push(PluginDescriptor {
                    namespace: found.namespace,
                    source: found.source,
                    entry: found.entry,
                    state,
                });
            }
        }
        &self.descriptors[start..]
    }

    /// Register one candidate. Loading an already-loaded descriptor returns
    /// its namespace without calling the plugin again.
    pub fn load(&mut self, index: usize) -> Result<&Namespace, PluginLoadError> {
        let desc = self
            .descriptors
            .get(index)
            .ok_or(PluginLoadError::NoSuchPlugin(index))?;

        let outcome = match (&desc.state, &desc.entry) {
            (PluginState::Loaded(_), _) => None,
            (PluginState::Failed(e), _) => Some(Err(e.clone())),
            (PluginState::Unloaded, _) if self.builtins.contains(&desc.namespace) => {
                Some(Err(PluginLoadError::CollidesWithBuiltin {
                    namespace: desc.namespace.clone(),
                }))
            }
            (PluginState::Unloaded, _) if self.active.contains_key(&desc.namespace) => {
                let existing = &self.descriptors[self.active[&desc.namespace]];
                Some(Err(PluginLoadError::DuplicateNamespace {
                    namespace: desc.namespace.clone(),
                    existing: existing.source.clone(),
                }))
            }
            (PluginState::Unloaded, EntryRef::Unresolved(reason)) => {
                Some(Err(PluginLoadError::EntryUnresolved {
                    namespace: desc.namespace.clone(),
                    reason: reason.clone(),
                }))
            }
            (PluginState::Unloaded, EntryRef::Resolved(cap)) => {
                let mut handle = NamespaceHandle::new(&desc.namespace);
                Some(
                    cap.register(&mut handle)
                        .map(|()| Namespace {
                            name: handle.namespace,
                            commands: handle.commands,
                        })
                        .map_err(|reason| PluginLoadError::Registration {
                            namespace: desc.namespace.clone(),
                            reason,
                        }),
                )
            }
        };

        let desc = &mut self.descriptors[index];
        match outcome {
            None => {}
            Some(Ok(ns)) => {
                tracing::debug!(namespace = %ns.name, commands = ns.commands.len(), "loaded plugin");
                self.active.insert(ns.name.clone(), index);
                desc.state = PluginState::Loaded(ns);
            }
            Some(Err(e)) => {
                tracing::debug!(error = %e, "plugin failed to load");
                desc.state = PluginState::Failed(e.clone());
                return Err(e);
            }
        }
        match &desc.state {
            PluginState::Loaded(ns) => Ok(ns),
            _ => Err(PluginLoadError::NoSuchPlugin(index)),
        }
    }

    /// Load every discovered candidate in order; returns the failures.
    pub fn load_all(&mut self) -> Vec<PluginLoadError> {
        (0..self.descriptors.len())
            .filter_map(|i| self.load(i).err())
            .collect()
    }

    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        let idx = *self.active.get(name)?;
        match &self.descriptors[idx].state {
            PluginState::Loaded(ns) => Some(ns),
            _ => None,
        }
    }

    /// True when `name` is a loaded namespace.
    pub fn contains(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    pub fn dispatch(&self, namespace: &str, args: &[String], ctx: &PluginContext) -> Result<i32, PluginDispatchError> {
        let idx = *self
            .active
            .get(namespace)
            .ok_or_else(|| PluginDispatchError::NotLoaded(namespace.to_string()))?;
        let EntryRef::Resolved(cap) = &self.descriptors[idx].entry else {
            return Err(PluginDispatchError::NotLoaded(namespace.to_string()));
        };
        tracing::debug!(%namespace, ?args, "dispatching to plugin");
        cap.dispatch(args, ctx).map_err(|reason| PluginDispatchError::Failed {
            namespace: namespace.to_string(),
            reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// In-memory plugin: registers fixed sub-commands, dispatch returns
    /// `code` and counts calls.
    pub(crate) struct StaticPlugin {
        pub commands: Vec<&'static str>,
        pub code: i32,
        pub fail_register: bool,
        pub registrations: Rc<Cell<u32>>,
    }

    impl StaticPlugin {
        pub(crate) fn new(commands: &[&'static str], code: i32) -> Self {
            Self {
                commands: commands.to_vec(),
                code,
                fail_register: false,
                registrations: Rc::new(Cell::new(0)),
            }
        }
    }

    impl Capability for StaticPlugin {
        fn register(&self, handle: &mut NamespaceHandle) -> Result<(), String> {
            self.registrations.set(self.registrations.get() + 1);
            if self.fail_register {
                return Err("boom".to_string());
            }
            for c in &self.commands {
                handle.command(c, "")?;
            }
            Ok(())
        }

        fn dispatch(&self, _args: &[String], _ctx: &PluginContext) -> Result<i32, String> {
            Ok(self.code)
        }
    }

    /// A discovery source over a fixed list.
    pub(crate) struct ListDiscovery(pub std::cell::RefCell<Vec<Discovered>>);

    impl ListDiscovery {
        pub(crate) fn new(items: Vec<Discovered>) -> Self {
            Self(std::cell::RefCell::new(items))
        }
    }

    impl Discovery for ListDiscovery {
        fn discover(&self) -> Vec<Discovered> {
            self.0.borrow_mut().drain(..).collect()
        }
    }

    pub(crate) fn found(namespace: &str, plugin: StaticPlugin) -> Discovered {
        Discovered {
            namespace: namespace.to_string(),
            source: format!("test:{namespace}"),
            entry: EntryRef::Resolved(Box::new(plugin)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn registry() -> PluginRegistry {
        PluginRegistry::new(["status", "run", "help"])
    }

    #[test]
    fn loads_namespace_with_commands() {
        let mut reg = registry();
        reg.discover(&[&ListDiscovery::new(vec![found(
            "docker",
            StaticPlugin::new(&["up", "down"], 0),
        )])]);
        assert!(reg.load_all().is_empty());
        let ns = reg.namespace("docker").unwrap();
        assert_eq!(ns.commands.len(), 2);
        assert!(reg.contains("docker"));
    }

    #[test]
    fn duplicate_namespace_second_fails_first_stays() {
        let mut reg = registry();
        reg.discover(&[&ListDiscovery::new(vec![
            found("docker", StaticPlugin::new(&["up"], 3)),
            found("docker", StaticPlugin::new(&["down"], 4)),
        ])]);
        let errors = reg.load_all();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PluginLoadError::DuplicateNamespace { .. }));
        assert_eq!(reg.namespace("docker").unwrap().commands[0].name, "up");
        let code = reg.dispatch("docker", &[], &PluginContext::default()).unwrap();
        assert_eq!(code, 3);
    }

    #[test]
    fn builtin_collision_is_a_load_error() {
        let mut reg = registry();
        reg.discover(&[&ListDiscovery::new(vec![found(
            "status",
            StaticPlugin::new(&[], 0),
        )])]);
        let errors = reg.load_all();
        assert_eq!(
            errors,
            vec![PluginLoadError::CollidesWithBuiltin {
                namespace: "status".to_string()
            }]
        );
        assert!(!reg.contains("status"));
    }

    #[test]
    fn unresolved_entries_are_reported_not_omitted() {
        let mut reg = registry();
        let listed = reg.discover(&[&ListDiscovery::new(vec![Discovered {
            namespace: "ghost".to_string(),
            source: "/nowhere/ek-ghost".to_string(),
            entry: EntryRef::Unresolved("not executable".to_string()),
        }])]);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state().label(), "failed");
        assert!(matches!(
            reg.load(0),
            Err(PluginLoadError::EntryUnresolved { .. })
        ));
    }

    #[test]
    fn load_is_idempotent() {
        let plugin = StaticPlugin::new(&["up"], 0);
        let calls = plugin.registrations.clone();
        let mut reg = registry();
        reg.discover(&[&ListDiscovery::new(vec![found("docker", plugin)])]);
        reg.load(0).unwrap();
        let ns = reg.load(0).unwrap();
        assert_eq!(ns.name, "docker");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn registration_failure_is_recorded() {
        let mut plugin = StaticPlugin::new(&[], 0);
        plugin.fail_register = true;
        let mut reg = registry();
        reg.discover(&[&ListDiscovery::new(vec![found("k8s", plugin)])]);
        let errors = reg.load_all();
        assert!(matches!(errors[0], PluginLoadError::Registration { .. }));
        assert!(matches!(reg.descriptors()[0].state(), PluginState::Failed(_)));
        assert!(matches!(
            reg.dispatch("k8s", &[], &PluginContext::default()),
            Err(PluginDispatchError::NotLoaded(_))
        ));
    }

    #[test]
    fn handle_rejects_duplicate_subcommands() {
        let mut handle = NamespaceHandle::new("x");
        handle.command("a", "").unwrap();
        assert!(handle.command("a", "").is_err());
        assert!(handle.command(" ", "").is_err());
    }
}
