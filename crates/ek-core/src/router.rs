//! Head-token routing.
//!
//! Precedence is fixed: builtin verb, then plugin namespace, then task name.
//! Anything else is unresolved; there is no prefix or fuzzy matching.

use crate::plugin::PluginRegistry;
use std::collections::BTreeSet;

/// Head token plus the remaining argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub head: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// `None` when there is nothing to route: no arguments, or a leading
    /// option such as `--help`.
    pub fn from_args(args: &[String]) -> Option<Self> {
        let (head, rest) = args.split_first()?;
        if head.is_empty() || head.starts_with('-') {
            return None;
        }
        Some(Self {
            head: head.clone(),
            args: rest.to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    Builtin(String),
    Plugin { namespace: String, args: Vec<String> },
    Task { name: String, args: Vec<String> },
    Unresolved(String),
}

/// Answers "is this a task name?". Implementations may load lazily; the
/// router only asks after builtins and plugins have been ruled out.
pub trait TaskCatalog {
    fn has_task(&self, name: &str) -> bool;
}

/// Receives the classified target.
pub trait Dispatcher {
    type Output;

    fn builtin(&mut self, verb: &str, inv: &Invocation) -> Self::Output;
    fn plugin(&mut self, namespace: &str, args: &[String]) -> Self::Output;
    fn task(&mut self, name: &str, args: &[String]) -> Self::Output;
    fn unresolved(&mut self, head: &str) -> Self::Output;
}

pub struct CommandRouter<'a> {
    builtins: &'a BTreeSet<String>,
    plugins: &'a PluginRegistry,
}

impl<'a> CommandRouter<'a> {
    pub fn new(builtins: &'a BTreeSet<String>, plugins: &'a PluginRegistry) -> Self {
        Self { builtins, plugins }
    }

    pub fn classify(&self, inv: &Invocation, catalog: &dyn TaskCatalog) -> DispatchTarget {
        let head = inv.head.as_str();
        if self.builtins.contains(head) {
            DispatchTarget::Builtin(head.to_string())
        } else if self.plugins.contains(head) {
            DispatchTarget::Plugin {
                namespace: head.to_string(),
                args: inv.args.clone(),
            }
        } else if catalog.has_task(head) {
            DispatchTarget::Task {
                name: head.to_string(),
                args: inv.args.clone(),
            }
        } else {
            DispatchTarget::Unresolved(head.to_string())
        }
    }

    pub fn route<D: Dispatcher>(&self, inv: &Invocation, catalog: &dyn TaskCatalog, dispatcher: &mut D) -> D::Output {
        let target = self.classify(inv, catalog);
        tracing::debug!(head = %inv.head, ?target, "routed");
        match &target {
            DispatchTarget::Builtin(verb) => dispatcher.builtin(verb, inv),
            DispatchTarget::Plugin { namespace, args } => dispatcher.plugin(namespace, args),
            DispatchTarget::Task { name, args } => dispatcher.task(name, args),
            DispatchTarget::Unresolved(head) => dispatcher.unresolved(head),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::testing::{found, ListDiscovery, StaticPlugin};
    use std::cell::Cell;

    struct Tasks(&'static [&'static str], Cell<u32>);

    impl TaskCatalog for Tasks {
        fn has_task(&self, name: &str) -> bool {
            self.1.set(self.1.get() + 1);
            self.0.contains(&name)
        }
    }

    fn tasks(names: &'static [&'static str]) -> Tasks {
        Tasks(names, Cell::new(0))
    }

    fn builtins() -> BTreeSet<String> {
        ["add", "list", "status", "run", "help"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn plugins(builtins: &BTreeSet<String>, namespaces: &[&str]) -> PluginRegistry {
        let mut reg = PluginRegistry::new(builtins.iter().cloned());
        let items = namespaces
            .iter()
            .map(|ns| found(ns, StaticPlugin::new(&[], 0)))
            .collect();
        reg.discover(&[&ListDiscovery::new(items)]);
        reg.load_all();
        reg
    }

    fn inv(parts: &[&str]) -> Invocation {
        let args: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
        Invocation::from_args(&args).unwrap()
    }

    #[test]
    fn from_args_skips_empty_and_options() {
        assert!(Invocation::from_args(&[]).is_none());
        assert!(Invocation::from_args(&["--help".to_string()]).is_none());
        let i = inv(&["build", "--release", "x"]);
        assert_eq!(i.head, "build");
        assert_eq!(i.args, ["--release", "x"]);
    }

    #[test]
    fn builtin_wins_over_task_and_never_consults_catalog() {
        let b = builtins();
        let reg = plugins(&b, &[]);
        let catalog = tasks(&["status"]);
        let target = CommandRouter::new(&b, &reg).classify(&inv(&["status"]), &catalog);
        assert_eq!(target, DispatchTarget::Builtin("status".to_string()));
        assert_eq!(catalog.1.get(), 0);
    }

    #[test]
    fn plugin_wins_over_task() {
        let b = builtins();
        let reg = plugins(&b, &["docker"]);
        let target = CommandRouter::new(&b, &reg)
            .classify(&inv(&["docker", "up", "-d"]), &tasks(&["docker"]));
        assert_eq!(
            target,
            DispatchTarget::Plugin {
                namespace: "docker".to_string(),
                args: vec!["up".to_string(), "-d".to_string()],
            }
        );
    }

    #[test]
    fn task_shorthand_keeps_args() {
        let b = builtins();
        let reg = plugins(&b, &[]);
        let target = CommandRouter::new(&b, &reg).classify(&inv(&["build", "--fast"]), &tasks(&["build"]));
        assert_eq!(
            target,
            DispatchTarget::Task {
                name: "build".to_string(),
                args: vec!["--fast".to_string()],
            }
        );
    }

    #[test]
    fn no_prefix_matching() {
        let b = builtins();
        let reg = plugins(&b, &["docker"]);
        let router = CommandRouter::new(&b, &reg);
        for head in ["stat", "dock", "buil", "Build"] {
            assert_eq!(
                router.classify(&inv(&[head]), &tasks(&["build"])),
                DispatchTarget::Unresolved(head.to_string())
            );
        }
    }

    #[test]
    fn route_delegates_to_dispatcher() {
        struct Recorder;
        impl Dispatcher for Recorder {
            type Output = String;
            fn builtin(&mut self, verb: &str, _inv: &Invocation) -> String {
                format!("builtin:{verb}")
            }
            fn plugin(&mut self, namespace: &str, args: &[String]) -> String {
                format!("plugin:{namespace}:{}", args.join(","))
            }
            fn task(&mut self, name: &str, args: &[String]) -> String {
                format!("task:{name}:{}", args.join(","))
            }
            fn unresolved(&mut self, head: &str) -> String {
                format!("unresolved:{head}")
            }
        }

        let b = builtins();
        let reg = plugins(&b, &["docker"]);
        let router = CommandRouter::new(&b, &reg);
        let catalog = tasks(&["test"]);
        assert_eq!(router.route(&inv(&["run", "list"]), &catalog, &mut Recorder), "builtin:run");
        assert_eq!(router.route(&inv(&["docker", "up"]), &catalog, &mut Recorder), "plugin:docker:up");
        assert_eq!(router.route(&inv(&["test", "-k", "x"]), &catalog, &mut Recorder), "task:test:-k,x");
        assert_eq!(router.route(&inv(&["nope"]), &catalog, &mut Recorder), "unresolved:nope");
    }
}
