#![forbid(unsafe_code)]

use nestree_core::tree::{MovePosition, TreeNode};
use std::collections::HashMap;

use super::TreeStore;

/// Payload handed to event subscribers. The node (and target, when present)
/// are snapshots taken before the structural SQL runs for `moving` and after
/// it for everything else.
pub struct TreeEvent<'a> {
    pub action: &'static str,
    pub node: &'a TreeNode,
    pub target: Option<&'a TreeNode>,
    pub position: Option<MovePosition>,
}

type VetoHandler = Box<dyn Fn(&TreeEvent<'_>) -> bool + Send>;
type NotifyHandler = Box<dyn Fn(&TreeEvent<'_>) + Send>;

/// In-process pub/sub keyed by `"<action>: <table>"`. `moving` is the only
/// haltable signal; everything else is notification-only.
#[derive(Default)]
pub struct TreeEvents {
    veto: HashMap<String, Vec<VetoHandler>>,
    notify: HashMap<String, Vec<NotifyHandler>>,
}

impl TreeEvents {
    pub fn on_until<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&TreeEvent<'_>) -> bool + Send + 'static,
    {
        self.veto.entry(name.into()).or_default().push(Box::new(handler));
    }

    pub fn on<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&TreeEvent<'_>) + Send + 'static,
    {
        self.notify
            .entry(name.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Haltable dispatch: returns `false` as soon as any subscriber vetoes.
    pub fn until(&self, name: &str, event: &TreeEvent<'_>) -> bool {
        let Some(handlers) = self.veto.get(name) else {
            return true;
        };
        handlers.iter().all(|handler| handler(event))
    }

    pub fn dispatch(&self, name: &str, event: &TreeEvent<'_>) {
        if let Some(handlers) = self.notify.get(name) {
            for handler in handlers {
                handler(event);
            }
        }
    }
}

impl std::fmt::Debug for TreeEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TreeEvents(veto={}, notify={})",
            self.veto.values().map(Vec::len).sum::<usize>(),
            self.notify.values().map(Vec::len).sum::<usize>()
        )
    }
}

pub(in crate::store) fn event_name(action: &str, table: &str) -> String {
    format!("{action}: {table}")
}

impl TreeStore {
    /// Register a veto subscriber for the `moving` signal.
    pub fn on_moving<F>(&mut self, handler: F)
    where
        F: Fn(&TreeEvent<'_>) -> bool + Send + 'static,
    {
        let name = event_name("moving", &self.config.table);
        self.events.on_until(name, handler);
    }

    /// Register a notification subscriber for the `moved` signal.
    pub fn on_moved<F>(&mut self, handler: F)
    where
        F: Fn(&TreeEvent<'_>) + Send + 'static,
    {
        let name = event_name("moved", &self.config.table);
        self.events.on(name, handler);
    }

    /// Register a notification subscriber for any lifecycle action.
    pub fn on_event<F>(&mut self, action: &str, handler: F)
    where
        F: Fn(&TreeEvent<'_>) + Send + 'static,
    {
        let name = event_name(action, &self.config.table);
        self.events.on(name, handler);
    }

    pub(in crate::store) fn dispatch_event(
        &self,
        action: &'static str,
        node: &TreeNode,
        target: Option<&TreeNode>,
        position: Option<MovePosition>,
    ) {
        let name = event_name(action, &self.config.table);
        self.events.dispatch(
            &name,
            &TreeEvent {
                action,
                node,
                target,
                position,
            },
        );
    }
}
