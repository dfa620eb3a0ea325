//! The per-thread registry of live table names.
//!
//! Table handles are reference-counted and stay on the thread that created
//! them, so the registry is thread-local: one map per OS thread, created
//! lazily on first registration. A table inserts itself at construction and
//! removes itself when its last handle drops, which keeps the map free of
//! stale names without any explicit teardown call.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use snafu::prelude::*;

use crate::table::{DuplicateTableSnafu, Table, TableError};
use crate::tree::{Item, Node};

thread_local! {
    static REGISTRY: RefCell<HashMap<String, Weak<Node>>> = RefCell::new(HashMap::new());
}

/// Claim `name` for `node`. Fails when another live table holds it.
pub(crate) fn register(name: &str, node: &Rc<Node>) -> Result<(), TableError> {
    REGISTRY.with(|registry| {
        let mut map = registry.borrow_mut();
        if let Some(existing) = map.get(name) {
            ensure!(existing.upgrade().is_none(), DuplicateTableSnafu { name });
        }
        map.insert(name.to_string(), Rc::downgrade(node));
        Ok(())
    })
}

/// Release `name`, but only if it still belongs to the node at `ptr`.
///
/// Called from the node's drop glue, where upgrading is no longer possible;
/// the raw pointer comparison keeps a failed duplicate registration from
/// evicting the table that legitimately owns the name.
pub(crate) fn forget(name: &str, ptr: *const Node) {
    let _ = REGISTRY.try_with(|registry| {
        let mut map = registry.borrow_mut();
        if map.get(name).map(|w| w.as_ptr() == ptr).unwrap_or(false) {
            map.remove(name);
        }
    });
}

/// Look up a live table by name.
pub fn lookup(name: &str) -> Option<Table> {
    REGISTRY.with(|registry| {
        let node = registry.borrow().get(name)?.upgrade()?;
        Some(Table {
            item: Item { node },
        })
    })
}

/// All live tables on this thread, in no particular order.
pub fn all() -> Vec<Table> {
    REGISTRY.with(|registry| {
        registry
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .map(|node| Table {
                item: Item { node },
            })
            .collect()
    })
}
