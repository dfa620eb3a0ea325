//! The binding graph between tables and sinks.
//!
//! A binding is one labeled edge in a many-to-many relation. It is stored
//! once in each endpoint's adjacency list and remembers its slot in both, so
//! tearing an edge down is constant time from either side. Dropping either
//! endpoint dissolves all of its incident edges; the other endpoint's list
//! is updated in place.
//!
//! Removed slots become tombstones (the same scheme the column tree uses
//! for removed children), which keeps every surviving binding's slot
//! stable.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::sink::Sink;
use crate::table::Table;
use crate::tree::{Item, Node, NodeKind};

/// An edge between a table and a sink, carrying an enable flag.
///
/// Disabled bindings still take part in `prolog` and `epilog`, but are
/// skipped when rows are emitted.
pub struct Binding {
    pub(crate) table: Weak<Node>,
    pub(crate) sink: Weak<Sink>,
    enabled: Cell<bool>,
    table_slot: Cell<usize>,
    sink_slot: Cell<usize>,
}

/// Adjacency list held by each endpoint of the relation.
pub(crate) type BindingList = RefCell<Vec<Option<Rc<Binding>>>>;

impl Binding {
    /// Whether rows are forwarded over this edge.
    pub fn enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Enable or disable row forwarding over this edge.
    pub fn set_enabled(&self, on: bool) {
        self.enabled.set(on);
    }

    /// The table endpoint, if it is still alive.
    pub fn table(&self) -> Option<Table> {
        let node = self.table.upgrade()?;
        Item { node }.as_table()
    }

    /// The sink endpoint, if it is still alive.
    pub fn sink(&self) -> Option<Rc<Sink>> {
        self.sink.upgrade()
    }
}

/// Create an edge, or return the existing one for the same pair.
pub(crate) fn bind(table: &Table, sink: &Rc<Sink>) -> Rc<Binding> {
    if let Some(existing) = find_by_sink(&table.core().bindings, sink) {
        return existing;
    }
    let binding = Rc::new(Binding {
        table: Rc::downgrade(&table.item.node),
        sink: Rc::downgrade(sink),
        enabled: Cell::new(true),
        table_slot: Cell::new(0),
        sink_slot: Cell::new(0),
    });
    binding
        .table_slot
        .set(push_slot(&table.core().bindings, &binding));
    binding.sink_slot.set(push_slot(&sink.bindings, &binding));
    binding
}

/// Tear the edge out of both adjacency lists.
pub(crate) fn dissolve(binding: &Rc<Binding>) {
    detach_from_table(binding);
    detach_from_sink(binding);
}

pub(crate) fn detach_from_table(binding: &Rc<Binding>) {
    if let Some(node) = binding.table.upgrade() {
        if let NodeKind::Table(core) = &node.kind {
            clear_slot(&core.bindings, binding.table_slot.get());
        }
    }
}

pub(crate) fn detach_from_sink(binding: &Rc<Binding>) {
    if let Some(sink) = binding.sink.upgrade() {
        clear_slot(&sink.bindings, binding.sink_slot.get());
    }
}

pub(crate) fn find_by_sink(list: &BindingList, sink: &Rc<Sink>) -> Option<Rc<Binding>> {
    let target = Rc::downgrade(sink);
    list.borrow()
        .iter()
        .flatten()
        .find(|b| Weak::ptr_eq(&b.sink, &target))
        .cloned()
}

pub(crate) fn find_by_table(list: &BindingList, table: &Table) -> Option<Rc<Binding>> {
    let target = Rc::downgrade(&table.item.node);
    list.borrow()
        .iter()
        .flatten()
        .find(|b| Weak::ptr_eq(&b.table, &target))
        .cloned()
}

/// The live bindings in slot order.
pub(crate) fn snapshot(list: &BindingList) -> Vec<Rc<Binding>> {
    list.borrow().iter().flatten().cloned().collect()
}

fn push_slot(list: &BindingList, binding: &Rc<Binding>) -> usize {
    let mut slots = list.borrow_mut();
    slots.push(Some(Rc::clone(binding)));
    slots.len() - 1
}

fn clear_slot(list: &BindingList, slot: usize) {
    let mut slots = list.borrow_mut();
    if let Some(entry) = slots.get_mut(slot) {
        *entry = None;
    }
    while matches!(slots.last(), Some(None)) {
        slots.pop();
    }
}
