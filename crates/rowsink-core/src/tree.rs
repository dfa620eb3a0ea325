//! The named hierarchy of columns, groups, and tables.
//!
//! Items are reference-counted nodes with weak parent back-references, so a
//! node never moves once created and back-references stay sound. Groups keep
//! their children in insertion order; removal just nulls the child's slot
//! and marks the group dirty, and a later lazy compaction pass
//! (`cleanup`) shifts survivors left and renumbers their indices. This
//! makes removal O(1) at the price of an O(n) pass before the next
//! iteration-shaped read.
//!
//! Invariants maintained between operations:
//! - a child's recorded parent is the group that contains it, and its
//!   recorded index is its position among the (possibly sparse) children;
//! - sibling names are unique within a group;
//! - while the owning table is locked, the shape of its subtree is frozen.
//!
//! Handles ([`Item`], [`Group`], [`Column`], `Table`) are cheap clones of
//! the underlying node and are not sendable across threads.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use snafu::prelude::*;

use crate::column::ColumnData;
use crate::table::{Table, TableCore};

/// Errors raised by structural operations on the column hierarchy.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TreeError {
    /// Items must have a non-empty name.
    #[snafu(display("column items cannot have an empty name"))]
    EmptyName,

    /// A sibling with the same name already exists.
    #[snafu(display("an item named {name:?} already exists in group {group:?}"))]
    DuplicateName {
        /// The colliding name.
        name: String,
        /// The group that already has a child by this name.
        group: String,
    },

    /// The item already belongs to a group and must be detached first.
    #[snafu(display("item {name:?} is already attached to a group"))]
    AlreadyAttached {
        /// Name of the already-attached item.
        name: String,
    },

    /// Tables are emission roots and can never be added as children.
    #[snafu(display("table {name:?} cannot be added as a child item"))]
    TableAsChild {
        /// Name of the table that was offered as a child.
        name: String,
    },

    /// The item is not a child of this group.
    #[snafu(display("item {name:?} is not a child of group {group:?}"))]
    NotAChild {
        /// Name of the item that was offered for removal.
        name: String,
        /// Name of the group it does not belong to.
        group: String,
    },

    /// The owning table is locked, so its subtree cannot be modified.
    #[snafu(display("table {table:?} is locked; its column tree cannot be modified"))]
    TableLocked {
        /// Name of the locked owning table.
        table: String,
    },

    /// A path component did not resolve to a child.
    #[snafu(display("no item at path {path:?}: component {component:?} not found"))]
    PathNotFound {
        /// The full path being resolved.
        path: String,
        /// The component that failed to resolve.
        component: String,
    },

    /// A path descended into an item that is not a group.
    #[snafu(display("path {path:?} descends into non-group item {component:?}"))]
    NotAGroup {
        /// The full path being resolved.
        path: String,
        /// The non-group item the path tried to descend into.
        component: String,
    },
}

pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) parent: RefCell<Option<Weak<Node>>>,
    pub(crate) index: Cell<usize>,
    pub(crate) kind: NodeKind,
}

pub(crate) enum NodeKind {
    Column(ColumnData),
    Group(GroupData),
    Table(TableCore),
}

#[derive(Default)]
pub(crate) struct GroupData {
    pub(crate) children: RefCell<Vec<Option<Rc<Node>>>>,
    pub(crate) names: RefCell<HashMap<String, Rc<Node>>>,
    pub(crate) dirty: Cell<bool>,
}

impl Node {
    pub(crate) fn group_data(&self) -> Option<&GroupData> {
        match &self.kind {
            NodeKind::Group(g) => Some(g),
            NodeKind::Table(t) => Some(&t.group),
            NodeKind::Column(_) => None,
        }
    }

    pub(crate) fn is_table(&self) -> bool {
        matches!(self.kind, NodeKind::Table(_))
    }

    pub(crate) fn parent_node(&self) -> Option<Rc<Node>> {
        self.parent.borrow().as_ref().and_then(Weak::upgrade)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let NodeKind::Table(core) = &self.kind {
            // Dissolve every remaining binding from the sink side; our own
            // side is being dropped with the node.
            let bindings: Vec<_> = core.bindings.borrow().iter().flatten().cloned().collect();
            for b in &bindings {
                crate::binding::detach_from_sink(b);
            }
            core.bindings.borrow_mut().clear();
            crate::table::registry::forget(&self.name, self as *const Node);
        }
    }
}

pub(crate) fn new_node(name: &str, kind: NodeKind) -> Result<Rc<Node>, TreeError> {
    ensure!(!name.is_empty(), EmptyNameSnafu);
    Ok(Rc::new(Node {
        name: name.to_string(),
        parent: RefCell::new(None),
        index: Cell::new(0),
        kind,
    }))
}

/// The table that owns `node`, if any. A table owns itself.
pub(crate) fn owning_table(node: &Rc<Node>) -> Option<Rc<Node>> {
    let mut cur = Rc::clone(node);
    loop {
        if cur.is_table() {
            return Some(cur);
        }
        cur = cur.parent_node()?;
    }
}

/// Fail when the table owning `node` is locked.
pub(crate) fn check_unlocked(node: &Rc<Node>) -> Result<(), TreeError> {
    if let Some(table) = owning_table(node) {
        if let NodeKind::Table(core) = &table.kind {
            ensure!(
                !core.locked.get(),
                TableLockedSnafu { table: &table.name }
            );
        }
    }
    Ok(())
}

fn mark_dirty(node: &Rc<Node>) {
    let Some(g) = node.group_data() else { return };
    if g.dirty.get() {
        return;
    }
    g.dirty.set(true);
    if let Some(parent) = node.parent_node() {
        mark_dirty(&parent);
    }
}

fn mark_dirty_columns(node: &Rc<Node>) {
    if let Some(table) = owning_table(node) {
        if let NodeKind::Table(core) = &table.kind {
            core.dirty_columns.set(true);
        }
    }
}

pub(crate) fn add_child(parent: &Rc<Node>, child: &Rc<Node>) -> Result<(), TreeError> {
    if child.is_table() {
        return TableAsChildSnafu { name: &child.name }.fail();
    }
    check_unlocked(parent)?;
    if child.parent_node().is_some() {
        return AlreadyAttachedSnafu { name: &child.name }.fail();
    }
    let Some(g) = parent.group_data() else {
        return NotAGroupSnafu {
            path: &parent.name,
            component: &parent.name,
        }
        .fail();
    };
    ensure!(
        !g.names.borrow().contains_key(&child.name),
        DuplicateNameSnafu {
            name: &child.name,
            group: &parent.name,
        }
    );

    let mut children = g.children.borrow_mut();
    child.index.set(children.len());
    *child.parent.borrow_mut() = Some(Rc::downgrade(parent));
    children.push(Some(Rc::clone(child)));
    drop(children);
    g.names
        .borrow_mut()
        .insert(child.name.clone(), Rc::clone(child));
    mark_dirty_columns(parent);
    Ok(())
}

pub(crate) fn remove_child(parent: &Rc<Node>, child: &Rc<Node>) -> Result<(), TreeError> {
    check_unlocked(parent)?;
    let belongs = child
        .parent_node()
        .map(|p| Rc::ptr_eq(&p, parent))
        .unwrap_or(false);
    ensure!(
        belongs,
        NotAChildSnafu {
            name: &child.name,
            group: &parent.name,
        }
    );
    let Some(g) = parent.group_data() else {
        return NotAChildSnafu {
            name: &child.name,
            group: &parent.name,
        }
        .fail();
    };

    // Null the slot; indices of the remaining siblings are preserved and
    // the sparse tail is reclaimed by the next cleanup pass.
    let mut children = g.children.borrow_mut();
    let idx = child.index.get();
    if let Some(slot) = children.get_mut(idx) {
        *slot = None;
    }
    drop(children);
    g.names.borrow_mut().remove(&child.name);
    *child.parent.borrow_mut() = None;
    mark_dirty(parent);
    mark_dirty_columns(parent);
    Ok(())
}

/// Compact the children of `node`, renumber survivors, and recurse into
/// surviving groups. A no-op on clean groups.
pub(crate) fn cleanup_group(node: &Rc<Node>) {
    let Some(g) = node.group_data() else { return };
    if !g.dirty.get() {
        return;
    }
    let mut groups = Vec::new();
    let mut children = g.children.borrow_mut();
    let mut pos = 0;
    for i in 0..children.len() {
        let Some(child) = children[i].take() else {
            continue;
        };
        child.index.set(pos);
        if child.group_data().is_some() {
            groups.push(Rc::clone(&child));
        }
        children[pos] = Some(child);
        pos += 1;
    }
    children.truncate(pos);
    drop(children);
    g.dirty.set(false);
    for child in &groups {
        cleanup_group(child);
    }
}

pub(crate) fn visit_node(node: &Rc<Node>, f: &mut dyn FnMut(&Item)) {
    f(&Item {
        node: Rc::clone(node),
    });
    if let Some(g) = node.group_data() {
        let children: Vec<_> = g.children.borrow().iter().flatten().cloned().collect();
        for child in &children {
            visit_node(child, f);
        }
    }
}

pub(crate) fn get_item_at(root: &Rc<Node>, path: &str) -> Result<Item, TreeError> {
    let mut cur = Rc::clone(root);
    for component in path.split('/') {
        let Some(g) = cur.group_data() else {
            return NotAGroupSnafu {
                path,
                component: &cur.name,
            }
            .fail();
        };
        let child = g.names.borrow().get(component).cloned();
        match child {
            Some(c) => cur = c,
            None => return PathNotFoundSnafu { path, component }.fail(),
        }
    }
    Ok(Item { node: cur })
}

pub(crate) fn items_of(node: &Rc<Node>) -> Vec<Item> {
    cleanup_group(node);
    match node.group_data() {
        Some(g) => g
            .children
            .borrow()
            .iter()
            .flatten()
            .map(|n| Item {
                node: Rc::clone(n),
            })
            .collect(),
        None => Vec::new(),
    }
}

/// A handle to any node in the column hierarchy.
#[derive(Clone)]
pub struct Item {
    pub(crate) node: Rc<Node>,
}

impl Item {
    /// The item's name.
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// The item's index within its parent's children.
    pub fn index(&self) -> usize {
        self.node.index.get()
    }

    /// The parent group, if the item is attached.
    pub fn parent(&self) -> Option<Item> {
        self.node.parent_node().map(|node| Item { node })
    }

    /// The table that owns this item, if any. A table owns itself.
    pub fn owning_table(&self) -> Option<Table> {
        owning_table(&self.node).map(|node| Table {
            item: Item { node },
        })
    }

    /// The names of this item and its ancestors joined by `sep`, stopping
    /// just below the owning table.
    pub fn path_name(&self, sep: &str) -> String {
        let mut parts = vec![self.node.name.clone()];
        let mut cur = Rc::clone(&self.node);
        loop {
            let Some(parent) = cur.parent_node() else {
                break;
            };
            if parent.is_table() {
                break;
            }
            parts.push(parent.name.clone());
            cur = parent;
        }
        parts.reverse();
        parts.join(sep)
    }

    /// True when this item is a basic column.
    pub fn is_column(&self) -> bool {
        matches!(self.node.kind, NodeKind::Column(_))
    }

    /// True when this item is a plain group (not a table).
    pub fn is_group(&self) -> bool {
        matches!(self.node.kind, NodeKind::Group(_))
    }

    /// True when this item is a table.
    pub fn is_table(&self) -> bool {
        self.node.is_table()
    }

    /// View this item as a column handle.
    pub fn as_column(&self) -> Option<Column> {
        self.is_column().then(|| Column { item: self.clone() })
    }

    /// View this item as a group handle.
    pub fn as_group(&self) -> Option<Group> {
        self.is_group().then(|| Group { item: self.clone() })
    }

    /// View this item as a table handle.
    pub fn as_table(&self) -> Option<Table> {
        self.is_table().then(|| Table { item: self.clone() })
    }

    /// Visit this item and, pre-order, every descendant.
    ///
    /// The visitor must not change the shape of the subtree while the
    /// traversal runs.
    pub fn visit(&self, f: &mut dyn FnMut(&Item)) {
        visit_node(&self.node, f);
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for Item {}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.node.kind {
            NodeKind::Column(_) => "column",
            NodeKind::Group(_) => "group",
            NodeKind::Table(_) => "table",
        };
        write!(f, "Item({kind} {:?})", self.node.name)
    }
}

macro_rules! impl_handle_common {
    ($ty:ident) => {
        impl std::ops::Deref for $ty {
            type Target = Item;

            fn deref(&self) -> &Item {
                &self.item
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.item == other.item
            }
        }

        impl Eq for $ty {}

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(&self.item, f)
            }
        }

        impl From<&$ty> for Item {
            fn from(h: &$ty) -> Item {
                h.item.clone()
            }
        }

        impl From<$ty> for Item {
            fn from(h: $ty) -> Item {
                h.item
            }
        }
    };
}

/// A handle to a basic column node.
#[derive(Clone)]
pub struct Column {
    pub(crate) item: Item,
}

impl_handle_common!(Column);

/// A handle to a plain group of column items.
#[derive(Clone)]
pub struct Group {
    pub(crate) item: Item,
}

impl_handle_common!(Group);
impl_handle_common!(Table);

impl Group {
    /// Create a free-standing group.
    pub fn new(name: &str) -> Result<Group, TreeError> {
        let node = new_node(name, NodeKind::Group(GroupData::default()))?;
        Ok(Group {
            item: Item { node },
        })
    }

    /// Create a group and attach it to `parent`.
    pub fn new_in(parent: &Group, name: &str) -> Result<Group, TreeError> {
        let group = Group::new(name)?;
        parent.add_item(&group)?;
        Ok(group)
    }

    /// Add a free-standing item as the last child of this group.
    pub fn add_item<I: Into<Item>>(&self, item: I) -> Result<(), TreeError> {
        add_child(&self.item.node, &item.into().node)
    }

    /// Add several items in order.
    pub fn add_items<I>(&self, items: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = Item>,
    {
        for item in items {
            self.add_item(item)?;
        }
        Ok(())
    }

    /// Detach a child from this group. The child keeps existing and can be
    /// attached elsewhere.
    pub fn remove_item<I: Into<Item>>(&self, item: I) -> Result<(), TreeError> {
        remove_child(&self.item.node, &item.into().node)
    }

    /// Resolve a `/`-separated path to a descendant item.
    pub fn get_item(&self, path: &str) -> Result<Item, TreeError> {
        get_item_at(&self.item.node, path)
    }

    /// The (compacted) children of this group, in insertion order.
    pub fn items(&self) -> Vec<Item> {
        items_of(&self.item.node)
    }
}
