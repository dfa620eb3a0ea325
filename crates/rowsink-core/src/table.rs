//! Tables: the emission roots of the column hierarchy.
//!
//! A table is a column group with a name that is unique among live tables,
//! an advisory flavor, an enabled flag, and a cached flat vector of its
//! descendant columns. It drives the three-phase emission protocol against
//! every sink bound to it:
//!
//! - `prolog` compacts the tree, hands every binding's sink a chance to
//!   prepare (headers, dataset creation), and locks the table;
//! - `emit_row` forwards the current column values over every *enabled*
//!   binding, in binding order;
//! - `epilog` unlocks the table and lets every sink conclude.
//!
//! While locked, the shape of the table's subtree is frozen: adds, removes,
//! binds, and unbinds all fail until `epilog` runs.

pub mod registry;
pub mod schema;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use snafu::prelude::*;

use crate::binding::{self, Binding, BindingList};
use crate::column::ScalarValue;
use crate::sink::{Sink, SinkError};
use crate::tree::{
    self, Column, GroupData, Item, NodeKind, TreeError,
};

/// Advisory tag distinguishing result tables from time-series tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFlavor {
    /// A table of results reported after a run.
    Results,
    /// A table of data collected while a run progresses.
    TimeSeries,
}

/// Errors raised by table operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// Another live table already uses this name.
    #[snafu(display("a table named {name:?} is already registered"))]
    DuplicateTable {
        /// The colliding table name.
        name: String,
    },

    /// Structural errors from the column hierarchy.
    #[snafu(transparent)]
    Tree {
        /// The underlying hierarchy error.
        source: TreeError,
    },

    /// `emit_row` was called outside the `prolog`..`epilog` window.
    #[snafu(display("emit_row on table {table:?} before prolog"))]
    EmitUnlocked {
        /// Name of the table that was not locked.
        table: String,
    },

    /// A path resolved to an item that is not a basic column.
    #[snafu(display("item at {path:?} in table {table:?} is not a column"))]
    NotAColumn {
        /// Name of the table the lookup ran on.
        table: String,
        /// The path that resolved to a non-column item.
        path: String,
    },

    /// A bound sink failed during one of the emission phases.
    #[snafu(display("sink failed during {stage} for table {table:?}: {source}"))]
    Sink {
        /// Name of the emitting table.
        table: String,
        /// The emission phase that failed.
        stage: &'static str,
        /// The underlying sink error.
        source: SinkError,
    },

    /// Serializing the schema document failed.
    #[snafu(display("failed to serialize schema for table {table:?}: {source}"))]
    SchemaJson {
        /// Name of the table being described.
        table: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

pub(crate) struct TableCore {
    pub(crate) group: GroupData,
    pub(crate) flavor: TableFlavor,
    pub(crate) enabled: Cell<bool>,
    pub(crate) locked: Cell<bool>,
    pub(crate) dirty_columns: Cell<bool>,
    pub(crate) columns: RefCell<Vec<Column>>,
    pub(crate) bindings: BindingList,
}

impl TableCore {
    fn new(flavor: TableFlavor) -> TableCore {
        TableCore {
            group: GroupData::default(),
            flavor,
            enabled: Cell::new(true),
            locked: Cell::new(false),
            dirty_columns: Cell::new(false),
            columns: RefCell::new(Vec::new()),
            bindings: RefCell::new(Vec::new()),
        }
    }
}

/// A handle to an output table.
#[derive(Clone)]
pub struct Table {
    pub(crate) item: Item,
}

impl Table {
    /// Create a table with the given flavor and register its name.
    ///
    /// Fails when the name is empty or another live table already uses it.
    pub fn new(name: &str, flavor: TableFlavor) -> Result<Table, TableError> {
        let node = tree::new_node(name, NodeKind::Table(TableCore::new(flavor)))?;
        registry::register(name, &node)?;
        Ok(Table {
            item: Item { node },
        })
    }

    /// Create a results table.
    pub fn results(name: &str) -> Result<Table, TableError> {
        Table::new(name, TableFlavor::Results)
    }

    /// Create a time-series table whose first column, `time`, is computed
    /// by the caller-supplied clock at every emission.
    pub fn time_series<T, F>(name: &str, time_format: &str, clock: F) -> Result<Table, TableError>
    where
        T: ScalarValue,
        F: Fn() -> T + 'static,
    {
        let table = Table::new(name, TableFlavor::TimeSeries)?;
        let time = Column::computed("time", time_format, clock)?;
        table.add_item(&time)?;
        Ok(table)
    }

    /// A time-series table stamped with wall-clock microseconds since the
    /// Unix epoch.
    pub fn time_series_wall_clock(name: &str) -> Result<Table, TableError> {
        Table::time_series(name, "%d", || chrono::Utc::now().timestamp_micros())
    }

    /// Look up a live table by name.
    pub fn get(name: &str) -> Option<Table> {
        registry::lookup(name)
    }

    /// All live tables, in no particular order.
    pub fn all() -> Vec<Table> {
        registry::all()
    }

    pub(crate) fn core(&self) -> &TableCore {
        match &self.item.node.kind {
            NodeKind::Table(core) => core,
            // Table handles are only ever constructed over table nodes.
            _ => unreachable!("table handle over a non-table node"),
        }
    }

    /// The table flavor.
    pub fn flavor(&self) -> TableFlavor {
        self.core().flavor
    }

    /// Whether `emit_row` forwards anything at all.
    pub fn enabled(&self) -> bool {
        self.core().enabled.get()
    }

    /// Enable or disable the whole table.
    pub fn set_enabled(&self, on: bool) {
        self.core().enabled.set(on);
    }

    /// True between `prolog` and `epilog`.
    pub fn is_locked(&self) -> bool {
        self.core().locked.get()
    }

    fn cleanup(&self) {
        let core = self.core();
        if core.group.dirty.get() {
            tree::cleanup_group(&self.item.node);
        }
        if core.dirty_columns.get() {
            let mut columns = Vec::new();
            self.item.visit(&mut |item| {
                if let Some(col) = item.as_column() {
                    columns.push(col);
                }
            });
            *core.columns.borrow_mut() = columns;
            core.dirty_columns.set(false);
        }
    }

    /// Number of descendant columns, after compaction.
    pub fn size(&self) -> usize {
        self.cleanup();
        self.core().columns.borrow().len()
    }

    /// The flat vector of descendant columns in pre-order.
    pub fn columns(&self) -> Vec<Column> {
        self.cleanup();
        self.core().columns.borrow().clone()
    }

    /// Column by position in the flat vector.
    pub fn column_at(&self, index: usize) -> Option<Column> {
        self.cleanup();
        self.core().columns.borrow().get(index).cloned()
    }

    /// Column by `/`-separated path. Fails when the path resolves to a
    /// group instead of a column.
    pub fn column(&self, path: &str) -> Result<Column, TableError> {
        let item = self.get_item(path)?;
        item.as_column().context(NotAColumnSnafu {
            table: self.name(),
            path,
        })
    }

    /// Add a free-standing item as the last child of this table.
    pub fn add_item<I: Into<Item>>(&self, item: I) -> Result<(), TreeError> {
        tree::add_child(&self.item.node, &item.into().node)
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

    /// Detach a child from this table.
    pub fn remove_item<I: Into<Item>>(&self, item: I) -> Result<(), TreeError> {
        tree::remove_child(&self.item.node, &item.into().node)
    }

    /// Resolve a `/`-separated path to a descendant item.
    pub fn get_item(&self, path: &str) -> Result<Item, TreeError> {
        tree::get_item_at(&self.item.node, path)
    }

    /// The (compacted) children of this table, in insertion order.
    pub fn items(&self) -> Vec<Item> {
        tree::items_of(&self.item.node)
    }

    /// Bind this table to a sink. Binding an already-bound pair returns
    /// the existing edge.
    pub fn bind(&self, sink: &Rc<Sink>) -> Result<Rc<Binding>, TableError> {
        tree::check_unlocked(&self.item.node)?;
        Ok(binding::bind(self, sink))
    }

    /// Unbind this table from a sink. Returns whether a binding existed.
    pub fn unbind(&self, sink: &Rc<Sink>) -> Result<bool, TableError> {
        tree::check_unlocked(&self.item.node)?;
        let found = binding::find_by_sink(&self.core().bindings, sink);
        let was_bound = found.is_some();
        if let Some(b) = found {
            binding::dissolve(&b);
        }
        Ok(was_bound)
    }

    /// Dissolve every binding of this table.
    pub fn unbind_all(&self) -> Result<(), TableError> {
        tree::check_unlocked(&self.item.node)?;
        for b in binding::snapshot(&self.core().bindings) {
            binding::dissolve(&b);
        }
        Ok(())
    }

    /// The live bindings of this table, in binding order.
    pub fn bindings(&self) -> Vec<Rc<Binding>> {
        binding::snapshot(&self.core().bindings)
    }

    /// Enter output mode: compact the tree, let every bound sink prepare
    /// (enabled or not), and lock the table.
    pub fn prolog(&self) -> Result<(), TableError> {
        self.cleanup();
        let core = self.core();
        for b in binding::snapshot(&core.bindings) {
            let Some(sink) = b.sink() else { continue };
            sink.output_prolog(self).context(SinkSnafu {
                table: self.name(),
                stage: "prolog",
            })?;
        }
        core.locked.set(true);
        Ok(())
    }

    /// Emit one row of the current column values to every enabled binding.
    ///
    /// Fails when called before `prolog`. Does nothing when the table has
    /// no bindings or is disabled.
    pub fn emit_row(&self) -> Result<(), TableError> {
        let core = self.core();
        ensure!(
            core.locked.get(),
            EmitUnlockedSnafu { table: self.name() }
        );
        let bindings = binding::snapshot(&core.bindings);
        if bindings.is_empty() || !core.enabled.get() {
            return Ok(());
        }
        for b in bindings {
            if !b.enabled() {
                continue;
            }
            let Some(sink) = b.sink() else { continue };
            sink.output_row(self).context(SinkSnafu {
                table: self.name(),
                stage: "row",
            })?;
        }
        Ok(())
    }

    /// Leave output mode: unlock the table and let every bound sink
    /// conclude (enabled or not).
    pub fn epilog(&self) -> Result<(), TableError> {
        let core = self.core();
        core.locked.set(false);
        for b in binding::snapshot(&core.bindings) {
            let Some(sink) = b.sink() else { continue };
            sink.output_epilog(self).context(SinkSnafu {
                table: self.name(),
                stage: "epilog",
            })?;
        }
        Ok(())
    }

    /// Describe the table's column layout as a schema document.
    pub fn schema(&self) -> schema::TableSchema {
        schema::TableSchema::describe(self)
    }

    /// Serialize the schema document as pretty JSON.
    pub fn write_schema(&self, out: &mut dyn std::io::Write) -> Result<(), TableError> {
        serde_json::to_writer_pretty(out, &self.schema()).context(SchemaJsonSnafu {
            table: self.name(),
        })
    }
}
