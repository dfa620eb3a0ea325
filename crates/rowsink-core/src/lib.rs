//! Core engine for row-oriented tabular output.
//!
//! This crate lets a running program declare *tables* of live *columns* and
//! stream rows of their current values to any number of heterogeneous output
//! sinks at once. Application code mutates column values as it runs; when a
//! row is ready it calls [`Table::emit_row`] and every sink bound to the
//! table serializes the row in its own format.
//!
//! Responsibilities (high level):
//! - Column value carriers: typed cells that hold, observe, or compute one
//!   value and can render it as text or raw bytes ([`column`]).
//! - A named hierarchy of columns and column groups with lazy compaction and
//!   path lookup ([`tree`]).
//! - Tables: the emission roots, with a per-thread name registry, an
//!   editable/locked life cycle, and a schema dump ([`table`]).
//! - The binding graph tying tables to sinks, with symmetric constant-time
//!   teardown from either endpoint ([`binding`]).
//! - The sink contract plus the CSV text sinks and the sink URL factory
//!   ([`sink`]).
//! - The binary record encoder and its directory-backed record store
//!   ([`record`]).
//! - A small terminal progress bar ([`progress`]).
//!
//! The data API is single-threaded and synchronous by design: handles are
//! reference-counted and not sendable across threads, and nothing here
//! suspends or blocks beyond the underlying sink I/O.

pub mod binding;
pub mod column;
pub mod progress;
pub mod record;
pub mod sink;
pub mod table;
pub mod tree;

pub use binding::Binding;
pub use column::{ColumnError, ColumnType, Scalar, ScalarKind, ScalarSource, ScalarValue};
pub use progress::ProgressBar;
pub use record::sink::RecordSink;
pub use record::store::{Dataset, StoreLocation};
pub use record::{NativeType, RecordError, RecordLayout};
pub use sink::text::{MemoryBuffer, TextFormat, TextSink};
pub use sink::url::{parse_url, ParsedUrl, UrlError};
pub use sink::{open_url, OpenMode, Sink, SinkBackend, SinkError};
pub use table::schema::{ColumnSchema, TableSchema};
pub use table::{Table, TableError, TableFlavor};
pub use tree::{Column, Group, Item, TreeError};
