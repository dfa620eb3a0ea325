//! # rowsink
//!
//! Row-oriented tabular output from a running program to any number of
//! heterogeneous sinks at once: declare tables of live columns, bind them
//! to CSV or binary record sinks, and emit rows as your program runs.
//!
//! This crate is the supported public entry point and re-exports the
//! stable surface of `rowsink-core`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rowsink::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let table = Table::results("latency")?;
//! table.add_item(Column::value("rtt_us", "%d", 0i64)?)?;
//!
//! let sink = open_url("file:latency.csv?format=csvtab")?;
//! table.bind(&sink)?;
//!
//! table.prolog()?;
//! table.column("rtt_us")?.set_number(180.0)?;
//! table.emit_row()?;
//! table.epilog()?;
//! # Ok(())
//! # }
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Record store namespace (wrapper-only).
pub mod record {
    pub use rowsink_core::record::sink::RecordSink;
    pub use rowsink_core::record::store::{Dataset, StoreLocation};
    pub use rowsink_core::record::{NativeType, RecordError, RecordLayout};
}

pub use rowsink_core::{
    open_url, Binding, Column, ColumnError, ColumnSchema, ColumnType, Group, Item, MemoryBuffer,
    OpenMode, ProgressBar, Scalar, ScalarKind, Sink, SinkBackend, SinkError, Table, TableError,
    TableFlavor, TableSchema, TextFormat, TextSink, TreeError, UrlError,
};
