//! Wrapper prelude.
//!
//! The `rowsink` crate is the supported public entry point. Downstream code
//! should prefer importing from this prelude instead of depending on core
//! module paths.

pub use crate::record;
pub use crate::{
    open_url, Binding, Column, ColumnError, Group, Item, OpenMode, Scalar, ScalarKind, Sink,
    SinkBackend, SinkError, Table, TableError, TableFlavor, TextFormat, TextSink, TreeError,
    UrlError,
};
