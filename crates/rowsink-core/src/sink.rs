//! The sink contract and the sink URL factory.
//!
//! A sink is anything that can receive the three-phase emission protocol:
//! `prolog` once per table before any rows, `row` once per emitted row, and
//! `epilog` once the table leaves output mode. Concrete sinks implement
//! [`SinkBackend`]; the [`Sink`] wrapper owns the backend together with the
//! sink side of the binding graph, and is shared as `Rc<Sink>` so that
//! bindings can reach it from the table side.
//!
//! Sinks are usually constructed from a URL of the form
//! `scheme:path?option=value,option=value` via [`open_url`].

pub mod text;
pub mod url;

use std::io;
use std::rc::Rc;

use snafu::{prelude::*, Backtrace};

use crate::binding::{self, Binding, BindingList};
use crate::record::sink::RecordSink;
use crate::record::RecordError;
use crate::sink::text::{TextFormat, TextSink};
use crate::sink::url::UrlError;
use crate::table::{Table, TableError};
use crate::tree;

/// How an existing output target is treated when a sink opens it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpenMode {
    /// Discard any existing contents.
    #[default]
    Truncate,
    /// Keep existing contents and continue after them.
    Append,
}

/// Errors raised by sinks.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SinkError {
    /// An I/O error from the underlying stream.
    #[snafu(display("I/O error on {path}: {source}"))]
    Io {
        /// The path (or stream name) the error occurred on.
        path: String,
        /// The underlying I/O error.
        source: io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The sink already has an open stream.
    #[snafu(display("output stream is already open"))]
    AlreadyOpen,

    /// The sink has no open stream.
    #[snafu(display("output stream is not open"))]
    NotOpen,

    /// A row arrived for a table this sink never saw a prolog for.
    #[snafu(display("table {table:?} has not been prepared on this sink"))]
    TableNotPrepared {
        /// Name of the unprepared table.
        table: String,
    },

    /// A column value could not be rendered as text.
    #[snafu(display("failed to render a column value: {source}"))]
    Render {
        /// The underlying column error.
        source: crate::column::ColumnError,
    },

    /// Errors from the binary record store.
    #[snafu(transparent)]
    Record {
        /// The underlying record store error.
        source: RecordError,
    },

    /// Errors from sink URL parsing.
    #[snafu(transparent)]
    Url {
        /// The underlying URL error.
        source: UrlError,
    },
}

/// The three-phase emission protocol a concrete sink implements.
///
/// `prolog` is invoked for every binding of an emitting table, enabled or
/// not; `row` only for enabled bindings. A sink that keeps per-table state
/// should key it by table name, which is unique among live tables.
pub trait SinkBackend {
    /// Prepare to receive rows of `table`.
    fn prolog(&mut self, table: &Table) -> Result<(), SinkError>;

    /// Serialize the current column values of `table` as one row.
    fn row(&mut self, table: &Table) -> Result<(), SinkError>;

    /// Conclude the output session for `table`.
    fn epilog(&mut self, table: &Table) -> Result<(), SinkError>;

    /// Push any buffered output down to the underlying store.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Release the underlying store. Called automatically when the sink
    /// wrapper drops.
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A shared sink: the backend plus the sink side of the binding graph.
pub struct Sink {
    backend: std::cell::RefCell<Box<dyn SinkBackend>>,
    pub(crate) bindings: BindingList,
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink").finish_non_exhaustive()
    }
}

impl Sink {
    /// Wrap a backend for sharing with tables.
    pub fn new(backend: impl SinkBackend + 'static) -> Rc<Sink> {
        Rc::new(Sink {
            backend: std::cell::RefCell::new(Box::new(backend)),
            bindings: std::cell::RefCell::new(Vec::new()),
        })
    }

    /// Bind a table to this sink. Binding an already-bound pair returns
    /// the existing edge.
    pub fn bind(self: &Rc<Self>, table: &Table) -> Result<Rc<Binding>, TableError> {
        table.bind(self)
    }

    /// Unbind a table from this sink. Returns whether a binding existed.
    pub fn unbind(self: &Rc<Self>, table: &Table) -> Result<bool, TableError> {
        table.unbind(self)
    }

    /// Dissolve every binding of this sink.
    ///
    /// Fails when one of the bound tables is currently locked.
    pub fn unbind_all(&self) -> Result<(), TableError> {
        for b in binding::snapshot(&self.bindings) {
            if let Some(table) = b.table() {
                tree::check_unlocked(&table.item.node)?;
            }
            binding::dissolve(&b);
        }
        Ok(())
    }

    /// The live bindings of this sink, in binding order.
    pub fn bindings(&self) -> Vec<Rc<Binding>> {
        binding::snapshot(&self.bindings)
    }

    /// Push buffered output down to the underlying store.
    pub fn flush(&self) -> Result<(), SinkError> {
        self.backend.borrow_mut().flush()
    }

    /// Release the underlying store.
    pub fn close(&self) -> Result<(), SinkError> {
        self.backend.borrow_mut().close()
    }

    pub(crate) fn output_prolog(&self, table: &Table) -> Result<(), SinkError> {
        self.backend.borrow_mut().prolog(table)
    }

    pub(crate) fn output_row(&self, table: &Table) -> Result<(), SinkError> {
        self.backend.borrow_mut().row(table)
    }

    pub(crate) fn output_epilog(&self, table: &Table) -> Result<(), SinkError> {
        self.backend.borrow_mut().epilog(table)
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        for b in binding::snapshot(&self.bindings) {
            binding::detach_from_table(&b);
        }
        self.bindings.borrow_mut().clear();
        if let Err(e) = self.backend.borrow_mut().close() {
            log::warn!("sink close failed during drop: {e}");
        }
    }
}

/// Construct a sink from a URL of the form `scheme:path?k=v,k=v`.
///
/// Recognized schemes are `file` (CSV text file), `hdf5` (binary record
/// store), `stdout`, and `stderr`. Options: `open_mode` of `truncate`
/// (default) or `append`, and `format` of `csvtab` or `csvrel` (default).
pub fn open_url(url: &str) -> Result<Rc<Sink>, SinkError> {
    let parsed = url::parse_url(url)?;

    let mode = match parsed.options.get("open_mode").map(String::as_str) {
        None => OpenMode::Truncate,
        Some("truncate") => OpenMode::Truncate,
        Some("append") => OpenMode::Append,
        Some(other) => {
            return Err(UrlError::BadOptionValue {
                option: "open_mode".to_string(),
                value: other.to_string(),
            }
            .into())
        }
    };
    let format = match parsed.options.get("format").map(String::as_str) {
        None => TextFormat::CsvRel,
        Some("csvtab") => TextFormat::CsvTab,
        Some("csvrel") => TextFormat::CsvRel,
        Some(other) => {
            return Err(UrlError::BadOptionValue {
                option: "format".to_string(),
                value: other.to_string(),
            }
            .into())
        }
    };

    match parsed.scheme.as_str() {
        "file" => Ok(Sink::new(TextSink::create(&parsed.path, mode, format)?)),
        "hdf5" => Ok(Sink::new(RecordSink::create(&parsed.path, mode)?)),
        "stdout" => Ok(Sink::new(TextSink::stdout(format))),
        "stderr" => Ok(Sink::new(TextSink::stderr(format))),
        other => Err(UrlError::UnknownScheme {
            scheme: other.to_string(),
            url: url.to_string(),
        }
        .into()),
    }
}
