//! The binary record sink.
//!
//! One dataset per bound table, named after the table, at a shared
//! [`StoreLocation`]. The handler created at prolog caches the computed
//! [`RecordLayout`]; every row is then a zero-filled scratch record into
//! which each column copies its raw bytes at its precomputed offset, and
//! which extends the dataset by exactly one record.
//!
//! In truncate mode an existing dataset by the table's name is unlinked
//! and recreated; in append mode it is opened and its stored layout must
//! equal the computed one exactly.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use snafu::prelude::*;

use crate::record::store::{Dataset, StoreLocation};
use crate::record::{NoColumnsSnafu, RecordError, RecordLayout};
use crate::sink::{OpenMode, SinkBackend, SinkError, TableNotPreparedSnafu};
use crate::table::Table;

struct TableHandler {
    layout: RecordLayout,
    dataset: Dataset,
}

/// A sink that appends fixed-layout binary records, one dataset per table.
pub struct RecordSink {
    location: Rc<StoreLocation>,
    mode: OpenMode,
    handlers: HashMap<String, TableHandler>,
}

impl RecordSink {
    /// Open a record sink on a store rooted at `path`.
    ///
    /// Truncate mode starts from a fresh store; append mode keeps whatever
    /// datasets are already there.
    pub fn create(path: impl AsRef<Path>, mode: OpenMode) -> Result<RecordSink, RecordError> {
        let location = match mode {
            OpenMode::Truncate => StoreLocation::create(path)?,
            OpenMode::Append => StoreLocation::open_or_create(path)?,
        };
        Ok(RecordSink::at(location, mode))
    }

    /// Open a record sink on an existing store location.
    pub fn at(location: Rc<StoreLocation>, mode: OpenMode) -> RecordSink {
        RecordSink {
            location,
            mode,
            handlers: HashMap::new(),
        }
    }

    /// The store location this sink writes to.
    pub fn location(&self) -> &Rc<StoreLocation> {
        &self.location
    }
}

impl SinkBackend for RecordSink {
    fn prolog(&mut self, table: &Table) -> Result<(), SinkError> {
        let name = table.name().to_string();
        let columns = table.columns();
        ensure!(!columns.is_empty(), NoColumnsSnafu { table: &name });
        let layout = RecordLayout::for_columns(&columns)?;

        let dataset = match self.mode {
            OpenMode::Truncate => {
                if self.location.dataset_exists(&name) {
                    self.location.remove_dataset(&name)?;
                }
                self.location.create_dataset(&name, &layout)?
            }
            OpenMode::Append => {
                if self.location.dataset_exists(&name) {
                    self.location.open_dataset(&name, &layout)?
                } else {
                    self.location.create_dataset(&name, &layout)?
                }
            }
        };
        self.handlers.insert(name, TableHandler { layout, dataset });
        Ok(())
    }

    fn row(&mut self, table: &Table) -> Result<(), SinkError> {
        let handler = self
            .handlers
            .get_mut(table.name())
            .context(TableNotPreparedSnafu {
                table: table.name(),
            })?;
        let columns = table.columns();

        let mut record = vec![0u8; handler.layout.size];
        for (column, field) in columns.iter().zip(handler.layout.fields.iter()) {
            let end = field.offset + field.dtype.size();
            column.write_raw(&mut record[field.offset..end]);
        }
        handler.dataset.append(&record)?;
        Ok(())
    }

    fn epilog(&mut self, table: &Table) -> Result<(), SinkError> {
        if let Some(handler) = self.handlers.remove(table.name()) {
            handler.dataset.close()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        for handler in self.handlers.values_mut() {
            handler.dataset.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        for (_, handler) in self.handlers.drain() {
            handler.dataset.close()?;
        }
        Ok(())
    }
}
