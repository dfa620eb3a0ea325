//! The binary record encoder.
//!
//! Every table bound to a [`sink::RecordSink`] is materialized as one
//! extendible dataset of fixed-layout records. This module owns the layout
//! math: mapping each column to a native wire type, packing the fields at
//! their natural alignment, and padding the record to the widest alignment
//! so consecutive records stay aligned in the dataset.
//!
//! Offsets satisfy, for every field `i`:
//! `offset[i] % align[i] == 0` and
//! `offset[i] >= offset[i-1] + size[i-1]`,
//! and are computed once per emission session, then reused for every row.
//!
//! The layout is serialized next to the data (see [`store`]) so that a
//! dataset is self-describing and an append can verify that the on-disk
//! layout matches the live table exactly. There is no layout evolution: a
//! mismatch fails the session.

pub mod sink;
pub mod store;

use std::io;

use serde::{Deserialize, Serialize};
use snafu::{prelude::*, Backtrace};

use crate::column::{ColumnType, ScalarKind};
use crate::tree::Column;

/// Errors raised by the record encoder and its store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RecordError {
    /// The column's type has no native wire descriptor.
    #[snafu(display("no native record mapping for column {column:?} of type {type_label}"))]
    MappingAbsent {
        /// Name of the unmappable column.
        column: String,
        /// Label of the unmappable type.
        type_label: String,
    },

    /// A table without columns cannot be materialized as a dataset.
    #[snafu(display("table {table:?} has no columns to lay out"))]
    NoColumns {
        /// Name of the empty table.
        table: String,
    },

    /// The dataset exists with a different record layout.
    #[snafu(display("dataset {dataset:?} already exists with a different record layout"))]
    LayoutMismatch {
        /// Name of the conflicting dataset.
        dataset: String,
    },

    /// The data file length is not a whole number of records.
    #[snafu(display(
        "dataset {dataset:?} is corrupt: {data_len} bytes is not a multiple of the {record_size}-byte record"
    ))]
    Corrupt {
        /// Name of the corrupt dataset.
        dataset: String,
        /// Length of the data file in bytes.
        data_len: u64,
        /// Record size according to the stored layout.
        record_size: usize,
    },

    /// A record passed for appending has the wrong length.
    #[snafu(display("record of {actual} bytes does not match the {expected}-byte layout"))]
    RecordSize {
        /// Record size the layout requires.
        expected: usize,
        /// Length of the record that was offered.
        actual: usize,
    },

    /// Dataset names must be usable as file names.
    #[snafu(display("dataset name {name:?} is not a valid store entry name"))]
    BadDatasetName {
        /// The rejected name.
        name: String,
    },

    /// The store root does not exist.
    #[snafu(display("record store {path} does not exist"))]
    MissingStore {
        /// The missing root directory.
        path: String,
    },

    /// An I/O error from the underlying filesystem.
    #[snafu(display("I/O error at {path}: {source}"))]
    Io {
        /// The path the error occurred on.
        path: String,
        /// The underlying I/O error.
        source: io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The layout sidecar file could not be parsed.
    #[snafu(display("layout sidecar {path} is invalid: {source}"))]
    BadSidecar {
        /// Path of the unreadable sidecar.
        path: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// Native wire types records are built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NativeType {
    /// Unsigned 8-bit integer (also carries booleans).
    U8,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 64-bit integer.
    U64,
    /// Signed 64-bit integer.
    I64,
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
    /// Fixed-width NUL-terminated string of `len` bytes.
    FixedStr {
        /// Total width in bytes, terminator included.
        len: usize,
    },
}

impl NativeType {
    /// Width of the wire representation in bytes.
    pub fn size(self) -> usize {
        match self {
            NativeType::U8 | NativeType::I8 => 1,
            NativeType::U16 | NativeType::I16 => 2,
            NativeType::U32 | NativeType::I32 | NativeType::F32 => 4,
            NativeType::U64 | NativeType::I64 | NativeType::F64 => 8,
            NativeType::FixedStr { len } => len,
        }
    }

    /// Alignment of the wire representation.
    pub fn align(self) -> usize {
        match self {
            NativeType::FixedStr { .. } => 1,
            other => other.size(),
        }
    }
}

/// Map a column to its native wire type.
///
/// Booleans widen to [`NativeType::U8`]; bounded strings map to a
/// fixed-width string of the column's full wire size. The 128-bit integer
/// kinds have no wire descriptor and fail.
pub fn native_type_of(column: &Column) -> Result<NativeType, RecordError> {
    let ty = column.column_type();
    let mapped = match ty {
        ColumnType::Text { .. } => {
            return Ok(NativeType::FixedStr { len: ty.size() });
        }
        ColumnType::Scalar(kind) => match kind {
            ScalarKind::Bool | ScalarKind::U8 => Some(NativeType::U8),
            ScalarKind::I8 => Some(NativeType::I8),
            ScalarKind::U16 => Some(NativeType::U16),
            ScalarKind::I16 => Some(NativeType::I16),
            ScalarKind::U32 => Some(NativeType::U32),
            ScalarKind::I32 => Some(NativeType::I32),
            ScalarKind::U64 => Some(NativeType::U64),
            ScalarKind::I64 => Some(NativeType::I64),
            ScalarKind::F32 => Some(NativeType::F32),
            ScalarKind::F64 => Some(NativeType::F64),
            ScalarKind::I128 | ScalarKind::U128 => None,
        },
    };
    mapped.context(MappingAbsentSnafu {
        column: column.name(),
        type_label: ty.to_string(),
    })
}

/// One field of a record layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    /// Slash-joined column path below the table.
    pub name: String,
    /// Byte offset of the field inside the record.
    pub offset: usize,
    /// Native wire type of the field.
    pub dtype: NativeType,
}

/// The packed layout of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLayout {
    /// Total record size in bytes, tail padding included.
    pub size: usize,
    /// Record alignment: the widest field alignment.
    pub align: usize,
    /// The fields in emission order.
    pub fields: Vec<FieldLayout>,
}

fn align_up(pos: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    align * pos.div_ceil(align)
}

impl RecordLayout {
    /// Compute the packed layout for a sequence of columns.
    ///
    /// Each field lands at the next offset aligned to its own requirement,
    /// and the record is padded to the widest alignment.
    pub fn for_columns(columns: &[Column]) -> Result<RecordLayout, RecordError> {
        let mut fields = Vec::with_capacity(columns.len());
        let mut align = 1;
        let mut pos = 0;
        for column in columns {
            let dtype = native_type_of(column)?;
            align = align.max(dtype.align());
            pos = align_up(pos, dtype.align());
            fields.push(FieldLayout {
                name: column.path_name("/"),
                offset: pos,
                dtype,
            });
            pos += dtype.size();
        }
        let size = align_up(pos, align);
        Ok(RecordLayout {
            size,
            align,
            fields,
        })
    }
}
