//! Column value carriers.
//!
//! A column holds (or knows how to produce) exactly one typed cell value and
//! can serialize it two ways: as text through its printf-style format
//! descriptor, and as raw native bytes for the binary record encoder.
//!
//! The carrier set is closed:
//! - an owned arithmetic value,
//! - an owned bounded string (fixed `max_len + 1` byte wire footprint,
//!   including the terminating NUL),
//! - an arithmetic value observed through externally shared storage,
//! - a string observed through externally shared storage,
//! - an arithmetic value computed by a caller-supplied producer at emit
//!   time.
//!
//! Structural concerns (names, parents, paths) live in [`crate::tree`]; this
//! module is only about the values.

pub mod format;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

use snafu::prelude::*;

use crate::column::format::{FormatArg, FormatError};
use crate::tree::{Column, NodeKind};

/// Errors raised by column value access.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ColumnError {
    /// A numeric value was assigned to a non-arithmetic column.
    #[snafu(display("column {column:?} is not arithmetic"))]
    NotArithmetic {
        /// Name of the column that rejected the assignment.
        column: String,
    },

    /// A string value was assigned to a non-string column.
    #[snafu(display("column {column:?} is not textual"))]
    NotText {
        /// Name of the column that rejected the assignment.
        column: String,
    },

    /// The column observes external storage or computes its value, so it
    /// cannot be assigned through the table.
    #[snafu(display("column {column:?} reads an external value and cannot be set"))]
    ReadOnly {
        /// Name of the column that rejected the assignment.
        column: String,
    },

    /// The column's format template could not render the current value.
    #[snafu(display("column {column:?} format {template:?} failed: {source}"))]
    Render {
        /// Name of the column being rendered.
        column: String,
        /// The format template that failed.
        template: String,
        /// The underlying template error.
        source: FormatError,
    },
}

/// The arithmetic kinds a column cell can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Boolean value.
    Bool,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 128-bit signed integer.
    I128,
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit unsigned integer.
    U64,
    /// 128-bit unsigned integer.
    U128,
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
}

impl ScalarKind {
    /// Byte size of the native representation.
    pub fn size(self) -> usize {
        match self {
            ScalarKind::Bool | ScalarKind::I8 | ScalarKind::U8 => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 => 8,
            ScalarKind::I128 | ScalarKind::U128 => 16,
        }
    }

    /// Alignment of the native representation.
    pub fn align(self) -> usize {
        match self {
            ScalarKind::Bool | ScalarKind::I8 | ScalarKind::U8 => mem::align_of::<u8>(),
            ScalarKind::I16 | ScalarKind::U16 => mem::align_of::<u16>(),
            ScalarKind::I32 | ScalarKind::U32 => mem::align_of::<u32>(),
            ScalarKind::F32 => mem::align_of::<f32>(),
            ScalarKind::I64 | ScalarKind::U64 => mem::align_of::<u64>(),
            ScalarKind::F64 => mem::align_of::<f64>(),
            ScalarKind::I128 | ScalarKind::U128 => mem::align_of::<u128>(),
        }
    }

    /// Short human-readable label used in schema dumps.
    pub fn label(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I8 => "int8",
            ScalarKind::I16 => "int16",
            ScalarKind::I32 => "int32",
            ScalarKind::I64 => "int64",
            ScalarKind::I128 => "int128",
            ScalarKind::U8 => "uint8",
            ScalarKind::U16 => "uint16",
            ScalarKind::U32 => "uint32",
            ScalarKind::U64 => "uint64",
            ScalarKind::U128 => "uint128",
            ScalarKind::F32 => "float32",
            ScalarKind::F64 => "float64",
        }
    }
}

/// One arithmetic cell value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// Boolean value.
    Bool(bool),
    /// 8-bit signed integer.
    I8(i8),
    /// 16-bit signed integer.
    I16(i16),
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 128-bit signed integer.
    I128(i128),
    /// 8-bit unsigned integer.
    U8(u8),
    /// 16-bit unsigned integer.
    U16(u16),
    /// 32-bit unsigned integer.
    U32(u32),
    /// 64-bit unsigned integer.
    U64(u64),
    /// 128-bit unsigned integer.
    U128(u128),
    /// 32-bit floating point.
    F32(f32),
    /// 64-bit floating point.
    F64(f64),
}

impl Scalar {
    /// The kind tag for this value.
    pub fn kind(self) -> ScalarKind {
        match self {
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::I8(_) => ScalarKind::I8,
            Scalar::I16(_) => ScalarKind::I16,
            Scalar::I32(_) => ScalarKind::I32,
            Scalar::I64(_) => ScalarKind::I64,
            Scalar::I128(_) => ScalarKind::I128,
            Scalar::U8(_) => ScalarKind::U8,
            Scalar::U16(_) => ScalarKind::U16,
            Scalar::U32(_) => ScalarKind::U32,
            Scalar::U64(_) => ScalarKind::U64,
            Scalar::U128(_) => ScalarKind::U128,
            Scalar::F32(_) => ScalarKind::F32,
            Scalar::F64(_) => ScalarKind::F64,
        }
    }

    /// Build a value of `kind` from an `f64`, converting with the usual
    /// numeric cast rules (floats saturate into integer ranges).
    pub fn from_f64(kind: ScalarKind, v: f64) -> Scalar {
        match kind {
            ScalarKind::Bool => Scalar::Bool(v != 0.0),
            ScalarKind::I8 => Scalar::I8(v as i8),
            ScalarKind::I16 => Scalar::I16(v as i16),
            ScalarKind::I32 => Scalar::I32(v as i32),
            ScalarKind::I64 => Scalar::I64(v as i64),
            ScalarKind::I128 => Scalar::I128(v as i128),
            ScalarKind::U8 => Scalar::U8(v as u8),
            ScalarKind::U16 => Scalar::U16(v as u16),
            ScalarKind::U32 => Scalar::U32(v as u32),
            ScalarKind::U64 => Scalar::U64(v as u64),
            ScalarKind::U128 => Scalar::U128(v as u128),
            ScalarKind::F32 => Scalar::F32(v as f32),
            ScalarKind::F64 => Scalar::F64(v),
        }
    }

    /// The value widened to `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Bool(v) => v as u8 as f64,
            Scalar::I8(v) => v as f64,
            Scalar::I16(v) => v as f64,
            Scalar::I32(v) => v as f64,
            Scalar::I64(v) => v as f64,
            Scalar::I128(v) => v as f64,
            Scalar::U8(v) => v as f64,
            Scalar::U16(v) => v as f64,
            Scalar::U32(v) => v as f64,
            Scalar::U64(v) => v as f64,
            Scalar::U128(v) => v as f64,
            Scalar::F32(v) => v as f64,
            Scalar::F64(v) => v,
        }
    }

    /// The value as a signed 128-bit integer (floats truncate).
    pub fn as_i128(self) -> i128 {
        match self {
            Scalar::Bool(v) => v as i128,
            Scalar::I8(v) => v as i128,
            Scalar::I16(v) => v as i128,
            Scalar::I32(v) => v as i128,
            Scalar::I64(v) => v as i128,
            Scalar::I128(v) => v,
            Scalar::U8(v) => v as i128,
            Scalar::U16(v) => v as i128,
            Scalar::U32(v) => v as i128,
            Scalar::U64(v) => v as i128,
            Scalar::U128(v) => v as i128,
            Scalar::F32(v) => v as i128,
            Scalar::F64(v) => v as i128,
        }
    }

    /// The value reinterpreted as unsigned at its own byte width, the way
    /// a C cast wraps: `I32(-1)` becomes `0xffff_ffff`, not a 128-bit
    /// pattern. Floats truncate toward zero first.
    pub fn as_u128(self) -> u128 {
        match self {
            Scalar::Bool(v) => v as u128,
            Scalar::I8(v) => v as u8 as u128,
            Scalar::I16(v) => v as u16 as u128,
            Scalar::I32(v) => v as u32 as u128,
            Scalar::I64(v) => v as u64 as u128,
            Scalar::I128(v) => v as u128,
            Scalar::U8(v) => v as u128,
            Scalar::U16(v) => v as u128,
            Scalar::U32(v) => v as u128,
            Scalar::U64(v) => v as u128,
            Scalar::U128(v) => v,
            Scalar::F32(v) => (v as i32) as u32 as u128,
            Scalar::F64(v) => (v as i64) as u64 as u128,
        }
    }

    /// Copy the native byte representation into `out`.
    ///
    /// `out` must be exactly `self.kind().size()` bytes long.
    pub fn write_bytes(self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), self.kind().size());
        match self {
            Scalar::Bool(v) => out.copy_from_slice(&[v as u8]),
            Scalar::I8(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::I16(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::I32(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::I64(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::I128(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::U8(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::U16(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::U32(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::U64(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::U128(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::F32(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::F64(v) => out.copy_from_slice(&v.to_ne_bytes()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::I8(v) => write!(f, "{v}"),
            Scalar::I16(v) => write!(f, "{v}"),
            Scalar::I32(v) => write!(f, "{v}"),
            Scalar::I64(v) => write!(f, "{v}"),
            Scalar::I128(v) => write!(f, "{v}"),
            Scalar::U8(v) => write!(f, "{v}"),
            Scalar::U16(v) => write!(f, "{v}"),
            Scalar::U32(v) => write!(f, "{v}"),
            Scalar::U64(v) => write!(f, "{v}"),
            Scalar::U128(v) => write!(f, "{v}"),
            Scalar::F32(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
        }
    }
}

/// Native arithmetic types that can live in a column cell.
pub trait ScalarValue: Copy + 'static {
    /// The kind tag for this type.
    const KIND: ScalarKind;

    /// Wrap the value in a [`Scalar`].
    fn to_scalar(self) -> Scalar;
}

macro_rules! impl_scalar_value {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl ScalarValue for $ty {
                const KIND: ScalarKind = ScalarKind::$kind;

                fn to_scalar(self) -> Scalar {
                    Scalar::$kind(self)
                }
            }
        )+
    };
}

impl_scalar_value! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    i128 => I128,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    u128 => U128,
    f32 => F32,
    f64 => F64,
}

/// Externally shared storage an observing column reads through.
pub trait ScalarSource {
    /// Read the current value.
    fn load(&self) -> Scalar;
}

impl<T: ScalarValue> ScalarSource for Cell<T> {
    fn load(&self) -> Scalar {
        self.get().to_scalar()
    }
}

/// The wire type of a column: an arithmetic kind or a bounded string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// An arithmetic cell.
    Scalar(ScalarKind),
    /// A bounded string occupying `max_len + 1` bytes on the wire.
    Text {
        /// Maximum stored length in bytes, excluding the terminating NUL.
        max_len: usize,
    },
}

impl ColumnType {
    /// Maximum number of bytes needed to serialize a value of this type.
    pub fn size(self) -> usize {
        match self {
            ColumnType::Scalar(k) => k.size(),
            ColumnType::Text { max_len } => max_len + 1,
        }
    }

    /// Alignment required when serializing a value of this type.
    pub fn align(self) -> usize {
        match self {
            ColumnType::Scalar(k) => k.align(),
            ColumnType::Text { .. } => 1,
        }
    }

    /// True for arithmetic cells.
    pub fn is_arithmetic(self) -> bool {
        matches!(self, ColumnType::Scalar(_))
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Scalar(k) => f.write_str(k.label()),
            ColumnType::Text { max_len } => write!(f, "str[{max_len}]"),
        }
    }
}

pub(crate) enum ColumnPayload {
    Value(Cell<Scalar>),
    Text(RefCell<String>),
    ValueRef(Rc<dyn ScalarSource>),
    TextRef(Rc<RefCell<String>>),
    Computed(Box<dyn Fn() -> Scalar>),
}

pub(crate) struct ColumnData {
    pub(crate) format: String,
    pub(crate) ty: ColumnType,
    pub(crate) payload: ColumnPayload,
}

impl ColumnData {
    pub(crate) fn current_scalar(&self) -> Option<Scalar> {
        match &self.payload {
            ColumnPayload::Value(cell) => Some(cell.get()),
            ColumnPayload::ValueRef(src) => Some(src.load()),
            ColumnPayload::Computed(f) => Some(f()),
            ColumnPayload::Text(_) | ColumnPayload::TextRef(_) => None,
        }
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 sequence.
pub(crate) fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl Column {
    pub(crate) fn data(&self) -> &ColumnData {
        match &self.item.node.kind {
            NodeKind::Column(data) => data,
            // Column handles are only ever constructed over column nodes.
            _ => unreachable!("column handle over a non-column node"),
        }
    }

    /// The wire type of this column.
    pub fn column_type(&self) -> ColumnType {
        self.data().ty
    }

    /// The printf-style format descriptor.
    pub fn format(&self) -> String {
        self.data().format.clone()
    }

    /// Maximum number of bytes needed to serialize this column's value.
    pub fn size(&self) -> usize {
        self.data().ty.size()
    }

    /// Alignment required when serializing this column's value.
    pub fn align(&self) -> usize {
        self.data().ty.align()
    }

    /// True when the column holds an arithmetic value.
    pub fn is_arithmetic(&self) -> bool {
        self.data().ty.is_arithmetic()
    }

    /// The current arithmetic value, or `None` for string columns.
    pub fn scalar(&self) -> Option<Scalar> {
        self.data().current_scalar()
    }

    /// The current string value, or `None` for arithmetic columns.
    pub fn text(&self) -> Option<String> {
        match &self.data().payload {
            ColumnPayload::Text(v) => Some(v.borrow().clone()),
            ColumnPayload::TextRef(v) => Some(v.borrow().clone()),
            _ => None,
        }
    }

    /// Assign a numeric value, converting to the column's kind.
    ///
    /// Fails on string columns and on columns whose value is observed or
    /// computed rather than owned.
    pub fn set_number(&self, v: f64) -> Result<(), ColumnError> {
        let data = self.data();
        match (&data.payload, data.ty) {
            (ColumnPayload::Value(cell), ColumnType::Scalar(kind)) => {
                cell.set(Scalar::from_f64(kind, v));
                Ok(())
            }
            (ColumnPayload::Text(_), _) => NotArithmeticSnafu {
                column: self.item.name(),
            }
            .fail(),
            _ => ReadOnlySnafu {
                column: self.item.name(),
            }
            .fail(),
        }
    }

    /// Assign a string value, truncating to the column's maximum length.
    ///
    /// Fails on arithmetic columns and on columns whose value is observed
    /// rather than owned.
    pub fn set_text(&self, v: &str) -> Result<(), ColumnError> {
        let data = self.data();
        match (&data.payload, data.ty) {
            (ColumnPayload::Text(cell), ColumnType::Text { max_len }) => {
                *cell.borrow_mut() = truncate_utf8(v, max_len).to_string();
                Ok(())
            }
            (ColumnPayload::Value(_), _) | (ColumnPayload::Computed(_), _) => NotTextSnafu {
                column: self.item.name(),
            }
            .fail(),
            _ => ReadOnlySnafu {
                column: self.item.name(),
            }
            .fail(),
        }
    }

    /// Render the current value through the column's format descriptor.
    pub fn emit_text(&self) -> Result<String, ColumnError> {
        let data = self.data();
        let rendered = match &data.payload {
            ColumnPayload::Value(cell) => {
                format::render(&data.format, &FormatArg::Scalar(cell.get()))
            }
            ColumnPayload::ValueRef(src) => {
                format::render(&data.format, &FormatArg::Scalar(src.load()))
            }
            ColumnPayload::Computed(f) => format::render(&data.format, &FormatArg::Scalar(f())),
            ColumnPayload::Text(v) => {
                let s = v.borrow();
                format::render(&data.format, &FormatArg::Text(&s))
            }
            ColumnPayload::TextRef(v) => {
                let s = v.borrow();
                format::render(&data.format, &FormatArg::Text(&s))
            }
        };
        rendered.context(RenderSnafu {
            column: self.item.name(),
            template: data.format.clone(),
        })
    }

    /// Copy the raw byte representation of the current value into `out`.
    ///
    /// `out` must be exactly [`Column::size`] bytes long. String values are
    /// truncated to the column's maximum length, NUL-terminated, and
    /// zero-padded.
    pub fn write_raw(&self, out: &mut [u8]) {
        let data = self.data();
        debug_assert_eq!(out.len(), data.ty.size());
        match &data.payload {
            ColumnPayload::Value(cell) => cell.get().write_bytes(out),
            ColumnPayload::ValueRef(src) => src.load().write_bytes(out),
            ColumnPayload::Computed(f) => f().write_bytes(out),
            ColumnPayload::Text(v) => write_text_bytes(&v.borrow(), out),
            ColumnPayload::TextRef(v) => write_text_bytes(&v.borrow(), out),
        }
    }
}

fn write_text_bytes(s: &str, out: &mut [u8]) {
    let max_len = out.len().saturating_sub(1);
    let bytes = s.as_bytes();
    let n = bytes.len().min(max_len);
    out[..n].copy_from_slice(&bytes[..n]);
    for b in &mut out[n..] {
        *b = 0;
    }
}

/// Constructors for the closed set of column carriers.
impl Column {
    /// A column owning an arithmetic value, initialized to `init`.
    pub fn value<T: ScalarValue>(
        name: &str,
        template: &str,
        init: T,
    ) -> Result<Column, crate::tree::TreeError> {
        Column::from_data(
            name,
            ColumnData {
                format: template.to_string(),
                ty: ColumnType::Scalar(T::KIND),
                payload: ColumnPayload::Value(Cell::new(init.to_scalar())),
            },
        )
    }

    /// A column owning a bounded string of at most `max_len` bytes.
    pub fn text_value(
        name: &str,
        max_len: usize,
        template: &str,
        init: &str,
    ) -> Result<Column, crate::tree::TreeError> {
        Column::from_data(
            name,
            ColumnData {
                format: template.to_string(),
                ty: ColumnType::Text { max_len },
                payload: ColumnPayload::Text(RefCell::new(truncate_utf8(init, max_len).to_string())),
            },
        )
    }

    /// A column observing an externally shared arithmetic cell.
    ///
    /// The cell stays owned by the caller; the column reads the live value
    /// each time it emits, making it a trace on a program variable.
    pub fn observe<T: ScalarValue>(
        name: &str,
        template: &str,
        source: Rc<Cell<T>>,
    ) -> Result<Column, crate::tree::TreeError> {
        Column::from_data(
            name,
            ColumnData {
                format: template.to_string(),
                ty: ColumnType::Scalar(T::KIND),
                payload: ColumnPayload::ValueRef(source),
            },
        )
    }

    /// A column observing an externally shared string.
    pub fn observe_text(
        name: &str,
        max_len: usize,
        template: &str,
        source: Rc<RefCell<String>>,
    ) -> Result<Column, crate::tree::TreeError> {
        Column::from_data(
            name,
            ColumnData {
                format: template.to_string(),
                ty: ColumnType::Text { max_len },
                payload: ColumnPayload::TextRef(source),
            },
        )
    }

    /// A column whose arithmetic value is produced by `f` at emit time.
    pub fn computed<T: ScalarValue, F>(
        name: &str,
        template: &str,
        f: F,
    ) -> Result<Column, crate::tree::TreeError>
    where
        F: Fn() -> T + 'static,
    {
        Column::from_data(
            name,
            ColumnData {
                format: template.to_string(),
                ty: ColumnType::Scalar(T::KIND),
                payload: ColumnPayload::Computed(Box::new(move || f().to_scalar())),
            },
        )
    }

    fn from_data(name: &str, data: ColumnData) -> Result<Column, crate::tree::TreeError> {
        let node = crate::tree::new_node(name, NodeKind::Column(data))?;
        Ok(Column {
            item: crate::tree::Item { node },
        })
    }
}
