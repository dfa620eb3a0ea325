//! The self-describing schema document of a table.
//!
//! The document is a plain serde structure so callers can serialize it as
//! JSON (see [`crate::table::Table::write_schema`]) or inspect it directly:
//!
//! ```json
//! {
//!   "name": "latency",
//!   "columns": [
//!     { "name": "probe/rtt", "path": ["probe", "rtt"],
//!       "type": "float64", "arithmetic": true }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::table::Table;

/// Description of one column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Slash-joined path of the column below its table.
    pub name: String,
    /// The same path as a sequence of names, table excluded.
    pub path: Vec<String>,
    /// Human-readable type label.
    #[serde(rename = "type")]
    pub type_label: String,
    /// Whether the column holds an arithmetic value.
    pub arithmetic: bool,
}

/// Description of a table's column layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// The table name.
    pub name: String,
    /// One entry per descendant column, in emission order.
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub(crate) fn describe(table: &Table) -> TableSchema {
        let columns = table
            .columns()
            .iter()
            .map(|col| {
                let mut path = vec![col.name().to_string()];
                let mut cur = col.parent();
                while let Some(item) = cur {
                    if item.is_table() {
                        break;
                    }
                    path.push(item.name().to_string());
                    cur = item.parent();
                }
                path.reverse();
                ColumnSchema {
                    name: path.join("/"),
                    path,
                    type_label: col.column_type().to_string(),
                    arithmetic: col.is_arithmetic(),
                }
            })
            .collect();
        TableSchema {
            name: table.name().to_string(),
            columns,
        }
    }
}
