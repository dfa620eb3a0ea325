//! CSV text sinks.
//!
//! Two row formats are supported:
//! - [`TextFormat::CsvTab`]: one header row of column leaf names, then one
//!   comma-separated line per row. The header is only written when the
//!   stream is at position zero or is not seekable, so appending to an
//!   already-written file does not repeat it.
//! - [`TextFormat::CsvRel`]: no header; every line starts with the table
//!   name, making multi-table output unambiguous.
//!
//! Values are rendered through each column's own format descriptor and no
//! quoting is performed; callers pick formats compatible with their data.
//!
//! The sink writes to an owned file, to the process stdout/stderr, or to an
//! in-memory buffer ([`TextSink::memory`]), which is mostly useful in
//! tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use snafu::prelude::*;

use crate::sink::{
    AlreadyOpenSnafu, IoSnafu, NotOpenSnafu, OpenMode, RenderSnafu, SinkBackend, SinkError,
    TableNotPreparedSnafu,
};
use crate::table::Table;

/// The row format of a text sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextFormat {
    /// Comma-separated rows under a single header row.
    CsvTab,
    /// Relational rows prefixed with the table name, no header.
    #[default]
    CsvRel,
}

enum Stream {
    File { file: File, path: PathBuf },
    Stdout,
    Stderr,
    Memory(Rc<RefCell<Vec<u8>>>),
}

impl Stream {
    fn description(&self) -> String {
        match self {
            Stream::File { path, .. } => path.display().to_string(),
            Stream::Stdout => "<stdout>".to_string(),
            Stream::Stderr => "<stderr>".to_string(),
            Stream::Memory(_) => "<memory>".to_string(),
        }
    }
}

/// A handle onto the buffer behind an in-memory text sink.
#[derive(Clone)]
pub struct MemoryBuffer(Rc<RefCell<Vec<u8>>>);

impl MemoryBuffer {
    /// A copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    /// Everything written so far, decoded as UTF-8.
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

/// A CSV text sink.
pub struct TextSink {
    stream: Option<Stream>,
    format: TextFormat,
    prepared: HashMap<String, TextFormat>,
}

impl TextSink {
    /// A sink with no stream yet; use [`TextSink::open_path`] to attach one.
    pub fn new(format: TextFormat) -> TextSink {
        TextSink {
            stream: None,
            format,
            prepared: HashMap::new(),
        }
    }

    /// Open a text sink on a file.
    pub fn create(
        path: impl AsRef<Path>,
        mode: OpenMode,
        format: TextFormat,
    ) -> Result<TextSink, SinkError> {
        let mut sink = TextSink::new(format);
        sink.open_path(path, mode)?;
        Ok(sink)
    }

    /// A text sink on the process standard output.
    pub fn stdout(format: TextFormat) -> TextSink {
        TextSink {
            stream: Some(Stream::Stdout),
            format,
            prepared: HashMap::new(),
        }
    }

    /// A text sink on the process standard error.
    pub fn stderr(format: TextFormat) -> TextSink {
        TextSink {
            stream: Some(Stream::Stderr),
            format,
            prepared: HashMap::new(),
        }
    }

    /// A text sink writing into memory, plus a handle to read it back.
    pub fn memory(format: TextFormat) -> (TextSink, MemoryBuffer) {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let sink = TextSink {
            stream: Some(Stream::Memory(Rc::clone(&buffer))),
            format,
            prepared: HashMap::new(),
        };
        (sink, MemoryBuffer(buffer))
    }

    /// Attach a file stream to a sink that has none.
    pub fn open_path(&mut self, path: impl AsRef<Path>, mode: OpenMode) -> Result<(), SinkError> {
        ensure!(self.stream.is_none(), AlreadyOpenSnafu);
        let path = path.as_ref().to_path_buf();
        let mut file = match mode {
            OpenMode::Truncate => File::create(&path),
            OpenMode::Append => OpenOptions::new().create(true).append(true).open(&path),
        }
        .context(IoSnafu {
            path: path.display().to_string(),
        })?;
        if mode == OpenMode::Append {
            // report the real position so the header rule sees appended data
            file.seek(io::SeekFrom::End(0)).context(IoSnafu {
                path: path.display().to_string(),
            })?;
        }
        self.stream = Some(Stream::File { file, path });
        Ok(())
    }

    /// The path of the open file stream, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.stream {
            Some(Stream::File { path, .. }) => Some(path),
            _ => None,
        }
    }

    /// Whether the stream is at its beginning; `None` when the stream is
    /// not seekable.
    fn at_start(&mut self) -> Option<bool> {
        match self.stream.as_mut()? {
            Stream::File { file, .. } => file.stream_position().ok().map(|pos| pos == 0),
            Stream::Memory(buffer) => Some(buffer.borrow().is_empty()),
            Stream::Stdout | Stream::Stderr => None,
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let stream = self.stream.as_mut().context(NotOpenSnafu)?;
        let result = match stream {
            Stream::File { file, .. } => file.write_all(bytes),
            Stream::Stdout => io::stdout().write_all(bytes),
            Stream::Stderr => io::stderr().write_all(bytes),
            Stream::Memory(buffer) => {
                buffer.borrow_mut().extend_from_slice(bytes);
                Ok(())
            }
        };
        let path = stream.description();
        result.context(IoSnafu { path })
    }

    fn render_values(table: &Table) -> Result<Vec<String>, SinkError> {
        table
            .columns()
            .iter()
            .map(|col| col.emit_text().context(RenderSnafu))
            .collect()
    }
}

impl SinkBackend for TextSink {
    fn prolog(&mut self, table: &Table) -> Result<(), SinkError> {
        let name = table.name().to_string();
        if self.prepared.contains_key(&name) {
            return Ok(());
        }
        if self.format == TextFormat::CsvTab && self.at_start() != Some(false) {
            let header = table
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect::<Vec<_>>()
                .join(",");
            self.write_bytes(format!("{header}\n").as_bytes())?;
        }
        self.prepared.insert(name, self.format);
        Ok(())
    }

    fn row(&mut self, table: &Table) -> Result<(), SinkError> {
        let format = *self
            .prepared
            .get(table.name())
            .context(TableNotPreparedSnafu {
                table: table.name(),
            })?;
        let values = TextSink::render_values(table)?;
        let line = match format {
            TextFormat::CsvTab => format!("{}\n", values.join(",")),
            TextFormat::CsvRel => {
                let mut line = table.name().to_string();
                for value in &values {
                    line.push(',');
                    line.push_str(value);
                }
                line.push('\n');
                line
            }
        };
        self.write_bytes(line.as_bytes())
    }

    fn epilog(&mut self, table: &Table) -> Result<(), SinkError> {
        self.prepared
            .remove(table.name())
            .context(TableNotPreparedSnafu {
                table: table.name(),
            })?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let result = match stream {
            Stream::File { file, .. } => file.flush(),
            Stream::Stdout => io::stdout().flush(),
            Stream::Stderr => io::stderr().flush(),
            Stream::Memory(_) => Ok(()),
        };
        let path = stream.description();
        result.context(IoSnafu { path })
    }

    fn close(&mut self) -> Result<(), SinkError> {
        match self.stream.take() {
            None => Ok(()),
            Some(Stream::File { mut file, path }) => {
                // the file handle closes when dropped; surface flush errors
                file.flush().context(IoSnafu {
                    path: path.display().to_string(),
                })
            }
            Some(Stream::Stdout) => io::stdout().flush().context(IoSnafu { path: "<stdout>" }),
            Some(Stream::Stderr) => io::stderr().flush().context(IoSnafu { path: "<stderr>" }),
            Some(Stream::Memory(_)) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::Sink;
    use crate::tree::Column;

    fn sample_table(name: &str) -> Table {
        let table = Table::results(name).expect("table");
        table
            .add_item(Column::value("a", "%d", 0i32).expect("column"))
            .expect("add");
        table
            .add_item(Column::value("b", "%.3f", 0f64).expect("column"))
            .expect("add");
        table
    }

    fn set(table: &Table, a: f64, b: f64) {
        table.column("a").expect("a").set_number(a).expect("set");
        table.column("b").expect("b").set_number(b).expect("set");
    }

    #[test]
    fn csvtab_header_and_rows() {
        let table = sample_table("txt_tab");
        let (text, buffer) = TextSink::memory(TextFormat::CsvTab);
        let sink = Sink::new(text);
        table.bind(&sink).expect("bind");

        table.prolog().expect("prolog");
        set(&table, 7.0, 2.5);
        table.emit_row().expect("emit");
        set(&table, -1.0, 0.0);
        table.emit_row().expect("emit");
        table.epilog().expect("epilog");

        assert_eq!(buffer.as_text(), "a,b\n7,2.500\n-1,0.000\n");
    }

    #[test]
    fn csvrel_prefixes_the_table_name() {
        let table = sample_table("txt_rel");
        let (text, buffer) = TextSink::memory(TextFormat::CsvRel);
        let sink = Sink::new(text);
        table.bind(&sink).expect("bind");

        table.prolog().expect("prolog");
        set(&table, 7.0, 2.5);
        table.emit_row().expect("emit");
        set(&table, -1.0, 0.0);
        table.emit_row().expect("emit");
        table.epilog().expect("epilog");

        assert_eq!(buffer.as_text(), "txt_rel,7,2.500\ntxt_rel,-1,0.000\n");
    }

    #[test]
    fn csvtab_skips_header_midstream() {
        let table = sample_table("txt_mid");
        let (text, buffer) = TextSink::memory(TextFormat::CsvTab);
        let sink = Sink::new(text);
        table.bind(&sink).expect("bind");

        table.prolog().expect("prolog");
        set(&table, 1.0, 1.0);
        table.emit_row().expect("emit");
        table.epilog().expect("epilog");

        // a second session on the same, now non-empty stream
        table.prolog().expect("prolog");
        set(&table, 2.0, 2.0);
        table.emit_row().expect("emit");
        table.epilog().expect("epilog");

        assert_eq!(buffer.as_text(), "a,b\n1,1.000\n2,2.000\n");
    }

    #[test]
    fn rows_for_unprepared_tables_fail() {
        let table = sample_table("txt_unprep");
        let (mut text, _buffer) = TextSink::memory(TextFormat::CsvRel);
        let err = text.row(&table).expect_err("must fail");
        assert!(matches!(err, SinkError::TableNotPrepared { table: t } if t == "txt_unprep"));
    }

    #[test]
    fn reopening_an_open_stream_fails() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("out.csv");
        let mut sink =
            TextSink::create(&path, OpenMode::Truncate, TextFormat::CsvTab).expect("create");
        let err = sink
            .open_path(dir.path().join("other.csv"), OpenMode::Truncate)
            .expect_err("must fail");
        assert!(matches!(err, SinkError::AlreadyOpen));
    }

    #[test]
    fn file_append_mode_keeps_existing_rows() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "already,here\n").expect("seed file");

        let table = sample_table("txt_append");
        let sink = Sink::new(
            TextSink::create(&path, OpenMode::Append, TextFormat::CsvTab).expect("create"),
        );
        table.bind(&sink).expect("bind");
        table.prolog().expect("prolog");
        set(&table, 3.0, 3.0);
        table.emit_row().expect("emit");
        table.epilog().expect("epilog");
        sink.flush().expect("flush");

        let written = std::fs::read_to_string(&path).expect("read back");
        // position is past zero, so no second header
        assert_eq!(written, "already,here\n3,3.000\n");
    }
}
