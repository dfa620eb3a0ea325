//! End-to-end emission scenarios over text and counting sinks.

use std::cell::Cell;
use std::rc::Rc;

use rowsink_core::{
    Column, Group, Sink, SinkBackend, SinkError, Table, TableError, TextFormat, TextSink,
    TreeError,
};

/// A sink that only counts protocol calls.
#[derive(Clone, Default)]
struct Counters {
    prologs: Rc<Cell<usize>>,
    rows: Rc<Cell<usize>>,
    epilogs: Rc<Cell<usize>>,
}

struct CountingSink {
    counters: Counters,
}

impl SinkBackend for CountingSink {
    fn prolog(&mut self, _table: &Table) -> Result<(), SinkError> {
        self.counters.prologs.set(self.counters.prologs.get() + 1);
        Ok(())
    }

    fn row(&mut self, _table: &Table) -> Result<(), SinkError> {
        self.counters.rows.set(self.counters.rows.get() + 1);
        Ok(())
    }

    fn epilog(&mut self, _table: &Table) -> Result<(), SinkError> {
        self.counters.epilogs.set(self.counters.epilogs.get() + 1);
        Ok(())
    }
}

fn counting_sink() -> (Rc<Sink>, Counters) {
    let counters = Counters::default();
    let sink = Sink::new(CountingSink {
        counters: counters.clone(),
    });
    (sink, counters)
}

fn int_double_table(name: &str) -> Table {
    let table = Table::results(name).expect("table");
    table
        .add_item(Column::value("a", "%d", 0i32).expect("column"))
        .expect("add");
    table
        .add_item(Column::value("b", "%.3f", 0f64).expect("column"))
        .expect("add");
    table
}

#[test]
fn csvtab_session_writes_header_and_rows() {
    let table = int_double_table("e2e_tab");
    let (text, buffer) = TextSink::memory(TextFormat::CsvTab);
    let sink = Sink::new(text);
    table.bind(&sink).expect("bind");

    table.prolog().expect("prolog");
    table.column("a").expect("a").set_number(7.0).expect("set");
    table.column("b").expect("b").set_number(2.5).expect("set");
    table.emit_row().expect("emit");
    table.column("a").expect("a").set_number(-1.0).expect("set");
    table.column("b").expect("b").set_number(0.0).expect("set");
    table.emit_row().expect("emit");
    table.epilog().expect("epilog");

    assert_eq!(buffer.as_text(), "a,b\n7,2.500\n-1,0.000\n");
}

#[test]
fn csvrel_session_prefixes_rows_with_table_name() {
    let table = int_double_table("e2e_rel");
    let (text, buffer) = TextSink::memory(TextFormat::CsvRel);
    let sink = Sink::new(text);
    table.bind(&sink).expect("bind");

    table.prolog().expect("prolog");
    table.column("a").expect("a").set_number(7.0).expect("set");
    table.column("b").expect("b").set_number(2.5).expect("set");
    table.emit_row().expect("emit");
    table.column("a").expect("a").set_number(-1.0).expect("set");
    table.column("b").expect("b").set_number(0.0).expect("set");
    table.emit_row().expect("emit");
    table.epilog().expect("epilog");

    let text = buffer.as_text();
    assert!(!text.contains("a,b"));
    assert_eq!(text, "e2e_rel,7,2.500\ne2e_rel,-1,0.000\n");
}

#[test]
fn disabled_bindings_get_prolog_and_epilog_but_no_rows() {
    let table = int_double_table("e2e_disabled");
    let (active_sink, active) = counting_sink();
    let (muted_sink, muted) = counting_sink();
    table.bind(&active_sink).expect("bind");
    let muted_binding = table.bind(&muted_sink).expect("bind");
    muted_binding.set_enabled(false);

    table.prolog().expect("prolog");
    for _ in 0..3 {
        table.emit_row().expect("emit");
    }
    table.epilog().expect("epilog");

    assert_eq!(active.prologs.get(), 1);
    assert_eq!(active.rows.get(), 3);
    assert_eq!(active.epilogs.get(), 1);
    assert_eq!(muted.prologs.get(), 1);
    assert_eq!(muted.rows.get(), 0);
    assert_eq!(muted.epilogs.get(), 1);
}

#[test]
fn disabled_tables_emit_nothing() {
    let table = int_double_table("e2e_off");
    let (sink, counters) = counting_sink();
    table.bind(&sink).expect("bind");

    table.prolog().expect("prolog");
    table.set_enabled(false);
    table.emit_row().expect("emit is a no-op");
    table.set_enabled(true);
    table.emit_row().expect("emit");
    table.epilog().expect("epilog");

    assert_eq!(counters.rows.get(), 1);
}

#[test]
fn emit_before_prolog_fails_even_with_bindings() {
    let table = int_double_table("e2e_early");
    let (sink, counters) = counting_sink();
    table.bind(&sink).expect("bind");

    let err = table.emit_row().expect_err("must fail");
    assert!(matches!(err, TableError::EmitUnlocked { .. }));
    assert_eq!(counters.rows.get(), 0);
}

#[test]
fn binds_and_unbinds_are_refused_while_locked() {
    let table = int_double_table("e2e_lockbind");
    let (sink, _) = counting_sink();
    let (other, _) = counting_sink();
    table.bind(&sink).expect("bind");

    table.prolog().expect("prolog");
    assert!(matches!(
        table.bind(&other),
        Err(TableError::Tree {
            source: TreeError::TableLocked { .. }
        })
    ));
    assert!(matches!(
        table.unbind(&sink),
        Err(TableError::Tree {
            source: TreeError::TableLocked { .. }
        })
    ));
    table.epilog().expect("epilog");

    table.bind(&other).expect("bind after epilog");
    assert!(table.unbind(&sink).expect("unbind after epilog"));
}

#[test]
fn rebinding_returns_the_existing_edge() {
    let table = int_double_table("e2e_rebind");
    let (sink, _) = counting_sink();
    let first = table.bind(&sink).expect("bind");
    let second = table.bind(&sink).expect("bind again");
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(table.bindings().len(), 1);
    assert_eq!(sink.bindings().len(), 1);
}

#[test]
fn unbind_reports_whether_an_edge_existed() {
    let table = int_double_table("e2e_unbind");
    let (sink, _) = counting_sink();
    assert!(!table.unbind(&sink).expect("unbind without edge"));
    table.bind(&sink).expect("bind");
    assert!(table.unbind(&sink).expect("unbind"));
    assert!(!table.unbind(&sink).expect("second unbind"));
    assert!(table.bindings().is_empty());
    assert!(sink.bindings().is_empty());
}

#[test]
fn unbinding_works_from_the_sink_side_too() {
    let table = int_double_table("e2e_sinkside");
    let (sink, _) = counting_sink();
    sink.bind(&table).expect("bind from sink");
    assert_eq!(table.bindings().len(), 1);
    assert!(sink.unbind(&table).expect("unbind from sink"));
    assert!(table.bindings().is_empty());
}

#[test]
fn dropping_a_sink_dissolves_its_edges() {
    let table = int_double_table("e2e_sinkdrop");
    let (sink, _) = counting_sink();
    table.bind(&sink).expect("bind");
    assert_eq!(table.bindings().len(), 1);
    drop(sink);
    assert!(table.bindings().is_empty());
    // the table emits into the void without complaint
    table.prolog().expect("prolog");
    table.emit_row().expect("emit");
    table.epilog().expect("epilog");
}

#[test]
fn dropping_a_table_dissolves_its_edges() {
    let (sink, _) = counting_sink();
    {
        let table = int_double_table("e2e_tabledrop");
        table.bind(&sink).expect("bind");
        assert_eq!(sink.bindings().len(), 1);
    }
    assert!(sink.bindings().is_empty());
}

#[test]
fn one_sink_serves_many_tables() {
    let first = int_double_table("e2e_multi_a");
    let second = int_double_table("e2e_multi_b");
    let (text, buffer) = TextSink::memory(TextFormat::CsvRel);
    let sink = Sink::new(text);
    first.bind(&sink).expect("bind");
    second.bind(&sink).expect("bind");

    first.prolog().expect("prolog");
    second.prolog().expect("prolog");
    first.column("a").expect("a").set_number(1.0).expect("set");
    first.column("b").expect("b").set_number(1.0).expect("set");
    first.emit_row().expect("emit");
    second.column("a").expect("a").set_number(2.0).expect("set");
    second.column("b").expect("b").set_number(2.0).expect("set");
    second.emit_row().expect("emit");
    first.epilog().expect("epilog");
    second.epilog().expect("epilog");

    assert_eq!(
        buffer.as_text(),
        "e2e_multi_a,1,1.000\ne2e_multi_b,2,2.000\n"
    );
}

#[test]
fn table_names_free_up_on_drop() {
    let first = Table::results("e2e_name").expect("table");
    assert!(matches!(
        Table::results("e2e_name"),
        Err(TableError::DuplicateTable { .. })
    ));
    drop(first);
    Table::results("e2e_name").expect("name is free again");
}

#[test]
fn grouped_columns_emit_in_preorder() {
    let table = Table::results("e2e_groups").expect("table");
    table
        .add_item(Column::value("id", "%d", 0i32).expect("column"))
        .expect("add");
    let measurements = Group::new("measurements").expect("group");
    measurements
        .add_item(Column::value("zeta", "%.1f", 0f64).expect("column"))
        .expect("add");
    measurements
        .add_item(Column::text_value("mname", 31, "%s", "").expect("column"))
        .expect("add");
    table.add_item(&measurements).expect("add");

    let (text, buffer) = TextSink::memory(TextFormat::CsvTab);
    let sink = Sink::new(text);
    table.bind(&sink).expect("bind");

    table.prolog().expect("prolog");
    table.column("id").expect("id").set_number(3.0).expect("set");
    table
        .column("measurements/zeta")
        .expect("zeta")
        .set_number(1.5)
        .expect("set");
    table
        .column("measurements/mname")
        .expect("mname")
        .set_text("record 3")
        .expect("set");
    table.emit_row().expect("emit");
    table.epilog().expect("epilog");

    assert_eq!(buffer.as_text(), "id,zeta,mname\n3,1.5,record 3\n");
}
