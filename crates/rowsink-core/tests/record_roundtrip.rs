//! End-to-end sessions against the binary record sink.

use rowsink_core::{
    open_url, Column, NativeType, OpenMode, RecordSink, Sink, StoreLocation, Table,
};
use tempfile::TempDir;

fn id_name_table(name: &str) -> Table {
    let table = Table::results(name).expect("table");
    table
        .add_item(Column::value("id", "%u", 0u64).expect("column"))
        .expect("add");
    table
        .add_item(Column::text_value("name", 7, "%s", "").expect("column"))
        .expect("add");
    table
}

fn emit_two(table: &Table) {
    table.column("id").expect("id").set_number(1.0).expect("set");
    table
        .column("name")
        .expect("name")
        .set_text("ab")
        .expect("set");
    table.emit_row().expect("emit");
    table.column("id").expect("id").set_number(2.0).expect("set");
    table
        .column("name")
        .expect("name")
        .set_text("abcdefghij")
        .expect("set");
    table.emit_row().expect("emit");
}

#[test]
fn truncate_session_packs_and_truncates_strings() {
    let tmp = TempDir::new().expect("tempdir");
    let table = id_name_table("rt_pack");
    let record = RecordSink::create(tmp.path(), OpenMode::Truncate).expect("record sink");
    let store = std::rc::Rc::clone(record.location());
    let sink = Sink::new(record);
    table.bind(&sink).expect("bind");

    table.prolog().expect("prolog");
    emit_two(&table);
    table.epilog().expect("epilog");

    let layout = store.read_layout("rt_pack").expect("layout");
    assert_eq!(layout.fields[0].dtype, NativeType::U64);
    assert_eq!(layout.fields[0].offset, 0);
    // the 7-byte string plus its terminator sits right after the id
    assert_eq!(layout.fields[1].dtype, NativeType::FixedStr { len: 8 });
    assert_eq!(layout.fields[1].offset, 8);
    assert_eq!(layout.size, 16);

    assert_eq!(store.dataset_len("rt_pack").expect("len"), 2);
    let rows = store.read_rows("rt_pack").expect("rows");
    assert_eq!(rows.len(), 32);

    let first = &rows[..16];
    assert_eq!(&first[..8], &1u64.to_ne_bytes());
    assert_eq!(&first[8..16], b"ab\0\0\0\0\0\0");

    let second = &rows[16..];
    assert_eq!(&second[..8], &2u64.to_ne_bytes());
    // truncated to the bounded length, with a trailing NUL
    assert_eq!(&second[8..16], b"abcdefg\0");
}

#[test]
fn append_sessions_concatenate_when_the_layout_matches() {
    let tmp = TempDir::new().expect("tempdir");
    let table = id_name_table("rt_append");

    {
        let sink = Sink::new(RecordSink::create(tmp.path(), OpenMode::Append).expect("sink"));
        table.bind(&sink).expect("bind");
        table.prolog().expect("prolog");
        emit_two(&table);
        table.epilog().expect("epilog");
        table.unbind_all().expect("unbind");
    }
    {
        let sink = Sink::new(RecordSink::create(tmp.path(), OpenMode::Append).expect("sink"));
        table.bind(&sink).expect("bind");
        table.prolog().expect("prolog");
        emit_two(&table);
        table.epilog().expect("epilog");
        table.unbind_all().expect("unbind");
    }

    let store = StoreLocation::open(tmp.path()).expect("store");
    assert_eq!(store.dataset_len("rt_append").expect("len"), 4);
    let rows = store.read_rows("rt_append").expect("rows");
    // two identical sessions, so the data is the first session twice
    assert_eq!(&rows[..32], &rows[32..]);
}

#[test]
fn append_with_a_changed_layout_fails_the_prolog() {
    let tmp = TempDir::new().expect("tempdir");
    {
        let table = id_name_table("rt_mismatch");
        let sink = Sink::new(RecordSink::create(tmp.path(), OpenMode::Append).expect("sink"));
        table.bind(&sink).expect("bind");
        table.prolog().expect("prolog");
        emit_two(&table);
        table.epilog().expect("epilog");
    }

    // same table name, different column set
    let table = Table::results("rt_mismatch").expect("table");
    table
        .add_item(Column::value("id", "%u", 0u32).expect("column"))
        .expect("add");
    let sink = Sink::new(RecordSink::create(tmp.path(), OpenMode::Append).expect("sink"));
    table.bind(&sink).expect("bind");
    let err = table.prolog().expect_err("layout mismatch must fail");
    assert!(err.to_string().contains("different record layout"));
    assert!(!table.is_locked());
}

#[test]
fn truncate_mode_replaces_an_existing_dataset() {
    let tmp = TempDir::new().expect("tempdir");
    let table = id_name_table("rt_truncate");

    {
        let sink = Sink::new(RecordSink::create(tmp.path(), OpenMode::Truncate).expect("sink"));
        table.bind(&sink).expect("bind");
        table.prolog().expect("prolog");
        emit_two(&table);
        table.epilog().expect("epilog");
        table.unbind_all().expect("unbind");
    }
    {
        let sink = Sink::new(RecordSink::create(tmp.path(), OpenMode::Truncate).expect("sink"));
        table.bind(&sink).expect("bind");
        table.prolog().expect("prolog");
        table.column("id").expect("id").set_number(9.0).expect("set");
        table.emit_row().expect("emit");
        table.epilog().expect("epilog");
        table.unbind_all().expect("unbind");
    }

    let store = StoreLocation::open(tmp.path()).expect("store");
    assert_eq!(store.dataset_len("rt_truncate").expect("len"), 1);
}

#[test]
fn tables_with_groups_flatten_into_one_record() {
    let tmp = TempDir::new().expect("tempdir");
    let table = Table::results("rt_groups").expect("table");
    table
        .add_item(Column::value("flag", "%d", false).expect("column"))
        .expect("add");
    let grp = rowsink_core::Group::new("m").expect("group");
    grp.add_item(Column::value("zeta", "%.10g", 0f64).expect("column"))
        .expect("add");
    table.add_item(&grp).expect("add");

    let record = RecordSink::create(tmp.path(), OpenMode::Truncate).expect("sink");
    let store = std::rc::Rc::clone(record.location());
    let sink = Sink::new(record);
    table.bind(&sink).expect("bind");

    table.prolog().expect("prolog");
    table
        .column("flag")
        .expect("flag")
        .set_number(1.0)
        .expect("set");
    table
        .column("m/zeta")
        .expect("zeta")
        .set_number(0.5)
        .expect("set");
    table.emit_row().expect("emit");
    table.epilog().expect("epilog");

    let layout = store.read_layout("rt_groups").expect("layout");
    assert_eq!(layout.fields[0].name, "flag");
    assert_eq!(layout.fields[1].name, "m/zeta");
    assert_eq!(layout.fields[1].offset, 8);
    assert_eq!(layout.size, 16);

    let rows = store.read_rows("rt_groups").expect("rows");
    assert_eq!(rows[0], 1);
    assert_eq!(&rows[8..16], &0.5f64.to_ne_bytes());
}

#[test]
fn record_sinks_come_out_of_the_url_factory() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("store");
    let url = format!("hdf5:{}", root.display());
    let sink = open_url(&url).expect("factory");

    let table = id_name_table("rt_url");
    table.bind(&sink).expect("bind");
    table.prolog().expect("prolog");
    emit_two(&table);
    table.epilog().expect("epilog");

    let store = StoreLocation::open(&root).expect("store");
    assert_eq!(store.dataset_len("rt_url").expect("len"), 2);
}

#[test]
fn text_sinks_come_out_of_the_url_factory() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("out.csv");
    let url = format!("file:{}?format=csvtab", path.display());
    let sink = open_url(&url).expect("factory");

    let table = id_name_table("rt_url_text");
    table.bind(&sink).expect("bind");
    table.prolog().expect("prolog");
    table.column("id").expect("id").set_number(5.0).expect("set");
    table
        .column("name")
        .expect("name")
        .set_text("x")
        .expect("set");
    table.emit_row().expect("emit");
    table.epilog().expect("epilog");
    sink.flush().expect("flush");

    let written = std::fs::read_to_string(&path).expect("read back");
    assert_eq!(written, "id,name\n5,x\n");
}

#[test]
fn bad_urls_are_descriptive() {
    assert!(open_url("file:out.csv?format=psv")
        .expect_err("bad format value")
        .to_string()
        .contains("format"));
    assert!(open_url("file:out.csv?open_mode=maybe")
        .expect_err("bad open_mode value")
        .to_string()
        .contains("open_mode"));
    assert!(open_url("carrier-pigeon:window")
        .expect_err("unknown scheme")
        .to_string()
        .contains("carrier-pigeon"));
    assert!(open_url("not a url")
        .expect_err("malformed")
        .to_string()
        .contains("malformed"));
}
