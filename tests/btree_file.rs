//! End-to-end scenarios over real database files.

use std::fs;
use std::path::PathBuf;

use itertools::Itertools;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use minidb::btree::Btree;
use minidb::errors::DbError;
use minidb::node::NodeKind;

fn scratch(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

/// The header a freshly created 1024-byte-page file must carry,
/// written out longhand so the test does not lean on the packer.
fn expected_header() -> [u8; 100] {
    let mut header = [0u8; 100];
    header[..16].copy_from_slice(b"SQLite format 3\0");
    header[16] = 0x04; // page size 1024
    header[18..24].copy_from_slice(&[0x01, 0x01, 0x00, 0x40, 0x20, 0x20]);
    header[47] = 0x01; // word at 44 is 1
    header[50] = 0x4E; // word at 48 is 20000
    header[51] = 0x20;
    header[59] = 0x01; // word at 56 is 1
    header
}

#[test]
fn open_creates_an_empty_table_root_with_header() {
    let dir = TempDir::new().unwrap();
    let path = scratch(&dir, "new.db");

    let btree = Btree::open(&path).unwrap();
    btree.close().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 1024);
    assert_eq!(&bytes[..100], &expected_header());

    // the node past the file header is an empty table leaf
    assert_eq!(bytes[100], 0x0D);
    assert_eq!(&bytes[101..103], &[0x00, 0x6C]); // free_offset 108
    assert_eq!(&bytes[103..105], &[0x00, 0x00]); // no cells
    assert_eq!(&bytes[105..107], &[0x04, 0x00]); // cells_offset 1024
}

#[test]
fn open_is_idempotent_on_a_valid_file() {
    let dir = TempDir::new().unwrap();
    let path = scratch(&dir, "idem.db");

    Btree::open(&path).unwrap().close().unwrap();
    let first = fs::read(&path).unwrap();

    Btree::open(&path).unwrap().close().unwrap();
    let second = fs::read(&path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn three_ascending_rows_in_the_root() {
    let dir = TempDir::new().unwrap();
    let mut btree = Btree::open(&scratch(&dir, "three.db")).unwrap();

    btree.insert_in_table(1, 7, b"a").unwrap();
    btree.insert_in_table(1, 11, b"b").unwrap();
    btree.insert_in_table(1, 42, b"c").unwrap();

    assert_eq!(btree.find(1, 11).unwrap(), b"b");
    assert!(matches!(btree.find(1, 8), Err(DbError::NotFound(8))));

    let root = btree.get_node_by_page(1).unwrap();
    assert_eq!(root.n_cells, 3);
    assert!(root
        .cells()
        .map(|c| c.key())
        .tuple_windows()
        .all(|(a, b)| a < b));
}

#[test]
fn duplicate_key_leaves_the_first_row_in_place() {
    let dir = TempDir::new().unwrap();
    let mut btree = Btree::open(&scratch(&dir, "dup.db")).unwrap();

    btree.insert_in_table(1, 7, b"a").unwrap();
    assert!(matches!(
        btree.insert_in_table(1, 7, b"x"),
        Err(DbError::Duplicate(7))
    ));
    assert_eq!(btree.find(1, 7).unwrap(), b"a");
}

#[test]
fn fifth_wide_row_splits_the_header_page_root() {
    let dir = TempDir::new().unwrap();
    let path = scratch(&dir, "split.db");
    let mut btree = Btree::open(&path).unwrap();

    // four 200-byte rows fill the page-1 root; the fifth forces the
    // preemptive root split
    for key in [10u32, 20, 30, 40] {
        btree.insert_in_table(1, key, &vec![key as u8; 200]).unwrap();
    }
    assert_eq!(btree.n_pages(), 1);
    btree.insert_in_table(1, 50, &vec![50u8; 200]).unwrap();
    assert_eq!(btree.n_pages(), 3);

    // page 1 stays the root and keeps the file header
    let root = btree.get_node_by_page(1).unwrap();
    assert_eq!(root.kind, NodeKind::TableInternal);
    assert_eq!(root.n_cells, 1);
    let promoted = root.get_cell(0).unwrap();
    assert_eq!(promoted.key(), 20); // median of the four resident keys
    let lower_page = promoted.child_page().unwrap();
    let upper_page = root.right_page;
    btree.free_node(root);

    let lower = btree.get_node_by_page(lower_page).unwrap();
    assert_eq!(lower.kind, NodeKind::TableLeaf);
    assert_eq!(lower.cells().map(|c| c.key()).collect::<Vec<_>>(), [10, 20]);
    btree.free_node(lower);

    let upper = btree.get_node_by_page(upper_page).unwrap();
    assert_eq!(upper.kind, NodeKind::TableLeaf);
    assert_eq!(
        upper.cells().map(|c| c.key()).collect::<Vec<_>>(),
        [30, 40, 50]
    );
    btree.free_node(upper);

    for key in [10u32, 20, 30, 40, 50] {
        assert_eq!(btree.find(1, key).unwrap(), vec![key as u8; 200]);
    }

    // header survived the split of its own page
    btree.close().unwrap();
    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..100], &expected_header());
}

#[test]
fn exact_fit_insert_succeeds_where_one_more_byte_splits() {
    let dir = TempDir::new().unwrap();

    // page-1 root has 916 free bytes; two 400-byte rows leave 96, and a
    // row needs len + 10 bytes: 86 fits exactly
    let mut btree = Btree::open(&scratch(&dir, "fit.db")).unwrap();
    btree.insert_in_table(1, 1, &[0x11; 400]).unwrap();
    btree.insert_in_table(1, 2, &[0x22; 400]).unwrap();
    btree.insert_in_table(1, 3, &[0x33; 86]).unwrap();
    assert_eq!(btree.n_pages(), 1);

    let mut btree = Btree::open(&scratch(&dir, "spill.db")).unwrap();
    btree.insert_in_table(1, 1, &[0x11; 400]).unwrap();
    btree.insert_in_table(1, 2, &[0x22; 400]).unwrap();
    btree.insert_in_table(1, 3, &[0x33; 87]).unwrap();
    assert_eq!(btree.n_pages(), 3);
    for key in [1u32, 2, 3] {
        assert!(btree.find(1, key).is_ok());
    }
}

#[test]
fn corrupt_write_version_fails_open() {
    let dir = TempDir::new().unwrap();
    let path = scratch(&dir, "corrupt.db");
    Btree::open(&path).unwrap().close().unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[18] = 0x02;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(Btree::open(&path), Err(DbError::CorruptHeader)));
}

#[test]
fn index_key_resolved_from_an_internal_node() {
    let dir = TempDir::new().unwrap();
    let mut btree = Btree::open(&scratch(&dir, "index.db")).unwrap();

    let iroot = btree.new_node(NodeKind::IndexLeaf).unwrap();
    // 72 cells fill the root leaf; the 73rd splits it, promoting the
    // median (key 100) into the new internal root together with its
    // primary key
    for idx_key in 65u32..=144 {
        btree.insert_in_index(iroot, idx_key, idx_key + 9000).unwrap();
    }

    let root = btree.get_node_by_page(iroot).unwrap();
    assert_eq!(root.kind, NodeKind::IndexInternal);
    assert!(root.cells().any(|c| c.key() == 100));
    btree.free_node(root);

    assert_eq!(btree.find(iroot, 100).unwrap(), 9100u32.to_be_bytes());

    // keys living in leaves still resolve, missing keys do not
    assert_eq!(btree.find(iroot, 65).unwrap(), 9065u32.to_be_bytes());
    assert_eq!(btree.find(iroot, 144).unwrap(), 9144u32.to_be_bytes());
    assert!(matches!(btree.find(iroot, 50), Err(DbError::NotFound(50))));

    assert!(matches!(
        btree.insert_in_index(iroot, 100, 1),
        Err(DbError::Duplicate(100))
    ));
}

#[test]
fn hundreds_of_rows_survive_repeated_splits_and_reopen() {
    let dir = TempDir::new().unwrap();
    let path = scratch(&dir, "deep.db");
    let mut btree = Btree::open(&path).unwrap();

    for key in 0..900u32 {
        btree
            .insert_in_table(1, key, format!("row-{key:0>96}").as_bytes())
            .unwrap();
    }

    // every node in the file still satisfies the header relations and
    // keeps its cells in strictly increasing key order
    for npage in 1..=btree.n_pages() {
        let node = btree.get_node_by_page(npage).unwrap();
        let start = if npage == 1 { 100 } else { 0 };
        assert_eq!(
            node.free_offset as usize,
            start + node.kind.header_size() + 2 * node.n_cells as usize
        );
        assert!(node.cells_offset >= node.free_offset);
        assert!(node
            .cells()
            .map(|c| c.key())
            .tuple_windows()
            .all(|(a, b)| a < b));
        btree.free_node(node);
    }

    for key in (0..900u32).step_by(97) {
        assert_eq!(
            btree.find(1, key).unwrap(),
            format!("row-{key:0>96}").into_bytes()
        );
    }
    assert!(matches!(
        btree.find(1, 99_999),
        Err(DbError::NotFound(99_999))
    ));
    btree.close().unwrap();

    // rows are durable across a reopen
    let mut btree = Btree::open(&path).unwrap();
    for key in (0..900u32).step_by(131) {
        assert_eq!(
            btree.find(1, key).unwrap(),
            format!("row-{key:0>96}").into_bytes()
        );
    }
}
