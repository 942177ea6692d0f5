//! The engine facade and the B-tree algorithms. A database file holds
//! many B-trees, each identified by its root page; every operation here
//! is a sequence of pager reads and writes composed out of the node
//! operations, and the algorithms never touch the file directly.

use std::path::Path;

use itertools::Itertools;
use log::debug;

use crate::bytes::{get2, put2};
use crate::cell::Cell;
use crate::errors::{DbError, Result};
use crate::header::{pack_header, verify_header, HEADER_SIZE};
use crate::node::{Node, NodeKind};
use crate::pager::{Pager, DEFAULT_PAGE_SIZE};

/// Per-row overhead of a table leaf: the 8-byte leaf node header, the
/// 8-byte cell header and the 2-byte offset-array slot.
const LEAF_ROW_OVERHEAD: usize = 18;

pub struct Btree {
    pager: Pager,
}

impl Btree {
    /// Opens a database file, creating and initialising it when the
    /// file is new. A new file gets the default page size, an empty
    /// table-leaf root on page 1 and the 100-byte file header.
    pub fn open(path: &Path) -> Result<Btree> {
        let mut pager = Pager::open(path)?;
        let mut header = [0u8; HEADER_SIZE];
        match pager.read_header(&mut header) {
            Ok(()) => {
                pager.set_page_size(get2(&header, 16))?;
                verify_header(&header)?;
                Ok(Btree { pager })
            }
            Err(DbError::NoHeader) => {
                pager.set_page_size(DEFAULT_PAGE_SIZE)?;
                let mut btree = Btree { pager };
                let nroot = btree.new_node(NodeKind::TableLeaf)?;
                debug!("created table root on page {nroot}");

                let mut page = btree.pager.read_page(nroot)?;
                pack_header(&mut page.data, btree.pager.page_size());
                btree.pager.write_page(&page)?;
                Ok(btree)
            }
            Err(err) => Err(err),
        }
    }

    /// Releases the pager, closing the file.
    pub fn close(self) -> Result<()> {
        Ok(())
    }

    pub fn page_size(&self) -> u16 {
        self.pager.page_size()
    }

    pub fn n_pages(&self) -> u32 {
        self.pager.n_pages()
    }

    /// Allocates a new page and initialises it as an empty node.
    pub fn new_node(&mut self, kind: NodeKind) -> Result<u32> {
        let npage = self.pager.allocate_page();
        self.init_empty_node(npage, kind)?;
        Ok(npage)
    }

    /// Initialises `npage` as an empty node of `kind`. On page 1 the
    /// file header bytes are left untouched. The right-page slot is not
    /// written; it only becomes meaningful once an algorithm sets it.
    pub fn init_empty_node(&mut self, npage: u32, kind: NodeKind) -> Result<()> {
        let mut page = self.pager.read_page(npage)?;
        let start = if npage == 1 { HEADER_SIZE } else { 0 };
        page.data[start..].fill(0);
        page.data[start] = kind.to_u8();
        put2(&mut page.data, start + 1, (start + kind.header_size()) as u16);
        put2(&mut page.data, start + 5, self.pager.page_size());
        // n_cells and the reserved byte stay zero
        self.pager.write_page(&page)
    }

    /// Loads the node stored on `npage`.
    pub fn get_node_by_page(&mut self, npage: u32) -> Result<Node> {
        let page = self.pager.read_page(npage)?;
        Node::parse(page)
    }

    /// Flushes the node header fields into the page and persists it.
    /// The offset array and cell bodies are already in place.
    pub fn write_node(&mut self, node: &mut Node) -> Result<()> {
        node.flush_header();
        self.pager.write_page(&node.page)
    }

    /// Releases the node's page buffer.
    pub fn free_node(&mut self, node: Node) {
        drop(node);
    }

    /// Looks up `key` in the B-tree rooted at `nroot` and copies out
    /// the payload: the row data for a table B-tree, the primary key as
    /// four big-endian bytes for an index B-tree.
    pub fn find(&mut self, nroot: u32, key: u32) -> Result<Vec<u8>> {
        let node = self.get_node_by_page(nroot)?;

        if node.kind.is_internal() {
            let hit = node.cells().find_position(|cell| key <= cell.key());
            let child = match hit {
                // indices store records in internal nodes too
                Some((_, Cell::IndexInternal {
                    idx_key, pk_key, ..
                })) if idx_key == key => {
                    return Ok(pk_key.to_be_bytes().to_vec());
                }
                Some((_, cell)) => cell
                    .child_page()
                    .ok_or(DbError::Misuse("leaf cell in internal node"))?,
                None => node.right_page,
            };
            self.free_node(node);
            debug!("descending to page {child} for key {key}");
            return self.find(child, key);
        }

        let hit = node.cells().find(|cell| cell.key() == key);
        match hit {
            Some(Cell::TableLeaf { data, .. }) => Ok(data),
            Some(Cell::IndexLeaf { pk_key, .. }) => Ok(pk_key.to_be_bytes().to_vec()),
            _ => Err(DbError::NotFound(key)),
        }
    }

    /// Inserts a row into the table B-tree rooted at `nroot`.
    pub fn insert_in_table(&mut self, nroot: u32, key: u32, data: &[u8]) -> Result<()> {
        if data.len() > self.pager.page_size() as usize - LEAF_ROW_OVERHEAD {
            return Err(DbError::TooLarge(data.len()));
        }
        self.insert(
            nroot,
            Cell::TableLeaf {
                key,
                data: data.to_vec(),
            },
        )
    }

    /// Inserts a key pair into the index B-tree rooted at `nroot`.
    pub fn insert_in_index(&mut self, nroot: u32, idx_key: u32, pk_key: u32) -> Result<()> {
        self.insert(nroot, Cell::IndexLeaf { idx_key, pk_key })
    }

    /// Inserts `cell` into the B-tree rooted at `nroot`, splitting the
    /// root first when it cannot take the cell. The root keeps its page
    /// number across the split, so external references to it stay valid
    /// and page 1 keeps the file header.
    pub fn insert(&mut self, nroot: u32, cell: Cell) -> Result<()> {
        let root = self.get_node_by_page(nroot)?;
        if !root.is_full(&cell) {
            self.free_node(root);
            return self.insert_non_full(nroot, cell);
        }

        debug!("root page {nroot} is full, splitting");
        let parent_kind = if root.kind.is_table() {
            NodeKind::TableInternal
        } else {
            NodeKind::IndexInternal
        };

        // Move the full root's content to a fresh page, then turn the
        // root page into an empty parent above it.
        let npage_moved = self.new_node(root.kind)?;
        let mut moved = self.get_node_by_page(npage_moved)?;
        for ncell in 0..root.n_cells {
            moved.insert_cell(ncell, &root.get_cell(ncell)?)?;
        }
        moved.right_page = root.right_page;
        self.write_node(&mut moved)?;
        self.free_node(moved);
        self.free_node(root);

        self.init_empty_node(nroot, parent_kind)?;
        self.split(nroot, npage_moved, 0)?;

        let mut new_root = self.get_node_by_page(nroot)?;
        new_root.right_page = npage_moved;
        self.write_node(&mut new_root)?;
        self.free_node(new_root);

        self.insert_non_full(nroot, cell)
    }

    /// Inserts `cell` under `npage`, a node known not to be full. A
    /// leaf takes the cell at its key position; an internal node
    /// descends, splitting the chosen child first when the child could
    /// not take the cell.
    pub fn insert_non_full(&mut self, npage: u32, cell: Cell) -> Result<()> {
        let mut node = self.get_node_by_page(npage)?;
        let key = cell.key();

        let pos = node.cells().find_position(|existing| key <= existing.key());
        if let Some((_, existing)) = &pos {
            if existing.key() == key {
                self.free_node(node);
                return Err(DbError::Duplicate(key));
            }
        }

        if !node.kind.is_internal() {
            let point = pos.map(|(i, _)| i as u16).unwrap_or(node.n_cells);
            debug!("inserting key {key} into leaf page {npage} at cell {point}");
            node.insert_cell(point, &cell)?;
            self.write_node(&mut node)?;
            self.free_node(node);
            return Ok(());
        }

        let (point, child) = match pos {
            Some((i, existing)) => (
                i as u16,
                existing
                    .child_page()
                    .ok_or(DbError::Misuse("leaf cell in internal node"))?,
            ),
            None => (node.n_cells, node.right_page),
        };
        self.free_node(node);

        let child_node = self.get_node_by_page(child)?;
        let child_full = child_node.is_full(&cell);
        self.free_node(child_node);

        if child_full {
            self.split(npage, child, point)?;
            // the right subtree for the key is re-selected now that the
            // median sits in the parent
            self.insert_non_full(npage, cell)
        } else {
            self.insert_non_full(child, cell)
        }
    }

    /// Splits the full node on `npage_child` under its parent
    /// `npage_parent` (internal, not full). The median key moves up
    /// into the parent at `parent_ncell`; cells below the median move
    /// to a freshly allocated sibling, whose page number is returned.
    /// For table leaves the median cell itself moves to the sibling as
    /// well, since every row must stay in a leaf.
    pub fn split(&mut self, npage_parent: u32, npage_child: u32, parent_ncell: u16) -> Result<u32> {
        let mut parent = self.get_node_by_page(npage_parent)?;
        let mut child = self.get_node_by_page(npage_child)?;
        if child.n_cells == 0 {
            return Err(DbError::BadCellNo(0));
        }

        let npage_new = self.new_node(child.kind)?;
        let mut new_child = self.get_node_by_page(npage_new)?;
        debug!(
            "splitting page {npage_child} under page {npage_parent}, new sibling {npage_new}"
        );

        let median_ncell = if child.n_cells % 2 == 0 {
            child.n_cells / 2 - 1
        } else {
            child.n_cells / 2
        };
        let median = child.get_cell(median_ncell)?;

        let parent_cell = match parent.kind {
            NodeKind::TableInternal => Cell::TableInternal {
                child_page: npage_new,
                key: median.key(),
            },
            NodeKind::IndexInternal => Cell::IndexInternal {
                child_page: npage_new,
                idx_key: median.key(),
                pk_key: median
                    .pk_key()
                    .ok_or(DbError::Misuse("index split over a table cell"))?,
            },
            _ => return Err(DbError::Misuse("split parent must be internal")),
        };
        parent.insert_cell(parent_ncell, &parent_cell)?;

        // Cells below the median move over one at a time; removing a
        // body shifts the ones still to be copied, so offsets are
        // re-resolved through the offset array on every iteration.
        for ncell in 0..median_ncell {
            let cell = child.get_cell(ncell)?;
            new_child.insert_cell(ncell, &cell)?;
            child.remove_cell_block(ncell)?;
        }
        if child.kind == NodeKind::TableLeaf {
            new_child.insert_cell(median_ncell, &child.get_cell(median_ncell)?)?;
        } else if child.kind.is_internal() {
            new_child.right_page = median
                .child_page()
                .ok_or(DbError::Misuse("leaf cell in internal node"))?;
        }
        child.remove_cell_block(median_ncell)?;

        // Collapse the offset array: the suffix past the median becomes
        // the whole array.
        let array = child.offset_array();
        let from = array + 2 * (median_ncell as usize + 1);
        let to = array + 2 * child.n_cells as usize;
        child.page.data.copy_within(from..to, array);
        child.n_cells -= median_ncell + 1;
        child.free_offset -= 2 * (median_ncell + 1);

        self.write_node(&mut parent)?;
        self.free_node(parent);
        self.write_node(&mut child)?;
        self.free_node(child);
        self.write_node(&mut new_child)?;
        self.free_node(new_child);

        Ok(npage_new)
    }
}
