/*
A B-tree page is divided into regions in the following order:

    The 100-byte database file header (page 1 only)
    The 8 or 12 byte node header
    The cell offset array
    Free space
    The cell content area, growing downward from the end of the page

The node header is 8 bytes for leaf nodes and 12 bytes for internal
nodes. All multibyte values are big-endian:

Offset  Size  Description
0       1     Node type: 0x05 table internal, 0x0D table leaf,
              0x02 index internal, 0x0A index leaf
1       2     First free byte after the node header + offset array
3       2     Number of cells
5       2     Offset of the lowest-addressed cell
7       1     Reserved, zero
8       4     Right page, the "greater than all keys" child.
              Internal nodes only.

The offsets at 1 and 5 are page-start-relative, so on page 1 an empty
leaf carries free_offset 108 while cells_offset is always the page size
when the node is empty.

The cell offset array holds n_cells 2-byte offsets in logical key
order, each pointing at a cell within the same page.
*/

use log::trace;

use crate::bytes::{get2, get4, put2, put4};
use crate::cell::Cell;
use crate::errors::{DbError, Result};
use crate::header::HEADER_SIZE;
use crate::pager::MemPage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    TableInternal,
    TableLeaf,
    IndexInternal,
    IndexLeaf,
}

impl NodeKind {
    pub fn from_u8(val: u8) -> Option<NodeKind> {
        match val {
            0x05 => Some(NodeKind::TableInternal),
            0x0D => Some(NodeKind::TableLeaf),
            0x02 => Some(NodeKind::IndexInternal),
            0x0A => Some(NodeKind::IndexLeaf),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            NodeKind::TableInternal => 0x05,
            NodeKind::TableLeaf => 0x0D,
            NodeKind::IndexInternal => 0x02,
            NodeKind::IndexLeaf => 0x0A,
        }
    }

    pub fn is_internal(self) -> bool {
        matches!(self, NodeKind::TableInternal | NodeKind::IndexInternal)
    }

    pub fn is_table(self) -> bool {
        matches!(self, NodeKind::TableInternal | NodeKind::TableLeaf)
    }

    /// 12 bytes for internal nodes (the right-page slot), 8 for leaves.
    pub fn header_size(self) -> usize {
        if self.is_internal() {
            12
        } else {
            8
        }
    }
}

/// A B-tree node overlaid on one page. The page buffer is the canonical
/// storage for the offset array and the cell bodies, which are edited
/// in place; the parsed header fields below reach the page when the
/// node is written back.
pub struct Node {
    pub page: MemPage,
    pub kind: NodeKind,
    pub free_offset: u16,
    pub n_cells: u16,
    pub cells_offset: u16,
    /// Zero for leaf nodes.
    pub right_page: u32,
}

impl Node {
    /// Offset of the node header within the page: 100 on page 1 (past
    /// the file header), 0 everywhere else.
    pub fn node_start(&self) -> usize {
        if self.page.npage == 1 {
            HEADER_SIZE
        } else {
            0
        }
    }

    /// Offset of the cell offset array within the page.
    pub fn offset_array(&self) -> usize {
        self.node_start() + self.kind.header_size()
    }

    /// Overlays a node on a page buffer, parsing the header fields.
    pub fn parse(page: MemPage) -> Result<Node> {
        let start = if page.npage == 1 { HEADER_SIZE } else { 0 };
        let kind = NodeKind::from_u8(page.data[start]).ok_or(DbError::CorruptHeader)?;
        let free_offset = get2(&page.data, start + 1);
        let n_cells = get2(&page.data, start + 3);
        let cells_offset = get2(&page.data, start + 5);
        let right_page = if kind.is_internal() {
            get4(&page.data, start + 8)
        } else {
            0
        };
        Ok(Node {
            page,
            kind,
            free_offset,
            n_cells,
            cells_offset,
            right_page,
        })
    }

    /// Flushes the parsed header fields into the page bytes.
    pub fn flush_header(&mut self) {
        let start = self.node_start();
        self.page.data[start] = self.kind.to_u8();
        put2(&mut self.page.data, start + 1, self.free_offset);
        put2(&mut self.page.data, start + 3, self.n_cells);
        put2(&mut self.page.data, start + 5, self.cells_offset);
        if self.kind.is_internal() {
            put4(&mut self.page.data, start + 8, self.right_page);
        }
    }

    fn cell_offset(&self, ncell: u16) -> usize {
        get2(&self.page.data, self.offset_array() + 2 * ncell as usize) as usize
    }

    /// Reads cell `ncell` out of the page.
    pub fn get_cell(&self, ncell: u16) -> Result<Cell> {
        if ncell >= self.n_cells {
            return Err(DbError::BadCellNo(ncell));
        }
        let offset = self.cell_offset(ncell);
        Ok(Cell::parse(self.kind, &self.page.data[offset..]))
    }

    /// The cells in offset-array (key) order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.n_cells).map(move |ncell| {
            let offset = self.cell_offset(ncell);
            Cell::parse(self.kind, &self.page.data[offset..])
        })
    }

    /// True when the free region cannot take one more cell plus its
    /// 2-byte offset-array slot. The cell is sized as this node would
    /// store it: an internal node only ever receives fixed-size
    /// promoted cells, however large the row being inserted below it.
    pub fn is_full(&self, cell: &Cell) -> bool {
        let cell_size = match self.kind {
            NodeKind::TableInternal => 8,
            NodeKind::IndexLeaf => 12,
            NodeKind::IndexInternal => 16,
            NodeKind::TableLeaf => cell.size(),
        };
        let free = self.cells_offset as usize - self.free_offset as usize;
        free < cell_size + 2
    }

    /// Inserts `cell` at position `ncell`, shifting the offset-array
    /// suffix one slot forward. `ncell == n_cells` appends. The caller
    /// has already established that the node is not full.
    pub fn insert_cell(&mut self, ncell: u16, cell: &Cell) -> Result<()> {
        if cell.kind() != self.kind {
            return Err(DbError::Misuse("cell variant does not match node type"));
        }
        if ncell > self.n_cells {
            return Err(DbError::BadCellNo(ncell));
        }
        let cell_size = cell.size();
        let free = self.cells_offset as usize - self.free_offset as usize;
        if free < cell_size + 2 {
            // caller bug or corruption; refuse to produce a mangled page
            return Err(DbError::Misuse("no space left in node for cell"));
        }

        let new_offset = self.cells_offset as usize - cell_size;
        cell.encode(&mut self.page.data[new_offset..new_offset + cell_size]);

        let slot = self.offset_array() + 2 * ncell as usize;
        if ncell < self.n_cells {
            let end = self.offset_array() + 2 * self.n_cells as usize;
            self.page.data.copy_within(slot..end, slot + 2);
        }
        put2(&mut self.page.data, slot, new_offset as u16);

        self.cells_offset = new_offset as u16;
        self.free_offset += 2;
        self.n_cells += 1;
        self.flush_header();
        trace!(
            "page {}: cell {} in at offset {}, {} cells",
            self.page.npage,
            ncell,
            new_offset,
            self.n_cells
        );
        Ok(())
    }

    /// Reclaims the body bytes of cell `ncell`: every cell body below
    /// it shifts up to fill the hole and the offset-array entries that
    /// pointed below it are rewritten. The removed cell's own
    /// offset-array slot is left for the caller to collapse.
    pub fn remove_cell_block(&mut self, ncell: u16) -> Result<()> {
        let cell_size = self.get_cell(ncell)?.size();
        let removed = self.cell_offset(ncell);
        let cells_offset = self.cells_offset as usize;

        self.page
            .data
            .copy_within(cells_offset..removed, cells_offset + cell_size);

        for i in 0..self.n_cells {
            if i == ncell {
                continue;
            }
            let slot = self.offset_array() + 2 * i as usize;
            let offset = get2(&self.page.data, slot) as usize;
            if offset < removed {
                put2(&mut self.page.data, slot, (offset + cell_size) as u16);
            }
        }

        self.cells_offset = (cells_offset + cell_size) as u16;
        self.flush_header();
        Ok(())
    }
}
