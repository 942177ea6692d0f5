/*
The shape of a cell depends on the type of node holding it:

Table internal (8 bytes):
    A 4-byte big-endian page number which is the left child pointer.
    A varint32 which is the integer key.

Table leaf (8 bytes + payload):
    A varint32 which is the number of bytes of payload.
    A varint32 which is the integer key, a.k.a. "rowid".
    The payload itself, opaque to the engine.

Index internal (16 bytes):
    A 4-byte big-endian page number which is the left child pointer.
    The record schema bytes 0x0B 0x03 0x04 0x04.
    A 4-byte big-endian indexed key.
    A 4-byte big-endian primary key.

Index leaf (12 bytes): as index internal without the child pointer.
*/

use crate::bytes::{get4, get_varint32, put4, put_varint32};
use crate::node::NodeKind;

/// Fixed record-schema bytes carried by every index cell. Emitted
/// verbatim on write, skipped on read.
const INDEX_RECORD_SCHEMA: [u8; 4] = [0x0B, 0x03, 0x04, 0x04];

/// One record within a node, one variant per node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    TableInternal {
        child_page: u32,
        key: u32,
    },
    TableLeaf {
        key: u32,
        data: Vec<u8>,
    },
    IndexInternal {
        child_page: u32,
        idx_key: u32,
        pk_key: u32,
    },
    IndexLeaf {
        idx_key: u32,
        pk_key: u32,
    },
}

impl Cell {
    pub fn kind(&self) -> NodeKind {
        match self {
            Cell::TableInternal { .. } => NodeKind::TableInternal,
            Cell::TableLeaf { .. } => NodeKind::TableLeaf,
            Cell::IndexInternal { .. } => NodeKind::IndexInternal,
            Cell::IndexLeaf { .. } => NodeKind::IndexLeaf,
        }
    }

    /// The ordering key: the row-id for table cells, the indexed column
    /// value for index cells.
    pub fn key(&self) -> u32 {
        match self {
            Cell::TableInternal { key, .. } => *key,
            Cell::TableLeaf { key, .. } => *key,
            Cell::IndexInternal { idx_key, .. } => *idx_key,
            Cell::IndexLeaf { idx_key, .. } => *idx_key,
        }
    }

    /// Left child pointer, for internal cells only.
    pub fn child_page(&self) -> Option<u32> {
        match self {
            Cell::TableInternal { child_page, .. } | Cell::IndexInternal { child_page, .. } => {
                Some(*child_page)
            }
            _ => None,
        }
    }

    /// Primary key carried by index cells.
    pub fn pk_key(&self) -> Option<u32> {
        match self {
            Cell::IndexInternal { pk_key, .. } | Cell::IndexLeaf { pk_key, .. } => Some(*pk_key),
            _ => None,
        }
    }

    /// On-page encoded size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Cell::TableInternal { .. } => 8,
            Cell::TableLeaf { data, .. } => 8 + data.len(),
            Cell::IndexInternal { .. } => 16,
            Cell::IndexLeaf { .. } => 12,
        }
    }

    /// Parses the cell starting at `buf[0]` for a node of `kind`.
    /// Table-leaf payload bytes are copied out of the page.
    pub fn parse(kind: NodeKind, buf: &[u8]) -> Cell {
        match kind {
            NodeKind::TableInternal => Cell::TableInternal {
                child_page: get4(buf, 0),
                key: get_varint32(buf, 4),
            },
            NodeKind::TableLeaf => {
                let data_size = get_varint32(buf, 0) as usize;
                Cell::TableLeaf {
                    key: get_varint32(buf, 4),
                    data: buf[8..8 + data_size].to_vec(),
                }
            }
            NodeKind::IndexInternal => Cell::IndexInternal {
                child_page: get4(buf, 0),
                idx_key: get4(buf, 8),
                pk_key: get4(buf, 12),
            },
            NodeKind::IndexLeaf => Cell::IndexLeaf {
                idx_key: get4(buf, 4),
                pk_key: get4(buf, 8),
            },
        }
    }

    /// Encodes the cell into `buf[..self.size()]`.
    pub fn encode(&self, buf: &mut [u8]) {
        match self {
            Cell::TableInternal { child_page, key } => {
                put4(buf, 0, *child_page);
                put_varint32(buf, 4, *key);
            }
            Cell::TableLeaf { key, data } => {
                put_varint32(buf, 0, data.len() as u32);
                put_varint32(buf, 4, *key);
                buf[8..8 + data.len()].copy_from_slice(data);
            }
            Cell::IndexInternal {
                child_page,
                idx_key,
                pk_key,
            } => {
                put4(buf, 0, *child_page);
                buf[4..8].copy_from_slice(&INDEX_RECORD_SCHEMA);
                put4(buf, 8, *idx_key);
                put4(buf, 12, *pk_key);
            }
            Cell::IndexLeaf { idx_key, pk_key } => {
                buf[..4].copy_from_slice(&INDEX_RECORD_SCHEMA);
                put4(buf, 4, *idx_key);
                put4(buf, 8, *pk_key);
            }
        }
    }
}
