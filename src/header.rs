/*
File header, kept in the first 100 bytes of page 1:

Offset  Size  Description
0       16    The header string: "SQLite format 3\000"
16      2     The database page size in bytes
18      1     File format write version, always 1
19      1     File format read version, always 1
20      1     Bytes of reserved space at the end of each page, always 0
21      1     Maximum embedded payload fraction, always 0x40
22      1     Minimum embedded payload fraction, always 0x20
23      1     Leaf payload fraction, always 0x20
24      4     File change counter, 0 on create
32      4     Always 0
36      4     Always 0
40      4     Schema version, 0 on create
44      4     Always 1
48      4     Page cache size hint, always 20000
52      4     Always 0
56      4     Always 1
60      4     User cookie, 0 on create
64      4     Always 0
68..99        Unused, written as zero
*/

use crate::bytes::{get2, get4, put2, put4};
use crate::errors::{DbError, Result};

pub const HEADER_SIZE: usize = 100;
pub const MAGIC: &[u8; 16] = b"SQLite format 3\0";

pub const MIN_PAGE_SIZE: u16 = 512;
pub const MAX_PAGE_SIZE: u16 = 32768;

const PAGE_CACHE_SIZE: u32 = 20000;

/// A valid page size is a power of two that keeps every in-page offset
/// representable in the 2-byte header fields.
pub fn valid_page_size(page_size: u16) -> bool {
    page_size.is_power_of_two() && (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size)
}

/// Packs the default header for a freshly created file into the first
/// 100 bytes of `buf`.
pub fn pack_header(buf: &mut [u8], page_size: u16) {
    buf[..HEADER_SIZE].fill(0);
    buf[..16].copy_from_slice(MAGIC);
    put2(buf, 16, page_size);
    buf[18] = 0x01;
    buf[19] = 0x01;
    buf[20] = 0x00;
    buf[21] = 0x40;
    buf[22] = 0x20;
    buf[23] = 0x20;
    put4(buf, 24, 0); // file change counter
    put4(buf, 40, 0); // schema version
    put4(buf, 44, 1);
    put4(buf, 48, PAGE_CACHE_SIZE);
    put4(buf, 56, 1);
    put4(buf, 60, 0); // user cookie
}

/// Checks every fixed header byte and returns the recorded page size.
/// The change counter, schema version and user cookie are mutable over
/// the life of a file and are not checked.
pub fn verify_header(buf: &[u8]) -> Result<u16> {
    if &buf[..16] != MAGIC {
        return Err(DbError::CorruptHeader);
    }
    let page_size = get2(buf, 16);
    if !valid_page_size(page_size) {
        return Err(DbError::CorruptHeader);
    }
    if buf[18] != 0x01
        || buf[19] != 0x01
        || buf[20] != 0x00
        || buf[21] != 0x40
        || buf[22] != 0x20
        || buf[23] != 0x20
    {
        return Err(DbError::CorruptHeader);
    }
    if get4(buf, 32) != 0
        || get4(buf, 36) != 0
        || get4(buf, 44) != 1
        || get4(buf, 48) != PAGE_CACHE_SIZE
        || get4(buf, 52) != 0
        || get4(buf, 56) != 1
        || get4(buf, 64) != 0
    {
        return Err(DbError::CorruptHeader);
    }
    Ok(page_size)
}
