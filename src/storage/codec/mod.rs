mod common;
mod header_page;
mod index_page;
mod table_page;
mod tuple;

pub use common::CommonCodec;
pub use header_page::HeaderPageCodec;
pub use index_page::{
    BPlusTreeInternalPageCodec, BPlusTreeLeafPageCodec, BPlusTreePageCodec,
    BPlusTreePageTypeCodec,
};
pub use table_page::{TablePageCodec, TablePageHeaderCodec, TupleInfoCodec, TupleMetaCodec};
pub use tuple::{RecordIdCodec, ScalarValueCodec, TupleCodec};

use crate::buffer::PAGE_SIZE;

/// Decoded value plus the number of bytes consumed.
pub type DecodedData<T> = (T, usize);

/// Pad an encoded page image out to a full page.
pub fn page_bytes_to_array(bytes: &[u8]) -> [u8; PAGE_SIZE] {
    debug_assert!(bytes.len() <= PAGE_SIZE);
    let mut data = [0u8; PAGE_SIZE];
    data[..bytes.len()].copy_from_slice(bytes);
    data
}
