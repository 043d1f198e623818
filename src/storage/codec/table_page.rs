use crate::buffer::PAGE_SIZE;
use crate::catalog::SchemaRef;
use crate::error::VellumResult;
use crate::storage::codec::{CommonCodec, DecodedData};
use crate::storage::page::{TablePage, TablePageHeader, TupleInfo, TupleMeta};

pub struct TupleMetaCodec;

impl TupleMetaCodec {
    pub fn encode(buf: &mut Vec<u8>, meta: &TupleMeta) {
        CommonCodec::encode_u64(buf, meta.insert_txn_id);
        CommonCodec::encode_u64(buf, meta.delete_txn_id);
        CommonCodec::encode_bool(buf, meta.is_deleted);
    }

    pub fn decode(bytes: &[u8]) -> VellumResult<DecodedData<TupleMeta>> {
        let (insert_txn_id, mut offset) = CommonCodec::decode_u64(bytes)?;
        let (delete_txn_id, n) = CommonCodec::decode_u64(&bytes[offset..])?;
        offset += n;
        let (is_deleted, n) = CommonCodec::decode_bool(&bytes[offset..])?;
        offset += n;
        Ok((
            TupleMeta {
                insert_txn_id,
                delete_txn_id,
                is_deleted,
            },
            offset,
        ))
    }
}

pub struct TupleInfoCodec;

impl TupleInfoCodec {
    pub fn encode(info: &TupleInfo) -> Vec<u8> {
        let mut buf = Vec::new();
        CommonCodec::encode_u16(&mut buf, info.offset);
        CommonCodec::encode_u16(&mut buf, info.size);
        TupleMetaCodec::encode(&mut buf, &info.meta);
        buf
    }

    pub fn decode(bytes: &[u8]) -> VellumResult<DecodedData<TupleInfo>> {
        let (offset_field, mut offset) = CommonCodec::decode_u16(bytes)?;
        let (size, n) = CommonCodec::decode_u16(&bytes[offset..])?;
        offset += n;
        let (meta, n) = TupleMetaCodec::decode(&bytes[offset..])?;
        offset += n;
        Ok((
            TupleInfo {
                offset: offset_field,
                size,
                meta,
            },
            offset,
        ))
    }
}

pub struct TablePageHeaderCodec;

impl TablePageHeaderCodec {
    pub fn encode(header: &TablePageHeader) -> Vec<u8> {
        let mut buf = Vec::new();
        CommonCodec::encode_u32(&mut buf, header.next_page_id);
        CommonCodec::encode_u16(&mut buf, header.num_tuples);
        CommonCodec::encode_u16(&mut buf, header.num_deleted_tuples);
        for info in header.tuple_infos.iter() {
            buf.extend(TupleInfoCodec::encode(info));
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> VellumResult<DecodedData<TablePageHeader>> {
        let (next_page_id, mut offset) = CommonCodec::decode_u32(bytes)?;
        let (num_tuples, n) = CommonCodec::decode_u16(&bytes[offset..])?;
        offset += n;
        let (num_deleted_tuples, n) = CommonCodec::decode_u16(&bytes[offset..])?;
        offset += n;
        let mut tuple_infos = Vec::with_capacity(num_tuples as usize);
        for _ in 0..num_tuples {
            let (info, n) = TupleInfoCodec::decode(&bytes[offset..])?;
            offset += n;
            tuple_infos.push(info);
        }
        Ok((
            TablePageHeader {
                next_page_id,
                num_tuples,
                num_deleted_tuples,
                tuple_infos,
            },
            offset,
        ))
    }
}

pub struct TablePageCodec;

impl TablePageCodec {
    /// The tuple bytes already live at their offsets inside `page.data`;
    /// encoding just lays the header over the front of that image.
    pub fn encode(page: &TablePage) -> [u8; PAGE_SIZE] {
        let header_bytes = TablePageHeaderCodec::encode(&page.header);
        let mut data = page.data;
        data[..header_bytes.len()].copy_from_slice(&header_bytes);
        data
    }

    pub fn decode(bytes: &[u8], schema: SchemaRef) -> VellumResult<DecodedData<TablePage>> {
        let (header, _) = TablePageHeaderCodec::decode(bytes)?;
        let mut data = [0u8; PAGE_SIZE];
        let len = bytes.len().min(PAGE_SIZE);
        data[..len].copy_from_slice(&bytes[..len]);
        Ok((
            TablePage {
                schema,
                header,
                data,
            },
            PAGE_SIZE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::INVALID_PAGE_ID;
    use crate::catalog::{Column, DataType, Schema};
    use crate::storage::tuple::Tuple;
    use std::sync::Arc;

    #[test]
    fn table_page_round_trip() {
        let schema = Arc::new(Schema::new(vec![
            Column::new("a", DataType::Int32, false),
            Column::new("b", DataType::Int64, false),
        ]));
        let mut page = TablePage::new(schema.clone(), INVALID_PAGE_ID);
        let meta = TupleMeta::new(5);
        page.insert_tuple(
            &meta,
            &Tuple::new(schema.clone(), vec![1i32.into(), 10i64.into()]),
        )
        .unwrap();
        page.insert_tuple(
            &meta,
            &Tuple::new(schema.clone(), vec![2i32.into(), 20i64.into()]),
        )
        .unwrap();

        let bytes = TablePageCodec::encode(&page);
        let (decoded, _) = TablePageCodec::decode(&bytes, schema).unwrap();
        assert_eq!(decoded.header, page.header);
        assert_eq!(decoded.tuple(0).unwrap(), page.tuple(0).unwrap());
        assert_eq!(decoded.tuple(1).unwrap(), page.tuple(1).unwrap());
    }
}
