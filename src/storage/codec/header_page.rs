use crate::error::VellumResult;
use crate::storage::codec::{CommonCodec, DecodedData};
use crate::storage::page::HeaderPage;

pub struct HeaderPageCodec;

impl HeaderPageCodec {
    pub fn encode(header: &HeaderPage) -> Vec<u8> {
        let mut buf = Vec::new();
        CommonCodec::encode_u32(&mut buf, header.records.len() as u32);
        for (name, root_page_id) in header.records.iter() {
            CommonCodec::encode_string(&mut buf, name);
            CommonCodec::encode_u32(&mut buf, *root_page_id);
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> VellumResult<DecodedData<HeaderPage>> {
        let (num_records, mut offset) = CommonCodec::decode_u32(bytes)?;
        let mut records = Vec::with_capacity(num_records as usize);
        for _ in 0..num_records {
            let (name, n) = CommonCodec::decode_string(&bytes[offset..])?;
            offset += n;
            let (root_page_id, n) = CommonCodec::decode_u32(&bytes[offset..])?;
            offset += n;
            records.push((name, root_page_id));
        }
        Ok((HeaderPage { records }, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_page_round_trip() {
        let mut header = HeaderPage::new();
        header.insert_record("idx_a", 3);
        header.insert_record("idx_b", 9);

        let bytes = HeaderPageCodec::encode(&header);
        let (decoded, n) = HeaderPageCodec::decode(&bytes).unwrap();
        assert_eq!(n, bytes.len());
        assert_eq!(decoded, header);
    }

    #[test]
    fn zeroed_page_decodes_as_empty() {
        let bytes = [0u8; 64];
        let (decoded, _) = HeaderPageCodec::decode(&bytes).unwrap();
        assert!(decoded.records.is_empty());
    }
}
