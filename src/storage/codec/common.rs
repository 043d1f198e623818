use crate::error::{VellumError, VellumResult};
use crate::storage::codec::DecodedData;
use bytes::{Buf, BufMut};

pub struct CommonCodec;

impl CommonCodec {
    fn check_len(bytes: &[u8], need: usize) -> VellumResult<()> {
        if bytes.len() < need {
            return Err(VellumError::Internal(format!(
                "bytes length {} is less than {}",
                bytes.len(),
                need
            )));
        }
        Ok(())
    }

    pub fn encode_bool(buf: &mut Vec<u8>, data: bool) {
        buf.put_u8(data as u8);
    }

    pub fn decode_bool(bytes: &[u8]) -> VellumResult<DecodedData<bool>> {
        Self::check_len(bytes, 1)?;
        Ok((bytes[0] != 0, 1))
    }

    pub fn encode_u8(buf: &mut Vec<u8>, data: u8) {
        buf.put_u8(data);
    }

    pub fn decode_u8(bytes: &[u8]) -> VellumResult<DecodedData<u8>> {
        Self::check_len(bytes, 1)?;
        Ok((bytes[0], 1))
    }

    pub fn encode_u16(buf: &mut Vec<u8>, data: u16) {
        buf.put_u16(data);
    }

    pub fn decode_u16(mut bytes: &[u8]) -> VellumResult<DecodedData<u16>> {
        Self::check_len(bytes, 2)?;
        Ok((bytes.get_u16(), 2))
    }

    pub fn encode_u32(buf: &mut Vec<u8>, data: u32) {
        buf.put_u32(data);
    }

    pub fn decode_u32(mut bytes: &[u8]) -> VellumResult<DecodedData<u32>> {
        Self::check_len(bytes, 4)?;
        Ok((bytes.get_u32(), 4))
    }

    pub fn encode_u64(buf: &mut Vec<u8>, data: u64) {
        buf.put_u64(data);
    }

    pub fn decode_u64(mut bytes: &[u8]) -> VellumResult<DecodedData<u64>> {
        Self::check_len(bytes, 8)?;
        Ok((bytes.get_u64(), 8))
    }

    pub fn encode_i32(buf: &mut Vec<u8>, data: i32) {
        buf.put_i32(data);
    }

    pub fn decode_i32(mut bytes: &[u8]) -> VellumResult<DecodedData<i32>> {
        Self::check_len(bytes, 4)?;
        Ok((bytes.get_i32(), 4))
    }

    pub fn encode_i64(buf: &mut Vec<u8>, data: i64) {
        buf.put_i64(data);
    }

    pub fn decode_i64(mut bytes: &[u8]) -> VellumResult<DecodedData<i64>> {
        Self::check_len(bytes, 8)?;
        Ok((bytes.get_i64(), 8))
    }

    /// Length-prefixed byte string.
    pub fn encode_bytes(buf: &mut Vec<u8>, data: &[u8]) {
        Self::encode_u32(buf, data.len() as u32);
        buf.put_slice(data);
    }

    pub fn decode_bytes(bytes: &[u8]) -> VellumResult<DecodedData<Vec<u8>>> {
        let (len, offset) = Self::decode_u32(bytes)?;
        let len = len as usize;
        Self::check_len(bytes, offset + len)?;
        Ok((bytes[offset..offset + len].to_vec(), offset + len))
    }

    pub fn encode_string(buf: &mut Vec<u8>, data: &str) {
        Self::encode_bytes(buf, data.as_bytes());
    }

    pub fn decode_string(bytes: &[u8]) -> VellumResult<DecodedData<String>> {
        let (raw, offset) = Self::decode_bytes(bytes)?;
        let data = String::from_utf8(raw)
            .map_err(|e| VellumError::Internal(format!("failed to decode string: {}", e)))?;
        Ok((data, offset))
    }
}
