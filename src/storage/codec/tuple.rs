use crate::catalog::{DataType, SchemaRef};
use crate::error::{VellumError, VellumResult};
use crate::storage::codec::{CommonCodec, DecodedData};
use crate::storage::page::RecordId;
use crate::storage::tuple::Tuple;
use crate::utils::scalar::ScalarValue;

pub struct ScalarValueCodec;

impl ScalarValueCodec {
    /// Null flag byte followed by the value bytes for non-null values.
    pub fn encode(buf: &mut Vec<u8>, value: &ScalarValue) {
        CommonCodec::encode_bool(buf, value.is_null());
        match value {
            ScalarValue::Boolean(Some(v)) => CommonCodec::encode_bool(buf, *v),
            ScalarValue::Int32(Some(v)) => CommonCodec::encode_i32(buf, *v),
            ScalarValue::Int64(Some(v)) => CommonCodec::encode_i64(buf, *v),
            ScalarValue::Varchar(Some(v)) => CommonCodec::encode_string(buf, v),
            _ => {}
        }
    }

    pub fn decode(bytes: &[u8], data_type: DataType) -> VellumResult<DecodedData<ScalarValue>> {
        let (is_null, mut offset) = CommonCodec::decode_bool(bytes)?;
        if is_null {
            return Ok((ScalarValue::new_empty(data_type), offset));
        }
        let value = match data_type {
            DataType::Boolean => {
                let (v, n) = CommonCodec::decode_bool(&bytes[offset..])?;
                offset += n;
                ScalarValue::Boolean(Some(v))
            }
            DataType::Int32 => {
                let (v, n) = CommonCodec::decode_i32(&bytes[offset..])?;
                offset += n;
                ScalarValue::Int32(Some(v))
            }
            DataType::Int64 => {
                let (v, n) = CommonCodec::decode_i64(&bytes[offset..])?;
                offset += n;
                ScalarValue::Int64(Some(v))
            }
            DataType::Varchar => {
                let (v, n) = CommonCodec::decode_string(&bytes[offset..])?;
                offset += n;
                ScalarValue::Varchar(Some(v))
            }
        };
        Ok((value, offset))
    }
}

pub struct TupleCodec;

impl TupleCodec {
    pub fn encode(tuple: &Tuple) -> Vec<u8> {
        let mut buf = Vec::new();
        for value in tuple.data.iter() {
            ScalarValueCodec::encode(&mut buf, value);
        }
        buf
    }

    pub fn decode(bytes: &[u8], schema: SchemaRef) -> VellumResult<DecodedData<Tuple>> {
        let mut offset = 0;
        let mut data = Vec::with_capacity(schema.column_count());
        for column in schema.columns.iter() {
            let (value, n) = ScalarValueCodec::decode(&bytes[offset..], column.data_type)
                .map_err(|e| {
                    VellumError::Internal(format!("failed to decode column {}: {}", column.name, e))
                })?;
            offset += n;
            data.push(value);
        }
        Ok((Tuple::new(schema, data), offset))
    }
}

pub struct RecordIdCodec;

impl RecordIdCodec {
    pub fn encode(buf: &mut Vec<u8>, rid: &RecordId) {
        CommonCodec::encode_u32(buf, rid.page_id);
        CommonCodec::encode_u32(buf, rid.slot_num);
    }

    pub fn decode(bytes: &[u8]) -> VellumResult<DecodedData<RecordId>> {
        let (page_id, mut offset) = CommonCodec::decode_u32(bytes)?;
        let (slot_num, n) = CommonCodec::decode_u32(&bytes[offset..])?;
        offset += n;
        Ok((RecordId::new(page_id, slot_num), offset))
    }
}
