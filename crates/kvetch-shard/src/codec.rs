//! Attribute body encoding for relational storage.
//!
//! Layout: one format byte ([`BODY_FORMAT_V1`]) followed by the
//! zstd-compressed bincode encoding of an [`Attributes`] map. The format byte
//! is part of the on-disk contract; a new encoding gets a new byte.

use kvetch_types::Attributes;

use crate::error::{ShardError, ShardResult};

pub const BODY_FORMAT_V1: u8 = 1;

const ZSTD_LEVEL: i32 = 3;

pub fn encode_body(attributes: &Attributes) -> ShardResult<Vec<u8>> {
    let raw = bincode::serialize(attributes)
        .map_err(|e| ShardError::Serialization(e.to_string()))?;
    let compressed = zstd::encode_all(raw.as_slice(), ZSTD_LEVEL)
        .map_err(|e| ShardError::Serialization(e.to_string()))?;
    let mut body = Vec::with_capacity(compressed.len() + 1);
    body.push(BODY_FORMAT_V1);
    body.extend_from_slice(&compressed);
    Ok(body)
}

/// Decode a body column. A missing body decodes to an empty map.
pub fn decode_body(body: Option<&[u8]>) -> ShardResult<Attributes> {
    let Some(body) = body else {
        return Ok(Attributes::new());
    };
    match body.split_first() {
        Some((&BODY_FORMAT_V1, compressed)) => {
            let raw = zstd::decode_all(compressed)
                .map_err(|e| ShardError::Serialization(e.to_string()))?;
            bincode::deserialize(&raw).map_err(|e| ShardError::Serialization(e.to_string()))
        }
        Some((version, _)) => Err(ShardError::Serialization(format!(
            "unknown body format {version}"
        ))),
        None => Err(ShardError::Serialization("empty body".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvetch_types::{attrs, now, ObjectId, Value};

    #[test]
    fn every_value_kind_survives() {
        let attributes = attrs! {
            "id" => ObjectId::from_u128(0xdead_beef),
            "int" => -7,
            "str" => "hello",
            "float" => 1.5,
            "bool" => true,
            "ts" => now(),
            "null" => Value::Null,
        };
        let body = encode_body(&attributes).unwrap();
        assert_eq!(body[0], BODY_FORMAT_V1);
        assert_eq!(decode_body(Some(&body)).unwrap(), attributes);
    }

    #[test]
    fn missing_body_is_empty() {
        assert!(decode_body(None).unwrap().is_empty());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let mut body = encode_body(&attrs! { "a" => 1 }).unwrap();
        body[0] = 9;
        assert!(matches!(
            decode_body(Some(&body)),
            Err(ShardError::Serialization(_))
        ));
        assert!(decode_body(Some(&[])).is_err());
    }

    #[test]
    fn truncated_body_is_rejected() {
        let body = encode_body(&attrs! { "a" => "some text to compress" }).unwrap();
        assert!(decode_body(Some(&body[..body.len() / 2])).is_err());
    }
}
