//! Typed values and row serializers.
//!
//! A `RowSerializer` turns logical values into the byte strings stored in
//! cells and back. The lexicoder serializer produces lexicographically
//! ordered encodings, which the index and the planner's range translation
//! rely on; the string serializer trades ordering for human-readable
//! cells. The serializer is an injected capability selected per table by
//! `SerializerKind`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};
use crate::schema::ColumnType;

const SIGN_FLIP_MASK: u64 = 1u64 << 63;

/// A logical value of one table cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bigint(i64),
    Boolean(bool),
    Double(f64),
    Timestamp(i64),
    Varchar(String),
    Array(Vec<Value>),
}

/// Serializer selection recorded in table metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SerializerKind {
    #[default]
    Lexicoder,
    String,
}

impl SerializerKind {
    /// Instantiate the serializer this kind names.
    pub fn instance(&self) -> Arc<dyn RowSerializer> {
        match self {
            SerializerKind::Lexicoder => Arc::new(LexicoderSerializer),
            SerializerKind::String => Arc::new(StringSerializer),
        }
    }
}

/// Encodes and decodes logical values for storage.
pub trait RowSerializer: Send + Sync {
    /// Encode `value` as the byte string stored for a column of
    /// `column_type`.
    fn encode(&self, column_type: &ColumnType, value: &Value) -> Result<Vec<u8>>;
    /// Decode a stored byte string back into a logical value.
    fn decode(&self, column_type: &ColumnType, bytes: &[u8]) -> Result<Value>;
    /// Encoded element byte strings of a stored array value.
    fn array_elements(&self, element_type: &ColumnType, bytes: &[u8]) -> Result<Vec<Vec<u8>>>;
}

fn type_mismatch(column_type: &ColumnType, value: &Value) -> ConnectorError {
    ConnectorError::Misconfiguration(format!(
        "value {value:?} does not match column type {column_type:?}"
    ))
}

fn truncated(column_type: &ColumnType) -> ConnectorError {
    ConnectorError::Invariant(format!("truncated encoding for column type {column_type:?}"))
}

fn encode_i64_ordered(value: i64) -> [u8; 8] {
    (value as u64 ^ SIGN_FLIP_MASK).to_be_bytes()
}

fn decode_i64_ordered(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ SIGN_FLIP_MASK) as i64
}

fn encode_f64_ordered(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    // Flip negatives entirely and set the sign bit on non-negatives so the
    // byte order matches the numeric order.
    let ordered = if bits & SIGN_FLIP_MASK != 0 {
        !bits
    } else {
        bits | SIGN_FLIP_MASK
    };
    ordered.to_be_bytes()
}

fn decode_f64_ordered(bytes: [u8; 8]) -> f64 {
    let ordered = u64::from_be_bytes(bytes);
    let bits = if ordered & SIGN_FLIP_MASK != 0 {
        ordered & !SIGN_FLIP_MASK
    } else {
        !ordered
    };
    f64::from_bits(bits)
}

fn fixed8(column_type: &ColumnType, bytes: &[u8]) -> Result<[u8; 8]> {
    let fixed: [u8; 8] = bytes.try_into().map_err(|_| truncated(column_type))?;
    Ok(fixed)
}

/// Order-preserving serializer; the default for indexed tables.
pub struct LexicoderSerializer;

impl RowSerializer for LexicoderSerializer {
    fn encode(&self, column_type: &ColumnType, value: &Value) -> Result<Vec<u8>> {
        match (column_type, value) {
            (ColumnType::Bigint, Value::Bigint(v)) => Ok(encode_i64_ordered(*v).to_vec()),
            (ColumnType::Timestamp, Value::Timestamp(v)) => Ok(encode_i64_ordered(*v).to_vec()),
            (ColumnType::Boolean, Value::Boolean(v)) => Ok(vec![u8::from(*v)]),
            (ColumnType::Double, Value::Double(v)) => Ok(encode_f64_ordered(*v).to_vec()),
            (ColumnType::Varchar, Value::Varchar(v)) => Ok(v.as_bytes().to_vec()),
            (ColumnType::Array(element_type), Value::Array(elements)) => {
                let mut out = Vec::new();
                out.extend_from_slice(&(elements.len() as u32).to_be_bytes());
                for element in elements {
                    let payload = self.encode(element_type, element)?;
                    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                    out.extend_from_slice(&payload);
                }
                Ok(out)
            }
            _ => Err(type_mismatch(column_type, value)),
        }
    }

    fn decode(&self, column_type: &ColumnType, bytes: &[u8]) -> Result<Value> {
        match column_type {
            ColumnType::Bigint => Ok(Value::Bigint(decode_i64_ordered(fixed8(
                column_type,
                bytes,
            )?))),
            ColumnType::Timestamp => Ok(Value::Timestamp(decode_i64_ordered(fixed8(
                column_type,
                bytes,
            )?))),
            ColumnType::Boolean => match bytes {
                [0] => Ok(Value::Boolean(false)),
                [1] => Ok(Value::Boolean(true)),
                _ => Err(truncated(column_type)),
            },
            ColumnType::Double => Ok(Value::Double(decode_f64_ordered(fixed8(
                column_type,
                bytes,
            )?))),
            ColumnType::Varchar => Ok(Value::Varchar(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| truncated(column_type))?,
            )),
            ColumnType::Array(element_type) => {
                let payloads = self.array_elements(element_type, bytes)?;
                let mut elements = Vec::with_capacity(payloads.len());
                for payload in payloads {
                    elements.push(self.decode(element_type, &payload)?);
                }
                Ok(Value::Array(elements))
            }
        }
    }

    fn array_elements(&self, element_type: &ColumnType, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let envelope = ColumnType::Array(Box::new(element_type.clone()));
        if bytes.len() < 4 {
            return Err(truncated(&envelope));
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[..4]);
        let count = u32::from_be_bytes(word) as usize;
        let mut cursor = 4usize;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            if bytes.len() < cursor + 4 {
                return Err(truncated(&envelope));
            }
            word.copy_from_slice(&bytes[cursor..cursor + 4]);
            let len = u32::from_be_bytes(word) as usize;
            cursor += 4;
            if bytes.len() < cursor + len {
                return Err(truncated(&envelope));
            }
            out.push(bytes[cursor..cursor + len].to_vec());
            cursor += len;
        }
        if cursor != bytes.len() {
            return Err(truncated(&envelope));
        }
        Ok(out)
    }
}

/// Display-string serializer for human-inspectable tables. Encodings do
/// not sort numerically, so tables using it should not be indexed on
/// numeric columns; array columns are not supported at all.
pub struct StringSerializer;

impl RowSerializer for StringSerializer {
    fn encode(&self, column_type: &ColumnType, value: &Value) -> Result<Vec<u8>> {
        match (column_type, value) {
            (ColumnType::Bigint, Value::Bigint(v)) => Ok(v.to_string().into_bytes()),
            (ColumnType::Timestamp, Value::Timestamp(v)) => Ok(v.to_string().into_bytes()),
            (ColumnType::Boolean, Value::Boolean(v)) => Ok(v.to_string().into_bytes()),
            (ColumnType::Double, Value::Double(v)) => Ok(v.to_string().into_bytes()),
            (ColumnType::Varchar, Value::Varchar(v)) => Ok(v.as_bytes().to_vec()),
            (ColumnType::Array(_), _) => Err(ConnectorError::Misconfiguration(
                "array columns require the lexicoder serializer".to_string(),
            )),
            _ => Err(type_mismatch(column_type, value)),
        }
    }

    fn decode(&self, column_type: &ColumnType, bytes: &[u8]) -> Result<Value> {
        let text = std::str::from_utf8(bytes).map_err(|_| truncated(column_type))?;
        match column_type {
            ColumnType::Bigint => text
                .parse()
                .map(Value::Bigint)
                .map_err(|_| truncated(column_type)),
            ColumnType::Timestamp => text
                .parse()
                .map(Value::Timestamp)
                .map_err(|_| truncated(column_type)),
            ColumnType::Boolean => text
                .parse()
                .map(Value::Boolean)
                .map_err(|_| truncated(column_type)),
            ColumnType::Double => text
                .parse()
                .map(Value::Double)
                .map_err(|_| truncated(column_type)),
            ColumnType::Varchar => Ok(Value::Varchar(text.to_string())),
            ColumnType::Array(_) => Err(ConnectorError::Misconfiguration(
                "array columns require the lexicoder serializer".to_string(),
            )),
        }
    }

    fn array_elements(&self, _element_type: &ColumnType, _bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        Err(ConnectorError::Misconfiguration(
            "array columns require the lexicoder serializer".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(column_type: &ColumnType, value: &Value) -> Vec<u8> {
        LexicoderSerializer.encode(column_type, value).unwrap()
    }

    #[test]
    fn bigint_encoding_sorts_numerically() {
        let values = [i64::MIN, -27, -1, 0, 1, 27, i64::MAX];
        let encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| encode(&ColumnType::Bigint, &Value::Bigint(*v)))
            .collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn double_encoding_sorts_numerically() {
        let values = [f64::MIN, -1.5, -0.0, 0.25, 2.0, f64::MAX];
        let encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| encode(&ColumnType::Double, &Value::Double(*v)))
            .collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1], "{values:?}");
        }
    }

    #[test]
    fn lexicoder_round_trips_scalars() {
        let serializer = LexicoderSerializer;
        let cases = [
            (ColumnType::Bigint, Value::Bigint(-42)),
            (ColumnType::Boolean, Value::Boolean(true)),
            (ColumnType::Double, Value::Double(3.25)),
            (ColumnType::Timestamp, Value::Timestamp(1_700_000_000_000)),
            (ColumnType::Varchar, Value::Varchar("alice".to_string())),
        ];
        for (column_type, value) in cases {
            let bytes = serializer.encode(&column_type, &value).unwrap();
            assert_eq!(serializer.decode(&column_type, &bytes).unwrap(), value);
        }
    }

    #[test]
    fn array_elements_preserve_order_and_bytes() {
        let serializer = LexicoderSerializer;
        let array_type = ColumnType::Array(Box::new(ColumnType::Varchar));
        let value = Value::Array(vec![
            Value::Varchar("ghi".to_string()),
            Value::Varchar("mno".to_string()),
            Value::Varchar("abc".to_string()),
        ]);
        let bytes = serializer.encode(&array_type, &value).unwrap();
        let elements = serializer
            .array_elements(&ColumnType::Varchar, &bytes)
            .unwrap();
        assert_eq!(elements, vec![b"ghi".to_vec(), b"mno".to_vec(), b"abc".to_vec()]);
        assert_eq!(serializer.decode(&array_type, &bytes).unwrap(), value);
    }

    #[test]
    fn truncated_arrays_are_invariant_errors() {
        let serializer = LexicoderSerializer;
        let array_type = ColumnType::Array(Box::new(ColumnType::Varchar));
        let mut bytes = serializer
            .encode(
                &array_type,
                &Value::Array(vec![Value::Varchar("abc".to_string())]),
            )
            .unwrap();
        bytes.pop();
        let err = serializer
            .array_elements(&ColumnType::Varchar, &bytes)
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Invariant(_)));
    }

    #[test]
    fn type_mismatches_are_misconfigurations() {
        let err = LexicoderSerializer
            .encode(&ColumnType::Bigint, &Value::Varchar("27".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Misconfiguration(_)));
    }

    #[test]
    fn string_serializer_is_readable_and_rejects_arrays() {
        let serializer = StringSerializer;
        let bytes = serializer
            .encode(&ColumnType::Bigint, &Value::Bigint(27))
            .unwrap();
        assert_eq!(bytes, b"27");
        assert_eq!(
            serializer.decode(&ColumnType::Bigint, &bytes).unwrap(),
            Value::Bigint(27)
        );

        let err = serializer
            .encode(
                &ColumnType::Array(Box::new(ColumnType::Varchar)),
                &Value::Array(Vec::new()),
            )
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Misconfiguration(_)));
    }
}
