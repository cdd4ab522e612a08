//! Persisted table schema descriptors.
//!
//! Headers are stored under the schema region as a small serialized
//! document with integer type tags. Everything outside this module treats
//! the encoded form as an opaque blob; only the tag values and field names
//! are a compatibility contract.

use serde::Deserialize;
use serde::Serialize;
use strata_values::SortableType;
use strata_values::ValueType;

use crate::errors::TupleError;
use crate::Field;
use crate::Header;
use crate::KeyField;

// Wire tags for field types.
const TAG_ANY: u8 = 0;
const TAG_BYTES: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_UINT: u8 = 3;
const TAG_INT: u8 = 4;
const TAG_BOOL: u8 = 5;
const TAG_TIME: u8 = 6;
const TAG_FLOAT: u8 = 7;

#[derive(Serialize, Deserialize)]
struct TableDoc {
    name: String,
    key: Vec<KeyFieldDoc>,
    data: Vec<FieldDoc>,
}

#[derive(Serialize, Deserialize)]
struct KeyFieldDoc {
    name: String,
    #[serde(rename = "type")]
    ty: u8,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    auto: bool,
}

#[derive(Serialize, Deserialize)]
struct FieldDoc {
    name: String,
    #[serde(rename = "type")]
    ty: u8,
}

/// Serialize a header into its schema blob.
pub fn encode(header: &Header) -> Result<Vec<u8>, TupleError> {
    let doc = TableDoc {
        name: header.name.clone(),
        key: header
            .key
            .iter()
            .map(|f| KeyFieldDoc {
                name: f.name.clone(),
                ty: sortable_tag(f.ty),
                auto: f.auto,
            })
            .collect(),
        data: header
            .data
            .iter()
            .map(|f| FieldDoc {
                name: f.name.clone(),
                ty: value_tag(f.ty),
            })
            .collect(),
    };
    serde_json::to_vec(&doc)
        .map_err(|e| TupleError::validation(format!("cannot encode schema: {e}")))
}

/// Decode a schema blob back into a header.
pub fn decode(data: &[u8]) -> Result<Header, TupleError> {
    let doc: TableDoc = serde_json::from_slice(data)
        .map_err(|e| TupleError::validation(format!("cannot decode schema: {e}")))?;

    let mut key = Vec::with_capacity(doc.key.len());
    for f in doc.key {
        let ty = sortable_of_tag(f.ty).ok_or_else(|| {
            TupleError::validation(format!("unsupported key type tag: {}", f.ty))
        })?;
        key.push(KeyField {
            name: f.name,
            ty,
            auto: f.auto,
        });
    }

    let mut fields = Vec::with_capacity(doc.data.len());
    for f in doc.data {
        let ty = value_of_tag(f.ty).ok_or_else(|| {
            TupleError::validation(format!("unsupported value type tag: {}", f.ty))
        })?;
        fields.push(Field { name: f.name, ty });
    }

    Ok(Header {
        name: doc.name,
        key,
        data: fields,
    })
}

fn value_tag(ty: ValueType) -> u8 {
    match ty {
        ValueType::Bytes => TAG_BYTES,
        ValueType::String => TAG_STRING,
        ValueType::UInt => TAG_UINT,
        ValueType::Int => TAG_INT,
        ValueType::Bool => TAG_BOOL,
        ValueType::Time => TAG_TIME,
        ValueType::Float => TAG_FLOAT,
    }
}

fn sortable_tag(ty: SortableType) -> u8 {
    value_tag(ty.as_value_type())
}

fn value_of_tag(tag: u8) -> Option<ValueType> {
    match tag {
        TAG_BYTES => Some(ValueType::Bytes),
        TAG_STRING => Some(ValueType::String),
        TAG_UINT => Some(ValueType::UInt),
        TAG_INT => Some(ValueType::Int),
        TAG_BOOL => Some(ValueType::Bool),
        TAG_TIME => Some(ValueType::Time),
        TAG_FLOAT => Some(ValueType::Float),
        // TAG_ANY carries no concrete type and cannot be materialized.
        TAG_ANY => None,
        _ => None,
    }
}

fn sortable_of_tag(tag: u8) -> Option<SortableType> {
    // FLOAT (and ANY) in key position is rejected here, which is what
    // makes "float as primary key" fail validation on decode as well.
    value_of_tag(tag).and_then(|ty| ty.as_sortable())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header {
            name: "test".to_string(),
            key: vec![
                KeyField {
                    name: "id".to_string(),
                    ty: SortableType::UInt,
                    auto: true,
                },
            ],
            data: vec![
                Field {
                    name: "name".to_string(),
                    ty: ValueType::String,
                },
                Field {
                    name: "score".to_string(),
                    ty: ValueType::Float,
                },
            ],
        }
    }

    #[test]
    fn roundtrip() {
        let h = header();
        let blob = encode(&h).unwrap();
        let back = decode(&blob).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn roundtrip_every_type() {
        let types = [
            ValueType::Bytes,
            ValueType::String,
            ValueType::UInt,
            ValueType::Int,
            ValueType::Bool,
            ValueType::Time,
            ValueType::Float,
        ];
        let h = Header {
            name: "all".to_string(),
            key: types
                .iter()
                .filter_map(|t| t.as_sortable())
                .enumerate()
                .map(|(i, ty)| KeyField {
                    name: format!("k{i}"),
                    ty,
                    auto: false,
                })
                .collect(),
            data: types
                .iter()
                .enumerate()
                .map(|(i, &ty)| Field {
                    name: format!("d{i}"),
                    ty,
                })
                .collect(),
        };
        let back = decode(&encode(&h).unwrap()).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn float_key_tag_rejected() {
        let blob = format!(
            r#"{{"name":"t","key":[{{"name":"k","type":{TAG_FLOAT}}}],"data":[]}}"#
        );
        assert!(matches!(
            decode(blob.as_bytes()),
            Err(TupleError::Validation { .. })
        ));
    }

    #[test]
    fn any_tag_rejected() {
        let blob = format!(
            r#"{{"name":"t","key":[{{"name":"k","type":{TAG_STRING}}}],"data":[{{"name":"d","type":{TAG_ANY}}}]}}"#
        );
        assert!(matches!(
            decode(blob.as_bytes()),
            Err(TupleError::Validation { .. })
        ));
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            decode(b"not a schema"),
            Err(TupleError::Validation { .. })
        ));
    }
}
