//! Prediction outputs come in different shapes depending on the model. Everything is reduced to a
//! single image reference here, before the rest of the crate sees it.

use serde_json::{Map, Value};

use super::GenerateError;

/// Object fields that may hold the image reference, in lookup order.
pub const REFERENCE_FIELDS: [&str; 4] = ["url", "image", "output", "uri"];

#[derive(Debug, PartialEq)]
pub enum OutputShape<'a> {
    /// `"https://..."`
    Reference(&'a str),
    /// `["https://...", ...]`, the first element is authoritative
    List(&'a [Value]),
    /// `{"url": "https://..."}` or one of the other [`REFERENCE_FIELDS`]
    Object(&'a Map<String, Value>),
    Unrecognized(&'a Value),
}

impl<'a> From<&'a Value> for OutputShape<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::String(s) if !s.is_empty() => Self::Reference(s),
            Value::Array(items) => Self::List(items),
            Value::Object(map) => Self::Object(map),
            other => Self::Unrecognized(other),
        }
    }
}

pub fn resolve_reference(output: &Value) -> Result<String, GenerateError> {
    match OutputShape::from(output) {
        OutputShape::Reference(url) => Ok(url.to_string()),
        OutputShape::List([first, ..]) => resolve_reference(first),
        OutputShape::List([]) => Err(GenerateError::UnrecognizedOutputShape(
            "empty output list".into(),
        )),
        OutputShape::Object(map) => REFERENCE_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| {
                GenerateError::UnrecognizedOutputShape(format!(
                    "no image reference in output object: {output}"
                ))
            }),
        OutputShape::Unrecognized(other) => Err(GenerateError::UnrecognizedOutputShape(format!(
            "unexpected output: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn unrecognized(output: Value) -> String {
        match resolve_reference(&output) {
            Err(GenerateError::UnrecognizedOutputShape(msg)) => msg,
            other => panic!("expected unrecognized shape, got {other:?}"),
        }
    }

    #[test]
    fn direct_reference() {
        let out = json!("https://img.example/a.webp");
        assert_eq!(OutputShape::from(&out), OutputShape::Reference("https://img.example/a.webp"));
        assert_eq!(resolve_reference(&out).unwrap(), "https://img.example/a.webp");
    }

    #[test]
    fn list_takes_first() {
        let out = json!(["https://img.example/1.webp", "https://img.example/2.webp"]);
        assert_eq!(resolve_reference(&out).unwrap(), "https://img.example/1.webp");
    }

    #[test]
    fn list_of_objects() {
        let out = json!([{"image": "https://img.example/1.png"}]);
        assert_eq!(resolve_reference(&out).unwrap(), "https://img.example/1.png");
    }

    #[test]
    fn object_fields_in_order() {
        for field in REFERENCE_FIELDS {
            let out: Value =
                serde_json::from_str(&format!(r#"{{"{field}": "https://img.example/x", "seed": 42}}"#))
                    .unwrap();
            assert_eq!(resolve_reference(&out).unwrap(), "https://img.example/x");
        }

        let both = json!({"uri": "https://b", "url": "https://a"});
        assert_eq!(resolve_reference(&both).unwrap(), "https://a");
    }

    #[test]
    fn object_field_must_be_string() {
        let msg = unrecognized(json!({"url": 3}));
        assert!(msg.contains("no image reference"), "{msg}");
    }

    #[test]
    fn rejected_shapes() {
        assert_eq!(unrecognized(json!([])), "empty output list");
        assert!(unrecognized(json!({})).contains("no image reference"));
        assert!(unrecognized(json!(null)).contains("unexpected output"));
        assert!(unrecognized(json!(12)).contains("unexpected output"));
        assert!(unrecognized(json!("")).contains("unexpected output"));
    }
}
