use ciborium::Value;

use crate::ProtoError;

/// Single character keys used by devices when posting telemetry
pub mod keys {
    /// Last six characters of the device's hardware identifier
    pub const AUTH_TAIL: &str = "i";
    /// Epoch seconds, integer or float
    pub const TIMESTAMP: &str = "t";
    /// Sensor or source tag
    pub const SENSOR: &str = "s";
    pub const VAL_INT: &str = "n";
    pub const VAL_FLOAT: &str = "f";
    pub const VAL_STR: &str = "r";
    pub const VAL_UNITS: &str = "u";
}

/// A decoded telemetry payload. Fields are looked up lazily so that the
/// ingestion pipeline can check them in its own order and report the
/// first failure only.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    fields: Vec<(Value, Value)>,
}

impl Report {
    /// Decode a CBOR payload, which must be a map at the top level
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        let value: Value =
            ciborium::de::from_reader(bytes).map_err(|e| ProtoError::Decode(e.to_string()))?;
        match value {
            Value::Map(fields) => Ok(Self { fields }),
            _ => Err(ProtoError::NotAMap),
        }
    }

    /// Raw value stored under `key`. A key explicitly mapped to null is
    /// treated the same as a missing key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_text)
    }

    /// Text under `key`, or an unsigned integer rendered in decimal. Devices
    /// with numeric-only identifiers send their auth tail either way.
    pub fn token(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::Text(text) => Some(text.clone()),
            Value::Integer(i) => {
                let i = i128::from(*i);
                (i >= 0).then(|| i.to_string())
            }
            _ => None,
        }
    }

    /// Integer value under `key`, if it fits an `i64`
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.get(key)
            .and_then(Value::as_integer)
            .and_then(|i| i64::try_from(i).ok())
    }

    /// Any numeric value under `key`, widened to `f64`. Booleans are not
    /// numbers here.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(i128::from(*i) as f64),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: Value) -> Vec<u8> {
        let mut buffer = Vec::new();
        ciborium::ser::into_writer(&value, &mut buffer).unwrap();
        buffer
    }

    #[test]
    fn garbage_is_not_a_report() {
        assert!(matches!(
            Report::decode(b"not-cbor"),
            Err(ProtoError::Decode(_))
        ));
        assert!(matches!(
            Report::decode(&encode(Value::Array(vec![]))),
            Err(ProtoError::NotAMap)
        ));
    }

    #[test]
    fn typed_accessors() {
        let bytes = encode(Value::Map(vec![
            (Value::Text("i".into()), Value::Text("456789".into())),
            (Value::Text("t".into()), Value::Integer(1_700_000_000.into())),
            (Value::Text("s".into()), Value::Text("temp".into())),
            (Value::Text("f".into()), Value::Float(21.5)),
            (Value::Text("r".into()), Value::Null),
            (Value::Text("n".into()), Value::Bool(true)),
        ]));
        let report = Report::decode(&bytes).unwrap();

        assert_eq!(report.len(), 6);
        assert_eq!(report.text(keys::AUTH_TAIL), Some("456789"));
        assert_eq!(report.number(keys::TIMESTAMP), Some(1_700_000_000.0));
        assert_eq!(report.integer(keys::TIMESTAMP), Some(1_700_000_000));
        assert_eq!(report.number(keys::VAL_FLOAT), Some(21.5));
        assert_eq!(report.integer(keys::VAL_FLOAT), None);
        assert!(report.get(keys::VAL_STR).is_none());
        assert_eq!(report.number(keys::VAL_INT), None);
        assert!(report.get(keys::VAL_UNITS).is_none());
    }

    #[test]
    fn token_accepts_text_and_unsigned_integers() {
        let bytes = encode(Value::Map(vec![
            (Value::Text("i".into()), Value::Integer(456789.into())),
            (Value::Text("a".into()), Value::Text("012345".into())),
            (Value::Text("b".into()), Value::Integer((-5).into())),
            (Value::Text("c".into()), Value::Float(1.0)),
        ]));
        let report = Report::decode(&bytes).unwrap();

        assert_eq!(report.token(keys::AUTH_TAIL).as_deref(), Some("456789"));
        assert_eq!(report.token("a").as_deref(), Some("012345"));
        assert_eq!(report.token("b"), None);
        assert_eq!(report.token("c"), None);
        assert_eq!(report.token("missing"), None);
    }
}
