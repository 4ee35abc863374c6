use serde::{Deserialize, Serialize};

/// Sparkplug metric datatype tags for the types this publisher carries.
///
/// `Text` is a second string-shaped tag; complex structured types (datasets,
/// templates, property sets) are out of scope and carried opaquely as `Bytes`
/// if needed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Boolean,
    String,
    Text,
    Bytes,
    DateTime,
}

/// A metric value, tagged with its runtime shape.
///
/// Equality is per-variant value equality. Timestamps are not part of a
/// value; change detection compares values only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
    Bytes(Vec<u8>),
    /// Milliseconds since the unix epoch.
    DateTime(u64),
}

impl MetricValue {
    /// The datatype tag a value of this shape declares by default.
    pub fn default_datatype(&self) -> DataType {
        match self {
            MetricValue::Int8(_) => DataType::Int8,
            MetricValue::Int16(_) => DataType::Int16,
            MetricValue::Int32(_) => DataType::Int32,
            MetricValue::Int64(_) => DataType::Int64,
            MetricValue::UInt8(_) => DataType::UInt8,
            MetricValue::UInt16(_) => DataType::UInt16,
            MetricValue::UInt32(_) => DataType::UInt32,
            MetricValue::UInt64(_) => DataType::UInt64,
            MetricValue::Float(_) => DataType::Float,
            MetricValue::Double(_) => DataType::Double,
            MetricValue::Boolean(_) => DataType::Boolean,
            MetricValue::String(_) => DataType::String,
            MetricValue::Bytes(_) => DataType::Bytes,
            MetricValue::DateTime(_) => DataType::DateTime,
        }
    }
}

impl DataType {
    /// Whether a value's runtime shape is consistent with this declared tag.
    pub fn accepts(&self, value: &MetricValue) -> bool {
        match (self, value) {
            (DataType::Text, MetricValue::String(_)) => true,
            (tag, value) => *tag == value.default_datatype(),
        }
    }
}

macro_rules! impl_from_for_metric_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for MetricValue {
                fn from(value: $ty) -> Self {
                    MetricValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_for_metric_value!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    bool => Boolean,
    String => String,
    Vec<u8> => Bytes,
);

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_datatypes() {
        assert_eq!(MetricValue::from(1i8).default_datatype(), DataType::Int8);
        assert_eq!(MetricValue::from(1i64).default_datatype(), DataType::Int64);
        assert_eq!(MetricValue::from(1u8).default_datatype(), DataType::UInt8);
        assert_eq!(MetricValue::from(1u64).default_datatype(), DataType::UInt64);
        assert_eq!(MetricValue::from(1.0f32).default_datatype(), DataType::Float);
        assert_eq!(
            MetricValue::from(1.0f64).default_datatype(),
            DataType::Double
        );
        assert_eq!(MetricValue::from(true).default_datatype(), DataType::Boolean);
        assert_eq!(MetricValue::from("x").default_datatype(), DataType::String);
        assert_eq!(
            MetricValue::Bytes(vec![1, 2]).default_datatype(),
            DataType::Bytes
        );
        assert_eq!(
            MetricValue::DateTime(0).default_datatype(),
            DataType::DateTime
        );
    }

    #[test]
    fn tag_accepts_matching_shapes() {
        assert!(DataType::Int32.accepts(&MetricValue::Int32(5)));
        assert!(DataType::Double.accepts(&MetricValue::Double(5.0)));
        assert!(!DataType::Int32.accepts(&MetricValue::Int64(5)));
        assert!(!DataType::Boolean.accepts(&MetricValue::String("true".into())));
    }

    #[test]
    fn text_tag_accepts_string_values() {
        assert!(DataType::Text.accepts(&MetricValue::String("note".into())));
        assert!(!DataType::Text.accepts(&MetricValue::Bytes(vec![])));
    }

    #[test]
    fn value_equality_ignores_variant_identity() {
        assert_eq!(MetricValue::Double(22.5), MetricValue::Double(22.5));
        assert_ne!(MetricValue::Double(22.5), MetricValue::Double(23.1));
        assert_ne!(MetricValue::Int32(1), MetricValue::Int64(1));
    }
}
