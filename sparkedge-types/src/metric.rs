use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{utils, DataType, MetricValue};

#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("invalid metric name: {0}")]
    InvalidName(String),
    #[error("value shape {value:?} is not consistent with declared datatype {datatype:?}")]
    DatatypeMismatch {
        datatype: DataType,
        value: DataType,
    },
}

/// A named, typed measurement.
///
/// The declared datatype tag is always consistent with the runtime shape of
/// the value, and the last-update timestamp never decreases for a given
/// metric instance; both invariants are enforced by the constructors and
/// [Metric::update].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    name: String,
    value: MetricValue,
    datatype: DataType,
    timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    properties: Option<BTreeMap<String, String>>,
}

impl Metric {
    /// Create a metric tagged with the value's default datatype and stamped
    /// with the current time.
    pub fn new<S, V>(name: S, value: V) -> Result<Self, MetricError>
    where
        S: Into<String>,
        V: Into<MetricValue>,
    {
        let name = name.into();
        utils::validate_name(&name).map_err(MetricError::InvalidName)?;
        let value = value.into();
        Ok(Self {
            datatype: value.default_datatype(),
            timestamp: utils::timestamp(),
            properties: None,
            name,
            value,
        })
    }

    /// Override the declared datatype tag.
    ///
    /// Fails if the current value's shape is not consistent with the tag,
    /// e.g. anything other than a `Text` or `String` tag on a string value.
    pub fn with_datatype(mut self, datatype: DataType) -> Result<Self, MetricError> {
        if !datatype.accepts(&self.value) {
            return Err(MetricError::DatatypeMismatch {
                datatype,
                value: self.value.default_datatype(),
            });
        }
        self.datatype = datatype;
        Ok(self)
    }

    /// Override the last-update timestamp.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a property to the metric's property bag.
    pub fn with_property<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn properties(&self) -> Option<&BTreeMap<String, String>> {
        self.properties.as_ref()
    }

    /// Overwrite the value in place from another record of the same metric.
    ///
    /// The stored record keeps its identity; the timestamp is refreshed but
    /// never moves backwards. Fails if the incoming value's shape does not
    /// match the declared tag.
    pub fn update(&mut self, value: MetricValue, timestamp: u64) -> Result<(), MetricError> {
        if !self.datatype.accepts(&value) {
            return Err(MetricError::DatatypeMismatch {
                datatype: self.datatype,
                value: value.default_datatype(),
            });
        }
        self.value = value;
        self.timestamp = self.timestamp.max(timestamp);
        Ok(())
    }

    pub(crate) fn shape_is_consistent(&self) -> bool {
        self.datatype.accepts(&self.value)
    }
}
