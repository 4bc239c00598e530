//! Persisted pipeline products as seen by the validation engine
//!
//! The store persists every dataset as a tagged document; the `kind` field
//! selects the payload. Only the parts of each product that the validators
//! inspect are modelled, everything else is carried opaquely.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One catalog row, keyed by column name.
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Catalog(Catalog),
    Exposure(Exposure),
    PropertySet(PropertySet),
    Packages(PackageManifest),
    Document {
        #[serde(default)]
        content: Value,
    },
}

impl Artifact {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Artifact::Catalog(_) => "catalog",
            Artifact::Exposure(_) => "exposure",
            Artifact::PropertySet(_) => "property_set",
            Artifact::Packages(_) => "packages",
            Artifact::Document { .. } => "document",
        }
    }

    /// A dataset is readable when it deserialized to something non-null.
    pub fn is_readable(&self) -> bool {
        !matches!(self, Artifact::Document { content: Value::Null })
    }

    pub fn as_catalog(&self) -> Option<&Catalog> {
        match self {
            Artifact::Catalog(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_exposure(&self) -> Option<&Exposure> {
        match self {
            Artifact::Exposure(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_property_set(&self) -> Option<&PropertySet> {
        match self {
            Artifact::PropertySet(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_packages(&self) -> Option<&PackageManifest> {
        match self {
            Artifact::Packages(p) => Some(p),
            _ => None,
        }
    }
}

/// A table of measurement records with a declared schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub schema: Vec<String>,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl Catalog {
    pub fn new<I, S>(schema: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema: schema.into_iter().map(Into::into).collect(),
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.schema.iter().any(|c| c == name)
    }

    /// Columns whose names start with `prefix`, in schema order.
    pub fn columns_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.schema
            .iter()
            .filter(move |c| c.starts_with(prefix))
            .map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

/// Numeric view of a record field; booleans are not numbers.
pub fn field_f64(record: &Record, name: &str) -> Option<f64> {
    record.get(name).and_then(Value::as_f64)
}

pub fn field_i64(record: &Record, name: &str) -> Option<i64> {
    record.get(name).and_then(Value::as_i64)
}

/// Flag view of a record field. Integer flags (0/1) are accepted.
pub fn field_flag(record: &Record, name: &str) -> Option<bool> {
    match record.get(name)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

/// An image with its mask plane and attached calibration products.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    #[serde(default)]
    pub width: usize,
    #[serde(default)]
    pub height: usize,
    /// Mask plane name to bit index.
    #[serde(default)]
    pub mask_planes: BTreeMap<String, u8>,
    /// Per-pixel mask words, row-major.
    #[serde(default)]
    pub mask: Vec<u32>,
    #[serde(default)]
    pub transmission_curve: Option<TransmissionCurve>,
    #[serde(default)]
    pub metadata: PropertySet,
}

impl Exposure {
    pub fn plane_bitmask(&self, plane: &str) -> Option<u32> {
        self.mask_planes
            .get(plane)
            .and_then(|bit| 1u32.checked_shl(u32::from(*bit)))
    }

    /// Number of pixels with the given plane set, `None` if the plane is
    /// not defined for this mask.
    pub fn count_masked(&self, plane: &str) -> Option<usize> {
        let bitmask = self.plane_bitmask(plane)?;
        Some(self.mask.iter().filter(|px| *px & bitmask != 0).count())
    }
}

/// Throughput as a function of wavelength.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransmissionCurve {
    #[serde(default)]
    pub wavelengths: Vec<f64>,
    #[serde(default)]
    pub throughput: Vec<f64>,
}

/// Free-form name/value metadata, as written by pipeline tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySet {
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl PropertySet {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }
}

/// Versions of the software components used to produce a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub packages: BTreeMap<String, String>,
}

impl PackageManifest {
    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }
}
