use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bytes per serialized descriptor element (little-endian IEEE-754 `f32`).
pub const BYTES_PER_ELEMENT: usize = 4;

/// Store-assigned identifier of an enrolled person.
pub type IdentityId = i64;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("encoded descriptor is {0} bytes, not a multiple of 4")]
    InvalidEncoding(usize),
}

/// Face descriptor produced by an external extractor (e.g. 128-dim Facenet).
///
/// Immutable once built; dimensionality is whatever the extractor produced and is
/// checked against configuration by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Fail with [`DescriptorError::DimensionMismatch`] unless this descriptor has
    /// exactly `expected` elements.
    pub fn check_dim(&self, expected: usize) -> Result<(), DescriptorError> {
        if self.dim() != expected {
            return Err(DescriptorError::DimensionMismatch {
                expected,
                actual: self.dim(),
            });
        }
        Ok(())
    }

    /// Euclidean (L2) distance to `other`.
    pub fn distance(&self, other: &Descriptor) -> Result<f32, DescriptorError> {
        other.check_dim(self.dim())?;
        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }

    /// Flat little-endian `f32` array, no length prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.values.len() * BYTES_PER_ELEMENT);
        for v in &self.values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Inverse of [`to_bytes`](Self::to_bytes). The element count is implied by the
    /// byte length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        if bytes.len() % BYTES_PER_ELEMENT != 0 {
            return Err(DescriptorError::InvalidEncoding(bytes.len()));
        }
        let values = bytes
            .chunks_exact(BYTES_PER_ELEMENT)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { values })
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// An enrolled person. Never mutated after enrollment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
    #[serde(skip_serializing)]
    pub descriptor: Descriptor,
}

/// Entry/exit classification, derived from time of day only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Entry,
    Exit,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Entry => "entry",
            Category::Exit => "exit",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Category::Entry),
            "exit" => Ok(Category::Exit),
            other => Err(format!("unknown attendance category: {other}")),
        }
    }
}

/// A recorded attendance event. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub identity_id: IdentityId,
    pub timestamp: DateTime<Local>,
    pub category: Category,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(values: &[f32]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = d(&[0.25, -1.5, 3.0, 0.0]);
        assert_eq!(a.distance(&a).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = d(&[0.1, 0.2, 0.3]);
        let b = d(&[-0.7, 0.9, 0.05]);
        assert_eq!(a.distance(&b).unwrap(), b.distance(&a).unwrap());
    }

    #[test]
    fn test_distance_known_value() {
        let a = d(&[0.0, 0.0]);
        let b = d(&[3.0, 4.0]);
        assert!((a.distance(&b).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let a = d(&[1.0, 2.0, 3.0]);
        let b = d(&[1.0, 2.0]);
        assert_eq!(
            a.distance(&b),
            Err(DescriptorError::DimensionMismatch { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn test_bytes_round_trip_exact() {
        let a = d(&[1.0, -0.0, f32::MIN_POSITIVE, 123456.78, -3.4e38, 0.1]);
        let bytes = a.to_bytes();
        assert_eq!(bytes.len(), 6 * BYTES_PER_ELEMENT);
        assert_eq!(Descriptor::from_bytes(&bytes).unwrap(), a);
    }

    #[test]
    fn test_bytes_little_endian_no_header() {
        let bytes = d(&[1.0]).to_bytes();
        assert_eq!(bytes, vec![0x00, 0x00, 0x80, 0x3f]);
    }

    #[test]
    fn test_from_bytes_rejects_partial_element() {
        assert_eq!(
            Descriptor::from_bytes(&[0u8; 7]),
            Err(DescriptorError::InvalidEncoding(7))
        );
    }

    #[test]
    fn test_from_bytes_empty() {
        assert_eq!(Descriptor::from_bytes(&[]).unwrap().dim(), 0);
    }

    #[test]
    fn test_check_dim() {
        let a = d(&[0.0; 4]);
        assert!(a.check_dim(4).is_ok());
        assert!(a.check_dim(128).is_err());
    }

    #[test]
    fn test_category_parse_and_display() {
        assert_eq!("entry".parse::<Category>(), Ok(Category::Entry));
        assert_eq!("exit".parse::<Category>(), Ok(Category::Exit));
        assert!("lunch".parse::<Category>().is_err());
        assert_eq!(Category::Exit.to_string(), "exit");
    }

    #[test]
    fn test_identity_json_omits_descriptor() {
        let identity = Identity {
            id: 7,
            name: "Alice".into(),
            descriptor: d(&[0.5; 128]),
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 7, "name": "Alice" }));
    }
}
