//! Typed values exchanged with the co-simulation broker.

use serde::{Deserialize, Serialize};

/// A value carried on a publication or subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FedValue {
    Double(f64),
    Vector(Vec<f64>),
    Integer(i64),
    Boolean(bool),
    Str(String),
}

impl FedValue {
    /// Scalar view. Vectors yield their first entry, matching how a
    /// single-phase subscription reads a multi-phase publication.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FedValue::Double(v) => Some(*v),
            FedValue::Vector(v) => v.first().copied(),
            FedValue::Integer(v) => Some(*v as f64),
            FedValue::Boolean(_) | FedValue::Str(_) => None,
        }
    }

    pub fn as_row(&self) -> Vec<f64> {
        match self {
            FedValue::Double(v) => vec![*v],
            FedValue::Vector(v) => v.clone(),
            FedValue::Integer(v) => vec![*v as f64],
            FedValue::Boolean(b) => vec![if *b { 1.0 } else { 0.0 }],
            FedValue::Str(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_views() {
        assert_eq!(FedValue::Double(2.5).as_f64(), Some(2.5));
        assert_eq!(FedValue::Vector(vec![7.0, 8.0]).as_f64(), Some(7.0));
        assert_eq!(FedValue::Integer(-3).as_f64(), Some(-3.0));
        assert_eq!(FedValue::Str("x".to_string()).as_f64(), None);
    }
}
