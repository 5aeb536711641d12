//! Conversion of model data into JSON-native values.

use crate::error::{Result, StanError};
use ndarray::{Array, ArrayD, ArrayViewD};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Model data keyed by variable name.
pub type Data = BTreeMap<String, DataValue>;

/// A single data variable as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Already JSON; passed through unchanged.
    Json(Value),
    /// A real scalar. Non-finite values have no JSON representation.
    Real(f64),
    /// Real array of any rank, including rank zero.
    RealArray(ArrayD<f64>),
    /// Integer array of any rank, including rank zero.
    IntArray(ArrayD<i64>),
    /// Unordered integer collection; emitted in ascending order.
    IntSet(BTreeSet<i64>),
}

impl From<Value> for DataValue {
    fn from(value: Value) -> Self {
        DataValue::Json(value)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Real(value)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Json(Value::from(value))
    }
}

impl From<ArrayD<f64>> for DataValue {
    fn from(value: ArrayD<f64>) -> Self {
        DataValue::RealArray(value)
    }
}

impl From<ArrayD<i64>> for DataValue {
    fn from(value: ArrayD<i64>) -> Self {
        DataValue::IntArray(value)
    }
}

impl From<Vec<f64>> for DataValue {
    fn from(value: Vec<f64>) -> Self {
        DataValue::RealArray(Array::from_vec(value).into_dyn())
    }
}

impl From<Vec<i64>> for DataValue {
    fn from(value: Vec<i64>) -> Self {
        DataValue::IntArray(Array::from_vec(value).into_dyn())
    }
}

impl From<BTreeSet<i64>> for DataValue {
    fn from(value: BTreeSet<i64>) -> Self {
        DataValue::IntSet(value)
    }
}

impl DataValue {
    /// Convert to a JSON value, or `None` when some element has no JSON form.
    fn to_json(&self) -> Option<Value> {
        match self {
            DataValue::Json(value) => Some(value.clone()),
            DataValue::Real(x) => real(*x),
            DataValue::RealArray(array) => nested(array.view(), &|x: f64| real(x)),
            DataValue::IntArray(array) => nested(array.view(), &|x: i64| Some(Value::from(x))),
            DataValue::IntSet(set) => Some(Value::Array(set.iter().map(|&x| Value::from(x)).collect())),
        }
    }
}

fn real(x: f64) -> Option<Value> {
    Number::from_f64(x).map(Value::Number)
}

/// Rank-zero arrays become bare scalars; higher ranks become nested lists in row-major order.
fn nested<T, F>(view: ArrayViewD<'_, T>, leaf: &F) -> Option<Value>
where
    T: Copy,
    F: Fn(T) -> Option<Value>,
{
    if view.ndim() == 0 {
        return view.first().and_then(|&x| leaf(x));
    }
    view.outer_iter()
        .map(|sub| nested(sub, leaf))
        .collect::<Option<Vec<_>>>()
        .map(Value::Array)
}

/// Normalize caller data into a JSON map. The input is left untouched.
pub fn normalize(data: &Data) -> Result<Map<String, Value>> {
    data.iter()
        .map(|(name, value)| {
            value
                .to_json()
                .map(|json| (name.clone(), json))
                .ok_or_else(|| StanError::Serialization {
                    variable: name.clone(),
                })
        })
        .collect()
}
