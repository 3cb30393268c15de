//! Renderer-native parameter values.

use std::ops::Range;

use glam::Mat4;

use super::NodeHandle;
use crate::catalog::{ParamDecl, ParamType};

/// A value stored on a renderer node parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Byte(u8),
    Int(i32),
    UInt(u32),
    Float(f32),
    Vector2([f32; 2]),
    Vector([f32; 3]),
    Rgb([f32; 3]),
    Rgba([f32; 4]),
    /// Strings and enum values (enums are stored by name).
    String(String),
    Matrix(Mat4),
    Node(Option<NodeHandle>),
    Array(ParamArray),
}

impl ParamValue {
    /// Element type and whether the value is an array.
    pub fn param_type(&self) -> (ParamType, bool) {
        match self {
            ParamValue::Bool(_) => (ParamType::Bool, false),
            ParamValue::Byte(_) => (ParamType::Byte, false),
            ParamValue::Int(_) => (ParamType::Int, false),
            ParamValue::UInt(_) => (ParamType::UInt, false),
            ParamValue::Float(_) => (ParamType::Float, false),
            ParamValue::Vector2(_) => (ParamType::Vector2, false),
            ParamValue::Vector(_) => (ParamType::Vector, false),
            ParamValue::Rgb(_) => (ParamType::Rgb, false),
            ParamValue::Rgba(_) => (ParamType::Rgba, false),
            ParamValue::String(_) => (ParamType::String, false),
            ParamValue::Matrix(_) => (ParamType::Matrix, false),
            ParamValue::Node(_) => (ParamType::Node, false),
            ParamValue::Array(a) => (a.data.element_type(), true),
        }
    }

    /// Whether this value can be stored in a parameter declared as
    /// `ty`/`array`. Enum parameters store their value name as a string.
    pub fn fits(&self, ty: ParamType, array: bool) -> bool {
        let (own, is_array) = self.param_type();
        let ty = if ty == ParamType::Enum { ParamType::String } else { ty };
        own == ty && is_array == array
    }

    pub fn as_array(&self) -> Option<&ParamArray> {
        match self {
            ParamValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Option<u8> {
        match self {
            ParamValue::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeHandle> {
        match self {
            ParamValue::Node(v) => *v,
            _ => None,
        }
    }

    /// Declared default of a catalog parameter.
    pub fn default_for(decl: &ParamDecl) -> ParamValue {
        if decl.array {
            return ParamValue::Array(ParamArray::new(ArrayData::empty_of(decl.ty)));
        }
        let json = decl.default.as_ref();
        let number = || json.and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        let floats = |n: usize| -> Vec<f32> {
            let mut out = vec![0.0; n];
            if let Some(items) = json.and_then(serde_json::Value::as_array) {
                for (slot, item) in out.iter_mut().zip(items) {
                    *slot = item.as_f64().unwrap_or(0.0) as f32;
                }
            }
            out
        };
        match decl.ty {
            ParamType::Bool => ParamValue::Bool(json.and_then(serde_json::Value::as_bool).unwrap_or(false)),
            ParamType::Byte => ParamValue::Byte(number() as u8),
            ParamType::Int => ParamValue::Int(number() as i32),
            ParamType::UInt => ParamValue::UInt(number() as u32),
            ParamType::Float => ParamValue::Float(number() as f32),
            ParamType::Vector2 => {
                let v = floats(2);
                ParamValue::Vector2([v[0], v[1]])
            }
            ParamType::Vector => {
                let v = floats(3);
                ParamValue::Vector([v[0], v[1], v[2]])
            }
            ParamType::Rgb => {
                let v = floats(3);
                ParamValue::Rgb([v[0], v[1], v[2]])
            }
            ParamType::Rgba => {
                let v = floats(4);
                ParamValue::Rgba([v[0], v[1], v[2], v[3]])
            }
            ParamType::String => ParamValue::String(
                json.and_then(serde_json::Value::as_str).unwrap_or_default().to_string(),
            ),
            ParamType::Enum => ParamValue::String(
                json.and_then(serde_json::Value::as_str)
                    .map(str::to_string)
                    .or_else(|| decl.enum_values.first().cloned())
                    .unwrap_or_default(),
            ),
            ParamType::Matrix => ParamValue::Matrix(Mat4::IDENTITY),
            ParamType::Node => ParamValue::Node(None),
        }
    }
}

macro_rules! define_array_data {
    ($($kind:ident($ty:ty) => $getter:ident),* $(,)?) => {
        /// Flat element storage of an array parameter; motion keys are laid
        /// out one after another.
        #[derive(Debug, Clone, PartialEq)]
        pub enum ArrayData {
            $($kind(Vec<$ty>),)*
        }

        impl ArrayData {
            pub fn len(&self) -> usize {
                match self {
                    $(ArrayData::$kind(v) => v.len(),)*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            pub fn element_type(&self) -> ParamType {
                match self {
                    $(ArrayData::$kind(_) => ParamType::$kind,)*
                }
            }

            pub fn slice(&self, range: Range<usize>) -> ArrayData {
                match self {
                    $(ArrayData::$kind(v) => ArrayData::$kind(v[range].to_vec()),)*
                }
            }

            /// Appends `other` when both hold the same element type.
            pub fn append(&mut self, other: ArrayData) -> bool {
                match (self, other) {
                    $((ArrayData::$kind(a), ArrayData::$kind(b)) => {
                        a.extend(b);
                        true
                    })*
                    _ => false,
                }
            }

            $(
                pub fn $getter(&self) -> Option<&[$ty]> {
                    match self {
                        ArrayData::$kind(v) => Some(v),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            )*
        }
    };
}

define_array_data! {
    Bool(bool) => as_bool,
    Byte(u8) => as_byte,
    Int(i32) => as_int,
    UInt(u32) => as_uint,
    Float(f32) => as_float,
    Vector2([f32; 2]) => as_vector2,
    Vector([f32; 3]) => as_vector,
    Rgb([f32; 3]) => as_rgb,
    Rgba([f32; 4]) => as_rgba,
    String(String) => as_string,
    Matrix(Mat4) => as_matrix,
    Node(Option<NodeHandle>) => as_node,
}

impl ArrayData {
    pub fn empty_of(ty: ParamType) -> ArrayData {
        match ty {
            ParamType::Bool => ArrayData::Bool(Vec::new()),
            ParamType::Byte => ArrayData::Byte(Vec::new()),
            ParamType::Int => ArrayData::Int(Vec::new()),
            ParamType::UInt => ArrayData::UInt(Vec::new()),
            ParamType::Float => ArrayData::Float(Vec::new()),
            ParamType::Vector2 => ArrayData::Vector2(Vec::new()),
            ParamType::Vector => ArrayData::Vector(Vec::new()),
            ParamType::Rgb => ArrayData::Rgb(Vec::new()),
            ParamType::Rgba => ArrayData::Rgba(Vec::new()),
            ParamType::String | ParamType::Enum => ArrayData::String(Vec::new()),
            ParamType::Matrix => ArrayData::Matrix(Vec::new()),
            ParamType::Node => ArrayData::Node(Vec::new()),
        }
    }
}

/// Array parameter value, possibly holding several motion keys of
/// `num_elements` each.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamArray {
    pub num_elements: usize,
    pub num_keys: usize,
    pub data: ArrayData,
}

impl ParamArray {
    pub fn new(data: ArrayData) -> Self {
        Self {
            num_elements: data.len(),
            num_keys: 1,
            data,
        }
    }

    /// Builds a multi-key array. Every key must hold the same element type
    /// and count.
    pub fn from_keys(keys: Vec<ArrayData>) -> Option<Self> {
        let mut iter = keys.into_iter();
        let mut data = iter.next()?;
        let num_elements = data.len();
        let mut num_keys = 1;
        for key in iter {
            if key.len() != num_elements || !data.append(key) {
                return None;
            }
            num_keys += 1;
        }
        Some(Self {
            num_elements,
            num_keys,
            data,
        })
    }

    pub fn key(&self, index: usize) -> Option<ArrayData> {
        if index >= self.num_keys {
            return None;
        }
        let start = index * self.num_elements;
        Some(self.data.slice(start..start + self.num_elements))
    }
}

impl From<ArrayData> for ParamValue {
    fn from(data: ArrayData) -> Self {
        ParamValue::Array(ParamArray::new(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(json: &str) -> ParamDecl {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults_follow_declarations() {
        assert_eq!(
            ParamValue::default_for(&decl(r#"{"type":"rgb","default":[0.5,0.25,1.0]}"#)),
            ParamValue::Rgb([0.5, 0.25, 1.0])
        );
        assert_eq!(
            ParamValue::default_for(&decl(r#"{"type":"byte","default":255}"#)),
            ParamValue::Byte(255)
        );
        assert_eq!(
            ParamValue::default_for(&decl(r#"{"type":"enum","enum_values":["a","b"]}"#)),
            ParamValue::String("a".into())
        );
        assert_eq!(
            ParamValue::default_for(&decl(r#"{"type":"uint","array":true}"#)),
            ParamValue::from(ArrayData::UInt(vec![]))
        );
    }

    #[test]
    fn test_from_keys_requires_matching_counts() {
        let keys = vec![
            ArrayData::Vector(vec![[0.0; 3], [1.0; 3]]),
            ArrayData::Vector(vec![[2.0; 3], [3.0; 3]]),
        ];
        let arr = ParamArray::from_keys(keys).unwrap();
        assert_eq!(arr.num_keys, 2);
        assert_eq!(arr.num_elements, 2);
        assert_eq!(arr.key(1), Some(ArrayData::Vector(vec![[2.0; 3], [3.0; 3]])));
        assert_eq!(arr.key(2), None);

        let mismatched = vec![ArrayData::Float(vec![1.0]), ArrayData::Float(vec![1.0, 2.0])];
        assert!(ParamArray::from_keys(mismatched).is_none());
    }

    #[test]
    fn test_enum_params_store_strings() {
        let v = ParamValue::String("catclark".into());
        assert!(v.fits(ParamType::Enum, false));
        assert!(!v.fits(ParamType::Enum, true));
    }
}
