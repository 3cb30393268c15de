//! Dynamically tagged attribute values as handed over by the host scene graph.
//!
//! A [`Value`] is a closed sum over every attribute kind the host can author,
//! plus [`Array`], a homogeneous list of any one of those kinds. The tag of a
//! value never changes after construction; conversions always produce a new
//! value (see `marshal::convert`).

use std::{borrow::Borrow, borrow::Cow, fmt, ops::Deref, sync::Arc};

use glam::{DMat4, DQuat, Mat4, Quat};
use half::f16;

/// Cheap-to-clone interned-style string used for names, enum values and
/// host tokens.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(Arc<str>);

impl Token {
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new("")
    }
}

impl Deref for Token {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl PartialEq<str> for Token {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// Asset reference: the path as authored plus the filesystem path the host
/// resolved it to (empty when resolution failed or was not attempted).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssetPath {
    pub authored: String,
    pub resolved: String,
}

impl AssetPath {
    pub fn new(authored: impl Into<String>) -> Self {
        Self {
            authored: authored.into(),
            resolved: String::new(),
        }
    }

    pub fn with_resolved(authored: impl Into<String>, resolved: impl Into<String>) -> Self {
        Self {
            authored: authored.into(),
            resolved: resolved.into(),
        }
    }

    /// Resolved path when available, the authored form otherwise.
    pub fn resolve(&self) -> &str {
        if self.resolved.is_empty() {
            &self.authored
        } else {
            &self.resolved
        }
    }
}

macro_rules! define_value_kinds {
    ($($kind:ident($ty:ty) => $name:literal),* $(,)?) => {
        /// A single host attribute value.
        #[derive(Debug, Clone, PartialEq, Default)]
        pub enum Value {
            /// The host had nothing to return.
            #[default]
            Empty,
            $($kind($ty),)*
            Array(Array),
        }

        /// Homogeneous array of one scalar kind.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Array {
            $($kind(Vec<$ty>),)*
        }

        impl Array {
            pub fn len(&self) -> usize {
                match self {
                    $(Array::$kind(v) => v.len(),)*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Element `index` boxed back into a scalar [`Value`].
            pub fn get(&self, index: usize) -> Option<Value> {
                match self {
                    $(Array::$kind(v) => v.get(index).cloned().map(Value::$kind),)*
                }
            }

            pub fn type_name(&self) -> &'static str {
                match self {
                    $(Array::$kind(_) => concat!($name, "[]"),)*
                }
            }

            /// Picks elements by index; `None` if any index is out of range.
            pub fn gather(&self, indices: &[i32]) -> Option<Array> {
                Some(match self {
                    $(Array::$kind(v) => Array::$kind(
                        indices
                            .iter()
                            .map(|&i| usize::try_from(i).ok().and_then(|i| v.get(i).cloned()))
                            .collect::<Option<Vec<_>>>()?,
                    ),)*
                })
            }
        }

        impl Value {
            pub fn type_name(&self) -> &'static str {
                match self {
                    Value::Empty => "empty",
                    $(Value::$kind(_) => $name,)*
                    Value::Array(a) => a.type_name(),
                }
            }
        }
    };
}

macro_rules! impl_value_from {
    ($($kind:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$kind(v)
                }
            }

            impl From<Vec<$ty>> for Value {
                fn from(v: Vec<$ty>) -> Self {
                    Value::Array(Array::$kind(v))
                }
            }
        )*
    };
}

define_value_kinds! {
    Bool(bool) => "bool",
    Byte(u8) => "uchar",
    Int(i32) => "int",
    Int64(i64) => "int64",
    UInt(u32) => "uint",
    UInt64(u64) => "uint64",
    Half(f16) => "half",
    Float(f32) => "float",
    Double(f64) => "double",
    String(String) => "string",
    Token(Token) => "token",
    Asset(AssetPath) => "asset",
    Vec2h([f16; 2]) => "half2",
    Vec2f([f32; 2]) => "float2",
    Vec2d([f64; 2]) => "double2",
    Vec3h([f16; 3]) => "half3",
    Vec3f([f32; 3]) => "float3",
    Vec3d([f64; 3]) => "double3",
    Vec4h([f16; 4]) => "half4",
    Vec4f([f32; 4]) => "float4",
    Vec4d([f64; 4]) => "double4",
    Quath([f16; 4]) => "quath",
    Quatf(Quat) => "quatf",
    Quatd(DQuat) => "quatd",
    Matrix4f(Mat4) => "matrix4f",
    Matrix4d(DMat4) => "matrix4d",
}

// `Quath` shares its storage with `Vec4h` and is built explicitly.
impl_value_from! {
    Bool(bool),
    Byte(u8),
    Int(i32),
    Int64(i64),
    UInt(u32),
    UInt64(u64),
    Half(f16),
    Float(f32),
    Double(f64),
    String(String),
    Token(Token),
    Asset(AssetPath),
    Vec2h([f16; 2]),
    Vec2f([f32; 2]),
    Vec2d([f64; 2]),
    Vec3h([f16; 3]),
    Vec3f([f32; 3]),
    Vec3d([f64; 3]),
    Vec4h([f16; 4]),
    Vec4f([f32; 4]),
    Vec4d([f64; 4]),
    Quatf(Quat),
    Quatd(DQuat),
    Matrix4f(Mat4),
    Matrix4d(DMat4),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

impl Value {
    /// True only for the "no value" state, not for empty arrays.
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Number of elements: zero for `Empty`, one for any scalar.
    pub fn element_count(&self) -> usize {
        match self {
            Value::Empty => 0,
            Value::Array(a) => a.len(),
            _ => 1,
        }
    }

    /// The scalar itself, or the first element of an array.
    pub fn first(&self) -> Option<Cow<'_, Value>> {
        match self {
            Value::Empty => None,
            Value::Array(a) => a.get(0).map(Cow::Owned),
            scalar => Some(Cow::Borrowed(scalar)),
        }
    }

    /// Wraps a scalar into a one-element array; arrays are returned as is.
    pub fn into_array(self) -> Option<Array> {
        Some(match self {
            Value::Empty => return None,
            Value::Array(a) => a,
            Value::Bool(v) => Array::Bool(vec![v]),
            Value::Byte(v) => Array::Byte(vec![v]),
            Value::Int(v) => Array::Int(vec![v]),
            Value::Int64(v) => Array::Int64(vec![v]),
            Value::UInt(v) => Array::UInt(vec![v]),
            Value::UInt64(v) => Array::UInt64(vec![v]),
            Value::Half(v) => Array::Half(vec![v]),
            Value::Float(v) => Array::Float(vec![v]),
            Value::Double(v) => Array::Double(vec![v]),
            Value::String(v) => Array::String(vec![v]),
            Value::Token(v) => Array::Token(vec![v]),
            Value::Asset(v) => Array::Asset(vec![v]),
            Value::Vec2h(v) => Array::Vec2h(vec![v]),
            Value::Vec2f(v) => Array::Vec2f(vec![v]),
            Value::Vec2d(v) => Array::Vec2d(vec![v]),
            Value::Vec3h(v) => Array::Vec3h(vec![v]),
            Value::Vec3f(v) => Array::Vec3f(vec![v]),
            Value::Vec3d(v) => Array::Vec3d(vec![v]),
            Value::Vec4h(v) => Array::Vec4h(vec![v]),
            Value::Vec4f(v) => Array::Vec4f(vec![v]),
            Value::Vec4d(v) => Array::Vec4d(vec![v]),
            Value::Quath(v) => Array::Quath(vec![v]),
            Value::Quatf(v) => Array::Quatf(vec![v]),
            Value::Quatd(v) => Array::Quatd(vec![v]),
            Value::Matrix4f(v) => Array::Matrix4f(vec![v]),
            Value::Matrix4d(v) => Array::Matrix4d(vec![v]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_count_distinguishes_empty_scalar_and_array() {
        assert_eq!(Value::Empty.element_count(), 0);
        assert_eq!(Value::Float(1.0).element_count(), 1);
        assert_eq!(Value::from(vec![1.0f32, 2.0, 3.0]).element_count(), 3);
        assert_eq!(Value::from(Vec::<f32>::new()).element_count(), 0);
    }

    #[test]
    fn test_first_borrows_scalars_and_boxes_array_heads() {
        let scalar = Value::Int(7);
        assert!(matches!(scalar.first(), Some(Cow::Borrowed(Value::Int(7)))));

        let array = Value::from(vec![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(array.first().map(Cow::into_owned), Some(Value::Vec3f([1.0, 2.0, 3.0])));

        assert!(Value::from(Vec::<i32>::new()).first().is_none());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Empty.type_name(), "empty");
        assert_eq!(Value::Vec3h([f16::ZERO; 3]).type_name(), "half3");
        assert_eq!(Value::from(vec![Token::new("a")]).type_name(), "token[]");
    }

    #[test]
    fn test_asset_resolution_prefers_resolved_path() {
        assert_eq!(AssetPath::new("tex.png").resolve(), "tex.png");
        assert_eq!(
            AssetPath::with_resolved("tex.png", "/abs/tex.png").resolve(),
            "/abs/tex.png"
        );
    }

    #[test]
    fn test_into_array_wraps_scalars() {
        assert_eq!(Value::Float(2.0).into_array(), Some(Array::Float(vec![2.0])));
        assert_eq!(Value::Empty.into_array(), None);
    }

    #[test]
    fn test_gather_flattens_indexed_arrays() {
        let values = Array::Float(vec![10.0, 20.0, 30.0]);
        assert_eq!(values.gather(&[2, 0, 0]), Some(Array::Float(vec![30.0, 10.0, 10.0])));
        assert_eq!(values.gather(&[3]), None);
        assert_eq!(values.gather(&[-1]), None);
    }

    #[test]
    fn test_token_compares_with_str() {
        let t = Token::from("surface");
        assert_eq!(t, "surface");
        assert_eq!(t.as_str(), "surface");
        let map: std::collections::HashMap<Token, i32> = [(t.clone(), 1)].into_iter().collect();
        assert_eq!(map.get("surface"), Some(&1));
    }
}
