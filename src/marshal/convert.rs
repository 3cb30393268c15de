//! Element conversions from host values to renderer-native scalars and
//! arrays.
//!
//! Scalar getters accept either a scalar or an array, in which case the first
//! element is used and the rest ignored. Floating point narrowing is the
//! plain `as f32` cast (IEEE round-to-nearest); wider integers truncate.

use glam::{Mat4, Quat};
use half::f16;

use crate::{
    catalog::ParamType,
    universe::ArrayData,
    value::{Array, Value},
};

fn h(v: f16) -> f32 {
    v.to_f32()
}

fn with_scalar<T>(value: &Value, f: impl FnOnce(&Value) -> Option<T>) -> Option<T> {
    let scalar = value.first()?;
    f(&*scalar)
}

pub fn to_bool(value: &Value) -> Option<bool> {
    with_scalar(value, |v| match v {
        Value::Bool(b) => Some(*b),
        Value::Byte(x) => Some(*x != 0),
        Value::Int(x) => Some(*x != 0),
        Value::Int64(x) => Some(*x != 0),
        Value::UInt(x) => Some(*x != 0),
        Value::UInt64(x) => Some(*x != 0),
        _ => None,
    })
}

pub fn to_byte(value: &Value) -> Option<u8> {
    with_scalar(value, |v| match v {
        Value::Byte(x) => Some(*x),
        Value::Bool(b) => Some(u8::from(*b)),
        Value::Int(x) => Some(*x as u8),
        Value::Int64(x) => Some(*x as u8),
        Value::UInt(x) => Some(*x as u8),
        Value::UInt64(x) => Some(*x as u8),
        _ => None,
    })
}

pub fn to_int(value: &Value) -> Option<i32> {
    with_scalar(value, |v| match v {
        Value::Int(x) => Some(*x),
        Value::Bool(b) => Some(i32::from(*b)),
        Value::Byte(x) => Some(i32::from(*x)),
        Value::Int64(x) => Some(*x as i32),
        Value::UInt(x) => Some(*x as i32),
        Value::UInt64(x) => Some(*x as i32),
        _ => None,
    })
}

pub fn to_uint(value: &Value) -> Option<u32> {
    with_scalar(value, |v| match v {
        Value::UInt(x) => Some(*x),
        Value::Bool(b) => Some(u32::from(*b)),
        Value::Byte(x) => Some(u32::from(*x)),
        Value::Int(x) => Some(*x as u32),
        Value::Int64(x) => Some(*x as u32),
        Value::UInt64(x) => Some(*x as u32),
        _ => None,
    })
}

pub fn to_float(value: &Value) -> Option<f32> {
    with_scalar(value, |v| match v {
        Value::Float(x) => Some(*x),
        Value::Double(x) => Some(*x as f32),
        Value::Half(x) => Some(h(*x)),
        _ => None,
    })
}

fn vec2_of(v: &Value) -> Option<[f32; 2]> {
    match v {
        Value::Vec2f(x) => Some(*x),
        Value::Vec2d(x) => Some([x[0] as f32, x[1] as f32]),
        Value::Vec2h(x) => Some([h(x[0]), h(x[1])]),
        _ => None,
    }
}

fn vec3_of(v: &Value) -> Option<[f32; 3]> {
    match v {
        Value::Vec3f(x) => Some(*x),
        Value::Vec3d(x) => Some([x[0] as f32, x[1] as f32, x[2] as f32]),
        Value::Vec3h(x) => Some([h(x[0]), h(x[1]), h(x[2])]),
        _ => None,
    }
}

fn vec4_of(v: &Value) -> Option<[f32; 4]> {
    match v {
        Value::Vec4f(x) => Some(*x),
        Value::Vec4d(x) => Some([x[0] as f32, x[1] as f32, x[2] as f32, x[3] as f32]),
        Value::Vec4h(x) => Some([h(x[0]), h(x[1]), h(x[2]), h(x[3])]),
        _ => None,
    }
}

fn float_of(v: &Value) -> Option<f32> {
    match v {
        Value::Float(x) => Some(*x),
        Value::Double(x) => Some(*x as f32),
        Value::Half(x) => Some(h(*x)),
        _ => None,
    }
}

/// Two-component vector; wider vectors keep `xy`, a float splats.
pub fn to_vec2(value: &Value) -> Option<[f32; 2]> {
    with_scalar(value, |v| {
        vec2_of(v)
            .or_else(|| vec3_of(v).map(|x| [x[0], x[1]]))
            .or_else(|| vec4_of(v).map(|x| [x[0], x[1]]))
            .or_else(|| float_of(v).map(|x| [x; 2]))
    })
}

/// Three-component vector; `vec4` drops `w`, `vec2` pads `z = 0`, a float
/// splats.
pub fn to_vec3(value: &Value) -> Option<[f32; 3]> {
    with_scalar(value, |v| {
        vec3_of(v)
            .or_else(|| vec4_of(v).map(|x| [x[0], x[1], x[2]]))
            .or_else(|| vec2_of(v).map(|x| [x[0], x[1], 0.0]))
            .or_else(|| float_of(v).map(|x| [x; 3]))
    })
}

/// Four-component vector; `vec3` pads `w = 1`, a float splats.
pub fn to_vec4(value: &Value) -> Option<[f32; 4]> {
    with_scalar(value, |v| {
        vec4_of(v)
            .or_else(|| vec3_of(v).map(|x| [x[0], x[1], x[2], 1.0]))
            .or_else(|| float_of(v).map(|x| [x; 4]))
    })
}

/// RGB color from a 3- or 4-component vector (alpha dropped) or a grey
/// float. Channel order is preserved.
pub fn to_color3(value: &Value) -> Option<[f32; 3]> {
    with_scalar(value, |v| {
        vec3_of(v)
            .or_else(|| vec4_of(v).map(|x| [x[0], x[1], x[2]]))
            .or_else(|| float_of(v).map(|x| [x; 3]))
    })
}

/// RGBA color; an RGB input gets an opaque alpha.
pub fn to_color4(value: &Value) -> Option<[f32; 4]> {
    with_scalar(value, |v| {
        vec4_of(v)
            .or_else(|| vec3_of(v).map(|x| [x[0], x[1], x[2], 1.0]))
            .or_else(|| float_of(v).map(|x| [x, x, x, 1.0]))
    })
}

/// Strings, tokens and assets all resolve to text; assets prefer the
/// resolved path.
pub fn to_text(value: &Value) -> Option<String> {
    with_scalar(value, |v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Token(t) => Some(t.to_string()),
        Value::Asset(a) => Some(a.resolve().to_string()),
        _ => None,
    })
}

pub fn to_matrix(value: &Value) -> Option<Mat4> {
    with_scalar(value, |v| match v {
        Value::Matrix4f(m) => Some(*m),
        Value::Matrix4d(m) => Some(m.as_mat4()),
        _ => None,
    })
}

/// Quaternion; half quaternions are stored `[x, y, z, w]`.
pub fn to_quat(value: &Value) -> Option<Quat> {
    with_scalar(value, |v| match v {
        Value::Quatf(q) => Some(*q),
        Value::Quatd(q) => Some(q.as_quat()),
        Value::Quath(q) => Some(Quat::from_xyzw(h(q[0]), h(q[1]), h(q[2]), h(q[3]))),
        _ => None,
    })
}

fn map<T, U>(items: &[T], f: impl Fn(&T) -> U) -> Vec<U> {
    items.iter().map(f).collect()
}

/// Converts a whole array (or a scalar, treated as one element) to renderer
/// array storage of element type `ty`. Only same-arity families convert;
/// colors additionally accept the other color width.
pub fn to_array(ty: ParamType, value: &Value) -> Option<ArrayData> {
    let array = value.clone().into_array()?;
    Some(match (ty, &array) {
        (ParamType::Bool, Array::Bool(v)) => ArrayData::Bool(v.clone()),
        (ParamType::Bool, Array::Byte(v)) => ArrayData::Bool(map(v, |x| *x != 0)),
        (ParamType::Bool, Array::Int(v)) => ArrayData::Bool(map(v, |x| *x != 0)),
        (ParamType::Bool, Array::UInt(v)) => ArrayData::Bool(map(v, |x| *x != 0)),

        (ParamType::Byte, Array::Byte(v)) => ArrayData::Byte(v.clone()),
        (ParamType::Byte, Array::Bool(v)) => ArrayData::Byte(map(v, |x| u8::from(*x))),
        (ParamType::Byte, Array::Int(v)) => ArrayData::Byte(map(v, |x| *x as u8)),
        (ParamType::Byte, Array::Int64(v)) => ArrayData::Byte(map(v, |x| *x as u8)),
        (ParamType::Byte, Array::UInt(v)) => ArrayData::Byte(map(v, |x| *x as u8)),
        (ParamType::Byte, Array::UInt64(v)) => ArrayData::Byte(map(v, |x| *x as u8)),

        (ParamType::Int, Array::Int(v)) => ArrayData::Int(v.clone()),
        (ParamType::Int, Array::Bool(v)) => ArrayData::Int(map(v, |x| i32::from(*x))),
        (ParamType::Int, Array::Byte(v)) => ArrayData::Int(map(v, |x| i32::from(*x))),
        (ParamType::Int, Array::Int64(v)) => ArrayData::Int(map(v, |x| *x as i32)),
        (ParamType::Int, Array::UInt(v)) => ArrayData::Int(map(v, |x| *x as i32)),
        (ParamType::Int, Array::UInt64(v)) => ArrayData::Int(map(v, |x| *x as i32)),

        (ParamType::UInt, Array::UInt(v)) => ArrayData::UInt(v.clone()),
        (ParamType::UInt, Array::Bool(v)) => ArrayData::UInt(map(v, |x| u32::from(*x))),
        (ParamType::UInt, Array::Byte(v)) => ArrayData::UInt(map(v, |x| u32::from(*x))),
        (ParamType::UInt, Array::Int(v)) => ArrayData::UInt(map(v, |x| *x as u32)),
        (ParamType::UInt, Array::Int64(v)) => ArrayData::UInt(map(v, |x| *x as u32)),
        (ParamType::UInt, Array::UInt64(v)) => ArrayData::UInt(map(v, |x| *x as u32)),

        (ParamType::Float, Array::Float(v)) => ArrayData::Float(v.clone()),
        (ParamType::Float, Array::Double(v)) => ArrayData::Float(map(v, |x| *x as f32)),
        (ParamType::Float, Array::Half(v)) => ArrayData::Float(map(v, |x| h(*x))),

        (ParamType::Vector2, Array::Vec2f(v)) => ArrayData::Vector2(v.clone()),
        (ParamType::Vector2, Array::Vec2d(v)) => {
            ArrayData::Vector2(map(v, |x| [x[0] as f32, x[1] as f32]))
        }
        (ParamType::Vector2, Array::Vec2h(v)) => ArrayData::Vector2(map(v, |x| [h(x[0]), h(x[1])])),

        (ParamType::Vector | ParamType::Rgb, Array::Vec3f(v)) => vec3_array(ty, v.clone()),
        (ParamType::Vector | ParamType::Rgb, Array::Vec3d(v)) => {
            vec3_array(ty, map(v, |x| [x[0] as f32, x[1] as f32, x[2] as f32]))
        }
        (ParamType::Vector | ParamType::Rgb, Array::Vec3h(v)) => {
            vec3_array(ty, map(v, |x| [h(x[0]), h(x[1]), h(x[2])]))
        }
        (ParamType::Rgb, Array::Vec4f(_) | Array::Vec4d(_) | Array::Vec4h(_)) => {
            let ArrayData::Rgba(v) = to_array(ParamType::Rgba, value)? else {
                return None;
            };
            ArrayData::Rgb(map(&v, |x| [x[0], x[1], x[2]]))
        }

        (ParamType::Rgba, Array::Vec4f(v)) => ArrayData::Rgba(v.clone()),
        (ParamType::Rgba, Array::Vec4d(v)) => {
            ArrayData::Rgba(map(v, |x| [x[0] as f32, x[1] as f32, x[2] as f32, x[3] as f32]))
        }
        (ParamType::Rgba, Array::Vec4h(v)) => {
            ArrayData::Rgba(map(v, |x| [h(x[0]), h(x[1]), h(x[2]), h(x[3])]))
        }
        (ParamType::Rgba, Array::Vec3f(_) | Array::Vec3d(_) | Array::Vec3h(_)) => {
            let ArrayData::Rgb(v) = to_array(ParamType::Rgb, value)? else {
                return None;
            };
            ArrayData::Rgba(map(&v, |x| [x[0], x[1], x[2], 1.0]))
        }

        (ParamType::String | ParamType::Enum, Array::String(v)) => ArrayData::String(v.clone()),
        (ParamType::String | ParamType::Enum, Array::Token(v)) => {
            ArrayData::String(map(v, |t| t.to_string()))
        }
        (ParamType::String | ParamType::Enum, Array::Asset(v)) => {
            ArrayData::String(map(v, |a| a.resolve().to_string()))
        }

        (ParamType::Matrix, Array::Matrix4f(v)) => ArrayData::Matrix(v.clone()),
        (ParamType::Matrix, Array::Matrix4d(v)) => ArrayData::Matrix(map(v, |m| m.as_mat4())),

        _ => return None,
    })
}

fn vec3_array(ty: ParamType, v: Vec<[f32; 3]>) -> ArrayData {
    if ty == ParamType::Rgb {
        ArrayData::Rgb(v)
    } else {
        ArrayData::Vector(v)
    }
}
