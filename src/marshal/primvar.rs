//! Primvar bookkeeping and user-data declaration on renderer nodes.

use indexmap::IndexMap;

use super::{
    NodeWriter, Role, convert, convert_scalar, indices,
    ray_flags::{RENDER_NAMESPACE, ShapeRayFlags},
};
use crate::{
    catalog::ParamType,
    error::DiagnosticKind,
    universe::{ArrayData, ParamValue, UserDeclaration, UserScope},
    value::{Token, Value},
};

/// How a primvar's elements map onto the primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Constant,
    Uniform,
    Varying,
    Vertex,
    FaceVarying,
    Instance,
}

/// Cached primvar of a primitive record.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimvarDesc {
    pub value: Value,
    pub indices: Vec<i32>,
    pub interpolation: Interpolation,
    pub role: Role,
    dirtied: bool,
}

impl PrimvarDesc {
    pub fn new(value: Value, indices: Vec<i32>, interpolation: Interpolation, role: Role) -> Self {
        Self {
            value,
            indices,
            interpolation,
            role,
            dirtied: true,
        }
    }

    /// Reports whether the primvar changed since the last call, and clears
    /// the flag.
    pub fn needs_update(&mut self) -> bool {
        std::mem::take(&mut self.dirtied)
    }

    pub fn is_color(&self) -> bool {
        self.role == Role::Color
    }

    /// Value with `indices` applied, or the value itself when unindexed.
    pub fn flattened(&self) -> Option<Value> {
        if self.indices.is_empty() {
            return Some(self.value.clone());
        }
        self.value
            .as_array()
            .and_then(|a| a.gather(&self.indices))
            .map(Value::Array)
    }
}

/// Primvars of one primitive, in host declaration order.
pub type PrimvarMap = IndexMap<Token, PrimvarDesc>;

/// Inserts or refreshes a primvar and marks it for update.
pub fn insert_primvar(
    map: &mut PrimvarMap,
    name: Token,
    value: Value,
    indices: Vec<i32>,
    interpolation: Interpolation,
    role: Role,
) {
    map.insert(name, PrimvarDesc::new(value, indices, interpolation, role));
}

/// Storage class requested by a primvar setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareScope {
    Constant,
    Uniform,
    Varying,
    Indexed,
}

/// Renderer type used to declare user data holding `value`.
pub fn user_type_of(value: &Value, is_color: bool) -> Option<ParamType> {
    let scalar = value.first()?;
    Some(match &*scalar {
        Value::Bool(_) => ParamType::Bool,
        Value::Byte(_) => ParamType::Byte,
        Value::UInt(_) | Value::UInt64(_) => ParamType::UInt,
        Value::Int(_) | Value::Int64(_) => ParamType::Int,
        Value::Half(_) | Value::Float(_) | Value::Double(_) => ParamType::Float,
        Value::Vec2h(_) | Value::Vec2f(_) | Value::Vec2d(_) => ParamType::Vector2,
        Value::Vec3h(_) | Value::Vec3f(_) | Value::Vec3d(_) if is_color => ParamType::Rgb,
        Value::Vec3h(_) | Value::Vec3f(_) | Value::Vec3d(_) => ParamType::Vector,
        Value::Vec4h(_) | Value::Vec4f(_) | Value::Vec4d(_) => ParamType::Rgba,
        Value::String(_) | Value::Token(_) | Value::Asset(_) => ParamType::String,
        Value::Matrix4f(_) | Value::Matrix4d(_) => ParamType::Matrix,
        _ => return None,
    })
}

/// Declares user data `name`. Built-in parameters are never shadowed; an
/// existing user parameter is redeclared, except the `<name>idxs` companion
/// of an indexed parameter which is kept as is.
pub fn declare_user_param(writer: &NodeWriter<'_>, name: &str, decl: UserDeclaration) -> bool {
    if writer.has_builtin(name) {
        writer.skip(
            DiagnosticKind::BuiltinCollision,
            format!("`{name}` is a built-in parameter, user data not declared"),
        );
        return false;
    }
    let universe = writer.universe;
    if universe.user_param(writer.node, name).is_some() {
        let is_index_companion = name.strip_suffix("idxs").is_some_and(|base| {
            universe
                .user_param(writer.node, base)
                .is_some_and(|d| d.scope == UserScope::Indexed)
        });
        if is_index_companion {
            return true;
        }
        if let Err(err) = universe.undeclare(writer.node, name) {
            writer.skip(err.kind(), err.to_string());
            return false;
        }
    }
    match universe.declare(writer.node, name, decl) {
        Ok(declared) => declared,
        Err(err) => {
            writer.skip(err.kind(), err.to_string());
            false
        }
    }
}

/// Declares user data with the scope derived from `scope` and the value's
/// shape, then assigns the value. Returns the number of elements written:
/// 1 for constants, the array length otherwise, 0 when nothing was written.
pub fn declare_and_assign(
    writer: &NodeWriter<'_>,
    name: &str,
    scope: DeclareScope,
    value: &Value,
    is_color: bool,
) -> usize {
    let size = value.element_count();
    if size == 0 {
        return 0;
    }
    let Some(ty) = user_type_of(value, is_color) else {
        writer.skip(
            DiagnosticKind::UnsupportedConversion,
            format!("no user data type for {} `{name}`", value.type_name()),
        );
        return 0;
    };
    let constant =
        !value.is_array() || ((scope == DeclareScope::Constant || name == "displayColor") && size <= 1);
    let user_scope = if constant {
        UserScope::Constant
    } else {
        match scope {
            DeclareScope::Constant => UserScope::ConstantArray,
            DeclareScope::Uniform => UserScope::Uniform,
            DeclareScope::Varying => UserScope::Varying,
            DeclareScope::Indexed => UserScope::Indexed,
        }
    };
    if !declare_user_param(writer, name, UserDeclaration::new(user_scope, ty)) {
        return 0;
    }
    let converted = if constant {
        convert_scalar(ty, &[], value)
    } else {
        convert::to_array(ty, value).map(ParamValue::from)
    };
    let written = converted.is_some_and(|v| writer.set_native(name, v));
    match (written, constant) {
        (false, _) => 0,
        (true, true) => 1,
        (true, false) => size,
    }
}

/// Constant primvars: ray-flag overrides, `render:`-namespaced built-ins, or
/// constant user data.
pub fn set_constant_primvar(writer: &NodeWriter<'_>, name: &str, desc: &PrimvarDesc, rays: &mut ShapeRayFlags) {
    if rays.apply_primvar(name, &desc.value) {
        return;
    }
    if let Some(builtin) = name.strip_prefix(RENDER_NAMESPACE) {
        writer.set(builtin, &desc.value);
        return;
    }
    declare_and_assign(writer, name, DeclareScope::Constant, &desc.value, desc.is_color());
}

pub fn set_uniform_primvar(writer: &NodeWriter<'_>, name: &str, desc: &PrimvarDesc) {
    match desc.flattened() {
        Some(value) => {
            declare_and_assign(writer, name, DeclareScope::Uniform, &value, desc.is_color());
        }
        None => writer.skip(
            DiagnosticKind::MalformedSamples,
            format!("uniform primvar `{name}` has out of range indices"),
        ),
    }
}

pub fn set_vertex_primvar(writer: &NodeWriter<'_>, name: &str, desc: &PrimvarDesc) {
    match desc.flattened() {
        Some(value) => {
            declare_and_assign(writer, name, DeclareScope::Varying, &value, desc.is_color());
        }
        None => writer.skip(
            DiagnosticKind::MalformedSamples,
            format!("vertex primvar `{name}` has out of range indices"),
        ),
    }
}

/// Face-varying primvars become indexed user data plus a `<name>idxs`
/// array. Winding is reversed per face when `vertex_counts` is given.
pub fn set_face_varying_primvar(
    writer: &NodeWriter<'_>,
    name: &str,
    desc: &PrimvarDesc,
    vertex_counts: Option<&[i32]>,
    vertex_count_sum: usize,
) {
    let num_elements = declare_and_assign(writer, name, DeclareScope::Indexed, &desc.value, desc.is_color());
    if num_elements <= 1 {
        return;
    }
    let idxs = if desc.indices.is_empty() {
        match indices::generate_vertex_idxs(num_elements, vertex_counts, vertex_count_sum) {
            Some(idxs) => idxs,
            None => {
                writer.skip(
                    DiagnosticKind::MalformedSamples,
                    format!(
                        "face-varying primvar `{name}` has {num_elements} values for {vertex_count_sum} face vertices"
                    ),
                );
                Vec::new()
            }
        }
    } else {
        indices::explicit_vertex_idxs(&desc.indices, vertex_counts)
    };
    let idx_name = format!("{name}idxs");
    if declare_user_param(
        writer,
        &idx_name,
        UserDeclaration::new(UserScope::ConstantArray, ParamType::UInt),
    ) {
        writer.set_native(&idx_name, ArrayData::UInt(idxs).into());
    }
}

/// Instance primvars are declared on the instancer node as
/// `instance_<name>`, one element per instance in `instance_indices`.
pub fn set_instance_primvar(writer: &NodeWriter<'_>, name: &str, desc: &PrimvarDesc, instance_indices: &[i32]) {
    let per_instance = desc
        .flattened()
        .and_then(|v| v.as_array().and_then(|a| a.gather(instance_indices)));
    let Some(values) = per_instance else {
        writer.skip(
            DiagnosticKind::MalformedSamples,
            format!("instance primvar `{name}` does not cover every instance"),
        );
        return;
    };
    let value = Value::Array(values);
    let Some(ty) = user_type_of(&value, desc.is_color()) else {
        writer.skip(
            DiagnosticKind::UnsupportedConversion,
            format!("no user data type for instance primvar `{name}`"),
        );
        return;
    };
    let param = format!("instance_{name}");
    if !declare_user_param(writer, &param, UserDeclaration::new(UserScope::ConstantArray, ty)) {
        return;
    }
    if let Some(data) = convert::to_array(ty, &value) {
        writer.set_native(&param, data.into());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        catalog::load_default_catalog,
        error::Diagnostics,
        universe::{NodeHandle, RenderUniverse},
    };

    struct Fixture {
        universe: RenderUniverse,
        diagnostics: Diagnostics,
        node: NodeHandle,
    }

    impl Fixture {
        fn new(entry: &str) -> Self {
            let universe = RenderUniverse::new(Arc::new(load_default_catalog().unwrap()));
            let node = universe.create_node(entry, "/prim").unwrap();
            Self {
                universe,
                diagnostics: Diagnostics::new(true),
                node,
            }
        }

        fn writer(&self) -> NodeWriter<'_> {
            NodeWriter::new(&self.universe, &self.diagnostics, self.node, "/prim")
        }
    }

    #[test]
    fn test_constant_scalar_declaration() {
        let f = Fixture::new("polymesh");
        let n = declare_and_assign(&f.writer(), "roughness", DeclareScope::Constant, &Value::Double(0.25), false);
        assert_eq!(n, 1);
        assert_eq!(
            f.universe.user_param(f.node, "roughness").map(|d| d.to_string()),
            Some("constant FLOAT".to_string())
        );
        assert_eq!(f.universe.param(f.node, "roughness"), Some(ParamValue::Float(0.25)));
    }

    #[test]
    fn test_constant_array_declaration_for_color_arrays() {
        let f = Fixture::new("polymesh");
        let value = Value::from(vec![[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let n = declare_and_assign(&f.writer(), "tint", DeclareScope::Constant, &value, true);
        assert_eq!(n, 2);
        assert_eq!(
            f.universe.user_param(f.node, "tint").map(|d| d.to_string()),
            Some("constant ARRAY RGB".to_string())
        );
    }

    #[test]
    fn test_display_color_single_element_is_constant() {
        let f = Fixture::new("polymesh");
        let value = Value::from(vec![[0.5f32, 0.5, 0.5]]);
        let n = declare_and_assign(&f.writer(), "displayColor", DeclareScope::Varying, &value, true);
        assert_eq!(n, 1);
        assert_eq!(f.universe.param(f.node, "displayColor"), Some(ParamValue::Rgb([0.5; 3])));
    }

    #[test]
    fn test_builtin_names_win() {
        let f = Fixture::new("polymesh");
        let n = declare_and_assign(&f.writer(), "matte", DeclareScope::Constant, &Value::Bool(true), false);
        assert_eq!(n, 0);
        assert!(!f.universe.is_param_set(f.node, "matte"));
        assert_eq!(f.diagnostics.count(DiagnosticKind::BuiltinCollision), 1);
    }

    #[test]
    fn test_redeclaration_changes_type() {
        let f = Fixture::new("polymesh");
        let w = f.writer();
        declare_and_assign(&w, "foo", DeclareScope::Constant, &Value::Float(1.0), false);
        declare_and_assign(&w, "foo", DeclareScope::Constant, &Value::from("bar"), false);
        assert_eq!(
            f.universe.user_param(f.node, "foo").map(|d| d.ty),
            Some(ParamType::String)
        );
    }

    #[test]
    fn test_face_varying_generates_reversed_indices() {
        let f = Fixture::new("polymesh");
        let desc = PrimvarDesc::new(
            Value::from(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]),
            Vec::new(),
            Interpolation::FaceVarying,
            Role::None,
        );
        set_face_varying_primvar(&f.writer(), "weight", &desc, Some(&[3, 4]), 7);
        let idxs = f.universe.param(f.node, "weightidxs").unwrap();
        assert_eq!(
            idxs.as_array().unwrap().data.as_uint(),
            Some(&[2, 1, 0, 6, 5, 4, 3][..])
        );
        assert_eq!(
            f.universe.user_param(f.node, "weight").map(|d| d.scope),
            Some(UserScope::Indexed)
        );
    }

    #[test]
    fn test_face_varying_count_mismatch_yields_empty_indices() {
        let f = Fixture::new("polymesh");
        let desc = PrimvarDesc::new(
            Value::from(vec![1.0f32, 2.0, 3.0]),
            Vec::new(),
            Interpolation::FaceVarying,
            Role::None,
        );
        set_face_varying_primvar(&f.writer(), "w", &desc, None, 4);
        let idxs = f.universe.param(f.node, "widxs").unwrap();
        assert_eq!(idxs.as_array().unwrap().num_elements, 0);
        assert_eq!(f.diagnostics.count(DiagnosticKind::MalformedSamples), 1);
    }

    #[test]
    fn test_constant_primvar_routes_builtins_and_ray_flags() {
        let f = Fixture::new("polymesh");
        let mut rays = ShapeRayFlags::default();
        let w = f.writer();
        let matte = PrimvarDesc::new(Value::Bool(true), vec![], Interpolation::Constant, Role::None);
        set_constant_primvar(&w, "render:matte", &matte, &mut rays);
        assert_eq!(f.universe.param(f.node, "matte"), Some(ParamValue::Bool(true)));

        let cam = PrimvarDesc::new(Value::Bool(false), vec![], Interpolation::Constant, Role::None);
        set_constant_primvar(&w, "render:visibility:camera", &cam, &mut rays);
        assert!(f.universe.user_param_names(f.node).is_empty());
        assert_eq!(rays.visibility.compose() & 1, 0);
    }

    #[test]
    fn test_instance_primvar_follows_instance_indices() {
        let f = Fixture::new("instancer");
        let desc = PrimvarDesc::new(
            Value::from(vec![10i32, 20, 30]),
            Vec::new(),
            Interpolation::Instance,
            Role::None,
        );
        set_instance_primvar(&f.writer(), "id", &desc, &[2, 0]);
        assert_eq!(
            f.universe.param(f.node, "instance_id"),
            Some(ArrayData::Int(vec![30, 10]).into())
        );
    }

    #[test]
    fn test_needs_update_clears_flag() {
        let mut desc = PrimvarDesc::new(Value::Float(1.0), vec![], Interpolation::Constant, Role::None);
        assert!(desc.needs_update());
        assert!(!desc.needs_update());
    }
}
