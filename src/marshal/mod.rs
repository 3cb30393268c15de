//! Marshalling of host values onto renderer node parameters.
//!
//! [`convert_value`] is the pure conversion table: declared parameter type on
//! one side, value tag on the other. Pairs with no rule convert to `None`,
//! which every writer treats as a silent no-op.

pub mod convert;
pub mod indices;
pub mod primvar;
pub mod ray_flags;

use crate::{
    catalog::{ParamDecl, ParamType},
    error::{DiagnosticKind, Diagnostics},
    universe::{ArrayData, NodeHandle, ParamArray, ParamValue, RenderUniverse},
    value::Value,
};

/// Semantic role the host attaches to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    None,
    Color,
    Point,
    Normal,
    Vector,
    TextureCoordinate,
}

/// Converts `value` to a scalar of type `ty`. Enum parameters accept a value
/// name from `enum_values` or an index into it.
pub fn convert_scalar(ty: ParamType, enum_values: &[String], value: &Value) -> Option<ParamValue> {
    match ty {
        ParamType::Bool => convert::to_bool(value).map(ParamValue::Bool),
        ParamType::Byte => convert::to_byte(value).map(ParamValue::Byte),
        ParamType::Int => convert::to_int(value).map(ParamValue::Int),
        ParamType::UInt => convert::to_uint(value).map(ParamValue::UInt),
        ParamType::Float => convert::to_float(value).map(ParamValue::Float),
        ParamType::Vector2 => convert::to_vec2(value).map(ParamValue::Vector2),
        ParamType::Vector => convert::to_vec3(value).map(ParamValue::Vector),
        ParamType::Rgb => convert::to_color3(value).map(ParamValue::Rgb),
        ParamType::Rgba => convert::to_color4(value).map(ParamValue::Rgba),
        ParamType::String => convert::to_text(value).map(ParamValue::String),
        ParamType::Enum => {
            let name = match convert::to_text(value) {
                Some(name) => name,
                None => {
                    let index = usize::try_from(convert::to_int(value)?).ok()?;
                    enum_values.get(index)?.clone()
                }
            };
            (enum_values.is_empty() || enum_values.contains(&name)).then_some(ParamValue::String(name))
        }
        ParamType::Matrix => convert::to_matrix(value).map(ParamValue::Matrix),
        // Node references need the universe to resolve names.
        ParamType::Node => None,
    }
}

/// Converts `value` for a declared catalog parameter.
pub fn convert_value(decl: &ParamDecl, value: &Value) -> Option<ParamValue> {
    if decl.array {
        convert::to_array(decl.ty, value).map(ParamValue::from)
    } else {
        convert_scalar(decl.ty, &decl.enum_values, value)
    }
}

/// Writes host values onto one renderer node, reporting skipped values to
/// the diagnostic sink on behalf of `owner`.
#[derive(Clone, Copy)]
pub struct NodeWriter<'a> {
    pub universe: &'a RenderUniverse,
    pub diagnostics: &'a Diagnostics,
    pub node: NodeHandle,
    pub owner: &'a str,
}

impl<'a> NodeWriter<'a> {
    pub fn new(
        universe: &'a RenderUniverse,
        diagnostics: &'a Diagnostics,
        node: NodeHandle,
        owner: &'a str,
    ) -> Self {
        Self {
            universe,
            diagnostics,
            node,
            owner,
        }
    }

    pub fn with_node(self, node: NodeHandle) -> Self {
        Self { node, ..self }
    }

    /// Declared type of `name` on this node, built-in or user-declared.
    pub fn declared(&self, name: &str) -> Option<(ParamType, bool, Vec<String>)> {
        let entry = self.universe.entry(self.node)?;
        if let Some(decl) = entry.param(name) {
            return Some((decl.ty, decl.array, decl.enum_values.clone()));
        }
        self.universe
            .user_param(self.node, name)
            .map(|d| (d.ty, d.scope.is_array(), Vec::new()))
    }

    pub fn has_builtin(&self, name: &str) -> bool {
        self.universe.entry(self.node).is_some_and(|e| e.has_param(name))
    }

    /// Converts and writes `value`. Returns whether the parameter changed.
    pub fn set(&self, name: &str, value: &Value) -> bool {
        let Some((ty, array, enum_values)) = self.declared(name) else {
            self.skip(DiagnosticKind::UnknownParameter, format!("no parameter `{name}`"));
            return false;
        };
        let converted = match (ty, array) {
            (ParamType::Node, false) => self.resolve_node(value).map(ParamValue::Node),
            (ParamType::Node, true) => self.resolve_nodes(value),
            (ty, true) => convert::to_array(ty, value).map(ParamValue::from),
            (ty, false) => convert_scalar(ty, &enum_values, value),
        };
        match converted {
            Some(v) => self.set_native(name, v),
            None => {
                self.skip(
                    DiagnosticKind::UnsupportedConversion,
                    format!("cannot convert {} to `{name}`", value.type_name()),
                );
                false
            }
        }
    }

    /// Writes time samples of an array parameter. Keys are kept only when
    /// every sample converts to the same element count; otherwise the first
    /// sample is written alone.
    pub fn set_samples(&self, name: &str, samples: &[Value]) -> bool {
        let Some(first) = samples.first() else {
            return false;
        };
        match self.declared(name) {
            Some((ty, true, _)) if samples.len() > 1 => {
                let keys: Option<Vec<ArrayData>> =
                    samples.iter().map(|s| convert::to_array(ty, s)).collect();
                match keys.and_then(ParamArray::from_keys) {
                    Some(arr) => self.set_native(name, ParamValue::Array(arr)),
                    None => self.set(name, first),
                }
            }
            _ => self.set(name, first),
        }
    }

    /// Writes an already converted value.
    pub fn set_native(&self, name: &str, value: ParamValue) -> bool {
        match self.universe.set_param(self.node, name, value) {
            Ok(()) => true,
            Err(err) => {
                self.skip(DiagnosticKind::UnsupportedConversion, err.to_string());
                false
            }
        }
    }

    pub fn reset(&self, name: &str) {
        if let Err(err) = self.universe.reset_param(self.node, name) {
            self.skip(err.kind(), err.to_string());
        }
    }

    pub fn skip(&self, kind: DiagnosticKind, message: impl Into<String>) {
        self.diagnostics.report(kind, self.owner, message);
    }

    fn resolve_node(&self, value: &Value) -> Option<Option<NodeHandle>> {
        let name = convert::to_text(value)?;
        if name.is_empty() {
            return Some(None);
        }
        self.universe.find_by_name(&name).map(Some)
    }

    fn resolve_nodes(&self, value: &Value) -> Option<ParamValue> {
        let ArrayData::String(names) = convert::to_array(ParamType::String, value)? else {
            return None;
        };
        let handles = names
            .iter()
            .map(|n| self.universe.find_by_name(n))
            .collect::<Option<Vec<_>>>()?;
        Some(ArrayData::Node(handles.into_iter().map(Some).collect()).into())
    }
}
