//! Basis curves.

use super::{
    PrimSync, StepContext,
    shape::{SHAPE_DIRTY_BITS, ShapeCore, half_widths},
};
use crate::{
    catalog::ParamType,
    context::RenderContext,
    error::{DiagnosticKind, TranslateError},
    instancing::composer::vectors,
    marshal::{convert, primvar::Interpolation},
    scene::CurveTopology,
    sync::DirtyBits,
    universe::{ArrayData, NodeHandle, ParamValue},
    value::Value,
};

const UV_NAMES: [&str; 2] = ["st", "uv"];

const CONSUMED: [&str; 8] = [
    "points",
    "widths",
    "normals",
    "velocities",
    "accelerations",
    "st",
    "uv",
    // Changing the basis per prim would need every vertex array remapped.
    "basis",
];

fn basis(topology: &CurveTopology) -> &'static str {
    if topology.curve_type == "linear" {
        return "linear";
    }
    match topology.basis.as_str() {
        "bezier" => "bezier",
        "bspline" => "b-spline",
        "catmullRom" => "catmull-rom",
        _ => "linear",
    }
}

/// Two-component texture coordinates; a third component is dropped.
fn uv_array(value: &Value) -> Option<Vec<[f32; 2]>> {
    match convert::to_array(ParamType::Vector2, value) {
        Some(ArrayData::Vector2(uvs)) => Some(uvs),
        _ => vectors(value).map(|v| v.into_iter().map(|[x, y, _]| [x, y]).collect()),
    }
}

pub struct CurvesPrim {
    shape: ShapeCore,
    linear: bool,
}

impl CurvesPrim {
    pub fn new(cx: &RenderContext, id: &str) -> Result<Self, TranslateError> {
        Ok(Self {
            shape: ShapeCore::new(cx, "curves", id)?,
            linear: false,
        })
    }

    pub fn node(&self) -> NodeHandle {
        self.shape.node
    }

    fn write_point_count_dependents(&mut self, step: &StepContext<'_>) {
        let writer = step.writer(self.shape.node);
        let point_count = step
            .cx
            .universe()
            .param(self.shape.node, "points")
            .and_then(|p| p.as_array().map(|a| a.num_elements))
            .unwrap_or(0);

        match self.shape.primvars.get_mut("widths") {
            Some(desc) => {
                if desc.needs_update() {
                    match half_widths(&desc.value) {
                        Some(radius) => {
                            writer.set_native("radius", ArrayData::Float(radius).into());
                        }
                        None => writer.skip(
                            DiagnosticKind::UnsupportedConversion,
                            format!("cannot convert {} widths to radius", desc.value.type_name()),
                        ),
                    }
                }
            }
            None => writer.reset("radius"),
        }

        match self.shape.primvars.get_mut("normals") {
            Some(desc) => {
                if desc.needs_update() {
                    match vectors(&desc.value).filter(|o| o.len() == point_count) {
                        Some(_) if self.linear => writer.skip(
                            DiagnosticKind::UnsupportedConversion,
                            "orientations are not supported on linear curves",
                        ),
                        Some(orientations) => {
                            writer.set_native("orientations", ArrayData::Vector(orientations).into());
                            writer.set_native("mode", ParamValue::String("oriented".into()));
                        }
                        None => {
                            writer.skip(
                                DiagnosticKind::MalformedSamples,
                                format!("curve normals do not match the {point_count} points"),
                            );
                            writer.reset("orientations");
                            writer.reset("mode");
                        }
                    }
                }
            }
            None => {
                writer.reset("orientations");
                writer.reset("mode");
            }
        }

        let uv_name = UV_NAMES.into_iter().find(|name| self.shape.primvars.contains_key(*name));
        match uv_name.and_then(|name| self.shape.primvars.get_mut(name)) {
            Some(desc) => {
                if !desc.needs_update() {
                    return;
                }
                if desc.interpolation == Interpolation::Constant {
                    writer.skip(DiagnosticKind::UnsupportedConversion, "constant curve uvs");
                } else if let Some(uvs) = uv_array(&desc.value) {
                    writer.set_native("uvs", ArrayData::Vector2(uvs).into());
                }
            }
            None => writer.reset("uvs"),
        }
    }
}

impl PrimSync for CurvesPrim {
    fn initial_dirty_bits(&self) -> DirtyBits {
        SHAPE_DIRTY_BITS | DirtyBits::TOPOLOGY | DirtyBits::POINTS | DirtyBits::NORMALS | DirtyBits::WIDTHS
    }

    fn sync_material(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        self.shape.bind_surface(step);
        Ok(())
    }

    fn sync_topology(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        let Some(topology) = step.host.curve_topology(step.id) else {
            return Ok(());
        };
        let writer = step.writer(self.shape.node);
        let basis = basis(&topology);
        self.linear = basis == "linear";
        writer.set_native("basis", ParamValue::String(basis.into()));
        let counts = topology.vertex_counts.iter().map(|&c| u32::try_from(c).unwrap_or(0)).collect();
        writer.set_native("num_points", ArrayData::UInt(counts).into());
        Ok(())
    }

    fn sync_visibility(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        self.shape.sync_visibility(step);
        Ok(())
    }

    fn sync_primvars(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        if step.is_dirty(DirtyBits::PRIM_ID) {
            self.shape.write_prim_id(step);
        }
        // Point counts may have changed with the topology.
        let force = step.is_dirty(DirtyBits::TOPOLOGY | DirtyBits::MATERIAL_ID);
        self.shape.refresh_primvars(step, force);
        if step.is_dirty(DirtyBits::POINTS | DirtyBits::PRIMVAR | DirtyBits::TOPOLOGY) {
            match ShapeCore::position_keys(step) {
                Some(keys) => self.shape.write_position_keys(step, "points", &keys),
                None => {
                    step.writer(self.shape.node).reset("points");
                    self.shape.clear_deform_range(step);
                }
            }
        }
        self.write_point_count_dependents(step);
        self.shape.apply_primvars(step, &CONSUMED, None);
        Ok(())
    }

    fn sync_transform(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        self.shape.sync_transform(step);
        Ok(())
    }

    fn sync_extras(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        self.shape.sync_extras(step)
    }

    fn nodes(&self) -> Vec<NodeHandle> {
        self.shape.nodes()
    }

    fn release(&mut self, cx: &RenderContext) {
        self.shape.release(cx);
    }

    fn take_resync_request(&mut self) -> bool {
        self.shape.take_resync_request()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Token;

    fn topology(curve_type: &str, basis: &str) -> CurveTopology {
        CurveTopology {
            curve_type: Token::new(curve_type),
            basis: Token::new(basis),
            vertex_counts: vec![4],
        }
    }

    #[test]
    fn test_basis_names() {
        assert_eq!(basis(&topology("cubic", "bspline")), "b-spline");
        assert_eq!(basis(&topology("cubic", "catmullRom")), "catmull-rom");
        assert_eq!(basis(&topology("linear", "bezier")), "linear");
        assert_eq!(basis(&topology("cubic", "hermite")), "linear");
    }

    #[test]
    fn test_three_component_uvs_drop_z() {
        let value = Value::from(vec![[0.5f32, 0.25, 9.0]]);
        assert_eq!(uv_array(&value), Some(vec![[0.5, 0.25]]));
    }
}
