//! Point clouds.

use super::{
    PrimSync, StepContext,
    shape::{SHAPE_DIRTY_BITS, ShapeCore, half_widths},
};
use crate::{
    context::RenderContext,
    error::{DiagnosticKind, TranslateError},
    sync::DirtyBits,
    universe::{ArrayData, NodeHandle},
};

const CONSUMED: [&str; 4] = ["points", "widths", "velocities", "accelerations"];

/// Radius of points without widths.
const DEFAULT_RADIUS: f32 = 0.5;

pub struct PointsPrim {
    shape: ShapeCore,
}

impl PointsPrim {
    pub fn new(cx: &RenderContext, id: &str) -> Result<Self, TranslateError> {
        Ok(Self {
            shape: ShapeCore::new(cx, "points", id)?,
        })
    }

    pub fn node(&self) -> NodeHandle {
        self.shape.node
    }

    fn write_radius(&mut self, step: &StepContext<'_>) {
        let writer = step.writer(self.shape.node);
        let radius = match self.shape.primvars.get_mut("widths") {
            Some(desc) => {
                if !desc.needs_update() {
                    return;
                }
                half_widths(&desc.value).unwrap_or_else(|| {
                    writer.skip(
                        DiagnosticKind::UnsupportedConversion,
                        format!("cannot convert {} widths to radius", desc.value.type_name()),
                    );
                    vec![DEFAULT_RADIUS]
                })
            }
            None => vec![DEFAULT_RADIUS],
        };
        writer.set_native("radius", ArrayData::Float(radius).into());
    }
}

impl PrimSync for PointsPrim {
    fn initial_dirty_bits(&self) -> DirtyBits {
        SHAPE_DIRTY_BITS | DirtyBits::POINTS | DirtyBits::WIDTHS
    }

    fn sync_material(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        self.shape.bind_surface(step);
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
        self.shape.refresh_primvars(step, step.is_dirty(DirtyBits::MATERIAL_ID));
        if step.is_dirty(DirtyBits::POINTS | DirtyBits::PRIMVAR) {
            match ShapeCore::position_keys(step) {
                Some(keys) => self.shape.write_position_keys(step, "points", &keys),
                None => {
                    step.writer(self.shape.node).reset("points");
                    self.shape.clear_deform_range(step);
                }
            }
        }
        self.write_radius(step);
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
