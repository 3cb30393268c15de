//! Volumes read from field files.

use super::{
    PrimSync, StepContext,
    shape::{SHAPE_DIRTY_BITS, ShapeCore},
};
use crate::{
    context::RenderContext,
    error::{DiagnosticKind, TranslateError},
    marshal::convert,
    scene::VolumeField,
    sync::DirtyBits,
    universe::{ArrayData, NodeHandle, ParamValue},
};

/// Field file the renderer loads; every field of a volume is expected to
/// live in the same file.
fn field_file(fields: &[VolumeField]) -> Option<&str> {
    fields
        .first()?
        .file
        .as_ref()
        .filter(|f| !f.resolved.is_empty())
        .map(|f| f.resolved.as_str())
}

pub struct VolumePrim {
    shape: ShapeCore,
    use_fallback: bool,
}

impl VolumePrim {
    pub fn new(cx: &RenderContext, id: &str) -> Result<Self, TranslateError> {
        Ok(Self {
            shape: ShapeCore::new(cx, "volume", id)?,
            use_fallback: false,
        })
    }

    pub fn node(&self) -> NodeHandle {
        self.shape.node
    }

    fn bind_shader(&self, step: &StepContext<'_>) {
        let material = step.host.material_id(step.id);
        step.cx.track_material_use(step.id, &material.iter().cloned().collect::<Vec<_>>());
        let shader = if self.use_fallback {
            None
        } else {
            ShapeCore::resolve_material(step, material.as_deref()).volume
        };
        self.shape
            .write_shaders(step, &[shader.unwrap_or(step.cx.fallback_volume())]);
    }
}

impl PrimSync for VolumePrim {
    fn initial_dirty_bits(&self) -> DirtyBits {
        SHAPE_DIRTY_BITS | DirtyBits::VOLUME_FIELD | DirtyBits::PARAMS
    }

    fn sync_material(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        self.bind_shader(step);
        Ok(())
    }

    fn sync_topology(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        if !step.is_dirty(DirtyBits::VOLUME_FIELD) {
            return Ok(());
        }
        let fields = step.host.volume_fields(step.id);
        let writer = step.writer(self.shape.node);
        let grids = fields.iter().map(|f| f.name.to_string()).collect();
        writer.set_native("grids", ArrayData::String(grids).into());

        let use_fallback = match field_file(&fields) {
            Some(file) => {
                writer.set_native("filename", ParamValue::String(file.to_string()));
                false
            }
            None => {
                writer.reset("filename");
                if !fields.is_empty() {
                    step.report(
                        DiagnosticKind::MissingDependency,
                        "volume field file could not be resolved, using the fallback volume shader",
                    );
                }
                true
            }
        };
        if use_fallback != self.use_fallback {
            self.use_fallback = use_fallback;
            self.bind_shader(step);
        }
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
        if step.is_dirty(DirtyBits::PARAMS) {
            let writer = step.writer(self.shape.node);
            match convert::to_float(&step.host.attribute(step.id, "render:step_size")) {
                Some(step_size) => {
                    writer.set_native("step_size", ParamValue::Float(step_size));
                }
                None => writer.reset("step_size"),
            }
        }
        self.shape.refresh_primvars(step, step.is_dirty(DirtyBits::MATERIAL_ID));
        self.shape.apply_primvars(step, &[], None);
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
    use crate::value::{AssetPath, Token};

    #[test]
    fn test_field_file_needs_a_resolved_path() {
        let field = |file: Option<AssetPath>| VolumeField {
            name: Token::new("density"),
            file,
        };
        assert_eq!(
            field_file(&[field(Some(AssetPath::with_resolved("smoke.vdb", "/cache/smoke.vdb")))]),
            Some("/cache/smoke.vdb")
        );
        assert_eq!(field_file(&[field(Some(AssetPath::new("smoke.vdb")))]), None);
        assert_eq!(field_file(&[field(None)]), None);
        assert_eq!(field_file(&[]), None);
    }
}
