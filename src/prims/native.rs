//! Host prims whose type names a renderer node entry directly.
//!
//! The node is created verbatim and every `render:<param>` attribute the
//! host authors is written to `<param>`.

use super::{PrimSync, StepContext, shape::write_matrix};
use crate::{
    context::RenderContext,
    error::TranslateError,
    marshal::ray_flags::RENDER_NAMESPACE,
    sync::DirtyBits,
    universe::{NodeHandle, ParamValue},
};

pub struct NativePrim {
    node: NodeHandle,
    /// Parameters of the entry, sorted, without `name`.
    params: Vec<String>,
}

impl NativePrim {
    pub fn new(cx: &RenderContext, id: &str, entry: &str) -> Result<Self, TranslateError> {
        let node = cx.universe().create_node(entry, id)?;
        let mut params: Vec<String> = cx
            .universe()
            .entry(node)
            .map(|e| e.params.keys().filter(|p| *p != "name").cloned().collect())
            .unwrap_or_default();
        params.sort();
        Ok(Self { node, params })
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }

    fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }
}

impl PrimSync for NativePrim {
    fn initial_dirty_bits(&self) -> DirtyBits {
        DirtyBits::TRANSFORM | DirtyBits::VISIBILITY | DirtyBits::PARAMS | DirtyBits::PRIMVAR
    }

    fn sync_visibility(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        if self.has_param("visibility") {
            let visibility = if step.host.visible(step.id) { u8::MAX } else { 0 };
            step.writer(self.node)
                .set_native("visibility", ParamValue::Byte(visibility));
        }
        Ok(())
    }

    fn sync_primvars(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        if !step.is_dirty(DirtyBits::PARAMS | DirtyBits::PRIMVAR) {
            return Ok(());
        }
        let writer = step.writer(self.node);
        for param in &self.params {
            let value = step.host.attribute(step.id, &format!("{RENDER_NAMESPACE}{param}"));
            if !value.is_empty() {
                writer.set(param, &value);
            }
        }
        Ok(())
    }

    fn sync_transform(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        if self.has_param("matrix") {
            write_matrix(step, self.node);
        }
        Ok(())
    }

    fn nodes(&self) -> Vec<NodeHandle> {
        vec![self.node]
    }

    fn release(&mut self, cx: &RenderContext) {
        cx.universe().destroy_node(self.node);
    }
}
