//! Materials: a translated shader graph and the terminals it publishes.

use super::{PrimSync, StepContext};
use crate::{
    context::{MaterialTerminals, RenderContext},
    error::TranslateError,
    shader_graph::ShaderGraphTranslator,
    sync::DirtyBits,
    universe::NodeHandle,
};

pub struct MaterialPrim {
    id: String,
    translator: ShaderGraphTranslator,
}

impl MaterialPrim {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            translator: ShaderGraphTranslator::new(id),
        }
    }

    pub fn translator(&self) -> &ShaderGraphTranslator {
        &self.translator
    }
}

impl PrimSync for MaterialPrim {
    fn initial_dirty_bits(&self) -> DirtyBits {
        DirtyBits::RESOURCE
    }

    /// Translates the network and publishes its terminals. On error the
    /// previously published graph stays bound.
    fn sync_material(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        if !step.is_dirty(DirtyBits::RESOURCE) {
            return Ok(());
        }
        let network = step.host.material_resource(step.id).unwrap_or_default();
        let graph = self
            .translator
            .translate(step.cx.universe(), step.cx.diagnostics(), &network)?;
        log::debug!(
            "material {}: {} nodes created, {} reused, {} destroyed",
            step.id,
            graph.created,
            graph.reused,
            graph.destroyed
        );
        let terminals = MaterialTerminals {
            surface: graph.terminal("surface"),
            displacement: graph.terminal("displacement"),
            volume: graph.terminal("volume"),
        };
        if step.cx.publish_material(step.id, terminals) {
            step.cx.dirty_material_users(step.id);
        }
        Ok(())
    }

    fn nodes(&self) -> Vec<NodeHandle> {
        self.translator.cache().handles()
    }

    fn release(&mut self, cx: &RenderContext) {
        self.translator.release(cx.universe());
        // Bound shapes fall back until the material comes back.
        if cx.withdraw_material(&self.id).is_some() {
            cx.dirty_material_users(&self.id);
        }
    }
}
