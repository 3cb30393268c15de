//! Lights and their light-linking registration.

use super::{LightType, PrimSync, StepContext, shape::write_matrix};
use crate::{
    context::RenderContext,
    error::TranslateError,
    marshal::{NodeWriter, convert},
    sync::DirtyBits,
    universe::{ArrayData, NodeHandle},
    value::Token,
};

/// Attribute naming the collection of shapes a linked light illuminates.
const LIGHT_LINK: &str = "collection:lightLink";

impl LightType {
    pub fn entry_name(self) -> &'static str {
        match self {
            LightType::Distant => "distant_light",
            LightType::Sphere => "point_light",
            LightType::Rect => "quad_light",
            LightType::Disk => "disk_light",
        }
    }

    /// Type-specific attributes copied onto the node as is.
    fn shape_params(self) -> &'static [&'static str] {
        match self {
            LightType::Distant => &["angle"],
            LightType::Sphere | LightType::Disk => &["radius"],
            LightType::Rect => &[],
        }
    }
}

const COMMON_PARAMS: [&str; 4] = ["intensity", "exposure", "color", "normalize"];

/// Corners of a `width` by `height` quad centered in the XY plane.
fn quad_vertices(width: f32, height: f32) -> Vec<[f32; 3]> {
    let (w, h) = (width * 0.5, height * 0.5);
    vec![[-w, h, 0.0], [w, h, 0.0], [w, -h, 0.0], [-w, -h, 0.0]]
}

pub struct LightPrim {
    node: NodeHandle,
    ty: LightType,
}

impl LightPrim {
    pub fn new(cx: &RenderContext, id: &str, ty: LightType) -> Result<Self, TranslateError> {
        let node = cx.universe().create_node(ty.entry_name(), id)?;
        Ok(Self { node, ty })
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }

    fn copy_attribute(step: &StepContext<'_>, writer: &NodeWriter<'_>, name: &str) {
        let value = step.host.attribute(step.id, name);
        if value.is_empty() {
            writer.reset(name);
        } else {
            writer.set(name, &value);
        }
    }
}

impl PrimSync for LightPrim {
    fn initial_dirty_bits(&self) -> DirtyBits {
        DirtyBits::TRANSFORM | DirtyBits::VISIBILITY | DirtyBits::PARAMS
    }

    fn sync_visibility(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        step.cx
            .universe()
            .set_disabled(self.node, !step.host.visible(step.id))?;
        Ok(())
    }

    fn sync_primvars(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        if !step.is_dirty(DirtyBits::PARAMS) {
            return Ok(());
        }
        let writer = step.writer(self.node);
        for name in COMMON_PARAMS.iter().chain(self.ty.shape_params()) {
            Self::copy_attribute(step, &writer, name);
        }
        if self.ty == LightType::Rect {
            let dimension =
                |name: &str| convert::to_float(&step.host.attribute(step.id, name)).unwrap_or(1.0);
            let vertices = quad_vertices(dimension("width"), dimension("height"));
            writer.set_native("vertices", ArrayData::Vector(vertices).into());
        }

        let collection = convert::to_text(&step.host.attribute(step.id, LIGHT_LINK))
            .filter(|c| !c.is_empty())
            .map(Token::from);
        step.cx.register_light(step.id, self.node, collection);
        Ok(())
    }

    fn sync_transform(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        write_matrix(step, self.node);
        Ok(())
    }

    fn nodes(&self) -> Vec<NodeHandle> {
        vec![self.node]
    }

    fn release(&mut self, cx: &RenderContext) {
        cx.universe().destroy_node(self.node);
    }
}
