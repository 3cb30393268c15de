//! State and steps shared by every geometric primitive.

use glam::{DMat4, Mat4};

use super::StepContext;
use crate::{
    catalog::ParamType,
    context::{MaterialTerminals, RenderContext},
    error::{DiagnosticKind, TranslateError},
    instancing::{
        PositionKeys, SampledArray,
        composer::{InstancerChain, vectors},
        extrapolate_positions,
    },
    marshal::{
        NodeWriter, convert,
        primvar::{
            Interpolation, PrimvarMap, insert_primvar, set_constant_primvar, set_face_varying_primvar,
            set_uniform_primvar, set_vertex_primvar,
        },
        ray_flags::{RayType, ShapeRayFlags},
    },
    sync::DirtyBits,
    universe::{ArrayData, NodeHandle, ParamArray, ParamValue},
    value::Value,
};

/// Every dirty bit a geometric primitive reacts to.
pub const SHAPE_DIRTY_BITS: DirtyBits = DirtyBits::TRANSFORM
    .union(DirtyBits::VISIBILITY)
    .union(DirtyBits::DOUBLE_SIDED)
    .union(DirtyBits::MATERIAL_ID)
    .union(DirtyBits::PRIMVAR)
    .union(DirtyBits::PRIM_ID)
    .union(DirtyBits::RENDER_TAG)
    .union(DirtyBits::CATEGORIES)
    .union(DirtyBits::INSTANCER)
    .union(DirtyBits::INSTANCE_INDEX);

/// Face layout face-varying primvars are expanded against.
#[derive(Debug, Clone, Copy)]
pub struct FaceLayout<'a> {
    pub vertex_counts: &'a [i32],
    pub vertex_count_sum: usize,
    pub left_handed: bool,
}

/// Value of the sample closest to time zero.
pub fn value_at_zero(samples: &SampledArray<Value>) -> Value {
    samples
        .closest_index(0.0)
        .and_then(|i| samples.values.get(i).cloned())
        .unwrap_or_default()
}

/// Renderer radii are half the host widths.
pub fn half_widths(value: &Value) -> Option<Vec<f32>> {
    match convert::to_array(ParamType::Float, value)? {
        ArrayData::Float(widths) => Some(widths.into_iter().map(|w| w * 0.5).collect()),
        _ => None,
    }
}

/// Writes the sampled host transform as matrix keys, identity when the
/// host has none. Returns the time range of the keys when there are several.
pub fn write_matrix(step: &StepContext<'_>, node: NodeHandle) -> Option<(f32, f32)> {
    let mut samples = step.host.transform(step.id);
    samples.truncate(step.cx.config().max_primvar_samples);
    let matrices: Vec<Mat4> = if samples.is_empty() {
        vec![Mat4::IDENTITY]
    } else {
        samples.values.iter().map(DMat4::as_mat4).collect()
    };
    let keys = matrices.into_iter().map(|m| ArrayData::Matrix(vec![m])).collect();
    if let Some(array) = ParamArray::from_keys(keys) {
        step.writer(node).set_native("matrix", ParamValue::Array(array));
    }
    if samples.len() > 1 { samples.time_range() } else { None }
}

fn merge_ranges(a: Option<(f32, f32)>, b: Option<(f32, f32)>) -> Option<(f32, f32)> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a.0.min(b.0), a.1.max(b.1))),
        (a, b) => a.or(b),
    }
}

/// The renderer node of a shape and what it has been told so far.
pub struct ShapeCore {
    pub node: NodeHandle,
    pub rays: ShapeRayFlags,
    pub primvars: PrimvarMap,
    pub instancers: InstancerChain,
    instancer: Option<String>,
    xform_range: Option<(f32, f32)>,
    deform_range: Option<(f32, f32)>,
    extras_synced: bool,
    resync: bool,
}

impl ShapeCore {
    pub fn new(cx: &RenderContext, entry: &str, id: &str) -> Result<Self, TranslateError> {
        let node = cx.universe().create_node(entry, id)?;
        Ok(Self {
            node,
            rays: ShapeRayFlags::default(),
            primvars: PrimvarMap::new(),
            instancers: InstancerChain::default(),
            instancer: None,
            xform_range: None,
            deform_range: None,
            extras_synced: false,
            resync: false,
        })
    }

    pub fn nodes(&self) -> Vec<NodeHandle> {
        let mut nodes = vec![self.node];
        nodes.extend_from_slice(self.instancers.nodes());
        nodes
    }

    pub fn release(&mut self, cx: &RenderContext) {
        self.instancers.release(cx);
        cx.universe().destroy_node(self.node);
    }

    pub fn take_resync_request(&mut self) -> bool {
        std::mem::take(&mut self.resync)
    }

    /// Published terminals of `material`, tracked as used by this shape.
    /// An unpublished material is reported and binds nothing, so the
    /// caller falls back.
    pub fn resolve_material(step: &StepContext<'_>, material: Option<&str>) -> MaterialTerminals {
        let Some(material) = material else {
            return MaterialTerminals::default();
        };
        match step.cx.material_terminals(material) {
            Some(terminals) => terminals,
            None => {
                step.report(
                    DiagnosticKind::MissingDependency,
                    format!("material `{material}` is not available, using the fallback shader"),
                );
                MaterialTerminals::default()
            }
        }
    }

    pub fn write_shaders(&self, step: &StepContext<'_>, shaders: &[NodeHandle]) {
        step.writer(self.node)
            .set_native("shader", ArrayData::Node(shaders.iter().copied().map(Some).collect()).into());
    }

    /// Binds the surface of the host material, or the fallback surface.
    pub fn bind_surface(&self, step: &StepContext<'_>) -> MaterialTerminals {
        let material = step.host.material_id(step.id);
        step.cx.track_material_use(step.id, &material.iter().cloned().collect::<Vec<_>>());
        let terminals = Self::resolve_material(step, material.as_deref());
        self.write_shaders(step, &[terminals.surface.unwrap_or(step.cx.fallback_surface())]);
        terminals
    }

    fn is_instanced(step: &StepContext<'_>) -> bool {
        step.host.instancer_id(step.id).is_some()
    }

    pub fn sync_visibility(&mut self, step: &StepContext<'_>) {
        self.rays.visibility.set_host_enabled(step.host.visible(step.id));
        let sidedness = if step.host.double_sided(step.id) {
            RayType::all()
        } else {
            RayType::SUBSURFACE
        };
        self.rays.sidedness.set_host(sidedness.bits());
        self.write_ray_flags(step);
    }

    /// Writes the composed ray masks. Instanced prototypes are hidden; their
    /// instancer carries the visibility.
    pub fn write_ray_flags(&self, step: &StepContext<'_>) {
        let writer = step.writer(self.node);
        let visibility = if Self::is_instanced(step) {
            0
        } else {
            self.rays.visibility.compose()
        };
        writer.set_native("visibility", ParamValue::Byte(visibility));
        for (name, flags) in [("sidedness", &self.rays.sidedness), ("autobump_visibility", &self.rays.autobump)] {
            if writer.has_builtin(name) {
                writer.set_native(name, ParamValue::Byte(flags.compose()));
            }
        }
    }

    /// Re-reads the host primvars. Unchanged ones keep their cached state
    /// unless `force` is set; vanished ones are undeclared.
    pub fn refresh_primvars(&mut self, step: &StepContext<'_>, force: bool) {
        let descriptors = step.host.primvar_descriptors(step.id);
        let universe = step.cx.universe();
        let node = self.node;
        self.primvars.retain(|name, _| {
            let keep = descriptors.iter().any(|d| d.name == *name);
            if !keep {
                for name in [name.to_string(), format!("{name}idxs")] {
                    if let Err(err) = universe.undeclare(node, &name) {
                        step.cx.diagnostics().report(err.kind(), step.id, err.to_string());
                    }
                }
            }
            keep
        });
        for d in descriptors {
            let (value, indices) = if d.indexed {
                step.host.indexed_primvar(step.id, &d.name)
            } else {
                (value_at_zero(&step.host.primvar(step.id, &d.name)), Vec::new())
            };
            let unchanged = self.primvars.get(&d.name).is_some_and(|p| {
                p.value == value && p.indices == indices && p.interpolation == d.interpolation && p.role == d.role
            });
            if unchanged && !force {
                continue;
            }
            insert_primvar(&mut self.primvars, d.name, value, indices, d.interpolation, d.role);
        }
    }

    /// Writes every primvar that changed, except the ones `consumed` by the
    /// primitive itself, then the ray masks they may override.
    pub fn apply_primvars(
        &mut self,
        step: &StepContext<'_>,
        consumed: &[&str],
        faces: Option<FaceLayout<'_>>,
    ) {
        let writer = step.writer(self.node);
        self.rays.clear_primvars();
        for (name, desc) in self.primvars.iter_mut() {
            if consumed.contains(&name.as_str()) {
                continue;
            }
            // Ray overrides were just cleared and always come back.
            if desc.interpolation == Interpolation::Constant && self.rays.apply_primvar(name, &desc.value) {
                continue;
            }
            if !desc.needs_update() {
                continue;
            }
            match desc.interpolation {
                Interpolation::Constant => set_constant_primvar(&writer, name, desc, &mut self.rays),
                Interpolation::Uniform => set_uniform_primvar(&writer, name, desc),
                Interpolation::Varying | Interpolation::Vertex => set_vertex_primvar(&writer, name, desc),
                Interpolation::FaceVarying => match faces {
                    Some(f) => set_face_varying_primvar(
                        &writer,
                        name,
                        desc,
                        f.left_handed.then_some(f.vertex_counts),
                        f.vertex_count_sum,
                    ),
                    None => writer.skip(
                        DiagnosticKind::UnsupportedConversion,
                        format!("face-varying primvar `{name}` on a primitive without faces"),
                    ),
                },
                // Written on the instancer node.
                Interpolation::Instance => {}
            }
        }
        self.write_ray_flags(step);
    }

    pub fn write_prim_id(&self, step: &StepContext<'_>) {
        let id = step.host.attribute(step.id, "primId");
        if let Some(id) = convert::to_uint(&id) {
            step.writer(self.node).set_native("id", ParamValue::UInt(id));
        }
    }

    /// Position keys of the `points` primvar. `None` when the host has no
    /// positions.
    pub fn position_keys(step: &StepContext<'_>) -> Option<PositionKeys> {
        let cx = step.cx;
        let mut samples = step.host.primvar(step.id, "points");
        samples.truncate(cx.config().max_primvar_samples);
        let positions = samples.filter_map(vectors);
        if positions.is_empty() {
            return None;
        }
        let at_zero = |name: &str| vectors(&value_at_zero(&step.host.primvar(step.id, name))).unwrap_or_default();
        let velocities = at_zero("velocities");
        let accelerations = at_zero("accelerations");
        let key_count = convert::to_int(&step.host.attribute(step.id, "deformKeys"))
            .and_then(|k| usize::try_from(k).ok())
            .filter(|&k| k > 0)
            .unwrap_or(cx.config().default_deform_keys);
        let keys = extrapolate_positions(&positions, &velocities, &accelerations, &cx.timing(), key_count);
        if let Some(reason) = &keys.degraded {
            step.report(DiagnosticKind::MalformedSamples, reason.clone());
        }
        Some(keys)
    }

    /// Writes position keys to `param` and folds their time range into the
    /// motion range.
    pub fn write_position_keys(&mut self, step: &StepContext<'_>, param: &str, keys: &PositionKeys) {
        let writer = step.writer(self.node);
        let data = keys.keys.iter().map(|k| ArrayData::Vector(k.clone())).collect();
        if let Some(array) = ParamArray::from_keys(data) {
            writer.set_native(param, ParamValue::Array(array));
        }
        self.deform_range = match keys.times.as_slice() {
            [first, .., last] if keys.key_count() > 1 => Some((*first, *last)),
            _ => None,
        };
        self.write_motion_range(&writer);
    }

    pub fn clear_deform_range(&mut self, step: &StepContext<'_>) {
        if self.deform_range.take().is_some() {
            self.write_motion_range(&step.writer(self.node));
        }
    }

    fn write_motion_range(&self, writer: &NodeWriter<'_>) {
        match merge_ranges(self.xform_range, self.deform_range) {
            Some((start, end)) => {
                writer.set_native("motion_start", ParamValue::Float(start));
                writer.set_native("motion_end", ParamValue::Float(end));
            }
            None => {
                writer.reset("motion_start");
                writer.reset("motion_end");
            }
        }
    }

    pub fn sync_transform(&mut self, step: &StepContext<'_>) {
        self.xform_range = write_matrix(step, self.node);
        self.write_motion_range(&step.writer(self.node));
    }

    /// Instancing, light linking and render tags.
    pub fn sync_extras(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        let cx = step.cx;
        let mut nodes_changed = false;
        if step.is_dirty(DirtyBits::INSTANCER | DirtyBits::INSTANCE_INDEX | DirtyBits::VISIBILITY) {
            let instancer = step.host.instancer_id(step.id);
            if instancer != self.instancer {
                // The earlier steps of this pass saw the old association.
                self.resync = self.extras_synced;
                self.instancer = instancer.clone();
            }
            let before = self.instancers.nodes().to_vec();
            match &instancer {
                Some(instancer) => self.instancers.rebuild(
                    cx,
                    step.host,
                    instancer,
                    step.id,
                    self.node,
                    self.rays.visibility.compose(),
                )?,
                None => self.instancers.release(cx),
            }
            nodes_changed = before != self.instancers.nodes();
        }

        if step.is_dirty(DirtyBits::CATEGORIES) {
            let writer = step.writer(self.node);
            match cx.light_group_for(step.id, &step.host.categories(step.id)) {
                Some(lights) => {
                    writer.set_native("use_light_group", ParamValue::Bool(true));
                    writer.set_native("light_group", ArrayData::Node(lights.into_iter().map(Some).collect()).into());
                }
                None => {
                    writer.reset("use_light_group");
                    writer.reset("light_group");
                }
            }
        }

        if nodes_changed || step.is_dirty(DirtyBits::RENDER_TAG) {
            cx.track_render_tag(step.id, step.host.render_tag(step.id), self.nodes());
        }
        self.extras_synced = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_ranges_merge_to_the_widest() {
        assert_eq!(merge_ranges(Some((0.0, 0.5)), Some((-0.25, 0.25))), Some((-0.25, 0.5)));
        assert_eq!(merge_ranges(None, Some((0.0, 1.0))), Some((0.0, 1.0)));
        assert_eq!(merge_ranges(None, None), None);
    }

    #[test]
    fn test_half_widths_accept_scalars_and_arrays() {
        assert_eq!(half_widths(&Value::Float(0.5)), Some(vec![0.25]));
        assert_eq!(half_widths(&Value::from(vec![2.0f64, 4.0])), Some(vec![1.0, 2.0]));
        assert_eq!(half_widths(&Value::from("wide")), None);
    }

    #[test]
    fn test_value_at_zero_picks_the_closest_sample() {
        let samples = SampledArray::from_pairs([(-1.0, Value::Int(1)), (0.25, Value::Int(2))]);
        assert_eq!(value_at_zero(&samples), Value::Int(2));
        assert_eq!(value_at_zero(&SampledArray::new()), Value::Empty);
    }
}
