//! Per-instance transforms of point instancers and the renderer instancer
//! nodes built from them.
//!
//! Matrices use glam's column-vector convention: an instance's matrix is
//! `instancer * translate * rotate * scale * instance_transform`, so the
//! explicit per-instance matrix applies first and the instancer last.

use std::collections::HashSet;

use glam::{DMat4, DQuat, DVec3};

use super::sampled::{SampledArray, accumulate_sample_times, evenly_spaced};
use crate::{
    catalog::ParamType,
    context::RenderContext,
    error::{DiagnosticKind, TranslateError},
    marshal::{
        NodeWriter, convert,
        primvar::{Interpolation, PrimvarDesc, declare_user_param, set_instance_primvar},
        ray_flags::{RENDER_NAMESPACE, RayFlags, RayType},
    },
    scene::SceneDelegate,
    sync::MotionTiming,
    universe::{ArrayData, NodeHandle, ParamArray, ParamValue, UserDeclaration, UserScope},
    value::{Array, Value},
};

/// Primvars consumed by the composer rather than forwarded as instance data.
const TRANSFORM_PRIMVARS: [&str; 6] = [
    "instanceTransforms",
    "instanceTranslations",
    "instanceRotations",
    "instanceScales",
    "velocities",
    "accelerations",
];

/// Per-sample instance matrices for one prototype of one instancer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposedInstances {
    pub times: Vec<f32>,
    /// `matrices[sample][instance]`.
    pub matrices: Vec<Vec<DMat4>>,
    /// Instancer array index of every instance.
    pub instance_indices: Vec<i32>,
}

impl ComposedInstances {
    pub fn instance_count(&self) -> usize {
        self.instance_indices.len()
    }

    pub fn sample_count(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instance_indices.is_empty()
    }
}

pub(crate) fn vectors(value: &Value) -> Option<Vec<[f32; 3]>> {
    match convert::to_array(ParamType::Vector, value)? {
        ArrayData::Vector(v) => Some(v),
        _ => None,
    }
}

fn rotations(value: &Value) -> Option<Vec<DQuat>> {
    match value.as_array()? {
        Array::Quatd(q) => Some(q.clone()),
        Array::Quatf(q) => Some(q.iter().map(|q| q.as_dquat()).collect()),
        Array::Quath(q) => Some(
            q.iter()
                .map(|q| DQuat::from_xyzw(q[0].to_f64(), q[1].to_f64(), q[2].to_f64(), q[3].to_f64()))
                .collect(),
        ),
        _ => None,
    }
}

fn matrices(value: &Value) -> Option<Vec<DMat4>> {
    match value.as_array()? {
        Array::Matrix4d(m) => Some(m.clone()),
        Array::Matrix4f(m) => Some(m.iter().map(|m| m.as_dmat4()).collect()),
        _ => None,
    }
}

/// Value of the sample closest to time zero.
fn at_time_zero(samples: &SampledArray<Value>) -> Option<&Value> {
    samples.closest_index(0.0).and_then(|i| samples.values.get(i))
}

/// Sample times shared by every transform source: the source with the most
/// samples wins, then `deform_keys` may collapse or resample them.
fn sample_times(sources: &[&[f32]], deform_keys: Option<i32>, velocity_blur: bool, timing: &MotionTiming) -> Vec<f32> {
    let mut times = Vec::new();
    for source in sources {
        accumulate_sample_times(&mut times, source);
    }
    if times.is_empty() {
        times.push(0.0);
    }
    // Velocities carry motion on their own when the host sampled nothing.
    if velocity_blur && times.len() < 2 && !timing.is_instantaneous() {
        times = timing.shutter.to_vec();
    }
    match deform_keys {
        Some(keys) if keys < 2 && times.len() <= 2 => vec![0.0],
        Some(keys) if keys > 1 => {
            let min = times.iter().copied().fold(f32::INFINITY, f32::min);
            let max = times.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            evenly_spaced(min, max, keys as usize)
        }
        _ => times,
    }
}

fn index(i: i32, len: usize) -> Option<usize> {
    usize::try_from(i).ok().filter(|&i| i < len)
}

/// Composes instance matrices of `prototype` under `instancer`.
///
/// With velocities or accelerations sized to the instance count, per-instance
/// translations are read at time zero and offset by `v·dt + ½·a·dt²`.
pub fn compose_instances(
    host: &dyn SceneDelegate,
    instancer: &str,
    prototype: &str,
    timing: &MotionTiming,
    max_samples: usize,
) -> ComposedInstances {
    let instance_indices = host.instance_indices(instancer, prototype);
    if instance_indices.is_empty() {
        return ComposedInstances::default();
    }
    let sampled = |name: &str| {
        let mut s = host.primvar(instancer, name);
        s.truncate(max_samples);
        s
    };

    let mut instancer_xform = host.transform(instancer);
    instancer_xform.truncate(max_samples);
    let transforms = sampled("instanceTransforms").filter_map(matrices);
    let translates = sampled("instanceTranslations").filter_map(vectors);
    let rotates = sampled("instanceRotations").filter_map(rotations);
    let scales = sampled("instanceScales").filter_map(vectors);
    let velocities = at_time_zero(&sampled("velocities")).and_then(vectors).unwrap_or_default();
    let accelerations = at_time_zero(&sampled("accelerations"))
        .and_then(vectors)
        .unwrap_or_default();
    let velocity_blur = !velocities.is_empty() || !accelerations.is_empty();

    // Negative key counts mean unset.
    let deform_keys = convert::to_int(&host.attribute(instancer, "deformKeys")).filter(|k| *k >= 0);
    let times = sample_times(
        &[
            instancer_xform.times.as_slice(),
            transforms.times.as_slice(),
            translates.times.as_slice(),
            rotates.times.as_slice(),
            scales.times.as_slice(),
        ],
        deform_keys,
        velocity_blur,
        timing,
    );

    let seconds = timing.frame_duration();
    let matrices = times
        .iter()
        .map(|&t| {
            let base = instancer_xform.resample(t).unwrap_or(DMat4::IDENTITY);
            let transforms = transforms.resample(t).unwrap_or_default();
            let translates = translates
                .resample(if velocity_blur { 0.0 } else { t })
                .unwrap_or_default();
            let rotates = rotates.resample(t).unwrap_or_default();
            let scales = scales.resample(t).unwrap_or_default();
            let dt = t * seconds;
            instance_indices
                .iter()
                .map(|&i| {
                    let mut m = base;
                    if let Some(i) = index(i, translates.len()) {
                        let mut p = DVec3::from_array(translates[i].map(f64::from));
                        if let Some(v) = velocities.get(i) {
                            p += DVec3::from_array(v.map(f64::from)) * f64::from(dt);
                        }
                        if let Some(a) = accelerations.get(i) {
                            p += DVec3::from_array(a.map(f64::from)) * f64::from(0.5 * dt * dt);
                        }
                        m *= DMat4::from_translation(p);
                    }
                    if let Some(i) = index(i, rotates.len()) {
                        m *= DMat4::from_quat(rotates[i]);
                    }
                    if let Some(i) = index(i, scales.len()) {
                        m *= DMat4::from_scale(DVec3::from_array(scales[i].map(f64::from)));
                    }
                    if let Some(i) = index(i, transforms.len()) {
                        m *= transforms[i];
                    }
                    m
                })
                .collect()
        })
        .collect();

    ComposedInstances {
        times,
        matrices,
        instance_indices,
    }
}

/// Per-instance ray flags gathered from boolean array primvars.
#[derive(Default)]
struct InstanceRayFlags {
    visibility: Vec<RayFlags>,
    sidedness: Vec<RayFlags>,
    autobump: Vec<RayFlags>,
}

impl InstanceRayFlags {
    /// Consumes `render:visibility:<ray>` style primvars.
    fn apply(&mut self, name: &str, value: &Value) -> bool {
        let (flags, ray) = if let Some(ray) = name.strip_prefix("visibility:") {
            (&mut self.visibility, ray)
        } else if let Some(ray) = name.strip_prefix("sidedness:") {
            (&mut self.sidedness, ray)
        } else if let Some(ray) = name.strip_prefix("autobump_visibility:") {
            (&mut self.autobump, ray)
        } else {
            return false;
        };
        let (Some(ray), Some(Array::Bool(values))) = (RayType::from_ray_name(ray), value.as_array()) else {
            return true;
        };
        if values.len() > flags.len() {
            flags.resize(values.len(), RayFlags::new(RayType::all().bits()));
        }
        for (f, on) in flags.iter_mut().zip(values) {
            f.set_primvar(ray, *on);
        }
        true
    }
}

fn composed_bytes(flags: &[RayFlags]) -> Option<Value> {
    (!flags.is_empty()).then(|| Value::from(flags.iter().map(RayFlags::compose).collect::<Vec<u8>>()))
}

/// Renderer instancer nodes built for one prototype, innermost first.
#[derive(Debug, Default)]
pub struct InstancerChain {
    nodes: Vec<NodeHandle>,
}

impl InstancerChain {
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rebuilds the chain of instancer nodes placing `prototype_node`,
    /// walking up through parent instancers. Lower instancer nodes are made
    /// invisible so only the outermost one renders.
    pub fn rebuild(
        &mut self,
        cx: &RenderContext,
        host: &dyn SceneDelegate,
        instancer: &str,
        prototype: &str,
        prototype_node: NodeHandle,
        prototype_visibility: u8,
    ) -> Result<(), TranslateError> {
        self.release(cx);
        let timing = cx.timing();
        let max_samples = cx.config().max_primvar_samples;
        let mut visited = HashSet::new();
        let mut level = (instancer.to_string(), prototype.to_string(), prototype_node);
        let mut visibility = prototype_visibility;
        loop {
            let (instancer_id, prototype_id, placed) = level;
            if !visited.insert(instancer_id.clone()) {
                cx.diagnostics().report(
                    DiagnosticKind::MalformedSamples,
                    prototype,
                    format!("instancer cycle through `{instancer_id}`"),
                );
                break;
            }
            let composed = compose_instances(host, &instancer_id, &prototype_id, &timing, max_samples);
            let node = cx
                .universe()
                .create_node("instancer", &format!("{prototype_id}_instancer"))?;
            self.nodes.push(node);
            write_instancer(cx, host, &instancer_id, node, placed, &composed, visibility);

            let Some(parent) = host.instancer_id(&instancer_id) else {
                break;
            };
            cx.universe().set_param(node, "visibility", ParamValue::Byte(0))?;
            visibility = RayType::all().bits();
            level = (parent, instancer_id, node);
        }
        Ok(())
    }

    pub fn release(&mut self, cx: &RenderContext) {
        for node in self.nodes.drain(..) {
            cx.universe().destroy_node(node);
        }
    }
}

fn write_instancer(
    cx: &RenderContext,
    host: &dyn SceneDelegate,
    instancer: &str,
    node: NodeHandle,
    placed: NodeHandle,
    composed: &ComposedInstances,
    prototype_visibility: u8,
) {
    let writer = cx.writer(node, instancer);
    let count = composed.instance_count();
    writer.set_native("nodes", ArrayData::Node(vec![Some(placed)]).into());
    writer.set_native("instance_inherit_xform", ArrayData::Bool(vec![true]).into());
    if count == 0 {
        writer.reset("instance_matrix");
        writer.reset("node_idxs");
        writer.reset("instance_visibility");
        return;
    }

    let keys: Vec<ArrayData> = composed
        .matrices
        .iter()
        .map(|sample| ArrayData::Matrix(sample.iter().map(DMat4::as_mat4).collect()))
        .collect();
    if let Some(array) = ParamArray::from_keys(keys) {
        writer.set_native("instance_matrix", ParamValue::Array(array));
    }
    writer.set_native("node_idxs", ArrayData::UInt(vec![0; count]).into());

    let (start, end) = match composed.times.as_slice() {
        [first, .., last] => (*first, *last),
        _ => (0.0, 1.0),
    };
    for (name, value) in [("instance_motion_start", start), ("instance_motion_end", end)] {
        let decl = UserDeclaration::new(UserScope::ConstantArray, ParamType::Float);
        if declare_user_param(&writer, name, decl) {
            writer.set_native(name, ArrayData::Float(vec![value]).into());
        }
    }

    let mut rays = InstanceRayFlags::default();
    for desc in host.primvar_descriptors(instancer) {
        if desc.interpolation != Interpolation::Instance || TRANSFORM_PRIMVARS.contains(&desc.name.as_str()) {
            continue;
        }
        let (value, indices) = host.indexed_primvar(instancer, &desc.name);
        let name = match desc.name.strip_prefix(RENDER_NAMESPACE) {
            Some(stripped) => {
                if rays.apply(stripped, &value) {
                    continue;
                }
                stripped
            }
            None => desc.name.as_str(),
        };
        let primvar = PrimvarDesc::new(value, indices, Interpolation::Instance, desc.role);
        set_instance_primvar(&writer, name, &primvar, &composed.instance_indices);
    }
    write_instance_visibility(&writer, &rays.visibility, &composed.instance_indices, prototype_visibility);
    for (name, flags) in [("sidedness", &rays.sidedness), ("autobump_visibility", &rays.autobump)] {
        if let Some(value) = composed_bytes(flags) {
            let primvar = PrimvarDesc::new(value, Vec::new(), Interpolation::Instance, Default::default());
            set_instance_primvar(&writer, name, &primvar, &composed.instance_indices);
        }
    }
}

/// `instance_visibility` is the per-instance ray mask ANDed with the
/// prototype's own visibility.
fn write_instance_visibility(writer: &NodeWriter<'_>, flags: &[RayFlags], instance_indices: &[i32], prototype: u8) {
    let all = RayType::all().bits();
    let bytes: Vec<u8> = instance_indices
        .iter()
        .map(|&i| {
            let own = index(i, flags.len()).map_or(all, |i| flags[i].compose());
            own & prototype
        })
        .collect();
    writer.set_native("instance_visibility", ArrayData::Byte(bytes).into());
}
