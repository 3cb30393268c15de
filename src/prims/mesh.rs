//! Polygon meshes.

use super::{
    PrimSync, StepContext,
    shape::{FaceLayout, SHAPE_DIRTY_BITS, ShapeCore},
};
use crate::{
    catalog::ParamType,
    context::RenderContext,
    error::{DiagnosticKind, TranslateError},
    marshal::{
        Role, convert,
        indices::{explicit_vertex_idxs, generate_vertex_idxs, reverse_winding, vertex_count_sum},
        primvar::{Interpolation, PrimvarDesc},
    },
    scene::{GeomSubset, SubdivTags},
    sync::DirtyBits,
    universe::{ArrayData, NodeHandle, ParamValue},
    value::Token,
};

/// Primvars the mesh writes to built-in parameters itself.
const CONSUMED: [&str; 4] = ["points", "normals", "velocities", "accelerations"];
const UV_NAMES: [&str; 2] = ["st", "uv"];

/// Flattened crease edges and corners: vertex pairs and their sharpness.
/// Corners are degenerate edges.
fn crease_arrays(tags: &SubdivTags) -> (Vec<u32>, Vec<f32>) {
    let vertex = |i: i32| u32::try_from(i).unwrap_or(0);
    let per_crease = tags.crease_weights.len() == tags.crease_lengths.len();
    let mut idxs = Vec::new();
    let mut sharpness = Vec::new();
    let mut start = 0usize;
    let mut edge = 0usize;
    for (crease, &len) in tags.crease_lengths.iter().enumerate() {
        let len = usize::try_from(len).unwrap_or(0);
        let Some(verts) = tags.crease_indices.get(start..start + len) else {
            break;
        };
        for pair in verts.windows(2) {
            let weight = if per_crease {
                tags.crease_weights.get(crease)
            } else {
                tags.crease_weights.get(edge)
            };
            idxs.extend([vertex(pair[0]), vertex(pair[1])]);
            sharpness.push(weight.copied().unwrap_or(0.0));
            edge += 1;
        }
        start += len;
    }
    for (i, &corner) in tags.corner_indices.iter().enumerate() {
        idxs.extend([vertex(corner), vertex(corner)]);
        sharpness.push(tags.corner_weights.get(i).copied().unwrap_or(0.0));
    }
    (idxs, sharpness)
}

/// Per-face shader index. Subset faces index their subset, the rest index
/// the mesh material stored after the subsets. `None` without subsets or
/// with more than a byte can address.
fn shader_indices(subsets: &[GeomSubset], face_count: usize) -> Option<Vec<u8>> {
    let own = u8::try_from(subsets.len()).ok().filter(|&n| n > 0)?;
    let mut shidxs = vec![own; face_count];
    for (i, subset) in subsets.iter().enumerate() {
        let i = u8::try_from(i).unwrap_or(own);
        for &face in &subset.indices {
            if let Some(slot) = usize::try_from(face).ok().and_then(|f| shidxs.get_mut(f)) {
                *slot = i;
            }
        }
    }
    Some(shidxs)
}

fn subdiv_type(scheme: &str) -> &'static str {
    match scheme {
        "catmullClark" | "catmark" => "catclark",
        _ => "none",
    }
}

/// Display refine levels 0..=8 map to 0..=3 iterations.
fn subdiv_iterations(refine_level: i32) -> u8 {
    if refine_level <= 0 {
        0
    } else {
        refine_level.ilog2() as u8
    }
}

pub struct MeshPrim {
    shape: ShapeCore,
    vertex_counts: Vec<i32>,
    vertex_count_sum: usize,
    /// Face-vertex indices as written, already reversed when left handed.
    vertex_indices: Vec<u32>,
    left_handed: bool,
    subset_materials: Vec<Option<String>>,
    volume: bool,
    /// Last display-style iteration count; zero disables subdivision.
    iterations: Option<u8>,
}

impl MeshPrim {
    pub fn new(cx: &RenderContext, id: &str) -> Result<Self, TranslateError> {
        Ok(Self {
            shape: ShapeCore::new(cx, "polymesh", id)?,
            vertex_counts: Vec::new(),
            vertex_count_sum: 0,
            vertex_indices: Vec::new(),
            left_handed: false,
            subset_materials: Vec::new(),
            volume: false,
            iterations: None,
        })
    }

    pub fn node(&self) -> NodeHandle {
        self.shape.node
    }

    /// Whether a positive `render:step_size` turned the mesh into a volume.
    pub fn is_volume(&self) -> bool {
        self.volume
    }

    /// Shader array: one entry per subset, then the mesh's own material.
    fn bind_shaders(&mut self, step: &StepContext<'_>) {
        let cx = step.cx;
        let material = step.host.material_id(step.id);
        let mut used: Vec<String> = self.subset_materials.iter().flatten().cloned().collect();
        used.extend(material.iter().cloned());
        used.sort();
        used.dedup();
        cx.track_material_use(step.id, &used);

        let writer = step.writer(self.shape.node);
        let step_size = convert::to_float(&step.host.attribute(step.id, "render:step_size")).unwrap_or(0.0);
        self.volume = step_size > 0.0;
        if self.volume {
            writer.set_native("step_size", ParamValue::Float(step_size));
        } else {
            writer.reset("step_size");
        }

        let mut shaders = Vec::with_capacity(self.subset_materials.len() + 1);
        let mut displacements = Vec::with_capacity(shaders.capacity());
        for binding in self.subset_materials.iter().map(Option::as_deref).chain([material.as_deref()]) {
            let terminals = ShapeCore::resolve_material(step, binding);
            let shader = if self.volume {
                terminals.volume.unwrap_or(cx.fallback_volume())
            } else {
                terminals.surface.unwrap_or(cx.fallback_surface())
            };
            shaders.push(shader);
            displacements.push(terminals.displacement.filter(|_| !self.volume));
        }
        self.shape.write_shaders(step, &shaders);
        if displacements.iter().any(Option::is_some) {
            writer.set_native("disp_map", ArrayData::Node(displacements).into());
        } else {
            writer.reset("disp_map");
        }
    }

    fn write_subdiv_type(&self, step: &StepContext<'_>, scheme: &str) {
        let ty = if self.iterations == Some(0) { "none" } else { subdiv_type(scheme) };
        step.writer(self.shape.node)
            .set_native("subdiv_type", ParamValue::String(ty.into()));
    }

    fn uv_primvar(&self) -> Option<Token> {
        UV_NAMES
            .iter()
            .find_map(|n| self.shape.primvars.get_key_value(*n).map(|(k, _)| k.clone()))
            .or_else(|| {
                self.shape
                    .primvars
                    .iter()
                    .find(|(_, d)| d.role == Role::TextureCoordinate && d.interpolation != Interpolation::Constant)
                    .map(|(k, _)| k.clone())
            })
    }

    /// Indices of a per-face-vertex array for `desc`.
    fn face_indices(&self, step: &StepContext<'_>, name: &str, desc: &PrimvarDesc, count: usize) -> Vec<u32> {
        let counts = self.left_handed.then_some(self.vertex_counts.as_slice());
        match desc.interpolation {
            Interpolation::Vertex | Interpolation::Varying => {
                if desc.indices.is_empty() {
                    self.vertex_indices.clone()
                } else {
                    self.vertex_indices
                        .iter()
                        .map(|&v| desc.indices.get(v as usize).map_or(0, |&i| i.max(0) as u32))
                        .collect()
                }
            }
            _ if !desc.indices.is_empty() => explicit_vertex_idxs(&desc.indices, counts),
            _ => generate_vertex_idxs(count, counts, self.vertex_count_sum).unwrap_or_else(|| {
                step.report(
                    DiagnosticKind::MalformedSamples,
                    format!("`{name}` has {count} values for {} face vertices", self.vertex_count_sum),
                );
                Vec::new()
            }),
        }
    }

    /// Writes `list`/`idxs` from a vertex or face-varying primvar.
    fn write_indexed_builtin(&mut self, step: &StepContext<'_>, name: &str, ty: ParamType, list: &str, idxs: &str) {
        let Some(cached) = self.shape.primvars.get_mut(name) else {
            let writer = step.writer(self.shape.node);
            writer.reset(list);
            writer.reset(idxs);
            return;
        };
        if !cached.needs_update() {
            return;
        }
        let desc = cached.clone();
        let writer = step.writer(self.shape.node);
        if !matches!(
            desc.interpolation,
            Interpolation::Vertex | Interpolation::Varying | Interpolation::FaceVarying
        ) {
            writer.skip(
                DiagnosticKind::UnsupportedConversion,
                format!("`{name}` must be vertex or face-varying"),
            );
            return;
        }
        let Some(values) = convert::to_array(ty, &desc.value) else {
            writer.skip(
                DiagnosticKind::UnsupportedConversion,
                format!("cannot convert {} to `{list}`", desc.value.type_name()),
            );
            return;
        };
        let indices = self.face_indices(step, name, &desc, values.len());
        writer.set_native(list, values.into());
        writer.set_native(idxs, ArrayData::UInt(indices).into());
    }
}

impl PrimSync for MeshPrim {
    fn initial_dirty_bits(&self) -> DirtyBits {
        SHAPE_DIRTY_BITS
            | DirtyBits::TOPOLOGY
            | DirtyBits::SUBDIV_TAGS
            | DirtyBits::POINTS
            | DirtyBits::NORMALS
            | DirtyBits::DISPLAY_STYLE
            | DirtyBits::PARAMS
    }

    fn sync_material(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        self.bind_shaders(step);
        Ok(())
    }

    fn sync_topology(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        let Some(topology) = step.host.mesh_topology(step.id) else {
            return Ok(());
        };
        let writer = step.writer(self.shape.node);

        if step.is_dirty(DirtyBits::TOPOLOGY) {
            let counts: Vec<i32> = topology.face_vertex_counts.iter().map(|&c| c.max(0)).collect();
            let sum = vertex_count_sum(&counts);
            let indices: Vec<u32> = topology
                .face_vertex_indices
                .iter()
                .map(|&i| u32::try_from(i).unwrap_or(0))
                .collect();
            if indices.len() != sum {
                writer.skip(
                    DiagnosticKind::MalformedSamples,
                    format!("{} face-vertex indices for {sum} face vertices", indices.len()),
                );
            }
            let indices = if topology.left_handed {
                reverse_winding(&indices, &counts)
            } else {
                indices
            };
            writer.set_native("nsides", ArrayData::UInt(counts.iter().map(|&c| c as u32).collect()).into());
            writer.set_native("vidxs", ArrayData::UInt(indices.clone()).into());
            self.write_subdiv_type(step, &topology.scheme);

            match shader_indices(&topology.subsets, counts.len()) {
                Some(shidxs) => {
                    writer.set_native("shidxs", ArrayData::Byte(shidxs).into());
                    self.subset_materials = topology.subsets.iter().map(|s| s.material_id.clone()).collect();
                }
                None => {
                    if topology.subsets.len() > usize::from(u8::MAX) {
                        writer.skip(
                            DiagnosticKind::MalformedSamples,
                            format!("{} geometry subsets exceed the shader index range", topology.subsets.len()),
                        );
                    }
                    writer.reset("shidxs");
                    self.subset_materials.clear();
                }
            }

            self.vertex_counts = counts;
            self.vertex_count_sum = sum;
            self.vertex_indices = indices;
            self.left_handed = topology.left_handed;
            // Subsets may bind other materials.
            self.bind_shaders(step);
        }

        if step.is_dirty(DirtyBits::TOPOLOGY | DirtyBits::SUBDIV_TAGS) {
            let (idxs, sharpness) = crease_arrays(&topology.subdiv_tags);
            if idxs.is_empty() {
                writer.reset("crease_idxs");
                writer.reset("crease_sharpness");
            } else {
                writer.set_native("crease_idxs", ArrayData::UInt(idxs).into());
                writer.set_native("crease_sharpness", ArrayData::Float(sharpness).into());
            }
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
            let step_size = convert::to_float(&step.host.attribute(step.id, "render:step_size")).unwrap_or(0.0);
            if self.volume || step_size > 0.0 {
                self.bind_shaders(step);
            }
        }

        let positions_changed = step.is_dirty(DirtyBits::POINTS | DirtyBits::PRIMVAR | DirtyBits::TOPOLOGY);
        self.shape
            .refresh_primvars(step, step.is_dirty(DirtyBits::TOPOLOGY | DirtyBits::MATERIAL_ID));

        if positions_changed {
            match ShapeCore::position_keys(step) {
                Some(keys) => self.shape.write_position_keys(step, "vlist", &keys),
                None => {
                    step.writer(self.shape.node).reset("vlist");
                    self.shape.clear_deform_range(step);
                }
            }
        }

        self.write_indexed_builtin(step, "normals", ParamType::Vector, "nlist", "nidxs");
        let uv = self.uv_primvar();
        match &uv {
            Some(name) => self.write_indexed_builtin(step, name, ParamType::Vector2, "uvlist", "uvidxs"),
            None => {
                let writer = step.writer(self.shape.node);
                writer.reset("uvlist");
                writer.reset("uvidxs");
            }
        }

        let mut consumed: Vec<&str> = CONSUMED.to_vec();
        if let Some(name) = &uv {
            consumed.push(name.as_str());
        }
        let layout = FaceLayout {
            vertex_counts: &self.vertex_counts,
            vertex_count_sum: self.vertex_count_sum,
            left_handed: self.left_handed,
        };
        self.shape.apply_primvars(step, &consumed, Some(layout));
        Ok(())
    }

    fn sync_transform(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        self.shape.sync_transform(step);
        Ok(())
    }

    fn sync_extras(&mut self, step: &StepContext<'_>) -> Result<(), TranslateError> {
        if step.is_dirty(DirtyBits::DISPLAY_STYLE) {
            let iterations = subdiv_iterations(step.host.display_style(step.id).refine_level);
            step.writer(self.shape.node)
                .set_native("subdiv_iterations", ParamValue::Byte(iterations));
            self.iterations = Some(iterations);
            if let Some(topology) = step.host.mesh_topology(step.id) {
                self.write_subdiv_type(step, &topology.scheme);
            }
        }
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
