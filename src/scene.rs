//! Host scene graph interface and an in-memory host.
//!
//! The engine reads everything it translates through [`SceneDelegate`].
//! [`MemoryScene`] keeps a whole scene in maps and marks the matching dirty
//! bits on its [`ChangeTracker`] whenever a setter is called.

use std::{collections::HashMap, sync::Arc};

use glam::DMat4;
use indexmap::IndexMap;

use crate::{
    instancing::sampled::SampledArray,
    marshal::{Role, primvar::Interpolation},
    shader_graph::network::MaterialNetwork,
    sync::{ChangeTracker, DirtyBits},
    value::{AssetPath, Token, Value},
};

#[derive(Debug, Clone, PartialEq)]
pub struct PrimvarDescriptor {
    pub name: Token,
    pub interpolation: Interpolation,
    pub role: Role,
    pub indexed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubdivTags {
    pub crease_indices: Vec<i32>,
    pub crease_lengths: Vec<i32>,
    pub crease_weights: Vec<f32>,
    pub corner_indices: Vec<i32>,
    pub corner_weights: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeomSubset {
    pub id: String,
    pub material_id: Option<String>,
    /// Face indices.
    pub indices: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshTopology {
    /// `catmullClark`, `loop`, `bilinear` or `none`.
    pub scheme: Token,
    pub left_handed: bool,
    pub face_vertex_counts: Vec<i32>,
    pub face_vertex_indices: Vec<i32>,
    pub subsets: Vec<GeomSubset>,
    pub subdiv_tags: SubdivTags,
}

impl Default for MeshTopology {
    fn default() -> Self {
        Self {
            scheme: Token::new("none"),
            left_handed: false,
            face_vertex_counts: Vec::new(),
            face_vertex_indices: Vec::new(),
            subsets: Vec::new(),
            subdiv_tags: SubdivTags::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurveTopology {
    /// `linear` or `cubic`.
    pub curve_type: Token,
    /// `bezier`, `bspline` or `catmullRom` for cubic curves.
    pub basis: Token,
    pub vertex_counts: Vec<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayStyle {
    pub refine_level: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeField {
    pub name: Token,
    pub file: Option<AssetPath>,
}

/// Everything the engine reads from the host scene graph.
pub trait SceneDelegate: Sync {
    fn transform(&self, id: &str) -> SampledArray<DMat4>;
    fn primvar(&self, id: &str, name: &str) -> SampledArray<Value>;
    fn primvar_descriptors(&self, id: &str) -> Vec<PrimvarDescriptor>;
    /// Value and indices of an indexed primvar at time zero.
    fn indexed_primvar(&self, id: &str, name: &str) -> (Value, Vec<i32>);
    /// Plain attribute at time zero (`Value::Empty` when absent).
    fn attribute(&self, id: &str, name: &str) -> Value;
    fn mesh_topology(&self, id: &str) -> Option<MeshTopology>;
    fn curve_topology(&self, id: &str) -> Option<CurveTopology>;
    fn display_style(&self, id: &str) -> DisplayStyle;
    fn material_id(&self, id: &str) -> Option<String>;
    fn visible(&self, id: &str) -> bool;
    fn double_sided(&self, id: &str) -> bool;
    fn render_tag(&self, id: &str) -> Token;
    fn categories(&self, id: &str) -> Vec<Token>;
    fn instancer_id(&self, id: &str) -> Option<String>;
    fn instance_indices(&self, instancer: &str, prototype: &str) -> Vec<i32>;
    fn material_resource(&self, id: &str) -> Option<MaterialNetwork>;
    fn volume_fields(&self, id: &str) -> Vec<VolumeField>;
}

#[derive(Debug, Clone)]
struct MemoryPrimvar {
    samples: SampledArray<Value>,
    indices: Vec<i32>,
    interpolation: Interpolation,
    role: Role,
}

#[derive(Debug, Clone)]
struct MemoryPrim {
    transform: SampledArray<DMat4>,
    primvars: IndexMap<Token, MemoryPrimvar>,
    attributes: HashMap<String, Value>,
    mesh: Option<MeshTopology>,
    curves: Option<CurveTopology>,
    display_style: DisplayStyle,
    material_id: Option<String>,
    visible: bool,
    double_sided: bool,
    render_tag: Token,
    categories: Vec<Token>,
    instancer_id: Option<String>,
    /// Prototype id to instance indices, on instancers.
    instances: HashMap<String, Vec<i32>>,
    material: Option<MaterialNetwork>,
    volume_fields: Vec<VolumeField>,
}

impl Default for MemoryPrim {
    fn default() -> Self {
        Self {
            transform: SampledArray::new(),
            primvars: IndexMap::new(),
            attributes: HashMap::new(),
            mesh: None,
            curves: None,
            display_style: DisplayStyle::default(),
            material_id: None,
            visible: true,
            double_sided: false,
            render_tag: Token::new("geometry"),
            categories: Vec::new(),
            instancer_id: None,
            instances: HashMap::new(),
            material: None,
            volume_fields: Vec::new(),
        }
    }
}

/// In-memory host scene.
pub struct MemoryScene {
    tracker: Arc<ChangeTracker>,
    prims: HashMap<String, MemoryPrim>,
}

impl MemoryScene {
    pub fn new(tracker: Arc<ChangeTracker>) -> Self {
        Self {
            tracker,
            prims: HashMap::new(),
        }
    }

    pub fn tracker(&self) -> &Arc<ChangeTracker> {
        &self.tracker
    }

    fn prim_mut(&mut self, id: &str, bits: DirtyBits) -> &mut MemoryPrim {
        self.tracker.mark_dirty(id, bits);
        self.prims.entry(id.to_string()).or_default()
    }

    fn prim(&self, id: &str) -> Option<&MemoryPrim> {
        self.prims.get(id)
    }

    /// Marks every prototype instanced by `instancer` (directly or through
    /// nested instancers).
    fn dirty_prototypes(&self, instancer: &str, bits: DirtyBits) {
        let mut stack = vec![instancer.to_string()];
        let mut seen = std::collections::HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for (id, prim) in &self.prims {
                if prim.instancer_id.as_deref() == Some(current.as_str()) {
                    self.tracker.mark_dirty(id, bits);
                    stack.push(id.clone());
                }
            }
        }
    }

    pub fn set_transform(&mut self, id: &str, matrix: DMat4) {
        self.set_transform_samples(id, SampledArray::single(matrix));
    }

    pub fn set_transform_samples(&mut self, id: &str, samples: SampledArray<DMat4>) {
        self.prim_mut(id, DirtyBits::TRANSFORM).transform = samples;
        self.dirty_prototypes(id, DirtyBits::INSTANCER);
    }

    pub fn set_primvar(&mut self, id: &str, name: &str, value: Value, interpolation: Interpolation, role: Role) {
        self.set_primvar_samples(id, name, SampledArray::single(value), Vec::new(), interpolation, role);
    }

    pub fn set_indexed_primvar(
        &mut self,
        id: &str,
        name: &str,
        value: Value,
        indices: Vec<i32>,
        interpolation: Interpolation,
        role: Role,
    ) {
        self.set_primvar_samples(id, name, SampledArray::single(value), indices, interpolation, role);
    }

    pub fn set_primvar_samples(
        &mut self,
        id: &str,
        name: &str,
        samples: SampledArray<Value>,
        indices: Vec<i32>,
        interpolation: Interpolation,
        role: Role,
    ) {
        let bits = match name {
            "points" => DirtyBits::POINTS,
            "normals" => DirtyBits::NORMALS,
            "widths" => DirtyBits::WIDTHS,
            _ => DirtyBits::PRIMVAR,
        };
        self.prim_mut(id, bits).primvars.insert(
            Token::new(name),
            MemoryPrimvar {
                samples,
                indices,
                interpolation,
                role,
            },
        );
        if interpolation == Interpolation::Instance || is_instance_transform_primvar(name) {
            self.dirty_prototypes(id, DirtyBits::INSTANCER);
        }
    }

    pub fn remove_primvar(&mut self, id: &str, name: &str) {
        self.prim_mut(id, DirtyBits::PRIMVAR).primvars.shift_remove(name);
    }

    pub fn set_attribute(&mut self, id: &str, name: &str, value: Value) {
        self.prim_mut(id, DirtyBits::PARAMS).attributes.insert(name.to_string(), value);
    }

    pub fn set_mesh_topology(&mut self, id: &str, topology: MeshTopology) {
        self.prim_mut(id, DirtyBits::TOPOLOGY | DirtyBits::SUBDIV_TAGS).mesh = Some(topology);
    }

    pub fn set_curve_topology(&mut self, id: &str, topology: CurveTopology) {
        self.prim_mut(id, DirtyBits::TOPOLOGY).curves = Some(topology);
    }

    pub fn set_display_style(&mut self, id: &str, style: DisplayStyle) {
        self.prim_mut(id, DirtyBits::DISPLAY_STYLE).display_style = style;
    }

    pub fn set_material_id(&mut self, id: &str, material: Option<&str>) {
        self.prim_mut(id, DirtyBits::MATERIAL_ID).material_id = material.map(str::to_string);
    }

    pub fn set_visible(&mut self, id: &str, visible: bool) {
        self.prim_mut(id, DirtyBits::VISIBILITY).visible = visible;
        self.dirty_prototypes(id, DirtyBits::INSTANCER);
    }

    pub fn set_double_sided(&mut self, id: &str, double_sided: bool) {
        self.prim_mut(id, DirtyBits::DOUBLE_SIDED).double_sided = double_sided;
    }

    pub fn set_render_tag(&mut self, id: &str, tag: &str) {
        self.prim_mut(id, DirtyBits::RENDER_TAG).render_tag = Token::new(tag);
    }

    pub fn set_categories(&mut self, id: &str, categories: &[&str]) {
        self.prim_mut(id, DirtyBits::CATEGORIES).categories =
            categories.iter().map(|c| Token::new(c)).collect();
    }

    pub fn set_instancer(&mut self, prototype: &str, instancer: Option<&str>) {
        self.prim_mut(prototype, DirtyBits::INSTANCER | DirtyBits::INSTANCE_INDEX).instancer_id =
            instancer.map(str::to_string);
        self.dirty_prototypes(prototype, DirtyBits::INSTANCER);
    }

    pub fn set_instance_indices(&mut self, instancer: &str, prototype: &str, indices: Vec<i32>) {
        self.prims
            .entry(instancer.to_string())
            .or_default()
            .instances
            .insert(prototype.to_string(), indices);
        self.tracker.mark_dirty(prototype, DirtyBits::INSTANCE_INDEX);
        self.dirty_prototypes(prototype, DirtyBits::INSTANCE_INDEX);
    }

    pub fn set_material_network(&mut self, id: &str, network: MaterialNetwork) {
        self.prim_mut(id, DirtyBits::RESOURCE).material = Some(network);
    }

    pub fn set_volume_fields(&mut self, id: &str, fields: Vec<VolumeField>) {
        self.prim_mut(id, DirtyBits::VOLUME_FIELD).volume_fields = fields;
    }
}

fn is_instance_transform_primvar(name: &str) -> bool {
    matches!(
        name,
        "instanceTransforms"
            | "instanceTranslations"
            | "instanceRotations"
            | "instanceScales"
            | "velocities"
            | "accelerations"
    )
}

impl SceneDelegate for MemoryScene {
    fn transform(&self, id: &str) -> SampledArray<DMat4> {
        self.prim(id).map(|p| p.transform.clone()).unwrap_or_default()
    }

    fn primvar(&self, id: &str, name: &str) -> SampledArray<Value> {
        self.prim(id)
            .and_then(|p| p.primvars.get(name))
            .map(|pv| pv.samples.clone())
            .unwrap_or_default()
    }

    fn primvar_descriptors(&self, id: &str) -> Vec<PrimvarDescriptor> {
        self.prim(id)
            .map(|p| {
                p.primvars
                    .iter()
                    .map(|(name, pv)| PrimvarDescriptor {
                        name: name.clone(),
                        interpolation: pv.interpolation,
                        role: pv.role,
                        indexed: !pv.indices.is_empty(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn indexed_primvar(&self, id: &str, name: &str) -> (Value, Vec<i32>) {
        self.prim(id)
            .and_then(|p| p.primvars.get(name))
            .map(|pv| {
                let idx = pv.samples.closest_index(0.0).unwrap_or(0);
                let value = pv.samples.values.get(idx).cloned().unwrap_or_default();
                (value, pv.indices.clone())
            })
            .unwrap_or_default()
    }

    fn attribute(&self, id: &str, name: &str) -> Value {
        self.prim(id)
            .and_then(|p| p.attributes.get(name).cloned())
            .unwrap_or_default()
    }

    fn mesh_topology(&self, id: &str) -> Option<MeshTopology> {
        self.prim(id).and_then(|p| p.mesh.clone())
    }

    fn curve_topology(&self, id: &str) -> Option<CurveTopology> {
        self.prim(id).and_then(|p| p.curves.clone())
    }

    fn display_style(&self, id: &str) -> DisplayStyle {
        self.prim(id).map(|p| p.display_style).unwrap_or_default()
    }

    fn material_id(&self, id: &str) -> Option<String> {
        self.prim(id).and_then(|p| p.material_id.clone())
    }

    fn visible(&self, id: &str) -> bool {
        self.prim(id).is_none_or(|p| p.visible)
    }

    fn double_sided(&self, id: &str) -> bool {
        self.prim(id).is_some_and(|p| p.double_sided)
    }

    fn render_tag(&self, id: &str) -> Token {
        self.prim(id)
            .map(|p| p.render_tag.clone())
            .unwrap_or_else(|| Token::new("geometry"))
    }

    fn categories(&self, id: &str) -> Vec<Token> {
        self.prim(id).map(|p| p.categories.clone()).unwrap_or_default()
    }

    fn instancer_id(&self, id: &str) -> Option<String> {
        self.prim(id).and_then(|p| p.instancer_id.clone())
    }

    fn instance_indices(&self, instancer: &str, prototype: &str) -> Vec<i32> {
        self.prim(instancer)
            .and_then(|p| p.instances.get(prototype).cloned())
            .unwrap_or_default()
    }

    fn material_resource(&self, id: &str) -> Option<MaterialNetwork> {
        self.prim(id).and_then(|p| p.material.clone())
    }

    fn volume_fields(&self, id: &str) -> Vec<VolumeField> {
        self.prim(id).map(|p| p.volume_fields.clone()).unwrap_or_default()
    }
}
