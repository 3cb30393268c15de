//! The closed set of primitive kinds and the step trait they share.
//!
//! Every kind implements [`PrimSync`]; the record drives the steps in
//! [`SyncStep::ORDER`] and only calls the ones whose trigger bits are dirty.

pub mod curves;
pub mod light;
pub mod material;
pub mod mesh;
pub mod native;
pub mod points;
pub mod shape;
pub mod volume;

use crate::{
    catalog::RenderCatalog,
    context::RenderContext,
    error::{DiagnosticKind, TranslateError},
    marshal::NodeWriter,
    scene::SceneDelegate,
    sync::{DirtyBits, SyncStep},
    universe::NodeHandle,
};

pub use curves::CurvesPrim;
pub use light::LightPrim;
pub use material::MaterialPrim;
pub use mesh::MeshPrim;
pub use native::NativePrim;
pub use points::PointsPrim;
pub use volume::VolumePrim;

/// What one step of one pass sees.
pub struct StepContext<'a> {
    pub cx: &'a RenderContext,
    pub host: &'a dyn SceneDelegate,
    pub id: &'a str,
    /// Mask of the pass; all bits when forced.
    pub dirty: DirtyBits,
}

impl<'a> StepContext<'a> {
    pub fn is_dirty(&self, bits: DirtyBits) -> bool {
        self.dirty.intersects(bits)
    }

    pub fn writer(&self, node: NodeHandle) -> NodeWriter<'a> {
        self.cx.writer(node, self.id)
    }

    pub fn report(&self, kind: DiagnosticKind, message: impl Into<String>) {
        self.cx.diagnostics().report(kind, self.id, message);
    }
}

/// Steps of one primitive kind. Steps a kind has nothing to do for keep the
/// default no-op.
pub trait PrimSync: Send {
    /// Mask a freshly inserted record starts with.
    fn initial_dirty_bits(&self) -> DirtyBits;

    fn sync_material(&mut self, _step: &StepContext<'_>) -> Result<(), TranslateError> {
        Ok(())
    }

    fn sync_topology(&mut self, _step: &StepContext<'_>) -> Result<(), TranslateError> {
        Ok(())
    }

    fn sync_visibility(&mut self, _step: &StepContext<'_>) -> Result<(), TranslateError> {
        Ok(())
    }

    fn sync_primvars(&mut self, _step: &StepContext<'_>) -> Result<(), TranslateError> {
        Ok(())
    }

    fn sync_transform(&mut self, _step: &StepContext<'_>) -> Result<(), TranslateError> {
        Ok(())
    }

    fn sync_extras(&mut self, _step: &StepContext<'_>) -> Result<(), TranslateError> {
        Ok(())
    }

    /// Renderer nodes owned by this primitive.
    fn nodes(&self) -> Vec<NodeHandle>;

    /// Destroys owned nodes. Fallbacks are never owned.
    fn release(&mut self, cx: &RenderContext);

    /// Whether the last pass asks for an immediate forced pass, and clears
    /// the request.
    fn take_resync_request(&mut self) -> bool {
        false
    }
}

/// Light types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Distant,
    Sphere,
    Rect,
    Disk,
}

/// Kind requested when a record is inserted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimKind {
    Mesh,
    Curves,
    Points,
    Volume,
    Light(LightType),
    Material,
    /// A catalog entry created verbatim.
    Native(String),
}

impl PrimKind {
    /// Kind of a host prim type. Types the renderer catalog names are
    /// created as native nodes.
    pub fn from_host_type(type_name: &str, catalog: &RenderCatalog) -> Option<PrimKind> {
        Some(match type_name {
            "Mesh" => PrimKind::Mesh,
            "BasisCurves" => PrimKind::Curves,
            "Points" => PrimKind::Points,
            "Volume" => PrimKind::Volume,
            "DistantLight" => PrimKind::Light(LightType::Distant),
            "SphereLight" => PrimKind::Light(LightType::Sphere),
            "RectLight" => PrimKind::Light(LightType::Rect),
            "DiskLight" => PrimKind::Light(LightType::Disk),
            "Material" => PrimKind::Material,
            native if catalog.contains(native) => PrimKind::Native(native.to_string()),
            _ => return None,
        })
    }
}

pub enum PrimBody {
    Mesh(MeshPrim),
    Curves(CurvesPrim),
    Points(PointsPrim),
    Volume(VolumePrim),
    Light(LightPrim),
    Material(MaterialPrim),
    Native(NativePrim),
}

impl PrimBody {
    pub fn new(kind: &PrimKind, cx: &RenderContext, id: &str) -> Result<Self, TranslateError> {
        Ok(match kind {
            PrimKind::Mesh => PrimBody::Mesh(MeshPrim::new(cx, id)?),
            PrimKind::Curves => PrimBody::Curves(CurvesPrim::new(cx, id)?),
            PrimKind::Points => PrimBody::Points(PointsPrim::new(cx, id)?),
            PrimKind::Volume => PrimBody::Volume(VolumePrim::new(cx, id)?),
            PrimKind::Light(ty) => PrimBody::Light(LightPrim::new(cx, id, *ty)?),
            PrimKind::Material => PrimBody::Material(MaterialPrim::new(id)),
            PrimKind::Native(entry) => PrimBody::Native(NativePrim::new(cx, id, entry)?),
        })
    }

    pub fn is_material(&self) -> bool {
        matches!(self, PrimBody::Material(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PrimBody::Mesh(_) => "mesh",
            PrimBody::Curves(_) => "curves",
            PrimBody::Points(_) => "points",
            PrimBody::Volume(_) => "volume",
            PrimBody::Light(_) => "light",
            PrimBody::Material(_) => "material",
            PrimBody::Native(_) => "native",
        }
    }

    pub fn as_sync(&self) -> &dyn PrimSync {
        match self {
            PrimBody::Mesh(p) => p,
            PrimBody::Curves(p) => p,
            PrimBody::Points(p) => p,
            PrimBody::Volume(p) => p,
            PrimBody::Light(p) => p,
            PrimBody::Material(p) => p,
            PrimBody::Native(p) => p,
        }
    }

    pub fn as_sync_mut(&mut self) -> &mut dyn PrimSync {
        match self {
            PrimBody::Mesh(p) => p,
            PrimBody::Curves(p) => p,
            PrimBody::Points(p) => p,
            PrimBody::Volume(p) => p,
            PrimBody::Light(p) => p,
            PrimBody::Material(p) => p,
            PrimBody::Native(p) => p,
        }
    }

    pub fn run_step(&mut self, step: SyncStep, cx: &StepContext<'_>) -> Result<(), TranslateError> {
        let prim = self.as_sync_mut();
        match step {
            SyncStep::Material => prim.sync_material(cx),
            SyncStep::Topology => prim.sync_topology(cx),
            SyncStep::Visibility => prim.sync_visibility(cx),
            SyncStep::Primvars => prim.sync_primvars(cx),
            SyncStep::Transform => prim.sync_transform(cx),
            SyncStep::Extras => prim.sync_extras(cx),
        }
    }
}
