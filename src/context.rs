//! State shared by every primitive of one render.
//!
//! The context owns the renderer node store, the fallback shaders and the
//! tracking tables (material usage, render tags, light links). Primitive
//! records only borrow fallback handles and never destroy them.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::{
    catalog::RenderCatalog,
    config::TranslatorConfig,
    error::{Diagnostics, TranslateError},
    marshal::NodeWriter,
    sync::{ChangeTracker, DirtyBits, MotionTiming, RenderCoordinator},
    universe::{NodeHandle, ParamValue, RenderUniverse},
    value::Token,
};

const FALLBACK_SURFACE_NAME: &str = "/_fallback/surface";
const FALLBACK_COLOR_NAME: &str = "/_fallback/display_color";
const FALLBACK_VOLUME_NAME: &str = "/_fallback/volume";
const OPTIONS_NAME: &str = "options";

/// Terminal nodes a material publishes for shapes to bind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialTerminals {
    pub surface: Option<NodeHandle>,
    pub displacement: Option<NodeHandle>,
    pub volume: Option<NodeHandle>,
}

#[derive(Debug, Clone, PartialEq)]
struct LightLink {
    node: NodeHandle,
    /// `None` lights every shape.
    collection: Option<Token>,
}

#[derive(Debug, Clone)]
struct TaggedNodes {
    tag: Token,
    nodes: Vec<NodeHandle>,
}

pub struct RenderContext {
    config: TranslatorConfig,
    universe: RenderUniverse,
    diagnostics: Diagnostics,
    coordinator: Arc<dyn RenderCoordinator>,
    tracker: Arc<ChangeTracker>,
    options: NodeHandle,
    fallback_surface: NodeHandle,
    fallback_volume: NodeHandle,
    materials: RwLock<HashMap<String, MaterialTerminals>>,
    /// Material id to the shapes bound to it.
    material_users: Mutex<HashMap<String, HashSet<String>>>,
    render_tags: Mutex<HashMap<String, TaggedNodes>>,
    active_tags: RwLock<Vec<Token>>,
    lights: RwLock<IndexMap<String, LightLink>>,
    /// Shapes whose light group depends on the registered lights.
    categorized: Mutex<HashSet<String>>,
}

impl RenderContext {
    pub fn new(
        config: TranslatorConfig,
        catalog: Arc<RenderCatalog>,
        coordinator: Arc<dyn RenderCoordinator>,
        tracker: Arc<ChangeTracker>,
    ) -> Result<Self, TranslateError> {
        let universe = RenderUniverse::new(catalog);
        let diagnostics = Diagnostics::new(config.record_diagnostics);

        let options = universe.create_node("options", OPTIONS_NAME)?;
        let timing = coordinator.timing();
        universe.set_param(options, "fps", ParamValue::Float(timing.fps))?;
        universe.set_param(options, "shutter_start", ParamValue::Float(timing.shutter[0]))?;
        universe.set_param(options, "shutter_end", ParamValue::Float(timing.shutter[1]))?;

        let fallback_surface = universe.create_node(&config.fallback_surface_shader, FALLBACK_SURFACE_NAME)?;
        // Shapes without a material show their display color.
        let display_color = universe.create_node("user_data_rgb", FALLBACK_COLOR_NAME)?;
        universe.set_param(display_color, "attribute", ParamValue::String("displayColor".into()))?;
        universe.set_param(display_color, "default", ParamValue::Rgb([0.18; 3]))?;
        if let Some(input) = ["base_color", "color", "Kd_color"]
            .into_iter()
            .find(|p| universe.entry(fallback_surface).is_some_and(|e| e.has_param(p)))
        {
            universe.link(display_color, fallback_surface, input)?;
        }
        let fallback_volume = universe.create_node(&config.fallback_volume_shader, FALLBACK_VOLUME_NAME)?;

        let active_tags = config.render_tags.iter().map(|t| Token::new(t)).collect();
        Ok(Self {
            config,
            universe,
            diagnostics,
            coordinator,
            tracker,
            options,
            fallback_surface,
            fallback_volume,
            materials: RwLock::new(HashMap::new()),
            material_users: Mutex::new(HashMap::new()),
            render_tags: Mutex::new(HashMap::new()),
            active_tags: RwLock::new(active_tags),
            lights: RwLock::new(IndexMap::new()),
            categorized: Mutex::new(HashSet::new()),
        })
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    pub fn universe(&self) -> &RenderUniverse {
        &self.universe
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn coordinator(&self) -> &dyn RenderCoordinator {
        self.coordinator.as_ref()
    }

    pub fn tracker(&self) -> &Arc<ChangeTracker> {
        &self.tracker
    }

    pub fn timing(&self) -> MotionTiming {
        self.coordinator.timing()
    }

    pub fn options(&self) -> NodeHandle {
        self.options
    }

    pub fn fallback_surface(&self) -> NodeHandle {
        self.fallback_surface
    }

    pub fn fallback_volume(&self) -> NodeHandle {
        self.fallback_volume
    }

    pub fn writer<'a>(&'a self, node: NodeHandle, owner: &'a str) -> NodeWriter<'a> {
        NodeWriter::new(&self.universe, &self.diagnostics, node, owner)
    }

    /// Publishes the terminals of material `id`. Returns whether they
    /// differ from what was published before.
    pub fn publish_material(&self, id: &str, terminals: MaterialTerminals) -> bool {
        self.materials.write().insert(id.to_string(), terminals) != Some(terminals)
    }

    pub fn withdraw_material(&self, id: &str) -> Option<MaterialTerminals> {
        self.materials.write().remove(id)
    }

    pub fn material_terminals(&self, id: &str) -> Option<MaterialTerminals> {
        self.materials.read().get(id).copied()
    }

    /// Records that `prim` is bound to `materials`, replacing any previous
    /// binding.
    pub fn track_material_use(&self, prim: &str, materials: &[String]) {
        let mut users = self.material_users.lock();
        for shapes in users.values_mut() {
            shapes.remove(prim);
        }
        users.retain(|_, shapes| !shapes.is_empty());
        for material in materials {
            users.entry(material.clone()).or_default().insert(prim.to_string());
        }
    }

    pub fn material_users(&self, material: &str) -> Vec<String> {
        let mut users: Vec<String> = self
            .material_users
            .lock()
            .get(material)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    /// Marks every shape bound to `material` for rebinding.
    pub fn dirty_material_users(&self, material: &str) {
        let users = self.material_users(material);
        self.tracker
            .mark_many(users.iter().map(String::as_str), DirtyBits::MATERIAL_ID);
    }

    /// Tracks the render tag of `prim` and enables or disables its nodes
    /// according to the active tags.
    pub fn track_render_tag(&self, prim: &str, tag: Token, nodes: Vec<NodeHandle>) {
        let active = self.is_tag_active(&tag);
        for node in &nodes {
            self.set_node_active(prim, *node, active);
        }
        self.render_tags
            .lock()
            .insert(prim.to_string(), TaggedNodes { tag, nodes });
    }

    pub fn is_tag_active(&self, tag: &str) -> bool {
        self.active_tags.read().iter().any(|t| t == tag)
    }

    /// Changes the set of rendered tags and re-applies it to every tracked
    /// primitive.
    pub fn set_active_render_tags(&self, tags: &[&str]) {
        self.coordinator.interrupt();
        *self.active_tags.write() = tags.iter().map(|t| Token::new(t)).collect();
        let tracked = self.render_tags.lock();
        for (prim, tagged) in tracked.iter() {
            let active = self.is_tag_active(&tagged.tag);
            for node in &tagged.nodes {
                self.set_node_active(prim, *node, active);
            }
        }
    }

    fn set_node_active(&self, prim: &str, node: NodeHandle, active: bool) {
        if let Err(err) = self.universe.set_disabled(node, !active) {
            self.diagnostics.report(err.kind(), prim, err.to_string());
        }
    }

    /// Registers a light for light linking. Shapes with categories are
    /// dirtied when the light's linking changes.
    pub fn register_light(&self, prim: &str, node: NodeHandle, collection: Option<Token>) {
        let link = LightLink { node, collection };
        let changed = self.lights.write().insert(prim.to_string(), link.clone()) != Some(link);
        if changed {
            self.dirty_categorized();
        }
    }

    pub fn unregister_light(&self, prim: &str) {
        if self.lights.write().shift_remove(prim).is_some() {
            self.dirty_categorized();
        }
    }

    fn dirty_categorized(&self) {
        let shapes: Vec<String> = self.categorized.lock().iter().cloned().collect();
        self.tracker
            .mark_many(shapes.iter().map(String::as_str), DirtyBits::CATEGORIES);
    }

    /// Lights illuminating a shape with `categories`: unlinked lights plus
    /// those whose collection the shape belongs to. `None` when no light
    /// uses linking.
    pub fn light_group_for(&self, prim: &str, categories: &[Token]) -> Option<Vec<NodeHandle>> {
        {
            let mut categorized = self.categorized.lock();
            categorized.insert(prim.to_string());
        }
        let lights = self.lights.read();
        if lights.values().all(|l| l.collection.is_none()) {
            return None;
        }
        Some(
            lights
                .values()
                .filter(|l| l.collection.as_ref().is_none_or(|c| categories.contains(c)))
                .map(|l| l.node)
                .collect(),
        )
    }

    /// Drops `prim` from every tracking table.
    pub fn release_prim(&self, prim: &str) {
        self.track_material_use(prim, &[]);
        self.render_tags.lock().remove(prim);
        self.categorized.lock().remove(prim);
        self.unregister_light(prim);
        self.tracker.forget(prim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::load_default_catalog, error::DiagnosticKind, sync::RenderParam};

    fn context() -> RenderContext {
        RenderContext::new(
            TranslatorConfig::default(),
            Arc::new(load_default_catalog().unwrap()),
            Arc::new(RenderParam::new([0.0, 0.0], 24.0)),
            Arc::new(ChangeTracker::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_fallback_surface_reads_display_color() {
        let cx = context();
        let u = cx.universe();
        assert_eq!(u.entry_name(cx.fallback_surface()).as_deref(), Some("standard_surface"));
        assert_eq!(u.entry_name(cx.fallback_volume()).as_deref(), Some("standard_volume"));
        let link = u.link_of(cx.fallback_surface(), "base_color").unwrap();
        assert_eq!(
            u.param(link.source, "attribute"),
            Some(ParamValue::String("displayColor".into()))
        );
    }

    #[test]
    fn test_material_users_follow_rebinding() {
        let cx = context();
        cx.track_material_use("/a", &["/mat1".to_string()]);
        cx.track_material_use("/b", &["/mat1".to_string()]);
        cx.track_material_use("/a", &["/mat2".to_string()]);
        assert_eq!(cx.material_users("/mat1"), vec!["/b".to_string()]);
        cx.dirty_material_users("/mat2");
        assert_eq!(cx.tracker().dirty_bits("/a"), DirtyBits::MATERIAL_ID);
        cx.release_prim("/a");
        assert!(cx.material_users("/mat2").is_empty());
    }

    #[test]
    fn test_render_tags_disable_inactive_nodes() {
        let cx = context();
        let node = cx.universe().create_node("polymesh", "/guide").unwrap();
        cx.track_render_tag("/guide", Token::new("guide"), vec![node]);
        assert!(cx.universe().is_disabled(node));
        cx.set_active_render_tags(&["geometry", "guide"]);
        assert!(!cx.universe().is_disabled(node));
    }

    #[test]
    fn test_stale_tagged_node_is_reported() {
        let cx = context();
        let node = cx.universe().create_node("polymesh", "/guide").unwrap();
        cx.universe().destroy_node(node);
        cx.track_render_tag("/guide", Token::new("guide"), vec![node]);
        assert_eq!(cx.diagnostics().count(DiagnosticKind::MissingDependency), 1);
        cx.set_active_render_tags(&["guide"]);
        let reported = cx.diagnostics().entries().into_iter().filter(|e| e.prim == "/guide").count();
        assert_eq!(reported, 2);
    }

    #[test]
    fn test_light_groups() {
        let cx = context();
        let key = cx.universe().create_node("distant_light", "/key").unwrap();
        let rim = cx.universe().create_node("point_light", "/rim").unwrap();
        cx.register_light("/key", key, None);
        assert_eq!(cx.light_group_for("/shape", &[]), None);

        cx.register_light("/rim", rim, Some(Token::new("rimLink")));
        assert_eq!(cx.tracker().dirty_bits("/shape"), DirtyBits::CATEGORIES);
        assert_eq!(cx.light_group_for("/shape", &[]), Some(vec![key]));
        assert_eq!(
            cx.light_group_for("/shape", &[Token::new("rimLink")]),
            Some(vec![key, rim])
        );
    }
}
