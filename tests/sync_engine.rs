use std::sync::Arc;

use node_forge_scene_sync::{
    ChangeTracker, DiagnosticKind, MemoryScene, NodeHandle, ParamValue, RenderContext, RenderParam,
    SyncEngine, TranslatorConfig, Value, load_default_catalog,
    marshal::{Role, primvar::Interpolation},
    prims::{LightType, PrimKind},
    scene::{CurveTopology, MeshTopology, VolumeField},
    shader_graph::MaterialNetwork,
    sync::{DirtyBits, SyncStep},
    value::{AssetPath, Token},
};

struct Harness {
    scene: MemoryScene,
    engine: SyncEngine,
    render: Arc<RenderParam>,
}

fn harness_with_shutter(shutter: [f32; 2]) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let tracker = Arc::new(ChangeTracker::new());
    let render = Arc::new(RenderParam::new(shutter, 24.0));
    let context = RenderContext::new(
        TranslatorConfig::default(),
        Arc::new(load_default_catalog().unwrap()),
        render.clone(),
        tracker.clone(),
    )
    .unwrap();
    Harness {
        scene: MemoryScene::new(tracker),
        engine: SyncEngine::new(context),
        render,
    }
}

fn harness() -> Harness {
    harness_with_shutter([0.0, 0.0])
}

fn quad(scene: &mut MemoryScene, id: &str) {
    scene.set_mesh_topology(
        id,
        MeshTopology {
            face_vertex_counts: vec![4],
            face_vertex_indices: vec![0, 1, 2, 3],
            ..Default::default()
        },
    );
    scene.set_primvar(
        id,
        "points",
        Value::from(vec![[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]]),
        Interpolation::Vertex,
        Role::Point,
    );
}

fn surface_network(node_type: &str) -> MaterialNetwork {
    let mut network = MaterialNetwork::new();
    network
        .add_node("/mat/surf", node_type, [("base_color", Value::from([1.0f32, 0.0, 0.0]))])
        .set_terminal("surface", "/mat/surf");
    network
}

impl Harness {
    fn node(&self, id: &str) -> NodeHandle {
        self.engine.record(id).unwrap().nodes()[0]
    }

    fn param(&self, id: &str, name: &str) -> ParamValue {
        self.engine.context().universe().param(self.node(id), name).unwrap()
    }

    fn shaders(&self, id: &str) -> Vec<Option<NodeHandle>> {
        self.param(id, "shader").as_array().unwrap().data.as_node().unwrap().to_vec()
    }
}

#[test]
fn test_mesh_first_pass_writes_topology_and_fallback() {
    let mut h = harness();
    quad(&mut h.scene, "/mesh");
    h.engine.insert("/mesh", PrimKind::Mesh).unwrap();

    let reports = h.engine.sync_all(&h.scene);
    assert!(reports["/mesh"].is_clean());
    assert_eq!(h.param("/mesh", "vlist").as_array().unwrap().num_elements, 4);
    assert_eq!(
        h.param("/mesh", "nsides").as_array().unwrap().data.as_uint(),
        Some(&[4u32][..])
    );
    assert_eq!(
        h.param("/mesh", "vidxs").as_array().unwrap().data.as_uint(),
        Some(&[0u32, 1, 2, 3][..])
    );
    let fallback = h.engine.context().fallback_surface();
    assert_eq!(h.shaders("/mesh"), vec![Some(fallback)]);
    // One for creating the record, one for the pass.
    assert_eq!(h.render.interrupt_count(), 2);
    assert!(!h.render.is_paused());
}

#[test]
fn test_insert_and_remove_interrupt_the_render() {
    let mut h = harness();
    let live = h.engine.context().universe().node_count();
    h.engine.insert("/mesh", PrimKind::Mesh).unwrap();
    assert!(h.engine.context().universe().node_count() > live);
    assert_eq!(h.render.interrupt_count(), 1);
    assert!(!h.render.is_paused());

    assert!(h.engine.remove("/mesh"));
    assert_eq!(h.engine.context().universe().node_count(), live);
    assert_eq!(h.render.interrupt_count(), 2);
    assert!(!h.render.is_paused());

    assert!(!h.engine.remove("/mesh"));
    assert_eq!(h.render.interrupt_count(), 2);
}

#[test]
fn test_clean_pass_does_not_interrupt() {
    let mut h = harness();
    quad(&mut h.scene, "/mesh");
    h.engine.insert("/mesh", PrimKind::Mesh).unwrap();
    h.engine.sync_all(&h.scene);
    let interrupts = h.render.interrupt_count();

    let reports = h.engine.sync_all(&h.scene);
    assert!(reports["/mesh"].ran.is_empty());
    assert_eq!(h.render.interrupt_count(), interrupts);
}

#[test]
fn test_primvar_change_only_runs_primvars_and_keeps_builtins_native() {
    let mut h = harness();
    quad(&mut h.scene, "/mesh");
    h.engine.insert("/mesh", PrimKind::Mesh).unwrap();
    h.engine.sync_all(&h.scene);

    for (name, value) in [
        ("temperature", Value::Float(310.0)),
        ("render:matte", Value::Bool(true)),
        ("matte", Value::Bool(true)),
    ] {
        h.scene.set_primvar("/mesh", name, value, Interpolation::Constant, Role::None);
    }
    let reports = h.engine.sync_all(&h.scene);
    assert_eq!(reports["/mesh"].ran, vec![SyncStep::Primvars]);
    assert_eq!(reports["/mesh"].remaining, DirtyBits::empty());

    let universe = h.engine.context().universe();
    let node = h.node("/mesh");
    assert_eq!(universe.param(node, "matte"), Some(ParamValue::Bool(true)));
    assert_eq!(universe.param(node, "temperature"), Some(ParamValue::Float(310.0)));
    assert!(universe.user_param(node, "matte").is_none());
    assert!(universe.user_param(node, "temperature").is_some());
    assert_eq!(h.engine.context().diagnostics().count(DiagnosticKind::BuiltinCollision), 1);
}

#[test]
fn test_forced_pass_runs_every_step_in_order() {
    let mut h = harness();
    quad(&mut h.scene, "/mesh");
    h.engine.insert("/mesh", PrimKind::Mesh).unwrap();
    h.engine.sync_all(&h.scene);

    let report = h.engine.sync("/mesh", &h.scene, true).unwrap();
    assert_eq!(report.ran, SyncStep::ORDER.to_vec());
    assert!(report.remaining.is_empty());
}

#[test]
fn test_transform_change_only_runs_transform() {
    let mut h = harness();
    quad(&mut h.scene, "/mesh");
    h.engine.insert("/mesh", PrimKind::Mesh).unwrap();
    h.engine.sync_all(&h.scene);

    h.scene
        .set_transform("/mesh", glam::DMat4::from_translation(glam::DVec3::new(0.0, 2.0, 0.0)));
    let report = h.engine.sync("/mesh", &h.scene, false).unwrap();
    assert_eq!(report.ran, vec![SyncStep::Transform]);
    let matrix = h.param("/mesh", "matrix");
    let matrices = matrix.as_array().unwrap().data.as_matrix().unwrap();
    assert_eq!(matrices[0].w_axis.y, 2.0);
}

#[test]
fn test_material_binds_its_surface_and_withdrawal_falls_back() {
    let mut h = harness();
    quad(&mut h.scene, "/mesh");
    h.scene.set_material_id("/mesh", Some("/mat"));
    h.scene.set_material_network("/mat", surface_network("standard_surface"));
    h.engine.insert("/mat", PrimKind::Material).unwrap();
    h.engine.insert("/mesh", PrimKind::Mesh).unwrap();

    h.engine.sync_all(&h.scene);
    let universe = h.engine.context().universe();
    let surf = universe.find_by_name("/mat:/mat/surf").unwrap();
    assert_eq!(h.shaders("/mesh"), vec![Some(surf)]);
    assert_eq!(
        universe.param(surf, "base_color"),
        Some(ParamValue::Rgb([1.0, 0.0, 0.0]))
    );

    assert!(h.engine.remove("/mat"));
    assert!(!h.engine.context().universe().contains(surf));
    h.engine.sync_all(&h.scene);
    let fallback = h.engine.context().fallback_surface();
    assert_eq!(h.shaders("/mesh"), vec![Some(fallback)]);
    assert!(h.engine.context().diagnostics().count(DiagnosticKind::MissingDependency) >= 1);
}

#[test]
fn test_failed_material_keeps_its_bits_and_previous_graph() {
    let mut h = harness();
    h.scene.set_material_network("/mat", surface_network("standard_surface"));
    h.engine.insert("/mat", PrimKind::Material).unwrap();
    h.engine.sync_all(&h.scene);
    let published = h.engine.context().material_terminals("/mat").unwrap();
    assert!(published.surface.is_some());

    // The terminal path now names a type the renderer lacks, so the old
    // node stays a terminal while going stale.
    h.scene.set_material_network("/mat", surface_network("no_such_shader"));
    let reports = h.engine.sync_all(&h.scene);
    let report = &reports["/mat"];
    assert_eq!(report.failed, vec![SyncStep::Material]);
    assert!(report.remaining.contains(DirtyBits::RESOURCE));
    let diagnostics = h.engine.context().diagnostics();
    assert_eq!(diagnostics.count(DiagnosticKind::IdentityConflict), 1);
    assert_eq!(h.engine.context().material_terminals("/mat"), Some(published));
}

#[test]
fn test_light_linking_builds_light_groups() {
    let mut h = harness();
    h.scene.set_attribute("/key", "collection:lightLink", Value::from("hero"));
    h.scene.set_attribute("/key", "intensity", Value::Float(4.0));
    h.scene.set_attribute("/fill", "intensity", Value::Float(0.5));
    h.scene.set_categories("/hero", &["hero"]);
    h.scene.set_categories("/extra", &[]);
    h.engine.insert("/key", PrimKind::Light(LightType::Sphere)).unwrap();
    h.engine.insert("/fill", PrimKind::Light(LightType::Distant)).unwrap();
    h.engine.insert("/hero", PrimKind::Mesh).unwrap();
    h.engine.insert("/extra", PrimKind::Mesh).unwrap();

    h.engine.sync_all(&h.scene);
    h.engine.sync_all(&h.scene);

    let key = h.node("/key");
    let fill = h.node("/fill");
    assert_eq!(h.param("/key", "intensity"), ParamValue::Float(4.0));
    let group = |id: &str| {
        let mut nodes: Vec<NodeHandle> = h
            .param(id, "light_group")
            .as_array()
            .unwrap()
            .data
            .as_node()
            .unwrap()
            .iter()
            .flatten()
            .copied()
            .collect();
        nodes.sort();
        nodes
    };
    let mut both = vec![key, fill];
    both.sort();
    assert_eq!(group("/hero"), both);
    assert_eq!(group("/extra"), vec![fill]);
    assert_eq!(h.param("/extra", "use_light_group"), ParamValue::Bool(true));
}

#[test]
fn test_inactive_render_tags_disable_nodes() {
    let mut h = harness();
    quad(&mut h.scene, "/geo");
    quad(&mut h.scene, "/proxy");
    h.scene.set_render_tag("/proxy", "proxy");
    h.engine.insert("/geo", PrimKind::Mesh).unwrap();
    h.engine.insert("/proxy", PrimKind::Mesh).unwrap();
    h.engine.sync_all(&h.scene);

    let universe = h.engine.context().universe();
    assert!(!universe.is_disabled(h.node("/geo")));
    assert!(universe.is_disabled(h.node("/proxy")));

    h.engine.context().set_active_render_tags(&["proxy"]);
    assert!(universe.is_disabled(h.node("/geo")));
    assert!(!universe.is_disabled(h.node("/proxy")));
}

#[test]
fn test_instanced_prototype_is_hidden_behind_its_instancer() {
    let mut h = harness();
    quad(&mut h.scene, "/proto");
    h.scene.set_instance_indices("/inst", "/proto", vec![0, 1]);
    h.scene.set_primvar(
        "/inst",
        "instanceTranslations",
        Value::from(vec![[1.0f32, 0.0, 0.0], [0.0, 2.0, 0.0]]),
        Interpolation::Instance,
        Role::None,
    );
    h.scene.set_instancer("/proto", Some("/inst"));
    h.engine.insert("/proto", PrimKind::Mesh).unwrap();
    h.engine.sync_all(&h.scene);

    let record = h.engine.record("/proto").unwrap();
    let nodes = record.nodes();
    assert_eq!(nodes.len(), 2);
    let universe = h.engine.context().universe();
    assert_eq!(h.param("/proto", "visibility"), ParamValue::Byte(0));
    let placed = universe.param(nodes[1], "nodes").unwrap();
    assert_eq!(placed.as_array().unwrap().data.as_node(), Some(&[Some(nodes[0])][..]));
    let idxs = universe.param(nodes[1], "node_idxs").unwrap();
    assert_eq!(idxs.as_array().unwrap().num_elements, 2);

    h.scene.set_instancer("/proto", None);
    h.engine.sync_all(&h.scene);
    assert_eq!(h.engine.record("/proto").unwrap().nodes().len(), 1);
    assert!(!h.engine.context().universe().contains(nodes[1]));
    assert_ne!(h.param("/proto", "visibility"), ParamValue::Byte(0));
}

#[test]
fn test_nested_instancers_hide_the_inner_level() {
    let mut h = harness();
    quad(&mut h.scene, "/proto");
    h.scene.set_primvar(
        "/proto",
        "render:visibility:shadow",
        Value::Bool(false),
        Interpolation::Constant,
        Role::None,
    );
    h.scene.set_instance_indices("/inner", "/proto", vec![0, 1]);
    h.scene.set_primvar(
        "/inner",
        "render:visibility:camera",
        Value::from(vec![true, false]),
        Interpolation::Instance,
        Role::None,
    );
    h.scene.set_instance_indices("/outer", "/inner", vec![0, 1, 2]);
    h.scene.set_instancer("/inner", Some("/outer"));
    h.scene.set_instancer("/proto", Some("/inner"));
    h.engine.insert("/proto", PrimKind::Mesh).unwrap();
    h.engine.sync_all(&h.scene);

    let nodes = h.engine.record("/proto").unwrap().nodes().to_vec();
    assert_eq!(nodes.len(), 3);
    let universe = h.engine.context().universe();
    let (inner, outer) = (nodes[1], nodes[2]);
    assert_eq!(universe.param(inner, "visibility"), Some(ParamValue::Byte(0)));
    assert_ne!(universe.param(outer, "visibility"), Some(ParamValue::Byte(0)));
    let placed = universe.param(outer, "nodes").unwrap();
    assert_eq!(placed.as_array().unwrap().data.as_node(), Some(&[Some(inner)][..]));

    let all = 0xffu8;
    let shadow = 1u8 << 1;
    let camera = 1u8 << 0;
    let inner_visibility = universe.param(inner, "instance_visibility").unwrap();
    assert_eq!(
        inner_visibility.as_array().unwrap().data.as_byte(),
        Some(&[all & !shadow, all & !shadow & !camera][..])
    );
    let outer_visibility = universe.param(outer, "instance_visibility").unwrap();
    assert_eq!(outer_visibility.as_array().unwrap().data.as_byte(), Some(&[all; 3][..]));
}

#[test]
fn test_velocities_produce_position_keys_across_the_shutter() {
    let mut h = harness_with_shutter([-0.25, 0.25]);
    h.scene.set_primvar(
        "/cloud",
        "points",
        Value::from(vec![[0.0f32, 0.0, 0.0]]),
        Interpolation::Vertex,
        Role::Point,
    );
    h.scene.set_primvar(
        "/cloud",
        "velocities",
        Value::from(vec![[24.0f32, 0.0, 0.0]]),
        Interpolation::Vertex,
        Role::Vector,
    );
    h.engine.insert("/cloud", PrimKind::Points).unwrap();
    h.engine.sync_all(&h.scene);

    let points = h.param("/cloud", "points");
    let array = points.as_array().unwrap();
    assert_eq!(array.num_keys, 3);
    let first = array.key(0).unwrap();
    let last = array.key(2).unwrap();
    assert!((first.as_vector().unwrap()[0][0] + 0.25).abs() < 1e-5);
    assert!((last.as_vector().unwrap()[0][0] - 0.25).abs() < 1e-5);
    assert_eq!(h.param("/cloud", "motion_start"), ParamValue::Float(-0.25));
    assert_eq!(h.param("/cloud", "motion_end"), ParamValue::Float(0.25));
    // Points without widths get the default radius.
    assert_eq!(
        h.param("/cloud", "radius").as_array().unwrap().data.as_float(),
        Some(&[0.5f32][..])
    );
}

#[test]
fn test_curves_translate_basis_counts_and_radius() {
    let mut h = harness();
    h.scene.set_curve_topology(
        "/hair",
        CurveTopology {
            curve_type: Token::new("cubic"),
            basis: Token::new("bspline"),
            vertex_counts: vec![4],
        },
    );
    h.scene.set_primvar(
        "/hair",
        "points",
        Value::from(vec![[0.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 2.0, 0.0], [0.0, 3.0, 0.0]]),
        Interpolation::Vertex,
        Role::Point,
    );
    h.scene.set_primvar(
        "/hair",
        "widths",
        Value::from(vec![0.5f32; 4]),
        Interpolation::Vertex,
        Role::None,
    );
    h.engine.insert("/hair", PrimKind::Curves).unwrap();
    h.engine.sync_all(&h.scene);

    assert_eq!(h.param("/hair", "basis"), ParamValue::String("b-spline".into()));
    assert_eq!(
        h.param("/hair", "num_points").as_array().unwrap().data.as_uint(),
        Some(&[4u32][..])
    );
    assert_eq!(
        h.param("/hair", "radius").as_array().unwrap().data.as_float(),
        Some(&[0.25f32; 4][..])
    );
}

#[test]
fn test_volume_without_a_resolved_file_uses_the_fallback_shader() {
    let mut h = harness();
    h.scene.set_volume_fields(
        "/smoke",
        vec![VolumeField {
            name: Token::new("density"),
            file: Some(AssetPath::new("missing.vdb")),
        }],
    );
    h.engine.insert("/smoke", PrimKind::Volume).unwrap();
    h.engine.sync_all(&h.scene);

    let fallback = h.engine.context().fallback_volume();
    assert_eq!(h.shaders("/smoke"), vec![Some(fallback)]);
    assert_eq!(
        h.param("/smoke", "grids").as_array().unwrap().data.as_string(),
        Some(&["density".to_string()][..])
    );
    let universe = h.engine.context().universe();
    assert!(!universe.is_param_set(h.node("/smoke"), "filename"));
    assert!(h.engine.context().diagnostics().count(DiagnosticKind::MissingDependency) >= 1);

    h.scene.set_volume_fields(
        "/smoke",
        vec![VolumeField {
            name: Token::new("density"),
            file: Some(AssetPath::with_resolved("smoke.vdb", "/cache/smoke.vdb")),
        }],
    );
    h.engine.sync_all(&h.scene);
    assert_eq!(h.param("/smoke", "filename"), ParamValue::String("/cache/smoke.vdb".into()));
}

#[test]
fn test_native_prims_take_render_attributes() {
    let mut h = harness();
    h.scene.set_attribute("/flat", "render:color", Value::from([0.5f32, 0.25, 1.0]));
    assert!(h.engine.insert_typed("/flat", "flat").unwrap());
    assert!(!h.engine.insert_typed("/cam", "Camera").unwrap());
    h.engine.sync_all(&h.scene);

    assert_eq!(h.param("/flat", "color"), ParamValue::Rgb([0.5, 0.25, 1.0]));
    assert_eq!(h.engine.len(), 1);
}

#[test]
fn test_remove_releases_owned_nodes() {
    let mut h = harness();
    quad(&mut h.scene, "/mesh");
    h.engine.insert("/mesh", PrimKind::Mesh).unwrap();
    h.engine.sync_all(&h.scene);
    let node = h.node("/mesh");
    let live = h.engine.context().universe().stats().live;

    assert!(h.engine.remove("/mesh"));
    let universe = h.engine.context().universe();
    assert!(!universe.contains(node));
    assert_eq!(universe.stats().live, live - 1);
    assert!(universe.contains(h.engine.context().fallback_surface()));
    assert!(!h.engine.remove("/mesh"));
}
