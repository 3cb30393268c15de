use std::sync::Arc;

use node_forge_scene_sync::{
    Diagnostics, ParamValue, RenderUniverse, Value, load_default_catalog,
    marshal::{
        NodeWriter,
        convert::to_float,
        indices::{generate_vertex_idxs, reverse_winding, vertex_count_sum},
    },
};
use half::f16;
use proptest::prelude::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn universe() -> RenderUniverse {
    RenderUniverse::new(Arc::new(load_default_catalog().unwrap()))
}

fn finite_f32() -> impl Strategy<Value = f32> {
    -1.0e6f32..1.0e6f32
}

/// Face counts together with an index buffer covering exactly those faces.
fn faces() -> impl Strategy<Value = (Vec<i32>, Vec<u32>)> {
    prop::collection::vec(0i32..6, 0..12).prop_flat_map(|counts| {
        let total = vertex_count_sum(&counts);
        (Just(counts), prop::collection::vec(0u32..64, total))
    })
}

proptest! {
    #[test]
    fn test_writing_twice_matches_writing_once(
        ids in prop::collection::vec(0u32..1000, 1..16),
        start in finite_f32(),
    ) {
        init();
        let u = universe();
        let d = Diagnostics::new(true);
        let node = u.create_node("polymesh", "/m").unwrap();
        let w = NodeWriter::new(&u, &d, node, "/m");

        let ids = Value::from(ids);
        let start = Value::Float(start);
        prop_assert!(w.set("vidxs", &ids));
        prop_assert!(w.set("motion_start", &start));
        let once = (u.param(node, "vidxs"), u.param(node, "motion_start"));

        prop_assert!(w.set("vidxs", &ids));
        prop_assert!(w.set("motion_start", &start));
        let twice = (u.param(node, "vidxs"), u.param(node, "motion_start"));
        prop_assert_eq!(once, twice);
        prop_assert!(d.entries().is_empty());
    }

    #[test]
    fn test_scalar_and_single_element_array_write_the_same(x in finite_f32()) {
        let u = universe();
        let d = Diagnostics::new(true);
        let scalar = u.create_node("polymesh", "/a").unwrap();
        let array = u.create_node("polymesh", "/b").unwrap();

        prop_assert!(NodeWriter::new(&u, &d, scalar, "/a").set("motion_end", &Value::Float(x)));
        prop_assert!(NodeWriter::new(&u, &d, array, "/b").set("motion_end", &Value::from(vec![x])));
        prop_assert_eq!(u.param(scalar, "motion_end"), Some(ParamValue::Float(x)));
        prop_assert_eq!(u.param(scalar, "motion_end"), u.param(array, "motion_end"));
    }

    #[test]
    fn test_double_narrowing_matches_cast(x in -1.0e300f64..1.0e300f64) {
        prop_assert_eq!(to_float(&Value::Double(x)), Some(x as f32));
        prop_assert_eq!(to_float(&Value::from(vec![x])), Some(x as f32));
    }

    #[test]
    fn test_half_narrowing_matches_widening(bits in any::<u16>()) {
        let x = f16::from_bits(bits);
        let expected = Some(x.to_f32().to_bits());
        prop_assert_eq!(to_float(&Value::Half(x)).map(f32::to_bits), expected);
        prop_assert_eq!(to_float(&Value::from(vec![x])).map(f32::to_bits), expected);
    }

    #[test]
    fn test_reversal_with_overrunning_faces_undoes_itself(
        counts in prop::collection::vec(-2i32..8, 0..12),
        indices in prop::collection::vec(0u32..64, 0..24),
    ) {
        let reversed = reverse_winding(&indices, &counts);
        prop_assert_eq!(reversed.len(), indices.len());
        prop_assert_eq!(reverse_winding(&reversed, &counts), indices);
    }

    #[test]
    fn test_reversal_keeps_length_and_undoes_itself((counts, indices) in faces()) {
        let reversed = reverse_winding(&indices, &counts);
        prop_assert_eq!(reversed.len(), indices.len());
        prop_assert_eq!(reverse_winding(&reversed, &counts), indices);
    }

    #[test]
    fn test_generated_indices_cover_every_face_vertex(
        counts in prop::collection::vec(-2i32..6, 0..12),
    ) {
        let total = vertex_count_sum(&counts);
        let idxs = generate_vertex_idxs(total, Some(&counts), total).unwrap();
        prop_assert_eq!(idxs.len(), total);

        let mut sorted = idxs.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, (0..total as u32).collect::<Vec<_>>());
        prop_assert!(generate_vertex_idxs(total + 1, Some(&counts), total).is_none());
    }
}
