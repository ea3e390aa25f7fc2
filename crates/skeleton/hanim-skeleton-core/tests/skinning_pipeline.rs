use std::f32::consts::FRAC_PI_2;

use hanim_skeleton::{
    Config, DisplacementOrder, Humanoid, JointId, NodeRef, PaletteEntry, SkeletonError,
    VertexSink,
};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn approx_slice(got: &[f32], want: &[f32]) {
    assert_eq!(got.len(), want.len(), "left={got:?} right={want:?}");
    for (g, w) in got.iter().zip(want) {
        approx(*g, *w, 1e-5);
    }
}

/// Two vertices on the x and y axes, both fully bound to one root joint.
fn bound_pair(cfg: Config) -> (Humanoid, JointId) {
    let mut fig = Humanoid::new(cfg);
    fig.set_skin_coord(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 2).unwrap();
    fig.set_skin_normal(&[1.0, 0.0, 0.0, 1.0, 0.0, 0.0], 2).unwrap();

    let root = fig.create_joint(Some("humanoid_root"));
    let mut edit = fig.joint_mut(root).unwrap();
    edit.set_skin_coord_index(&[0, 1], 2).unwrap();
    edit.set_skin_coord_weight(&[1.0, 1.0]).unwrap();
    fig.set_skeleton(&[NodeRef::Joint(root)], 1).unwrap();
    (fig, root)
}

#[test]
fn translation_moves_coords_but_not_normals() {
    let (mut fig, root) = bound_pair(Config::default());
    fig.joint_mut(root)
        .unwrap()
        .set_translation(&[0.0, 0.0, 2.0])
        .unwrap();
    fig.update_skeleton().unwrap();

    approx_slice(fig.output_coords(), &[1.0, 0.0, 2.0, 0.0, 1.0, 2.0]);
    approx_slice(fig.output_normals(), &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    assert_eq!(fig.stats().skinned_vertices, 2);
}

#[test]
fn rotation_turns_coords_and_normals() {
    let (mut fig, root) = bound_pair(Config::default());
    fig.joint_mut(root)
        .unwrap()
        .set_rotation(&[0.0, 0.0, 1.0, FRAC_PI_2])
        .unwrap();
    fig.update_skeleton().unwrap();

    approx_slice(fig.output_coords(), &[0.0, 1.0, 0.0, -1.0, 0.0, 0.0]);
    approx_slice(fig.output_normals(), &[0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
}

#[test]
fn weights_blend_across_joints() {
    let mut fig = Humanoid::new(Config::default());
    fig.set_skin_coord(&[1.0, 0.0, 0.0], 1).unwrap();
    let root = fig.create_joint(None);
    let arm = fig.create_joint(None);

    let mut edit = fig.joint_mut(arm).unwrap();
    edit.set_translation(&[2.0, 0.0, 0.0]).unwrap();
    edit.set_skin_coord_index(&[0], 1).unwrap();
    edit.set_skin_coord_weight(&[0.5]).unwrap();

    let mut edit = fig.joint_mut(root).unwrap();
    edit.set_skin_coord_index(&[0], 1).unwrap();
    edit.set_skin_coord_weight(&[0.5]).unwrap();
    edit.add_child(NodeRef::Joint(arm)).unwrap();

    fig.set_skeleton(&[NodeRef::Joint(root)], 1).unwrap();
    fig.update_skeleton().unwrap();
    approx_slice(fig.output_coords(), &[2.0, 0.0, 0.0]);
}

#[test]
fn unweighted_vertices_follow_config() {
    let mut fig = Humanoid::new(Config {
        pass_through_unweighted: false,
        ..Config::default()
    });
    fig.set_skin_coord(&[1.0, 1.0, 1.0, 2.0, 2.0, 2.0], 2).unwrap();
    let root = fig.create_joint(None);
    let mut edit = fig.joint_mut(root).unwrap();
    edit.set_skin_coord_index(&[0], 1).unwrap();
    edit.set_skin_coord_weight(&[1.0]).unwrap();
    fig.set_skeleton(&[NodeRef::Joint(root)], 1).unwrap();

    fig.update_skeleton().unwrap();
    approx_slice(fig.output_coords(), &[1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn bad_skin_index_fails_without_touching_outputs() {
    let (mut fig, root) = bound_pair(Config::default());
    fig.update_skeleton().unwrap();
    let good = fig.output_coords().clone();

    fig.joint_mut(root)
        .unwrap()
        .set_skin_coord_index(&[0, 5], 2)
        .unwrap();
    fig.joint_mut(root)
        .unwrap()
        .set_translation(&[9.0, 9.0, 9.0])
        .unwrap();

    let err = fig.update_skeleton().unwrap_err();
    match &err {
        SkeletonError::SkinIndexOutOfRange {
            joint,
            index,
            available,
        } => {
            assert_eq!(joint, "humanoid_root");
            assert_eq!(*index, 5);
            assert_eq!(*available, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.category(), "index");
    assert!(err.is_recoverable());
    assert_eq!(fig.output_coords(), &good);
    assert!(fig.is_skeleton_changed());
    assert!(fig.has_child_updates());

    // Growing the skin arrays makes the same index valid; the retry recomputes.
    fig.set_skin_coord(&[0.0; 18], 6).unwrap();
    fig.update_skeleton().unwrap();
    assert_eq!(fig.output_coords().len(), 18);
    approx(fig.output_coords()[15], 9.0, 1e-6);
    assert!(!fig.is_skeleton_changed());
}

#[test]
fn replacing_skin_coords_reskins_on_next_update() {
    let mut fig = Humanoid::new(Config::default());
    fig.set_skin_coord(&[1.0, 0.0, 0.0], 1).unwrap();
    let root = fig.create_joint(None);
    let mut edit = fig.joint_mut(root).unwrap();
    edit.set_skin_coord_index(&[0], 1).unwrap();
    edit.set_skin_coord_weight(&[1.0]).unwrap();
    fig.set_skeleton(&[NodeRef::Joint(root)], 1).unwrap();
    fig.update_skeleton().unwrap();
    approx_slice(fig.output_coords(), &[1.0, 0.0, 0.0]);
    let before = fig.stats();

    fig.set_skin_coord(&[2.0, 0.0, 0.0, 3.0, 0.0, 0.0], 2).unwrap();
    assert!(fig.is_skeleton_changed());
    fig.update_skeleton().unwrap();

    // The unbound second vertex passes through; no matrix was recomposed.
    approx_slice(fig.output_coords(), &[2.0, 0.0, 0.0, 3.0, 0.0, 0.0]);
    assert_eq!(fig.output_coords().len(), fig.num_skin_coord() * 3);
    let after = fig.stats();
    assert_eq!(after.local_recomposes, before.local_recomposes);
    assert_eq!(after.world_recomposes, before.world_recomposes);

    fig.set_skin_coord(&[5.0, 0.0, 0.0], 1).unwrap();
    fig.update_skeleton().unwrap();
    approx_slice(fig.output_coords(), &[5.0, 0.0, 0.0]);
}

#[test]
fn displacer_weight_needs_a_forced_pass() {
    let (mut fig, root) = bound_pair(Config::default());
    let bump = fig.create_displacer(Some("bump"));
    let mut edit = fig.displacer_mut(bump).unwrap();
    edit.set_coord_index(&[0], 1).unwrap();
    edit.set_displacements(&[0.0, 0.0, 1.0], 1).unwrap();
    fig.joint_mut(root).unwrap().add_displacer(bump).unwrap();

    fig.update_skeleton().unwrap();
    approx_slice(&fig.output_coords()[..3], &[1.0, 0.0, 1.0]);

    fig.displacer_mut(bump).unwrap().set_weight(0.0);
    fig.update_skeleton().unwrap();
    approx_slice(&fig.output_coords()[..3], &[1.0, 0.0, 1.0]);

    fig.force_update();
    fig.update_skeleton().unwrap();
    approx_slice(&fig.output_coords()[..3], &[1.0, 0.0, 0.0]);
}

fn segment_with_offset(order: DisplacementOrder, start: usize) -> Humanoid {
    let (mut fig, root) = bound_pair(Config::default());
    fig.joint_mut(root)
        .unwrap()
        .set_rotation(&[0.0, 0.0, 1.0, FRAC_PI_2])
        .unwrap();

    let push = fig.create_displacer(None);
    let mut edit = fig.displacer_mut(push).unwrap();
    edit.set_coord_index(&[0], 1).unwrap();
    edit.set_displacements(&[1.0, 0.0, 0.0], 1).unwrap();

    let seg = fig.create_segment(Some("forearm"));
    let mut edit = fig.segment_mut(seg).unwrap();
    edit.set_coord_range(start, 1).unwrap();
    edit.set_displacement_order(order);
    edit.add_displacer(push).unwrap();
    fig.joint_mut(root)
        .unwrap()
        .add_child(NodeRef::Segment(seg))
        .unwrap();
    fig
}

#[test]
fn segment_displacement_before_transform_is_rotated() {
    let mut fig = segment_with_offset(DisplacementOrder::BeforeTransform, 0);
    fig.update_skeleton().unwrap();
    approx_slice(&fig.output_coords()[..3], &[0.0, 2.0, 0.0]);
}

#[test]
fn segment_displacement_after_transform_is_not_rotated() {
    let mut fig = segment_with_offset(DisplacementOrder::AfterTransform, 0);
    fig.update_skeleton().unwrap();
    approx_slice(&fig.output_coords()[..3], &[1.0, 1.0, 0.0]);
}

#[test]
fn segment_displacer_outside_range_is_inconsistent() {
    let mut fig = segment_with_offset(DisplacementOrder::BeforeTransform, 1);
    let err = fig.update_skeleton().unwrap_err();
    assert!(matches!(err, SkeletonError::InconsistentIndex { .. }));
    assert!(fig.output_coords().is_empty());
}

#[derive(Debug, Default)]
struct RecordingSink {
    data: Vec<f32>,
    prepares: usize,
}

impl VertexSink for RecordingSink {
    fn prepare(&mut self, len: usize) {
        self.prepares += 1;
        self.data.resize(len, 0.0);
    }

    fn write(&mut self, offset: usize, values: &[f32]) {
        self.data[offset..offset + values.len()].copy_from_slice(values);
    }
}

#[test]
fn custom_sinks_receive_one_write_per_pass() {
    let mut fig = Humanoid::with_outputs(
        Config::default(),
        RecordingSink::default(),
        RecordingSink::default(),
    );
    fig.set_skin_coord(&[0.0, 0.0, 0.0], 1).unwrap();
    let root = fig.create_joint(None);
    let mut edit = fig.joint_mut(root).unwrap();
    edit.set_skin_coord_index(&[0], 1).unwrap();
    edit.set_skin_coord_weight(&[1.0]).unwrap();
    edit.set_translation(&[0.0, 3.0, 0.0]).unwrap();
    fig.set_skeleton(&[NodeRef::Joint(root)], 1).unwrap();

    fig.update_skeleton().unwrap();
    fig.update_skeleton().unwrap();
    assert_eq!(fig.output_coords().prepares, 1);
    assert_eq!(fig.output_normals().prepares, 1);
    approx_slice(&fig.output_coords().data, &[0.0, 3.0, 0.0]);
    assert!(fig.output_normals().data.is_empty());
}

#[test]
fn palette_is_ordered_by_object_index() {
    let mut fig = Humanoid::new(Config::default());
    let root = fig.create_joint(Some("humanoid_root"));
    let spine = fig.create_joint(Some("vl5"));
    let neck = fig.create_joint(Some("vc4"));
    fig.joint_mut(spine)
        .unwrap()
        .set_translation(&[0.0, 1.0, 0.0])
        .unwrap();
    fig.joint_mut(neck)
        .unwrap()
        .set_translation(&[0.0, 0.5, 0.0])
        .unwrap();
    fig.joint_mut(spine)
        .unwrap()
        .add_child(NodeRef::Joint(neck))
        .unwrap();
    fig.joint_mut(root)
        .unwrap()
        .add_child(NodeRef::Joint(spine))
        .unwrap();
    fig.set_skeleton(&[NodeRef::Joint(root)], 1).unwrap();
    fig.update_skeleton().unwrap();

    let palette = fig.matrix_palette();
    let names: Vec<_> = palette.iter().map(|p| p.name.as_deref()).collect();
    assert_eq!(names, vec![Some("humanoid_root"), Some("vl5"), Some("vc4")]);
    assert!(palette.windows(2).all(|w| w[0].index < w[1].index));
    // Column-major: translation lives in the last column.
    approx(palette[2].matrix[13], 1.5, 1e-6);
    approx(palette[2].matrix[15], 1.0, 1e-6);

    let json = serde_json::to_string(&palette).unwrap();
    let back: Vec<PaletteEntry> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, palette);
}
