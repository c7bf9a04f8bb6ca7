//! Skinning Tests
//!
//! Tests for:
//! - The skin validity gate and its fallback to static export
//! - Root skeleton discovery from the joint set
//! - Inverse bind matrices relative to the skin root
//! - World-scale baking of skinned vertex data
//! - Joint markers on bone nodes

use glam::{Mat4, Vec2, Vec3};

use sceneforge::document::AccessorData;
use sceneforge::{
    BoneInfluence, CompileJob, ExportSettings, ExportWarning, MaterialData, MeshData,
    MeshRenderer, SkinBinding, SourceScene, SourceTransform,
};

const EPSILON: f32 = 1e-5;

fn approx_mat4(a: Mat4, b: Mat4) -> bool {
    a.to_cols_array()
        .iter()
        .zip(b.to_cols_array().iter())
        .all(|(x, y)| (x - y).abs() < EPSILON)
}

// ============================================================================
// Fixtures
// ============================================================================

fn skinned_mesh(name: &str) -> MeshData {
    let mut mesh = MeshData::new(name);
    mesh.positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
    mesh.normals = vec![Vec3::Z; 3];
    mesh.uv[0] = vec![Vec2::ZERO, Vec2::X, Vec2::Y];
    mesh.influences = vec![
        BoneInfluence { joints: [0, 1, 0, 0], weights: [0.7, 0.3, 0.0, 0.0] };
        3
    ];
    mesh.bind_poses = vec![Mat4::IDENTITY, Mat4::IDENTITY];
    mesh.submeshes = vec![vec![0, 1, 2]];
    mesh
}

/// hip → knee bone chain plus a skinned "body" transform.
fn rigged_scene(binding: SkinBinding) -> SourceScene {
    let mut scene = SourceScene::new();
    scene.add_mesh(skinned_mesh("bodymesh"));
    scene.add_material(MaterialData::new("skinmat", "Standard"));

    let mut hip = SourceTransform::new("hip");
    hip.translation = Vec3::new(0.0, 1.0, 0.0);
    scene.add_transform(hip);

    let mut knee = SourceTransform::new("knee");
    knee.parent = Some("hip".to_owned());
    knee.translation = Vec3::new(0.0, 0.5, 0.0);
    scene.add_transform(knee);

    let mut body = SourceTransform::new("body");
    let mut r = MeshRenderer::new("bodymesh");
    r.materials.push("skinmat".to_owned());
    r.skin = Some(binding);
    body.renderer = Some(r);
    scene.add_transform(body);
    scene
}

fn full_binding() -> SkinBinding {
    SkinBinding {
        bones: vec!["hip".to_owned(), "knee".to_owned()],
        root_bone: Some("hip".to_owned()),
    }
}

fn all() -> Vec<String> {
    vec!["body".to_owned(), "hip".to_owned(), "knee".to_owned()]
}

// ============================================================================
// Valid skins
// ============================================================================

#[test]
fn valid_skin_compiles_fully() {
    let scene = rigged_scene(full_binding());
    let job = CompileJob::new(&scene, &all(), ExportSettings::default());
    let (doc, report) = job.finish().unwrap();
    assert!(report.is_clean(), "unexpected warnings: {:?}", report.warnings());

    assert_eq!(doc.skins.len(), 1);
    let skin = doc.skins.get(0).unwrap();
    assert_eq!(skin.joint_names, ["hip", "knee"]);
    assert_eq!(skin.root_names, ["hip"]);

    let body = doc.nodes.get(doc.nodes.index_of("body").unwrap()).unwrap();
    assert_eq!(body.skin, Some(0));
    assert_eq!(body.skeletons, ["hip"]);
    assert_eq!(
        body.skeleton_indices,
        [doc.nodes.index_of("hip").unwrap()]
    );

    // The primitive carries joint and weight accessors.
    let mesh = doc.meshes.get(body.mesh.unwrap()).unwrap();
    let attrs = &mesh.primitives[0].attributes;
    assert!(attrs.joints.is_some());
    assert!(attrs.weights.is_some());
}

#[test]
fn inverse_bind_matrices_are_root_relative() {
    let scene = rigged_scene(full_binding());
    let job = CompileJob::new(&scene, &all(), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    let skin = doc.skins.get(0).unwrap();
    let accessor = doc.accessors.get(skin.inverse_bind_matrices).unwrap();
    let AccessorData::Mat4(ibm) = &accessor.data else {
        panic!("expected a mat4 accessor");
    };
    assert_eq!(ibm.len(), 2);
    // hip is the root: identity. knee sits 0.5 above the root, so its
    // inverse bind matrix translates back down.
    assert!(approx_mat4(ibm[0], Mat4::IDENTITY));
    assert!(approx_mat4(ibm[1], Mat4::from_translation(Vec3::new(0.0, -0.5, 0.0))));
}

#[test]
fn joint_nodes_carry_their_joint_marker() {
    let scene = rigged_scene(full_binding());
    let job = CompileJob::new(&scene, &all(), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    for bone in ["hip", "knee"] {
        let node = doc.nodes.get(doc.nodes.index_of(bone).unwrap()).unwrap();
        assert_eq!(node.joint_name.as_deref(), Some(bone), "missing marker on {bone}");
    }
    let body = doc.nodes.get(doc.nodes.index_of("body").unwrap()).unwrap();
    assert_eq!(body.joint_name, None);
}

#[test]
fn world_scale_is_baked_out_of_skinned_vertices() {
    let mut scene = rigged_scene(full_binding());
    // Rebuild "body" with a uniform scale of 2.
    let mut scene2 = SourceScene::new();
    scene2.add_mesh(skinned_mesh("bodymesh"));
    scene2.add_material(MaterialData::new("skinmat", "Standard"));
    for tr in scene.transforms() {
        let mut tr = tr.clone();
        tr.children.clear();
        if tr.name == "body" {
            tr.scale = Vec3::splat(2.0);
        }
        scene2.add_transform(tr);
    }
    scene = scene2;

    let job = CompileJob::new(&scene, &all(), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    // Baked meshes are renamed per node, so the accessor key includes it.
    let idx = doc.accessors.index_of("accessor_bodymesh_body_position").unwrap();
    let AccessorData::Vec3(positions) = &doc.accessors.get(idx).unwrap().data else {
        panic!("expected vec3 positions");
    };
    // (1, 0, 0) divided by the world scale of 2.
    assert!((positions[1] - Vec3::new(0.5, 0.0, 0.0)).abs().max_element() < EPSILON);
}

#[test]
fn baked_meshes_do_not_clobber_shared_static_geometry() {
    // One source mesh used both by a plain renderer and by a scaled,
    // skinned renderer. The bake must land in its own mesh entry.
    let mut scene = SourceScene::new();
    scene.add_mesh(skinned_mesh("bodymesh"));
    scene.add_material(MaterialData::new("skinmat", "Standard"));

    let mut hip = SourceTransform::new("hip");
    hip.translation = Vec3::new(0.0, 1.0, 0.0);
    scene.add_transform(hip);
    let mut knee = SourceTransform::new("knee");
    knee.parent = Some("hip".to_owned());
    knee.translation = Vec3::new(0.0, 0.5, 0.0);
    scene.add_transform(knee);

    let mut body = SourceTransform::new("body");
    body.scale = Vec3::splat(2.0);
    let mut r = MeshRenderer::new("bodymesh");
    r.materials.push("skinmat".to_owned());
    r.skin = Some(full_binding());
    body.renderer = Some(r);
    scene.add_transform(body);

    let mut statue = SourceTransform::new("statue");
    let mut r = MeshRenderer::new("bodymesh");
    r.materials.push("skinmat".to_owned());
    statue.renderer = Some(r);
    scene.add_transform(statue);

    let selection: Vec<String> = ["body", "hip", "knee", "statue"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();
    let job = CompileJob::new(&scene, &selection, ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    assert_eq!(doc.meshes.len(), 2);
    let body = doc.nodes.get(doc.nodes.index_of("body").unwrap()).unwrap();
    let statue = doc.nodes.get(doc.nodes.index_of("statue").unwrap()).unwrap();
    assert_ne!(body.mesh, statue.mesh);

    // The static copy keeps its unscaled vertices.
    let idx = doc.accessors.index_of("accessor_bodymesh_position").unwrap();
    let AccessorData::Vec3(positions) = &doc.accessors.get(idx).unwrap().data else {
        panic!("expected vec3 positions");
    };
    assert!((positions[1] - Vec3::new(1.0, 0.0, 0.0)).abs().max_element() < EPSILON);

    // The baked copy carries the scale-corrected vertices.
    let idx = doc.accessors.index_of("accessor_bodymesh_body_position").unwrap();
    let AccessorData::Vec3(baked) = &doc.accessors.get(idx).unwrap().data else {
        panic!("expected vec3 positions");
    };
    assert!((baked[1] - Vec3::new(0.5, 0.0, 0.0)).abs().max_element() < EPSILON);

    // Skin accessors only on the skinned primitive.
    let baked_mesh = doc.meshes.get(body.mesh.unwrap()).unwrap();
    assert!(baked_mesh.primitives[0].attributes.joints.is_some());
    let static_mesh = doc.meshes.get(statue.mesh.unwrap()).unwrap();
    assert!(static_mesh.primitives[0].attributes.joints.is_none());
}

// ============================================================================
// The validity gate
// ============================================================================

#[test]
fn bones_outside_the_selection_drop_the_skin() {
    let scene = rigged_scene(full_binding());
    // "knee" is not selected.
    let selection = vec!["body".to_owned(), "hip".to_owned()];
    let job = CompileJob::new(&scene, &selection, ExportSettings::default());
    let (doc, report) = job.finish().unwrap();

    assert!(report.has_warning(|w| matches!(
        w,
        ExportWarning::SkinBonesOutsideSelection { bones, .. } if bones == &["knee".to_owned()]
    )));
    assert!(doc.skins.is_empty());

    // The mesh still exports, as static geometry.
    let body = doc.nodes.get(doc.nodes.index_of("body").unwrap()).unwrap();
    assert!(body.skin.is_none());
    let mesh = doc.meshes.get(body.mesh.unwrap()).unwrap();
    assert!(mesh.primitives[0].attributes.joints.is_none());
}

#[test]
fn missing_root_bone_drops_the_skin() {
    let binding = SkinBinding {
        bones: vec!["hip".to_owned(), "knee".to_owned()],
        root_bone: None,
    };
    let scene = rigged_scene(binding);
    let job = CompileJob::new(&scene, &all(), ExportSettings::default());
    let (doc, report) = job.finish().unwrap();

    assert!(report.has_warning(|w| matches!(w, ExportWarning::SkinRootBoneMissing { .. })));
    assert!(doc.skins.is_empty());
    assert!(!doc.meshes.is_empty());
}

#[test]
fn root_skeletons_are_joints_with_unselected_parents() {
    // Two disjoint chains in one binding: both chain roots are skeletons.
    let mut scene = SourceScene::new();
    scene.add_mesh(skinned_mesh("bodymesh"));
    scene.add_material(MaterialData::new("skinmat", "Standard"));

    scene.add_transform(SourceTransform::new("spine"));
    let mut arm = SourceTransform::new("arm");
    arm.parent = Some("spine".to_owned());
    scene.add_transform(arm);
    scene.add_transform(SourceTransform::new("tail"));

    let mut body = SourceTransform::new("body");
    let mut r = MeshRenderer::new("bodymesh");
    r.materials.push("skinmat".to_owned());
    r.skin = Some(SkinBinding {
        bones: vec!["arm".to_owned(), "spine".to_owned(), "tail".to_owned()],
        root_bone: Some("spine".to_owned()),
    });
    body.renderer = Some(r);
    scene.add_transform(body);

    let selection: Vec<String> = ["body", "spine", "arm", "tail"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();
    let job = CompileJob::new(&scene, &selection, ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    let skin = doc.skins.get(0).unwrap();
    assert_eq!(skin.root_names, ["spine", "tail"]);
}

#[test]
fn bind_shape_matrix_is_the_converted_local_transform() {
    let scene = rigged_scene(full_binding());
    let job = CompileJob::new(&scene, &all(), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    // "body" sits at the origin with identity rotation and unit scale.
    let skin = doc.skins.get(0).unwrap();
    assert!(approx_mat4(skin.bind_shape_matrix, Mat4::IDENTITY));
}
