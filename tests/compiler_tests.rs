//! Compile Job Tests
//!
//! Tests for:
//! - End-to-end scene compilation and the correction root node
//! - Transform representation per parentage case
//! - Mesh and accessor deduplication across renderers
//! - Component precedence (camera > light > mesh)
//! - Stepping, progress, cancellation and the empty-export guard
//! - Selection hygiene (unknown names, inactive transforms)

use glam::{Mat4, Vec2, Vec3, Vec4};

use sceneforge::document::{AccessorData, NodeTransform};
use sceneforge::{
    CameraSource, CompileJob, ExportError, ExportSettings, ExportWarning, LightSource,
    LightSourceKind, MaterialData, MeshData, MeshRenderer, PropertyValue, SourceScene,
    SourceTransform, StepOutcome, CORRECTION_NODE_ID,
};

// ============================================================================
// Fixtures
// ============================================================================

fn tri_mesh(name: &str) -> MeshData {
    let mut mesh = MeshData::new(name);
    mesh.positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
    mesh.normals = vec![Vec3::Z; 3];
    mesh.uv[0] = vec![Vec2::ZERO, Vec2::X, Vec2::Y];
    mesh.submeshes = vec![vec![0, 1, 2]];
    mesh
}

fn standard_material(name: &str) -> MaterialData {
    let mut mat = MaterialData::new(name, "Standard");
    mat.set("_Color", PropertyValue::Color(Vec4::ONE));
    mat.set("_Metallic", PropertyValue::Range(0.5));
    mat
}

fn renderer(mesh: &str, material: &str) -> MeshRenderer {
    let mut r = MeshRenderer::new(mesh);
    r.materials.push(material.to_owned());
    r
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

fn two_node_scene() -> SourceScene {
    let mut scene = SourceScene::new();
    scene.add_mesh(tri_mesh("ground"));
    scene.add_mesh(tri_mesh("rock"));
    scene.add_material(standard_material("gray"));

    let mut root = SourceTransform::new("root");
    root.renderer = Some(renderer("ground", "gray"));
    scene.add_transform(root);

    let mut child = SourceTransform::new("child");
    child.parent = Some("root".to_owned());
    child.translation = Vec3::new(0.0, 1.0, 2.0);
    child.renderer = Some(renderer("rock", "gray"));
    scene.add_transform(child);
    scene
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn compiles_a_two_node_scene() {
    let scene = two_node_scene();
    let job = CompileJob::new(&scene, &names(&["root", "child"]), ExportSettings::default());
    let (doc, report) = job.finish().unwrap();

    assert!(report.is_clean(), "unexpected warnings: {:?}", report.warnings());
    assert_eq!(report.processed, 2);

    // Correction node first, then the selection.
    assert_eq!(doc.nodes.len(), 3);
    let correction = doc.nodes.get(0).unwrap();
    assert_eq!(correction.id, CORRECTION_NODE_ID);
    assert_eq!(correction.children, ["root"]);
    assert_eq!(doc.scene_roots, [CORRECTION_NODE_ID]);

    let root = doc.nodes.get(doc.nodes.index_of("root").unwrap()).unwrap();
    assert_eq!(root.children, ["child"]);
    assert!(root.mesh.is_some());

    assert_eq!(doc.meshes.len(), 2);
    assert_eq!(doc.materials.len(), 1);
}

#[test]
fn resolve_fills_child_indices() {
    let scene = two_node_scene();
    let job = CompileJob::new(&scene, &names(&["root", "child"]), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    let correction = doc.nodes.get(0).unwrap();
    let root_idx = doc.nodes.index_of("root").unwrap();
    assert_eq!(correction.child_indices, [root_idx]);

    let root = doc.nodes.get(root_idx).unwrap();
    let child_idx = doc.nodes.index_of("child").unwrap();
    assert_eq!(root.child_indices, [child_idx]);
}

// ============================================================================
// Transform cases
// ============================================================================

#[test]
fn root_node_gets_a_matrix_transform() {
    let scene = two_node_scene();
    let job = CompileJob::new(&scene, &names(&["root", "child"]), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    let root = doc.nodes.get(doc.nodes.index_of("root").unwrap()).unwrap();
    assert!(matches!(root.transform, NodeTransform::Matrix(_)));
}

#[test]
fn child_of_exported_parent_gets_decomposed_components() {
    let scene = two_node_scene();
    let job = CompileJob::new(&scene, &names(&["root", "child"]), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    let child = doc.nodes.get(doc.nodes.index_of("child").unwrap()).unwrap();
    match &child.transform {
        NodeTransform::Decomposed { translation, rotation, scale } => {
            // z negated by the handedness conversion; identity components
            // are omitted.
            assert_eq!(*translation, Some(Vec3::new(0.0, 1.0, -2.0)));
            assert_eq!(*rotation, None);
            assert_eq!(*scale, None);
        }
        NodeTransform::Matrix(_) => panic!("expected decomposed transform"),
    }
}

#[test]
fn child_of_unexported_parent_bakes_the_world_matrix() {
    let mut scene = SourceScene::new();
    scene.add_mesh(tri_mesh("rock"));
    scene.add_material(standard_material("gray"));

    let mut root = SourceTransform::new("root");
    root.translation = Vec3::new(10.0, 0.0, 0.0);
    scene.add_transform(root);

    let mut child = SourceTransform::new("child");
    child.parent = Some("root".to_owned());
    child.translation = Vec3::new(0.0, 0.0, 5.0);
    child.renderer = Some(renderer("rock", "gray"));
    scene.add_transform(child);

    // Only the child is selected.
    let job = CompileJob::new(&scene, &names(&["child"]), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    let node = doc.nodes.get(doc.nodes.index_of("child").unwrap()).unwrap();
    match node.transform {
        NodeTransform::Matrix(m) => {
            let expected = Mat4::from_translation(Vec3::new(10.0, 0.0, -5.0));
            assert!((m.to_cols_array()
                .iter()
                .zip(expected.to_cols_array().iter())
                .all(|(a, b)| (a - b).abs() < 1e-5)));
        }
        NodeTransform::Decomposed { .. } => panic!("expected baked matrix"),
    }
    // Orphaned nodes hang off the correction root.
    assert_eq!(doc.nodes.get(0).unwrap().children, ["child"]);
}

#[test]
fn children_outside_the_selection_are_dropped() {
    let scene = two_node_scene();
    let job = CompileJob::new(&scene, &names(&["root"]), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    let root = doc.nodes.get(doc.nodes.index_of("root").unwrap()).unwrap();
    assert!(root.children.is_empty());
}

// ============================================================================
// Deduplication
// ============================================================================

#[test]
fn shared_mesh_and_material_compile_once() {
    let mut scene = SourceScene::new();
    scene.add_mesh(tri_mesh("rock"));
    scene.add_material(standard_material("gray"));
    for name in ["a", "b"] {
        let mut tr = SourceTransform::new(name);
        tr.renderer = Some(renderer("rock", "gray"));
        scene.add_transform(tr);
    }

    let job = CompileJob::new(&scene, &names(&["a", "b"]), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    assert_eq!(doc.meshes.len(), 1);
    assert_eq!(doc.materials.len(), 1);
    let a = doc.nodes.get(doc.nodes.index_of("a").unwrap()).unwrap();
    let b = doc.nodes.get(doc.nodes.index_of("b").unwrap()).unwrap();
    assert_eq!(a.mesh, b.mesh);
}

#[test]
fn winding_is_flipped_for_index_accessors() {
    let scene = two_node_scene();
    let job = CompileJob::new(&scene, &names(&["root"]), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    let indices = doc
        .accessors
        .iter()
        .find_map(|a| match &a.data {
            AccessorData::U16(data) => Some(data.clone()),
            _ => None,
        })
        .expect("expected a u16 index accessor");
    assert_eq!(indices, vec![0, 2, 1]);
}

#[test]
fn winding_is_kept_without_conversion() {
    let scene = two_node_scene();
    let settings = ExportSettings { convert_handedness: false, ..Default::default() };
    let job = CompileJob::new(&scene, &names(&["root"]), settings);
    let (doc, _) = job.finish().unwrap();

    let indices = doc
        .accessors
        .iter()
        .find_map(|a| match &a.data {
            AccessorData::U16(data) => Some(data.clone()),
            _ => None,
        })
        .expect("expected a u16 index accessor");
    assert_eq!(indices, vec![0, 1, 2]);
}

// ============================================================================
// Component precedence
// ============================================================================

#[test]
fn camera_wins_over_light_and_mesh() {
    let mut scene = SourceScene::new();
    scene.add_mesh(tri_mesh("rock"));
    scene.add_material(standard_material("gray"));

    let mut tr = SourceTransform::new("rig");
    tr.camera = Some(CameraSource::Perspective { yfov: 1.0, aspect: 1.6, znear: 0.1, zfar: 100.0 });
    tr.light = Some(LightSource { kind: LightSourceKind::Point, color: Vec4::ONE });
    tr.renderer = Some(renderer("rock", "gray"));
    scene.add_transform(tr);

    let mut prop = SourceTransform::new("prop");
    prop.renderer = Some(renderer("rock", "gray"));
    scene.add_transform(prop);

    let job = CompileJob::new(&scene, &names(&["rig", "prop"]), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    let node = doc.nodes.get(doc.nodes.index_of("rig").unwrap()).unwrap();
    assert!(node.camera.is_some());
    assert!(node.light.is_none());
    assert!(node.mesh.is_none());
    assert_eq!(doc.cameras.len(), 1);
    assert!(doc.lights.is_empty());
    // Only the plain prop contributes a mesh.
    assert_eq!(doc.meshes.len(), 1);
}

#[test]
fn area_lights_become_ambient() {
    let mut scene = SourceScene::new();
    scene.add_mesh(tri_mesh("rock"));
    scene.add_material(standard_material("gray"));
    let mut tr = SourceTransform::new("lamp");
    tr.light = Some(LightSource {
        kind: LightSourceKind::Area,
        color: Vec4::new(1.0, 0.5, 0.25, 1.0),
    });
    scene.add_transform(tr);
    let mut prop = SourceTransform::new("prop");
    prop.renderer = Some(renderer("rock", "gray"));
    scene.add_transform(prop);

    let job = CompileJob::new(&scene, &names(&["lamp", "prop"]), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    let light = doc.lights.get(0).unwrap();
    assert_eq!(light.kind, sceneforge::document::LightKind::Ambient);
}

// ============================================================================
// Stepping, cancellation, guards
// ============================================================================

#[test]
fn stepping_reports_progress_per_node() {
    let scene = two_node_scene();
    let mut job = CompileJob::new(&scene, &names(&["root", "child"]), ExportSettings::default());

    match job.step().unwrap() {
        StepOutcome::Working(p) => {
            assert_eq!(p.index, 1);
            assert_eq!(p.total, 2);
            assert_eq!(p.name, "root");
        }
        StepOutcome::Finished => panic!("job finished too early"),
    }
    match job.step().unwrap() {
        StepOutcome::Working(p) => {
            assert_eq!(p.index, 2);
            assert_eq!(p.name, "child");
        }
        StepOutcome::Finished => panic!("job finished too early"),
    }
    assert!(matches!(job.step().unwrap(), StepOutcome::Finished));
}

#[test]
fn cancelled_jobs_refuse_to_finish() {
    let scene = two_node_scene();
    let mut job = CompileJob::new(&scene, &names(&["root", "child"]), ExportSettings::default());
    let _ = job.step().unwrap();
    job.cancel();
    assert!(job.is_cancelled());
    assert!(matches!(job.finish(), Err(ExportError::Cancelled)));
}

#[test]
fn empty_selection_is_an_error() {
    let scene = two_node_scene();
    let job = CompileJob::new(&scene, &[], ExportSettings::default());
    assert!(matches!(job.finish(), Err(ExportError::EmptyExport)));
}

#[test]
fn selection_without_meshes_is_an_error() {
    let mut scene = SourceScene::new();
    let mut tr = SourceTransform::new("lamp");
    tr.light = Some(LightSource { kind: LightSourceKind::Point, color: Vec4::ONE });
    scene.add_transform(tr);

    let job = CompileJob::new(&scene, &names(&["lamp"]), ExportSettings::default());
    assert!(matches!(job.finish(), Err(ExportError::EmptyExport)));
}

#[test]
fn unknown_selection_names_warn_and_drop() {
    let scene = two_node_scene();
    let job = CompileJob::new(&scene, &names(&["root", "ghost"]), ExportSettings::default());
    let (doc, report) = job.finish().unwrap();

    assert_eq!(doc.nodes.len(), 2);
    assert!(report.has_warning(
        |w| matches!(w, ExportWarning::TransformNotFound { name } if name == "ghost")
    ));
}

#[test]
fn inactive_transforms_are_skipped() {
    let mut scene = two_node_scene();
    let mut hidden = SourceTransform::new("hidden");
    hidden.active = false;
    scene.add_transform(hidden);

    let job = CompileJob::new(&scene, &names(&["root", "hidden"]), ExportSettings::default());
    let (doc, report) = job.finish().unwrap();

    assert!(doc.nodes.index_of("hidden").is_none());
    assert_eq!(report.disabled_skipped, 1);
}

#[test]
fn disabled_renderers_keep_the_node_but_no_mesh() {
    let mut scene = SourceScene::new();
    scene.add_mesh(tri_mesh("rock"));
    scene.add_material(standard_material("gray"));
    let mut tr = SourceTransform::new("off");
    let mut r = renderer("rock", "gray");
    r.enabled = false;
    tr.renderer = Some(r);
    scene.add_transform(tr);
    let mut on = SourceTransform::new("on");
    on.renderer = Some(renderer("rock", "gray"));
    scene.add_transform(on);

    let job = CompileJob::new(&scene, &names(&["off", "on"]), ExportSettings::default());
    let (doc, report) = job.finish().unwrap();

    let node = doc.nodes.get(doc.nodes.index_of("off").unwrap()).unwrap();
    assert!(node.mesh.is_none());
    assert_eq!(doc.meshes.len(), 1);
    assert_eq!(report.disabled_skipped, 1);
}

#[test]
fn missing_mesh_warns_and_exports_a_bare_node() {
    let mut scene = SourceScene::new();
    scene.add_mesh(tri_mesh("rock"));
    scene.add_material(standard_material("gray"));
    let mut tr = SourceTransform::new("broken");
    tr.renderer = Some(renderer("nowhere", "gray"));
    scene.add_transform(tr);
    let mut intact = SourceTransform::new("intact");
    intact.renderer = Some(renderer("rock", "gray"));
    scene.add_transform(intact);

    let job = CompileJob::new(&scene, &names(&["broken", "intact"]), ExportSettings::default());
    let (doc, report) = job.finish().unwrap();

    assert!(doc.nodes.index_of("broken").is_some());
    assert!(report.has_warning(
        |w| matches!(w, ExportWarning::MeshNotFound { mesh, .. } if mesh == "nowhere")
    ));
}

// ============================================================================
// Binary payloads
// ============================================================================

#[test]
fn accessor_payloads_cast_to_byte_slices() {
    let scene = two_node_scene();
    let job = CompileJob::new(&scene, &names(&["root"]), ExportSettings::default());
    let (doc, _) = job.finish().unwrap();

    for accessor in doc.accessors.iter() {
        let bytes = accessor.data.as_bytes();
        let expected = match &accessor.data {
            AccessorData::Vec2(v) => v.len() * 8,
            AccessorData::Vec3(v) => v.len() * 12,
            AccessorData::Vec4(v) => v.len() * 16,
            AccessorData::Mat4(v) => v.len() * 64,
            AccessorData::U16(v) => v.len() * 2,
            AccessorData::U32(v) => v.len() * 4,
        };
        assert_eq!(bytes.len(), expected, "accessor {}", accessor.name);
    }
}
