//! Skeletal skin compilation.
//!
//! Emitting a skin requires the renderer to be enabled, every referenced
//! bone to be inside the current selection, and a root bone to be defined;
//! otherwise the skin is dropped with a warning and the mesh still exports
//! as static geometry.

use glam::Mat4;
use rustc_hash::FxHashSet;

use crate::document::{Accessor, Skin};
use crate::host::{MeshData, MeshRenderer, SkinBinding, SourceTransform};
use crate::output::sanitize_name;
use crate::report::ExportWarning;

use super::ExportContext;

/// The skin validity gate. Reports the precise reason for every rejection.
pub(crate) fn skin_is_valid(
    ctx: &mut ExportContext,
    renderer: &MeshRenderer,
    binding: &SkinBinding,
) -> bool {
    if !renderer.enabled {
        return false;
    }

    let unselected: Vec<String> = binding
        .bones
        .iter()
        .filter(|b| !ctx.selection.contains(b.as_str()))
        .cloned()
        .collect();
    if !unselected.is_empty() {
        ctx.report.warn(ExportWarning::SkinBonesOutsideSelection {
            mesh: renderer.mesh.clone(),
            bones: unselected,
        });
        return false;
    }

    if binding.root_bone.is_none() {
        ctx.report.warn(ExportWarning::SkinRootBoneMissing { mesh: renderer.mesh.clone() });
        return false;
    }

    true
}

/// Bakes a skinned mesh into bind-pose-relative vertex data so the
/// geometry is correct independent of the node's own transform: the node's
/// world scale is divided out of positions and normals
/// (`TRS(t, r, world_scale)⁻¹ · TRS(t, r, 1)`). UV channels, bone
/// influences and bind poses survive the bake by plain copy.
pub(crate) fn bake_mesh(ctx: &ExportContext, tr: &SourceTransform, mesh: &MeshData) -> MeshData {
    let world_scale = ctx.scene.world_scale(&tr.name).unwrap_or(tr.scale);
    let scaled = Mat4::from_scale_rotation_translation(world_scale, tr.rotation, tr.translation);
    let unit = Mat4::from_scale_rotation_translation(glam::Vec3::ONE, tr.rotation, tr.translation);
    let correction = scaled.inverse() * unit;

    let mut baked = mesh.clone();
    // Baked vertex data is node-specific; the rename keeps the baked mesh
    // and its accessors from colliding with the shared source mesh.
    baked.name = format!("{}_{}", mesh.name, tr.name);
    if !correction.abs_diff_eq(Mat4::IDENTITY, 1e-6) {
        for p in &mut baked.positions {
            *p = correction.transform_point3(*p);
        }
        for n in &mut baked.normals {
            *n = correction.transform_vector3(*n).normalize_or_zero();
        }
    }
    baked
}

/// Determines the root-skeleton nodes: the joints whose parent lies outside
/// the joint set (walking upward from every joint).
pub(crate) fn find_root_skeletons(ctx: &ExportContext, binding: &SkinBinding) -> Vec<String> {
    let joint_set: FxHashSet<&str> = binding.bones.iter().map(String::as_str).collect();
    let mut roots = Vec::new();
    for bone in &binding.bones {
        let mut current = bone.as_str();
        while let Some(parent) = ctx
            .scene
            .transform(current)
            .and_then(|t| t.parent.as_deref())
            .filter(|p| joint_set.contains(p))
        {
            current = parent;
        }
        if !roots.iter().any(|r| r == current) {
            roots.push(current.to_owned());
        }
    }
    roots
}

/// Builds the skin entity and its inverse-bind-matrix accessor. Returns the
/// skin's registry index together with its root-skeleton names.
pub(crate) fn compile_skin(
    ctx: &mut ExportContext,
    tr: &SourceTransform,
    binding: &SkinBinding,
) -> (usize, Vec<String>) {
    let roots = find_root_skeletons(ctx, binding);
    let root_bone = binding.root_bone.as_deref().unwrap_or_default();
    let skin_name = format!("{}_skeleton_{}", sanitize_name(root_bone), sanitize_name(&tr.name));

    // Inverse bind matrices: invert each joint's bind-time world transform
    // relative to the skin root, in target handedness.
    let root_world = ctx.scene.world_matrix(root_bone).unwrap_or(Mat4::IDENTITY);
    let root_inv = root_world.inverse();
    let ibm: Vec<Mat4> = binding
        .bones
        .iter()
        .map(|bone| {
            let joint_world = ctx.scene.world_matrix(bone).unwrap_or(Mat4::IDENTITY);
            ctx.convert.matrix((root_inv * joint_world).inverse())
        })
        .collect();

    let ibm_name = format!("{skin_name}_invBindMatrices");
    let ibm_accessor =
        ctx.doc.accessors.register_with(&ibm_name, || Accessor::of_mat4(ibm_name.clone(), ibm));

    let bind_shape_matrix = ctx.convert.matrix(tr.local_matrix());
    let skin = Skin {
        name: skin_name.clone(),
        bind_shape_matrix,
        inverse_bind_matrices: ibm_accessor,
        joint_names: binding.bones.clone(),
        root_names: roots.clone(),
    };
    let index = ctx.doc.skins.register(&skin_name, skin);
    (index, roots)
}
