//! Accessor and attribute building.
//!
//! For a given mesh this module produces one accessor per populated
//! semantic (position mandatory; normal, color, up to four UV sets, joints,
//! weights, tangent conditional) and one index accessor per sub-mesh using
//! the narrowest adequate component width. Accessor names derive from the
//! mesh name, so a mesh shared by several nodes registers its accessors
//! exactly once.

use glam::{Vec2, Vec4};

use crate::document::{Accessor, Attributes};
use crate::host::{LightmapBinding, MeshData};
use crate::output::sanitize_name;
use crate::report::ExportWarning;

use super::ExportContext;

fn accessor_name(mesh: &MeshData, semantic: &str) -> String {
    format!("accessor_{}_{semantic}", sanitize_name(&mesh.name))
}

/// Checks a conditional stream against the position stream's length.
/// Mismatched streams are skipped with a warning so the vertex-count
/// invariant holds for every emitted accessor.
fn stream_ok<T>(
    ctx: &mut ExportContext,
    mesh: &MeshData,
    semantic: &'static str,
    stream: &[T],
) -> bool {
    if stream.is_empty() {
        return false;
    }
    let expected = mesh.vertex_count();
    if stream.len() != expected {
        ctx.report.warn(ExportWarning::StreamLengthMismatch {
            mesh: mesh.name.clone(),
            semantic,
            expected,
            actual: stream.len(),
        });
        return false;
    }
    true
}

/// Builds the attribute accessors of one mesh and returns the primitive
/// attribute record. Joint/weight accessors are emitted only for skinned
/// exports (`include_skin`).
pub(crate) fn build_attributes(
    ctx: &mut ExportContext,
    mesh: &MeshData,
    include_skin: bool,
) -> Attributes {
    let convert = ctx.convert;
    let mut attrs = Attributes::default();

    let positions: Vec<_> = mesh.positions.iter().map(|&p| convert.position(p)).collect();
    attrs.position = ctx
        .doc
        .accessors
        .register_with(&accessor_name(mesh, "position"), || {
            Accessor::of_vec3(accessor_name(mesh, "position"), positions)
        });

    if stream_ok(ctx, mesh, "normal", &mesh.normals) {
        let data: Vec<_> = mesh.normals.iter().map(|&n| convert.normal(n)).collect();
        attrs.normal = Some(ctx.doc.accessors.register_with(&accessor_name(mesh, "normal"), || {
            Accessor::of_vec3(accessor_name(mesh, "normal"), data)
        }));
    }

    if stream_ok(ctx, mesh, "color", &mesh.colors) {
        let data = mesh.colors.clone();
        attrs.color = Some(ctx.doc.accessors.register_with(&accessor_name(mesh, "color"), || {
            Accessor::of_vec4(accessor_name(mesh, "color"), data)
        }));
    }

    for (set, stream) in mesh.uv.iter().enumerate() {
        let semantic: &'static str = ["uv0", "uv1", "uv2", "uv3"][set];
        if stream_ok(ctx, mesh, semantic, stream) {
            let data = stream.clone();
            attrs.uv[set] =
                Some(ctx.doc.accessors.register_with(&accessor_name(mesh, semantic), || {
                    Accessor::of_vec2(accessor_name(mesh, semantic), data)
                }));
        }
    }

    if include_skin && stream_ok(ctx, mesh, "joints", &mesh.influences) {
        let joints: Vec<_> = mesh
            .influences
            .iter()
            .map(|b| {
                Vec4::new(
                    f32::from(b.joints[0]),
                    f32::from(b.joints[1]),
                    f32::from(b.joints[2]),
                    f32::from(b.joints[3]),
                )
            })
            .collect();
        let weights: Vec<_> = mesh.influences.iter().map(|b| Vec4::from_array(b.weights)).collect();
        attrs.joints = Some(ctx.doc.accessors.register_with(&accessor_name(mesh, "joints"), || {
            Accessor::of_vec4(accessor_name(mesh, "joints"), joints)
        }));
        attrs.weights =
            Some(ctx.doc.accessors.register_with(&accessor_name(mesh, "weights"), || {
                Accessor::of_vec4(accessor_name(mesh, "weights"), weights)
            }));
    }

    if stream_ok(ctx, mesh, "tangents", &mesh.tangents) {
        let data: Vec<_> = mesh.tangents.iter().map(|&t| convert.tangent(t)).collect();
        attrs.tangent =
            Some(ctx.doc.accessors.register_with(&accessor_name(mesh, "tangents"), || {
                Accessor::of_vec4(accessor_name(mesh, "tangents"), data)
            }));
    }

    attrs
}

/// Builds one index accessor for a sub-mesh, reversing triangle winding
/// when handedness conversion is active and picking u16 whenever the
/// vertex count allows it.
pub(crate) fn build_index_accessor(
    ctx: &mut ExportContext,
    mesh: &MeshData,
    submesh: usize,
    indices: &[u32],
) -> usize {
    let mut indices = indices.to_vec();
    if ctx.convert.flips_winding() {
        for tri in indices.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
    }

    let name = accessor_name(mesh, &format!("indices_{submesh}"));
    let narrow = mesh.vertex_count() <= usize::from(u16::MAX);
    ctx.doc.accessors.register_with(&name, || {
        if narrow {
            Accessor::of_indices_u16(name.clone(), indices.iter().map(|&i| i as u16).collect())
        } else {
            Accessor::of_indices_u32(name.clone(), indices)
        }
    })
}

/// Builds the lightmap UV accessor (second UV channel remapped into the
/// lightmap atlas via per-accessor scale/offset). Returns `None` when the
/// mesh has no second UV set.
pub(crate) fn build_lightmap_accessor(
    ctx: &mut ExportContext,
    mesh: &MeshData,
    binding: &LightmapBinding,
) -> Option<usize> {
    let stream = &mesh.uv[1];
    if !stream_ok(ctx, mesh, "lightmap uv", stream) {
        return None;
    }
    let name = accessor_name(mesh, "uv4");
    let data = stream.clone();
    let (scale, offset): (Vec2, Vec2) = (binding.scale, binding.offset);
    Some(ctx.doc.accessors.register_with(&name, || {
        let mut accessor = Accessor::of_vec2(name.clone(), data);
        accessor.scale = Some(scale);
        accessor.offset = Some(offset);
        accessor
    }))
}
