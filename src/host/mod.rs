//! Host scene-graph snapshot.
//!
//! The compiler consumes the host scene through this module: an ordered,
//! finite set of transforms with explicit typed component lookups, plus
//! flat asset tables for meshes (raw vertex streams), materials (shader
//! identity + property table) and textures (decoded pixel buffers). The
//! host's dynamic component inspection is abstracted as capability checks
//! (`has_mesh`, `has_skin`, ...) rather than runtime type inspection.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use image::RgbaImage;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::document::ChannelPath;

// ============================================================================
// Transforms & components
// ============================================================================

/// Host camera component.
#[derive(Debug, Clone)]
pub enum CameraSource {
    Perspective { yfov: f32, aspect: f32, znear: f32, zfar: f32 },
    Orthographic { xmag: f32, ymag: f32, znear: f32, zfar: f32 },
}

/// Host light kinds ("area" lights are exported as ambient).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightSourceKind {
    Point,
    Spot,
    Directional,
    Area,
}

#[derive(Debug, Clone)]
pub struct LightSource {
    pub kind: LightSourceKind,
    pub color: Vec4,
}

/// Skinned-renderer binding: the bone transforms (by name, in joint order)
/// and the designated root bone.
#[derive(Debug, Clone)]
pub struct SkinBinding {
    pub bones: Vec<String>,
    pub root_bone: Option<String>,
}

/// Lightmap binding of a static renderer: the lightmap texture plus the UV
/// scale/offset remap into the lightmap atlas.
#[derive(Debug, Clone)]
pub struct LightmapBinding {
    pub texture: String,
    pub scale: Vec2,
    pub offset: Vec2,
}

/// Mesh renderer component (static or skinned).
#[derive(Debug, Clone)]
pub struct MeshRenderer {
    /// Key into [`SourceScene`]'s mesh table.
    pub mesh: String,
    /// Material keys, one per sub-mesh.
    pub materials: Vec<String>,
    pub enabled: bool,
    /// Present on skinned mesh renderers.
    pub skin: Option<SkinBinding>,
    pub lightmap: Option<LightmapBinding>,
}

impl MeshRenderer {
    #[must_use]
    pub fn new(mesh: impl Into<String>) -> Self {
        Self {
            mesh: mesh.into(),
            materials: Vec::new(),
            enabled: true,
            skin: None,
            lightmap: None,
        }
    }
}

/// A single transform in the host hierarchy, with its optional components.
#[derive(Debug, Clone)]
pub struct SourceTransform {
    pub name: String,
    pub parent: Option<String>,
    pub children: SmallVec<[String; 4]>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Active-in-hierarchy flag; inactive transforms are skipped.
    pub active: bool,
    pub camera: Option<CameraSource>,
    pub light: Option<LightSource>,
    pub renderer: Option<MeshRenderer>,
    pub clips: Vec<ClipSource>,
}

impl SourceTransform {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: SmallVec::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            active: true,
            camera: None,
            light: None,
            renderer: None,
            clips: Vec::new(),
        }
    }

    // Capability checks — explicit typed lookups.

    #[must_use]
    pub fn has_mesh(&self) -> bool {
        self.renderer.is_some()
    }

    #[must_use]
    pub fn has_skin(&self) -> bool {
        self.renderer.as_ref().is_some_and(|r| r.skin.is_some())
    }

    #[must_use]
    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    #[must_use]
    pub fn has_light(&self) -> bool {
        self.light.is_some()
    }

    #[must_use]
    pub fn has_clips(&self) -> bool {
        !self.clips.is_empty()
    }

    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

// ============================================================================
// Mesh data
// ============================================================================

/// Up to four bone influences per vertex.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoneInfluence {
    pub joints: [u16; 4],
    pub weights: [f32; 4],
}

/// Raw vertex streams of one mesh asset. Optional streams are empty when
/// absent; populated streams must match the position stream's length.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<Vec4>,
    pub uv: [Vec<Vec2>; 4],
    pub tangents: Vec<Vec4>,
    pub influences: Vec<BoneInfluence>,
    /// Bind-pose matrices, parallel to a skin binding's bone list.
    pub bind_poses: Vec<Mat4>,
    /// Triangle index lists, one per sub-mesh.
    pub submeshes: Vec<Vec<u32>>,
}

impl MeshData {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            positions: Vec::new(),
            normals: Vec::new(),
            colors: Vec::new(),
            uv: Default::default(),
            tangents: Vec::new(),
            influences: Vec::new(),
            bind_poses: Vec::new(),
            submeshes: Vec::new(),
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

// ============================================================================
// Material data
// ============================================================================

/// A declared shader property's current value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Color(Vec4),
    Vector(Vec4),
    Float(f32),
    Range(f32),
    /// Texture slot; `None` when the slot is unassigned.
    Texture(Option<String>),
}

#[derive(Debug, Clone)]
pub struct ShaderProperty {
    pub name: String,
    pub value: PropertyValue,
}

/// A material as the host exposes it: a shader identity plus the shader's
/// declared property table, in declaration order.
#[derive(Debug, Clone)]
pub struct MaterialData {
    pub name: String,
    pub shader: String,
    pub properties: Vec<ShaderProperty>,
}

impl MaterialData {
    #[must_use]
    pub fn new(name: impl Into<String>, shader: impl Into<String>) -> Self {
        Self { name: name.into(), shader: shader.into(), properties: Vec::new() }
    }

    pub fn set(&mut self, name: impl Into<String>, value: PropertyValue) -> &mut Self {
        self.properties.push(ShaderProperty { name: name.into(), value });
        self
    }

    /// Float lookup covering both `Float` and `Range` declarations.
    #[must_use]
    pub fn get_float(&self, name: &str) -> Option<f32> {
        self.properties.iter().find_map(|p| match &p.value {
            PropertyValue::Float(v) | PropertyValue::Range(v) if p.name == name => Some(*v),
            _ => None,
        })
    }

    /// The assigned texture of a texture slot, if any.
    #[must_use]
    pub fn get_texture(&self, name: &str) -> Option<&str> {
        self.properties.iter().find_map(|p| match &p.value {
            PropertyValue::Texture(Some(t)) if p.name == name => Some(t.as_str()),
            _ => None,
        })
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p.name == name)
    }
}

// ============================================================================
// Texture data
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureWrap {
    Repeat,
    Clamp,
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Point,
    Bilinear,
    Trilinear,
}

/// A texture asset as decoded pixels plus the source flags the translator
/// needs (readability, normal-map conversion).
#[derive(Debug, Clone)]
pub struct TextureData {
    pub name: String,
    pub pixels: RgbaImage,
    /// Whether pixel data may be read back; unreadable textures are skipped.
    pub readable: bool,
    /// Whether the asset is flagged for runtime normal-map conversion
    /// (distinguishes bump maps from authored normal maps).
    pub convert_to_normal_map: bool,
    pub wrap: TextureWrap,
    pub filter: TextureFilter,
    /// Source asset filename stem, used to derive the output uri.
    pub source_name: String,
}

impl TextureData {
    #[must_use]
    pub fn new(name: impl Into<String>, pixels: RgbaImage) -> Self {
        let name = name.into();
        Self {
            source_name: name.clone(),
            name,
            pixels,
            readable: true,
            convert_to_normal_map: false,
            wrap: TextureWrap::Repeat,
            filter: TextureFilter::Bilinear,
        }
    }
}

// ============================================================================
// Animation data
// ============================================================================

/// Sampled keyframe values of one curve.
#[derive(Debug, Clone)]
pub enum TrackValues {
    Vec3(Vec<Vec3>),
    Quat(Vec<Quat>),
}

/// One time → value curve targeting a transform property.
#[derive(Debug, Clone)]
pub struct CurveTrack {
    pub path: ChannelPath,
    pub times: Vec<f32>,
    pub values: TrackValues,
}

/// An animation clip attached to a transform.
#[derive(Debug, Clone)]
pub struct ClipSource {
    pub name: String,
    pub tracks: Vec<CurveTrack>,
}

impl ClipSource {
    #[must_use]
    pub fn duration(&self) -> f32 {
        self.tracks
            .iter()
            .map(|t| t.times.last().copied().unwrap_or(0.0))
            .fold(0.0_f32, f32::max)
    }
}

// ============================================================================
// Scene
// ============================================================================

/// An immutable snapshot of the host scene: the transform hierarchy plus
/// the asset tables the transforms reference by name.
#[derive(Debug, Default)]
pub struct SourceScene {
    transforms: Vec<SourceTransform>,
    index: FxHashMap<String, usize>,
    pub meshes: FxHashMap<String, MeshData>,
    pub materials: FxHashMap<String, MaterialData>,
    pub textures: FxHashMap<String, TextureData>,
}

impl SourceScene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a transform and wires it into its parent's child list.
    /// Transform names must be unique within a scene.
    pub fn add_transform(&mut self, transform: SourceTransform) -> usize {
        debug_assert!(
            !self.index.contains_key(&transform.name),
            "duplicate transform name: {}",
            transform.name
        );
        let i = self.transforms.len();
        if let Some(parent) = transform.parent.clone() {
            if let Some(&p) = self.index.get(&parent) {
                self.transforms[p].children.push(transform.name.clone());
            }
        }
        self.index.insert(transform.name.clone(), i);
        self.transforms.push(transform);
        i
    }

    pub fn add_mesh(&mut self, mesh: MeshData) {
        self.meshes.insert(mesh.name.clone(), mesh);
    }

    pub fn add_material(&mut self, material: MaterialData) {
        self.materials.insert(material.name.clone(), material);
    }

    pub fn add_texture(&mut self, texture: TextureData) {
        self.textures.insert(texture.name.clone(), texture);
    }

    #[must_use]
    pub fn transforms(&self) -> &[SourceTransform] {
        &self.transforms
    }

    #[must_use]
    pub fn transform(&self, name: &str) -> Option<&SourceTransform> {
        self.index.get(name).map(|&i| &self.transforms[i])
    }

    #[must_use]
    pub fn transform_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Composes the world matrix by walking the parent chain.
    #[must_use]
    pub fn world_matrix(&self, name: &str) -> Option<Mat4> {
        let tr = self.transform(name)?;
        let mut m = tr.local_matrix();
        let mut parent = tr.parent.as_deref();
        while let Some(p) = parent {
            let pt = self.transform(p)?;
            m = pt.local_matrix() * m;
            parent = pt.parent.as_deref();
        }
        Some(m)
    }

    /// The accumulated (lossy) world scale of a transform.
    #[must_use]
    pub fn world_scale(&self, name: &str) -> Option<Vec3> {
        let (scale, _, _) = self.world_matrix(name)?.to_scale_rotation_translation();
        Some(scale)
    }
}
