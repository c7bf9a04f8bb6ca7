//! The flat, index-referenced document model.
//!
//! Entities are plain records connected purely by index references into the
//! per-kind registries; no entity owns another across kinds. This is what
//! makes the finished document exportable as flat JSON by the external
//! writer.
//!
//! Cross-references are built in two phases: during the scene walk,
//! forward references (node children, skeleton roots, animation targets)
//! are accumulated as name strings; [`Document::resolve`] turns them into
//! numeric indices once every entity of the referenced kind has been
//! registered. Resource references that are only created after their target
//! (mesh, material, texture, ...) are stored as indices directly.

pub mod registry;

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use serde::Serialize;

use crate::errors::{ExportError, Result};
pub use registry::Registry;

/// Id of the synthetic root node that carries the handedness correction
/// matrix. All top-level scene nodes are re-parented under it.
pub const CORRECTION_NODE_ID: &str = "sceneforge_correction_matrix";

// ============================================================================
// Nodes
// ============================================================================

/// Transform representation chosen per node by the scene node compiler.
#[derive(Debug, Clone, Serialize)]
pub enum NodeTransform {
    /// A fully baked local or world matrix (root nodes and nodes whose
    /// parent is outside the selection).
    Matrix(Mat4),
    /// Separable components, each present only when it differs from the
    /// identity value, enabling compact default-free output.
    Decomposed {
        translation: Option<Vec3>,
        rotation: Option<Quat>,
        scale: Option<Vec3>,
    },
}

/// One node per selected, active transform. Immutable after the walk
/// completes (only [`Document::resolve`] fills the `_indices` fields).
#[derive(Debug, Clone, Serialize)]
pub struct DocNode {
    pub id: String,
    /// Child ids; resolved into `child_indices` by [`Document::resolve`].
    pub children: Vec<String>,
    pub child_indices: Vec<usize>,
    pub transform: NodeTransform,
    /// At most one of camera/light/mesh is set (precedence camera > light
    /// > mesh); skin may accompany mesh.
    pub camera: Option<usize>,
    pub light: Option<usize>,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    /// Root-skeleton node ids for a skinned node.
    pub skeletons: Vec<String>,
    pub skeleton_indices: Vec<usize>,
    /// Set when this node is referenced as a joint by some skin.
    pub joint_name: Option<String>,
}

impl DocNode {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            child_indices: Vec::new(),
            transform: NodeTransform::Decomposed {
                translation: None,
                rotation: None,
                scale: None,
            },
            camera: None,
            light: None,
            mesh: None,
            skin: None,
            skeletons: Vec::new(),
            skeleton_indices: Vec::new(),
            joint_name: None,
        }
    }
}

// ============================================================================
// Accessors & buffer views
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElementType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentType {
    F32,
    U16,
    U32,
}

/// Fixed, small set of named buffer-view buckets. Accessors with a
/// compatible (element, component) layout share a bucket so runtime
/// consumers can interleave efficiently; buckets are never per-mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BufferViewKind {
    Vec2Float,
    Vec3Float,
    Vec4Float,
    Mat4Float,
    ScalarUshort,
    ScalarUint,
}

impl BufferViewKind {
    /// Bucket assignment table for every supported layout.
    #[must_use]
    pub fn for_layout(element: ElementType, component: ComponentType) -> Option<Self> {
        match (element, component) {
            (ElementType::Vec2, ComponentType::F32) => Some(Self::Vec2Float),
            (ElementType::Vec3, ComponentType::F32) => Some(Self::Vec3Float),
            (ElementType::Vec4, ComponentType::F32) => Some(Self::Vec4Float),
            (ElementType::Mat4, ComponentType::F32) => Some(Self::Mat4Float),
            (ElementType::Scalar, ComponentType::U16) => Some(Self::ScalarUshort),
            (ElementType::Scalar, ComponentType::U32) => Some(Self::ScalarUint),
            _ => None,
        }
    }
}

/// Accessor payload. The compiler fills it once; the writer serializes it
/// into the binary buffer. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub enum AccessorData {
    Vec2(Vec<Vec2>),
    Vec3(Vec<Vec3>),
    Vec4(Vec<Vec4>),
    Mat4(Vec<Mat4>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl AccessorData {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Vec2(v) => v.len(),
            Self::Vec3(v) => v.len(),
            Self::Vec4(v) => v.len(),
            Self::Mat4(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw little-endian payload, for writers that emit binary buffers.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Vec2(v) => bytemuck::cast_slice(v),
            Self::Vec3(v) => bytemuck::cast_slice(v),
            Self::Vec4(v) => bytemuck::cast_slice(v),
            Self::Mat4(v) => bytemuck::cast_slice(v),
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
        }
    }
}

/// Typed view over a region of vertex/index data. Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct Accessor {
    pub name: String,
    pub element: ElementType,
    pub component: ComponentType,
    pub view: BufferViewKind,
    pub count: usize,
    /// Per-accessor UV remap, used by lightmap UV accessors.
    pub scale: Option<Vec2>,
    pub offset: Option<Vec2>,
    pub data: AccessorData,
}

impl Accessor {
    fn new(
        name: impl Into<String>,
        element: ElementType,
        component: ComponentType,
        data: AccessorData,
    ) -> Self {
        let view = BufferViewKind::for_layout(element, component)
            .unwrap_or_else(|| unreachable!("no bucket for ({element:?}, {component:?})"));
        Self {
            name: name.into(),
            element,
            component,
            view,
            count: data.len(),
            scale: None,
            offset: None,
            data,
        }
    }

    #[must_use]
    pub fn of_vec2(name: impl Into<String>, data: Vec<Vec2>) -> Self {
        Self::new(name, ElementType::Vec2, ComponentType::F32, AccessorData::Vec2(data))
    }

    #[must_use]
    pub fn of_vec3(name: impl Into<String>, data: Vec<Vec3>) -> Self {
        Self::new(name, ElementType::Vec3, ComponentType::F32, AccessorData::Vec3(data))
    }

    #[must_use]
    pub fn of_vec4(name: impl Into<String>, data: Vec<Vec4>) -> Self {
        Self::new(name, ElementType::Vec4, ComponentType::F32, AccessorData::Vec4(data))
    }

    #[must_use]
    pub fn of_mat4(name: impl Into<String>, data: Vec<Mat4>) -> Self {
        Self::new(name, ElementType::Mat4, ComponentType::F32, AccessorData::Mat4(data))
    }

    #[must_use]
    pub fn of_indices_u16(name: impl Into<String>, data: Vec<u16>) -> Self {
        Self::new(name, ElementType::Scalar, ComponentType::U16, AccessorData::U16(data))
    }

    #[must_use]
    pub fn of_indices_u32(name: impl Into<String>, data: Vec<u32>) -> Self {
        Self::new(name, ElementType::Scalar, ComponentType::U32, AccessorData::U32(data))
    }
}

// ============================================================================
// Meshes
// ============================================================================

/// Named accessor references of one primitive. Position is mandatory; all
/// populated accessors share the position accessor's element count.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Attributes {
    pub position: usize,
    pub normal: Option<usize>,
    pub color: Option<usize>,
    pub uv: [Option<usize>; 4],
    pub joints: Option<usize>,
    pub weights: Option<usize>,
    pub tangent: Option<usize>,
    pub lightmap_uv: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Primitive {
    pub name: String,
    pub indices: usize,
    pub attributes: Attributes,
    pub material: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocMesh {
    pub name: String,
    pub primitives: Vec<Primitive>,
}

// ============================================================================
// Materials, techniques, programs
// ============================================================================

/// One of the two standard PBR channel conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Workflow {
    MetalRoughness,
    SpecularGlossiness,
}

/// A typed material value keyed by canonical PBR channel name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MaterialValue {
    Color { channel: String, value: Vec4 },
    Vector { channel: String, value: Vec4 },
    Float { channel: String, value: f32 },
    Texture {
        channel: String,
        texture: usize,
        /// Explicit UV set override (lightmaps bind TEXCOORD_4).
        tex_coord: Option<u32>,
    },
}

impl MaterialValue {
    #[must_use]
    pub fn channel(&self) -> &str {
        match self {
            Self::Color { channel, .. }
            | Self::Vector { channel, .. }
            | Self::Float { channel, .. }
            | Self::Texture { channel, .. } => channel,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocMaterial {
    pub name: String,
    /// None for shaders outside the two supported workflows.
    pub workflow: Option<Workflow>,
    pub values: Vec<MaterialValue>,
    pub technique: Option<usize>,
    /// Extra scalar/string metadata (blend mode, cutoff).
    pub extra_floats: Vec<(String, f32)>,
    pub extra_strings: Vec<(String, String)>,
}

impl DocMaterial {
    #[must_use]
    pub fn value(&self, channel: &str) -> Option<&MaterialValue> {
        self.values.iter().find(|v| v.channel() == channel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamType {
    Float,
    FloatVec2,
    FloatVec3,
    FloatVec4,
    FloatMat4,
    Sampler2D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Semantic {
    Position,
    Normal,
    Texcoord0,
    Texcoord1,
    Texcoord2,
    Texcoord3,
    ModelView,
    Projection,
}

#[derive(Debug, Clone, Serialize)]
pub struct TechniqueParameter {
    pub name: String,
    pub ty: ParamType,
    pub semantic: Option<Semantic>,
}

/// Binding of a vertex-shader attribute to a technique parameter.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeBinding {
    pub name: String,
    pub param: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UniformBinding {
    pub name: String,
    pub param: String,
}

/// Generated once per distinct shader.
#[derive(Debug, Clone, Serialize)]
pub struct Technique {
    pub name: String,
    pub program: Option<usize>,
    pub parameters: Vec<TechniqueParameter>,
    pub attributes: Vec<AttributeBinding>,
    pub uniforms: Vec<UniformBinding>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub name: String,
    pub attributes: Vec<String>,
}

// ============================================================================
// Textures, images, samplers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WrapMode {
    Repeat,
    Clamp,
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocSampler {
    pub name: String,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
}

/// An image entity; `uri` is the relative output filename of the side file.
#[derive(Debug, Clone, Serialize)]
pub struct DocImage {
    pub name: String,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocTexture {
    pub name: String,
    pub image: usize,
    pub sampler: usize,
    /// Set for bump textures that are not runtime-converted normal maps.
    pub y_up: bool,
}

// ============================================================================
// Skins
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Skin {
    pub name: String,
    pub bind_shape_matrix: Mat4,
    /// Index of the mat4/float inverse-bind-matrix accessor.
    pub inverse_bind_matrices: usize,
    pub joint_names: Vec<String>,
    pub root_names: Vec<String>,
}

// ============================================================================
// Animations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelPath {
    Translation,
    Rotation,
    Scale,
}

#[derive(Debug, Clone, Serialize)]
pub enum ChannelOutput {
    Vec3(Vec<Vec3>),
    Quat(Vec<Quat>),
}

impl ChannelOutput {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Vec3(v) => v.len(),
            Self::Quat(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A sampler over a time → value curve targeting one property path.
#[derive(Debug, Clone, Serialize)]
pub struct AnimationChannel {
    pub path: ChannelPath,
    pub times: Vec<f32>,
    pub output: ChannelOutput,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocAnimation {
    pub name: String,
    /// Target node id; resolved to `target_index` by [`Document::resolve`].
    pub target: String,
    pub target_index: Option<usize>,
    pub channels: Vec<AnimationChannel>,
}

// ============================================================================
// Cameras & lights
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub enum CameraProjection {
    Perspective { yfov: f32, aspect: f32, znear: f32, zfar: f32 },
    Orthographic { xmag: f32, ymag: f32, znear: f32, zfar: f32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct DocCamera {
    pub name: String,
    pub projection: CameraProjection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LightKind {
    Point,
    Spot,
    Directional,
    Ambient,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocLight {
    pub name: String,
    pub kind: LightKind,
    pub color: Vec4,
}

// ============================================================================
// Side files
// ============================================================================

/// An already-encoded binary asset to be written next to the document.
#[derive(Debug, Clone)]
pub struct SideFile {
    pub uri: String,
    pub data: Vec<u8>,
}

// ============================================================================
// Document
// ============================================================================

/// The fully resolved entity collections handed to the document writer, in
/// final registration order. The writer performs no further deduplication
/// or ordering logic.
#[derive(Debug, Default, Serialize)]
pub struct Document {
    pub nodes: Registry<DocNode>,
    pub meshes: Registry<DocMesh>,
    pub accessors: Registry<Accessor>,
    pub materials: Registry<DocMaterial>,
    pub techniques: Registry<Technique>,
    pub programs: Registry<Program>,
    pub textures: Registry<DocTexture>,
    pub images: Registry<DocImage>,
    pub samplers: Registry<DocSampler>,
    pub skins: Registry<Skin>,
    pub animations: Registry<DocAnimation>,
    pub cameras: Registry<DocCamera>,
    pub lights: Registry<DocLight>,
    /// Ids of the scene's root nodes (the correction node).
    pub scene_roots: Vec<String>,
    /// Encoded image payloads, written as side files by the output step.
    #[serde(skip)]
    pub side_files: Vec<SideFile>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Final resolution pass: turns every accumulated name reference into a
    /// numeric index. Runs once, after all entities are registered; a name
    /// that does not resolve is a hard error, never a dangling index.
    pub fn resolve(&mut self) -> Result<()> {
        let lookup = |names: &[String], kind: &'static str, reg: &Registry<DocNode>| {
            names
                .iter()
                .map(|n| {
                    reg.index_of(n).ok_or_else(|| ExportError::UnresolvedReference {
                        kind,
                        name: n.clone(),
                    })
                })
                .collect::<Result<Vec<usize>>>()
        };

        let mut resolved: Vec<(usize, Vec<usize>, Vec<usize>)> = Vec::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            let children = lookup(&node.children, "node", &self.nodes)?;
            let skeletons = lookup(&node.skeletons, "skeleton", &self.nodes)?;
            resolved.push((i, children, skeletons));
        }
        for (i, children, skeletons) in resolved {
            let node = self.nodes.get_mut(i).unwrap_or_else(|| unreachable!());
            node.child_indices = children;
            node.skeleton_indices = skeletons;
        }

        let mut targets = Vec::with_capacity(self.animations.len());
        for anim in self.animations.iter() {
            let idx = self.nodes.index_of(&anim.target).ok_or_else(|| {
                ExportError::UnresolvedReference { kind: "node", name: anim.target.clone() }
            })?;
            targets.push(idx);
        }
        for (i, idx) in targets.into_iter().enumerate() {
            if let Some(anim) = self.animations.get_mut(i) {
                anim.target_index = Some(idx);
            }
        }
        Ok(())
    }
}

/// The document-writer collaborator boundary. The compiler hands over the
/// resolved document and a destination path; the writer reports back every
/// file it created so the packaging step can bundle them.
pub trait DocumentWriter {
    fn write_document(
        &mut self,
        doc: &Document,
        path: &std::path::Path,
    ) -> Result<Vec<std::path::PathBuf>>;
}
