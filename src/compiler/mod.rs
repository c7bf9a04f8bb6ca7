//! The compilation pipeline.
//!
//! A [`CompileJob`] walks a selection of transforms one node per
//! [`CompileJob::step`] call, so a host can interleave compilation with its
//! own frame loop and report progress or cancel between steps. All state
//! lives in the job; two jobs over the same scene never interfere.
//!
//! [`Exporter`] is the one-call facade: it runs a job to completion and
//! hands the resolved document to a writer, refusing concurrent use.

mod animation;
mod attributes;
mod material;
mod skinning;

pub use material::derive_smoothness_image;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::{Quat, Vec3};
use rustc_hash::FxHashSet;

use crate::convert::CoordinateConverter;
use crate::document::{
    CameraProjection, DocCamera, DocLight, DocMesh, DocNode, DocumentWriter, Document,
    LightKind, NodeTransform, Primitive, CORRECTION_NODE_ID,
};
use crate::errors::{ExportError, Result};
use crate::host::{CameraSource, LightSource, LightSourceKind, MeshRenderer, SourceScene, SourceTransform};
use crate::output::sanitize_name;
use crate::report::{ExportReport, ExportWarning};

// ============================================================================
// Settings
// ============================================================================

/// Where a material's smoothness value lives when the material itself does
/// not say (via its texture-channel selector property).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothnessSource {
    /// Alpha of the packed metallic/specular map.
    PackedMapAlpha,
    /// Alpha of the albedo map.
    AlbedoAlpha,
}

/// Per-export configuration.
#[derive(Debug, Clone, Copy)]
pub struct ExportSettings {
    /// Convert from the host's left-handed frame to right-handed output.
    pub convert_handedness: bool,
    pub export_animation: bool,
    /// Resample curves at [`Self::bake_sample_rate`] instead of passing
    /// authored keyframes through.
    pub bake_animation: bool,
    pub bake_sample_rate: f32,
    /// Quality for the JPEG halves of split packed textures.
    pub jpeg_quality: u8,
    pub smoothness_source: SmoothnessSource,
    pub export_lightmaps: bool,
    /// Bundle all written files into a single zip archive.
    pub build_zip: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            convert_handedness: true,
            export_animation: true,
            bake_animation: false,
            bake_sample_rate: 30.0,
            jpeg_quality: 92,
            smoothness_source: SmoothnessSource::PackedMapAlpha,
            export_lightmaps: false,
            build_zip: false,
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// Everything a single compilation shares across its sub-compilers.
pub(crate) struct ExportContext<'a> {
    pub(crate) scene: &'a SourceScene,
    pub(crate) settings: ExportSettings,
    pub(crate) convert: CoordinateConverter,
    pub(crate) doc: Document,
    pub(crate) report: ExportReport,
    /// Names of the transforms this job exports.
    pub(crate) selection: FxHashSet<String>,
}

// ============================================================================
// Job
// ============================================================================

/// Progress of a stepping compilation, for host UI.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Nodes compiled so far (including the one just finished).
    pub index: usize,
    pub total: usize,
    /// Name of the transform just compiled.
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum StepOutcome {
    Working(Progress),
    Finished,
}

/// One in-flight compilation over a scene selection.
pub struct CompileJob<'a> {
    ctx: ExportContext<'a>,
    /// Transform indices to compile, in selection order.
    order: Vec<usize>,
    /// Names referenced as joints by some valid-looking skin binding.
    joints: FxHashSet<String>,
    cursor: usize,
    cancelled: bool,
    finished: bool,
}

impl<'a> CompileJob<'a> {
    /// Prepares a job over `selection` (transform names). Unknown names are
    /// reported and dropped; inactive transforms are skipped.
    #[must_use]
    pub fn new(scene: &'a SourceScene, selection: &[String], settings: ExportSettings) -> Self {
        let convert = CoordinateConverter::new(settings.convert_handedness);
        let mut report = ExportReport::new();

        let mut order = Vec::with_capacity(selection.len());
        let mut selected = FxHashSet::default();
        for name in selection {
            let Some(i) = scene.transform_index(name) else {
                report.warn(ExportWarning::TransformNotFound { name: name.clone() });
                continue;
            };
            if !scene.transforms()[i].active {
                report.disabled_skipped += 1;
                continue;
            }
            if selected.insert(name.clone()) {
                order.push(i);
            }
        }

        // Joint prepass: a node must know it is a joint before any skin
        // that references it is compiled.
        let mut joints = FxHashSet::default();
        for &i in &order {
            let tr = &scene.transforms()[i];
            if let Some(renderer) = &tr.renderer {
                if !renderer.enabled {
                    continue;
                }
                if let Some(binding) = &renderer.skin {
                    joints.extend(binding.bones.iter().cloned());
                }
            }
        }

        let mut doc = Document::new();
        let mut correction = DocNode::new(CORRECTION_NODE_ID);
        correction.transform = NodeTransform::Matrix(convert.correction_matrix());
        doc.nodes.register(CORRECTION_NODE_ID, correction);
        doc.scene_roots.push(CORRECTION_NODE_ID.to_owned());

        Self {
            ctx: ExportContext { scene, settings, convert, doc, report, selection: selected },
            order,
            joints,
            cursor: 0,
            cancelled: false,
            finished: false,
        }
    }

    /// Compiles the next transform. Returns [`StepOutcome::Finished`] once
    /// every selected transform has been compiled (or after cancellation).
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.finished || self.cancelled || self.cursor >= self.order.len() {
            self.finished = true;
            return Ok(StepOutcome::Finished);
        }
        let idx = self.order[self.cursor];
        self.cursor += 1;

        let name = self.ctx.scene.transforms()[idx].name.clone();
        log::debug!("compiling node {}/{}: {name}", self.cursor, self.order.len());
        compile_transform(&mut self.ctx, &self.joints, idx)?;
        self.ctx.report.processed += 1;

        Ok(StepOutcome::Working(Progress { index: self.cursor, total: self.order.len(), name }))
    }

    /// Flags the job for cancellation; [`Self::finish`] will then fail with
    /// [`ExportError::Cancelled`] instead of producing a document.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Runs any remaining steps, resolves every name reference and yields
    /// the document. A selection that produced zero meshes fails with
    /// [`ExportError::EmptyExport`] before anything touches disk.
    pub fn finish(mut self) -> Result<(Document, ExportReport)> {
        while !self.cancelled && !self.finished {
            self.step()?;
        }
        if self.cancelled {
            return Err(ExportError::Cancelled);
        }
        if self.ctx.doc.meshes.is_empty() {
            return Err(ExportError::EmptyExport);
        }
        self.ctx.doc.resolve()?;
        log::info!(
            "compiled {} nodes, {} meshes, {} materials ({} warnings)",
            self.ctx.doc.nodes.len(),
            self.ctx.doc.meshes.len(),
            self.ctx.doc.materials.len(),
            self.ctx.report.warnings().len(),
        );
        Ok((self.ctx.doc, self.ctx.report))
    }
}

// ============================================================================
// Per-node compilation
// ============================================================================

fn compile_transform(
    ctx: &mut ExportContext,
    joints: &FxHashSet<String>,
    idx: usize,
) -> Result<()> {
    let scene = ctx.scene;
    let tr = &scene.transforms()[idx];
    let mut node = DocNode::new(&tr.name);

    // Component precedence: camera over light over mesh.
    if let Some(cam) = &tr.camera {
        node.camera = Some(compile_camera(ctx, tr, cam));
    } else if let Some(light) = &tr.light {
        node.light = Some(compile_light(ctx, tr, light));
    } else if let Some(renderer) = &tr.renderer {
        compile_renderer(ctx, tr, renderer, &mut node)?;
    }

    animation::compile_clips(ctx, tr);

    let parent_selected = tr.parent.as_deref().is_some_and(|p| ctx.selection.contains(p));
    node.transform = if parent_selected {
        // Components, omitting identity values.
        NodeTransform::Decomposed {
            translation: (tr.translation != Vec3::ZERO)
                .then(|| ctx.convert.position(tr.translation)),
            rotation: (tr.rotation != Quat::IDENTITY).then(|| ctx.convert.quat(tr.rotation)),
            scale: (tr.scale != Vec3::ONE).then_some(tr.scale),
        }
    } else if tr.parent.is_some() {
        // The parent exists but is not exported: bake the accumulated
        // world transform so the node lands where it was.
        let world = scene.world_matrix(&tr.name).unwrap_or_else(|| tr.local_matrix());
        NodeTransform::Matrix(ctx.convert.matrix(world))
    } else {
        NodeTransform::Matrix(ctx.convert.matrix(tr.local_matrix()))
    };

    node.children = tr
        .children
        .iter()
        .filter(|c| ctx.selection.contains(c.as_str()))
        .cloned()
        .collect();

    if joints.contains(&tr.name) {
        node.joint_name = Some(tr.name.clone());
    }

    ctx.doc.nodes.register(&tr.name, node);

    // Nodes without an exported parent hang off the correction root.
    if !parent_selected {
        if let Some(root) = ctx.doc.nodes.get_mut(0) {
            root.children.push(tr.name.clone());
        }
    }
    Ok(())
}

fn compile_camera(ctx: &mut ExportContext, tr: &SourceTransform, cam: &CameraSource) -> usize {
    let key = format!("camera_{}", sanitize_name(&tr.name));
    let projection = match *cam {
        CameraSource::Perspective { yfov, aspect, znear, zfar } => {
            CameraProjection::Perspective { yfov, aspect, znear, zfar }
        }
        CameraSource::Orthographic { xmag, ymag, znear, zfar } => {
            CameraProjection::Orthographic { xmag, ymag, znear, zfar }
        }
    };
    ctx.doc
        .cameras
        .register_with(&key, || DocCamera { name: tr.name.clone(), projection })
}

fn compile_light(ctx: &mut ExportContext, tr: &SourceTransform, light: &LightSource) -> usize {
    let key = format!("light_{}", sanitize_name(&tr.name));
    let kind = match light.kind {
        LightSourceKind::Point => LightKind::Point,
        LightSourceKind::Spot => LightKind::Spot,
        LightSourceKind::Directional => LightKind::Directional,
        // Area lights have no direct counterpart.
        LightSourceKind::Area => LightKind::Ambient,
    };
    let color = light.color;
    ctx.doc
        .lights
        .register_with(&key, || DocLight { name: tr.name.clone(), kind, color })
}

fn compile_renderer(
    ctx: &mut ExportContext,
    tr: &SourceTransform,
    renderer: &MeshRenderer,
    node: &mut DocNode,
) -> Result<()> {
    if !renderer.enabled {
        ctx.report.disabled_skipped += 1;
        return Ok(());
    }
    let scene = ctx.scene;
    let Some(source_mesh) = scene.meshes.get(&renderer.mesh) else {
        ctx.report.warn(ExportWarning::MeshNotFound {
            node: tr.name.clone(),
            mesh: renderer.mesh.clone(),
        });
        return Ok(());
    };

    // The skin passes its validity gate or the mesh exports as static.
    let binding = renderer
        .skin
        .as_ref()
        .filter(|b| skinning::skin_is_valid(ctx, renderer, b));
    let skinned = binding.is_some();

    let baked;
    let mesh = if skinned {
        baked = skinning::bake_mesh(ctx, tr, source_mesh);
        &baked
    } else {
        source_mesh
    };

    let mesh_key = format!("mesh_{}", sanitize_name(&mesh.name));
    if let Some(existing) = ctx.doc.meshes.index_of(&mesh_key) {
        node.mesh = Some(existing);
    } else {
        let mut attrs = attributes::build_attributes(ctx, mesh, skinned);
        let lightmap = renderer
            .lightmap
            .as_ref()
            .filter(|_| ctx.settings.export_lightmaps);
        if let Some(lm) = lightmap {
            attrs.lightmap_uv = attributes::build_lightmap_accessor(ctx, mesh, lm);
        }

        let mut primitives = Vec::with_capacity(mesh.submeshes.len());
        for (si, indices) in mesh.submeshes.iter().enumerate() {
            let index_accessor = attributes::build_index_accessor(ctx, mesh, si, indices);
            let material = match renderer.materials.get(si) {
                Some(key) => material::translate_material(ctx, key, &tr.name, &attrs)?,
                None => None,
            };
            if let (Some(mat), Some(lm)) = (material, lightmap) {
                if attrs.lightmap_uv.is_some() {
                    material::attach_lightmap(ctx, mat, &lm.texture)?;
                }
            }
            primitives.push(Primitive {
                name: format!("{mesh_key}_{si}"),
                indices: index_accessor,
                attributes: attrs.clone(),
                material,
            });
        }
        node.mesh = Some(
            ctx.doc
                .meshes
                .register(&mesh_key, DocMesh { name: mesh.name.clone(), primitives }),
        );
    }

    if let Some(binding) = binding {
        let (skin, roots) = skinning::compile_skin(ctx, tr, binding);
        node.skin = Some(skin);
        node.skeletons = roots;
    }
    Ok(())
}

// ============================================================================
// Facade
// ============================================================================

/// One-call export entry point. A single exporter refuses to run two
/// exports at once; independent exporters are fully isolated.
pub struct Exporter {
    settings: ExportSettings,
    busy: AtomicBool,
}

impl Exporter {
    #[must_use]
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings, busy: AtomicBool::new(false) }
    }

    #[must_use]
    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Compiles `selection` and writes the document (plus side files, plus
    /// the optional zip bundle) to `path` via `writer`.
    pub fn export(
        &self,
        scene: &SourceScene,
        selection: &[String],
        path: &Path,
        writer: &mut dyn DocumentWriter,
    ) -> Result<ExportReport> {
        if self.busy.swap(true, Ordering::Acquire) {
            return Err(ExportError::ExportInProgress);
        }
        let result = self.run(scene, selection, path, writer);
        self.busy.store(false, Ordering::Release);
        result
    }

    fn run(
        &self,
        scene: &SourceScene,
        selection: &[String],
        path: &Path,
        writer: &mut dyn DocumentWriter,
    ) -> Result<ExportReport> {
        let job = CompileJob::new(scene, selection, self.settings);
        let (doc, report) = job.finish()?;
        crate::output::write_outputs(&doc, path, writer, self.settings.build_zip)?;
        Ok(report)
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(ExportSettings::default())
    }
}
