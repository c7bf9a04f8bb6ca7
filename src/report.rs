//! Export reporting channel.
//!
//! Skippable conditions degrade the export instead of aborting it, but no
//! skip is silent: every one is recorded in an [`ExportReport`] (and echoed
//! through `log::warn!`) so the invoking caller can observe what was dropped
//! without inspecting the return value.

use std::fmt;

/// A recoverable, per-entity condition encountered during compilation.
///
/// Each variant names the affected source entity so the caller can act on
/// the report without re-running the export.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportWarning {
    /// A name in the selection did not match any transform in the scene.
    TransformNotFound { name: String },
    /// A renderer referenced a mesh asset that is not in the scene.
    MeshNotFound { node: String, mesh: String },
    /// A primitive referenced a material asset that is not in the scene.
    MaterialNotFound { node: String, material: String },
    /// A skin referenced bones outside the current selection; the skin was
    /// dropped and the mesh exported as static geometry.
    SkinBonesOutsideSelection { mesh: String, bones: Vec<String> },
    /// A skinned renderer has no root bone; the skin was dropped.
    SkinRootBoneMissing { mesh: String },
    /// A shader property referenced a texture asset that is not in the scene.
    TextureNotFound { name: String },
    /// A texture's pixel data is not readable; the texture was omitted.
    TextureNotReadable { name: String },
    /// The shader is not one of the two supported PBR workflows; only the
    /// basic color channels were translated.
    UnsupportedShader { material: String, shader: String },
    /// A vertex stream's length differs from the position stream; the
    /// corresponding accessor was omitted.
    StreamLengthMismatch {
        mesh: String,
        semantic: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A clip produced zero channels and was discarded.
    EmptyClip { clip: String, node: String },
}

impl fmt::Display for ExportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransformNotFound { name } => {
                write!(f, "selected transform '{name}' not found in scene")
            }
            Self::MeshNotFound { node, mesh } => {
                write!(f, "mesh '{mesh}' referenced by '{node}' not found")
            }
            Self::MaterialNotFound { node, material } => {
                write!(f, "material '{material}' referenced by '{node}' not found")
            }
            Self::SkinBonesOutsideSelection { mesh, bones } => write!(
                f,
                "skipping skin for '{mesh}': bones used but not selected: {}",
                bones.join(", ")
            ),
            Self::SkinRootBoneMissing { mesh } => {
                write!(f, "skipping skin for '{mesh}': no root bone defined")
            }
            Self::TextureNotFound { name } => {
                write!(f, "texture '{name}' has not been exported (asset not found)")
            }
            Self::TextureNotReadable { name } => {
                write!(f, "texture '{name}' has not been exported (pixels not readable)")
            }
            Self::UnsupportedShader { material, shader } => {
                write!(f, "shader '{shader}' of material '{material}' is not fully supported")
            }
            Self::StreamLengthMismatch { mesh, semantic, expected, actual } => write!(
                f,
                "mesh '{mesh}': {semantic} stream has {actual} elements, expected {expected}; skipped"
            ),
            Self::EmptyClip { clip, node } => {
                write!(f, "clip '{clip}' on '{node}' produced no channels; discarded")
            }
        }
    }
}

/// Accumulated outcome of one export run, distinct from the return value.
#[derive(Debug, Default)]
pub struct ExportReport {
    warnings: Vec<ExportWarning>,
    /// Number of inactive transforms skipped during the walk.
    pub disabled_skipped: usize,
    /// Number of transforms fully processed.
    pub processed: usize,
}

impl ExportReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning and echoes it to the log.
    pub fn warn(&mut self, warning: ExportWarning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    #[must_use]
    pub fn warnings(&self) -> &[ExportWarning] {
        &self.warnings
    }

    /// True when nothing was skipped or degraded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.disabled_skipped == 0
    }

    #[must_use]
    pub fn has_warning(&self, pred: impl Fn(&ExportWarning) -> bool) -> bool {
        self.warnings.iter().any(pred)
    }
}
