#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod compiler;
pub mod convert;
pub mod document;
pub mod errors;
pub mod host;
pub mod output;
pub mod report;

pub use compiler::{
    derive_smoothness_image, CompileJob, ExportSettings, Exporter, Progress, SmoothnessSource,
    StepOutcome,
};
pub use convert::CoordinateConverter;
pub use document::{Document, DocumentWriter, Registry, Workflow, CORRECTION_NODE_ID};
pub use errors::{ExportError, Result};
pub use host::{
    BoneInfluence, CameraSource, ClipSource, CurveTrack, LightSource, LightSourceKind,
    LightmapBinding, MaterialData, MeshData, MeshRenderer, PropertyValue, SkinBinding,
    SourceScene, SourceTransform, TextureData, TrackValues,
};
pub use report::{ExportReport, ExportWarning};
