//! Error Types
//!
//! This module defines the error types used throughout the compiler.
//!
//! # Overview
//!
//! The main error type [`ExportError`] covers all failure modes including:
//! - Fatal I/O failures while writing output artifacts
//! - Image re-encoding failures
//! - Empty-result and lifecycle conditions (empty export, cancellation,
//!   overlapping export attempts)
//! - Unresolvable cross-references in the finished document
//!
//! Skippable per-entity conditions (invalid skins, missing textures, ...) are
//! *not* errors; they are reported through [`crate::report::ExportReport`]
//! and the export degrades gracefully.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, ExportError>`.

use thiserror::Error;

/// The main error type for the exporter.
///
/// Each variant provides specific context about what went wrong. Every
/// variant here aborts the export; recoverable conditions never surface as
/// an `ExportError`.
#[derive(Error, Debug)]
pub enum ExportError {
    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error while writing the document or a side file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive creation error during the optional packaging step.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ========================================================================
    // Image Errors
    // ========================================================================
    /// Image re-encoding error (split maps, converted textures).
    #[error("Image encode error: {0}")]
    ImageEncode(String),

    // ========================================================================
    // Compilation Errors
    // ========================================================================
    /// The whole selection produced zero meshes; an empty document is not a
    /// useful artifact, so nothing is written.
    #[error("no visible meshes were produced for the current selection")]
    EmptyExport,

    /// A name-string cross-reference could not be resolved to an index
    /// during the final resolution pass.
    #[error("unresolved {kind} reference: {name}")]
    UnresolvedReference {
        /// The referenced entity kind ("node", "skeleton", ...)
        kind: &'static str,
        /// The name that failed to resolve
        name: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// A second export was attempted while one is still in progress.
    #[error("an export is already in progress")]
    ExportInProgress,

    /// The host cancelled the export between node-processing steps.
    #[error("export was cancelled before completion")]
    Cancelled,
}

impl From<image::ImageError> for ExportError {
    fn from(err: image::ImageError) -> Self {
        ExportError::ImageEncode(err.to_string())
    }
}

/// Alias for `Result<T, ExportError>`.
pub type Result<T> = std::result::Result<T, ExportError>;
