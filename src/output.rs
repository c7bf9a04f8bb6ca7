//! Output artifact handling.
//!
//! Side files (encoded images) land next to the document, the writer
//! produces the document files, and the optional packaging step bundles
//! everything into one zip archive and removes the loose files.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::document::{Document, DocumentWriter};
use crate::errors::Result;

/// Replaces filesystem-hostile characters (and spaces) so any entity name
/// is usable as a file name or identifier.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            _ => c,
        })
        .collect()
}

fn output_dir(path: &Path) -> PathBuf {
    path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Writes the document's side files and the document itself, optionally
/// bundling every produced file into a zip next to `path`. Side files are
/// removed again if the writer fails, so a failed export leaves no partial
/// artifacts behind.
pub fn write_outputs(
    doc: &Document,
    path: &Path,
    writer: &mut dyn DocumentWriter,
    build_zip: bool,
) -> Result<Vec<PathBuf>> {
    let dir = output_dir(path);
    fs::create_dir_all(&dir)?;

    let mut produced = Vec::with_capacity(doc.side_files.len() + 1);
    for side in &doc.side_files {
        let file_path = dir.join(&side.uri);
        fs::write(&file_path, &side.data)?;
        produced.push(file_path);
    }

    match writer.write_document(doc, path) {
        Ok(written) => produced.extend(written),
        Err(e) => {
            for p in &produced {
                let _ = fs::remove_file(p);
            }
            return Err(e);
        }
    }

    if build_zip {
        let archive = match pack_archive(path, &produced) {
            Ok(archive) => archive,
            Err(e) => {
                // Same contract as the writer-failure branch: a failed
                // export leaves no partial artifacts behind.
                for p in &produced {
                    let _ = fs::remove_file(p);
                }
                let _ = fs::remove_file(path.with_extension("zip"));
                return Err(e);
            }
        };
        for p in &produced {
            fs::remove_file(p)?;
        }
        return Ok(vec![archive]);
    }
    Ok(produced)
}

/// Bundles `files` into `<path>.zip` with deflate compression, storing each
/// entry under its bare file name.
fn pack_archive(path: &Path, files: &[PathBuf]) -> Result<PathBuf> {
    let archive_path = path.with_extension("zip");
    let mut zip = ZipWriter::new(File::create(&archive_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        zip.start_file(name, options)?;
        let data = fs::read(file)?;
        zip.write_all(&data)?;
    }
    zip.finish()?;
    log::info!("packed {} files into {}", files.len(), archive_path.display());
    Ok(archive_path)
}
