use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Error;
use crate::model::MediaAsset;

pub const README_NAME: &str = "README.txt";

/// Fixed timestamp and permissions so the same inputs always produce the
/// same archive bytes.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644)
}

/// Sorted by output path; the manifest from the emitter already is, but
/// callers may hand in any order.
fn sorted(media: &[MediaAsset]) -> Vec<&MediaAsset> {
    let mut sorted: Vec<&MediaAsset> = media.iter().collect();
    sorted.sort_by(|a, b| a.output_path.cmp(&b.output_path));
    sorted.dedup_by(|a, b| a.output_path == b.output_path);
    sorted
}

/// The complete download: the LaTeX source under `output_filename`, every
/// media file under its manifest path, and a usage note.
pub fn complete(output_filename: &str, latex: &str, media: &[MediaAsset]) -> Result<Vec<u8>, Error> {
    let options = entry_options();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file(output_filename, options)?;
    zip.write_all(latex.as_bytes())?;

    let media = sorted(media);
    for asset in &media {
        zip.start_file(asset.output_path.as_str(), options)?;
        zip.write_all(&asset.data)?;
    }

    zip.start_file(README_NAME, options)?;
    zip.write_all(readme(output_filename, media.len()).as_bytes())?;

    let bytes = zip.finish()?.into_inner();
    log::debug!(
        "Bundled {output_filename} with {} media files ({} bytes)",
        media.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Media files only, under their manifest paths.
pub fn media_only(media: &[MediaAsset]) -> Result<Vec<u8>, Error> {
    let options = entry_options();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for asset in sorted(media) {
        zip.start_file(asset.output_path.as_str(), options)?;
        zip.write_all(&asset.data)?;
    }
    Ok(zip.finish()?.into_inner())
}

pub fn readme(output_filename: &str, media_count: usize) -> String {
    let media_line = match media_count {
        0 => String::from("This bundle contains no images."),
        1 => String::from("The single image lives in media/ and is referenced relative to the .tex file."),
        n => format!("The {n} images live in media/ and are referenced relative to the .tex file."),
    };
    format!(
        "Converted LaTeX bundle\n\
         ======================\n\
         \n\
         Main file: {output_filename}\n\
         {media_line}\n\
         \n\
         Compile locally\n\
         ---------------\n\
         Unpack the archive, keep the directory layout, then run:\n\
         \n\
         \x20   pdflatex {output_filename}\n\
         \n\
         Run it twice when the document has a table of contents.\n\
         \n\
         Import into Overleaf\n\
         --------------------\n\
         1. New Project > Upload Project, and select this zip file.\n\
         2. Open {output_filename} and set it as the main document in the menu.\n\
         3. Choose pdfLaTeX as the compiler and recompile.\n"
    )
}
