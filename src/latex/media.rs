use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use crate::model::{MediaAsset, MediaFormat, Warning};

/// Media actually referenced by the emitted LaTeX, keyed by output path so
/// an image shown twice is bundled once.
#[derive(Default)]
pub(super) struct Manifest {
    entries: BTreeMap<String, MediaAsset>,
}

impl Manifest {
    /// Register `asset` for inclusion and return its output path. Formats
    /// pdflatex cannot read are transcoded to PNG; formats the `image` crate
    /// cannot decode (EMF, WMF, SVG) yield `None` and a warning.
    pub(super) fn include(
        &mut self,
        asset: &MediaAsset,
        warnings: &mut Vec<Warning>,
    ) -> Option<String> {
        if let Some(existing) = self
            .entries
            .values()
            .find(|e| e.archive_path == asset.archive_path)
        {
            return Some(existing.output_path.clone());
        }

        if asset.format.is_latex_native() {
            // A transcoded image may already hold this name.
            let output_path = self.free_path(&asset.output_path);
            self.entries.insert(
                output_path.clone(),
                MediaAsset {
                    output_path: output_path.clone(),
                    ..asset.clone()
                },
            );
            return Some(output_path);
        }

        if !matches!(
            asset.format,
            MediaFormat::Gif | MediaFormat::Bmp | MediaFormat::Tiff
        ) {
            let message = format!(
                "{} is {} and cannot be included by pdflatex",
                asset.archive_path,
                asset.format.extension()
            );
            log::warn!("{message}");
            warnings.push(Warning::new("drawing", message));
            return None;
        }

        let data = match transcode_to_png(&asset.data) {
            Ok(data) => data,
            Err(e) => {
                let message = format!("failed to convert {}: {e}", asset.archive_path);
                log::warn!("{message}");
                warnings.push(Warning::new("drawing", message));
                return None;
            }
        };
        let output_path = self.free_path(&with_extension(&asset.output_path, "png"));
        log::debug!(
            "Transcoded {} to {output_path} ({} -> {} bytes)",
            asset.archive_path,
            asset.data.len(),
            data.len()
        );
        self.entries.insert(
            output_path.clone(),
            MediaAsset {
                id: asset.id.clone(),
                data,
                archive_path: asset.archive_path.clone(),
                output_path: output_path.clone(),
                format: MediaFormat::Png,
            },
        );
        Some(output_path)
    }

    fn free_path(&self, wanted: &str) -> String {
        if !self.entries.contains_key(wanted) {
            return wanted.to_string();
        }
        let (stem, ext) = wanted.rsplit_once('.').unwrap_or((wanted, ""));
        (2..)
            .map(|n| format!("{stem}_{n}.{ext}"))
            .find(|candidate| !self.entries.contains_key(candidate))
            .unwrap_or_else(|| wanted.to_string())
    }

    pub(super) fn into_assets(self) -> Vec<MediaAsset> {
        self.entries.into_values().collect()
    }
}

fn with_extension(path: &str, ext: &str) -> String {
    match path.rsplit_once('.') {
        Some((stem, _)) if !stem.ends_with('/') => format!("{stem}.{ext}"),
        _ => format!("{path}.{ext}"),
    }
}

fn transcode_to_png(data: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(data)?;
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)?;
    Ok(out)
}

/// Path written into `\includegraphics`. Overleaf projects need paths
/// relative to the main file; otherwise an optional media root prefixes them.
pub(super) fn reference_path(
    output_path: &str,
    overleaf_compatible: bool,
    media_root: Option<&Path>,
) -> String {
    match media_root {
        Some(root) if !overleaf_compatible => root
            .join(output_path)
            .to_string_lossy()
            .replace('\\', "/"),
        _ => output_path.to_string(),
    }
}
