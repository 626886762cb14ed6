pub mod bundle;
mod docx;
mod error;
mod latex;
pub mod model;
mod task;

pub use docx::{Package, build, parse_bytes};
pub use error::{Error, ErrorKind};
pub use latex::{Emitted, emit, escape_text, escape_url};
pub use model::{ConversionOptions, Document, Warning};
pub use task::{Failure, TaskConfig, TaskId, TaskManager, TaskState, TaskStatus};

use std::path::Path;
use std::time::Instant;

/// Run the whole pipeline on an in-memory DOCX: read the package, resolve
/// styles, build the document model and emit LaTeX.
pub fn convert_docx_bytes_to_latex(
    input: &[u8],
    options: &ConversionOptions,
) -> Result<Emitted, Error> {
    let t0 = Instant::now();

    let doc = docx::parse_bytes(input)?;
    let t_parse = t0.elapsed();

    let emitted = latex::emit(&doc, options)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: parse={:.1}ms, emit={:.1}ms, total={:.1}ms (output {} bytes, {} media, {} warnings)",
        t_parse.as_secs_f64() * 1000.0,
        (t_total - t_parse).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        emitted.latex.len(),
        emitted.manifest.len(),
        emitted.warnings.len(),
    );

    Ok(emitted)
}

/// Convert `input` and write the `.tex` to `output`. Media files land next
/// to it under `media/` when extraction is enabled.
pub fn convert_docx_to_latex(
    input: &Path,
    output: &Path,
    options: &ConversionOptions,
) -> Result<Emitted, Error> {
    let bytes = std::fs::read(input)?;
    let emitted = convert_docx_bytes_to_latex(&bytes, options)?;

    std::fs::write(output, &emitted.latex)?;
    let root = output.parent().unwrap_or(Path::new(""));
    for asset in &emitted.manifest {
        let path = root.join(&asset.output_path);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, &asset.data)?;
    }
    log::info!(
        "Wrote {} and {} media files",
        output.display(),
        emitted.manifest.len()
    );

    Ok(emitted)
}
