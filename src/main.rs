use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use docxide_latex::{ConversionOptions, Error, TaskConfig, TaskManager, TaskState};

#[derive(Parser)]
#[command(name = "docxide-latex", version)]
#[command(about = "Convert a DOCX file to LaTeX source, with extracted media")]
struct Args {
    /// DOCX file to convert
    input: PathBuf,

    /// Where to write the .tex file (default: input name with .tex)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write a zip bundle with the .tex, media and a README
    #[arg(long)]
    bundle: Option<PathBuf>,

    /// Numbered headings and a table of contents
    #[arg(long)]
    toc: bool,

    /// Do not restrict media paths to the project root
    #[arg(long)]
    no_overleaf: bool,

    /// Plain text: no emphasis, alignment or booktabs tables
    #[arg(long)]
    no_styles: bool,

    /// Turn manual line breaks into spaces
    #[arg(long)]
    no_line_breaks: bool,

    /// Leave images out and emit placeholders
    #[arg(long)]
    no_media: bool,

    /// Directory image paths are prefixed with (with --no-overleaf)
    #[arg(long)]
    media_root: Option<PathBuf>,

    /// LaTeX template with $body$, $title$, $header-includes$ placeholders
    #[arg(long)]
    template: Option<PathBuf>,

    /// JSON options file (camelCase keys, as sent by the web client)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Give up on conversions running longer than this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl Args {
    /// Options file first, then flags on top.
    fn conversion_options(&self) -> Result<ConversionOptions, Error> {
        let mut options = match &self.options {
            Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
            None => ConversionOptions::default(),
        };
        if self.toc {
            options.generate_toc = true;
        }
        if self.no_overleaf {
            options.overleaf_compatible = false;
        }
        if self.no_styles {
            options.preserve_styles = false;
        }
        if self.no_line_breaks {
            options.preserve_line_breaks = false;
        }
        if self.no_media {
            options.extract_media = false;
        }
        if let Some(root) = &self.media_root {
            options.media_root = Some(root.clone());
        }
        if let Some(path) = &self.template {
            options.template = Some(std::fs::read_to_string(path)?);
        }
        Ok(options)
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn run(args: &Args) -> Result<ExitCode, Error> {
    let options = args.conversion_options()?;
    let manager = TaskManager::new(TaskConfig {
        timeout: args.timeout.map(Duration::from_secs),
        ..TaskConfig::default()
    });

    let bytes = std::fs::read(&args.input)?;
    let id = manager.upload(&file_name(&args.input).unwrap_or_default(), bytes)?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("tex"));
    let status = manager.convert(&id, file_name(&output).as_deref(), options)?;
    if status.state == TaskState::Failed {
        if let Some(failure) = &status.failure {
            eprintln!("Conversion failed ({:?}): {}", failure.kind, failure.message);
        }
        return Ok(ExitCode::FAILURE);
    }

    std::fs::write(&output, manager.download(&id)?)?;
    if status.media_count > 0 {
        let root = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let media = manager.download_media(&id)?;
        zip::ZipArchive::new(Cursor::new(media))?.extract(root)?;
    }
    if let Some(bundle) = &args.bundle {
        std::fs::write(bundle, manager.download_complete(&id)?)?;
        log::info!("Wrote bundle {}", bundle.display());
    }

    log::info!(
        "Wrote {} ({} media files, {} warnings)",
        output.display(),
        status.media_count,
        status.warnings.len()
    );
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
