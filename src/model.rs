use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

/// Coarse size buckets relative to the document's default font size.
/// LaTeX only offers named size switches, so exact point sizes are not kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum FontSizeClass {
    Tiny,
    Small,
    #[default]
    Normal,
    Large,
    Larger,
    Huge,
}

impl FontSizeClass {
    pub fn from_points(size: f32, base: f32) -> Self {
        if base <= 0.0 {
            return FontSizeClass::Normal;
        }
        let ratio = size / base;
        if ratio < 0.7 {
            FontSizeClass::Tiny
        } else if ratio < 0.9 {
            FontSizeClass::Small
        } else if ratio <= 1.15 {
            FontSizeClass::Normal
        } else if ratio <= 1.45 {
            FontSizeClass::Large
        } else if ratio <= 1.8 {
            FontSizeClass::Larger
        } else {
            FontSizeClass::Huge
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VertAlign {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NumberingRef {
    pub num_id: String,
    pub level: u8,
}

/// Fully resolved formatting for one paragraph or run, after walking
/// direct formatting, the style chain and the document defaults.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyleRecord {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub alignment: Alignment,
    pub indent_level: u8,
    pub size: FontSizeClass,
    pub numbering: Option<NumberingRef>,
    /// 0 = title, 1..=9 = heading levels.
    pub heading_level: Option<u8>,
    pub page_break_before: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberFormat {
    Decimal,
    LowerLetter,
    UpperLetter,
    LowerRoman,
    UpperRoman,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListKind {
    Bullet,
    Ordered(NumberFormat),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListMarker {
    pub kind: ListKind,
    pub start: u32,
    pub depth: u8,
}

impl Default for ListMarker {
    fn default() -> Self {
        Self {
            kind: ListKind::Bullet,
            start: 1,
            depth: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InlineStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub size: FontSizeClass,
    pub vertical_align: VertAlign,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Run {
    pub text: String,
    pub style: InlineStyle,
    pub hyperlink: Option<String>,
}

/// Media is referenced by relationship id, never by archive path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaId(pub String);

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageRef {
    pub media: MediaId,
    pub width_pt: f32,
    pub height_pt: f32,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inline {
    Text(Run),
    Tab,
    LineBreak,
    PageBreak,
    Image(ImageRef),
    Footnote(Vec<Inline>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParagraphKind {
    Body,
    Heading(u8),
    ListItem {
        num_id: String,
        level: u8,
        marker: ListMarker,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Paragraph {
    pub kind: ParagraphKind,
    pub style: StyleRecord,
    pub inlines: Vec<Inline>,
}

impl Paragraph {
    pub fn is_empty(&self) -> bool {
        self.inlines.iter().all(|i| match i {
            Inline::Text(run) => run.text.trim().is_empty(),
            Inline::Tab => true,
            _ => false,
        })
    }

    /// True when the paragraph holds exactly one image and nothing else visible.
    pub fn sole_image(&self) -> Option<&ImageRef> {
        let mut image = None;
        for inline in &self.inlines {
            match inline {
                Inline::Image(img) if image.is_none() => image = Some(img),
                Inline::Text(run) if run.text.trim().is_empty() => {}
                _ => return None,
            }
        }
        image
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableCell {
    pub blocks: Vec<Block>,
    pub grid_span: u16,
    /// Continuation of a vertically merged cell; rendered empty.
    pub merged_above: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
    pub is_header: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub col_widths: Vec<f32>, // points
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn column_count(&self) -> usize {
        let from_rows = self
            .rows
            .iter()
            .map(|r| r.cells.iter().map(|c| c.grid_span.max(1) as usize).sum())
            .max()
            .unwrap_or(0);
        from_rows.max(self.col_widths.len())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Emf,
    Wmf,
    Svg,
    Other,
}

impl MediaFormat {
    /// Formats pdflatex can include without conversion.
    pub fn is_latex_native(self) -> bool {
        matches!(self, MediaFormat::Png | MediaFormat::Jpeg)
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaFormat::Png => "png",
            MediaFormat::Jpeg => "jpg",
            MediaFormat::Gif => "gif",
            MediaFormat::Bmp => "bmp",
            MediaFormat::Tiff => "tiff",
            MediaFormat::Emf => "emf",
            MediaFormat::Wmf => "wmf",
            MediaFormat::Svg => "svg",
            MediaFormat::Other => "bin",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MediaAsset {
    pub id: MediaId,
    pub data: Vec<u8>,
    /// Path inside the DOCX archive, e.g. `word/media/image1.png`.
    pub archive_path: String,
    /// Path relative to the emitted `.tex`, e.g. `media/image1.png`.
    pub output_path: String,
    pub format: MediaFormat,
}

/// A recovered, non-fatal anomaly found while building the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub element: String,
    pub message: String,
}

impl Warning {
    pub fn new(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>: {}", self.element, self.message)
    }
}

pub struct Document {
    pub body: Vec<Block>,
    pub media: BTreeMap<MediaId, MediaAsset>,
    pub warnings: Vec<Warning>,
}

/// Per-task conversion switches. Field names serialize in camelCase so the
/// web client's JSON payload deserializes as-is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversionOptions {
    pub generate_toc: bool,
    pub overleaf_compatible: bool,
    pub preserve_styles: bool,
    pub preserve_line_breaks: bool,
    pub extract_media: bool,
    /// Absolute directory media would be written to outside Overleaf mode.
    pub media_root: Option<PathBuf>,
    /// Document skeleton with `$body$`-style placeholders, replacing the
    /// built-in one.
    pub template: Option<String>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            generate_toc: false,
            overleaf_compatible: true,
            preserve_styles: true,
            preserve_line_breaks: true,
            extract_media: true,
            media_root: None,
            template: None,
        }
    }
}

/// Characters that keep their TeX meaning inside `\includegraphics{}`.
const UNSAFE_PATH_CHARS: [char; 8] = ['%', '#', '{', '}', '$', '&', '~', '^'];

impl ConversionOptions {
    /// Reject a media root that cannot be written into `\includegraphics`
    /// verbatim. The root is only used outside Overleaf mode.
    pub fn validate(&self) -> Result<(), Error> {
        let Some(root) = self.media_root.as_deref() else {
            return Ok(());
        };
        if self.overleaf_compatible {
            return Ok(());
        }
        let root = root.to_string_lossy();
        if let Some(c) = root
            .chars()
            .find(|c| UNSAFE_PATH_CHARS.contains(c) || c.is_control())
        {
            return Err(Error::InvalidOptions(format!(
                "media root {root:?} contains {c:?}, which LaTeX cannot take in a file path"
            )));
        }
        Ok(())
    }
}
