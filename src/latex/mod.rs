mod escape;
mod list;
mod media;
mod table;
mod template;

use std::collections::{BTreeMap, HashMap};

use crate::error::Error;
use crate::model::{
    Block, ConversionOptions, Document, FontSizeClass, ImageRef, Inline, MediaAsset, Paragraph,
    ParagraphKind, Run, VertAlign, Warning,
};

pub use escape::{escape_text, escape_url};

use list::Segment;
use media::Manifest;
use template::Template;

/// `\textwidth` of the 10pt article class.
const TEXT_WIDTH_PT: f32 = 345.0;

const SECTIONS: [&str; 5] = [
    "section",
    "subsection",
    "subsubsection",
    "paragraph",
    "subparagraph",
];

/// Result of emitting one document.
#[derive(Clone, Debug)]
pub struct Emitted {
    pub latex: String,
    /// Media referenced by `latex`, sorted by output path.
    pub manifest: Vec<MediaAsset>,
    pub warnings: Vec<Warning>,
}

/// Render `document` to a complete LaTeX source file.
///
/// Output is a pure function of the model and the options: emitting the
/// same document twice yields identical text and manifest.
pub fn emit(document: &Document, options: &ConversionOptions) -> Result<Emitted, Error> {
    options.validate()?;
    let template = options.template.as_deref().map(Template::parse).transpose()?;
    let mut emitter = Emitter::new(document, options);
    emitter.blocks(&document.body)?;
    let emitted = emitter.finish(template.as_ref());
    log::debug!(
        "Emitted {} bytes of LaTeX, {} media files",
        emitted.latex.len(),
        emitted.manifest.len()
    );
    Ok(emitted)
}

/// Where inline content ends up; restricts what can be emitted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) enum Mode {
    Paragraph,
    /// Sectioning argument: plain text only.
    Heading,
    /// Tabular cell, with the column's share of `\linewidth`.
    Cell(f32),
    Footnote,
}

enum Graphic {
    Included(String),
    Placeholder(String),
}

pub(super) struct Emitter<'d> {
    doc: &'d Document,
    options: &'d ConversionOptions,
    body: String,
    title: Option<String>,
    manifest: Manifest,
    /// Last number emitted per (numId, level), for continued numbering.
    list_numbers: HashMap<(String, u8), u32>,
    uses_graphics: bool,
    warnings: Vec<Warning>,
}

impl<'d> Emitter<'d> {
    fn new(doc: &'d Document, options: &'d ConversionOptions) -> Self {
        Self {
            doc,
            options,
            body: String::new(),
            title: None,
            manifest: Manifest::default(),
            list_numbers: HashMap::new(),
            uses_graphics: false,
            warnings: Vec::new(),
        }
    }

    pub(super) fn push(&mut self, text: &str) {
        self.body.push_str(text);
    }

    pub(super) fn warn(&mut self, element: &str, message: impl Into<String>) {
        let warning = Warning::new(element, message);
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    fn blocks(&mut self, blocks: &'d [Block]) -> Result<(), Error> {
        for segment in list::segments(blocks) {
            match segment {
                Segment::List(entries) => self.list(&entries)?,
                Segment::Block(Block::Paragraph(p)) => self.paragraph(p)?,
                Segment::Block(Block::Table(t)) => self.table(t)?,
            }
        }
        Ok(())
    }

    fn paragraph(&mut self, p: &'d Paragraph) -> Result<(), Error> {
        if p.style.page_break_before {
            self.push("\\newpage\n\n");
        }
        match p.kind {
            ParagraphKind::Heading(0) if self.title.is_none() => {
                let text = self.inlines(&p.inlines, Mode::Heading)?;
                let text = text.trim();
                if !text.is_empty() {
                    self.title = Some(text.to_string());
                }
                Ok(())
            }
            ParagraphKind::Heading(level) => self.heading(level.max(1), p),
            ParagraphKind::Body | ParagraphKind::ListItem { .. } => self.body_paragraph(p),
        }
    }

    fn heading(&mut self, level: u8, p: &'d Paragraph) -> Result<(), Error> {
        let text = self.inlines(&p.inlines, Mode::Heading)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let command = SECTIONS[(level as usize - 1).min(SECTIONS.len() - 1)];
        let star = if self.options.generate_toc { "" } else { "*" };
        self.push(&format!("\\{command}{star}{{{text}}}\n\n"));
        Ok(())
    }

    fn body_paragraph(&mut self, p: &'d Paragraph) -> Result<(), Error> {
        if p.is_empty() {
            if self.options.preserve_line_breaks {
                self.push("\\medskip\n\n");
            }
            return Ok(());
        }
        if self.options.preserve_styles
            && let Some(image) = p.sole_image()
        {
            return self.figure(image);
        }

        let text = self.inlines(&p.inlines, Mode::Paragraph)?;
        let text = text.trim_start();
        if text.is_empty() {
            return Ok(());
        }
        if !self.options.preserve_styles {
            self.push(&format!("{text}\n\n"));
            return Ok(());
        }
        let wrapped = match p.style.alignment {
            crate::model::Alignment::Center => {
                format!("\\begin{{center}}\n{text}\n\\end{{center}}\n\n")
            }
            crate::model::Alignment::Right => {
                format!("\\begin{{flushright}}\n{text}\n\\end{{flushright}}\n\n")
            }
            _ if p.style.indent_level > 0 => format!(
                "{{\\setlength{{\\leftskip}}{{{}em}}\n{text}\n\\par}}\n\n",
                2 * p.style.indent_level as u32
            ),
            _ => format!("{text}\n\n"),
        };
        self.push(&wrapped);
        Ok(())
    }

    fn figure(&mut self, image: &ImageRef) -> Result<(), Error> {
        match self.image(image, TEXT_WIDTH_PT)? {
            Graphic::Included(graphic) => {
                self.push(&format!(
                    "\\begin{{figure}}[H]\n\\centering\n{graphic}\n\\end{{figure}}\n\n"
                ));
            }
            Graphic::Placeholder(comment) => {
                self.push(&comment);
                self.push("\n");
            }
        }
        Ok(())
    }

    fn image(&mut self, image: &ImageRef, max_width_pt: f32) -> Result<Graphic, Error> {
        let asset = self
            .doc
            .media
            .get(&image.media)
            .ok_or_else(|| Error::MissingMedia(image.media.to_string()))?;
        if !self.options.extract_media {
            return Ok(Graphic::Placeholder(format!(
                "% image omitted: {}\n",
                asset.output_path
            )));
        }
        let Some(output_path) = self.manifest.include(asset, &mut self.warnings) else {
            return Ok(Graphic::Placeholder(format!(
                "% image not included: {}\n",
                asset.output_path
            )));
        };
        self.uses_graphics = true;

        let path = media::reference_path(
            &output_path,
            self.options.overleaf_compatible,
            self.options.media_root.as_deref(),
        );
        let width = if image.width_pt > 0.0 && image.width_pt < max_width_pt {
            format!("width={:.1}pt", image.width_pt)
        } else {
            String::from("width=\\linewidth")
        };
        Ok(Graphic::Included(format!(
            "\\includegraphics[{width}]{{{path}}}"
        )))
    }

    /// Render a run of inline content. Trailing whitespace and trailing hard
    /// breaks are dropped; a trailing comment keeps its newline.
    pub(super) fn inlines(&mut self, inlines: &'d [Inline], mode: Mode) -> Result<String, Error> {
        let mut out = String::new();
        let mut line_has_content = false;
        let mut ends_in_comment = false;
        let mut after_hard_break = false;

        for inline in inlines {
            match inline {
                Inline::Text(run) => {
                    let rendered = self.run(run, mode);
                    if after_hard_break {
                        out.push_str(bracket_guard(&rendered));
                    }
                    out.push_str(&rendered);
                    if !run.text.trim().is_empty() {
                        line_has_content = true;
                        ends_in_comment = false;
                        after_hard_break = false;
                    }
                }
                Inline::Tab => {
                    after_hard_break = false;
                    out.push_str(if mode == Mode::Heading { " " } else { "\\quad " });
                }
                Inline::LineBreak => {
                    let hard = self.options.preserve_line_breaks && line_has_content;
                    match mode {
                        Mode::Paragraph | Mode::Footnote if hard => {
                            out.push_str("\\\\\n");
                            after_hard_break = true;
                        }
                        Mode::Cell(_) if hard => out.push_str(" \\newline "),
                        _ => out.push(' '),
                    }
                    line_has_content = false;
                }
                Inline::PageBreak => {
                    if mode == Mode::Paragraph {
                        out.push_str("\n\\newpage\n");
                        line_has_content = false;
                        ends_in_comment = false;
                        after_hard_break = false;
                    }
                }
                Inline::Image(image) => {
                    let max_width = match mode {
                        Mode::Heading => {
                            log::debug!("Dropping image {} inside a heading", image.media);
                            continue;
                        }
                        Mode::Cell(fraction) => fraction * TEXT_WIDTH_PT,
                        Mode::Paragraph | Mode::Footnote => TEXT_WIDTH_PT,
                    };
                    match self.image(image, max_width)? {
                        Graphic::Included(graphic) => {
                            out.push_str(&graphic);
                            line_has_content = true;
                            ends_in_comment = false;
                            after_hard_break = false;
                        }
                        Graphic::Placeholder(comment) => {
                            if !out.is_empty() && !out.ends_with('\n') {
                                out.push('\n');
                            }
                            out.push_str(&comment);
                            ends_in_comment = true;
                        }
                    }
                }
                Inline::Footnote(note) => {
                    after_hard_break = false;
                    if mode == Mode::Heading {
                        continue;
                    }
                    let text = self.inlines(note, Mode::Footnote)?;
                    out.push_str(&format!("\\footnote{{{}}}", text.trim_start()));
                    line_has_content = true;
                    ends_in_comment = false;
                }
            }
        }

        let mut end = out.trim_end().len();
        while out[..end].ends_with("\\\\") {
            end = out[..end - 2].trim_end().len();
        }
        out.truncate(end);
        if ends_in_comment {
            out.push('\n');
        }
        Ok(out)
    }

    fn run(&self, run: &Run, mode: Mode) -> String {
        let mut text = escape_text(&run.text);
        if run.text.trim().is_empty() {
            return text;
        }
        let style = run.style;
        if self.options.preserve_styles && mode != Mode::Heading {
            if style.strike {
                text = format!("\\sout{{{text}}}");
            }
            if style.underline {
                text = format!("\\underline{{{text}}}");
            }
            if style.italic {
                text = format!("\\textit{{{text}}}");
            }
            if style.bold {
                text = format!("\\textbf{{{text}}}");
            }
            if let Some(switch) = size_switch(style.size) {
                text = format!("{{{switch} {text}}}");
            }
        }
        match style.vertical_align {
            VertAlign::Superscript => text = format!("\\textsuperscript{{{text}}}"),
            VertAlign::Subscript => text = format!("\\textsubscript{{{text}}}"),
            VertAlign::Baseline => {}
        }
        if let Some(url) = &run.hyperlink
            && mode != Mode::Heading
        {
            text = format!("\\href{{{}}}{{{text}}}", escape_url(url));
        }
        text
    }

    fn packages(&self) -> Vec<&'static str> {
        let mut packages = vec![
            "\\usepackage[utf8]{inputenc}",
            "\\usepackage[T1]{fontenc}",
            "\\usepackage{textcomp}",
            "\\usepackage{amsmath}",
            "\\usepackage{amssymb}",
        ];
        if self.options.preserve_styles {
            packages.extend([
                "\\usepackage{graphicx}",
                "\\usepackage{longtable}",
                "\\usepackage{booktabs}",
                "\\usepackage{array}",
                "\\usepackage{float}",
                "\\usepackage{enumitem}",
                "\\usepackage[normalem]{ulem}",
            ]);
        } else if self.uses_graphics {
            packages.push("\\usepackage{graphicx}");
        }
        // hyperref must come last
        packages.push("\\usepackage{hyperref}");
        packages
    }

    fn skeleton(&self) -> String {
        let mut latex = String::with_capacity(self.body.len() + 1024);
        latex.push_str("\\documentclass{article}\n");
        for package in self.packages() {
            latex.push_str(package);
            latex.push('\n');
        }
        if let Some(title) = &self.title {
            latex.push_str(&format!("\n\\title{{{title}}}\n\\author{{}}\n\\date{{}}\n"));
        }
        latex.push_str("\n\\begin{document}\n\n");
        if self.title.is_some() {
            latex.push_str("\\maketitle\n\n");
        }
        if self.options.generate_toc {
            latex.push_str("\\tableofcontents\n\\newpage\n\n");
        }
        latex.push_str(self.body.trim_end());
        latex.push_str("\n\n\\end{document}\n");
        latex
    }

    /// `header-includes` carries the packages the body needs, so a template
    /// without it may not compile.
    fn fill(&mut self, template: &Template<'_>) -> String {
        let flag = |on: bool| (if on { "true" } else { "" }).to_string();
        let vars = BTreeMap::from([
            ("body", self.body.trim_end().to_string()),
            ("title", self.title.clone().unwrap_or_default()),
            ("author", String::new()),
            ("date", String::new()),
            ("documentclass", "article".to_string()),
            ("toc", flag(self.options.generate_toc)),
            ("graphics", flag(self.uses_graphics)),
            ("header-includes", self.packages().join("\n")),
        ]);
        let (latex, unknown) = template.render(&vars);
        for name in unknown {
            self.warn("template", format!("unknown variable ${name}$ left empty"));
        }
        latex
    }

    fn finish(mut self, template: Option<&Template<'_>>) -> Emitted {
        let latex = match template {
            Some(template) => self.fill(template),
            None => self.skeleton(),
        };
        let mut warnings = self.doc.warnings.clone();
        warnings.extend(self.warnings);
        Emitted {
            latex,
            manifest: self.manifest.into_assets(),
            warnings,
        }
    }
}

/// `\item`, `\\` and the booktabs rules look ahead for `[` (and `\\` for
/// `*`) past any whitespace. An empty group ends that lookahead.
pub(super) fn bracket_guard(text: &str) -> &'static str {
    if text.trim_start().starts_with(['[', '*']) {
        "{}"
    } else {
        ""
    }
}

fn size_switch(size: FontSizeClass) -> Option<&'static str> {
    match size {
        FontSizeClass::Tiny => Some("\\scriptsize"),
        FontSizeClass::Small => Some("\\small"),
        FontSizeClass::Normal => None,
        FontSizeClass::Large => Some("\\large"),
        FontSizeClass::Larger => Some("\\Large"),
        FontSizeClass::Huge => Some("\\LARGE"),
    }
}
