mod numbering;
mod package;
mod styles;

use std::collections::{BTreeMap, HashMap};

use crate::error::Error;
use crate::model::{
    Block, Document, ImageRef, Inline, InlineStyle, MediaAsset, MediaId, Paragraph, ParagraphKind, Run, Table,
    TableCell, TableRow, Warning,
};

pub use package::Package;

use numbering::Numbering;
use styles::{Props, StyleSheet, parse_ppr, parse_rpr};

pub(super) const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const WPD_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const VML_NS: &str = "urn:schemas-microsoft-com:vml";
const MC_NS: &str = "http://schemas.openxmlformats.org/markup-compatibility/2006";
const MATH_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/math";

const EMU_PER_PT: f32 = 12700.0;

pub(super) fn twips_to_pts(twips: f32) -> f32 {
    twips / 20.0
}

pub(super) fn is_wml(node: roxmltree::Node, name: &str) -> bool {
    node.tag_name().name() == name && node.tag_name().namespace() == Some(WML_NS)
}

/// Parse a WML boolean toggle element (e.g., w:b, w:i, w:strike).
/// Present with no val or val != "0"/"false" means true.
pub(super) fn wml_bool(parent: roxmltree::Node, name: &str) -> Option<bool> {
    wml(parent, name).map(|n| {
        n.attribute((WML_NS, "val"))
            .is_none_or(|v| v != "0" && v != "false")
    })
}

pub(super) fn wml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children().find(|n| is_wml(*n, name))
}

pub(super) fn wml_attr<'a>(node: roxmltree::Node<'a, 'a>, child: &str) -> Option<&'a str> {
    wml(node, child).and_then(|n| n.attribute((WML_NS, "val")))
}

pub(super) fn twips_attr(node: roxmltree::Node, attr: &str) -> Option<f32> {
    node.attribute((WML_NS, attr))
        .and_then(|v| v.parse::<f32>().ok())
        .map(twips_to_pts)
}

/// Map Symbol-font private-use code points (as used by `w:sym`) to Unicode.
fn symbol_pua_to_unicode(cp: u32) -> Option<char> {
    let sym = cp.checked_sub(0xF000).unwrap_or(cp);
    let mapped = match sym {
        0xB7 => '\u{2022}', // bullet •
        0xA7 => '\u{25A0}', // black square ■ (Wingdings §)
        0xA8 => '\u{25CB}', // white circle ○
        0xD8 => '\u{2666}', // diamond ◆
        0x76 => '\u{221A}', // check mark √
        _ => return char::from_u32(sym),
    };
    Some(mapped)
}

/// Open a DOCX from memory and build its document model.
pub fn parse_bytes(bytes: &[u8]) -> Result<Document, Error> {
    build(Package::open(bytes)?)
}

/// Build the document model from an opened package.
pub fn build(mut package: Package) -> Result<Document, Error> {
    let styles = StyleSheet::parse(package.styles_xml.as_deref())?;
    let numbering = Numbering::parse(package.numbering_xml.as_deref())?;
    let media = std::mem::take(&mut package.media);

    let xml = roxmltree::Document::parse(&package.document_xml)?;
    let body = wml(xml.root_element(), "body")
        .ok_or_else(|| Error::MalformedPackage("missing w:body".into()))?;

    let mut builder = Builder {
        package: &package,
        media: &media,
        styles: &styles,
        numbering: &numbering,
        footnotes: HashMap::new(),
        fields: Vec::new(),
        warnings: Vec::new(),
    };
    builder.load_footnotes()?;
    let blocks = builder.build_blocks(body);
    let warnings = builder.warnings;

    if !warnings.is_empty() {
        log::info!("Document model built with {} warnings", warnings.len());
    }

    Ok(Document {
        body: blocks,
        media,
        warnings,
    })
}

/// Where a complex field (`w:fldChar`) currently is: its instruction text is
/// dropped, its cached result is kept.
#[derive(Clone, Copy, PartialEq)]
enum FieldPart {
    Instruction,
    Result,
}

struct RunContext<'l> {
    style: InlineStyle,
    link: Option<&'l str>,
}

struct Builder<'a> {
    package: &'a Package,
    media: &'a BTreeMap<MediaId, MediaAsset>,
    styles: &'a StyleSheet,
    numbering: &'a Numbering,
    footnotes: HashMap<String, Vec<Inline>>,
    fields: Vec<FieldPart>,
    warnings: Vec<Warning>,
}

impl Builder<'_> {
    fn warn(&mut self, element: &str, message: impl Into<String>) {
        let warning = Warning::new(element, message);
        log::warn!("Skipped {warning}");
        self.warnings.push(warning);
    }

    fn load_footnotes(&mut self) -> Result<(), Error> {
        let Some(xml_content) = self.package.footnotes_xml.as_deref() else {
            return Ok(());
        };
        let xml = roxmltree::Document::parse(xml_content)?;
        for note in xml.root_element().children().filter(|n| is_wml(*n, "footnote")) {
            if matches!(
                note.attribute((WML_NS, "type")),
                Some("separator" | "continuationSeparator" | "continuationNotice")
            ) {
                continue;
            }
            let Some(id) = note.attribute((WML_NS, "id")) else {
                continue;
            };
            let mut inlines = Vec::new();
            for para in note.children().filter(|n| is_wml(*n, "p")) {
                let props = self.paragraph_props(para);
                if !inlines.is_empty() {
                    inlines.push(Inline::LineBreak);
                }
                self.fields.clear();
                self.build_inlines(para, &props, None, &mut inlines);
            }
            trim_leading_space(&mut inlines);
            self.footnotes.insert(id.to_string(), inlines);
        }
        Ok(())
    }

    fn build_blocks(&mut self, parent: roxmltree::Node) -> Vec<Block> {
        let mut blocks = Vec::new();
        for node in parent.children().filter(|n| n.is_element()) {
            let name = node.tag_name().name();
            if node.tag_name().namespace() == Some(MATH_NS) {
                self.warn(name, "equations are not converted");
                continue;
            }
            if node.tag_name().namespace() != Some(WML_NS) {
                self.warn(name, "element outside WordprocessingML skipped");
                continue;
            }
            match name {
                "p" => blocks.push(Block::Paragraph(self.build_paragraph(node))),
                "tbl" => blocks.push(Block::Table(self.build_table(node))),
                "sdt" => {
                    if let Some(content) = wml(node, "sdtContent") {
                        blocks.extend(self.build_blocks(content));
                    }
                }
                "customXml" | "ins" | "moveTo" | "smartTag" => {
                    blocks.extend(self.build_blocks(node))
                }
                "sectPr" | "tcPr" | "tblPr" | "tblGrid" | "trPr" | "sdtPr" | "sdtEndPr"
                | "bookmarkStart" | "bookmarkEnd" | "proofErr" | "permStart" | "permEnd"
                | "commentRangeStart" | "commentRangeEnd" | "del" | "moveFrom"
                | "moveFromRangeStart" | "moveFromRangeEnd" | "moveToRangeStart"
                | "moveToRangeEnd" | "customXmlPr" => {}
                other => self.warn(other, "unrecognized block element skipped"),
            }
        }
        blocks
    }

    fn paragraph_props(&self, para: roxmltree::Node) -> Props {
        let ppr = wml(para, "pPr");
        let style_id = ppr.and_then(|p| wml_attr(p, "pStyle"));
        let direct = ppr.map(parse_ppr).unwrap_or_default();
        self.styles.paragraph_props(style_id, &direct)
    }

    fn build_paragraph(&mut self, node: roxmltree::Node) -> Paragraph {
        let props = self.paragraph_props(node);
        let style = self.styles.record(&props);

        let mut inlines = Vec::new();
        self.fields.clear();
        self.build_inlines(node, &props, None, &mut inlines);

        let kind = if let Some(level) = style.heading_level {
            ParagraphKind::Heading(level)
        } else if let Some(num) = &style.numbering {
            match self.numbering.marker(&num.num_id, num.level) {
                Some(marker) => ParagraphKind::ListItem {
                    num_id: num.num_id.clone(),
                    level: num.level,
                    marker,
                },
                None => {
                    let message = format!(
                        "numbering {} level {} is not defined, kept as plain paragraph",
                        num.num_id, num.level
                    );
                    self.warn("numPr", message);
                    ParagraphKind::Body
                }
            }
        } else {
            ParagraphKind::Body
        };

        Paragraph {
            kind,
            style,
            inlines,
        }
    }

    fn build_inlines(
        &mut self,
        parent: roxmltree::Node,
        para: &Props,
        link: Option<&str>,
        out: &mut Vec<Inline>,
    ) {
        for child in parent.children().filter(|n| n.is_element()) {
            let name = child.tag_name().name();
            match child.tag_name().namespace() {
                Some(WML_NS) => {}
                Some(MC_NS) if name == "AlternateContent" => {
                    if let Some(branch) = alternate_branch(child) {
                        self.build_inlines(branch, para, link, out);
                    }
                    continue;
                }
                Some(MATH_NS) => {
                    self.warn(name, "equations are not converted");
                    continue;
                }
                _ => {
                    self.warn(name, "inline element outside WordprocessingML skipped");
                    continue;
                }
            }
            match name {
                "r" => self.build_run(child, para, link, out),
                "hyperlink" => {
                    let package = self.package;
                    let url = child
                        .attribute((REL_NS, "id"))
                        .and_then(|id| package.hyperlink_target(id));
                    self.build_inlines(child, para, url.or(link), out);
                }
                "sdt" => {
                    if let Some(content) = wml(child, "sdtContent") {
                        self.build_inlines(content, para, link, out);
                    }
                }
                "smartTag" | "customXml" | "ins" | "moveTo" | "fldSimple" | "dir" | "bdo" => {
                    self.build_inlines(child, para, link, out)
                }
                "pPr" | "del" | "moveFrom" | "bookmarkStart" | "bookmarkEnd" | "proofErr"
                | "commentRangeStart" | "commentRangeEnd" | "permStart" | "permEnd"
                | "sdtPr" | "sdtEndPr" | "customXmlPr" | "smartTagPr" | "moveFromRangeStart"
                | "moveFromRangeEnd" | "moveToRangeStart" | "moveToRangeEnd" => {}
                other => self.warn(other, "unrecognized inline element skipped"),
            }
        }
    }

    fn in_field_instruction(&self) -> bool {
        self.fields.contains(&FieldPart::Instruction)
    }

    fn build_run(
        &mut self,
        run: roxmltree::Node,
        para: &Props,
        link: Option<&str>,
        out: &mut Vec<Inline>,
    ) {
        let rpr = wml(run, "rPr");
        let char_style = rpr.and_then(|n| wml_attr(n, "rStyle"));
        let direct = rpr.map(parse_rpr).unwrap_or_default();
        let props = self.styles.run_props(para, char_style, &direct);
        if props.is_hidden() {
            return;
        }
        let ctx = RunContext {
            style: self.styles.inline_style(&props),
            link,
        };
        let mut text = String::new();
        self.build_run_children(run, &ctx, &mut text, out);
        flush_text(&mut text, &ctx, out);
    }

    /// Walk the content of a `w:r`. Text accumulates in `text`; anything that
    /// is not text flushes it first so document order is kept.
    fn build_run_children(
        &mut self,
        parent: roxmltree::Node,
        ctx: &RunContext,
        text: &mut String,
        out: &mut Vec<Inline>,
    ) {
        for child in parent.children().filter(|n| n.is_element()) {
            let name = child.tag_name().name();
            if child.tag_name().namespace() == Some(MC_NS) && name == "AlternateContent" {
                if let Some(branch) = alternate_branch(child) {
                    self.build_run_children(branch, ctx, text, out);
                }
                continue;
            }
            if child.tag_name().namespace() != Some(WML_NS) {
                self.warn(name, "run content outside WordprocessingML skipped");
                continue;
            }
            match name {
                "fldChar" => match child.attribute((WML_NS, "fldCharType")) {
                    Some("begin") => self.fields.push(FieldPart::Instruction),
                    Some("separate") => {
                        if let Some(last) = self.fields.last_mut() {
                            *last = FieldPart::Result;
                        }
                    }
                    Some("end") => {
                        self.fields.pop();
                    }
                    _ => {}
                },
                _ if self.in_field_instruction() => {}
                "t" => {
                    if let Some(t) = child.text() {
                        // Word treats newlines in w:t as whitespace; only w:br creates line breaks
                        text.push_str(&t.replace('\n', " "));
                    }
                }
                "noBreakHyphen" => text.push('-'),
                "sym" => {
                    let ch = child
                        .attribute((WML_NS, "char"))
                        .and_then(|c| u32::from_str_radix(c, 16).ok())
                        .and_then(symbol_pua_to_unicode);
                    if let Some(ch) = ch {
                        text.push(ch);
                    }
                }
                "tab" | "ptab" => push_structural(ctx, text, out, Inline::Tab),
                "br" => {
                    let inline = match child.attribute((WML_NS, "type")) {
                        Some("page") => Inline::PageBreak,
                        _ => Inline::LineBreak,
                    };
                    push_structural(ctx, text, out, inline);
                }
                "cr" => push_structural(ctx, text, out, Inline::LineBreak),
                "drawing" => {
                    if let Some(image) = self.drawing_image(child) {
                        push_structural(ctx, text, out, Inline::Image(image));
                    }
                }
                "pict" | "object" => {
                    if let Some(image) = self.vml_image(child) {
                        push_structural(ctx, text, out, Inline::Image(image));
                    }
                }
                "footnoteReference" => {
                    let id = child.attribute((WML_NS, "id")).unwrap_or_default();
                    match self.footnotes.get(id).cloned() {
                        Some(note) => push_structural(ctx, text, out, Inline::Footnote(note)),
                        None => self.warn(name, format!("footnote {id} not found")),
                    }
                }
                "rPr" | "softHyphen" | "lastRenderedPageBreak" | "instrText" | "delText"
                | "footnoteRef" | "endnoteRef" | "separator" | "continuationSeparator"
                | "annotationRef" | "commentReference" => {}
                "endnoteReference" => self.warn(name, "endnotes are not converted"),
                other => self.warn(other, "unrecognized run content skipped"),
            }
        }
    }

    fn resolve_media(&mut self, element: &str, rel_id: &str) -> Option<MediaId> {
        let id = MediaId(rel_id.to_string());
        if self.media.contains_key(&id) {
            return Some(id);
        }
        self.warn(element, format!("image relationship {rel_id} has no embedded media"));
        None
    }

    fn drawing_image(&mut self, drawing: roxmltree::Node) -> Option<ImageRef> {
        let container = drawing.children().find(|n| {
            n.tag_name().namespace() == Some(WPD_NS)
                && matches!(n.tag_name().name(), "inline" | "anchor")
        });
        let Some(container) = container else {
            self.warn("drawing", "drawing without inline or anchor container");
            return None;
        };
        let blip = container
            .descendants()
            .find(|n| n.tag_name().name() == "blip" && n.tag_name().namespace() == Some(DML_NS));
        let Some(rel_id) = blip.and_then(|b| b.attribute((REL_NS, "embed"))) else {
            self.warn("drawing", "drawing is not a picture (shape, chart or linked image)");
            return None;
        };
        let media = self.resolve_media("drawing", rel_id)?;

        let extent = container.children().find(|n| {
            n.tag_name().name() == "extent" && n.tag_name().namespace() == Some(WPD_NS)
        });
        let emu = |attr: &str| {
            extent
                .and_then(|n| n.attribute(attr))
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(0.0)
        };
        let description = container
            .children()
            .find(|n| n.tag_name().name() == "docPr" && n.tag_name().namespace() == Some(WPD_NS))
            .and_then(|n| n.attribute("descr"))
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string);

        Some(ImageRef {
            media,
            width_pt: emu("cx") / EMU_PER_PT,
            height_pt: emu("cy") / EMU_PER_PT,
            description,
        })
    }

    fn vml_image(&mut self, pict: roxmltree::Node) -> Option<ImageRef> {
        let imagedata = pict.descendants().find(|n| {
            n.tag_name().name() == "imagedata" && n.tag_name().namespace() == Some(VML_NS)
        });
        let Some(rel_id) = imagedata.and_then(|n| n.attribute((REL_NS, "id"))) else {
            self.warn(pict.tag_name().name(), "VML object without image data");
            return None;
        };
        let media = self.resolve_media("pict", rel_id)?;
        let style = imagedata
            .and_then(|n| n.parent())
            .and_then(|shape| shape.attribute("style"))
            .unwrap_or_default();
        Some(ImageRef {
            media,
            width_pt: vml_length(style, "width"),
            height_pt: vml_length(style, "height"),
            description: imagedata
                .and_then(|n| n.attribute("title"))
                .map(str::to_string),
        })
    }

    fn build_table(&mut self, node: roxmltree::Node) -> Table {
        let col_widths: Vec<f32> = wml(node, "tblGrid")
            .into_iter()
            .flat_map(|grid| grid.children())
            .filter(|n| is_wml(*n, "gridCol"))
            .filter_map(|n| twips_attr(n, "w"))
            .collect();

        let mut rows = Vec::new();
        for tr in table_children(node, "tr") {
            let is_header = wml(tr, "trPr").is_some_and(|pr| wml_bool(pr, "tblHeader") == Some(true));
            let mut cells = Vec::new();
            for tc in table_children(tr, "tc") {
                let tc_pr = wml(tc, "tcPr");
                let grid_span = tc_pr
                    .and_then(|pr| wml_attr(pr, "gridSpan"))
                    .and_then(|v| v.parse::<u16>().ok())
                    .unwrap_or(1)
                    .max(1);
                let merged_above = tc_pr
                    .and_then(|pr| wml(pr, "vMerge"))
                    .is_some_and(|vm| vm.attribute((WML_NS, "val")).is_none_or(|v| v == "continue"));
                let blocks = if merged_above {
                    Vec::new()
                } else {
                    self.build_blocks(tc)
                };
                cells.push(TableCell {
                    blocks,
                    grid_span,
                    merged_above,
                });
            }
            if cells.is_empty() {
                self.warn("tr", "table row without cells skipped");
                continue;
            }
            rows.push(TableRow { cells, is_header });
        }

        Table { col_widths, rows }
    }
}

/// Collect `w:tr` / `w:tc` children, looking through content-control and
/// custom XML wrappers.
fn table_children<'a>(parent: roxmltree::Node<'a, 'a>, name: &str) -> Vec<roxmltree::Node<'a, 'a>> {
    let mut nodes = Vec::new();
    for child in parent.children() {
        if is_wml(child, name) {
            nodes.push(child);
        } else if is_wml(child, "sdt") {
            if let Some(content) = wml(child, "sdtContent") {
                nodes.extend(table_children(content, name));
            }
        } else if is_wml(child, "customXml") {
            nodes.extend(table_children(child, name));
        }
    }
    nodes
}

/// Prefer the `mc:Choice` branch, fall back to `mc:Fallback`.
fn alternate_branch<'a>(node: roxmltree::Node<'a, 'a>) -> Option<roxmltree::Node<'a, 'a>> {
    let branch = |name: &str| {
        node.children()
            .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(MC_NS))
    };
    branch("Choice").or_else(|| branch("Fallback"))
}

/// Read "width:120pt" / "height:1.5in" style entries from a VML shape.
fn vml_length(style: &str, key: &str) -> f32 {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .find(|(k, _)| k.trim() == key)
        .and_then(|(_, v)| {
            let v = v.trim();
            let (num, factor) = if let Some(n) = v.strip_suffix("pt") {
                (n, 1.0)
            } else if let Some(n) = v.strip_suffix("in") {
                (n, 72.0)
            } else if let Some(n) = v.strip_suffix("cm") {
                (n, 72.0 / 2.54)
            } else if let Some(n) = v.strip_suffix("px") {
                (n, 0.75)
            } else {
                (v, 1.0)
            };
            num.trim().parse::<f32>().ok().map(|n| n * factor)
        })
        .unwrap_or(0.0)
}

/// Flush pending text, then push a non-text inline so document order holds.
fn push_structural(ctx: &RunContext, text: &mut String, out: &mut Vec<Inline>, inline: Inline) {
    flush_text(text, ctx, out);
    out.push(inline);
}

/// Push pending run text, merging it into the previous run when style and
/// link match so split runs (spell-check, revision marks) read as one.
fn flush_text(text: &mut String, ctx: &RunContext, out: &mut Vec<Inline>) {
    if text.is_empty() {
        return;
    }
    let text = std::mem::take(text);
    if let Some(Inline::Text(prev)) = out.last_mut()
        && prev.style == ctx.style
        && prev.hyperlink.as_deref() == ctx.link
    {
        prev.text.push_str(&text);
        return;
    }
    out.push(Inline::Text(Run {
        text,
        style: ctx.style,
        hyperlink: ctx.link.map(str::to_string),
    }));
}

fn trim_leading_space(inlines: &mut [Inline]) {
    if let Some(Inline::Text(run)) = inlines.first_mut() {
        let trimmed = run.text.trim_start().len();
        let start = run.text.len() - trimmed;
        run.text.drain(..start);
    }
}
