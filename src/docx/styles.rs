use std::collections::HashMap;

use crate::error::Error;
use crate::model::{Alignment, FontSizeClass, InlineStyle, NumberingRef, StyleRecord, VertAlign};

use super::{WML_NS, is_wml, twips_attr, wml, wml_attr, wml_bool};

/// Word's built-in default when `w:docDefaults` carries no size.
const DEFAULT_FONT_SIZE: f32 = 10.0;
/// One indent step, 0.5 inch in points.
const INDENT_STEP: f32 = 36.0;

/// Formatting attributes as written at one scope. `None` means "inherit".
#[derive(Clone, Debug, Default, PartialEq)]
pub(super) struct Props {
    pub(super) bold: Option<bool>,
    pub(super) italic: Option<bool>,
    pub(super) underline: Option<bool>,
    pub(super) strike: Option<bool>,
    pub(super) vanish: Option<bool>,
    pub(super) font_size: Option<f32>,
    pub(super) vertical_align: Option<VertAlign>,
    pub(super) alignment: Option<Alignment>,
    pub(super) indent_left: Option<f32>,
    pub(super) num_id: Option<String>,
    pub(super) num_level: Option<u8>,
    /// 0 = title, 1..=9 = heading level.
    pub(super) heading_level: Option<u8>,
    pub(super) page_break_before: Option<bool>,
}

impl Props {
    /// Layer `closer` on top of `self`; every attribute `closer` sets wins.
    pub(super) fn overlay(&self, closer: &Props) -> Props {
        macro_rules! pick {
            ($field:ident) => {
                closer.$field.clone().or_else(|| self.$field.clone())
            };
        }
        Props {
            bold: pick!(bold),
            italic: pick!(italic),
            underline: pick!(underline),
            strike: pick!(strike),
            vanish: pick!(vanish),
            font_size: pick!(font_size),
            vertical_align: pick!(vertical_align),
            alignment: pick!(alignment),
            indent_left: pick!(indent_left),
            num_id: pick!(num_id),
            num_level: pick!(num_level),
            heading_level: pick!(heading_level),
            page_break_before: pick!(page_break_before),
        }
    }

    pub(super) fn is_hidden(&self) -> bool {
        self.vanish == Some(true)
    }
}

pub(super) fn parse_alignment(val: &str) -> Alignment {
    match val {
        "center" => Alignment::Center,
        "right" | "end" => Alignment::Right,
        "both" | "distribute" => Alignment::Justify,
        _ => Alignment::Left,
    }
}

/// Read run-level formatting from a `w:rPr` element.
pub(super) fn parse_rpr(rpr: roxmltree::Node) -> Props {
    Props {
        bold: wml_bool(rpr, "b"),
        italic: wml_bool(rpr, "i"),
        underline: wml(rpr, "u")
            .and_then(|u| u.attribute((WML_NS, "val")))
            .map(|v| v != "none"),
        strike: wml_bool(rpr, "strike").or_else(|| wml_bool(rpr, "dstrike")),
        vanish: wml_bool(rpr, "vanish"),
        font_size: wml_attr(rpr, "sz")
            .and_then(|v| v.parse::<f32>().ok())
            .map(|hp| hp / 2.0),
        vertical_align: wml_attr(rpr, "vertAlign").map(|v| match v {
            "superscript" => VertAlign::Superscript,
            "subscript" => VertAlign::Subscript,
            _ => VertAlign::Baseline,
        }),
        ..Props::default()
    }
}

/// Read paragraph-level formatting from a `w:pPr` element.
pub(super) fn parse_ppr(ppr: roxmltree::Node) -> Props {
    let num_pr = wml(ppr, "numPr");
    let indent_left = wml(ppr, "ind").and_then(|ind| {
        twips_attr(ind, "left").or_else(|| twips_attr(ind, "start"))
    });
    let heading_level = wml_attr(ppr, "outlineLvl")
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|lvl| *lvl < 9)
        .map(|lvl| lvl + 1);
    Props {
        alignment: wml_attr(ppr, "jc").map(parse_alignment),
        indent_left,
        num_id: num_pr.and_then(|n| wml_attr(n, "numId")).map(str::to_string),
        num_level: num_pr
            .and_then(|n| wml_attr(n, "ilvl"))
            .and_then(|v| v.parse::<u8>().ok()),
        heading_level,
        page_break_before: wml_bool(ppr, "pageBreakBefore"),
        ..Props::default()
    }
}

/// "heading 2" / "Heading2" → 2, "Title" → 0.
fn heading_level_from_name(name: &str) -> Option<u8> {
    let lower = name.to_ascii_lowercase();
    if lower == "title" {
        return Some(0);
    }
    let rest = lower.strip_prefix("heading")?.trim();
    rest.parse::<u8>().ok().filter(|n| (1..=9).contains(n))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StyleType {
    Paragraph,
    Character,
    Other,
}

struct StyleDef {
    id: String,
    kind: StyleType,
    based_on: Option<String>,
    props: Props,
}

/// Style definitions of one document, flattened along their based-on
/// chains. Built fresh for every conversion.
pub(super) struct StyleSheet {
    defaults: Props,
    base_font_size: f32,
    styles: Vec<StyleDef>,
    index: HashMap<String, usize>,
    /// Chain-flattened props per arena index, without document defaults.
    resolved: Vec<Props>,
    default_paragraph: Option<usize>,
}

impl StyleSheet {
    pub(super) fn parse(xml_content: Option<&str>) -> Result<StyleSheet, Error> {
        let mut sheet = StyleSheet {
            defaults: Props::default(),
            base_font_size: DEFAULT_FONT_SIZE,
            styles: Vec::new(),
            index: HashMap::new(),
            resolved: Vec::new(),
            default_paragraph: None,
        };
        let Some(xml_content) = xml_content else {
            return Ok(sheet);
        };
        let xml = roxmltree::Document::parse(xml_content)?;
        let root = xml.root_element();

        if let Some(doc_defaults) = wml(root, "docDefaults") {
            let rpr = wml(doc_defaults, "rPrDefault")
                .and_then(|n| wml(n, "rPr"))
                .map(parse_rpr)
                .unwrap_or_default();
            let ppr = wml(doc_defaults, "pPrDefault")
                .and_then(|n| wml(n, "pPr"))
                .map(parse_ppr)
                .unwrap_or_default();
            sheet.defaults = ppr.overlay(&rpr);
            if let Some(size) = sheet.defaults.font_size {
                sheet.base_font_size = size;
            }
        }

        for style_node in root.children().filter(|n| is_wml(*n, "style")) {
            let Some(style_id) = style_node.attribute((WML_NS, "styleId")) else {
                continue;
            };
            let kind = match style_node.attribute((WML_NS, "type")) {
                Some("paragraph") => StyleType::Paragraph,
                Some("character") => StyleType::Character,
                _ => StyleType::Other,
            };
            let ppr = wml(style_node, "pPr").map(parse_ppr).unwrap_or_default();
            let rpr = wml(style_node, "rPr").map(parse_rpr).unwrap_or_default();
            let mut props = ppr.overlay(&rpr);
            if props.heading_level.is_none() {
                let name = wml_attr(style_node, "name").unwrap_or(style_id);
                props.heading_level =
                    heading_level_from_name(name).or_else(|| heading_level_from_name(style_id));
            }
            let based_on = wml_attr(style_node, "basedOn").map(str::to_string);

            let idx = sheet.styles.len();
            if kind == StyleType::Paragraph
                && style_node
                    .attribute((WML_NS, "default"))
                    .is_some_and(|v| v == "1" || v == "true")
            {
                sheet.default_paragraph = Some(idx);
            }
            if sheet.index.insert(style_id.to_string(), idx).is_some() {
                log::warn!("Duplicate style id '{style_id}', later definition wins");
            }
            sheet.styles.push(StyleDef {
                id: style_id.to_string(),
                kind,
                based_on,
                props,
            });
        }

        if sheet.default_paragraph.is_none() {
            sheet.default_paragraph = sheet.index.get("Normal").copied();
        }

        let mut resolved = Vec::with_capacity(sheet.styles.len());
        for idx in 0..sheet.styles.len() {
            let chain = sheet.chain(idx)?;
            let flat = chain
                .iter()
                .rev()
                .fold(Props::default(), |acc, &i| acc.overlay(&sheet.styles[i].props));
            resolved.push(flat);
        }
        sheet.resolved = resolved;

        log::debug!(
            "Resolved {} styles (base font size {}pt)",
            sheet.styles.len(),
            sheet.base_font_size
        );
        Ok(sheet)
    }

    /// Walk the based-on chain starting at `start`, closest first.
    ///
    /// A chain may not revisit a style nor grow past the number of styles.
    fn chain(&self, start: usize) -> Result<Vec<usize>, Error> {
        let mut chain = Vec::new();
        let mut visiting = vec![false; self.styles.len()];
        let mut current = Some(start);
        while let Some(idx) = current {
            if visiting[idx] || chain.len() >= self.styles.len() {
                return Err(Error::StyleCycle {
                    style_id: self.styles[start].id.clone(),
                });
            }
            visiting[idx] = true;
            chain.push(idx);
            current = match self.styles[idx].based_on.as_deref() {
                Some(parent) => {
                    let found = self.index.get(parent).copied();
                    if found.is_none() {
                        log::warn!(
                            "Style '{}' is based on unknown style '{parent}'",
                            self.styles[idx].id
                        );
                    }
                    found
                }
                None => None,
            };
        }
        Ok(chain)
    }

    fn lookup(&self, style_id: &str, kind: StyleType) -> Option<&Props> {
        let idx = *self.index.get(style_id)?;
        if self.styles[idx].kind != kind {
            log::debug!("Style '{style_id}' used as {kind:?} but is {:?}", self.styles[idx].kind);
        }
        self.resolved.get(idx)
    }

    /// Effective paragraph props: defaults < style chain < direct formatting.
    pub(super) fn paragraph_props(&self, style_id: Option<&str>, direct: &Props) -> Props {
        let style = match style_id {
            Some(id) => self.lookup(id, StyleType::Paragraph),
            None => self.default_paragraph.and_then(|i| self.resolved.get(i)),
        };
        match style {
            Some(style) => self.defaults.overlay(style).overlay(direct),
            None => self.defaults.overlay(direct),
        }
    }

    /// Effective run props: paragraph < character style chain < direct formatting.
    pub(super) fn run_props(
        &self,
        paragraph: &Props,
        char_style: Option<&str>,
        direct: &Props,
    ) -> Props {
        match char_style.and_then(|id| self.lookup(id, StyleType::Character)) {
            Some(style) => paragraph.overlay(style).overlay(direct),
            None => paragraph.overlay(direct),
        }
    }

    pub(super) fn record(&self, props: &Props) -> StyleRecord {
        let numbering = props
            .num_id
            .as_ref()
            .filter(|id| id.as_str() != "0")
            .map(|id| NumberingRef {
                num_id: id.clone(),
                level: props.num_level.unwrap_or(0),
            });
        StyleRecord {
            bold: props.bold.unwrap_or(false),
            italic: props.italic.unwrap_or(false),
            underline: props.underline.unwrap_or(false),
            strike: props.strike.unwrap_or(false),
            alignment: props.alignment.unwrap_or_default(),
            indent_level: props
                .indent_left
                .map(|pt| (pt / INDENT_STEP).round().clamp(0.0, 9.0) as u8)
                .unwrap_or(0),
            size: self.size_class(props),
            numbering,
            heading_level: props.heading_level,
            page_break_before: props.page_break_before.unwrap_or(false),
        }
    }

    pub(super) fn inline_style(&self, props: &Props) -> InlineStyle {
        InlineStyle {
            bold: props.bold.unwrap_or(false),
            italic: props.italic.unwrap_or(false),
            underline: props.underline.unwrap_or(false),
            strike: props.strike.unwrap_or(false),
            size: self.size_class(props),
            vertical_align: props.vertical_align.unwrap_or_default(),
        }
    }

    fn size_class(&self, props: &Props) -> FontSizeClass {
        props
            .font_size
            .map(|pt| FontSizeClass::from_points(pt, self.base_font_size))
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn resolved_by_id(&self) -> Vec<(String, StyleRecord)> {
        let mut out: Vec<(String, StyleRecord)> = self
            .styles
            .iter()
            .zip(&self.resolved)
            .map(|(def, props)| (def.id.clone(), self.record(&self.defaults.overlay(props))))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
