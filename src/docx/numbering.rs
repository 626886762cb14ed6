use std::collections::HashMap;

use crate::error::Error;
use crate::model::{ListKind, ListMarker, NumberFormat};

use super::{WML_NS, is_wml, wml, wml_attr};

struct LevelDef {
    num_fmt: String,
    start: u32,
}

struct NumDef {
    abstract_id: String,
    start_overrides: HashMap<u8, u32>,
}

/// `word/numbering.xml`: abstract list definitions and the concrete
/// numbering instances paragraphs refer to by `w:numId`.
pub(super) struct Numbering {
    abstract_nums: HashMap<String, HashMap<u8, LevelDef>>,
    nums: HashMap<String, NumDef>,
}

fn parse_levels<'a>(
    parent: roxmltree::Node<'a, 'a>,
) -> impl Iterator<Item = (u8, roxmltree::Node<'a, 'a>)> {
    parent.children().filter(|n| is_wml(*n, "lvl")).filter_map(|lvl| {
        lvl.attribute((WML_NS, "ilvl"))
            .and_then(|v| v.parse::<u8>().ok())
            .map(|ilvl| (ilvl, lvl))
    })
}

fn level_def(lvl: roxmltree::Node) -> LevelDef {
    LevelDef {
        num_fmt: wml_attr(lvl, "numFmt").unwrap_or("bullet").to_string(),
        start: wml_attr(lvl, "start")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1),
    }
}

fn list_kind(num_fmt: &str) -> ListKind {
    match num_fmt {
        "bullet" | "none" => ListKind::Bullet,
        "lowerLetter" => ListKind::Ordered(NumberFormat::LowerLetter),
        "upperLetter" => ListKind::Ordered(NumberFormat::UpperLetter),
        "lowerRoman" => ListKind::Ordered(NumberFormat::LowerRoman),
        "upperRoman" => ListKind::Ordered(NumberFormat::UpperRoman),
        _ => ListKind::Ordered(NumberFormat::Decimal),
    }
}

impl Numbering {
    pub(super) fn parse(xml_content: Option<&str>) -> Result<Numbering, Error> {
        let mut abstract_nums: HashMap<String, HashMap<u8, LevelDef>> = HashMap::new();
        let mut nums: HashMap<String, NumDef> = HashMap::new();

        let Some(xml_content) = xml_content else {
            return Ok(Numbering {
                abstract_nums,
                nums,
            });
        };
        let xml = roxmltree::Document::parse(xml_content)?;

        for node in xml.root_element().children() {
            if node.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            match node.tag_name().name() {
                "abstractNum" => {
                    let Some(abs_id) = node.attribute((WML_NS, "abstractNumId")) else {
                        continue;
                    };
                    let levels = parse_levels(node)
                        .map(|(ilvl, lvl)| (ilvl, level_def(lvl)))
                        .collect();
                    abstract_nums.insert(abs_id.to_string(), levels);
                }
                "num" => {
                    let Some(num_id) = node.attribute((WML_NS, "numId")) else {
                        continue;
                    };
                    let Some(abs_id) = wml_attr(node, "abstractNumId") else {
                        continue;
                    };
                    let start_overrides = node
                        .children()
                        .filter(|n| is_wml(*n, "lvlOverride"))
                        .filter_map(|ov| {
                            let ilvl = ov
                                .attribute((WML_NS, "ilvl"))
                                .and_then(|v| v.parse::<u8>().ok())?;
                            let start = wml_attr(ov, "startOverride")
                                .and_then(|v| v.parse::<u32>().ok())
                                .or_else(|| {
                                    wml(ov, "lvl").map(level_def).map(|def| def.start)
                                })?;
                            Some((ilvl, start))
                        })
                        .collect();
                    nums.insert(
                        num_id.to_string(),
                        NumDef {
                            abstract_id: abs_id.to_string(),
                            start_overrides,
                        },
                    );
                }
                _ => {}
            }
        }

        Ok(Numbering {
            abstract_nums,
            nums,
        })
    }

    /// Resolve a paragraph's (numId, ilvl) to its marker. `None` when the
    /// instance or its abstract definition is missing.
    pub(super) fn marker(&self, num_id: &str, level: u8) -> Option<ListMarker> {
        let num = self.nums.get(num_id)?;
        let levels = self.abstract_nums.get(&num.abstract_id)?;
        let (kind, start) = match levels.get(&level) {
            Some(def) => (list_kind(&def.num_fmt), def.start),
            // Level not defined: inherit the marker kind of the closest
            // shallower level, Word does the same when rendering.
            None => {
                let def = (0..level).rev().find_map(|l| levels.get(&l))?;
                (list_kind(&def.num_fmt), 1)
            }
        };
        let start = num.start_overrides.get(&level).copied().unwrap_or(start);
        Some(ListMarker {
            kind,
            start,
            depth: level,
        })
    }
}
