use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Cursor, Read};

use crate::error::Error;
use crate::model::{MediaAsset, MediaFormat, MediaId};

const OFFICE_DOCUMENT_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const IMAGE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const HYPERLINK_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RelKind {
    Image,
    Hyperlink,
    Other,
}

#[derive(Clone, Debug)]
pub(crate) struct Relationship {
    pub(crate) target: String,
    pub(crate) kind: RelKind,
    pub(crate) external: bool,
}

/// The parts of a DOCX archive the converter needs, read into memory.
pub struct Package {
    pub(crate) document_xml: String,
    pub(crate) styles_xml: Option<String>,
    pub(crate) numbering_xml: Option<String>,
    pub(crate) footnotes_xml: Option<String>,
    pub(crate) relationships: HashMap<String, Relationship>,
    pub(crate) media: BTreeMap<MediaId, MediaAsset>,
}

impl Package {
    pub fn open(bytes: &[u8]) -> Result<Self, Error> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|_| Error::MalformedPackage("file is not a ZIP archive".into()))?;

        let document_path = main_document_path(&mut zip);
        let document_xml = read_zip_text(&mut zip, &document_path).ok_or_else(|| {
            Error::MalformedPackage(format!("missing {document_path} (is this a DOCX file?)"))
        })?;
        check_xml(&document_path, &document_xml)?;

        let part_dir = document_path
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or_default();
        let part_in_dir = |name: &str| {
            if part_dir.is_empty() {
                name.to_string()
            } else {
                format!("{part_dir}/{name}")
            }
        };

        let mut optional_part = |name: &str| -> Result<Option<String>, Error> {
            let path = part_in_dir(name);
            match read_zip_text(&mut zip, &path) {
                Some(xml) => {
                    check_xml(&path, &xml)?;
                    Ok(Some(xml))
                }
                None => Ok(None),
            }
        };
        let styles_xml = optional_part("styles.xml")?;
        let numbering_xml = optional_part("numbering.xml")?;
        let footnotes_xml = optional_part("footnotes.xml")?;

        let rels_path = part_relationships_path(&document_path);
        let relationships = match read_zip_text(&mut zip, &rels_path) {
            Some(xml) => parse_rels_xml(&xml).map_err(|e| {
                Error::MalformedPackage(format!("{rels_path}: XML parse error: {e}"))
            })?,
            None => HashMap::new(),
        };

        let media = read_media(&mut zip, &relationships, &part_dir);

        log::debug!(
            "Opened package: {} relationships, {} media assets, styles={}, numbering={}",
            relationships.len(),
            media.len(),
            styles_xml.is_some(),
            numbering_xml.is_some(),
        );

        Ok(Package {
            document_xml,
            styles_xml,
            numbering_xml,
            footnotes_xml,
            relationships,
            media,
        })
    }

    pub(crate) fn hyperlink_target(&self, rel_id: &str) -> Option<&str> {
        self.relationships
            .get(rel_id)
            .filter(|r| r.kind == RelKind::Hyperlink)
            .map(|r| r.target.as_str())
    }
}

fn read_zip_text(zip: &mut Archive, name: &str) -> Option<String> {
    let mut content = String::new();
    zip.by_name(name).ok()?.read_to_string(&mut content).ok()?;
    Some(content)
}

fn check_xml(part: &str, xml: &str) -> Result<(), Error> {
    roxmltree::Document::parse(xml)
        .map(|_| ())
        .map_err(|e| Error::MalformedPackage(format!("{part}: XML parse error: {e}")))
}

/// Resolve the main document part from `_rels/.rels`, falling back to the
/// conventional `word/document.xml`.
fn main_document_path(zip: &mut Archive) -> String {
    let fallback = String::from("word/document.xml");
    let Some(xml_content) = read_zip_text(zip, "_rels/.rels") else {
        return fallback;
    };
    let Ok(xml) = roxmltree::Document::parse(&xml_content) else {
        return fallback;
    };
    xml.root_element()
        .children()
        .find(|n| {
            n.tag_name().name() == "Relationship" && n.attribute("Type") == Some(OFFICE_DOCUMENT_REL)
        })
        .and_then(|n| n.attribute("Target"))
        .map(|t| t.trim_start_matches('/').to_string())
        .unwrap_or(fallback)
}

/// "word/document.xml" → "word/_rels/document.xml.rels"
fn part_relationships_path(part_path: &str) -> String {
    match part_path.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_path}.rels"),
    }
}

fn parse_rels_xml(xml_content: &str) -> Result<HashMap<String, Relationship>, roxmltree::Error> {
    let xml = roxmltree::Document::parse(xml_content)?;
    let mut rels = HashMap::new();
    for node in xml.root_element().children() {
        if node.tag_name().name() != "Relationship" {
            continue;
        }
        let (Some(id), Some(target)) = (node.attribute("Id"), node.attribute("Target")) else {
            continue;
        };
        let kind = match node.attribute("Type") {
            Some(IMAGE_REL) => RelKind::Image,
            Some(HYPERLINK_REL) => RelKind::Hyperlink,
            _ => RelKind::Other,
        };
        rels.insert(
            id.to_string(),
            Relationship {
                target: target.to_string(),
                kind,
                external: node.attribute("TargetMode") == Some("External"),
            },
        );
    }
    Ok(rels)
}

/// Normalize a relationship target into an archive path. Targets are either
/// archive-absolute ("/word/media/x.png") or relative to the source part's
/// directory ("media/x.png", "../media/x.png").
fn archive_path(part_dir: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut segments: Vec<&str> = part_dir.split('/').filter(|s| !s.is_empty()).collect();
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn detect_format(data: &[u8], path: &str) -> MediaFormat {
    if let Ok(fmt) = image::guess_format(data) {
        match fmt {
            image::ImageFormat::Png => return MediaFormat::Png,
            image::ImageFormat::Jpeg => return MediaFormat::Jpeg,
            image::ImageFormat::Gif => return MediaFormat::Gif,
            image::ImageFormat::Bmp => return MediaFormat::Bmp,
            image::ImageFormat::Tiff => return MediaFormat::Tiff,
            _ => {}
        }
    }
    let ext = path
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => MediaFormat::Png,
        "jpg" | "jpeg" => MediaFormat::Jpeg,
        "gif" => MediaFormat::Gif,
        "bmp" => MediaFormat::Bmp,
        "tif" | "tiff" => MediaFormat::Tiff,
        "emf" => MediaFormat::Emf,
        "wmf" => MediaFormat::Wmf,
        "svg" => MediaFormat::Svg,
        _ => MediaFormat::Other,
    }
}

fn read_media(
    zip: &mut Archive,
    rels: &HashMap<String, Relationship>,
    part_dir: &str,
) -> BTreeMap<MediaId, MediaAsset> {
    let mut media = BTreeMap::new();
    // Relationship ids are iterated in sorted order so output names are stable.
    let mut image_rels: Vec<(&String, &Relationship)> = rels
        .iter()
        .filter(|(_, r)| r.kind == RelKind::Image && !r.external)
        .collect();
    image_rels.sort_by(|a, b| a.0.cmp(b.0));

    let mut by_archive_path: HashMap<String, String> = HashMap::new();
    let mut used_names: HashSet<String> = HashSet::new();

    for (rel_id, rel) in image_rels {
        let zip_path = archive_path(part_dir, &rel.target);
        let mut data = Vec::new();
        match zip.by_name(&zip_path) {
            Ok(mut entry) => {
                if let Err(e) = entry.read_to_end(&mut data) {
                    log::warn!("Skipping media {zip_path}: {e}");
                    continue;
                }
            }
            Err(_) => {
                log::warn!("Relationship {rel_id} points at missing part {zip_path}");
                continue;
            }
        }

        // Two relationships may share one image part; they share an output path.
        let output_path = match by_archive_path.get(&zip_path) {
            Some(existing) => existing.clone(),
            None => {
                let name = unique_name(&safe_file_name(basename(&zip_path)), &mut used_names);
                let path = format!("media/{name}");
                by_archive_path.insert(zip_path.clone(), path.clone());
                path
            }
        };

        let format = detect_format(&data, &zip_path);
        let id = MediaId(rel_id.clone());
        media.insert(
            id.clone(),
            MediaAsset {
                id,
                data,
                archive_path: zip_path,
                output_path,
                format,
            },
        );
    }
    media
}

fn basename(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, f)| f).unwrap_or(path)
}

/// Keep file names usable inside `\includegraphics{}`.
fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) => (s, format!(".{e}")),
        None => (name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
