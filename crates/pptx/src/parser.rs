//! PPTX file parser implementation.
//!
//! Walks the slides of a deck in presentation order and, for each one, finds
//! the title placeholder (or the first shape with text) together with its
//! position relative to the slide size.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use slide_core::{Error, RelativeBox, Result, SlideDescriptor};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

/// Path of the main presentation part.
const PRESENTATION_PATH: &str = "ppt/presentation.xml";

/// Relationships of the main presentation part.
const PRESENTATION_RELS_PATH: &str = "ppt/_rels/presentation.xml.rels";

/// Default 4:3 slide size in EMU, used when `p:sldSz` is missing.
const DEFAULT_SLIDE_SIZE: (f64, f64) = (9_144_000.0, 6_858_000.0);

/// Parser for PPTX (Office Open XML) files.
pub struct PptxParser;

impl PptxParser {
    /// Create a new PPTX parser.
    pub fn new() -> Self {
        Self
    }

    /// Open `path` and describe its slides.
    pub fn parse_file(&self, path: &Path) -> Result<Vec<SlideDescriptor>> {
        let file = File::open(path)?;
        self.parse(BufReader::new(file))
    }

    /// Describe every slide of a PPTX file, in presentation order.
    pub fn parse<R: Read + Seek>(&self, reader: R) -> Result<Vec<SlideDescriptor>> {
        let archive =
            ZipArchive::new(reader).map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))?;
        let mut package = Package::new(archive);

        let presentation = package.read_presentation()?;
        let slide_order = package.slide_order(&presentation)?;
        log::debug!(
            "Found {} slides, slide size {}x{} EMU",
            slide_order.len(),
            presentation.slide_size.0,
            presentation.slide_size.1
        );

        slide_order
            .iter()
            .enumerate()
            .map(|(idx, path)| package.describe_slide(path, idx + 1, presentation.slide_size))
            .collect()
    }
}

impl Default for PptxParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Facts read from `ppt/presentation.xml`.
#[derive(Debug)]
struct PresentationInfo {
    /// Slide width and height in EMU.
    slide_size: (f64, f64),
    /// Relationship ids of the slides, in presentation order.
    slide_ids: Vec<String>,
}

/// One entry of a `.rels` part.
#[derive(Debug, Clone)]
struct Relationship {
    id: String,
    rel_type: String,
    target: String,
    external: bool,
}

/// Offset and extent of a shape in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Geometry {
    x: f64,
    y: f64,
    cx: f64,
    cy: f64,
}

/// Placeholder marker of a shape (`p:nvPr/p:ph`).
#[derive(Debug, Clone, PartialEq)]
struct Placeholder {
    kind: String,
    idx: u32,
}

impl Placeholder {
    fn is_title(&self) -> bool {
        self.idx == 0 || matches!(self.kind.as_str(), "title" | "ctrTitle")
    }

    /// Type used to find the matching placeholder on the slide master.
    fn master_kind(&self) -> &str {
        match self.kind.as_str() {
            "title" | "ctrTitle" => "title",
            "dt" | "ftr" | "sldNum" | "hdr" => self.kind.as_str(),
            _ => "body",
        }
    }
}

/// Information about a top-level shape extracted from XML.
#[derive(Debug, Clone, Default)]
struct ShapeInfo {
    text: String,
    placeholder: Option<Placeholder>,
    geometry: Option<Geometry>,
}

/// Shapes of one slide, layout or master part.
#[derive(Debug, Clone, Default)]
struct PartShapes {
    shapes: Vec<ShapeInfo>,
    hidden: bool,
}

/// An opened PPTX archive with parsed layout and master parts cached.
struct Package<R> {
    archive: ZipArchive<R>,
    parts: HashMap<String, PartShapes>,
}

impl<R: Read + Seek> Package<R> {
    fn new(archive: ZipArchive<R>) -> Self {
        Self {
            archive,
            parts: HashMap::new(),
        }
    }

    /// Read the slide size and slide id list.
    fn read_presentation(&mut self) -> Result<PresentationInfo> {
        let content = self.read_file_from_archive(PRESENTATION_PATH)?;
        let mut reader = Reader::from_str(&content);

        let mut slide_size = None;
        let mut slide_ids = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                    b"sldSz" => {
                        let cx = attribute(e, b"cx").and_then(|v| v.parse::<f64>().ok());
                        let cy = attribute(e, b"cy").and_then(|v| v.parse::<f64>().ok());
                        if let (Some(cx), Some(cy)) = (cx, cy) {
                            slide_size = Some((cx, cy));
                        }
                    }
                    b"sldId" => {
                        if let Some(id) = relationship_id(e) {
                            slide_ids.push(id);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlError(format!("Error parsing presentation: {}", e)));
                }
                _ => {}
            }
        }

        let slide_size = slide_size.unwrap_or_else(|| {
            log::warn!("Presentation has no slide size, assuming 4:3");
            DEFAULT_SLIDE_SIZE
        });

        Ok(PresentationInfo {
            slide_size,
            slide_ids,
        })
    }

    /// Get the ordered list of slide paths.
    ///
    /// Uses the slide id list when present, otherwise orders the slide
    /// relationships by the number in their id or target.
    fn slide_order(&mut self, presentation: &PresentationInfo) -> Result<Vec<String>> {
        let relationships = self.read_relationships(PRESENTATION_RELS_PATH)?;

        let slide_rels: Vec<&Relationship> = relationships
            .iter()
            .filter(|rel| is_slide_relationship(&rel.rel_type) && !rel.external)
            .collect();

        if !presentation.slide_ids.is_empty() {
            let by_id: HashMap<&str, &Relationship> =
                slide_rels.iter().map(|rel| (rel.id.as_str(), *rel)).collect();

            return presentation
                .slide_ids
                .iter()
                .map(|id| {
                    by_id
                        .get(id.as_str())
                        .map(|rel| resolve_target(PRESENTATION_PATH, &rel.target))
                        .ok_or_else(|| Error::CorruptedFile(format!("Slide relationship '{}' not found", id)))
                })
                .collect();
        }

        log::debug!("No slide id list, ordering slides by relationship number");
        let mut slides: Vec<(String, Option<usize>)> = slide_rels
            .iter()
            .map(|rel| {
                let order_num = extract_slide_number(&rel.id).or_else(|| extract_slide_number(&rel.target));
                (resolve_target(PRESENTATION_PATH, &rel.target), order_num)
            })
            .collect();

        slides.sort_by(|a, b| match (a.1, b.1) {
            (Some(na), Some(nb)) => na.cmp(&nb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });

        Ok(slides.into_iter().map(|(path, _)| path).collect())
    }

    /// Build the descriptor of one slide.
    fn describe_slide(
        &mut self,
        slide_path: &str,
        slide_number: usize,
        slide_size: (f64, f64),
    ) -> Result<SlideDescriptor> {
        let content = self.read_file_from_archive(slide_path)?;
        let part = extract_shapes_from_xml(&content);

        let mut slide = SlideDescriptor::new(slide_number);
        slide.hidden = part.hidden;

        let title_shape = part
            .shapes
            .iter()
            .find(|shape| shape.placeholder.as_ref().is_some_and(Placeholder::is_title));

        let (shape, text) = match title_shape {
            Some(shape) => (shape, shape.text.clone()),
            None => match part.shapes.iter().find(|shape| !shape.text.trim().is_empty()) {
                Some(shape) => (shape, shape.text.trim().to_string()),
                None => {
                    log::debug!("Slide {}: no title or text", slide_number);
                    return Ok(slide);
                }
            },
        };

        let geometry = match shape.geometry {
            Some(geometry) => Some(geometry),
            None => self.inherited_geometry(slide_path, shape).unwrap_or_else(|e| {
                log::warn!("Slide {}: could not resolve title position: {}", slide_number, e);
                None
            }),
        };

        let bbox = geometry.and_then(|g| RelativeBox::from_absolute(g.x, g.y, g.cx, g.cy, slide_size.0, slide_size.1));
        if bbox.is_none() {
            log::debug!("Slide {}: title has no position", slide_number);
        }

        Ok(slide.with_title(text, bbox))
    }

    /// Position of a placeholder taken from its slide layout, or from the
    /// slide master behind that layout.
    fn inherited_geometry(&mut self, slide_path: &str, shape: &ShapeInfo) -> Result<Option<Geometry>> {
        let Some(placeholder) = &shape.placeholder else {
            return Ok(None);
        };

        let Some(layout_path) = self.related_part(slide_path, "/slideLayout")? else {
            return Ok(None);
        };
        let layout = self.part_shapes(&layout_path)?;
        let Some(layout_placeholder) = find_placeholder(&layout.shapes, |p| p.idx == placeholder.idx)
            .or_else(|| find_placeholder(&layout.shapes, |p| p.kind == placeholder.kind))
        else {
            return Ok(None);
        };

        if layout_placeholder.geometry.is_some() {
            return Ok(layout_placeholder.geometry);
        }

        let master_kind = layout_placeholder
            .placeholder
            .as_ref()
            .map(|p| p.master_kind().to_string())
            .unwrap_or_else(|| placeholder.master_kind().to_string());

        let Some(master_path) = self.related_part(&layout_path, "/slideMaster")? else {
            return Ok(None);
        };
        let master = self.part_shapes(&master_path)?;

        Ok(find_placeholder(&master.shapes, |p| p.master_kind() == master_kind).and_then(|s| s.geometry))
    }

    /// Path of the first part related to `part_path` with the given type suffix.
    fn related_part(&mut self, part_path: &str, type_suffix: &str) -> Result<Option<String>> {
        let rels_path = rels_path_for(part_path);
        if !self.archive.file_names().any(|name| name == rels_path) {
            log::debug!("No relationships for {}", part_path);
            return Ok(None);
        }

        let relationships = self.read_relationships(&rels_path)?;
        Ok(relationships
            .iter()
            .find(|rel| rel.rel_type.ends_with(type_suffix) && !rel.external)
            .map(|rel| resolve_target(part_path, &rel.target)))
    }

    /// Shapes of a layout or master part, parsed once per run.
    fn part_shapes(&mut self, path: &str) -> Result<PartShapes> {
        if let Some(part) = self.parts.get(path) {
            return Ok(part.clone());
        }

        let content = self.read_file_from_archive(path)?;
        let part = extract_shapes_from_xml(&content);
        self.parts.insert(path.to_string(), part.clone());
        Ok(part)
    }

    /// Parse a `.rels` part.
    fn read_relationships(&mut self, rels_path: &str) -> Result<Vec<Relationship>> {
        let content = self.read_file_from_archive(rels_path)?;
        let mut reader = Reader::from_str(&content);
        let mut relationships = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if local_name(e.name().as_ref()) == b"Relationship" => {
                    relationships.push(Relationship {
                        id: attribute(e, b"Id").unwrap_or_default(),
                        rel_type: attribute(e, b"Type").unwrap_or_default(),
                        target: attribute(e, b"Target").unwrap_or_default(),
                        external: attribute(e, b"TargetMode").is_some_and(|m| m == "External"),
                    });
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlError(format!(
                        "Error parsing relationships in {}: {}",
                        rels_path, e
                    )));
                }
                _ => {}
            }
        }

        Ok(relationships)
    }

    /// Read a file from the ZIP archive.
    fn read_file_from_archive(&mut self, path: &str) -> Result<String> {
        let mut file = self
            .archive
            .by_name(path)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

        Ok(content)
    }
}

/// Extract the top-level shapes of a slide, layout or master part.
///
/// Shapes nested in groups are skipped. Malformed XML ends parsing early and
/// keeps the shapes read so far.
fn extract_shapes_from_xml(xml_content: &str) -> PartShapes {
    let mut part = PartShapes::default();
    let mut reader = Reader::from_str(xml_content);

    let mut group_depth = 0usize;
    let mut current_shape: Option<ShapeInfo> = None;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut in_shape_props = false;
    let mut in_xfrm = false;
    let mut in_text_body = false;
    let mut in_text = false;
    let mut offset: Option<(f64, f64)> = None;
    let mut extent: Option<(f64, f64)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"sld" => {
                        part.hidden = attribute(e, b"show").is_some_and(|v| v == "0" || v == "false");
                    }
                    b"grpSp" => group_depth += 1,
                    b"sp" if group_depth == 0 && current_shape.is_none() => {
                        current_shape = Some(ShapeInfo::default());
                        paragraphs.clear();
                        offset = None;
                        extent = None;
                    }
                    b"spPr" if current_shape.is_some() => in_shape_props = true,
                    b"xfrm" if in_shape_props => in_xfrm = true,
                    b"off" if in_xfrm => offset = read_pair(e, b"x", b"y"),
                    b"ext" if in_xfrm => extent = read_pair(e, b"cx", b"cy"),
                    b"ph" => {
                        if let Some(ref mut shape) = current_shape {
                            shape.placeholder = Some(read_placeholder(e));
                        }
                    }
                    b"txBody" if current_shape.is_some() => in_text_body = true,
                    b"p" if in_text_body => paragraphs.push(String::new()),
                    b"t" if in_text_body => in_text = true,
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"off" if in_xfrm => offset = read_pair(e, b"x", b"y"),
                    b"ext" if in_xfrm => extent = read_pair(e, b"cx", b"cy"),
                    b"ph" => {
                        if let Some(ref mut shape) = current_shape {
                            shape.placeholder = Some(read_placeholder(e));
                        }
                    }
                    b"p" if in_text_body => paragraphs.push(String::new()),
                    b"br" if in_text_body => {
                        if let Some(paragraph) = paragraphs.last_mut() {
                            paragraph.push('\n');
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_text {
                    if let Some(paragraph) = paragraphs.last_mut() {
                        let text = e.unescape().unwrap_or_default();
                        paragraph.push_str(&text);
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"grpSp" => group_depth = group_depth.saturating_sub(1),
                    b"sp" if group_depth == 0 => {
                        if let Some(mut shape) = current_shape.take() {
                            shape.text = paragraphs.join("\n");
                            if let (Some((x, y)), Some((cx, cy))) = (offset, extent) {
                                shape.geometry = Some(Geometry { x, y, cx, cy });
                            }
                            part.shapes.push(shape);
                        }
                        in_shape_props = false;
                        in_xfrm = false;
                        in_text_body = false;
                        in_text = false;
                    }
                    b"spPr" => in_shape_props = false,
                    b"xfrm" => in_xfrm = false,
                    b"txBody" => in_text_body = false,
                    b"t" => in_text = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("XML parsing error, keeping {} shapes: {}", part.shapes.len(), e);
                break;
            }
            _ => {}
        }
    }

    part
}

fn find_placeholder(shapes: &[ShapeInfo], predicate: impl Fn(&Placeholder) -> bool) -> Option<&ShapeInfo> {
    shapes
        .iter()
        .find(|shape| shape.placeholder.as_ref().is_some_and(&predicate))
}

fn read_placeholder(e: &BytesStart) -> Placeholder {
    Placeholder {
        kind: attribute(e, b"type").unwrap_or_else(|| "obj".to_string()),
        idx: attribute(e, b"idx").and_then(|v| v.parse().ok()).unwrap_or(0),
    }
}

fn read_pair(e: &BytesStart, first: &[u8], second: &[u8]) -> Option<(f64, f64)> {
    let a = attribute(e, first)?.parse::<f64>().ok()?;
    let b = attribute(e, second)?.parse::<f64>().ok()?;
    Some((a, b))
}

/// Value of the attribute with exactly this (possibly prefixed) name.
fn attribute(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

/// The namespaced `r:id` attribute, whatever its prefix.
fn relationship_id(e: &BytesStart) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| {
            let key = attr.key.as_ref();
            key.contains(&b':') && local_name(key) == b"id"
        })
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

fn is_slide_relationship(rel_type: &str) -> bool {
    rel_type.ends_with("/slide")
}

/// Resolve a relationship target against the part that owns the relationship.
fn resolve_target(part_path: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = part_path.split('/').collect();
    segments.pop();

    for segment in target.split('/') {
        match segment {
            ".." => {
                segments.pop();
            }
            "." | "" => {}
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// `ppt/slides/slide1.xml` -> `ppt/slides/_rels/slide1.xml.rels`.
fn rels_path_for(part_path: &str) -> String {
    match part_path.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part_path),
    }
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Extract a slide number from a string like "rId2" or "slide3.xml".
fn extract_slide_number(s: &str) -> Option<usize> {
    let s = s.trim_end_matches(".xml").trim_end_matches(".rels");

    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}
