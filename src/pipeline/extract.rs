//! DOCX extraction: package bytes → self-contained HTML fragment.
//!
//! The package is opened in memory, the main document part located through
//! `_rels/.rels`, and its body walked once. Paragraph and run styles are
//! resolved to display names via `styles.xml` and turned into elements by the
//! [`StyleMap`]. Images are inlined as base64 `data:` URIs so the fragment
//! never refers to anything outside itself.
//!
//! Structures the map does not know about still produce output (a plain
//! `<p>`); a warning is recorded instead of failing the conversion.

use crate::error::Docx2PdfError;
use crate::output::DocumentMetadata;
use crate::pipeline::stylemap::{Selector, StyleMap, TargetElement};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use roxmltree::{Document, Node};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use tracing::{debug, info};

const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const WML_STRICT_NS: &str = "http://purl.oclc.org/ooxml/wordprocessingml/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const REL_STRICT_NS: &str = "http://purl.oclc.org/ooxml/officeDocument/relationships";
const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const WPD_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const MC_NS: &str = "http://schemas.openxmlformats.org/markup-compatibility/2006";
const VML_NS: &str = "urn:schemas-microsoft-com:vml";

const DEFAULT_MAIN_PART: &str = "word/document.xml";
const IMAGE_STYLE: &str = "max-width: 100%; height: auto;";

/// The HTML produced from one document.
#[derive(Debug, Clone)]
pub struct MarkupFragment {
    pub html: String,
    /// Unsupported or unmapped structures encountered along the way.
    pub warnings: Vec<String>,
    pub metadata: DocumentMetadata,
}

/// Convert DOCX bytes to an HTML fragment using `map`.
///
/// # Errors
/// [`Docx2PdfError::NotAZip`], [`Docx2PdfError::MissingPart`] or
/// [`Docx2PdfError::MalformedXml`] when the bytes are not a readable package.
pub fn extract(bytes: &[u8], map: &StyleMap) -> Result<MarkupFragment, Docx2PdfError> {
    let mut pkg = Package::open(bytes)?;

    let main_part = pkg
        .read_text("_rels/.rels")?
        .map(|xml| main_document_part(&xml))
        .transpose()?
        .flatten()
        .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string());
    let (base_dir, file_name) = split_part(&main_part);
    debug!("Main document part: {}", main_part);

    let document_xml = pkg
        .read_text(&main_part)?
        .ok_or_else(|| Docx2PdfError::MissingPart {
            part: main_part.clone(),
        })?;

    let styles = match pkg.read_text(&join_part(&base_dir, "styles.xml"))? {
        Some(xml) => parse_styles(&xml)?,
        None => Styles::default(),
    };
    let numbering = match pkg.read_text(&join_part(&base_dir, "numbering.xml"))? {
        Some(xml) => parse_numbering(&xml)?,
        None => Numbering::default(),
    };
    let rels_part = join_part(&base_dir, &format!("_rels/{file_name}.rels"));
    let rels = match pkg.read_text(&rels_part)? {
        Some(xml) => parse_relationships(&xml, &rels_part)?,
        None => HashMap::new(),
    };
    let mut metadata = match pkg.read_text("docProps/core.xml")? {
        Some(xml) => parse_core_properties(&xml)?,
        None => DocumentMetadata::default(),
    };

    let doc = Document::parse(&document_xml).map_err(|e| Docx2PdfError::malformed(&main_part, e))?;
    let body = doc
        .root_element()
        .children()
        .find(|n| w_name(*n) == Some("body"))
        .ok_or_else(|| Docx2PdfError::malformed(&main_part, "document has no <w:body>"))?;

    let mut converter = Converter {
        pkg: &mut pkg,
        map,
        styles,
        numbering,
        rels,
        base_dir,
        warnings: Vec::new(),
        seen_warnings: HashSet::new(),
        counts: DocumentMetadata::default(),
    };
    let html = converter.blocks(body);

    let counts = converter.counts;
    metadata.paragraph_count = counts.paragraph_count;
    metadata.heading_count = counts.heading_count;
    metadata.table_count = counts.table_count;
    metadata.image_count = counts.image_count;
    metadata.chart_count = counts.chart_count;
    let warnings = converter.warnings;

    info!(
        "Extracted {} bytes of HTML: {} paragraphs, {} tables, {} images ({} warnings)",
        html.len(),
        metadata.paragraph_count,
        metadata.table_count,
        metadata.image_count,
        warnings.len()
    );
    for w in &warnings {
        debug!("extract warning: {}", w);
    }

    Ok(MarkupFragment {
        html,
        warnings,
        metadata,
    })
}

/// Read only the package properties and structural counts.
pub fn extract_metadata(bytes: &[u8]) -> Result<DocumentMetadata, Docx2PdfError> {
    extract(bytes, &StyleMap::standard()).map(|f| f.metadata)
}

// ── Package access ───────────────────────────────────────────────────────

struct Package<'a> {
    archive: zip::ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Package<'a> {
    fn open(bytes: &'a [u8]) -> Result<Self, Docx2PdfError> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
            Docx2PdfError::NotAZip {
                detail: e.to_string(),
            }
        })?;
        Ok(Self { archive })
    }

    fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>, Docx2PdfError> {
        let mut file = match self.archive.by_name(name) {
            Ok(f) => f,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(Docx2PdfError::malformed(name, e)),
        };
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| Docx2PdfError::malformed(name, e))?;
        Ok(Some(buf))
    }

    fn read_text(&mut self, name: &str) -> Result<Option<String>, Docx2PdfError> {
        let Some(bytes) = self.read_bytes(name)? else {
            return Ok(None);
        };
        let text = String::from_utf8(bytes).map_err(|e| Docx2PdfError::malformed(name, e))?;
        Ok(Some(text.trim_start_matches('\u{feff}').to_string()))
    }
}

fn split_part(part: &str) -> (String, String) {
    match part.rsplit_once('/') {
        Some((dir, file)) => (dir.to_string(), file.to_string()),
        None => (String::new(), part.to_string()),
    }
}

fn join_part(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        rel.to_string()
    } else {
        format!("{dir}/{rel}")
    }
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_part(base_dir: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

// ── Package-level parts ──────────────────────────────────────────────────

fn main_document_part(rels_xml: &str) -> Result<Option<String>, Docx2PdfError> {
    let doc = Document::parse(rels_xml).map_err(|e| Docx2PdfError::malformed("_rels/.rels", e))?;
    Ok(doc
        .descendants()
        .filter(|n| n.tag_name().name() == "Relationship")
        .find(|n| {
            n.attribute("Type")
                .is_some_and(|t| t.ends_with("/officeDocument"))
        })
        .and_then(|n| n.attribute("Target"))
        .map(|t| resolve_part("", t)))
}

#[derive(Debug, Default)]
struct Styles {
    paragraph: HashMap<String, String>,
    character: HashMap<String, String>,
}

fn parse_styles(xml: &str) -> Result<Styles, Docx2PdfError> {
    let doc = Document::parse(xml).map_err(|e| Docx2PdfError::malformed("styles.xml", e))?;
    let mut styles = Styles::default();
    for node in doc.descendants().filter(|n| w_name(*n) == Some("style")) {
        let (Some(id), Some(name)) = (w_attr(node, "styleId"), w_val(node, "name")) else {
            continue;
        };
        let table = match w_attr(node, "type") {
            Some("paragraph") => &mut styles.paragraph,
            Some("character") => &mut styles.character,
            _ => continue,
        };
        table.insert(id.to_string(), name.to_string());
    }
    Ok(styles)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Ordered,
    Unordered,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            ListKind::Ordered => "ol",
            ListKind::Unordered => "ul",
        }
    }
}

#[derive(Debug, Default)]
struct Numbering {
    /// abstractNumId → (ilvl → kind)
    levels: HashMap<String, HashMap<u8, ListKind>>,
    num_to_abstract: HashMap<String, String>,
}

impl Numbering {
    fn kind(&self, num_id: &str, level: u8) -> ListKind {
        self.num_to_abstract
            .get(num_id)
            .and_then(|abs| self.levels.get(abs))
            .and_then(|lvls| lvls.get(&level))
            .copied()
            .unwrap_or(ListKind::Unordered)
    }
}

fn parse_numbering(xml: &str) -> Result<Numbering, Docx2PdfError> {
    let doc = Document::parse(xml).map_err(|e| Docx2PdfError::malformed("numbering.xml", e))?;
    let mut numbering = Numbering::default();
    for node in doc.root_element().children() {
        match w_name(node) {
            Some("abstractNum") => {
                let Some(abs_id) = w_attr(node, "abstractNumId") else {
                    continue;
                };
                let mut levels = HashMap::new();
                for lvl in node.children().filter(|n| w_name(*n) == Some("lvl")) {
                    let Some(ilvl) = w_attr(lvl, "ilvl").and_then(|v| v.parse::<u8>().ok()) else {
                        continue;
                    };
                    let kind = match w_val(lvl, "numFmt") {
                        Some("bullet") | None => ListKind::Unordered,
                        Some(_) => ListKind::Ordered,
                    };
                    levels.insert(ilvl, kind);
                }
                numbering.levels.insert(abs_id.to_string(), levels);
            }
            Some("num") => {
                if let (Some(num_id), Some(abs)) = (w_attr(node, "numId"), w_val(node, "abstractNumId")) {
                    numbering
                        .num_to_abstract
                        .insert(num_id.to_string(), abs.to_string());
                }
            }
            _ => {}
        }
    }
    Ok(numbering)
}

#[derive(Debug, Clone)]
struct Relationship {
    target: String,
    external: bool,
}

fn parse_relationships(
    xml: &str,
    part: &str,
) -> Result<HashMap<String, Relationship>, Docx2PdfError> {
    let doc = Document::parse(xml).map_err(|e| Docx2PdfError::malformed(part, e))?;
    Ok(doc
        .descendants()
        .filter(|n| n.tag_name().name() == "Relationship")
        .filter_map(|n| {
            let id = n.attribute("Id")?;
            let target = n.attribute("Target")?;
            Some((
                id.to_string(),
                Relationship {
                    target: target.to_string(),
                    external: n.attribute("TargetMode") == Some("External"),
                },
            ))
        })
        .collect())
}

fn parse_core_properties(xml: &str) -> Result<DocumentMetadata, Docx2PdfError> {
    let doc = Document::parse(xml).map_err(|e| Docx2PdfError::malformed("docProps/core.xml", e))?;
    let mut meta = DocumentMetadata::default();
    for node in doc.root_element().children().filter(Node::is_element) {
        let value = node
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        match node.tag_name().name() {
            "title" => meta.title = value,
            "subject" => meta.subject = value,
            "creator" => meta.creator = value,
            "description" => meta.description = value,
            "keywords" => meta.keywords = value,
            "lastModifiedBy" => meta.last_modified_by = value,
            "created" => meta.created = value,
            "modified" => meta.modified = value,
            _ => {}
        }
    }
    Ok(meta)
}

// ── XML helpers ──────────────────────────────────────────────────────────

fn is_wml(node: Node) -> bool {
    matches!(node.tag_name().namespace(), Some(WML_NS) | Some(WML_STRICT_NS))
}

/// Local name of a WordprocessingML element.
fn w_name<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    if node.is_element() && is_wml(node) {
        Some(node.tag_name().name())
    } else {
        None
    }
}

fn w_child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| w_name(*n) == Some(name))
}

fn w_attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute((WML_NS, name))
        .or_else(|| node.attribute((WML_STRICT_NS, name)))
}

fn w_val<'a>(node: Node<'a, '_>, child: &str) -> Option<&'a str> {
    w_child(node, child).and_then(|c| w_attr(c, "val"))
}

fn rel_attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute((REL_NS, name))
        .or_else(|| node.attribute((REL_STRICT_NS, name)))
}

/// WML on/off property: present without `val`, or with a truthy `val`.
fn toggled(props: Node, name: &str) -> bool {
    w_child(props, name).is_some_and(|n| {
        w_attr(n, "val").map_or(true, |v| !matches!(v, "0" | "false" | "off" | "none"))
    })
}

fn is_ns(node: Node, ns: &str, name: &str) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(ns) && node.tag_name().name() == name
}

fn is_chart_graphic(node: Node) -> bool {
    is_ns(node, DML_NS, "graphicData")
        && node.attribute("uri").is_some_and(|u| u.ends_with("/chart"))
}

pub(crate) fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

pub(crate) fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

fn mime_for(part: &str) -> &'static str {
    let ext = part.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "emf" => "image/x-emf",
        "wmf" => "image/x-wmf",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

// ── Element paths ────────────────────────────────────────────────────────

fn open_path(path: &[TargetElement], leaf_attrs: &str) -> String {
    let last = path.len().saturating_sub(1);
    path.iter()
        .enumerate()
        .map(|(i, el)| el.open_tag(if i == last { leaf_attrs } else { "" }))
        .collect()
}

fn close_path(path: &[TargetElement]) -> String {
    path.iter().rev().map(TargetElement::close_tag).collect()
}

fn wrap(path: &[TargetElement], inner: &str) -> String {
    format!("{}{}{}", open_path(path, ""), inner, close_path(path))
}

fn plain(tag: &str) -> Vec<TargetElement> {
    vec![TargetElement {
        tag: tag.to_string(),
        classes: Vec::new(),
        fresh: true,
    }]
}

// ── Lists ────────────────────────────────────────────────────────────────

/// Open `<ul>`/`<ol>` elements, innermost last. Each entry has an `<li>` open.
#[derive(Debug, Default)]
struct ListStack {
    open: Vec<(ListKind, u8)>,
}

impl ListStack {
    fn enter_item(&mut self, out: &mut String, kind: ListKind, level: u8) {
        while let Some(&(_, l)) = self.open.last() {
            if l <= level {
                break;
            }
            self.pop(out);
        }
        match self.open.last() {
            Some(&(k, l)) if l == level && k == kind => out.push_str("</li><li>"),
            Some(&(_, l)) if l == level => {
                self.pop(out);
                self.push(out, kind, level);
            }
            _ => self.push(out, kind, level),
        }
    }

    fn push(&mut self, out: &mut String, kind: ListKind, level: u8) {
        out.push('<');
        out.push_str(kind.tag());
        out.push_str("><li>");
        self.open.push((kind, level));
    }

    fn pop(&mut self, out: &mut String) {
        if let Some((kind, _)) = self.open.pop() {
            out.push_str("</li></");
            out.push_str(kind.tag());
            out.push('>');
        }
    }

    fn close_all(&mut self, out: &mut String) {
        while !self.open.is_empty() {
            self.pop(out);
        }
    }
}

// ── Body conversion ──────────────────────────────────────────────────────

struct Converter<'p, 'a> {
    pkg: &'p mut Package<'a>,
    map: &'p StyleMap,
    styles: Styles,
    numbering: Numbering,
    rels: HashMap<String, Relationship>,
    base_dir: String,
    warnings: Vec<String>,
    seen_warnings: HashSet<String>,
    counts: DocumentMetadata,
}

impl Converter<'_, '_> {
    fn warn(&mut self, msg: String) {
        if self.seen_warnings.insert(msg.clone()) {
            self.warnings.push(msg);
        }
    }

    /// Convert the block-level children of `parent` (body, cell, sdtContent).
    fn blocks(&mut self, parent: Node) -> String {
        let mut out = String::new();
        let mut lists = ListStack::default();
        for child in parent.children().filter(Node::is_element) {
            self.block(child, &mut out, &mut lists);
        }
        lists.close_all(&mut out);
        out
    }

    fn block(&mut self, node: Node, out: &mut String, lists: &mut ListStack) {
        match w_name(node) {
            Some("p") => self.paragraph(node, out, lists),
            Some("tbl") => {
                lists.close_all(out);
                self.table(node, out);
            }
            Some("sdt") => {
                if let Some(content) = w_child(node, "sdtContent") {
                    for child in content.children().filter(Node::is_element) {
                        self.block(child, out, lists);
                    }
                }
            }
            Some("customXml") | Some("ins") | Some("smartTag") => {
                for child in node.children().filter(Node::is_element) {
                    self.block(child, out, lists);
                }
            }
            _ => {}
        }
    }

    fn paragraph(&mut self, p: Node, out: &mut String, lists: &mut ListStack) {
        let ppr = w_child(p, "pPr");
        let style_id = ppr.and_then(|ppr| w_val(ppr, "pStyle"));
        let style_name = style_id.and_then(|id| self.styles.paragraph.get(id).cloned());
        let numbered = ppr
            .and_then(|ppr| w_child(ppr, "numPr"))
            .and_then(|np| {
                let num_id = w_val(np, "numId")?;
                if num_id == "0" {
                    return None;
                }
                let level = w_val(np, "ilvl")
                    .and_then(|v| v.parse::<u8>().ok())
                    .unwrap_or(0);
                Some((num_id, level))
            });

        let mut deferred = Vec::new();
        let content = self.inline_content(p, &mut deferred);

        let map = self.map;
        let rule = map.paragraph(style_name.as_deref(), style_id);
        if rule.is_none() {
            if let Some(id) = style_id {
                let shown = style_name.as_deref().unwrap_or(id);
                self.warn(format!(
                    "Unrecognised paragraph style: '{shown}' (Style ID: {id})"
                ));
            }
        }

        let path: Vec<TargetElement> = match rule {
            Some(r) if !r.path.is_empty() => r.path.clone(),
            _ => plain("p"),
        };
        let is_plain = path.len() == 1 && path[0].tag == "p" && path[0].classes.is_empty();

        if !content.is_empty() {
            self.counts.paragraph_count += 1;
        }

        match numbered {
            Some((num_id, level)) if is_plain => {
                if content.is_empty() && deferred.is_empty() {
                    return;
                }
                let kind = self.numbering.kind(num_id, level);
                lists.enter_item(out, kind, level);
                out.push_str(&content);
                for block in deferred {
                    out.push_str(&block);
                }
            }
            _ => {
                lists.close_all(out);
                if !content.is_empty() {
                    if path.last().and_then(TargetElement::heading_level).is_some() {
                        self.counts.heading_count += 1;
                    }
                    out.push_str(&wrap(&path, &content));
                }
                for block in deferred {
                    out.push_str(&block);
                }
            }
        }
    }

    /// Inline content of a paragraph, run, hyperlink or alternate-content
    /// branch. Block-level output found inline (charts) goes to `deferred`.
    fn inline_content(&mut self, parent: Node, deferred: &mut Vec<String>) -> String {
        let mut out = String::new();
        for child in parent.children().filter(Node::is_element) {
            if is_ns(child, MC_NS, "AlternateContent") {
                self.alternate_content(child, &mut out, deferred);
                continue;
            }
            if is_ns(child, VML_NS, "shape") || child.tag_name().name() == "pict" {
                self.vml_picture(child, &mut out);
                continue;
            }
            match w_name(child) {
                Some("r") => out.push_str(&self.run(child, deferred)),
                Some("t") => out.push_str(&escape_text(child.text().unwrap_or(""))),
                Some("tab") => out.push('\t'),
                Some("br") => match w_attr(child, "type") {
                    Some("page") | Some("column") => {}
                    _ => out.push_str("<br />"),
                },
                Some("cr") => out.push_str("<br />"),
                Some("noBreakHyphen") => out.push('-'),
                Some("drawing") => self.drawing(child, &mut out, deferred),
                Some("hyperlink") => {
                    let inner = self.inline_content(child, deferred);
                    if inner.is_empty() {
                        continue;
                    }
                    match self.hyperlink_target(child) {
                        Some(href) => {
                            out.push_str(&format!("<a href=\"{}\">{}</a>", escape_attr(&href), inner))
                        }
                        None => out.push_str(&inner),
                    }
                }
                Some("ins") | Some("smartTag") | Some("fldSimple") | Some("customXml") => {
                    let inner = self.inline_content(child, deferred);
                    out.push_str(&inner);
                }
                Some("sdt") => {
                    if let Some(content) = w_child(child, "sdtContent") {
                        let inner = self.inline_content(content, deferred);
                        out.push_str(&inner);
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn run(&mut self, r: Node, deferred: &mut Vec<String>) -> String {
        let mut html = self.inline_content(r, deferred);
        if html.is_empty() {
            return html;
        }
        let Some(rpr) = w_child(r, "rPr") else {
            return html;
        };

        match w_val(rpr, "vertAlign") {
            Some("superscript") => html = format!("<sup>{html}</sup>"),
            Some("subscript") => html = format!("<sub>{html}</sub>"),
            _ => {}
        }
        if toggled(rpr, "strike") {
            html = format!("<s>{html}</s>");
        }
        if toggled(rpr, "i") {
            html = format!("<em>{html}</em>");
        }
        if toggled(rpr, "b") {
            html = format!("<strong>{html}</strong>");
        }

        if let Some(style_id) = w_val(rpr, "rStyle") {
            let style_name = self.styles.character.get(style_id).cloned();
            let map = self.map;
            match map.run(style_name.as_deref(), Some(style_id)) {
                Some(rule) => html = wrap(&rule.path, &html),
                None => {
                    let shown = style_name.as_deref().unwrap_or(style_id);
                    self.warn(format!(
                        "Unrecognised run style: '{shown}' (Style ID: {style_id})"
                    ));
                }
            }
        }
        html
    }

    fn hyperlink_target(&self, link: Node) -> Option<String> {
        if let Some(rid) = rel_attr(link, "id") {
            let rel = self.rels.get(rid)?;
            let mut href = rel.target.clone();
            if let Some(anchor) = w_attr(link, "anchor") {
                href.push('#');
                href.push_str(anchor);
            }
            return Some(href);
        }
        w_attr(link, "anchor").map(|a| format!("#{a}"))
    }

    fn drawing(&mut self, drawing: Node, out: &mut String, deferred: &mut Vec<String>) {
        let alt = drawing
            .descendants()
            .find(|n| is_ns(*n, WPD_NS, "docPr"))
            .and_then(|n| n.attribute("descr"))
            .filter(|d| !d.trim().is_empty());

        if drawing.descendants().any(is_chart_graphic) {
            deferred.push(self.chart(None));
            return;
        }

        let blip = drawing.descendants().find(|n| is_ns(*n, DML_NS, "blip"));
        if let Some(rid) = blip.and_then(|b| rel_attr(b, "embed").or_else(|| rel_attr(b, "link"))) {
            if let Some(img) = self.image_tag(rid, alt) {
                out.push_str(&img);
            }
        }
    }

    fn vml_picture(&mut self, pict: Node, out: &mut String) {
        for imagedata in pict.descendants().filter(|n| is_ns(*n, VML_NS, "imagedata")) {
            let alt = imagedata.attribute(("urn:schemas-microsoft-com:office:office", "title"));
            if let Some(rid) = rel_attr(imagedata, "id") {
                if let Some(img) = self.image_tag(rid, alt) {
                    out.push_str(&img);
                }
            }
        }
    }

    /// `mc:AlternateContent`: use the fallback branch, except for charts,
    /// whose fallback picture becomes the chart container's content.
    fn alternate_content(&mut self, node: Node, out: &mut String, deferred: &mut Vec<String>) {
        let choice = node.children().find(|n| is_ns(*n, MC_NS, "Choice"));
        let fallback = node.children().find(|n| is_ns(*n, MC_NS, "Fallback"));

        if choice.is_some_and(|c| c.descendants().any(is_chart_graphic)) {
            let image = fallback
                .and_then(|fb| fb.descendants().find(|n| is_ns(*n, DML_NS, "blip")))
                .and_then(|b| rel_attr(b, "embed"))
                .and_then(|rid| self.image_tag(rid, None));
            deferred.push(self.chart(image));
            return;
        }

        if let Some(branch) = fallback.or(choice) {
            let inner = self.inline_content(branch, deferred);
            out.push_str(&inner);
        }
    }

    fn chart(&mut self, image: Option<String>) -> String {
        self.counts.chart_count += 1;
        let map = self.map;
        let path = match map.structural(&Selector::Chart) {
            Some(r) if !r.path.is_empty() => r.path.clone(),
            _ => plain("div"),
        };
        wrap(&path, &image.unwrap_or_default())
    }

    fn image_tag(&mut self, rid: &str, alt: Option<&str>) -> Option<String> {
        let Some(rel) = self.rels.get(rid).cloned() else {
            self.warn(format!("Image relationship '{rid}' not found"));
            return None;
        };
        if rel.external {
            self.warn(format!(
                "Linked image '{}' is external and was not embedded",
                rel.target
            ));
            return None;
        }
        let part = resolve_part(&self.base_dir, &rel.target);
        let bytes = match self.pkg.read_bytes(&part) {
            Ok(Some(b)) => b,
            Ok(None) => {
                self.warn(format!(
                    "Image relationship '{rid}' points to missing part '{part}'"
                ));
                return None;
            }
            Err(e) => {
                self.warn(format!("Could not read image '{part}': {e}"));
                return None;
            }
        };
        self.counts.image_count += 1;

        let alt_attr = alt
            .map(|a| format!(" alt=\"{}\"", escape_attr(a)))
            .unwrap_or_default();
        Some(format!(
            "<img src=\"data:{};base64,{}\" style=\"{}\"{} />",
            mime_for(&part),
            STANDARD.encode(&bytes),
            IMAGE_STYLE,
            alt_attr
        ))
    }

    fn table(&mut self, tbl: Node, out: &mut String) {
        self.counts.table_count += 1;
        let map = self.map;
        let structural = |sel: Selector, tag: &str| match map.structural(&sel) {
            Some(r) if !r.path.is_empty() => r.path.clone(),
            _ => plain(tag),
        };
        let table_path = structural(Selector::Table, "table");
        let row_path = structural(Selector::Row, "tr");
        let cell_path = structural(Selector::Cell, "td");
        let header_path = structural(Selector::HeaderCell, "th");

        out.push_str(&open_path(&table_path, ""));
        for tr in tbl.children().filter(|n| w_name(*n) == Some("tr")) {
            let header = w_child(tr, "trPr").is_some_and(|p| toggled(p, "tblHeader"));
            out.push_str(&open_path(&row_path, ""));
            for tc in tr.children().filter(|n| w_name(*n) == Some("tc")) {
                let tcpr = w_child(tc, "tcPr");
                let span = tcpr
                    .and_then(|p| w_val(p, "gridSpan"))
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(1);
                let continued = tcpr.and_then(|p| w_child(p, "vMerge")).is_some_and(|v| {
                    w_attr(v, "val").map_or(true, |val| val == "continue")
                });

                let path = if header { &header_path } else { &cell_path };
                let attrs = if span > 1 {
                    format!(" colspan=\"{span}\"")
                } else {
                    String::new()
                };
                let inner = if continued {
                    String::new()
                } else {
                    self.blocks(tc)
                };
                out.push_str(&open_path(path, &attrs));
                out.push_str(&inner);
                out.push_str(&close_path(path));
            }
            out.push_str(&close_path(&row_path));
        }
        out.push_str(&close_path(&table_path));
    }
}
