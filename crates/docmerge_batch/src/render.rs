//! `.docx` template loading and per-row rendering.
//!
//! Renderable parts are streamed through `quick_xml` once at load time. Word
//! often splits one typed tag over several `<w:t>` runs; every tag spanning
//! runs of one paragraph is moved into the run where it starts, so the
//! template engine only ever sees whole `{{ }}` / `{% %}` tags. Each
//! normalized part is then compiled into a `minijinja` template.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::io::{Cursor, Read, Write};
use std::sync::LazyLock;

use minijinja::value::Value;
use minijinja::{
    AutoEscape, Environment, Error as EngineError, ErrorKind, Output, State, UndefinedBehavior,
};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::conf::C_PART_MAIN_DOCUMENT;
use crate::spec::{
    EnumCellValue, EnumMissingValueMode, RenderError, SpecPlaceholderMapping, TemplateError,
};
use crate::util::derive_integral_value;

static RE_RENDERABLE_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^word/(document|header\d*|footer\d*|footnotes|endnotes)\.xml$")
        .expect("valid part regex")
});
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}|\{#.*?#\}").expect("valid tag regex")
});

const C_TAG_PARAGRAPH: &[u8] = b"w:p";
const C_TAG_TEXT: &[u8] = b"w:t";
const C_ATTR_SPACE: &[u8] = b"xml:space";

/// Produces one document from a placeholder mapping.
///
/// Implementations must not keep state between calls: every call starts from
/// a fresh copy of the template.
pub trait DocumentRenderer {
    /// Render one document.
    fn render(&self, mapping: &SpecPlaceholderMapping) -> Result<Vec<u8>, RenderError>;
}

#[derive(Debug, Clone)]
enum EnumEntryContent {
    Directory,
    Raw(Vec<u8>),
    /// Compiled into the environment under the entry name.
    Template,
}

#[derive(Debug, Clone)]
struct SpecTemplateEntry {
    name: String,
    compression: CompressionMethod,
    content: EnumEntryContent,
}

/// Loaded, pre-compiled `.docx` template.
pub struct DocxTemplate {
    l_entries: Vec<SpecTemplateEntry>,
    env: Environment<'static>,
    set_placeholders: BTreeSet<String>,
    rule_missing_value: EnumMissingValueMode,
}

impl fmt::Debug for DocxTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocxTemplate")
            .field("l_entries", &self.l_entries)
            .field("set_placeholders", &self.set_placeholders)
            .field("rule_missing_value", &self.rule_missing_value)
            .finish_non_exhaustive()
    }
}

impl DocxTemplate {
    /// Parse template bytes. Fails when the container is unreadable, lacks
    /// `word/document.xml`, or holds a part that is not well-formed XML or
    /// whose tags do not compile.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut env = derive_environment();
        let mut l_entries = Vec::with_capacity(archive.len());
        let mut set_placeholders = BTreeSet::new();
        let mut if_has_main_document = false;

        for n_idx in 0..archive.len() {
            let mut file = archive.by_index(n_idx)?;
            let c_name = file.name().to_string();
            let compression = match file.compression() {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };

            if file.is_dir() {
                l_entries.push(SpecTemplateEntry {
                    name: c_name,
                    compression,
                    content: EnumEntryContent::Directory,
                });
                continue;
            }

            let mut v_bytes = Vec::new();
            file.read_to_end(&mut v_bytes)
                .map_err(|err| TemplateError::Part {
                    part: c_name.clone(),
                    message: err.to_string(),
                })?;

            let content = if RE_RENDERABLE_PART.is_match(&c_name) {
                if c_name == C_PART_MAIN_DOCUMENT {
                    if_has_main_document = true;
                }
                let c_xml = String::from_utf8(v_bytes)
                    .map_err(|_| TemplateError::NotUtf8(c_name.clone()))?;
                let c_source = derive_template_source(&c_name, &c_xml)?;
                env.add_template_owned(c_name.clone(), c_source)
                    .map_err(|err| syntax_error(&c_name, &err))?;
                let template = env
                    .get_template(&c_name)
                    .map_err(|err| syntax_error(&c_name, &err))?;
                set_placeholders.extend(template.undeclared_variables(false));
                EnumEntryContent::Template
            } else {
                EnumEntryContent::Raw(v_bytes)
            };

            l_entries.push(SpecTemplateEntry {
                name: c_name,
                compression,
                content,
            });
        }

        if !if_has_main_document {
            return Err(TemplateError::MissingMainDocument);
        }

        debug!(
            n_entries = l_entries.len(),
            n_placeholders = set_placeholders.len(),
            "template loaded"
        );
        Ok(Self {
            l_entries,
            env,
            set_placeholders,
            rule_missing_value: EnumMissingValueMode::default(),
        })
    }

    /// Set the empty-cell policy used by [`DocumentRenderer::render`].
    pub fn with_missing_value_mode(mut self, rule_missing_value: EnumMissingValueMode) -> Self {
        self.rule_missing_value = rule_missing_value;
        self
    }

    /// Variables the template reads from the row, loop variables excluded.
    pub fn placeholders(&self) -> &BTreeSet<String> {
        &self.set_placeholders
    }

    fn validate_mapping(&self, mapping: &SpecPlaceholderMapping) -> Result<(), RenderError> {
        for c_key in &self.set_placeholders {
            match mapping.get(c_key) {
                Some(EnumCellValue::None)
                    if self.rule_missing_value == EnumMissingValueMode::Error =>
                {
                    return Err(RenderError::MissingValue(c_key.clone()));
                }
                Some(EnumCellValue::String(c_value)) => validate_xml_text(c_key, c_value)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn map_engine_error(&self, mapping: &SpecPlaceholderMapping, err: EngineError) -> RenderError {
        if err.kind() == ErrorKind::UndefinedError {
            if let Some(c_key) = self
                .set_placeholders
                .iter()
                .find(|c_key| !mapping.contains_key(*c_key))
            {
                return RenderError::UndefinedPlaceholder(c_key.clone());
            }
        }
        RenderError::Template(err.to_string())
    }
}

impl DocumentRenderer for DocxTemplate {
    fn render(&self, mapping: &SpecPlaceholderMapping) -> Result<Vec<u8>, RenderError> {
        self.validate_mapping(mapping)?;
        let dict_context: BTreeMap<&str, Value> = mapping
            .iter()
            .map(|(c_key, value)| (c_key.as_str(), convert_cell_value_to_engine(value)))
            .collect();

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &self.l_entries {
            let options = SimpleFileOptions::default().compression_method(entry.compression);
            match &entry.content {
                EnumEntryContent::Directory => {
                    writer.add_directory(entry.name.as_str(), options)?;
                }
                EnumEntryContent::Raw(v_bytes) => {
                    writer.start_file(entry.name.as_str(), options)?;
                    writer.write_all(v_bytes)?;
                }
                EnumEntryContent::Template => {
                    let c_xml = self
                        .env
                        .get_template(&entry.name)
                        .and_then(|template| template.render(&dict_context))
                        .map_err(|err| self.map_engine_error(mapping, err))?;
                    writer.start_file(entry.name.as_str(), options)?;
                    writer.write_all(c_xml.as_bytes())?;
                }
            }
        }

        Ok(writer.finish()?.into_inner())
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region Engine

fn derive_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_formatter(format_xml_value);
    env
}

/// Write a value into XML character data. Empty cells print nothing.
fn format_xml_value(
    out: &mut Output<'_>,
    _state: &State<'_, '_>,
    value: &Value,
) -> Result<(), EngineError> {
    if value.is_undefined() {
        return Err(EngineError::from(ErrorKind::UndefinedError));
    }
    if value.is_none() {
        return Ok(());
    }
    let c_text = value.to_string();
    let c_out = if value.is_safe() {
        Cow::Borrowed(c_text.as_str())
    } else {
        escape(c_text.as_str())
    };
    out.write_str(&c_out).map_err(|_| EngineError::from(ErrorKind::WriteFailure))
}

fn convert_cell_value_to_engine(value: &EnumCellValue) -> Value {
    match value {
        EnumCellValue::None => Value::from(()),
        EnumCellValue::String(s) => Value::from(s.as_str()),
        EnumCellValue::Number(n) => match derive_integral_value(*n) {
            Some(n_int) => Value::from(n_int),
            None => Value::from(*n),
        },
    }
}

fn syntax_error(part: &str, err: &EngineError) -> TemplateError {
    TemplateError::Syntax {
        part: part.to_string(),
        message: err.to_string(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SplitTagNormalization

struct SpecTextNode {
    start: BytesStart<'static>,
    n_idx_start: usize,
    n_idx_end: usize,
    c_text: String,
}

fn xml_error(part: &str, err: impl fmt::Display) -> TemplateError {
    TemplateError::Xml {
        part: part.to_string(),
        message: err.to_string(),
    }
}

/// Rewrite one XML part into template source.
///
/// Tags split over the `<w:t>` nodes of one paragraph are joined; nested
/// paragraphs (text boxes) are their own group. Literal text is re-escaped,
/// tag text is emitted raw so the engine sees `<`, `>` and quotes.
fn derive_template_source(part: &str, xml: &str) -> Result<String, TemplateError> {
    let mut reader = Reader::from_str(xml);
    let mut l_events: Vec<Event<'static>> = Vec::new();
    let mut l_nodes: Vec<SpecTextNode> = Vec::new();
    let mut l_stack: Vec<Vec<usize>> = Vec::new();
    let mut l_groups: Vec<Vec<usize>> = Vec::new();
    let mut open_text: Option<(BytesStart<'static>, usize, String)> = None;

    loop {
        let event = reader.read_event().map_err(|err| xml_error(part, err))?;
        let n_idx = l_events.len();
        match &event {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == C_TAG_PARAGRAPH => l_stack.push(Vec::new()),
            Event::End(e) if e.name().as_ref() == C_TAG_PARAGRAPH => {
                if let Some(l_group) = l_stack.pop() {
                    l_groups.push(l_group);
                }
            }
            Event::Start(e) if e.name().as_ref() == C_TAG_TEXT => {
                open_text = Some((e.clone().into_owned(), n_idx, String::new()));
            }
            Event::End(e) if e.name().as_ref() == C_TAG_TEXT => {
                if let Some((start, n_idx_start, c_text)) = open_text.take() {
                    if let Some(l_group) = l_stack.last_mut() {
                        l_group.push(l_nodes.len());
                    }
                    l_nodes.push(SpecTextNode {
                        start,
                        n_idx_start,
                        n_idx_end: n_idx,
                        c_text,
                    });
                }
            }
            Event::Text(e) => {
                if let Some((_, _, c_text)) = open_text.as_mut() {
                    c_text.push_str(&e.unescape().map_err(|err| xml_error(part, err))?);
                }
            }
            Event::CData(e) => {
                if let Some((_, _, c_text)) = open_text.as_mut() {
                    c_text.push_str(&String::from_utf8_lossy(e));
                }
            }
            _ => {}
        }
        l_events.push(event.into_owned());
    }

    let mut l_texts_new: Vec<Option<String>> = vec![None; l_nodes.len()];
    for l_group in &l_groups {
        let l_texts: Vec<&str> = l_group
            .iter()
            .map(|n_node| l_nodes[*n_node].c_text.as_str())
            .collect();
        for (n_node, c_text_new) in l_group.iter().zip(normalize_paragraph_texts(&l_texts)) {
            l_texts_new[*n_node] = c_text_new;
        }
    }

    let dict_node_by_start: BTreeMap<usize, usize> = l_nodes
        .iter()
        .enumerate()
        .map(|(n_node, node)| (node.n_idx_start, n_node))
        .collect();

    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut n_idx = 0;
    while n_idx < l_events.len() {
        let Some(&n_node) = dict_node_by_start.get(&n_idx) else {
            writer
                .write_event(l_events[n_idx].clone())
                .map_err(|err| xml_error(part, err))?;
            n_idx += 1;
            continue;
        };

        let node = &l_nodes[n_node];
        let (start, c_text) = match &l_texts_new[n_node] {
            Some(c_text_new) => (derive_preserve_start(&node.start), c_text_new.as_str()),
            None => (node.start.clone(), node.c_text.as_str()),
        };
        writer
            .write_event(Event::Start(start))
            .map_err(|err| xml_error(part, err))?;
        writer
            .write_event(Event::Text(BytesText::from_escaped(derive_text_source(c_text))))
            .map_err(|err| xml_error(part, err))?;
        writer
            .write_event(l_events[node.n_idx_end].clone())
            .map_err(|err| xml_error(part, err))?;
        n_idx = node.n_idx_end + 1;
    }

    String::from_utf8(writer.into_inner()).map_err(|_| TemplateError::NotUtf8(part.to_string()))
}

/// New text per node, `None` where a node keeps its text.
///
/// Node boundaries falling strictly inside a tag move to the tag's end, so
/// each tag ends up whole in the node where it starts.
fn normalize_paragraph_texts(texts: &[&str]) -> Vec<Option<String>> {
    let mut l_texts_new = vec![None; texts.len()];
    if texts.len() < 2 {
        return l_texts_new;
    }
    let c_joined = texts.concat();
    if !c_joined.contains('{') {
        return l_texts_new;
    }

    let mut l_bounds = Vec::with_capacity(texts.len() + 1);
    let mut n_offset = 0;
    l_bounds.push(n_offset);
    for c_text in texts {
        n_offset += c_text.len();
        l_bounds.push(n_offset);
    }

    let n_last = l_bounds.len() - 1;
    for m_tag in RE_TAG.find_iter(&c_joined) {
        for n_bound in l_bounds[1..n_last].iter_mut() {
            if m_tag.start() < *n_bound && *n_bound < m_tag.end() {
                *n_bound = m_tag.end();
            }
        }
    }

    for (n_idx, c_text) in texts.iter().enumerate() {
        let c_text_new = &c_joined[l_bounds[n_idx]..l_bounds[n_idx + 1]];
        if c_text_new != *c_text {
            l_texts_new[n_idx] = Some(c_text_new.to_string());
        }
    }
    l_texts_new
}

fn derive_preserve_start(start: &BytesStart<'static>) -> BytesStart<'static> {
    let mut start_new = start.clone();
    let if_has_space = start
        .attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == C_ATTR_SPACE);
    if !if_has_space {
        start_new.push_attribute(("xml:space", "preserve"));
    }
    start_new
}

/// Escape the literal stretches of `text`, leave tags as written.
fn derive_text_source(text: &str) -> String {
    let mut c_out = String::with_capacity(text.len());
    let mut n_cursor = 0;
    for m_tag in RE_TAG.find_iter(text) {
        c_out.push_str(&escape(&text[n_cursor..m_tag.start()]));
        c_out.push_str(m_tag.as_str());
        n_cursor = m_tag.end();
    }
    c_out.push_str(&escape(&text[n_cursor..]));
    c_out
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ValueValidation

fn validate_xml_text(identifier: &str, text: &str) -> Result<(), RenderError> {
    let Some(c_bad) = text.chars().find(|c| !is_xml_char(*c)) else {
        return Ok(());
    };
    Err(RenderError::InvalidXmlChar {
        identifier: identifier.to_string(),
        codepoint: c_bad as u32,
    })
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const C_NS_MAIN: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    fn build_docx_with_parts(body: &str, parts: &[(&str, &str)]) -> Vec<u8> {
        let c_document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{C_NS_MAIN}"><w:body>{body}</w:body></w:document>"#
        );
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer
            .start_file("[Content_Types].xml", options)
            .expect("start content types");
        writer
            .write_all(b"<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"/>")
            .expect("write content types");
        writer.add_directory("word/", options).expect("add dir");
        writer
            .start_file(C_PART_MAIN_DOCUMENT, options)
            .expect("start document");
        writer
            .write_all(c_document.as_bytes())
            .expect("write document");
        for (c_part, c_xml) in parts {
            writer.start_file(*c_part, options).expect("start part");
            writer.write_all(c_xml.as_bytes()).expect("write part");
        }
        writer.finish().expect("finish zip").into_inner()
    }

    fn build_docx(body: &str) -> Vec<u8> {
        build_docx_with_parts(body, &[])
    }

    fn read_part(bytes: &[u8], part: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("open rendered docx");
        let mut file = archive.by_name(part).expect("part exists");
        let mut c_text = String::new();
        file.read_to_string(&mut c_text).expect("read part");
        c_text
    }

    fn mapping(pairs: &[(&str, EnumCellValue)]) -> SpecPlaceholderMapping {
        pairs
            .iter()
            .map(|(c_key, value)| (c_key.to_string(), value.clone()))
            .collect()
    }

    fn text(value: &str) -> EnumCellValue {
        EnumCellValue::String(value.to_string())
    }

    #[test]
    fn render_substitutes_placeholders() {
        let template = DocxTemplate::from_bytes(&build_docx(
            "<w:p><w:r><w:t>Item: {{ Product_Name }} costs {{Price}}</w:t></w:r></w:p>",
        ))
        .expect("load template");
        assert_eq!(
            template.placeholders().iter().collect::<Vec<_>>(),
            vec!["Price", "Product_Name"]
        );

        let v_docx = template
            .render(&mapping(&[
                ("Product_Name", text("Widget")),
                ("Price", EnumCellValue::Number(19.99)),
            ]))
            .expect("render");
        let c_xml = read_part(&v_docx, C_PART_MAIN_DOCUMENT);
        assert!(c_xml.contains("<w:t>Item: Widget costs 19.99</w:t>"), "{c_xml}");
        assert!(!c_xml.contains("{{"));
    }

    #[test]
    fn render_joins_tags_split_across_runs() {
        let template = DocxTemplate::from_bytes(&build_docx(concat!(
            "<w:p>",
            "<w:r><w:t>Dear {</w:t></w:r>",
            "<w:r><w:rPr><w:b/></w:rPr><w:t>{ Na</w:t></w:r>",
            "<w:proofErr w:type=\"spellStart\"/>",
            "<w:r><w:t xml:space=\"preserve\">me }} and</w:t></w:r>",
            "<w:r><w:t> bye</w:t></w:r>",
            "</w:p>"
        )))
        .expect("load template");

        let v_docx = template
            .render(&mapping(&[("Name", text("Ada"))]))
            .expect("render");
        let c_xml = read_part(&v_docx, C_PART_MAIN_DOCUMENT);
        assert!(
            c_xml.contains(r#"<w:t xml:space="preserve">Dear Ada</w:t>"#),
            "{c_xml}"
        );
        assert!(c_xml.contains(r#"<w:t xml:space="preserve"> and</w:t>"#), "{c_xml}");
        assert!(c_xml.contains("<w:t> bye</w:t>"), "{c_xml}");
        assert!(c_xml.contains("<w:rPr><w:b/></w:rPr>"));
        assert!(c_xml.contains(r#"<w:proofErr w:type="spellStart"/>"#));
    }

    #[test]
    fn render_joins_split_tag_next_to_text_box() {
        let template = DocxTemplate::from_bytes(&build_docx(concat!(
            "<w:p>",
            "<w:r><w:pict><w:txbxContent>",
            "<w:p><w:r><w:t>Box</w:t></w:r></w:p>",
            "</w:txbxContent></w:pict></w:r>",
            "<w:r><w:t>Hi {{ Na</w:t></w:r>",
            "<w:r><w:t>me }}</w:t></w:r>",
            "</w:p>"
        )))
        .expect("nested paragraphs load");
        assert_eq!(
            template.placeholders().iter().collect::<Vec<_>>(),
            vec!["Name"]
        );

        let v_docx = template
            .render(&mapping(&[("Name", text("Ada"))]))
            .expect("render");
        let c_xml = read_part(&v_docx, C_PART_MAIN_DOCUMENT);
        assert!(c_xml.contains("<w:t>Box</w:t>"), "{c_xml}");
        assert!(
            c_xml.contains(r#"<w:t xml:space="preserve">Hi Ada</w:t>"#),
            "{c_xml}"
        );
    }

    #[test]
    fn render_fills_headers_and_footers() {
        let c_header = format!(
            r#"<w:hdr xmlns:w="{C_NS_MAIN}"><w:p><w:r><w:t>Invoice {{{{ Number }}}}</w:t></w:r></w:p></w:hdr>"#
        );
        let c_footer = format!(
            r#"<w:ftr xmlns:w="{C_NS_MAIN}"><w:p><w:r><w:t>{{{{ Company }}}}</w:t></w:r></w:p></w:ftr>"#
        );
        let template = DocxTemplate::from_bytes(&build_docx_with_parts(
            "<w:p><w:r><w:t>Body</w:t></w:r></w:p>",
            &[
                ("word/header1.xml", c_header.as_str()),
                ("word/footer1.xml", c_footer.as_str()),
                ("word/styles.xml", "<w:styles>{{ not_a_tag }}</w:styles>"),
            ],
        ))
        .expect("load template");
        assert_eq!(
            template.placeholders().iter().collect::<Vec<_>>(),
            vec!["Company", "Number"]
        );

        let v_docx = template
            .render(&mapping(&[
                ("Number", EnumCellValue::Number(42.0)),
                ("Company", text("Acme")),
            ]))
            .expect("render");
        assert!(read_part(&v_docx, "word/header1.xml").contains("<w:t>Invoice 42</w:t>"));
        assert!(read_part(&v_docx, "word/footer1.xml").contains("<w:t>Acme</w:t>"));
        assert_eq!(
            read_part(&v_docx, "word/styles.xml"),
            "<w:styles>{{ not_a_tag }}</w:styles>"
        );
    }

    #[test]
    fn render_evaluates_statements_and_filters() {
        let template = DocxTemplate::from_bytes(&build_docx(concat!(
            "<w:p><w:r><w:t>{% if Qty &gt; 5 %}bulk{% else %}single{% endif %}</w:t></w:r></w:p>",
            "<w:p><w:r><w:t>{{ Name | upper }} / {{ Price | round(1) }}</w:t></w:r></w:p>",
            "<w:p><w:r><w:t>{# internal note #}done</w:t></w:r></w:p>"
        )))
        .expect("load template");
        assert_eq!(
            template.placeholders().iter().collect::<Vec<_>>(),
            vec!["Name", "Price", "Qty"]
        );

        let v_docx = template
            .render(&mapping(&[
                ("Qty", EnumCellValue::Number(10.0)),
                ("Name", text("widget")),
                ("Price", EnumCellValue::Number(19.96)),
            ]))
            .expect("render bulk");
        let c_xml = read_part(&v_docx, C_PART_MAIN_DOCUMENT);
        assert!(c_xml.contains("<w:t>bulk</w:t>"), "{c_xml}");
        assert!(c_xml.contains("<w:t>WIDGET / 20.0</w:t>"), "{c_xml}");
        assert!(c_xml.contains("<w:t>done</w:t>"), "{c_xml}");

        let v_docx = template
            .render(&mapping(&[
                ("Qty", EnumCellValue::Number(1.0)),
                ("Name", text("gadget")),
                ("Price", EnumCellValue::Number(5.0)),
            ]))
            .expect("render single");
        assert!(read_part(&v_docx, C_PART_MAIN_DOCUMENT).contains("<w:t>single</w:t>"));
    }

    #[test]
    fn render_escapes_xml_special_chars() {
        let template = DocxTemplate::from_bytes(&build_docx(
            "<w:p><w:r><w:t>{{ Company }} &amp; co</w:t></w:r></w:p>",
        ))
        .expect("load template");
        let v_docx = template
            .render(&mapping(&[("Company", text("Smith & <Sons>"))]))
            .expect("render");
        let c_xml = read_part(&v_docx, C_PART_MAIN_DOCUMENT);
        assert!(c_xml.contains("<w:t>Smith &amp; &lt;Sons&gt; &amp; co</w:t>"), "{c_xml}");
    }

    #[test]
    fn render_row_level_errors() {
        let template = DocxTemplate::from_bytes(&build_docx(
            "<w:p><w:r><w:t>{{ Name }} {{ Price }}</w:t></w:r></w:p>",
        ))
        .expect("load template");

        let err = template
            .render(&mapping(&[("Name", text("x"))]))
            .expect_err("undefined must fail");
        assert!(matches!(err, RenderError::UndefinedPlaceholder(ref key) if key == "Price"));
        assert_eq!(err.to_string(), "'Price' is undefined");

        let err = template
            .render(&mapping(&[
                ("Name", text("bad\u{1}")),
                ("Price", EnumCellValue::Number(1.0)),
            ]))
            .expect_err("control char must fail");
        assert!(matches!(
            err,
            RenderError::InvalidXmlChar { codepoint: 1, .. }
        ));
        assert_eq!(
            err.to_string(),
            "value of 'Name' contains a character not allowed in XML (U+0001)"
        );
    }

    #[test]
    fn render_missing_value_policy() {
        let v_template = build_docx("<w:p><w:r><w:t>[{{ Price }}]</w:t></w:r></w:p>");
        let dict_mapping = mapping(&[("Price", EnumCellValue::None)]);

        let template_blank = DocxTemplate::from_bytes(&v_template).expect("load template");
        let v_docx = template_blank.render(&dict_mapping).expect("blank renders");
        assert!(read_part(&v_docx, C_PART_MAIN_DOCUMENT).contains("<w:t>[]</w:t>"));

        let template_strict = DocxTemplate::from_bytes(&v_template)
            .expect("load template")
            .with_missing_value_mode(EnumMissingValueMode::Error);
        let err = template_strict
            .render(&dict_mapping)
            .expect_err("strict must fail");
        assert!(matches!(err, RenderError::MissingValue(ref key) if key == "Price"));
    }

    #[test]
    fn render_keeps_template_untouched_between_calls() {
        let template = DocxTemplate::from_bytes(&build_docx(
            "<w:p><w:r><w:t>{{ Name }}</w:t></w:r></w:p>",
        ))
        .expect("load template");
        let v_first = template
            .render(&mapping(&[("Name", text("A"))]))
            .expect("render first");
        let v_second = template
            .render(&mapping(&[("Name", text("B"))]))
            .expect("render second");

        assert!(read_part(&v_first, C_PART_MAIN_DOCUMENT).contains("<w:t>A</w:t>"));
        assert!(read_part(&v_second, C_PART_MAIN_DOCUMENT).contains("<w:t>B</w:t>"));
        assert_eq!(
            read_part(&v_second, "[Content_Types].xml"),
            read_part(&v_first, "[Content_Types].xml")
        );
    }

    #[test]
    fn normalize_paragraph_texts_moves_boundaries_to_tag_end() {
        assert_eq!(
            normalize_paragraph_texts(&["a {{ x", " }} b", "{% if y %}c{% endif %}"]),
            vec![Some("a {{ x }}".to_string()), Some(" b".to_string()), None]
        );
        assert_eq!(
            normalize_paragraph_texts(&["plain", " text"]),
            vec![None, None]
        );
        assert_eq!(normalize_paragraph_texts(&["{{ x }}"]), vec![None]);
    }

    #[test]
    fn from_bytes_rejects_bad_templates() {
        assert!(matches!(
            DocxTemplate::from_bytes(b"not a zip"),
            Err(TemplateError::Zip(_))
        ));

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("readme.txt", SimpleFileOptions::default())
            .expect("start file");
        writer.write_all(b"hello").expect("write");
        let v_no_document = writer.finish().expect("finish").into_inner();
        assert!(matches!(
            DocxTemplate::from_bytes(&v_no_document),
            Err(TemplateError::MissingMainDocument)
        ));

        let err = DocxTemplate::from_bytes(&build_docx(
            "<w:p><w:r><w:t>{{ Name</w:t></w:r></w:p>",
        ))
        .expect_err("unterminated tag");
        assert!(matches!(err, TemplateError::Syntax { ref part, .. } if part == C_PART_MAIN_DOCUMENT));

        let err = DocxTemplate::from_bytes(&build_docx(
            "<w:p><w:r><w:t>{% for x in items %}</w:t></w:r></w:p>",
        ))
        .expect_err("unclosed block");
        assert!(matches!(err, TemplateError::Syntax { .. }));

        let err = DocxTemplate::from_bytes(&build_docx("<w:p><w:r><w:t>x</w:r></w:p>"))
            .expect_err("mismatched end tag");
        assert!(matches!(err, TemplateError::Xml { .. }));
    }
}
