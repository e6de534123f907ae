//! MarcXchange serialization and deserialization of records.
//!
//! MarcXchange (`info:lc/xmlns/marcxchange-v1`) is the ISO 25577 XML
//! container for MARC-family records. A stored record looks like:
//!
//! ```xml
//! <marcx:record xmlns:marcx="info:lc/xmlns/marcxchange-v1" format="danMARC2" type="Bibliographic">
//!   <marcx:leader>00000n    2200000   4500</marcx:leader>
//!   <marcx:datafield tag="245" ind1="0" ind2="0">
//!     <marcx:subfield code="a">Title</marcx:subfield>
//!   </marcx:datafield>
//! </marcx:record>
//! ```
//!
//! Reading is namespace aware: the root element must be `record` in the
//! MarcXchange namespace whatever prefix the document binds to it. Text and
//! CDATA nodes consisting only of whitespace are dropped on read, so
//! formatting added by storage never leaks into a serialized result.
//!
//! A [`MarcxDocument`] keeps the root element (qualified name, namespace
//! declarations, attributes) and every non-datafield child such as the
//! leader, and exposes the datafields as a [`Record`]. Writing emits the
//! preserved root, then the preserved children, then the record's fields,
//! as compact UTF-8 XML.
//!
//! # Examples
//!
//! ```
//! use rawrepo_marcx::marcxchange;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let xml = br#"<record xmlns="info:lc/xmlns/marcxchange-v1">
//!     <datafield tag="245" ind1="0" ind2="0"><subfield code="a">Title</subfield></datafield>
//! </record>"#;
//! let record = marcxchange::decode_record(xml)?;
//! assert_eq!(record.get_field("245").and_then(|f| f.get_subfield('a')), Some("Title"));
//!
//! let bytes = marcxchange::encode_record(&record)?;
//! assert_eq!(marcxchange::decode_record(&bytes)?, record);
//! # Ok(())
//! # }
//! ```

use crate::error::CodecError;
use crate::record::{Field, Record, Subfield};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Writer};
use unicode_normalization::UnicodeNormalization;

/// The MarcXchange namespace URI.
pub const MARCX_NS: &str = "info:lc/xmlns/marcxchange-v1";

/// Prefix used when encoding a record without an existing document.
const DEFAULT_PREFIX: &str = "marcx";

/// Leader written by [`encode_record`].
const DEFAULT_LEADER: &str = "00000n    2200000   4500";

const ELEMENT_RECORD: &str = "record";
const ELEMENT_DATAFIELD: &str = "datafield";
const ELEMENT_SUBFIELD: &str = "subfield";
const ELEMENT_LEADER: &str = "leader";

// ---------------------------------------------------------------------------
// Generic element tree
// ---------------------------------------------------------------------------

/// A node of a parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// A child element
    Element(XmlElement),
    /// Character data (unescaped)
    Text(String),
    /// A CDATA section
    CData(String),
}

/// An element of a parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written (`marcx:record`, `record`, ...)
    pub name: String,
    /// Namespace URI the name resolved to, if bound
    pub namespace: Option<String>,
    /// Attributes in document order, including namespace declarations
    pub attributes: Vec<(String, String)>,
    /// Child nodes in document order
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>, ns: &ResolveResult<'_>) -> Result<Self, CodecError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let namespace = match ns {
            ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
            ResolveResult::Unbound => None,
            ResolveResult::Unknown(prefix) => {
                return Err(CodecError::Xml(format!(
                    "unknown namespace prefix '{}' on <{name}>",
                    String::from_utf8_lossy(prefix)
                )))
            }
        };

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }

        Ok(XmlElement {
            name,
            namespace,
            attributes,
            children: Vec::new(),
        })
    }

    /// Local part of the qualified name
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    /// Prefix of the qualified name, if any
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Value of an attribute
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether this element is `{MarcXchange}local`
    fn is_marcx(&self, local: &str) -> bool {
        self.namespace.as_deref() == Some(MARCX_NS) && self.local_name() == local
    }

    /// Concatenated text and CDATA content of the direct children
    fn text_content(&self) -> String {
        let mut text = String::new();
        for child in &self.children {
            match child {
                XmlNode::Text(t) | XmlNode::CData(t) => text.push_str(t),
                XmlNode::Element(_) => {}
            }
        }
        text
    }

    /// `{namespace}local` form used in error messages
    fn expanded_name(&self) -> String {
        format!(
            "{{{}}}{}",
            self.namespace.as_deref().unwrap_or_default(),
            self.local_name()
        )
    }
}

/// Parse XML bytes into an element tree, dropping whitespace-only text.
///
/// Comments, processing instructions and the XML declaration are skipped.
fn parse_tree(bytes: &[u8]) -> Result<XmlElement, CodecError> {
    let mut reader = NsReader::from_reader(bytes);
    reader.expand_empty_elements(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_resolved_event()? {
            (ns, Event::Start(start)) => {
                if root.is_some() {
                    return Err(CodecError::UnbalancedDocument(
                        "content after the root element".to_string(),
                    ));
                }
                stack.push(XmlElement::from_start(&start, &ns)?);
            }
            (_, Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| {
                    CodecError::UnbalancedDocument("end tag without start tag".to_string())
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None => root = Some(element),
                }
            }
            (_, Event::Text(text)) => {
                let value = text.unescape()?;
                push_text(&mut stack, XmlNode::Text(value.into_owned()))?;
            }
            (_, Event::CData(cdata)) => {
                let value = String::from_utf8(cdata.into_inner().into_owned())
                    .map_err(|e| CodecError::Xml(e.to_string()))?;
                push_text(&mut stack, XmlNode::CData(value))?;
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(CodecError::UnbalancedDocument(format!(
            "unclosed element <{}>",
            stack[stack.len() - 1].name
        )));
    }
    root.ok_or_else(|| CodecError::UnbalancedDocument("no root element".to_string()))
}

fn push_text(stack: &mut [XmlElement], node: XmlNode) -> Result<(), CodecError> {
    let (XmlNode::Text(value) | XmlNode::CData(value)) = &node else {
        return Ok(());
    };
    if value.trim().is_empty() {
        return Ok(());
    }
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None => Err(CodecError::Xml(
            "character data outside the root element".to_string(),
        )),
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<(), CodecError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
            XmlNode::CData(t) => writer.write_event(Event::CData(BytesCData::new(t.as_str())))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// MarcXchange documents
// ---------------------------------------------------------------------------

/// A parsed MarcXchange document.
///
/// `root` holds the record element with its attributes and every child that
/// is not a datafield; `record` holds the datafields in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarcxDocument {
    /// The root `record` element without its datafield children
    pub root: XmlElement,
    /// The datafields of the document
    pub record: Record,
}

impl MarcxDocument {
    /// Parse MarcXchange bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NotARecord`] if the outermost element is not
    /// `{info:lc/xmlns/marcxchange-v1}record`, and another [`CodecError`] if
    /// the bytes are not well-formed or a datafield/subfield lacks its
    /// `tag`/`code` attribute.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut root = parse_tree(bytes)?;
        if !root.is_marcx(ELEMENT_RECORD) {
            return Err(CodecError::NotARecord {
                found: root.expanded_name(),
            });
        }

        let mut record = Record::new();
        let mut kept = Vec::with_capacity(root.children.len());
        for child in std::mem::take(&mut root.children) {
            match child {
                XmlNode::Element(e) if e.is_marcx(ELEMENT_DATAFIELD) => {
                    record.add_field(datafield_to_field(&e)?);
                }
                other => kept.push(other),
            }
        }
        root.children = kept;

        Ok(MarcxDocument { root, record })
    }

    /// Wrap a record in a fresh danMARC2 document with the default leader.
    #[must_use]
    pub fn new(record: Record) -> Self {
        let qualify = |local: &str| format!("{DEFAULT_PREFIX}:{local}");
        let leader = XmlElement {
            name: qualify(ELEMENT_LEADER),
            namespace: Some(MARCX_NS.to_string()),
            attributes: Vec::new(),
            children: vec![XmlNode::Text(DEFAULT_LEADER.to_string())],
        };
        let root = XmlElement {
            name: qualify(ELEMENT_RECORD),
            namespace: Some(MARCX_NS.to_string()),
            attributes: vec![
                (format!("xmlns:{DEFAULT_PREFIX}"), MARCX_NS.to_string()),
                ("format".to_string(), "danMARC2".to_string()),
                ("type".to_string(), "Bibliographic".to_string()),
            ],
            children: vec![XmlNode::Element(leader)],
        };
        MarcxDocument { root, record }
    }

    /// The `format` attribute of the root element (e.g. `danMARC2`)
    #[must_use]
    pub fn format(&self) -> Option<&str> {
        self.root.attribute("format")
    }

    /// Serialize the document as compact UTF-8 XML with an XML declaration.
    ///
    /// Datafields and subfields are written with the root element's prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let qualify = |local: &str| match self.root.prefix() {
            Some(prefix) => format!("{prefix}:{local}"),
            None => local.to_string(),
        };
        let datafield_name = qualify(ELEMENT_DATAFIELD);
        let subfield_name = qualify(ELEMENT_SUBFIELD);

        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut start = BytesStart::new(self.root.name.as_str());
        for (key, value) in &self.root.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        writer.write_event(Event::Start(start))?;

        for child in &self.root.children {
            match child {
                XmlNode::Element(e) => write_element(&mut writer, e)?,
                XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
                XmlNode::CData(t) => {
                    writer.write_event(Event::CData(BytesCData::new(t.as_str())))?;
                }
            }
        }

        for field in self.record.fields() {
            let (ind1, ind2) = split_indicator(&field.indicator);
            let mut start = BytesStart::new(datafield_name.as_str());
            start.push_attribute(("tag", field.tag.as_str()));
            start.push_attribute(("ind1", ind1.as_str()));
            start.push_attribute(("ind2", ind2.as_str()));
            writer.write_event(Event::Start(start))?;

            for subfield in field.subfields() {
                let mut code = [0u8; 4];
                let code = subfield.code.encode_utf8(&mut code);
                let mut start = BytesStart::new(subfield_name.as_str());
                start.push_attribute(("code", &*code));
                writer.write_event(Event::Start(start))?;
                writer.write_event(Event::Text(BytesText::new(&subfield.value)))?;
                writer.write_event(Event::End(BytesEnd::new(subfield_name.as_str())))?;
            }

            writer.write_event(Event::End(BytesEnd::new(datafield_name.as_str())))?;
        }

        writer.write_event(Event::End(BytesEnd::new(self.root.name.as_str())))?;
        Ok(writer.into_inner())
    }
}

/// Split an indicator string into `ind1`/`ind2` attribute values.
///
/// Missing positions become a blank; characters beyond the second are
/// dropped.
fn split_indicator(indicator: &str) -> (String, String) {
    let mut chars = indicator.chars();
    let ind1 = chars.next().unwrap_or(' ');
    let ind2 = chars.next().unwrap_or(' ');
    (ind1.to_string(), ind2.to_string())
}

fn datafield_to_field(element: &XmlElement) -> Result<Field, CodecError> {
    let tag = element
        .attribute("tag")
        .ok_or_else(|| CodecError::MissingAttribute {
            element: ELEMENT_DATAFIELD.to_string(),
            attribute: "tag".to_string(),
        })?;
    let ind1 = element.attribute("ind1").unwrap_or(" ");
    let ind2 = element.attribute("ind2").unwrap_or(" ");

    let mut field = Field::new(tag, format!("{ind1}{ind2}"));
    for child in &element.children {
        if let XmlNode::Element(sub) = child {
            if !sub.is_marcx(ELEMENT_SUBFIELD) {
                continue;
            }
            let code = sub
                .attribute("code")
                .ok_or_else(|| CodecError::MissingAttribute {
                    element: ELEMENT_SUBFIELD.to_string(),
                    attribute: "code".to_string(),
                })?;
            field.subfields.push(Subfield {
                code: subfield_code(code)?,
                value: sub.text_content(),
            });
        }
    }
    Ok(field)
}

/// Normalize a subfield code to NFC and require exactly one character.
fn subfield_code(raw: &str) -> Result<char, CodecError> {
    let normalized: String = raw.nfc().collect();
    let mut chars = normalized.chars();
    match (chars.next(), chars.next()) {
        (Some(code), None) => Ok(code),
        _ => Err(CodecError::InvalidSubfieldCode(raw.to_string())),
    }
}

/// Decode MarcXchange bytes into a [`Record`].
///
/// # Errors
///
/// See [`MarcxDocument::parse`].
pub fn decode_record(bytes: &[u8]) -> Result<Record, CodecError> {
    MarcxDocument::parse(bytes).map(|doc| doc.record)
}

/// Encode a [`Record`] as a danMARC2 MarcXchange document.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn encode_record(record: &Record) -> Result<Vec<u8>, CodecError> {
    MarcxDocument::new(record.clone()).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIXED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<marcx:record xmlns:marcx="info:lc/xmlns/marcxchange-v1" format="danMARC2" type="Bibliographic">
    <marcx:leader>00000n    2200000   4500</marcx:leader>
    <marcx:datafield tag="001" ind1="0" ind2="0">
        <marcx:subfield code="a">12345678</marcx:subfield>
        <marcx:subfield code="b">870970</marcx:subfield>
    </marcx:datafield>
    <marcx:datafield tag="245" ind1="0" ind2="0">
        <marcx:subfield code="a">Title &amp; more</marcx:subfield>
    </marcx:datafield>
</marcx:record>"#;

    #[test]
    fn test_parse_prefixed_document() {
        let doc = MarcxDocument::parse(PREFIXED.as_bytes()).unwrap();
        assert_eq!(doc.format(), Some("danMARC2"));
        assert_eq!(doc.record.len(), 2);
        assert_eq!(doc.record.record_id(), Some("12345678"));
        assert_eq!(doc.record["245"].get_subfield('a'), Some("Title & more"));
        assert_eq!(doc.record["245"].indicator, "00");
        // leader kept, whitespace dropped
        assert_eq!(doc.root.children.len(), 1);
        match &doc.root.children[0] {
            XmlNode::Element(e) => {
                assert_eq!(e.local_name(), "leader");
                assert_eq!(e.text_content(), DEFAULT_LEADER);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_parse_default_namespace() {
        let xml = r#"<record xmlns="info:lc/xmlns/marcxchange-v1"><datafield tag="100" ind1="0" ind2="0"><subfield code="a">Smith</subfield></datafield></record>"#;
        let record = decode_record(xml.as_bytes()).unwrap();
        assert_eq!(&record["100"]['a'], "Smith");
    }

    #[test]
    fn test_wrong_namespace_is_not_a_record() {
        let xml = r#"<record xmlns="http://www.loc.gov/MARC21/slim"><datafield tag="100"/></record>"#;
        match decode_record(xml.as_bytes()) {
            Err(CodecError::NotARecord { found }) => {
                assert_eq!(found, "{http://www.loc.gov/MARC21/slim}record");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_wrong_root_is_not_a_record() {
        let xml = r#"<collection xmlns="info:lc/xmlns/marcxchange-v1"/>"#;
        assert!(matches!(
            decode_record(xml.as_bytes()),
            Err(CodecError::NotARecord { .. })
        ));
    }

    #[test]
    fn test_malformed_xml() {
        let xml = r#"<record xmlns="info:lc/xmlns/marcxchange-v1"><datafield tag="100">"#;
        assert!(decode_record(xml.as_bytes()).is_err());
    }

    #[test]
    fn test_missing_tag_attribute() {
        let xml = r#"<record xmlns="info:lc/xmlns/marcxchange-v1"><datafield ind1="0" ind2="0"/></record>"#;
        assert!(matches!(
            decode_record(xml.as_bytes()),
            Err(CodecError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_decomposed_subfield_code_is_normalized() {
        let xml = "<record xmlns=\"info:lc/xmlns/marcxchange-v1\"><datafield tag=\"700\" ind1=\"0\" ind2=\"0\"><subfield code=\"a\u{30a}\">1001</subfield></datafield></record>";
        let record = decode_record(xml.as_bytes()).unwrap();
        assert_eq!(record["700"].disambiguation(), Some("1001"));
    }

    #[test]
    fn test_multi_character_code_rejected() {
        let xml = r#"<record xmlns="info:lc/xmlns/marcxchange-v1"><datafield tag="700" ind1="0" ind2="0"><subfield code="ab">x</subfield></datafield></record>"#;
        assert!(matches!(
            decode_record(xml.as_bytes()),
            Err(CodecError::InvalidSubfieldCode(_))
        ));
    }

    #[test]
    fn test_cdata_subfield_value() {
        let xml = r#"<record xmlns="info:lc/xmlns/marcxchange-v1"><datafield tag="245" ind1="0" ind2="0"><subfield code="a"><![CDATA[a <b> c]]></subfield></datafield></record>"#;
        let record = decode_record(xml.as_bytes()).unwrap();
        assert_eq!(record["245"].get_subfield('a'), Some("a <b> c"));
    }

    #[test]
    fn test_whitespace_cdata_between_datafields_is_dropped() {
        let xml = r#"<record xmlns="info:lc/xmlns/marcxchange-v1"><![CDATA[   ]]><datafield tag="001" ind1="0" ind2="0"><subfield code="a">1</subfield><subfield code="b">870970</subfield></datafield><![CDATA[   ]]><datafield tag="245" ind1="0" ind2="0"><subfield code="a">Title</subfield></datafield><![CDATA[
]]></record>"#;
        let doc = MarcxDocument::parse(xml.as_bytes()).unwrap();
        assert!(doc.root.children.iter().all(|node| !matches!(node, XmlNode::CData(_))));
        assert_eq!(doc.record.len(), 2);
        assert!(!String::from_utf8(doc.to_bytes().unwrap()).unwrap().contains("CDATA"));

        let rules = crate::field_rules::FieldRules::danmarc2();
        let merged = crate::merger::merge(xml.as_bytes(), xml.as_bytes(), false, &rules).unwrap();
        let text = String::from_utf8(merged).unwrap();
        assert!(!text.contains("CDATA"));
        assert!(text.contains("Title"));
    }

    #[test]
    fn test_to_bytes_is_compact_and_keeps_root() {
        let doc = MarcxDocument::parse(PREFIXED.as_bytes()).unwrap();
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert!(out.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(out.contains(
            r#"<marcx:record xmlns:marcx="info:lc/xmlns/marcxchange-v1" format="danMARC2" type="Bibliographic">"#
        ));
        assert!(out.contains(
            r#"<marcx:datafield tag="245" ind1="0" ind2="0"><marcx:subfield code="a">Title &amp; more</marcx:subfield></marcx:datafield>"#
        ));
        assert!(!out.contains('\n'));
        // leader comes before the datafields
        assert!(out.find("marcx:leader").unwrap() < out.find("marcx:datafield").unwrap());
    }

    #[test]
    fn test_encode_decode_preserves_fields() {
        let record = Record::builder()
            .field(
                Field::builder("700", "00")
                    .subfield_str('å', "1001")
                    .subfield_str('a', "Smith, John")
                    .build(),
            )
            .build();
        let bytes = encode_record(&record).unwrap();
        assert_eq!(decode_record(&bytes).unwrap(), record);
    }

    #[test]
    fn test_split_indicator() {
        assert_eq!(split_indicator("00"), ("0".to_string(), "0".to_string()));
        assert_eq!(split_indicator("1"), ("1".to_string(), " ".to_string()));
        assert_eq!(split_indicator(""), (" ".to_string(), " ".to_string()));
    }
}
