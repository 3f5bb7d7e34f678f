//! Footer index: the XML table of contents appended at the end of a file.
//!
//! Only the coordinator rank builds a [`FooterIndex`]. Each completed
//! multiwrite appends one [`FooterRecord`]; the whole index is rendered once,
//! at close, as
//!
//! ```text
//! <VLSV>
//!    <PARAMETER arraysize="1" datasize="8" datatype="float" name="time" vectorsize="1">16</PARAMETER>
//! </VLSV>
//! ```
//!
//! where the element text is the byte offset of the array payload.

use crate::format::{ArrayDescriptor, Datatype};
use crate::vlsv_error::VlsvError;
use quick_xml::escape::escape;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Name of the root element.
pub const ROOT_TAG: &str = "VLSV";
pub const ATTR_VECTORSIZE: &str = "vectorsize";
pub const ATTR_ARRAYSIZE: &str = "arraysize";
pub const ATTR_DATATYPE: &str = "datatype";
pub const ATTR_DATASIZE: &str = "datasize";

/// One array entry of the footer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FooterRecord {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub offset: u64,
}

impl FooterRecord {
    /// Record for an array of `total_elements` vector elements (summed over
    /// the group) starting at `offset`. The standard attributes override
    /// caller attributes of the same name.
    pub fn new(
        tag: &str,
        attributes: &BTreeMap<String, String>,
        offset: u64,
        desc: &ArrayDescriptor,
        total_elements: u64,
    ) -> Self {
        let mut attributes = attributes.clone();
        attributes.insert(ATTR_VECTORSIZE.into(), desc.vector_size.to_string());
        attributes.insert(ATTR_ARRAYSIZE.into(), total_elements.to_string());
        attributes.insert(ATTR_DATATYPE.into(), desc.datatype.as_str().into());
        attributes.insert(ATTR_DATASIZE.into(), desc.data_size.to_string());
        Self {
            tag: tag.to_string(),
            attributes,
            offset,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn numeric(&self, name: &str) -> Result<u64, VlsvError> {
        let raw = self
            .attribute(name)
            .ok_or_else(|| VlsvError::Footer(format!("<{}> lacks `{name}`", self.tag)))?;
        raw.parse()
            .map_err(|_| VlsvError::Footer(format!("<{}> has non-numeric `{name}`", self.tag)))
    }

    pub fn vector_size(&self) -> Result<u64, VlsvError> {
        self.numeric(ATTR_VECTORSIZE)
    }

    /// Total vector elements across the group.
    pub fn array_size(&self) -> Result<u64, VlsvError> {
        self.numeric(ATTR_ARRAYSIZE)
    }

    pub fn data_size(&self) -> Result<u64, VlsvError> {
        self.numeric(ATTR_DATASIZE)
    }

    pub fn datatype(&self) -> Result<Datatype, VlsvError> {
        self.attribute(ATTR_DATATYPE)
            .ok_or_else(|| VlsvError::Footer(format!("<{}> lacks `datatype`", self.tag)))?
            .parse()
    }

    /// Payload length in bytes.
    pub fn byte_len(&self) -> Result<u64, VlsvError> {
        Ok(self.array_size()? * self.vector_size()? * self.data_size()?)
    }
}

/// Append-only list of records under the `VLSV` root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FooterIndex {
    records: Vec<FooterRecord>,
}

impl FooterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; tag and attribute names must be XML names.
    pub fn push(&mut self, record: FooterRecord) -> Result<(), VlsvError> {
        validate_name(&record.tag)?;
        for name in record.attributes.keys() {
            validate_name(name)?;
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[FooterRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record with the given tag and `name` attribute.
    pub fn find(&self, tag: &str, name: &str) -> Option<&FooterRecord> {
        self.records
            .iter()
            .find(|r| r.tag == tag && r.attribute("name") == Some(name))
    }

    /// Render the footer text.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<VLSV>\n");
        for record in &self.records {
            let _ = write!(out, "   <{}", record.tag);
            for (name, value) in &record.attributes {
                let _ = write!(out, " {name}=\"{}\"", escape(value.as_str()));
            }
            let _ = writeln!(out, ">{}</{}>", record.offset, record.tag);
        }
        out.push_str("</VLSV>\n");
        out
    }

    /// Parse footer text produced by [`FooterIndex::to_xml`].
    pub fn parse(text: &str) -> Result<Self, VlsvError> {
        let doc = roxmltree::Document::parse(text).map_err(|e| VlsvError::Footer(e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != ROOT_TAG {
            return Err(VlsvError::Footer(format!(
                "root element is <{}>, expected <{ROOT_TAG}>",
                root.tag_name().name()
            )));
        }
        let mut records = Vec::new();
        for node in root.children().filter(|n| n.is_element()) {
            let tag = node.tag_name().name().to_string();
            let text = node.text().unwrap_or("").trim();
            let offset = text.parse::<u64>().map_err(|_| {
                VlsvError::Footer(format!("<{tag}> has non-numeric offset `{text}`"))
            })?;
            let attributes = node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect();
            records.push(FooterRecord {
                tag,
                attributes,
                offset,
            });
        }
        Ok(Self { records })
    }
}

fn validate_name(name: &str) -> Result<(), VlsvError> {
    let mut chars = name.chars();
    let ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(VlsvError::Footer(format!("`{name}` is not a valid XML name")))
    }
}
