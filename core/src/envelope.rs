//! The fixed `PVRequest` XML envelope wrapped around every operation.

use serde_json::Value;

use crate::xml::{self, Param};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;
pub const PVREQUEST_NAMESPACE: &str = "http://pvelocity.com/rpm/pvrequest";

/// Operation parameters: nothing, a pre-built XML string, or a tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    #[default]
    None,
    Xml(String),
    Tree(Param),
}

impl Params {
    /// Render the `<Params>` content. Pre-built XML only has its bare
    /// ampersands escaped; trees go through the serializer.
    pub fn to_fragment(&self) -> String {
        match self {
            Params::None => String::new(),
            Params::Xml(xml) => xml::escape_raw(xml),
            Params::Tree(tree) => xml::serialize(tree),
        }
    }
}

impl From<&str> for Params {
    fn from(xml: &str) -> Self {
        Params::Xml(xml.to_string())
    }
}

impl From<String> for Params {
    fn from(xml: String) -> Self {
        Params::Xml(xml)
    }
}

impl From<Param> for Params {
    fn from(tree: Param) -> Self {
        Params::Tree(tree)
    }
}

impl From<Value> for Params {
    fn from(tree: Value) -> Self {
        Params::Tree(Param::from(tree))
    }
}

impl<T: Into<Params>> From<Option<T>> for Params {
    fn from(value: Option<T>) -> Self {
        value.map_or(Params::None, Into::into)
    }
}

/// Wrap an operation and its already-escaped parameter fragment in the
/// request envelope. The `sessionId` attribute is present only while a
/// session is active.
pub fn build_envelope(session_id: Option<&str>, operation: &str, params: &str) -> String {
    let mut out = String::with_capacity(256 + params.len());
    out.push_str(XML_DECLARATION);
    out.push_str(r#"<PVRequest xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#);
    out.push_str(r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#);
    out.push_str(&format!(r#"xmlns="{PVREQUEST_NAMESPACE}" "#));
    if let Some(id) = session_id.filter(|id| !id.is_empty()) {
        out.push_str(&format!(r#"sessionId="{id}""#));
    }
    out.push('>');
    out.push_str(&format!("<Operation><Name>{operation}</Name><Params>"));
    out.push_str(params);
    out.push_str("</Params></Operation></PVRequest>");
    out
}
