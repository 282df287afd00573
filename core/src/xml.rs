//! Parameter trees and their rendering into the RPM XML dialect.
//!
//! # Design
//! Callers describe operation parameters either as a pre-built XML string or
//! as a `Param` tree. Every variant has a fixed rendering rule, so the
//! serializer is a plain `match` instead of probing the shape of loosely
//! typed input at runtime.
//!
//! Text content is entity-escaped, including `%`, because the server
//! percent-decodes the form body a second time. Attribute values are written
//! verbatim: escaping them is the caller's job.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::{Map, Value};

/// Reserved object key holding element attributes when converting JSON.
pub const ATTRIBUTES_KEY: &str = "attributes";

/// Reserved object key holding inline element text when converting JSON.
pub const TEXT_KEY: &str = "text";

static DOUBLE_ESCAPED_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&amp;(amp|lt|gt|quot);").expect("entity pattern is a valid regex")
});

/// A node of an operation parameter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Renders as a self-closing tag when it is the value of a key.
    Empty,
    /// Text content, entity-escaped on output.
    Scalar(String),
    /// Executable snippet, wrapped in a CDATA section instead of escaped.
    Script(String),
    /// Pre-built XML. Bare ampersands are escaped, existing entities kept.
    Raw(String),
    /// Ordered child elements, one per key.
    Map(Vec<(String, Param)>),
    /// Repeats the enclosing element once per entry.
    List(Vec<Param>),
    /// An element carrying attributes and inline text next to its children.
    Element {
        attributes: Vec<(String, String)>,
        text: Option<String>,
        children: Vec<(String, Param)>,
    },
}

impl Param {
    /// Build a `Map` node from key/value pairs, keeping their order.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Param>,
        I: IntoIterator<Item = (K, V)>,
    {
        Param::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<Param>,
        I: IntoIterator<Item = V>,
    {
        Param::List(items.into_iter().map(Into::into).collect())
    }

    pub fn raw(xml: impl Into<String>) -> Self {
        Param::Raw(xml.into())
    }

    pub fn script(source: impl Into<String>) -> Self {
        Param::Script(source.into())
    }

    /// Element with attributes and no content yet.
    pub fn element<K, V, I>(attributes: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Param::Element {
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Set the inline text of an `Element`. Other variants are returned as-is.
    pub fn with_text(mut self, value: impl Into<String>) -> Self {
        if let Param::Element { text, .. } = &mut self {
            *text = Some(value.into());
        }
        self
    }

    /// Append a child to an `Element` or `Map`. Other variants are returned as-is.
    pub fn with_child(mut self, key: impl Into<String>, value: impl Into<Param>) -> Self {
        match &mut self {
            Param::Element { children, .. } | Param::Map(children) => {
                children.push((key.into(), value.into()));
            }
            _ => {}
        }
        self
    }

    /// Whether the node renders as a self-closing tag under a key.
    pub fn is_empty(&self) -> bool {
        match self {
            Param::Empty => true,
            Param::Scalar(s) | Param::Script(s) | Param::Raw(s) => s.is_empty(),
            Param::Map(entries) => entries.is_empty(),
            Param::List(_) => false,
            Param::Element {
                text, children, ..
            } => children.is_empty() && text.as_deref().map_or(true, str::is_empty),
        }
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Scalar(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Scalar(value)
    }
}

impl From<&String> for Param {
    fn from(value: &String) -> Self {
        Param::Scalar(value.clone())
    }
}

// Zero is falsy and renders as a self-closing tag, like `false`.
macro_rules! scalar_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Param {
                fn from(value: $ty) -> Self {
                    if value == 0 {
                        Param::Empty
                    } else {
                        Param::Scalar(value.to_string())
                    }
                }
            }
        )*
    };
}

scalar_from_integer!(i32, i64, u16, u32, u64, usize);

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        if value {
            Param::Scalar("true".to_string())
        } else {
            Param::Empty
        }
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        if value == 0.0 || value.is_nan() {
            Param::Empty
        } else {
            Param::Scalar(value.to_string())
        }
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Param::Empty, Into::into)
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(value: Vec<T>) -> Self {
        Param::list(value)
    }
}

/// Convert a JSON tree. Objects holding `attributes` or `text` become
/// `Element` nodes; `null`, `false` and zero become `Empty`.
impl From<Value> for Param {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Param::Empty,
            Value::Bool(b) => Param::from(b),
            Value::Number(n) if n.as_f64() == Some(0.0) => Param::Empty,
            Value::Number(n) => Param::Scalar(n.to_string()),
            Value::String(s) => Param::Scalar(s),
            Value::Array(items) => Param::List(items.into_iter().map(Param::from).collect()),
            Value::Object(map) => from_object(map),
        }
    }
}

fn from_object(mut map: Map<String, Value>) -> Param {
    let attributes = map.shift_remove(ATTRIBUTES_KEY);
    let text = map.shift_remove(TEXT_KEY);
    let children: Vec<(String, Param)> = map
        .into_iter()
        .map(|(k, v)| (k, Param::from(v)))
        .collect();

    if attributes.is_none() && text.is_none() {
        return Param::Map(children);
    }

    let attributes = match attributes {
        Some(Value::Object(attrs)) => attrs
            .into_iter()
            .map(|(k, v)| (k, value_text(&v)))
            .collect(),
        _ => Vec::new(),
    };
    Param::Element {
        attributes,
        text: text.as_ref().map(value_text),
        children,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render the content of a parameter tree as an XML fragment.
///
/// Attributes belong to the tag of the key holding an `Element`, so a
/// top-level `Element` renders its children and text only.
pub fn serialize(param: &Param) -> String {
    let mut out = String::new();
    write_content(&mut out, param);
    out
}

/// Escape text content: `&`, `<`, `>` and `%`.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '%' => out.push_str("&#37;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape bare ampersands in pre-built XML without double-escaping
/// `&amp;`, `&lt;`, `&gt;` or `&quot;`.
pub fn escape_raw(xml: &str) -> String {
    let escaped = xml.replace('&', "&amp;");
    DOUBLE_ESCAPED_ENTITY
        .replace_all(&escaped, "&${1};")
        .into_owned()
}

fn write_cdata(out: &mut String, source: &str) {
    out.push_str("<![CDATA[");
    // A literal terminator has to be split across two sections.
    out.push_str(&source.replace("]]>", "]]]]><![CDATA[>"));
    out.push_str("]]>");
}

fn write_content(out: &mut String, param: &Param) {
    match param {
        Param::Empty => {}
        Param::Scalar(text) => out.push_str(&escape_text(text)),
        Param::Script(source) => write_cdata(out, source),
        Param::Raw(xml) => out.push_str(&escape_raw(xml)),
        Param::Map(entries) => {
            for (key, value) in entries {
                write_element(out, key, value);
            }
        }
        Param::List(items) => {
            for item in items {
                write_content(out, item);
            }
        }
        Param::Element { text, children, .. } => {
            for (key, value) in children {
                write_element(out, key, value);
            }
            if let Some(text) = text {
                out.push_str(&escape_text(text));
            }
        }
    }
}

fn write_element(out: &mut String, key: &str, value: &Param) {
    match value {
        Param::List(items) => {
            for item in items {
                write_element(out, key, item);
            }
        }
        Param::Element { attributes, .. } => {
            out.push('<');
            out.push_str(key);
            for (name, attr) in attributes {
                out.push_str(&format!(" {name}='{attr}'"));
            }
            if value.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                write_content(out, value);
                out.push_str(&format!("</{key}>"));
            }
        }
        _ if value.is_empty() => out.push_str(&format!("<{key}/>")),
        _ => {
            out.push_str(&format!("<{key}>"));
            write_content(out, value);
            out.push_str(&format!("</{key}>"));
        }
    }
}
