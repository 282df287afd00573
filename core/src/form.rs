//! Request body encodings: URL-encoded forms for ordinary operations and
//! `multipart/form-data` for operations that upload files.

use std::io;
use std::path::Path;

use url::form_urlencoded;

/// Value of a multipart field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File {
        filename: String,
        content_type: String,
        data: Vec<u8>,
    },
}

/// A named field of a form request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

impl FormField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FormValue::Text(value.into()),
        }
    }

    /// A binary file part sent as `application/octet-stream`.
    pub fn file(name: impl Into<String>, filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            value: FormValue::File {
                filename: filename.into(),
                content_type: "application/octet-stream".to_string(),
                data,
            },
        }
    }

    /// Read `path` into a file part named after its final component.
    pub fn from_path(name: impl Into<String>, path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::file(name, filename, data))
    }

    /// Override the content type of a file part.
    pub fn with_content_type(mut self, mime: impl Into<String>) -> Self {
        if let FormValue::File { content_type, .. } = &mut self.value {
            *content_type = mime.into();
        }
        self
    }
}

/// `application/x-www-form-urlencoded` body for `pairs`.
pub fn encode_urlencoded(pairs: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// `multipart/form-data` body for `fields`, delimited by `boundary`.
pub fn encode_multipart(fields: &[FormField], boundary: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for field in fields {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        let name = quote(&field.name);
        match &field.value {
            FormValue::Text(value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            FormValue::File {
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n",
                        quote(filename)
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

// Quotes and line breaks cannot appear inside a quoted disposition parameter.
fn quote(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencoded_body_escapes_xml() {
        let body = encode_urlencoded(&[("dataformat", "json"), ("request", "<A>x & y</A>")]);
        assert_eq!(body, "dataformat=json&request=%3CA%3Ex+%26+y%3C%2FA%3E");
    }

    #[test]
    fn multipart_body_layout() {
        let fields = vec![
            FormField::text("Operation", "UploadFile"),
            FormField::file("file", "index.js", vec![0x00, 0xff, b'x'])
                .with_content_type("application/javascript"),
        ];
        let body = encode_multipart(&fields, "XYZ");
        let mut expected = Vec::new();
        expected.extend_from_slice(
            b"--XYZ\r\nContent-Disposition: form-data; name=\"Operation\"\r\n\r\nUploadFile\r\n",
        );
        expected.extend_from_slice(
            b"--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"index.js\"\r\n\
              Content-Type: application/javascript\r\n\r\n",
        );
        expected.extend_from_slice(&[0x00, 0xff, b'x']);
        expected.extend_from_slice(b"\r\n--XYZ--\r\n");
        assert_eq!(body, expected);
    }

    #[test]
    fn disposition_names_are_quoted_safely() {
        let body = encode_multipart(&[FormField::text("a\"b", "v")], "B");
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("name=\"a%22b\""));
    }
}
