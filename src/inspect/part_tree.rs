use crate::error_handling::types::CaptureError;
use mail_parser::{MessageParser, MimeHeaders, PartType};
use std::fs;
use std::path::Path;

/// One node of a parsed MIME message: headers, decoded content and children.
///
/// Built on demand from the raw payload; the capture itself stays untouched.
#[derive(Debug, Clone)]
pub struct PartNode {
    pub headers: Vec<(String, String)>,
    pub mime_type: String,
    /// Attachment file name, when the part declares one.
    pub file_name: Option<String>,
    /// Decoded text for text parts.
    pub text: Option<String>,
    /// Decoded content bytes; empty for multipart containers.
    pub contents: Vec<u8>,
    pub children: Vec<PartNode>,
}

impl PartNode {
    /// Parses a raw RFC 2045 byte stream into a part tree.
    pub fn parse(raw: &[u8]) -> Result<PartNode, CaptureError> {
        let parsed = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| CaptureError::MimeError("payload is not a parseable message".to_string()))?;
        Ok(build(&parsed, 0))
    }

    pub fn is_html(&self) -> bool {
        self.mime_type == "text/html"
    }

    pub fn is_multipart(&self) -> bool {
        !self.children.is_empty()
    }

    /// Label for display: the declared file name, or the mime type with a
    /// size hint.
    pub fn display_name(&self) -> String {
        match &self.file_name {
            Some(name) => name.clone(),
            None => format!("Unnamed: {} ({} bytes)", self.mime_type, self.contents.len()),
        }
    }

    /// File name to offer when saving this part: the declared name, with an
    /// extension guessed from the mime type when it has none.
    pub fn suggested_file_name(&self) -> String {
        let base = self.file_name.clone().unwrap_or_else(|| "Unnamed".to_string());
        if Path::new(&base).extension().is_some() {
            return base;
        }
        let extension = mime_guess::get_mime_extensions_str(&self.mime_type)
            .and_then(|extensions| extensions.first())
            .copied()
            .unwrap_or("part");
        format!("{}.{}", base, extension)
    }

    /// Writes the decoded content (not the transfer encoding) to `path`.
    pub fn save_contents(&self, path: &Path) -> Result<(), CaptureError> {
        fs::write(path, &self.contents)?;
        Ok(())
    }
}

fn build(message: &mail_parser::Message<'_>, part_id: usize) -> PartNode {
    let part = &message.parts[part_id];

    let headers = part
        .headers
        .iter()
        .map(|header| {
            (
                header.name.as_str().to_string(),
                header.value.as_text().unwrap_or_default().to_string(),
            )
        })
        .collect();

    let mime_type = part
        .content_type()
        .map(|ct| match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| "text/plain".to_string());

    let file_name = part.attachment_name().map(str::to_string);

    let (text, contents, children) = match &part.body {
        PartType::Text(body) | PartType::Html(body) => (
            Some(body.to_string()),
            body.as_bytes().to_vec(),
            Vec::new(),
        ),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            (None, bytes.to_vec(), Vec::new())
        }
        PartType::Message(inner) => (None, Vec::new(), vec![build(inner, 0)]),
        PartType::Multipart(ids) => (
            None,
            Vec::new(),
            ids.iter().map(|id| build(message, *id)).collect(),
        ),
    };

    PartNode {
        headers,
        mime_type,
        file_name,
        text,
        contents,
        children,
    }
}
