//! Inbound chat message record
//!
//! The transport that delivers these is not part of this crate; anything
//! that can fill in this shape (a webhook payload, a JSON file) can feed the
//! aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message as received from the chat channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundMessage {
    /// Platform message id, used as the key for follow-up replies
    pub message_id: Option<i64>,
    /// Message body
    pub text: Option<String>,
    /// Caption attached to a document or photo
    pub caption: Option<String>,
    /// Rich-text entities over `text`
    pub entities: Vec<MessageEntity>,
    /// Rich-text entities over `caption`
    pub caption_entities: Vec<MessageEntity>,
    /// Directly attached document
    pub document: Option<Attachment>,
    /// Who sent it
    pub sender: Option<String>,
    /// Original author when forwarded
    pub forwarded_from: Option<String>,
    /// When it was sent
    pub date: Option<DateTime<Utc>>,
}

/// A formatting entity; offsets and lengths count UTF-16 code units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
    /// Target of a `text_link`
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// The covered text is itself a URL
    Url,
    /// The covered text links to `url`
    TextLink,
    #[serde(other)]
    Other,
}

/// A file attached to the message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub source: AttachmentSource,
}

/// Where the attachment's bytes come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentSource {
    /// Already in memory
    Bytes(Vec<u8>),
    /// Downloadable (e.g. a bot file URL)
    Url(String),
}

impl InboundMessage {
    /// Message carrying only text
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Attach a document
    pub fn with_document(mut self, attachment: Attachment) -> Self {
        self.document = Some(attachment);
        self
    }

    /// The (body, entities) pairs worth scanning for links
    pub fn text_parts(&self) -> Vec<(&str, &[MessageEntity])> {
        let mut parts = Vec::new();
        if let Some(text) = self.text.as_deref() {
            parts.push((text, self.entities.as_slice()));
        }
        if let Some(caption) = self.caption.as_deref() {
            parts.push((caption, self.caption_entities.as_slice()));
        }
        parts
    }
}

impl Attachment {
    /// Whether this looks like a PDF by MIME type or file extension
    pub fn is_pdf(&self) -> bool {
        let by_mime = self
            .mime_type
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case("application/pdf"))
            .unwrap_or(false);
        by_mime || self.file_name.to_ascii_lowercase().ends_with(".pdf")
    }
}

impl MessageEntity {
    /// The slice of `text` this entity covers
    pub fn covered_text<'a>(&self, text: &'a str) -> Option<&'a str> {
        let start = utf16_to_byte_index(text, self.offset)?;
        let end = utf16_to_byte_index(text, self.offset + self.length)?;
        text.get(start..end)
    }
}

fn utf16_to_byte_index(text: &str, utf16_index: usize) -> Option<usize> {
    let mut units = 0;
    for (byte_index, ch) in text.char_indices() {
        if units == utf16_index {
            return Some(byte_index);
        }
        units += ch.len_utf16();
        if units > utf16_index {
            return None;
        }
    }
    (units == utf16_index).then_some(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_offsets_count_utf16_units() {
        // The rocket takes two UTF-16 units
        let text = "🚀 deck: https://docsend.com/view/abc";
        let entity = MessageEntity {
            kind: EntityKind::Url,
            offset: 9,
            length: 28,
            url: None,
        };
        assert_eq!(entity.covered_text(text), Some("https://docsend.com/view/abc"));
    }

    #[test]
    fn test_entity_out_of_range() {
        let entity = MessageEntity {
            kind: EntityKind::Url,
            offset: 3,
            length: 40,
            url: None,
        };
        assert_eq!(entity.covered_text("short"), None);
    }

    #[test]
    fn test_deserialize_message() {
        let json = r#"{
            "message_id": 42,
            "text": "Intro to Acme",
            "entities": [{"type": "text_link", "offset": 9, "length": 4, "url": "https://docsend.com/view/xyz"},
                         {"type": "bold", "offset": 0, "length": 5}],
            "document": {"file_name": "Acme Deck.PDF", "source": {"url": "https://files.example/acme"}}
        }"#;
        let message: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.message_id, Some(42));
        assert_eq!(message.entities[0].kind, EntityKind::TextLink);
        assert_eq!(message.entities[1].kind, EntityKind::Other);
        assert!(message.document.unwrap().is_pdf());
    }
}
