use encoding_rs::{Encoding, UTF_8};
use thiserror::Error;
use tracing::debug;

/// Why a document could not be turned into text
#[derive(Error, Debug, PartialEq)]
pub enum ExtractionError {
    #[error("Unsupported document format: {0}")]
    Unsupported(String),

    #[error("Document is empty")]
    Empty,

    #[error("Failed to decode document: {0}")]
    Decode(String),
}

/// Turns uploaded bytes into plain text for the document-analysis path
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], extension: &str) -> Result<String, ExtractionError>;

    fn supports(&self, extension: &str) -> bool;
}

/// Text-based formats only. Binary office/PDF formats report `Unsupported`.
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    const SUPPORTED: [&'static str; 4] = ["txt", "csv", "json", "md"];

    pub fn new() -> Self {
        Self
    }

    /// Decode with BOM sniffing, lossy UTF-8 otherwise
    fn decode_text(bytes: &[u8]) -> (String, &'static Encoding) {
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
            return (text.into_owned(), encoding);
        }

        if let Ok(text) = std::str::from_utf8(bytes) {
            return (text.to_string(), UTF_8);
        }

        let (text, _, _) = UTF_8.decode(bytes);
        (text.into_owned(), UTF_8)
    }

    fn pretty_json(text: &str) -> String {
        serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|value| serde_json::to_string_pretty(&value).ok())
            .unwrap_or_else(|| text.to_string())
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], extension: &str) -> Result<String, ExtractionError> {
        let extension = extension.trim_start_matches('.').to_lowercase();
        if !self.supports(&extension) {
            return Err(ExtractionError::Unsupported(extension));
        }

        let (text, encoding) = Self::decode_text(bytes);
        debug!(
            "Extracted {} characters from .{} document (encoding: {})",
            text.chars().count(),
            extension,
            encoding.name()
        );

        let text = match extension.as_str() {
            "json" => Self::pretty_json(&text),
            _ => text,
        };

        if text.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(text)
    }

    fn supports(&self, extension: &str) -> bool {
        Self::SUPPORTED.contains(&extension.to_lowercase().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let extractor = PlainTextExtractor::new();
        assert_eq!(extractor.extract(b"hello world", "txt").unwrap(), "hello world");
        assert_eq!(extractor.extract(b"a,b\n1,2", ".CSV").unwrap(), "a,b\n1,2");
    }

    #[test]
    fn test_multibyte_text_keeps_every_character() {
        let extractor = PlainTextExtractor::new();
        let text = extractor.extract("héllo wörld".as_bytes(), "md").unwrap();
        assert_eq!(text, "héllo wörld");
        assert_eq!(text.chars().count(), 11);
        assert_eq!(text.len(), 13);
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let extractor = PlainTextExtractor::new();
        let bytes = [0xEF, 0xBB, 0xBF, b'h', b'i'];
        assert_eq!(extractor.extract(&bytes, "txt").unwrap(), "hi");
    }

    #[test]
    fn test_utf16_bom_decoded() {
        let extractor = PlainTextExtractor::new();
        let bytes = [0xFF, 0xFE, b'o', 0x00, b'k', 0x00];
        assert_eq!(extractor.extract(&bytes, "txt").unwrap(), "ok");
    }

    #[test]
    fn test_json_is_pretty_printed() {
        let extractor = PlainTextExtractor::new();
        let text = extractor.extract(br#"{"a":1}"#, "json").unwrap();
        assert_eq!(text, "{\n  \"a\": 1\n}");

        // Invalid JSON passes through untouched
        assert_eq!(extractor.extract(b"{oops", "json").unwrap(), "{oops");
    }

    #[test]
    fn test_unsupported_and_empty() {
        let extractor = PlainTextExtractor::new();
        assert_eq!(
            extractor.extract(b"%PDF-1.7", "pdf"),
            Err(ExtractionError::Unsupported("pdf".to_string()))
        );
        assert_eq!(extractor.extract(b"   \n", "txt"), Err(ExtractionError::Empty));
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let extractor = PlainTextExtractor::new();
        let text = extractor.extract(&[b'a', 0xFF, b'b'], "txt").unwrap();
        assert!(text.starts_with('a') && text.ends_with('b'));
    }
}
