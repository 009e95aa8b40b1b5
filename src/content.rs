// 📄 Content Fetcher/Decoder - three transports, one BinaryContent
//
// (a) raw       → response body is the document
// (b) json      → base64 string under document.content (or content / document)
// (c) graphql   → base64 string under data.<operation>.content
//
// Validation after decoding:
// - empty                                 → EmptyDocument
// - small AND not a document media type   → UnexpectedContentType
//   (both conditions; genuinely small PDFs pass, a small body with no
//   recognisable type does not)

use crate::error::{AdapterError, AdapterResult};
use crate::fields;
use crate::http::{graphql_data, HttpResponse};
use crate::model::BinaryContent;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde_json::Value;

pub const PDF: &str = "application/pdf";
const OCTET_STREAM: &str = "application/octet-stream";
const HTML: &str = "text/html";
const JSON: &str = "application/json";
const UNDECLARED: &str = "undeclared";

const DOCUMENT_TYPES: &[&str] = &[
    PDF,
    "application/x-pdf",
    OCTET_STREAM,
    "binary/octet-stream",
    "application/force-download",
];

// ============================================================================
// DECODED DOCUMENT
// ============================================================================

/// Bytes plus whatever media type the bank declared, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDocument {
    pub bytes: Bytes,
    pub declared_type: Option<String>,
}

/// (a) Pass the body through.
pub fn from_raw(response: HttpResponse) -> DecodedDocument {
    DecodedDocument {
        declared_type: response.content_type(),
        bytes: response.body,
    }
}

/// (b) Base64 field inside a JSON body.
///
/// Looks at `document.content`, then `content`, then `document`, and picks up
/// a declared type from `contentType` / `mimeType` next to the content.
pub fn from_json_field(body: &Value, context: &str) -> AdapterResult<DecodedDocument> {
    let (holder, encoded) = if let Some(doc) = body.get("document").filter(|d| d.is_object()) {
        (doc, fields::str_field(doc, &["content", "data"]))
    } else {
        (body, fields::str_field(body, &["content", "document"]))
    };

    let encoded = encoded.ok_or_else(|| AdapterError::missing_field(context, "document.content"))?;
    Ok(DecodedDocument {
        bytes: decode_base64(&encoded, context)?,
        declared_type: fields::str_field(holder, &["contentType", "mimeType", "content_type"]),
    })
}

/// (c) Base64 field inside a GraphQL response: `data.<operation>.content`.
pub fn from_graphql_field(
    body: &Value,
    operation: &str,
    context: &str,
) -> AdapterResult<DecodedDocument> {
    let data = graphql_data(body, context)?;
    let node = data
        .get(operation)
        .filter(|n| n.is_object())
        .ok_or_else(|| AdapterError::missing_field(context, &format!("data.{}", operation)))?;
    let encoded = fields::str_field(node, &["content"])
        .ok_or_else(|| {
            AdapterError::missing_field(context, &format!("data.{}.content", operation))
        })?;

    Ok(DecodedDocument {
        bytes: decode_base64(&encoded, context)?,
        declared_type: fields::str_field(node, &["contentType", "mimeType"]),
    })
}

/// Standard base64, tolerating whitespace and a `data:<type>;base64,` prefix.
pub fn decode_base64(encoded: &str, context: &str) -> AdapterResult<Bytes> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map(Bytes::from)
        .map_err(|e| AdapterError::malformed(context, format!("invalid base64 content: {}", e)))
}

// ============================================================================
// VALIDATION
// ============================================================================

pub fn is_document_type(mime: &str) -> bool {
    DOCUMENT_TYPES.iter().any(|t| t.eq_ignore_ascii_case(mime.trim()))
}

/// Media type from the leading bytes, when recognisable.
///
/// Markup and JSON are sniffed so login pages and error bodies never pass
/// as documents on the strength of a missing or generic declared type.
pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        return Some(PDF);
    }
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'<') => Some(HTML),
        Some(b'{') | Some(b'[') => Some(JSON),
        _ => None,
    }
}

/// Per-bank plausibility threshold for downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentPolicy {
    pub min_document_bytes: usize,
}

impl ContentPolicy {
    pub fn new(min_document_bytes: usize) -> Self {
        ContentPolicy { min_document_bytes }
    }

    pub fn validate(
        &self,
        statement_id: &str,
        document: DecodedDocument,
    ) -> AdapterResult<BinaryContent> {
        if document.bytes.is_empty() {
            return Err(AdapterError::EmptyDocument(statement_id.to_string()));
        }

        let mime = sniff(&document.bytes)
            .map(str::to_string)
            .or(document.declared_type);

        // A small body must prove it is a document; no type at all is not proof.
        if document.bytes.len() < self.min_document_bytes
            && !mime.as_deref().map(is_document_type).unwrap_or(false)
        {
            return Err(AdapterError::UnexpectedContentType {
                content_type: mime.unwrap_or_else(|| UNDECLARED.to_string()),
                size: document.bytes.len(),
            });
        }

        let mime = mime.unwrap_or_else(|| OCTET_STREAM.to_string());
        Ok(BinaryContent::new(document.bytes, mime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIXED: &[u8] = b"%PDF-1.4 fixed statement bytes";

    fn encoded() -> String {
        STANDARD.encode(FIXED)
    }

    #[test]
    fn test_json_and_graphql_strategies_agree() {
        let json_body = json!({
            "document": { "content": encoded(), "contentType": "application/pdf" }
        });
        let graphql_body = json!({ "data": { "statementDocument": { "content": encoded() } } });

        let policy = ContentPolicy::new(1024);
        let from_json = policy
            .validate("s1", from_json_field(&json_body, "download").unwrap())
            .unwrap();
        let from_graphql = policy
            .validate(
                "s1",
                from_graphql_field(&graphql_body, "statementDocument", "download").unwrap(),
            )
            .unwrap();

        assert_eq!(from_json.bytes(), from_graphql.bytes());
        assert_eq!(from_json.bytes().as_ref(), FIXED);
        assert_eq!(from_json, from_graphql);
    }

    #[test]
    fn test_json_field_variants() {
        let flat = json!({ "content": encoded() });
        assert_eq!(from_json_field(&flat, "d").unwrap().bytes.as_ref(), FIXED);

        let data_url = json!({ "document": format!("data:application/pdf;base64,{}", encoded()) });
        assert_eq!(from_json_field(&data_url, "d").unwrap().bytes.as_ref(), FIXED);

        let err = from_json_field(&json!({ "document": {} }), "d").unwrap_err();
        assert!(err.to_string().contains("document.content"));
    }

    #[test]
    fn test_graphql_missing_content() {
        let body = json!({ "data": { "statementDocument": null } });
        let err = from_graphql_field(&body, "statementDocument", "d").unwrap_err();
        assert!(matches!(err, AdapterError::Upstream { .. }));
    }

    #[test]
    fn test_invalid_base64() {
        let err = decode_base64("***", "download").unwrap_err();
        assert!(err.to_string().contains("invalid base64"));
    }

    #[test]
    fn test_raw_passthrough_keeps_declared_type() {
        let response = HttpResponse::new(200, FIXED.to_vec())
            .with_header("Content-Type", "application/pdf;charset=UTF-8");
        let doc = from_raw(response);
        assert_eq!(doc.declared_type.as_deref(), Some("application/pdf"));
        assert_eq!(doc.bytes.as_ref(), FIXED);
    }

    #[test]
    fn test_empty_is_rejected() {
        let doc = DecodedDocument {
            bytes: Bytes::new(),
            declared_type: Some(PDF.to_string()),
        };
        let err = ContentPolicy::new(10).validate("s9", doc).unwrap_err();
        assert!(matches!(err, AdapterError::EmptyDocument(id) if id == "s9"));
    }

    #[test]
    fn test_small_and_wrong_type_is_rejected() {
        let doc = DecodedDocument {
            bytes: Bytes::from_static(b"<html>login</html>"),
            declared_type: Some("text/html".to_string()),
        };
        let err = ContentPolicy::new(1024).validate("s1", doc).unwrap_err();
        match err {
            AdapterError::UnexpectedContentType { content_type, size } => {
                assert_eq!(content_type, "text/html");
                assert_eq!(size, 18);
            }
            other => panic!("expected UnexpectedContentType, got {:?}", other),
        }
    }

    #[test]
    fn test_small_real_document_is_accepted() {
        let doc = DecodedDocument {
            bytes: Bytes::from_static(b"tiny"),
            declared_type: Some(PDF.to_string()),
        };
        assert!(ContentPolicy::new(1024).validate("s1", doc).is_ok());
    }

    #[test]
    fn test_large_wrong_type_is_accepted() {
        let doc = DecodedDocument {
            bytes: Bytes::from(vec![b'x'; 4096]),
            declared_type: Some("text/plain".to_string()),
        };
        let content = ContentPolicy::new(1024).validate("s1", doc).unwrap();
        assert_eq!(content.mime_type(), "text/plain");
    }

    #[test]
    fn test_sniffed_pdf_overrides_declared_type() {
        let doc = DecodedDocument {
            bytes: Bytes::from_static(b"%PDF-1.7"),
            declared_type: Some("text/html".to_string()),
        };
        let content = ContentPolicy::new(1024).validate("s1", doc).unwrap();
        assert_eq!(content.mime_type(), PDF);
    }

    #[test]
    fn test_small_undeclared_json_body_is_rejected() {
        let doc = DecodedDocument {
            bytes: Bytes::from_static(b"{\"error\":\"x\"}"),
            declared_type: None,
        };
        let err = ContentPolicy::new(1024).validate("s1", doc).unwrap_err();
        match err {
            AdapterError::UnexpectedContentType { content_type, size } => {
                assert_eq!(content_type, "application/json");
                assert_eq!(size, 13);
            }
            other => panic!("expected UnexpectedContentType, got {:?}", other),
        }
    }

    #[test]
    fn test_small_body_without_any_type_is_rejected() {
        let doc = DecodedDocument {
            bytes: Bytes::from_static(b"\x00\x01opaque"),
            declared_type: None,
        };
        let err = ContentPolicy::new(1024).validate("s1", doc).unwrap_err();
        match err {
            AdapterError::UnexpectedContentType { content_type, size } => {
                assert_eq!(content_type, "undeclared");
                assert!(size < 1024);
            }
            other => panic!("expected UnexpectedContentType, got {:?}", other),
        }
    }

    #[test]
    fn test_markup_behind_generic_type_is_rejected() {
        let doc = DecodedDocument {
            bytes: Bytes::from_static(b"  <!DOCTYPE html><p>sign in</p>"),
            declared_type: Some(OCTET_STREAM.to_string()),
        };
        let err = ContentPolicy::new(1024).validate("s1", doc).unwrap_err();
        match err {
            AdapterError::UnexpectedContentType { content_type, size } => {
                assert_eq!(content_type, "text/html");
                assert!(size < 1024);
            }
            other => panic!("expected UnexpectedContentType, got {:?}", other),
        }
    }

    #[test]
    fn test_large_undeclared_body_falls_back_to_octet_stream() {
        let doc = DecodedDocument {
            bytes: Bytes::from(vec![0x42; 4096]),
            declared_type: None,
        };
        let content = ContentPolicy::new(1024).validate("s1", doc).unwrap();
        assert_eq!(content.mime_type(), OCTET_STREAM);
    }
}
