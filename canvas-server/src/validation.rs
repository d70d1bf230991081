//! Input validation for untrusted data.
//!
//! Everything arriving over HTTP or the relay socket is checked here before
//! it reaches the store or is fanned out to other clients.

use canvas_core::{Element, ElementKind};
use thiserror::Error;

/// Maximum length for file IDs (room keys).
pub const MAX_FILE_ID_LEN: usize = 128;
/// Maximum length for element IDs.
pub const MAX_ELEMENT_ID_LEN: usize = 128;
/// Maximum length for file and folder names.
pub const MAX_FILE_NAME_LEN: usize = 255;
/// Maximum text or source length in a single element.
pub const MAX_TEXT_CONTENT_LEN: usize = 1_048_576; // 1MB
/// Maximum elements per canvas.
pub const MAX_ELEMENTS_PER_CANVAS: usize = 10_000;
/// Maximum relay message size.
pub const MAX_WS_MESSAGE_SIZE: usize = 1_048_576; // 1MB

/// Validation error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// File ID exceeds maximum length.
    #[error("file_id too long (max {MAX_FILE_ID_LEN} chars)")]
    FileIdTooLong,
    /// File ID is empty or contains invalid characters.
    #[error("file_id contains invalid characters")]
    FileIdInvalidChars,
    /// Element ID exceeds maximum length.
    #[error("element_id too long (max {MAX_ELEMENT_ID_LEN} chars)")]
    ElementIdTooLong,
    /// Element ID is empty or contains invalid characters.
    #[error("element_id contains invalid characters")]
    ElementIdInvalidChars,
    /// File name is empty.
    #[error("name must not be empty")]
    FileNameEmpty,
    /// File name exceeds maximum length.
    #[error("name too long (max {MAX_FILE_NAME_LEN} chars)")]
    FileNameTooLong,
    /// Text content exceeds maximum length.
    #[error("text content too long (max {MAX_TEXT_CONTENT_LEN} bytes)")]
    TextContentTooLong,
    /// Too many elements in canvas.
    #[error("too many elements (max {MAX_ELEMENTS_PER_CANVAS})")]
    TooManyElements,
    /// Relay message exceeds maximum size.
    #[error("message too large (max {MAX_WS_MESSAGE_SIZE} bytes)")]
    MessageTooLarge,
}

impl ValidationError {
    /// Short label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::FileIdTooLong | Self::FileIdInvalidChars => "file_id",
            Self::ElementIdTooLong | Self::ElementIdInvalidChars => "element_id",
            Self::FileNameEmpty | Self::FileNameTooLong => "file_name",
            Self::TextContentTooLong => "text_content",
            Self::TooManyElements => "element_count",
            Self::MessageTooLarge => "message_size",
        }
    }
}

/// Check if a character is valid for IDs (alphanumeric, hyphen, or underscore).
fn is_valid_id_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// Validate a file ID.
///
/// Valid file IDs are 1-128 characters of alphanumerics, hyphens and
/// underscores (UUIDs are valid).
///
/// # Errors
///
/// Returns [`ValidationError::FileIdTooLong`] or
/// [`ValidationError::FileIdInvalidChars`].
pub fn validate_file_id(id: &str) -> Result<(), ValidationError> {
    if id.len() > MAX_FILE_ID_LEN {
        return Err(ValidationError::FileIdTooLong);
    }
    if id.is_empty() || !id.chars().all(is_valid_id_char) {
        return Err(ValidationError::FileIdInvalidChars);
    }
    Ok(())
}

/// Validate an element ID.
///
/// # Errors
///
/// Returns [`ValidationError::ElementIdTooLong`] or
/// [`ValidationError::ElementIdInvalidChars`].
pub fn validate_element_id(id: &str) -> Result<(), ValidationError> {
    if id.len() > MAX_ELEMENT_ID_LEN {
        return Err(ValidationError::ElementIdTooLong);
    }
    if id.is_empty() || !id.chars().all(is_valid_id_char) {
        return Err(ValidationError::ElementIdInvalidChars);
    }
    Ok(())
}

/// Validate a file or folder name.
///
/// # Errors
///
/// Returns [`ValidationError::FileNameEmpty`] for blank names and
/// [`ValidationError::FileNameTooLong`] past 255 characters.
pub fn validate_file_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::FileNameEmpty);
    }
    if name.chars().count() > MAX_FILE_NAME_LEN {
        return Err(ValidationError::FileNameTooLong);
    }
    Ok(())
}

/// Validate text content length.
///
/// # Errors
///
/// Returns [`ValidationError::TextContentTooLong`] if the text exceeds 1MB.
pub fn validate_text_content(text: &str) -> Result<(), ValidationError> {
    if text.len() > MAX_TEXT_CONTENT_LEN {
        return Err(ValidationError::TextContentTooLong);
    }
    Ok(())
}

/// Validate a single element: its ID and any text payload.
///
/// # Errors
///
/// Returns the first failing check.
pub fn validate_element(element: &Element) -> Result<(), ValidationError> {
    validate_element_id(element.id.as_str())?;
    match &element.kind {
        ElementKind::Text { text, .. } => validate_text_content(text),
        ElementKind::Code { code, output, .. } => {
            validate_text_content(code)?;
            validate_text_content(output)
        }
        _ => Ok(()),
    }
}

/// Validate a whole element list.
///
/// # Errors
///
/// Returns [`ValidationError::TooManyElements`] or the first element failure.
pub fn validate_elements(elements: &[Element]) -> Result<(), ValidationError> {
    if elements.len() > MAX_ELEMENTS_PER_CANVAS {
        return Err(ValidationError::TooManyElements);
    }
    elements.iter().try_for_each(validate_element)
}

/// Validate relay message size.
///
/// # Errors
///
/// Returns [`ValidationError::MessageTooLarge`] if the message exceeds 1MB.
pub fn validate_message_size(size: usize) -> Result<(), ValidationError> {
    if size > MAX_WS_MESSAGE_SIZE {
        return Err(ValidationError::MessageTooLarge);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_file_ids() {
        assert!(validate_file_id("default").is_ok());
        assert!(validate_file_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_file_id("file_123").is_ok());
    }

    #[test]
    fn test_invalid_file_ids() {
        assert!(validate_file_id("").is_err());
        assert!(validate_file_id("has spaces").is_err());
        assert!(validate_file_id("../../../etc/passwd").is_err());
        assert!(validate_file_id("path\\traversal").is_err());
        assert!(validate_file_id("contains<script>").is_err());
    }

    #[test]
    fn test_file_id_boundary() {
        assert!(validate_file_id(&"x".repeat(MAX_FILE_ID_LEN)).is_ok());
        assert_eq!(
            validate_file_id(&"x".repeat(MAX_FILE_ID_LEN + 1)),
            Err(ValidationError::FileIdTooLong)
        );
    }

    #[test]
    fn test_element_ids() {
        assert!(validate_element_id("code-1700000000000").is_ok());
        assert!(validate_element_id("el-1700000000000-3").is_ok());
        assert!(validate_element_id("").is_err());
        assert!(validate_element_id("a b").is_err());
    }

    #[test]
    fn test_file_names() {
        assert!(validate_file_name("notes.md").is_ok());
        assert!(validate_file_name("My Project").is_ok());
        assert_eq!(validate_file_name("   "), Err(ValidationError::FileNameEmpty));
        assert_eq!(
            validate_file_name(&"n".repeat(MAX_FILE_NAME_LEN + 1)),
            Err(ValidationError::FileNameTooLong)
        );
    }

    #[test]
    fn test_code_element_content_is_checked() {
        let element = Element::new(ElementKind::Code {
            code: "x".repeat(MAX_TEXT_CONTENT_LEN + 1),
            language: "python".into(),
            output: String::new(),
        })
        .with_id("code-1");
        assert_eq!(
            validate_element(&element),
            Err(ValidationError::TextContentTooLong)
        );
    }

    #[test]
    fn test_message_size() {
        assert!(validate_message_size(1000).is_ok());
        assert!(validate_message_size(MAX_WS_MESSAGE_SIZE).is_ok());
        assert!(validate_message_size(MAX_WS_MESSAGE_SIZE + 1).is_err());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ValidationError::MessageTooLarge.kind(), "message_size");
        assert_eq!(ValidationError::FileIdInvalidChars.kind(), "file_id");
        assert!(ValidationError::MessageTooLarge
            .to_string()
            .contains("1048576"));
    }
}
