//! Output resolution allow-list and validation.
//!
//! The backend only supports a handful of (height, width) pairs. Pairs are
//! order-sensitive: `512x768` (portrait) and `768x512` (landscape) are
//! distinct entries.

use std::fmt;

/* --------------------------------------------------------------------------
Named constants
-------------------------------------------------------------------------- */

/// Square output.
pub const RESOLUTION_SQUARE: (u32, u32) = (512, 512);

/// Portrait output (taller than wide).
pub const RESOLUTION_PORTRAIT: (u32, u32) = (512, 768);

/// Landscape output (wider than tall).
pub const RESOLUTION_LANDSCAPE: (u32, u32) = (768, 512);

/// Supported `(height, width)` pairs, in display order.
pub const ALLOWED_RESOLUTIONS: &[(u32, u32)] =
    &[RESOLUTION_SQUARE, RESOLUTION_PORTRAIT, RESOLUTION_LANDSCAPE];

/* --------------------------------------------------------------------------
Error
-------------------------------------------------------------------------- */

/// A requested `(height, width)` pair is not in [`ALLOWED_RESOLUTIONS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    pub height: u32,
    pub width: u32,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unsupported resolution {}x{}. Allowed: {}",
            self.height,
            self.width,
            allowed_resolution_labels().join(", ")
        )
    }
}

impl std::error::Error for ResolutionError {}

/* --------------------------------------------------------------------------
Validation functions
-------------------------------------------------------------------------- */

/// Validate that `(height, width)` is one of the allowed pairs.
pub fn validate_resolution(height: u32, width: u32) -> Result<(), ResolutionError> {
    if ALLOWED_RESOLUTIONS.contains(&(height, width)) {
        Ok(())
    } else {
        Err(ResolutionError { height, width })
    }
}

/// `HxW` labels for every allowed pair, in allow-list order.
pub fn allowed_resolution_labels() -> Vec<String> {
    ALLOWED_RESOLUTIONS
        .iter()
        .map(|(h, w)| format!("{h}x{w}"))
        .collect()
}

/// Parse a `HxW` (or `H x W`) label and validate it against the allow-list.
pub fn parse_resolution(label: &str) -> Result<(u32, u32), crate::error::CoreError> {
    let malformed = || {
        crate::error::CoreError::Validation(format!(
            "Malformed resolution '{label}'. Expected HEIGHTxWIDTH, e.g. 512x768"
        ))
    };

    let (h, w) = label
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(h, w)| (h.trim().to_string(), w.trim().to_string()))
        .ok_or_else(malformed)?;
    let height: u32 = h.parse().map_err(|_| malformed())?;
    let width: u32 = w.parse().map_err(|_| malformed())?;

    validate_resolution(height, width)?;
    Ok((height, width))
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::error::CoreError;

    // -- validate_resolution --

    #[test]
    fn allowed_resolutions_accepted() {
        assert!(validate_resolution(512, 512).is_ok());
        assert!(validate_resolution(512, 768).is_ok());
        assert!(validate_resolution(768, 512).is_ok());
    }

    #[test]
    fn unknown_resolution_rejected() {
        let err = validate_resolution(500, 500).unwrap_err();
        assert_eq!(err, ResolutionError { height: 500, width: 500 });
    }

    #[test]
    fn square_large_resolution_rejected() {
        assert!(validate_resolution(768, 768).is_err());
    }

    #[test]
    fn error_message_lists_allowed_set() {
        let msg = validate_resolution(1024, 1024).unwrap_err().to_string();
        assert!(msg.contains("Unsupported resolution 1024x1024"));
        assert!(msg.contains("512x512, 512x768, 768x512"));
    }

    // -- parse_resolution --

    #[test]
    fn parse_accepts_compact_and_spaced_labels() {
        assert_eq!(parse_resolution("512x768").unwrap(), (512, 768));
        assert_eq!(parse_resolution("768 x 512").unwrap(), (768, 512));
        assert_eq!(parse_resolution("512X512").unwrap(), (512, 512));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_matches!(parse_resolution("big"), Err(CoreError::Validation(_)));
        assert_matches!(parse_resolution("512x"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn parse_rejects_unsupported_pair() {
        assert_matches!(parse_resolution("500x500"), Err(CoreError::Resolution(_)));
    }

    #[test]
    fn labels_follow_allow_list_order() {
        assert_eq!(
            allowed_resolution_labels(),
            vec!["512x512", "512x768", "768x512"]
        );
    }
}
