//! Shared plumbing for quire.
//!
//! Holds the wire model of the remote document service, the contracts of the
//! collaborators the compiler talks to (document service, diagram renderer,
//! rasterizer, asset store) along with their HTTP implementations, and the
//! configuration and telemetry setup used by the binary.

pub mod assets;
pub mod config;
pub mod docs;
pub mod error;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use crate::config::{Config, ExportOptions, TableStrategy};
pub use crate::docs::{DocumentId, DocumentService};
pub use crate::error::{ConfigError, ServiceError};

/// Length of `text` in the document service's index unit (UTF-16 code units).
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_len_counts_code_units() {
        assert_eq!(utf16_len(""), 0);
        assert_eq!(utf16_len("Title"), 5);
        assert_eq!(utf16_len("café"), 4);
        // Astral plane characters take a surrogate pair.
        assert_eq!(utf16_len("🎉"), 2);
    }
}
