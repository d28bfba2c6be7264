//! Result type definition and extension traits.

use crate::error::Error;

/// The standard Result type for attribute operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for attribute Results.
pub trait ResultExt<T> {
    /// Re-root any error under the given block name.
    ///
    /// # Errors
    ///
    /// Returns the original error with its path prefixed by `block.0.`.
    fn within(self, block: &str) -> Result<T>;

    /// Convert to an Option, logging the error if present.
    fn into_option_logged(self) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn within(self, block: &str) -> Result<T> {
        self.map_err(|e| e.nested(block))
    }

    fn into_option_logged(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = e.path(), "Attribute ignored: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_reroots_error() {
        let result: Result<()> = Err(Error::missing("username"));
        let err = result.within("credentials").err();
        assert_eq!(err.map(|e| e.path().to_string()), Some("credentials.0.username".to_string()));
    }

    #[test]
    fn test_into_option_logged() {
        let ok: Result<u8> = Ok(3);
        assert_eq!(ok.into_option_logged(), Some(3));

        let err: Result<u8> = Err(Error::missing("x"));
        assert_eq!(err.into_option_logged(), None);
    }
}
