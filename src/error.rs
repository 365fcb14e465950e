//! Error types for hhir

use std::fmt;
use thiserror::Error;

/// Lowering site that gave up on a construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// Source file of the lowering code
    pub file: &'static str,
    /// Line number (1-indexed)
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Main error type for hhir
#[derive(Error, Debug)]
pub enum Error {
    /// A construct this pass does not lower. The translator catches this and
    /// falls back to interpreting the construct.
    #[error("Unsupported: {construct} (punted at {location})")]
    Unsupported {
        construct: &'static str,
        location: SourceLocation,
    },

    /// Configuration could not be parsed
    #[error("ConfigError: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Create an unsupported-construct error
    pub fn unsupported(construct: &'static str, location: SourceLocation) -> Self {
        Error::Unsupported { construct, location }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }
}

/// Result type alias for hhir
pub type Result<T> = std::result::Result<T, Error>;

/// Returns `Err(Error::Unsupported)` for `construct`, recording the call site.
#[macro_export]
macro_rules! punt {
    ($construct:ident) => {
        return Err($crate::Error::unsupported(
            stringify!($construct),
            $crate::SourceLocation::new(file!(), line!()),
        ))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower_def_cls() -> Result<()> {
        punt!(DefCls);
    }

    #[test]
    fn test_punt_records_site() {
        let err = lower_def_cls().unwrap_err();
        assert!(err.is_unsupported());
        let Error::Unsupported { construct, location } = &err else {
            unreachable!();
        };
        assert_eq!(*construct, "DefCls");
        assert!(location.file.ends_with("error.rs"));
        assert!(err.to_string().starts_with("Unsupported: DefCls (punted at "));
    }

    #[test]
    fn test_config_error_from_json() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.to_string().starts_with("ConfigError: "));
        assert!(!err.is_unsupported());
    }
}
