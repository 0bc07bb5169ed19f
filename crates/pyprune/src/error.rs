use std::fmt;

use crate::{parse::ParseError, scope::ValidationError};

/// Error returned by the optimizer entry points.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizeError {
    /// The source could not be lowered into a tree.
    Parse(ParseError),
    /// The tree was rejected before optimization started.
    Validation(ValidationError),
    /// The passes were still changing the tree when the round ceiling was reached.
    ///
    /// This is an internal invariant violation, not a property of the input program.
    NoFixpoint { rounds: u32 },
}

impl fmt::Display for OptimizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NoFixpoint { rounds } => {
                write!(f, "internal error: no fixpoint reached after {rounds} rounds")
            }
        }
    }
}

impl std::error::Error for OptimizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::NoFixpoint { .. } => None,
        }
    }
}

impl From<ParseError> for OptimizeError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<ValidationError> for OptimizeError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}
