use crate::resolver::UnresolvedTypes;
use dm_engine::archive::ArchiveError;
use std::fmt;

/// Why a guarded operation did not complete.
#[derive(Debug)]
pub enum OperationError {
    /// Another new/save/load holds the guard.
    Busy,
    /// The user backed out at a prompt or file picker. Not reported as an error.
    Cancelled,
    NoRecentProject,
    Archive(ArchiveError),
    Unresolved(UnresolvedTypes),
    Io(anyhow::Error),
}

impl OperationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationError::Cancelled)
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationError::Busy => write!(f, "another save or load is already in progress"),
            OperationError::Cancelled => write!(f, "operation cancelled"),
            OperationError::NoRecentProject => write!(f, "there is no recent project to reopen"),
            OperationError::Archive(err) => write!(f, "{err}"),
            OperationError::Unresolved(err) => write!(f, "{err}"),
            OperationError::Io(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OperationError::Archive(err) => Some(err),
            OperationError::Unresolved(err) => Some(err),
            OperationError::Io(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<ArchiveError> for OperationError {
    fn from(err: ArchiveError) -> Self {
        OperationError::Archive(err)
    }
}

impl From<UnresolvedTypes> for OperationError {
    fn from(err: UnresolvedTypes) -> Self {
        OperationError::Unresolved(err)
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(err: anyhow::Error) -> Self {
        OperationError::Io(err)
    }
}
