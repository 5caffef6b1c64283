#![forbid(unsafe_code)]

use nestree_core::tree::{ColumnError, MoveError, TreeDefect};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    MoveNotPossible(MoveError),
    InvariantViolation(TreeDefect),
    InvalidColumn(ColumnError),
    InvalidInput(&'static str),
    NotFound {
        entity: &'static str,
        id: String,
    },
    AlreadyExists {
        entity: &'static str,
        id: String,
    },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) | Self::Sql(_) => "INTERNAL",
            Self::MoveNotPossible(_) => "MOVE_NOT_POSSIBLE",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
            Self::InvalidColumn(_) => "INVALID_COLUMN",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::MoveNotPossible(err) => write!(f, "move not possible: {err}"),
            Self::InvariantViolation(defect) => {
                write!(f, "nested set invariant {}: {}", defect.code, defect.message)
            }
            Self::InvalidColumn(err) => write!(f, "invalid column: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::AlreadyExists { entity, id } => write!(f, "{entity} already exists: {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<MoveError> for StoreError {
    fn from(value: MoveError) -> Self {
        Self::MoveNotPossible(value)
    }
}

impl From<ColumnError> for StoreError {
    fn from(value: ColumnError) -> Self {
        Self::InvalidColumn(value)
    }
}
