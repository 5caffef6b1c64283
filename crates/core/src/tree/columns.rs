#![forbid(unsafe_code)]

/// Names of the structural columns plus the scope columns that partition the
/// table into independent forests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeColumns {
    pub parent: String,
    pub left: String,
    pub right: String,
    pub depth: String,
    /// Explicit ordering column; falls back to the left bound when unset.
    pub order: Option<String>,
    pub scope: Vec<String>,
}

impl Default for TreeColumns {
    fn default() -> Self {
        Self {
            parent: "parent_id".to_string(),
            left: "lft".to_string(),
            right: "rgt".to_string(),
            depth: "depth".to_string(),
            order: None,
            scope: Vec::new(),
        }
    }
}

impl TreeColumns {
    pub fn order_column(&self) -> &str {
        self.order.as_deref().unwrap_or(&self.left)
    }

    pub fn is_scoped(&self) -> bool {
        !self.scope.is_empty()
    }

    /// Table-qualified form, e.g. `"nodes"."lft"`.
    pub fn qualified(&self, table: &str, column: &str) -> String {
        format!("{}.{}", quote_ident(table), quote_ident(column))
    }

    pub fn structural(&self) -> [&str; 4] {
        [
            self.parent.as_str(),
            self.left.as_str(),
            self.right.as_str(),
            self.depth.as_str(),
        ]
    }

    pub fn validate(&self) -> Result<(), ColumnError> {
        let mut names: Vec<&str> = self.structural().to_vec();
        if let Some(order) = self.order.as_deref() {
            names.push(order);
        }
        names.extend(self.scope.iter().map(String::as_str));
        for (index, name) in names.iter().enumerate() {
            validate_column_name(name)?;
            if names[..index].contains(name) {
                return Err(ColumnError::Duplicate {
                    name: (*name).to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnError {
    Empty,
    TooLong,
    InvalidFirstChar,
    InvalidChar { ch: char, index: usize },
    Duplicate { name: String },
}

impl std::fmt::Display for ColumnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "column name must not be empty"),
            Self::TooLong => write!(f, "column name exceeds 64 chars"),
            Self::InvalidFirstChar => {
                write!(f, "column name must start with a letter or underscore")
            }
            Self::InvalidChar { ch, index } => {
                write!(f, "invalid char {ch:?} at index {index} in column name")
            }
            Self::Duplicate { name } => write!(f, "duplicate column name: {name}"),
        }
    }
}

impl std::error::Error for ColumnError {}

pub fn validate_column_name(value: &str) -> Result<(), ColumnError> {
    if value.is_empty() {
        return Err(ColumnError::Empty);
    }
    if value.len() > 64 {
        return Err(ColumnError::TooLong);
    }
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Err(ColumnError::Empty);
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(ColumnError::InvalidFirstChar);
    }
    for (index, ch) in value.chars().enumerate() {
        if index == 0 {
            continue;
        }
        if ch.is_ascii_alphanumeric() || ch == '_' {
            continue;
        }
        return Err(ColumnError::InvalidChar { ch, index });
    }
    Ok(())
}

/// Quote an identifier for embedding in raw SQL fragments.
pub fn quote_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for ch in name.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}
