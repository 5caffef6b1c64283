#![forbid(unsafe_code)]

/// Where a moved subtree lands relative to its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MovePosition {
    /// Append under the target as its last child.
    Child,
    /// Immediately before the target, as its sibling.
    Left,
    /// Immediately after the target's subtree, as its sibling.
    Right,
    /// Detach to top level of the scope.
    Root,
}

impl MovePosition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Child => "child",
            Self::Left => "left",
            Self::Right => "right",
            Self::Root => "root",
        }
    }
}
