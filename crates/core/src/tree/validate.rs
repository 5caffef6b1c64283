#![forbid(unsafe_code)]

use std::collections::HashMap;

use super::node::TreeNode;

/// One violated nested-set invariant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeDefect {
    pub code: &'static str,
    pub message: String,
    /// Primary key of the offending row; empty for set-level defects.
    pub id: String,
}

/// Outcome of auditing one scope partition.
#[derive(Clone, Debug)]
pub struct TreeAudit {
    pub ok: bool,
    pub nodes: usize,
    pub defects: Vec<TreeDefect>,
}

/// Audit one scope partition against the nested-set invariants. `rows` must
/// be the complete partition; order does not matter.
pub fn audit_nested_set(rows: &[TreeNode]) -> TreeAudit {
    let mut defects = Vec::new();

    for row in rows {
        if row.lft < 1 || row.lft >= row.rgt {
            defects.push(TreeDefect {
                code: "BOUNDS_ORDER",
                message: format!("bounds out of order: lft={} rgt={}", row.lft, row.rgt),
                id: row.id.clone(),
            });
        } else if (row.rgt - row.lft) % 2 == 0 {
            defects.push(TreeDefect {
                code: "BOUNDS_WIDTH",
                message: format!("bound width must be odd: lft={} rgt={}", row.lft, row.rgt),
                id: row.id.clone(),
            });
        }
    }

    // The union of all bounds must be a permutation of {1..2N}.
    let mut seen: HashMap<i64, &str> = HashMap::new();
    for row in rows {
        for bound in [row.lft, row.rgt] {
            if let Some(other) = seen.insert(bound, row.id.as_str()) {
                defects.push(TreeDefect {
                    code: "BOUNDS_DUPLICATE",
                    message: format!("bound {bound} also used by row {other}"),
                    id: row.id.clone(),
                });
            }
        }
    }
    let limit = rows.len() as i64 * 2;
    for bound in 1..=limit {
        if !seen.contains_key(&bound) {
            defects.push(TreeDefect {
                code: "BOUNDS_GAP",
                message: format!("bound {bound} missing from 1..{limit}"),
                id: String::new(),
            });
        }
    }

    let by_id: HashMap<&str, &TreeNode> = rows.iter().map(|row| (row.id.as_str(), row)).collect();
    for row in rows {
        let enclosing = tightest_enclosing(row, rows);
        match (&row.parent_id, enclosing) {
            (None, Some(found)) => defects.push(TreeDefect {
                code: "ROOT_ENCLOSED",
                message: format!("root row lies inside the bounds of {}", found.id),
                id: row.id.clone(),
            }),
            (Some(parent), found) => {
                if !by_id.contains_key(parent.as_str()) {
                    defects.push(TreeDefect {
                        code: "PARENT_MISSING",
                        message: format!("parent {parent} not present in scope"),
                        id: row.id.clone(),
                    });
                } else if found.map(|node| node.id.as_str()) != Some(parent.as_str()) {
                    defects.push(TreeDefect {
                        code: "PARENT_MISMATCH",
                        message: match found {
                            Some(found) => format!(
                                "declared parent {parent} but bounds are enclosed by {}",
                                found.id
                            ),
                            None => format!("declared parent {parent} but no row encloses the bounds"),
                        },
                        id: row.id.clone(),
                    });
                }
            }
            (None, None) => {}
        }

        let ancestors = rows
            .iter()
            .filter(|other| other.lft < row.lft && other.rgt > row.rgt)
            .count() as i64;
        if row.depth != ancestors {
            defects.push(TreeDefect {
                code: "DEPTH_MISMATCH",
                message: format!("depth {} but {} enclosing rows", row.depth, ancestors),
                id: row.id.clone(),
            });
        }
    }

    TreeAudit {
        ok: defects.is_empty(),
        nodes: rows.len(),
        defects,
    }
}

/// Row whose bounds are the tightest strict superset of `row`'s, if any.
fn tightest_enclosing<'a>(row: &TreeNode, rows: &'a [TreeNode]) -> Option<&'a TreeNode> {
    rows.iter()
        .filter(|other| other.lft < row.lft && other.rgt > row.rgt)
        .max_by_key(|other| other.lft)
}
