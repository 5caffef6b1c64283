#![forbid(unsafe_code)]

use nestree_core::tree::{AttrValue, MoveError, MovePosition, TreeNode};
use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};

use super::events::TreeEvents;
use super::lifecycle::{insert_at_tail_tx, prune_subtree_tx, update_attrs_tx};
use super::moves::move_to_tx;
use super::support::{descendant_rows, find_node, next_counter, now_ms, required_node, scope_rows};
use super::types::MapTreeOutcome;
use super::{StoreError, TreeConfig, TreeStore};

/// Key reserved for the recursive child list in mapper input.
const CHILDREN_KEY: &str = "children";

impl TreeStore {
    /// Reconcile a nested input array with the persisted subtree rooted at
    /// `receiver_id`: create or update each named node under its input
    /// parent, in input order, and remove persisted descendants the input no
    /// longer names. One transaction.
    pub fn map_tree(
        &mut self,
        receiver_id: &str,
        items: &[JsonValue],
    ) -> Result<MapTreeOutcome, StoreError> {
        let receiver = self.node(receiver_id)?;
        let scope = receiver.scope.clone();
        self.map_items_scoped(Some(receiver), scope, items)
    }

    /// Same reconciliation against the top level of one scope partition.
    pub fn map_forest(
        &mut self,
        scope: &[AttrValue],
        items: &[JsonValue],
    ) -> Result<MapTreeOutcome, StoreError> {
        self.map_items_scoped(None, scope.to_vec(), items)
    }

    fn map_items_scoped(
        &mut self,
        receiver: Option<TreeNode>,
        scope: Vec<AttrValue>,
        items: &[JsonValue],
    ) -> Result<MapTreeOutcome, StoreError> {
        let now = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut outcome = MapTreeOutcome::default();
        let mut mentioned: HashSet<String> = HashSet::new();

        let parent_id = receiver.as_ref().map(|node| node.id.clone());
        map_level_tx(
            &tx,
            &self.config,
            &self.events,
            parent_id.as_deref(),
            &scope,
            items,
            &mut mentioned,
            &mut outcome,
            now,
        )?;

        // Persisted rows under the receiver that the input no longer names.
        let stale: Vec<TreeNode> = match &receiver {
            Some(node) => {
                let fresh = required_node(&tx, &self.config, &node.id)?;
                descendant_rows(&tx, &self.config, &fresh)?
            }
            None => scope_rows(&tx, &self.config, &scope)?,
        };
        for row in stale {
            if mentioned.contains(&row.id) {
                continue;
            }
            // An earlier prune may have taken this row out already.
            if let Some(current) = find_node(&tx, &self.config, &row.id, false)? {
                prune_subtree_tx(&tx, &self.config, &current, now)?;
                outcome.removed += 1;
            }
        }

        tx.commit()?;
        Ok(outcome)
    }
}

#[allow(clippy::too_many_arguments)]
fn map_level_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    events: &TreeEvents,
    parent: Option<&str>,
    scope: &[AttrValue],
    items: &[JsonValue],
    mentioned: &mut HashSet<String>,
    outcome: &mut MapTreeOutcome,
    now: i64,
) -> Result<(), StoreError> {
    for item in items {
        let Some(object) = item.as_object() else {
            return Err(StoreError::InvalidInput("tree item must be a JSON object"));
        };

        let mut id: Option<String> = None;
        let mut attrs: BTreeMap<String, AttrValue> = BTreeMap::new();
        let mut children: &[JsonValue] = &[];
        for (key, value) in object {
            match key.as_str() {
                CHILDREN_KEY => {
                    children = value
                        .as_array()
                        .map(Vec::as_slice)
                        .ok_or(StoreError::InvalidInput("children must be an array"))?;
                }
                "id" => id = Some(json_id(value)?),
                _ => {
                    if !cfg.is_attr_column(key) {
                        return Err(StoreError::InvalidInput(
                            "unknown attribute column in tree item",
                        ));
                    }
                    attrs.insert(key.clone(), json_scalar(value)?);
                }
            }
        }

        let existing = match &id {
            Some(id) => find_node(conn, cfg, id, false)?,
            None => None,
        };
        let node_id = match existing {
            Some(node) => {
                if node.scope != *scope {
                    return Err(StoreError::MoveNotPossible(MoveError::CrossScope));
                }
                let updates: Vec<(String, AttrValue)> = attrs.into_iter().collect();
                update_attrs_tx(conn, cfg, &node.id, &updates, now)?;
                // Appending in input order reproduces the input's sibling
                // order without a trailing rebuild.
                match parent {
                    Some(parent) => {
                        move_to_tx(conn, cfg, events, &node.id, Some(parent), MovePosition::Child)?;
                    }
                    None => {
                        move_to_tx(conn, cfg, events, &node.id, None, MovePosition::Root)?;
                    }
                }
                outcome.updated += 1;
                node.id
            }
            None => {
                let new_id = match id {
                    Some(id) => {
                        if find_node(conn, cfg, &id, true)?.is_some() {
                            return Err(StoreError::AlreadyExists {
                                entity: "node",
                                id,
                            });
                        }
                        id
                    }
                    None => {
                        let seq = next_counter(conn, &cfg.table, "node_seq")?;
                        format!("NODE-{seq:04}")
                    }
                };
                insert_at_tail_tx(conn, cfg, &new_id, scope, &attrs, now)?;
                if let Some(parent) = parent {
                    move_to_tx(conn, cfg, events, &new_id, Some(parent), MovePosition::Child)?;
                }
                outcome.created += 1;
                new_id
            }
        };

        mentioned.insert(node_id.clone());
        if !children.is_empty() {
            map_level_tx(
                conn,
                cfg,
                events,
                Some(&node_id),
                scope,
                children,
                mentioned,
                outcome,
                now,
            )?;
        }
    }
    Ok(())
}

fn json_id(value: &JsonValue) -> Result<String, StoreError> {
    match value {
        JsonValue::String(id) => Ok(id.clone()),
        JsonValue::Number(id) if id.is_i64() => Ok(id.to_string()),
        _ => Err(StoreError::InvalidInput(
            "node id must be a string or integer",
        )),
    }
}

fn json_scalar(value: &JsonValue) -> Result<AttrValue, StoreError> {
    match value {
        JsonValue::Null => Ok(AttrValue::Null),
        JsonValue::Bool(flag) => Ok(AttrValue::Int(*flag as i64)),
        JsonValue::Number(number) => number
            .as_i64()
            .map(AttrValue::Int)
            .or_else(|| number.as_f64().map(AttrValue::Real))
            .ok_or(StoreError::InvalidInput("numeric attribute out of range")),
        JsonValue::String(text) => Ok(AttrValue::Text(text.clone())),
        _ => Err(StoreError::InvalidInput(
            "attribute values must be JSON scalars",
        )),
    }
}
