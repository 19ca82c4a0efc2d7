//! Flat channel rows → ordered forest.
//!
//! Links are by id, never by reference; the forest is materialized on demand
//! and thrown away after emit. The builder leaves `occupants` empty — they
//! are a presence concern, filled by [`tree_with_occupants`].

use std::collections::HashMap;

use reson8_db::channels::ChannelRow;
use reson8_db::DbPool;
use reson8_models::channel::{ChannelKind, ChannelNode};

use crate::error::CoreError;
use crate::presence::PresenceStore;

/// Build the sorted forest. Nodes whose parent is null or dangling become
/// roots; every children list is sorted by `(position, id)`. O(n).
pub fn build_channel_tree(rows: &[ChannelRow]) -> Vec<ChannelNode> {
    let by_id: HashMap<i64, &ChannelRow> = rows.iter().map(|row| (row.id, row)).collect();

    let mut children_of: HashMap<i64, Vec<&ChannelRow>> = HashMap::new();
    let mut roots: Vec<&ChannelRow> = Vec::new();
    for row in rows {
        match row.parent_id.filter(|parent| by_id.contains_key(parent)) {
            Some(parent) => children_of.entry(parent).or_default().push(row),
            None => roots.push(row),
        }
    }

    sort_siblings(&mut roots);
    roots
        .into_iter()
        .map(|row| build_node(row, &mut children_of))
        .collect()
}

fn sort_siblings(siblings: &mut [&ChannelRow]) {
    siblings.sort_by_key(|row| (row.position, row.id));
}

fn build_node(row: &ChannelRow, children_of: &mut HashMap<i64, Vec<&ChannelRow>>) -> ChannelNode {
    let mut children = children_of.remove(&row.id).unwrap_or_default();
    sort_siblings(&mut children);
    let children = children
        .into_iter()
        .map(|child| build_node(child, children_of))
        .collect();

    ChannelNode {
        id: row.id.to_string(),
        server_id: row.server_id.to_string(),
        name: row.name.clone(),
        kind: ChannelKind::parse(&row.kind).unwrap_or(ChannelKind::Text),
        parent_id: row.parent_id.map(|id| id.to_string()),
        position: row.position,
        max_users: row.max_users,
        created_at: row.created_at.clone(),
        children,
        occupants: Vec::new(),
    }
}

/// The tree as emitted to clients: built from the durable rows, occupants
/// filled from presence.
pub async fn tree_with_occupants(
    pool: &DbPool,
    presence: &PresenceStore,
    server_id: i64,
) -> Result<Vec<ChannelNode>, CoreError> {
    let rows = reson8_db::channels::get_server_channels(pool, server_id).await?;
    let mut tree = build_channel_tree(&rows);
    fill_occupants(&mut tree, presence);
    Ok(tree)
}

fn fill_occupants(nodes: &mut [ChannelNode], presence: &PresenceStore) {
    for node in nodes {
        if let Ok(id) = node.id.parse::<i64>() {
            node.occupants = presence.channel_users(id);
        }
        fill_occupants(&mut node.children, presence);
    }
}
