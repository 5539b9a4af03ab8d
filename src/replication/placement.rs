//! Placement selection (`getPrimarySecondary`).

use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::storage::catalog::Placement;

/// Choose two distinct nodes uniformly at random from `online_nodes`. If
/// only one node is online, it is returned as both primary and secondary.
///
/// Returns `None` if `online_nodes` is empty — there is nowhere to place
/// the row.
pub fn select_primary_secondary(online_nodes: &[Uuid]) -> Option<Placement> {
    if online_nodes.is_empty() {
        return None;
    }

    if online_nodes.len() == 1 {
        return Some(Placement {
            primary: online_nodes[0],
            secondary: online_nodes[0],
        });
    }

    let mut rng = rand::thread_rng();
    let mut chosen: Vec<Uuid> = online_nodes.to_vec();
    chosen.shuffle(&mut rng);

    Some(Placement {
        primary: chosen[0],
        secondary: chosen[1],
    })
}

/// Choose a replacement node for a reshuffle, excluding the lost node and
/// (when possible) the surviving role so the row ends up on two distinct
/// live nodes again.
pub fn select_replacement(online_nodes: &[Uuid], exclude: &[Uuid]) -> Option<Uuid> {
    let candidates: Vec<Uuid> = online_nodes
        .iter()
        .copied()
        .filter(|n| !exclude.contains(n))
        .collect();

    let pool = if candidates.is_empty() {
        online_nodes
    } else {
        &candidates
    };

    pool.choose(&mut rand::thread_rng()).copied()
}
