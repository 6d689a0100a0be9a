//! Pure rank-topology arithmetic: the load-log ring and the follower trees
//! used to route hub-to-worker and incumbent-broadcast traffic with bounded
//! fan-out. No state, no side effects.

use rangier_transport::Rank;

/// Ring neighbor a rank receives from: rank i receives from i − 1 mod size.
pub fn ring_source(rank: Rank, size: u32) -> Rank {
    Rank((rank.0 + size - 1) % size)
}

/// Ring neighbor a rank forwards to: rank i sends to i + 1 mod size.
pub fn ring_dest(rank: Rank, size: u32) -> Rank {
    Rank((rank.0 + 1) % size)
}

/// Rank's position in the tree rooted at `root`, by rotation.
fn virtualize(rank: Rank, root: Rank, size: u32) -> u32 {
    (rank.0 + size - root.0) % size
}

fn devirtualize(virtual_rank: u32, root: Rank, size: u32) -> Rank {
    Rank((virtual_rank + root.0) % size)
}

/// Parent of `rank` in the radix-ary follower tree rooted at `root`.
///
/// Returns `None` for the root itself.
pub fn tree_parent(rank: Rank, root: Rank, size: u32, radix: u32) -> Option<Rank> {
    let v = virtualize(rank, root, size);
    if v == 0 {
        return None;
    }
    Some(devirtualize((v - 1) / radix, root, size))
}

/// Children of `rank` in the radix-ary follower tree rooted at `root`.
pub fn tree_children(rank: Rank, root: Rank, size: u32, radix: u32) -> Vec<Rank> {
    let v = virtualize(rank, root, size);
    (1..=radix)
        .map(|i| v * radix + i)
        .take_while(|&child| child < size)
        .map(|child| devirtualize(child, root, size))
        .collect()
}
