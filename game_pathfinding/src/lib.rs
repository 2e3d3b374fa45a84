use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// A graph whose nodes list their neighbours in a fixed order.
///
/// `Node`: The type of node identifiers (e.g., FlagId).
/// `Ctx`: A context object passed to neighbour enumeration (e.g., the game state).
pub trait Graph<Node, Ctx> {
    /// Return the neighbours of a node.
    ///
    /// The order of the returned vector is significant: searches visit
    /// neighbours in exactly this order, so ties are broken by it.
    fn neighbors(&self, node: Node, context: &Ctx) -> Vec<Node>;
}

/// Result of a tagged search: the node that matched and the tag of the seed
/// it was reached from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Found<Node, Tag> {
    pub node: Node,
    pub tag: Tag,
    /// Number of edges between the seed and the match (seeds are depth 0).
    pub depth: u32,
}

/// A breadth-first searcher with first-found semantics.
///
/// Nodes are expanded strictly in FIFO order and each node is visited at
/// most once, so the first match is the one reached with the fewest edges,
/// with ties resolved by seed order and then by neighbour order.
pub struct BreadthFirst;

impl BreadthFirst {
    /// Find the nearest node (including `start`) satisfying `is_goal`.
    pub fn find_nearest<Node, Ctx, G, F>(
        graph: &G,
        start: Node,
        context: &Ctx,
        is_goal: F,
    ) -> Option<(Node, u32)>
    where
        Node: Copy + Eq + Hash + std::fmt::Debug,
        G: Graph<Node, Ctx>,
        F: FnMut(Node) -> bool,
    {
        Self::find_tagged(graph, &[(start, ())], &[], context, is_goal)
            .map(|found| (found.node, found.depth))
    }

    /// Search outward from several tagged seeds at once.
    ///
    /// `excluded` nodes are treated as already visited; this is how a search
    /// seeded from a flag's neighbours is kept from walking back through the
    /// flag itself.
    pub fn find_tagged<Node, Tag, Ctx, G, F>(
        graph: &G,
        seeds: &[(Node, Tag)],
        excluded: &[Node],
        context: &Ctx,
        mut is_goal: F,
    ) -> Option<Found<Node, Tag>>
    where
        Node: Copy + Eq + Hash + std::fmt::Debug,
        Tag: Copy,
        G: Graph<Node, Ctx>,
        F: FnMut(Node) -> bool,
    {
        let mut queue: VecDeque<(Node, Tag, u32)> = VecDeque::new();
        let mut visited: HashSet<Node> = excluded.iter().copied().collect();

        for &(node, tag) in seeds {
            if visited.insert(node) {
                queue.push_back((node, tag, 0));
            }
        }

        while let Some((current, tag, depth)) = queue.pop_front() {
            if is_goal(current) {
                return Some(Found {
                    node: current,
                    tag,
                    depth,
                });
            }

            for neighbor in graph.neighbors(current, context) {
                // Skip already-queued nodes
                if visited.insert(neighbor) {
                    queue.push_back((neighbor, tag, depth + 1));
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flags on a ring of `n`, each linked to both neighbours, clockwise
    /// first. A context-supplied set of cut links stands in for removed roads.
    struct Ring(u32);

    impl Graph<u32, Vec<(u32, u32)>> for Ring {
        fn neighbors(&self, node: u32, cut: &Vec<(u32, u32)>) -> Vec<u32> {
            [(node + 1) % self.0, (node + self.0 - 1) % self.0]
                .into_iter()
                .filter(|&next| !cut.contains(&(node, next)) && !cut.contains(&(next, node)))
                .collect()
        }
    }

    #[test]
    fn test_nearest_goes_round_the_short_way() {
        let ring = Ring(10);
        assert_eq!(BreadthFirst::find_nearest(&ring, 0, &vec![], |n| n == 8), Some((8, 2)));
        assert_eq!(BreadthFirst::find_nearest(&ring, 0, &vec![], |n| n == 3), Some((3, 3)));
    }

    #[test]
    fn test_start_counts_as_found() {
        let ring = Ring(4);
        assert_eq!(BreadthFirst::find_nearest(&ring, 2, &vec![], |n| n == 2), Some((2, 0)));
    }

    #[test]
    fn test_cut_links_force_the_long_way() {
        let ring = Ring(10);
        let cut = vec![(0, 9)];
        assert_eq!(BreadthFirst::find_nearest(&ring, 0, &cut, |n| n == 8), Some((8, 8)));
        let isolated = vec![(0, 9), (0, 1)];
        assert!(BreadthFirst::find_nearest(&ring, 0, &isolated, |n| n == 8).is_none());
    }

    #[test]
    fn test_tie_goes_to_clockwise_neighbour() {
        // Ring of 6: from 0, node 3 is three links away either way.
        let ring = Ring(6);
        let found = BreadthFirst::find_tagged(&ring, &[(1, 'r'), (5, 'l')], &[0], &vec![], |n| n == 3)
            .unwrap();
        assert_eq!((found.tag, found.depth), ('r', 2));
        let swapped = BreadthFirst::find_tagged(&ring, &[(5, 'l'), (1, 'r')], &[0], &vec![], |n| n == 3)
            .unwrap();
        assert_eq!(swapped.tag, 'l');
    }

    #[test]
    fn test_excluded_start_is_never_reached() {
        let ring = Ring(5);
        let found = BreadthFirst::find_tagged(&ring, &[(1, ()), (4, ())], &[0], &vec![], |n| n == 0);
        assert!(found.is_none());
    }
}
