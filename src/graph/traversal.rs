//! Bounded chain-of-command traversals
//!
//! Every walk uses an explicit worklist plus a visited set and stops after
//! at most `node_count` steps, so malformed (cyclic) input still terminates.

use std::collections::{HashMap, HashSet, VecDeque};

use super::index::{ChainIndex, SuperiorLink};
use crate::models::ActorId;

fn step_limit(index: &ChainIndex, max_steps: Option<usize>) -> usize {
    let nodes = index.node_count();
    max_steps.map_or(nodes, |cap| cap.min(nodes))
}

/// Shortest downward path `from` → … → `to`, if any.
///
/// Adding `superior → subordinate` closes a cycle exactly when a path
/// `subordinate → … → superior` already exists.
pub fn find_path(
    index: &ChainIndex,
    from: ActorId,
    to: ActorId,
    max_steps: Option<usize>,
) -> Option<Vec<ActorId>> {
    if from == to {
        return Some(vec![from]);
    }
    let limit = step_limit(index, max_steps);
    let mut parent: HashMap<ActorId, ActorId> = HashMap::new();
    let mut visited: HashSet<ActorId> = HashSet::from([from]);
    let mut queue = VecDeque::from([from]);
    let mut steps = 0;

    while let Some(current) = queue.pop_front() {
        if steps >= limit {
            break;
        }
        steps += 1;
        for &next in index.subordinates(current) {
            if !visited.insert(next) {
                continue;
            }
            parent.insert(next, current);
            if next == to {
                let mut path = vec![to];
                let mut node = to;
                while let Some(&p) = parent.get(&node) {
                    path.push(p);
                    node = p;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }
    None
}

/// Pick the edge to follow upward.
///
/// Highest confidence wins; ties go to the most recent start date (an
/// unknown start sorts oldest), then to the lowest superior id.
pub fn best_superior<'a>(
    links: &'a [SuperiorLink],
    visited: &HashSet<ActorId>,
) -> Option<&'a SuperiorLink> {
    links
        .iter()
        .filter(|l| !visited.contains(&l.superior))
        .max_by(|a, b| {
            a.confidence
                .total_cmp(&b.confidence)
                .then(a.start_date.cmp(&b.start_date))
                .then(b.superior.cmp(&a.superior))
        })
}

/// Ordered ancestors of `start`, nearest first, excluding `start` itself
pub fn reporting_chain(index: &ChainIndex, start: ActorId, max_steps: Option<usize>) -> Vec<ActorId> {
    let limit = step_limit(index, max_steps);
    let mut chain = Vec::new();
    let mut visited: HashSet<ActorId> = HashSet::from([start]);
    let mut current = start;

    for _ in 0..limit {
        let Some(link) = best_superior(index.superiors(current), &visited) else {
            break;
        };
        let next = link.superior;
        visited.insert(next);
        chain.push(next);
        current = next;
    }
    chain
}

/// Distinct transitive subordinates with their depth (1 = direct report),
/// in breadth-first order
pub fn descendants(
    index: &ChainIndex,
    start: ActorId,
    max_depth: Option<usize>,
) -> Vec<(ActorId, usize)> {
    let limit = index.node_count();
    let mut found = Vec::new();
    let mut visited: HashSet<ActorId> = HashSet::from([start]);
    let mut queue = VecDeque::from([(start, 0usize)]);

    while let Some((current, depth)) = queue.pop_front() {
        if found.len() >= limit || max_depth.is_some_and(|d| depth >= d) {
            continue;
        }
        for &next in index.subordinates(current) {
            if visited.insert(next) {
                found.push((next, depth + 1));
                queue.push_back((next, depth + 1));
            }
        }
    }
    found
}

/// Number of distinct actors transitively below `start`
pub fn centrality(index: &ChainIndex, start: ActorId) -> usize {
    descendants(index, start, None).len()
}

/// Every distinct actor transitively above `start`, over all superior edges
pub fn ancestors(index: &ChainIndex, start: ActorId) -> Vec<ActorId> {
    let mut found = Vec::new();
    let mut visited: HashSet<ActorId> = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        for link in index.superiors(current) {
            if visited.insert(link.superior) {
                found.push(link.superior);
                queue.push_back(link.superior);
            }
        }
    }
    found
}

/// One cycle in the index, as `[a, b, …, a]` in superior → subordinate order.
///
/// Kahn's algorithm peels off every node with no remaining superior; whatever
/// is left lies on or below a cycle, and walking upward inside that remainder
/// must revisit a node.
pub fn find_cycle(index: &ChainIndex) -> Option<Vec<ActorId>> {
    let mut in_degree: HashMap<ActorId, usize> = index.nodes().map(|n| (n, 0)).collect();
    for node in index.nodes() {
        for sub in index.subordinates(node) {
            *in_degree.entry(*sub).or_default() += 1;
        }
    }

    let mut queue: VecDeque<ActorId> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    while let Some(node) = queue.pop_front() {
        in_degree.remove(&node);
        for sub in index.subordinates(node) {
            if let Some(d) = in_degree.get_mut(sub) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(*sub);
                }
            }
        }
    }

    let remaining: HashSet<ActorId> = in_degree.keys().copied().collect();
    let start = remaining.iter().min().copied()?;

    let mut walk: Vec<ActorId> = Vec::new();
    let mut position: HashMap<ActorId, usize> = HashMap::new();
    let mut current = start;
    for _ in 0..=remaining.len() {
        if let Some(&at) = position.get(&current) {
            let mut cycle: Vec<ActorId> = walk[at..].to_vec();
            cycle.reverse();
            cycle.push(cycle[0]);
            return Some(cycle);
        }
        position.insert(current, walk.len());
        walk.push(current);
        current = index
            .superiors(current)
            .iter()
            .map(|l| l.superior)
            .filter(|s| remaining.contains(s))
            .min()?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn id(n: u8) -> ActorId {
        Uuid::from_u128(n as u128 + 1)
    }

    fn link(index: &mut ChainIndex, sup: u8, sub: u8, confidence: f64, start: Option<(i32, u32)>) {
        index.link(
            SuperiorLink {
                edge_id: Uuid::new_v4(),
                superior: id(sup),
                confidence,
                start_date: start.and_then(|(y, m)| NaiveDate::from_ymd_opt(y, m, 1)),
            },
            id(sub),
        );
    }

    #[test]
    fn test_find_path_detects_back_edge() {
        let mut index = ChainIndex::new();
        link(&mut index, 0, 1, 1.0, None);
        link(&mut index, 1, 2, 1.0, None);
        assert_eq!(find_path(&index, id(0), id(2), None), Some(vec![id(0), id(1), id(2)]));
        assert_eq!(find_path(&index, id(2), id(0), None), None);
    }

    #[test]
    fn test_reporting_chain_prefers_confidence_then_recency() {
        let mut index = ChainIndex::new();
        // Actor 9 has three superiors; 1 and 2 tie on confidence
        link(&mut index, 1, 9, 0.8, Some((2015, 1)));
        link(&mut index, 2, 9, 0.8, Some((2019, 6)));
        link(&mut index, 3, 9, 0.6, Some((2023, 1)));
        link(&mut index, 4, 2, 0.9, None);
        assert_eq!(reporting_chain(&index, id(9), None), vec![id(2), id(4)]);
    }

    #[test]
    fn test_reporting_chain_tie_without_dates_uses_lowest_id() {
        let mut index = ChainIndex::new();
        link(&mut index, 5, 9, 0.7, None);
        link(&mut index, 3, 9, 0.7, None);
        assert_eq!(reporting_chain(&index, id(9), None), vec![id(3)]);
    }

    #[test]
    fn test_reporting_chain_terminates_on_cycle() {
        let mut index = ChainIndex::new();
        link(&mut index, 0, 1, 1.0, None);
        link(&mut index, 1, 2, 1.0, None);
        link(&mut index, 2, 0, 1.0, None);
        let chain = reporting_chain(&index, id(2), None);
        assert_eq!(chain, vec![id(1), id(0)]);
        assert!(find_cycle(&index).is_some());
    }

    #[test]
    fn test_descendants_and_centrality() {
        let mut index = ChainIndex::new();
        link(&mut index, 0, 1, 1.0, None);
        link(&mut index, 0, 2, 1.0, None);
        link(&mut index, 1, 3, 1.0, None);
        // Diamond: 3 reachable twice, counted once
        link(&mut index, 2, 3, 1.0, None);
        assert_eq!(centrality(&index, id(0)), 3);
        assert_eq!(
            descendants(&index, id(0), Some(1)),
            vec![(id(1), 1), (id(2), 1)]
        );
        assert_eq!(centrality(&index, id(3)), 0);
        let mut above = ancestors(&index, id(3));
        above.sort();
        assert_eq!(above, vec![id(0), id(1), id(2)]);
    }

    #[test]
    fn test_find_cycle_reports_closed_path() {
        let mut index = ChainIndex::new();
        link(&mut index, 7, 0, 1.0, None);
        link(&mut index, 0, 1, 1.0, None);
        link(&mut index, 1, 0, 1.0, None);
        let cycle = find_cycle(&index).unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 3);
        assert!(!cycle.contains(&id(7)));
    }

    #[test]
    fn test_max_steps_caps_chain() {
        let mut index = ChainIndex::new();
        for n in 0..5 {
            link(&mut index, n + 1, n, 1.0, None);
        }
        assert_eq!(reporting_chain(&index, id(0), Some(2)).len(), 2);
        assert_eq!(reporting_chain(&index, id(0), None).len(), 5);
    }

    proptest! {
        #[test]
        fn prop_checked_inserts_stay_acyclic(pairs in prop::collection::vec((0u8..12, 0u8..12), 0..80)) {
            let mut index = ChainIndex::new();
            for (sup, sub) in pairs {
                if sup == sub || find_path(&index, id(sub), id(sup), None).is_some() {
                    continue;
                }
                link(&mut index, sup, sub, 1.0, None);
            }
            prop_assert!(find_cycle(&index).is_none());
        }

        #[test]
        fn prop_traversals_terminate_and_never_revisit(
            pairs in prop::collection::vec((0u8..10, 0u8..10, 0u8..4), 0..60)
        ) {
            // Unchecked inserts: cycles and self-loops allowed
            let mut index = ChainIndex::new();
            for (sup, sub, c) in pairs {
                link(&mut index, sup, sub, f64::from(c) / 4.0, None);
            }
            let n = index.node_count();
            for node in index.nodes().collect::<Vec<_>>() {
                let chain = reporting_chain(&index, node, None);
                prop_assert!(chain.len() <= n);
                let distinct: HashSet<_> = chain.iter().collect();
                prop_assert_eq!(distinct.len(), chain.len());
                prop_assert!(!chain.contains(&node));
                prop_assert!(centrality(&index, node) < n.max(1));
            }
        }
    }
}
