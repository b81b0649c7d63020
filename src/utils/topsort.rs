use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

#[derive(Debug, Eq, PartialEq)]
pub enum TopologicalSortError {
    CycleDetected,
}

type TopoSortResult<Node> = Result<Vec<Node>, TopologicalSortError>;

/// Given a list of nodes with a priority key and a list of edges (source, destination), this
/// function uses Kahn's algorithm to return a topological sort of the graph or detect if there's
/// a cycle.
///
/// Among the nodes that are ready at any point the one with the smallest key is emitted first;
/// equal keys keep the order of `nodes`. Edges naming a node that is not listed are ignored.
pub fn topo_sort<Node, Key>(nodes: &[(Node, Key)], edges: &[(Node, Node)]) -> TopoSortResult<Node>
where
    Node: Hash + Eq + Copy,
    Key: Ord + Copy,
{
    // Step 1: Index the nodes
    let position: HashMap<Node, usize> = nodes
        .iter()
        .enumerate()
        .map(|(pos, (node, _))| (*node, pos))
        .collect();

    // Step 2: Build the graph and count incoming edges for each node
    let mut edges_by_source: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut incoming_edges_count = vec![0usize; nodes.len()];
    for (source, destination) in edges {
        if let (Some(&src), Some(&dst)) = (position.get(source), position.get(destination)) {
            edges_by_source[src].push(dst);
            incoming_edges_count[dst] += 1;
        }
    }

    // Step 3: Find all nodes with no incoming edges
    let mut ready = BinaryHeap::new();
    for (pos, (_, key)) in nodes.iter().enumerate() {
        if incoming_edges_count[pos] == 0 {
            ready.push(Reverse((*key, pos)));
        }
    }

    // Step 4: Process ready nodes, smallest key first
    let mut sorted = Vec::with_capacity(nodes.len());
    while let Some(Reverse((_, pos))) = ready.pop() {
        sorted.push(nodes[pos].0);

        // Step 5: Decrease the incoming edge count for each neighbor
        for &neighbor in &edges_by_source[pos] {
            incoming_edges_count[neighbor] -= 1;
            if incoming_edges_count[neighbor] == 0 {
                ready.push(Reverse((nodes[neighbor].1, neighbor)));
            }
        }
    }

    // Step 6: Any node left unsorted sits on a cycle
    if sorted.len() == nodes.len() {
        Ok(sorted)
    } else {
        Err(TopologicalSortError::CycleDetected)
    }
}

#[cfg(test)]
mod tests {
    use super::topo_sort;
    use crate::utils::topsort::TopologicalSortError;

    fn is_valid_sort<Node: Eq>(sorted: &[Node], graph: &[(Node, Node)]) -> bool {
        for (source, dest) in graph {
            let source_pos = sorted.iter().position(|node| node == source);
            let dest_pos = sorted.iter().position(|node| node == dest);
            match (source_pos, dest_pos) {
                (Some(src), Some(dst)) if src < dst => {}
                _ => {
                    return false;
                }
            };
        }
        true
    }

    fn unkeyed(nodes: &[i32]) -> Vec<(i32, u8)> {
        nodes.iter().map(|node| (*node, 0)).collect()
    }

    #[test]
    fn test_simple_graph() {
        let graph = vec![(1, 2), (1, 3), (2, 3), (3, 4), (4, 5), (5, 6), (6, 7)];
        let sort = topo_sort(&unkeyed(&[7, 6, 5, 4, 3, 2, 1]), &graph);
        assert!(sort.is_ok());
        let sort = sort.unwrap();
        assert!(is_valid_sort(&sort, &graph));
        assert_eq!(sort, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_wikipedia_example() {
        let graph = vec![
            (5, 11),
            (7, 11),
            (7, 8),
            (3, 8),
            (3, 10),
            (11, 2),
            (11, 9),
            (11, 10),
            (8, 9),
        ];
        let sort = topo_sort(&unkeyed(&[2, 3, 5, 7, 8, 9, 10, 11]), &graph);
        assert!(sort.is_ok());
        let sort = sort.unwrap();
        assert!(is_valid_sort(&sort, &graph));
        assert_eq!(sort, vec![3, 5, 7, 8, 11, 2, 9, 10]);
    }

    #[test]
    fn test_cyclic_graph() {
        let graph = vec![(1, 2), (2, 3), (3, 4), (4, 5), (4, 2)];
        let sort = topo_sort(&unkeyed(&[1, 2, 3, 4, 5]), &graph);
        assert!(sort.is_err());
        assert_eq!(sort.err().unwrap(), TopologicalSortError::CycleDetected);
    }

    #[test]
    fn test_keys_break_ties() {
        let nodes = vec![('a', (1, 0)), ('b', (0, 1)), ('c', (0, 2)), ('d', (1, 3))];
        let sort = topo_sort(&nodes, &[('a', 'c')]).unwrap();
        assert_eq!(sort, vec!['b', 'a', 'c', 'd']);
    }

    #[test]
    fn test_isolated_nodes_are_kept() {
        let sort = topo_sort(&unkeyed(&[3, 1, 2]), &[]).unwrap();
        assert_eq!(sort, vec![3, 1, 2]);
    }
}
