//! Directed graph over dense system indices with topological ordering.
//!
//! The sort is an iterative depth-first post-order over every vertex,
//! reversed, so an edge `a -> b` always places `a` before `b` in the
//! result. Cycles are not detected; a cycle collapses into an arbitrary
//! but stable relative order of its members.

/// Adjacency-list digraph over vertices `0..count`.
pub struct Dag {
    edges: Vec<Vec<usize>>,
}

impl Dag {
    /// An edgeless graph over `vertex_count` vertices.
    pub fn new(vertex_count: usize) -> Self {
        Self { edges: vec![Vec::new(); vertex_count] }
    }

    /// Number of vertices, fixed at construction.
    pub fn vertex_count(&self) -> usize {
        self.edges.len()
    }

    /// Adds the constraint `from` runs before `to`. Duplicate edges are
    /// kept; they do not affect the resulting order.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.edges[from].push(to);
    }

    /// Orders all vertices so that for every edge `a -> b`, `a` appears
    /// before `b`.
    pub fn topological_sort(&self) -> Vec<usize> {
        let count = self.vertex_count();
        let mut visited = vec![false; count];
        let mut post_order = Vec::with_capacity(count);
        // Frame is (vertex, next child offset); a vertex is emitted once
        // all of its children have been.
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..count {
            if visited[root] {
                continue;
            }
            visited[root] = true;
            stack.push((root, 0));
            while let Some(&mut (vertex, ref mut child)) = stack.last_mut() {
                if *child < self.edges[vertex].len() {
                    let next = self.edges[vertex][*child];
                    *child += 1;
                    if !visited[next] {
                        visited[next] = true;
                        stack.push((next, 0));
                    }
                } else {
                    post_order.push(vertex);
                    stack.pop();
                }
            }
        }

        post_order.reverse();
        post_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[usize], vertex: usize) -> usize {
        order.iter().position(|&v| v == vertex).unwrap()
    }

    #[test]
    fn edges_are_respected() {
        let mut dag = Dag::new(5);
        dag.add_edge(3, 1);
        dag.add_edge(1, 4);
        dag.add_edge(0, 4);

        let order = dag.topological_sort();
        assert_eq!(order.len(), 5);
        assert!(position(&order, 3) < position(&order, 1));
        assert!(position(&order, 1) < position(&order, 4));
        assert!(position(&order, 0) < position(&order, 4));
    }

    #[test]
    fn isolated_vertices_are_included() {
        let dag = Dag::new(3);
        let mut order = dag.topological_sort();
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn diamond_keeps_endpoints_ordered() {
        let mut dag = Dag::new(4);
        dag.add_edge(0, 1);
        dag.add_edge(0, 2);
        dag.add_edge(1, 3);
        dag.add_edge(2, 3);

        let order = dag.topological_sort();
        assert_eq!(position(&order, 0), 0);
        assert_eq!(position(&order, 3), 3);
    }

    #[test]
    fn duplicate_edges_do_not_duplicate_vertices() {
        let mut dag = Dag::new(2);
        dag.add_edge(0, 1);
        dag.add_edge(0, 1);

        let order = dag.topological_sort();
        assert_eq!(order, vec![0, 1]);
    }
}
