/// Directed graph of the contemporaneous (lag-0) links between distinct
/// variables. Lagged links cannot form cycles in time, so only this part
/// decides the order in which variables are computed within a time step.
#[derive(Debug, Clone)]
pub struct ContempDag {
    adjacency: Vec<Vec<usize>>,
}

impl ContempDag {
    pub fn new(n_vars: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); n_vars],
        }
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Adds `u -> v`. Both must be below `len()`.
    pub fn add_edge(&mut self, u: usize, v: usize) {
        self.adjacency[u].push(v);
    }

    pub fn is_cyclic(&self) -> bool {
        let mut visited = vec![false; self.len()];
        let mut on_stack = vec![false; self.len()];
        (0..self.len()).any(|node| !visited[node] && self.cyclic_from(node, &mut visited, &mut on_stack))
    }

    fn cyclic_from(&self, v: usize, visited: &mut [bool], on_stack: &mut [bool]) -> bool {
        visited[v] = true;
        on_stack[v] = true;

        for &next in &self.adjacency[v] {
            if !visited[next] {
                if self.cyclic_from(next, visited, on_stack) {
                    return true;
                }
            } else if on_stack[next] {
                return true;
            }
        }

        on_stack[v] = false;
        false
    }

    /// Reverse DFS post-order, starting the search from nodes `0..len()` in
    /// turn. Only meaningful when `is_cyclic()` is false.
    pub fn topological_sort(&self) -> Vec<usize> {
        let mut visited = vec![false; self.len()];
        let mut post_order = Vec::with_capacity(self.len());
        for node in 0..self.len() {
            if !visited[node] {
                self.visit(node, &mut visited, &mut post_order);
            }
        }
        post_order.reverse();
        post_order
    }

    fn visit(&self, v: usize, visited: &mut [bool], post_order: &mut Vec<usize>) {
        visited[v] = true;
        for &next in &self.adjacency[v] {
            if !visited[next] {
                self.visit(next, visited, post_order);
            }
        }
        post_order.push(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[usize], node: usize) -> usize {
        order.iter().position(|&n| n == node).unwrap()
    }

    #[test]
    fn test_detects_cycle() {
        let mut dag = ContempDag::new(3);
        dag.add_edge(0, 1);
        dag.add_edge(1, 2);
        assert!(!dag.is_cyclic());

        dag.add_edge(2, 0);
        assert!(dag.is_cyclic());
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let mut dag = ContempDag::new(5);
        let edges = [(3, 1), (1, 0), (4, 0), (2, 4)];
        for (u, v) in edges {
            dag.add_edge(u, v);
        }

        let order = dag.topological_sort();
        assert_eq!(order.len(), 5);
        for (u, v) in edges {
            assert!(position(&order, u) < position(&order, v), "{} before {}", u, v);
        }
    }

    #[test]
    fn test_order_without_edges_is_reverse_index() {
        // 每個節點各自成為一次 DFS 的根
        let dag = ContempDag::new(3);
        assert_eq!(dag.topological_sort(), vec![2, 1, 0]);
    }
}
