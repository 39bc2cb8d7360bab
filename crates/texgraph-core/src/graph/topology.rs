//! Reachability and ordering queries over the connection set.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::{NodeGraph, NodeId};

impl NodeGraph {
    /// Nodes reading directly from any output of `id`.
    pub fn consumers(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.links
            .iter()
            .filter(|(_, from)| from.node == id)
            .map(|(to, _)| to.node)
            .collect()
    }

    /// Nodes feeding any input of `id`.
    pub fn sources(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.links
            .iter()
            .filter(|(to, _)| to.node == id)
            .map(|(_, from)| from.node)
            .collect()
    }

    /// `id` and every node that transitively consumes it.
    pub fn downstream(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.closure(id, |g, n| g.consumers(n))
    }

    /// `id` and every node it transitively depends on.
    pub fn upstream(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.closure(id, |g, n| g.sources(n))
    }

    /// Upstream closure of several targets.
    pub fn upstream_of(&self, targets: &[NodeId]) -> BTreeSet<NodeId> {
        targets
            .iter()
            .filter(|id| self.contains(**id))
            .flat_map(|id| self.upstream(*id))
            .collect()
    }

    fn closure(
        &self,
        start: NodeId,
        next: impl Fn(&NodeGraph, NodeId) -> BTreeSet<NodeId>,
    ) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        if !self.contains(start) {
            return seen;
        }
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            if seen.insert(id) {
                queue.extend(next(self, id));
            }
        }
        seen
    }

    /// Whether `to` is reachable downstream from `from` (inclusive).
    pub(crate) fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if seen.insert(id) {
                stack.extend(self.consumers(id));
            }
        }
        false
    }

    /// Order `subset` so that every node follows the nodes it reads from.
    ///
    /// Kahn's algorithm; independent nodes come out in id order, which is
    /// convenient for logs and carries no meaning.
    pub fn topo_order(&self, subset: &BTreeSet<NodeId>) -> Vec<NodeId> {
        let mut indegree: BTreeMap<NodeId, usize> = subset.iter().map(|&id| (id, 0)).collect();
        let mut edges: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for (to, from) in &self.links {
            if subset.contains(&to.node) && subset.contains(&from.node) {
                // Several sockets may share a source; count the node pair once.
                if edges.entry(from.node).or_default().insert(to.node) {
                    if let Some(d) = indegree.get_mut(&to.node) {
                        *d += 1;
                    }
                }
            }
        }

        let mut ready: BTreeSet<NodeId> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(subset.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for next in edges.get(&id).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(*next);
                    }
                }
            }
        }
        order
    }
}
