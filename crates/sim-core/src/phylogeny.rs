//! Species phylogeny keyed by integer node ids.
//!
//! Each species owns exactly one node. Speciation appends the daughter as a
//! child of the parent species' node; the parent stays extant until its own
//! extinction.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq)]
pub struct PhyloNode {
    pub id: u64,
    pub parent: Option<u64>,
    pub species_id: u64,
    pub generation: u64,
    pub branch_length: u64,
    extant: bool,
    pub children: Vec<u64>,
}

impl PhyloNode {
    pub fn is_extant(&self) -> bool {
        self.extant
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhylogeneticTree {
    nodes: BTreeMap<u64, PhyloNode>,
    root: Option<u64>,
    by_species: HashMap<u64, u64>,
    next_id: u64,
}

impl PhylogeneticTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<u64> {
        self.root
    }

    pub fn node(&self, id: u64) -> Option<&PhyloNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PhyloNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node recording `species_id`.
    pub fn node_of(&self, species_id: u64) -> Option<u64> {
        self.by_species.get(&species_id).copied()
    }

    fn insert(&mut self, parent: Option<u64>, species_id: u64, generation: u64) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        let branch_length = parent
            .and_then(|p| self.nodes.get(&p))
            .map(|p| generation.saturating_sub(p.generation))
            .unwrap_or(0);
        self.nodes.insert(id, PhyloNode { id, parent, species_id, generation, branch_length, extant: true, children: Vec::new() });
        if let Some(p) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            p.children.push(id);
        }
        self.by_species.insert(species_id, id);
        id
    }

    /// Adds `species_id` as the root, or under the root when one exists.
    pub fn add_species(&mut self, species_id: u64, generation: u64) -> u64 {
        if let Some(node) = self.node_of(species_id) {
            return node;
        }
        match self.root {
            Some(root) => self.insert(Some(root), species_id, generation),
            None => {
                let id = self.insert(None, species_id, generation);
                self.root = Some(id);
                id
            }
        }
    }

    /// Appends `child_species` under the parent species' node. Returns the
    /// new node id, or `None` if the parent is unknown, extinct, or the child
    /// is already recorded.
    pub fn speciate(&mut self, parent_species: u64, child_species: u64, generation: u64) -> Option<u64> {
        let parent = self.node_of(parent_species)?;
        if !self.nodes.get(&parent)?.extant || self.by_species.contains_key(&child_species) {
            return None;
        }
        Some(self.insert(Some(parent), child_species, generation))
    }

    /// Marks a species' node non-extant. Irreversible.
    pub fn mark_extinct(&mut self, species_id: u64) -> bool {
        match self.node_of(species_id).and_then(|t| self.nodes.get_mut(&t)) {
            Some(node) if node.extant => {
                node.extant = false;
                true
            }
            _ => false,
        }
    }

    pub fn depth(&self, id: u64) -> Option<usize> {
        let mut node = self.nodes.get(&id)?;
        let mut depth = 0;
        while let Some(parent) = node.parent {
            node = self.nodes.get(&parent)?;
            depth += 1;
        }
        Some(depth)
    }

    /// Every node below `id`, depth first.
    pub fn descendants(&self, id: u64) -> Vec<u64> {
        let mut out = Vec::new();
        let mut stack: Vec<u64> = self.nodes.get(&id).map(|n| n.children.iter().rev().copied().collect()).unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(n) = self.nodes.get(&next) {
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn extant_nodes(&self) -> Vec<u64> {
        self.nodes.values().filter(|n| n.extant).map(|n| n.id).collect()
    }

    /// Newick serialization; `name` labels each node from its species id.
    pub fn to_newick(&self, name: impl Fn(u64) -> String) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.write_newick(root, &name, &mut out);
        }
        out.push(';');
        out
    }

    fn write_newick(&self, id: u64, name: &dyn Fn(u64) -> String, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else { return };
        if !node.children.is_empty() {
            out.push('(');
            for (i, child) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.write_newick(*child, name, out);
            }
            out.push(')');
        }
        let label: String =
            name(node.species_id).chars().map(|c| if c.is_whitespace() || "(),:;".contains(c) { '_' } else { c }).collect();
        out.push_str(&label);
        if node.parent.is_some() {
            let _ = write!(out, ":{}", node.branch_length);
        }
    }

    /// Checks that every parent link is mirrored by a child link.
    pub fn is_consistent(&self) -> bool {
        let roots = self.nodes.values().filter(|n| n.parent.is_none()).count();
        roots <= 1
            && self.nodes.values().all(|n| match n.parent {
                Some(p) => self.nodes.get(&p).is_some_and(|p| p.children.contains(&n.id)),
                None => self.root == Some(n.id),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_species_is_root() {
        let mut t = PhylogeneticTree::new();
        let root = t.add_species(1, 0);
        assert_eq!(t.root(), Some(root));
        assert_eq!(t.add_species(1, 5), root);
        assert!(t.is_consistent());
    }

    #[test]
    fn speciation_appends_one_child() {
        let mut t = PhylogeneticTree::new();
        let root = t.add_species(1, 0);
        let daughter = t.speciate(1, 2, 40).unwrap();
        assert_eq!(t.descendants(root), vec![daughter]);
        assert_eq!(t.node(daughter).unwrap().branch_length, 40);
        assert!(t.node(root).unwrap().is_extant());
        assert_eq!(t.node_of(1), Some(root));
        assert_eq!(t.node_of(2), Some(daughter));
        assert_eq!(t.depth(daughter), Some(1));
        assert!(t.is_consistent());
    }

    #[test]
    fn branch_length_counts_from_the_parent_node() {
        let mut t = PhylogeneticTree::new();
        let root = t.add_species(1, 3);
        let b = t.speciate(1, 2, 10).unwrap();
        let c = t.speciate(2, 3, 25).unwrap();
        let d = t.speciate(1, 4, 30).unwrap();
        assert_eq!(t.node(b).unwrap().branch_length, 7);
        assert_eq!(t.node(c).unwrap().branch_length, 15);
        assert_eq!(t.node(d).unwrap().branch_length, 27);
        assert_eq!(t.node(root).unwrap().children, vec![b, d]);
        assert_eq!(t.descendants(root), vec![b, c, d]);
        assert!(t.speciate(1, 2, 40).is_none());
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn extinction_sticks() {
        let mut t = PhylogeneticTree::new();
        let root = t.add_species(1, 0);
        t.speciate(1, 2, 10);
        assert!(t.mark_extinct(2));
        assert!(!t.mark_extinct(2));
        assert!(t.speciate(2, 3, 20).is_none());
        assert_eq!(t.extant_nodes(), vec![root]);
    }

    #[test]
    fn newick_nests_daughters_under_parents() {
        let mut t = PhylogeneticTree::new();
        t.add_species(1, 0);
        t.speciate(1, 2, 12);
        t.speciate(1, 3, 20);
        let text = t.to_newick(|id| format!("Sp {id}"));
        assert_eq!(text, "(Sp_2:12,Sp_3:20)Sp_1;");
    }

    #[test]
    fn unknown_parent_is_ignored() {
        let mut t = PhylogeneticTree::new();
        assert!(t.speciate(9, 10, 1).is_none());
        assert!(t.is_empty());
    }
}
