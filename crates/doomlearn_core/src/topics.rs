//! crates/doomlearn_core/src/topics.rs
//!
//! A course's concept tree, stored as a flat arena keyed by topic id.
//!
//! Parent links are trusted as given. Cycles are not validated here; walks that
//! follow parent links stop when they revisit a node.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::Topic;

#[derive(Debug, Clone, Default)]
pub struct TopicTree {
    topics: Vec<Topic>,
    index: HashMap<Uuid, usize>,
}

impl TopicTree {
    pub fn new(topics: Vec<Topic>) -> Self {
        let index = topics
            .iter()
            .enumerate()
            .map(|(i, topic)| (topic.id, i))
            .collect();
        Self { topics, index }
    }

    pub fn get(&self, id: Uuid) -> Option<&Topic> {
        self.index.get(&id).map(|&i| &self.topics[i])
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Leaf topics in ascending `order_index`, at most `cap` of them.
    pub fn leaf_topics(&self, cap: usize) -> Vec<&Topic> {
        let mut leaves: Vec<&Topic> = self.topics.iter().filter(|t| t.is_leaf).collect();
        leaves.sort_by_key(|t| t.order_index);
        leaves.truncate(cap);
        leaves
    }

    /// Titles from the root down to `id`, e.g. for prompts. Stops at a repeated node.
    pub fn breadcrumb(&self, id: Uuid) -> Vec<&str> {
        let mut titles = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.get(id);
        while let Some(topic) = cursor {
            if !seen.insert(topic.id) {
                break;
            }
            titles.push(topic.title.as_str());
            cursor = topic.parent_id.and_then(|parent| self.get(parent));
        }
        titles.reverse();
        titles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn topic(title: &str, parent: Option<Uuid>, order: i32, leaf: bool) -> Topic {
        Topic {
            id: Uuid::new_v4(),
            course_id: Uuid::nil(),
            parent_id: parent,
            title: title.to_string(),
            order_index: order,
            is_leaf: leaf,
        }
    }

    #[test]
    fn leaves_are_ordered_and_capped() {
        let root = topic("Biology", None, 0, false);
        let cells = topic("Cells", Some(root.id), 2, true);
        let dna = topic("DNA", Some(root.id), 1, true);
        let energy = topic("Energy", Some(root.id), 3, true);
        let tree = TopicTree::new(vec![root, cells, dna, energy]);

        let titles: Vec<_> = tree.leaf_topics(8).iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["DNA", "Cells", "Energy"]);
        assert_eq!(tree.leaf_topics(2).len(), 2);
    }

    #[test]
    fn breadcrumb_walks_to_the_root() {
        let root = topic("Biology", None, 0, false);
        let cells = topic("Cells", Some(root.id), 0, false);
        let membrane = topic("Membrane", Some(cells.id), 0, true);
        let id = membrane.id;
        let tree = TopicTree::new(vec![root, cells, membrane]);
        assert_eq!(tree.breadcrumb(id), vec!["Biology", "Cells", "Membrane"]);
    }

    #[test]
    fn breadcrumb_survives_a_cycle() {
        let mut a = topic("A", None, 0, true);
        let b = topic("B", Some(a.id), 0, true);
        a.parent_id = Some(b.id);
        let id = a.id;
        let tree = TopicTree::new(vec![a, b]);
        assert_eq!(tree.breadcrumb(id), vec!["B", "A"]);
    }
}
