use std::{collections::HashMap, fmt::Write};

use petgraph::{
    graph::{NodeIndex, UnGraph},
    visit::EdgeRef,
};

use crate::topology::collector::AdjacencyObservation;

/// Undirected multigraph of devices and the links observed between them.
///
/// Devices are keyed by name, so adding one twice is a no-op. Every observation becomes its
/// own edge; parallel links between the same pair are kept apart by their interface labels.
#[derive(Debug, Default)]
pub struct NetworkGraph {
    pub graph: UnGraph<String, String>,
    pub node_name_to_index_map: HashMap<String, NodeIndex>,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_observations(observations: &[AdjacencyObservation]) -> Self {
        let mut graph = Self::new();
        for observation in observations {
            graph.add_link(observation);
        }
        graph
    }

    pub fn add_device(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_name_to_index_map.get(name) {
            return index;
        }
        let index = self.graph.add_node(name.to_string());
        self.node_name_to_index_map.insert(name.to_string(), index);
        index
    }

    pub fn add_link(&mut self, observation: &AdjacencyObservation) {
        let local = self.add_device(&observation.local_device);
        let neighbor = self.add_device(&observation.neighbor_device);
        self.graph.add_edge(local, neighbor, observation.edge_label());
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Labels of every edge joining the two devices, in insertion order.
    #[cfg(test)]
    pub fn links_between(&self, a: &str, b: &str) -> Vec<&str> {
        let (Some(&a), Some(&b)) = (
            self.node_name_to_index_map.get(a),
            self.node_name_to_index_map.get(b),
        ) else {
            return Vec::new();
        };
        let mut labels: Vec<(usize, &str)> = self
            .graph
            .edge_references()
            .filter(|e| {
                (e.source() == a && e.target() == b) || (e.source() == b && e.target() == a)
            })
            .map(|e| (e.id().index(), e.weight().as_str()))
            .collect();
        labels.sort_by_key(|(id, _)| *id);
        labels.into_iter().map(|(_, label)| label).collect()
    }

    /// Graphviz DOT source for the graph. Nodes are identified by index and labelled by name,
    /// so empty or odd device names are still valid DOT.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("graph {\n");
        for index in self.graph.node_indices() {
            let _ = writeln!(dot, "    {} [label=\"{}\"]", index.index(), escape_label(&self.graph[index]));
        }
        for edge in self.graph.edge_references() {
            let _ = writeln!(
                dot,
                "    {} -- {} [label=\"{}\"]",
                edge.source().index(),
                edge.target().index(),
                escape_label(edge.weight())
            );
        }
        dot.push_str("}\n");
        dot
    }
}

fn escape_label(label: &str) -> String {
    let mut escaped = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(local: &str, remote: &str, local_if: &str, ip: &str, remote_if: &str) -> AdjacencyObservation {
        AdjacencyObservation {
            local_device: local.to_string(),
            neighbor_device: remote.to_string(),
            local_interface: local_if.to_string(),
            local_ip: ip.to_string(),
            neighbor_interface: remote_if.to_string(),
        }
    }

    #[test]
    fn test_empty_graph() {
        let graph = NetworkGraph::from_observations(&[]);
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.to_dot(), "graph {\n}\n");
    }

    #[test]
    fn test_nodes_are_idempotent_and_links_parallel() {
        let graph = NetworkGraph::from_observations(&[
            observation("R1", "R2", "ge-0/0/0", "10.0.0.0/30", "ge-0/0/1"),
            observation("R1", "R2", "ge-0/0/2", "10.0.0.4/30", "ge-0/0/3"),
            observation("R2", "R1", "ge-0/0/1", "10.0.0.0/30", "ge-0/0/0"),
            observation("R2", "R3", "ge-0/0/4", "10.0.0.8/30", "ge-0/0/5"),
        ]);

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(
            graph.links_between("R2", "R1"),
            vec![
                "ge-0/0/0\n10.0.0.0/30\nge-0/0/1",
                "ge-0/0/2\n10.0.0.4/30\nge-0/0/3",
                "ge-0/0/1\n10.0.0.0/30\nge-0/0/0",
            ]
        );
        assert!(graph.links_between("R1", "R3").is_empty());
    }

    #[test]
    fn test_dot_output() {
        let graph = NetworkGraph::from_observations(&[observation(
            "R1", "R2", "ge-0/0/0", "10.0.0.1", "ge-0/0/1",
        )]);
        assert_eq!(
            graph.to_dot(),
            "graph {\n    0 [label=\"R1\"]\n    1 [label=\"R2\"]\n    0 -- 1 [label=\"ge-0/0/0\\n10.0.0.1\\nge-0/0/1\"]\n}\n"
        );
    }

    #[test]
    fn test_incomplete_observation_still_renders() {
        let graph = NetworkGraph::from_observations(&[observation("R1", "", "ge-0/0/5", "10.0.0.12/30", "")]);
        assert_eq!(graph.node_count(), 2);
        assert!(graph.to_dot().contains("1 [label=\"\"]"));
    }

    #[test]
    fn test_labels_are_escaped() {
        assert_eq!(escape_label("a\"b\\c\r\nd"), "a\\\"b\\\\c\\nd");
    }
}
