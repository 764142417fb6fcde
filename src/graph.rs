//! Course node-graph model.
//!
//! A course is authored as a graph of steps, but playback only supports a
//! linear sequence: exactly one START, exactly one END, and a single chain
//! of edges covering every node in between. Validation happens on every
//! create/update so stored graphs are always playable.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Start,
    Video,
    Image,
    Pdf,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Media file relative to the course content dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle_href: Option<String>,
    /// Playback seconds; required for VIDEO nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("course graph must have exactly one START node, found {0}")]
    StartCount(usize),
    #[error("course graph must have exactly one END node, found {0}")]
    EndCount(usize),
    #[error("duplicate node id `{0}`")]
    DuplicateNode(String),
    #[error("edge references unknown node `{0}`")]
    UnknownNode(String),
    #[error("node `{0}` has more than one outgoing edge")]
    Branch(String),
    #[error("sequence revisits node `{0}`")]
    Cycle(String),
    #[error("node `{0}` has no path to END")]
    Dangling(String),
    #[error("node `{0}` is not reachable from START")]
    Unreachable(String),
    #[error("video node `{0}` requires a media file and a positive duration")]
    VideoMeta(String),
}

impl CourseGraph {
    /// Walk the graph from START and return the playback order.
    pub fn sequence(&self) -> Result<Vec<&GraphNode>, GraphError> {
        let mut by_id: HashMap<&str, &GraphNode> = HashMap::new();
        for node in &self.nodes {
            if by_id.insert(node.id.as_str(), node).is_some() {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        let starts: Vec<&GraphNode> = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Start)
            .collect();
        if starts.len() != 1 {
            return Err(GraphError::StartCount(starts.len()));
        }
        let ends = self.nodes.iter().filter(|n| n.kind == NodeKind::End).count();
        if ends != 1 {
            return Err(GraphError::EndCount(ends));
        }

        let mut next: HashMap<&str, &str> = HashMap::new();
        for edge in &self.edges {
            if !by_id.contains_key(edge.from.as_str()) {
                return Err(GraphError::UnknownNode(edge.from.clone()));
            }
            if !by_id.contains_key(edge.to.as_str()) {
                return Err(GraphError::UnknownNode(edge.to.clone()));
            }
            if next.insert(edge.from.as_str(), edge.to.as_str()).is_some() {
                return Err(GraphError::Branch(edge.from.clone()));
            }
        }

        for node in &self.nodes {
            if node.kind == NodeKind::Video {
                let has_media = node.media_href.as_deref().is_some_and(|h| !h.is_empty());
                let has_duration = node.duration_secs.is_some_and(|d| d > 0);
                if !has_media || !has_duration {
                    return Err(GraphError::VideoMeta(node.id.clone()));
                }
            }
        }

        let mut order: Vec<&GraphNode> = Vec::with_capacity(self.nodes.len());
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = starts[0];
        loop {
            if !seen.insert(current.id.as_str()) {
                return Err(GraphError::Cycle(current.id.clone()));
            }
            order.push(current);
            if current.kind == NodeKind::End {
                break;
            }
            match next.get(current.id.as_str()) {
                Some(next_id) => current = by_id[next_id],
                None => return Err(GraphError::Dangling(current.id.clone())),
            }
        }

        if order.len() != self.nodes.len() {
            let stray = self
                .nodes
                .iter()
                .find(|n| !seen.contains(n.id.as_str()))
                .map(|n| n.id.clone())
                .unwrap_or_default();
            return Err(GraphError::Unreachable(stray));
        }

        Ok(order)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        self.sequence().map(|_| ())
    }

    /// Course duration is the sum of VIDEO-node durations.
    pub fn total_duration_secs(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Video)
            .filter_map(|n| n.duration_secs)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: NodeKind) -> GraphNode {
        GraphNode {
            id: id.into(),
            kind,
            title: None,
            media_href: None,
            subtitle_href: None,
            duration_secs: None,
        }
    }

    fn video(id: &str, secs: i32) -> GraphNode {
        GraphNode {
            media_href: Some(format!("{id}.mp4")),
            duration_secs: Some(secs),
            ..node(id, NodeKind::Video)
        }
    }

    fn edge(from: &str, to: &str) -> GraphEdge {
        GraphEdge {
            from: from.into(),
            to: to.into(),
        }
    }

    fn linear_course() -> CourseGraph {
        CourseGraph {
            nodes: vec![
                node("start", NodeKind::Start),
                video("v1", 120),
                node("img", NodeKind::Image),
                video("v2", 45),
                node("end", NodeKind::End),
            ],
            edges: vec![
                edge("start", "v1"),
                edge("v1", "img"),
                edge("img", "v2"),
                edge("v2", "end"),
            ],
        }
    }

    #[test]
    fn accepts_linear_chain_in_order() {
        let graph = linear_course();
        let order = graph.sequence().unwrap();
        let ids: Vec<&str> = order.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["start", "v1", "img", "v2", "end"]);
    }

    #[test]
    fn duration_is_sum_of_video_nodes() {
        assert_eq!(linear_course().total_duration_secs(), 165);
    }

    #[test]
    fn rejects_missing_start() {
        let mut graph = linear_course();
        graph.nodes.retain(|n| n.kind != NodeKind::Start);
        assert_eq!(graph.validate(), Err(GraphError::StartCount(0)));
    }

    #[test]
    fn rejects_two_ends() {
        let mut graph = linear_course();
        graph.nodes.push(node("end2", NodeKind::End));
        assert_eq!(graph.validate(), Err(GraphError::EndCount(2)));
    }

    #[test]
    fn rejects_duplicate_node_id() {
        let mut graph = linear_course();
        graph.nodes.push(video("v1", 10));
        assert_eq!(
            graph.validate(),
            Err(GraphError::DuplicateNode("v1".into()))
        );
    }

    #[test]
    fn rejects_edge_to_unknown_node() {
        let mut graph = linear_course();
        graph.edges.push(edge("img", "ghost"));
        assert_eq!(graph.validate(), Err(GraphError::UnknownNode("ghost".into())));
    }

    #[test]
    fn rejects_branching() {
        let mut graph = linear_course();
        graph.edges.push(edge("v1", "v2"));
        assert_eq!(graph.validate(), Err(GraphError::Branch("v1".into())));
    }

    #[test]
    fn rejects_cycle() {
        let graph = CourseGraph {
            nodes: vec![
                node("start", NodeKind::Start),
                video("v1", 10),
                node("end", NodeKind::End),
            ],
            edges: vec![edge("start", "v1"), edge("v1", "start")],
        };
        assert_eq!(graph.validate(), Err(GraphError::Cycle("start".into())));
    }

    #[test]
    fn rejects_chain_that_stops_short_of_end() {
        let mut graph = linear_course();
        graph.edges.retain(|e| e.from != "v2");
        assert_eq!(graph.validate(), Err(GraphError::Dangling("v2".into())));
    }

    #[test]
    fn rejects_node_outside_the_chain() {
        let mut graph = linear_course();
        graph.nodes.push(video("orphan", 30));
        assert_eq!(
            graph.validate(),
            Err(GraphError::Unreachable("orphan".into()))
        );
    }

    #[test]
    fn rejects_video_without_duration() {
        let mut graph = linear_course();
        for n in graph.nodes.iter_mut() {
            if n.id == "v1" {
                n.duration_secs = None;
            }
        }
        assert_eq!(graph.validate(), Err(GraphError::VideoMeta("v1".into())));
    }

    #[test]
    fn node_kind_wire_format() {
        assert_eq!(serde_json::to_string(&NodeKind::Pdf).unwrap(), "\"PDF\"");
        assert_eq!(
            serde_json::from_str::<NodeKind>("\"START\"").unwrap(),
            NodeKind::Start
        );
    }
}
