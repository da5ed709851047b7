//! Outline-to-graph compiler.
//!
//! Turns indentation-structured bullet text (as produced by an upstream
//! text generator) into a deduplicated node/edge forest. Compilation is a
//! two-stage pipeline:
//!
//! 1. **Parse** ([`parse_outline`], then id assignment and parent linking)
//!    builds whatever graph the text actually describes.
//! 2. **Fallback** ([`apply_fallback`]) repairs a graph that is empty or
//!    disconnected, so callers always receive something renderable.
//!
//! There is no error path: every input maps to some valid graph.
//!
//! # Contract
//!
//! - Only lines whose first non-blank character is a bullet marker are
//!   kept: `-`, `*`, `+`, `•` followed by whitespace, or a number followed
//!   by `.` or `)` and whitespace. Everything else is ignored.
//! - `depth = leading_spaces / 2`, rounded down. A tab counts as two spaces.
//!   Odd indentation is accepted as-is: three spaces is depth 1, five is
//!   depth 2. Indentation does not need to be consistent across lines.
//! - The label is the text after the marker, trimmed, with `**` emphasis
//!   markers removed. Lines whose label ends up empty are dropped.
//! - The first occurrence of a label is its own node id. Later occurrences
//!   get `"{label} (2)"`, `"{label} (3)"`, ... skipping any id already taken,
//!   so ids are unique while display labels may repeat.
//! - A node's parent is the nearest preceding node with a strictly smaller
//!   depth. Nodes with no such predecessor are roots.
//!
//! # Fallbacks
//!
//! - **No nodes**: a two-node graph. The root is the first sentence of the
//!   summary (text before the first `.`), or [`PLACEHOLDER_ROOT`]; the child
//!   is a truncated excerpt of the summary, or [`PLACEHOLDER_CHILD`].
//! - **Several nodes, no edges**: the first node becomes the parent of
//!   every other node (a star), with depths rewritten to 0 and 1.
//!
//! # Example
//!
//! ```rust
//! use paperlens_core::outline::compile_outline;
//!
//! let graph = compile_outline("- A\n  - B\n    - C\n  - D", "");
//! let edges: Vec<(&str, &str)> = graph
//!     .edges
//!     .iter()
//!     .map(|e| (e.source.as_str(), e.target.as_str()))
//!     .collect();
//! assert_eq!(edges, vec![("A", "B"), ("B", "C"), ("A", "D")]);
//! ```

use std::collections::{HashMap, HashSet};

use serde::Serialize;

/// Root label used by the empty-outline fallback when the summary is empty.
pub const PLACEHOLDER_ROOT: &str = "Document Overview";

/// Child label used by the empty-outline fallback when the summary is empty.
pub const PLACEHOLDER_CHILD: &str = "No outline available";

/// Default length, in characters, of the summary excerpt in the fallback.
pub const DEFAULT_EXCERPT_CHARS: usize = 120;

/// Title of the synthetic root [`OutlineGraph::to_tree`] adds over a forest.
pub const FOREST_ROOT_TITLE: &str = "Outline";

const BULLET_MARKERS: &[char] = &['-', '*', '+', '•'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineNode {
    /// Unique within one compiled graph.
    pub id: String,
    pub depth: usize,
    /// Display text; may repeat across nodes.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineEdge {
    pub source: String,
    pub target: String,
    pub weight: u32,
}

impl OutlineEdge {
    fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            weight: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutlineGraph {
    pub nodes: Vec<OutlineNode>,
    pub edges: Vec<OutlineEdge>,
}

/// Nested view of an [`OutlineGraph`], the shape mind-map front ends render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MindMapNode {
    pub title: String,
    pub children: Vec<MindMapNode>,
}

/// One retained bullet line before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineLine {
    pub depth: usize,
    pub label: String,
}

/// Compile with the default excerpt length.
pub fn compile_outline(text: &str, fallback_summary: &str) -> OutlineGraph {
    compile_outline_with(text, fallback_summary, DEFAULT_EXCERPT_CHARS)
}

/// Parse `text` into a graph, then apply the fallback policy.
pub fn compile_outline_with(
    text: &str,
    fallback_summary: &str,
    excerpt_chars: usize,
) -> OutlineGraph {
    let parsed = build_graph(parse_outline(text));
    apply_fallback(parsed, fallback_summary, excerpt_chars)
}

/// Keep bullet lines and measure their depth. Never fails.
pub fn parse_outline(text: &str) -> Vec<OutlineLine> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<OutlineLine> {
    let mut indent = 0usize;
    for c in line.chars() {
        match c {
            '\t' => indent += 2,
            c if c.is_whitespace() => indent += 1,
            _ => break,
        }
    }

    let rest = line.trim_start();
    let after_marker = strip_marker(rest)?;
    let label = after_marker.replace("**", "").trim().to_string();
    if label.is_empty() {
        return None;
    }

    Some(OutlineLine {
        depth: indent / 2,
        label,
    })
}

/// Returns the text after a bullet marker, or `None` if `rest` does not
/// start with one. The marker must be followed by whitespace or end the
/// line, so `**bold**` and `---` rules are not bullets.
fn strip_marker(rest: &str) -> Option<&str> {
    let first = rest.chars().next()?;

    let marker_end = if BULLET_MARKERS.contains(&first) {
        first.len_utf8()
    } else if first.is_ascii_digit() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        match rest[digits_end..].chars().next() {
            Some('.') | Some(')') => digits_end + 1,
            _ => return None,
        }
    } else {
        return None;
    };

    let after = &rest[marker_end..];
    match after.chars().next() {
        None => Some(after),
        Some(c) if c.is_whitespace() => Some(after),
        Some(_) => None,
    }
}

fn build_graph(lines: Vec<OutlineLine>) -> OutlineGraph {
    let nodes = assign_ids(lines);
    let edges = link_parents(&nodes);
    OutlineGraph { nodes, edges }
}

/// Give every line a unique id, keeping first occurrences verbatim.
fn assign_ids(lines: Vec<OutlineLine>) -> Vec<OutlineNode> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut nodes = Vec::with_capacity(lines.len());

    for line in lines {
        let count = seen.entry(line.label.clone()).or_insert(0);
        *count += 1;

        let mut id = line.label.clone();
        let mut ordinal = (*count).max(2);
        while taken.contains(&id) {
            id = format!("{} ({})", line.label, ordinal);
            ordinal += 1;
        }
        taken.insert(id.clone());

        nodes.push(OutlineNode {
            id,
            depth: line.depth,
            label: line.label,
        });
    }

    nodes
}

/// Link each node to the nearest preceding node of strictly smaller depth.
fn link_parents(nodes: &[OutlineNode]) -> Vec<OutlineEdge> {
    let mut stack: Vec<(usize, &str)> = Vec::new();
    let mut edges = Vec::new();

    for node in nodes {
        while stack
            .last()
            .is_some_and(|(depth, _)| *depth >= node.depth)
        {
            stack.pop();
        }
        if let Some((_, parent)) = stack.last() {
            edges.push(OutlineEdge::new(parent, &node.id));
        }
        stack.push((node.depth, node.id.as_str()));
    }

    edges
}

/// Repair an empty or disconnected graph. Well-formed graphs pass through.
pub fn apply_fallback(
    graph: OutlineGraph,
    fallback_summary: &str,
    excerpt_chars: usize,
) -> OutlineGraph {
    if graph.nodes.is_empty() {
        return summary_graph(fallback_summary, excerpt_chars);
    }
    if graph.edges.is_empty() && graph.nodes.len() > 1 {
        return star_graph(graph.nodes);
    }
    graph
}

fn summary_graph(summary: &str, excerpt_chars: usize) -> OutlineGraph {
    let summary = summary.trim();

    let first_sentence = summary.split('.').next().unwrap_or("").trim();
    let root = if first_sentence.is_empty() {
        PLACEHOLDER_ROOT.to_string()
    } else {
        first_sentence.to_string()
    };
    let child = if summary.is_empty() {
        PLACEHOLDER_CHILD.to_string()
    } else {
        excerpt(summary, excerpt_chars)
    };

    build_graph(vec![
        OutlineLine {
            depth: 0,
            label: root,
        },
        OutlineLine {
            depth: 1,
            label: child,
        },
    ])
}

fn star_graph(mut nodes: Vec<OutlineNode>) -> OutlineGraph {
    let root_id = nodes[0].id.clone();
    let mut edges = Vec::with_capacity(nodes.len() - 1);
    for (i, node) in nodes.iter_mut().enumerate() {
        if i == 0 {
            node.depth = 0;
        } else {
            node.depth = 1;
            edges.push(OutlineEdge::new(&root_id, &node.id));
        }
    }
    OutlineGraph { nodes, edges }
}

/// Cut `text` to at most `max_chars` characters, preferring a word boundary,
/// and mark the cut with `...`.
fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end())
}

impl OutlineGraph {
    /// Nodes with no incoming edge, in document order.
    pub fn roots(&self) -> Vec<&OutlineNode> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.target.as_str()).collect();
        self.nodes
            .iter()
            .filter(|n| !targets.contains(n.id.as_str()))
            .collect()
    }

    /// Nest the forest into a single tree.
    ///
    /// A single root becomes the tree root. Several roots are placed under a
    /// synthetic [`FOREST_ROOT_TITLE`] node, as is an empty graph.
    pub fn to_tree(&self) -> MindMapNode {
        let mut children: HashMap<&str, Vec<&OutlineNode>> = HashMap::new();
        let by_id: HashMap<&str, &OutlineNode> =
            self.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        for edge in &self.edges {
            if let Some(target) = by_id.get(edge.target.as_str()) {
                children
                    .entry(edge.source.as_str())
                    .or_default()
                    .push(*target);
            }
        }

        let roots = self.roots();
        match roots.as_slice() {
            [only] => nest(only, &children),
            _ => MindMapNode {
                title: FOREST_ROOT_TITLE.to_string(),
                children: roots.iter().map(|r| nest(r, &children)).collect(),
            },
        }
    }
}

fn nest(node: &OutlineNode, children: &HashMap<&str, Vec<&OutlineNode>>) -> MindMapNode {
    MindMapNode {
        title: node.label.clone(),
        children: children
            .get(node.id.as_str())
            .map(|kids| kids.iter().map(|k| nest(k, children)).collect())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(graph: &OutlineGraph) -> Vec<&str> {
        graph.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    fn edge_pairs(graph: &OutlineGraph) -> Vec<(&str, &str)> {
        graph
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect()
    }

    #[test]
    fn test_well_formed_outline() {
        let graph = compile_outline("- A\n  - B\n    - C\n  - D", "");
        assert_eq!(ids(&graph), vec!["A", "B", "C", "D"]);
        let depths: Vec<usize> = graph.nodes.iter().map(|n| n.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 1]);
        assert_eq!(edge_pairs(&graph), vec![("A", "B"), ("B", "C"), ("A", "D")]);
        assert!(graph.edges.iter().all(|e| e.weight == 1));
    }

    #[test]
    fn test_duplicate_labels_get_unique_ids() {
        let graph = compile_outline("- X\n- X\n- X", "");
        assert_eq!(ids(&graph), vec!["X", "X (2)", "X (3)"]);
        assert!(graph.nodes.iter().all(|n| n.label == "X"));
    }

    #[test]
    fn test_dedup_skips_ids_taken_by_real_labels() {
        let graph = compile_outline("- X (2)\n- X\n- X", "");
        assert_eq!(ids(&graph), vec!["X (2)", "X", "X (3)"]);
    }

    #[test]
    fn test_empty_outline_uses_summary() {
        let graph = compile_outline("", "Widgets improve throughput. See details.");
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].label, "Widgets improve throughput");
        assert_eq!(
            edge_pairs(&graph),
            vec![(
                "Widgets improve throughput",
                "Widgets improve throughput. See details."
            )]
        );
    }

    #[test]
    fn test_empty_outline_and_summary_uses_placeholders() {
        let graph = compile_outline("no bullets here\n\n", "   ");
        assert_eq!(ids(&graph), vec![PLACEHOLDER_ROOT, PLACEHOLDER_CHILD]);
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_summary_without_period_dedups_child() {
        let graph = compile_outline("", "Just one clause");
        assert_eq!(ids(&graph), vec!["Just one clause", "Just one clause (2)"]);
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_long_summary_is_truncated() {
        let summary = format!("Short root. {}", "word ".repeat(100));
        let graph = compile_outline_with("", &summary, 40);
        let child = &graph.nodes[1].label;
        assert!(child.ends_with("..."));
        assert!(child.chars().count() <= 43);
    }

    #[test]
    fn test_flat_outline_becomes_star() {
        let graph = compile_outline("- First\n- Second\n- Third", "");
        assert_eq!(
            edge_pairs(&graph),
            vec![("First", "Second"), ("First", "Third")]
        );
        let depths: Vec<usize> = graph.nodes.iter().map(|n| n.depth).collect();
        assert_eq!(depths, vec![0, 1, 1]);
    }

    #[test]
    fn test_single_node_passes_through() {
        let graph = compile_outline("- Lonely", "ignored summary.");
        assert_eq!(ids(&graph), vec!["Lonely"]);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_odd_indentation_rounds_down() {
        let graph = compile_outline("- Root\n   - Three\n     - Five\n - One", "");
        let depths: Vec<usize> = graph.nodes.iter().map(|n| n.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 0]);
        assert_eq!(edge_pairs(&graph), vec![("Root", "Three"), ("Three", "Five")]);
    }

    #[test]
    fn test_tabs_and_other_markers() {
        let graph = compile_outline("* Top\n\t+ Child\n\t\t1. Grandchild\n\t• Sibling", "");
        assert_eq!(ids(&graph), vec!["Top", "Child", "Grandchild", "Sibling"]);
        assert_eq!(
            edge_pairs(&graph),
            vec![("Top", "Child"), ("Child", "Grandchild"), ("Top", "Sibling")]
        );
    }

    #[test]
    fn test_non_bullet_lines_ignored() {
        let text = "# Mind map\n**Bold intro**\n---\n- Kept\n  plain continuation\n  - **Child**\n-\n2020 was good";
        let graph = compile_outline(text, "");
        assert_eq!(ids(&graph), vec!["Kept", "Child"]);
        assert_eq!(edge_pairs(&graph), vec![("Kept", "Child")]);
    }

    #[test]
    fn test_every_non_root_has_one_parent() {
        let graph = compile_outline("- A\n    - deep\n  - mid\n- B\n  - b1\n  - b1", "");
        let mut incoming: HashMap<&str, usize> = HashMap::new();
        for e in &graph.edges {
            *incoming.entry(e.target.as_str()).or_default() += 1;
        }
        for node in &graph.nodes {
            let n = incoming.get(node.id.as_str()).copied().unwrap_or(0);
            if node.depth == 0 {
                assert_eq!(n, 0, "root {} has a parent", node.id);
            } else {
                assert_eq!(n, 1, "node {} parent count", node.id);
            }
        }
    }

    #[test]
    fn test_to_tree_single_root() {
        let tree = compile_outline("- A\n  - B\n    - C\n  - D", "").to_tree();
        assert_eq!(tree.title, "A");
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].title, "B");
        assert_eq!(tree.children[0].children[0].title, "C");
        assert_eq!(tree.children[1].title, "D");
    }

    #[test]
    fn test_to_tree_forest_gets_synthetic_root() {
        let tree = compile_outline("- A\n  - a\n- B\n  - b", "").to_tree();
        assert_eq!(tree.title, FOREST_ROOT_TITLE);
        let titles: Vec<&str> = tree.children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn test_graph_serializes() {
        let graph = compile_outline("- A\n  - B", "");
        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["edges"][0]["source"], "A");
        assert_eq!(json["edges"][0]["weight"], 1);
        assert_eq!(json["nodes"][1]["depth"], 1);
    }
}
