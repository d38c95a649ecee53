//! Propnet to DOT (Graphviz) conversion.
//!
//! The generated graph follows these conventions:
//! - **Base, input and init propositions** sit at the top (source rank)
//! - **Transitions** sit at the bottom (sink rank)
//! - **Gates** are labeled `AND`, `OR`, `NOT`; propositions by their sentence
//! - Edges point from an input to the component that reads it
//!
//! # Examples
//!
//! ```
//! use ggp_rs::compile::compile;
//! use ggp_rs::dot::{to_dot, DotConfig};
//! use ggp_rs::games;
//!
//! let net = compile(&games::counting(3)).unwrap();
//! let dot = to_dot(&net, &DotConfig::default()).unwrap();
//! assert!(dot.starts_with("digraph propnet {"));
//! // Render with: dot -Tsvg propnet.dot -o propnet.svg
//! ```

use std::fmt::Write as _;

use crate::node::{Component, NodeId};
use crate::propnet::{Propnet, PropositionKind};

/// Visual options for DOT output.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for propositions (default: "ellipse")
    pub proposition_shape: &'static str,
    /// Shape for AND/OR/NOT gates (default: "box")
    pub gate_shape: &'static str,
    /// Shape for transitions (default: "diamond")
    pub transition_shape: &'static str,
    /// Shape for constants (default: "square")
    pub constant_shape: &'static str,
    /// Fill color of nodes that are true when values are supplied (default: "lightblue")
    pub true_color: &'static str,
    /// Whether to render constant nodes and their edges (default: false)
    pub show_constants: bool,
    /// Whether propositions are labeled by sentence rather than node id (default: true)
    pub sentence_labels: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            proposition_shape: "ellipse",
            gate_shape: "box",
            transition_shape: "diamond",
            constant_shape: "square",
            true_color: "lightblue",
            show_constants: false,
            sentence_labels: true,
        }
    }
}

impl DotConfig {
    pub fn with_constants(mut self, show: bool) -> Self {
        self.show_constants = show;
        self
    }

    pub fn with_sentence_labels(mut self, on: bool) -> Self {
        self.sentence_labels = on;
        self
    }
}

/// Renders the whole propnet.
pub fn to_dot(net: &Propnet, config: &DotConfig) -> Result<String, std::fmt::Error> {
    render(net, config, None)
}

/// Renders the propnet, filling nodes that are true in `values`.
///
/// `values` is a buffer as produced by [`propagate`][crate::eval::propagate].
pub fn to_dot_with_values(net: &Propnet, config: &DotConfig, values: &[bool]) -> Result<String, std::fmt::Error> {
    render(net, config, Some(values))
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

fn render(net: &Propnet, config: &DotConfig, values: Option<&[bool]>) -> Result<String, std::fmt::Error> {
    let mut dot = String::new();
    writeln!(dot, "digraph propnet {{")?;
    writeln!(dot, "rankdir=TB;")?;

    let visible = |id: NodeId| config.show_constants || !matches!(net.node(id), Component::Constant(_));
    let node_line = |dot: &mut String, id: NodeId| -> std::fmt::Result {
        let (shape, label) = match net.node(id) {
            Component::Constant(value) => (config.constant_shape, value.to_string()),
            Component::Proposition { sentence, .. } => {
                let label = if config.sentence_labels {
                    sentence.to_string()
                } else {
                    id.to_string()
                };
                (config.proposition_shape, label)
            }
            Component::And(_) => (config.gate_shape, "AND".to_string()),
            Component::Or(_) => (config.gate_shape, "OR".to_string()),
            Component::Not(_) => (config.gate_shape, "NOT".to_string()),
            Component::Transition(_) => (config.transition_shape, "T".to_string()),
        };
        let fill = match values {
            Some(values) if values[id.index()] => format!(", style=filled, fillcolor={}", config.true_color),
            _ => String::new(),
        };
        writeln!(dot, "{} [shape={}, label=\"{}\"{}];", id, shape, escape(&label), fill)
    };

    // State nodes on top.
    writeln!(dot, "{{ rank=source")?;
    for i in 0..net.len() {
        let id = NodeId::new(i);
        if net.is_state_node(id) {
            node_line(&mut dot, id)?;
        }
    }
    writeln!(dot, "}}")?;

    // Transitions at the bottom.
    writeln!(dot, "{{ rank=sink")?;
    for i in 0..net.len() {
        let id = NodeId::new(i);
        if matches!(net.node(id), Component::Transition(_)) {
            node_line(&mut dot, id)?;
        }
    }
    writeln!(dot, "}}")?;

    for i in 0..net.len() {
        let id = NodeId::new(i);
        if net.is_state_node(id) || matches!(net.node(id), Component::Transition(_)) || !visible(id) {
            continue;
        }
        node_line(&mut dot, id)?;
    }

    for i in 0..net.len() {
        let id = NodeId::new(i);
        if !visible(id) {
            continue;
        }
        for &input in net.node(id).inputs() {
            if !visible(input) {
                continue;
            }
            // Transitions feed bases across turns.
            let style = match net.proposition_kind(id) {
                Some(PropositionKind::Base) => " [style=dashed]",
                _ => "",
            };
            writeln!(dot, "{} -> {}{};", input, id, style)?;
        }
    }

    writeln!(dot, "}}")?;
    Ok(dot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::eval::{fresh_values, propagate};
    use crate::games;
    use test_log::test;

    #[test]
    fn test_to_dot_basic() {
        let net = compile(&games::counting(3)).unwrap();
        let dot = to_dot(&net, &DotConfig::default()).unwrap();
        assert!(dot.starts_with("digraph propnet {"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("label=\"(true (count 0))\""));
        assert!(dot.contains("label=\"terminal\""));
        assert!(!dot.contains("shape=square"));
    }

    #[test]
    fn test_to_dot_with_config() {
        let net = compile(&games::counting(3)).unwrap();
        let config = DotConfig::default().with_constants(true).with_sentence_labels(false);
        let dot = to_dot(&net, &config).unwrap();
        assert!(dot.contains("shape=square"));
        assert!(!dot.contains("(count 0)"));
    }

    #[test]
    fn test_to_dot_with_values() {
        let net = compile(&games::tic_tac_toe()).unwrap();
        let mut values = fresh_values(&net);
        values[net.init().index()] = true;
        propagate(&net, &mut values);
        let dot = to_dot_with_values(&net, &DotConfig::default(), &values).unwrap();
        assert!(dot.contains("fillcolor=lightblue"));
    }

    #[test]
    #[ignore]
    fn test_write_dot_file() {
        let net = compile(&games::tic_tac_toe()).unwrap();
        let dot = to_dot(&net, &DotConfig::default()).unwrap();
        std::fs::write("propnet.dot", &dot).unwrap();
        println!("DOT output: {} bytes", dot.len());
    }
}
