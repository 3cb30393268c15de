//! Host-side material networks.

use indexmap::IndexMap;

use crate::value::{Token, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderNode {
    pub path: String,
    pub node_type: Token,
    pub params: IndexMap<Token, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderConnection {
    pub upstream: String,
    pub upstream_output: Token,
    pub downstream: String,
    pub downstream_input: Token,
}

/// Nodes, connections and named terminals of one material. Acyclic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialNetwork {
    pub nodes: Vec<ShaderNode>,
    pub connections: Vec<ShaderConnection>,
    /// Terminal name (`surface`, `displacement`, `volume`) to node path.
    pub terminals: IndexMap<Token, String>,
}

impl MaterialNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node<'a>(
        &mut self,
        path: &str,
        node_type: &str,
        params: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> &mut Self {
        self.nodes.push(ShaderNode {
            path: path.to_string(),
            node_type: Token::new(node_type),
            params: params.into_iter().map(|(k, v)| (Token::new(k), v)).collect(),
        });
        self
    }

    pub fn connect(&mut self, upstream: &str, output: &str, downstream: &str, input: &str) -> &mut Self {
        self.connections.push(ShaderConnection {
            upstream: upstream.to_string(),
            upstream_output: Token::new(output),
            downstream: downstream.to_string(),
            downstream_input: Token::new(input),
        });
        self
    }

    pub fn set_terminal(&mut self, name: &str, path: &str) -> &mut Self {
        self.terminals.insert(Token::new(name), path.to_string());
        self
    }

    pub fn node(&self, path: &str) -> Option<&ShaderNode> {
        self.nodes.iter().find(|n| n.path == path)
    }

    pub fn node_mut(&mut self, path: &str) -> Option<&mut ShaderNode> {
        self.nodes.iter_mut().find(|n| n.path == path)
    }

    /// Connection feeding `input` of `node`.
    pub fn input_connection(&self, node: &str, input: &str) -> Option<&ShaderConnection> {
        self.connections
            .iter()
            .find(|c| c.downstream == node && c.downstream_input == input)
    }
}
