//! Material network to renderer node graph, with stable node identity.
//!
//! Every translated node is keyed by its source path in a per-material
//! [`NodeIdentityCache`]. A second pass over an unchanged network resets and
//! reuses the same renderer nodes instead of creating new ones; nodes that
//! disappear from the network are destroyed by the sweep at the end of the
//! pass.

use indexmap::IndexMap;

use super::{network::MaterialNetwork, remap::remap_network};
use crate::{
    error::{DiagnosticKind, Diagnostics, RenderError, TranslateError},
    marshal::{NodeWriter, ray_flags::RENDER_NAMESPACE},
    universe::{NodeHandle, RenderUniverse},
    value::Token,
};

#[derive(Debug, Clone)]
struct CacheEntry {
    handle: NodeHandle,
    node_type: String,
    used: bool,
}

/// Source node path to renderer node, for one material.
#[derive(Debug, Default)]
pub struct NodeIdentityCache {
    entries: IndexMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acquired {
    Created,
    Reused,
}

impl NodeIdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handle(&self, path: &str) -> Option<NodeHandle> {
        self.entries.get(path).map(|e| e.handle)
    }

    pub fn handles(&self) -> Vec<NodeHandle> {
        self.entries.values().map(|e| e.handle).collect()
    }

    /// Source path and entry type of a cached node.
    fn source_of(&self, handle: NodeHandle) -> Option<(&str, &str)> {
        self.entries
            .iter()
            .find(|(_, e)| e.handle == handle)
            .map(|(path, e)| (path.as_str(), e.node_type.as_str()))
    }

    fn begin_pass(&mut self) {
        for entry in self.entries.values_mut() {
            entry.used = false;
        }
    }

    /// Node for `path` of `node_type`: the cached one reset when the type
    /// matches, a fresh one otherwise.
    fn acquire(
        &mut self,
        universe: &RenderUniverse,
        path: &str,
        node_type: &str,
        name: &str,
    ) -> Result<(NodeHandle, Acquired), RenderError> {
        if let Some(entry) = self.entries.get_mut(path) {
            if entry.node_type == node_type && universe.reset_node(entry.handle).is_ok() {
                entry.used = true;
                return Ok((entry.handle, Acquired::Reused));
            }
            universe.destroy_node(entry.handle);
            self.entries.shift_remove(path);
        }
        let handle = universe.create_node(node_type, name)?;
        self.entries.insert(
            path.to_string(),
            CacheEntry {
                handle,
                node_type: node_type.to_string(),
                used: true,
            },
        );
        Ok((handle, Acquired::Created))
    }

    /// Destroys and evicts every entry the pass did not use.
    fn sweep(&mut self, universe: &RenderUniverse) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            if !entry.used {
                universe.destroy_node(entry.handle);
            }
            entry.used
        });
        before - self.entries.len()
    }

    /// Destroys every cached node.
    pub fn clear(&mut self, universe: &RenderUniverse) {
        for (_, entry) in self.entries.drain(..) {
            universe.destroy_node(entry.handle);
        }
    }
}

/// Outcome of one translation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslatedGraph {
    pub terminals: IndexMap<Token, NodeHandle>,
    pub created: usize,
    pub reused: usize,
    pub destroyed: usize,
}

impl TranslatedGraph {
    pub fn terminal(&self, name: &str) -> Option<NodeHandle> {
        self.terminals.get(name).copied()
    }
}

/// `name:i3` addresses element 3 of array `name`.
fn input_name(input: &str) -> String {
    match input.rsplit_once(":i") {
        Some((base, index)) if !base.is_empty() && index.parse::<usize>().is_ok() => {
            format!("{base}[{index}]")
        }
        _ => input.to_string(),
    }
}

/// Native entry type of a network node.
fn native_type(node_type: &str) -> &str {
    node_type.strip_prefix(RENDER_NAMESPACE).unwrap_or(node_type)
}

fn channel_index(output: &str) -> Option<usize> {
    Some(match output {
        "x" | "r" => 0,
        "y" | "g" => 1,
        "z" | "b" => 2,
        "a" => 3,
        _ => return None,
    })
}

/// Translates the networks of one material.
pub struct ShaderGraphTranslator {
    material_id: String,
    cache: NodeIdentityCache,
    terminals: IndexMap<Token, NodeHandle>,
}

impl ShaderGraphTranslator {
    pub fn new(material_id: &str) -> Self {
        Self {
            material_id: material_id.to_string(),
            cache: NodeIdentityCache::new(),
            terminals: IndexMap::new(),
        }
    }

    pub fn cache(&self) -> &NodeIdentityCache {
        &self.cache
    }

    /// Terminals of the last successful pass.
    pub fn terminals(&self) -> &IndexMap<Token, NodeHandle> {
        &self.terminals
    }

    pub fn terminal(&self, name: &str) -> Option<NodeHandle> {
        self.terminals.get(name).copied()
    }

    pub fn translate(
        &mut self,
        universe: &RenderUniverse,
        diagnostics: &Diagnostics,
        network: &MaterialNetwork,
    ) -> Result<TranslatedGraph, TranslateError> {
        let network = remap_network(network);
        self.check_retained_terminals(universe, &network)?;
        let owner = self.material_id.as_str();
        let mut out = TranslatedGraph::default();
        let mut translated: IndexMap<&str, NodeHandle> = IndexMap::new();

        self.cache.begin_pass();
        for node in &network.nodes {
            let node_type = native_type(&node.node_type);
            if !universe.catalog().contains(node_type) {
                diagnostics.report_error(owner, &TranslateError::UnknownNodeType(node_type.to_string()));
                continue;
            }
            let name = format!("{owner}:{}", node.path);
            let (handle, acquired) = self.cache.acquire(universe, &node.path, node_type, &name)?;
            match acquired {
                Acquired::Created => out.created += 1,
                Acquired::Reused => out.reused += 1,
            }
            let writer = NodeWriter::new(universe, diagnostics, handle, owner);
            for (param, value) in &node.params {
                writer.set(param, value);
            }
            translated.insert(node.path.as_str(), handle);
        }

        for c in &network.connections {
            let (Some(&source), Some(&target)) = (
                translated.get(c.upstream.as_str()),
                translated.get(c.downstream.as_str()),
            ) else {
                diagnostics.report(
                    DiagnosticKind::UnknownParameter,
                    owner,
                    format!(
                        "connection {}.{} -> {}.{} has an untranslated end",
                        c.upstream, c.upstream_output, c.downstream, c.downstream_input
                    ),
                );
                continue;
            };
            let output_channels = universe
                .entry(source)
                .and_then(|e| e.output)
                .map_or(1, |ty| ty.channels());
            let output = channel_index(&c.upstream_output)
                .filter(|&i| output_channels > 1 && i < output_channels)
                .map(|_| c.upstream_output.to_string());
            let input = input_name(&c.downstream_input);
            if let Err(err) = universe.link_output(source, output.as_deref(), target, &input) {
                diagnostics.report(
                    DiagnosticKind::UnknownParameter,
                    owner,
                    format!("dropped connection into {}: {err}", c.downstream),
                );
            }
        }

        // A terminal whose node failed to translate keeps its previous node.
        let mut terminals = IndexMap::new();
        for (name, path) in &network.terminals {
            match translated.get(path.as_str()) {
                Some(&handle) => {
                    terminals.insert(name.clone(), handle);
                }
                None => {
                    if let Some(previous) = self.terminals.get(name) {
                        terminals.insert(name.clone(), *previous);
                    }
                }
            }
        }

        out.destroyed = self.cache.sweep(universe);
        self.terminals = terminals.clone();
        out.terminals = terminals;
        Ok(out)
    }

    /// Fails before anything is touched when a terminal would fall back to
    /// its previous node while that node is about to be evicted or
    /// recreated. The previous graph then stays committed as it was.
    fn check_retained_terminals(
        &self,
        universe: &RenderUniverse,
        network: &MaterialNetwork,
    ) -> Result<(), TranslateError> {
        let translatable = |path: &str| {
            network
                .node(path)
                .map(|n| native_type(&n.node_type))
                .filter(|ty| universe.catalog().contains(ty))
        };
        for (name, path) in &network.terminals {
            if translatable(path).is_some() {
                continue;
            }
            let Some(&previous) = self.terminals.get(name) else {
                continue;
            };
            let Some((source, node_type)) = self.cache.source_of(previous) else {
                continue;
            };
            if translatable(source) != Some(node_type) {
                return Err(TranslateError::IdentityConflict {
                    material: self.material_id.clone(),
                    node: source.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Destroys every node this material created.
    pub fn release(&mut self, universe: &RenderUniverse) {
        self.cache.clear(universe);
        self.terminals.clear();
    }
}
