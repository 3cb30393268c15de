//! In-process renderer node store.
//!
//! All node creation and mutation goes through one coarse lock, which is the
//! exclusion every primitive sync relies on when it touches shared render
//! state. Nodes are addressed by opaque [`NodeHandle`]s.

pub mod param;

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{
    catalog::{NodeEntry, ParamType, RenderCatalog},
    error::RenderError,
};

pub use param::{ArrayData, ParamArray, ParamValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u64);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Storage class of a user-declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserScope {
    Constant,
    ConstantArray,
    Uniform,
    Varying,
    Indexed,
}

impl UserScope {
    pub fn is_array(self) -> bool {
        !matches!(self, UserScope::Constant)
    }

    fn keyword(self) -> &'static str {
        match self {
            UserScope::Constant => "constant",
            UserScope::ConstantArray => "constant ARRAY",
            UserScope::Uniform => "uniform",
            UserScope::Varying => "varying",
            UserScope::Indexed => "indexed",
        }
    }
}

/// Declaration of a user parameter, e.g. `"constant ARRAY RGB"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserDeclaration {
    pub scope: UserScope,
    pub ty: ParamType,
}

impl UserDeclaration {
    pub fn new(scope: UserScope, ty: ParamType) -> Self {
        Self { scope, ty }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let scope = match words.next()? {
            "constant" => UserScope::Constant,
            "uniform" => UserScope::Uniform,
            "varying" => UserScope::Varying,
            "indexed" => UserScope::Indexed,
            _ => return None,
        };
        let mut ty_word = words.next()?;
        let scope = if scope == UserScope::Constant && ty_word == "ARRAY" {
            ty_word = words.next()?;
            UserScope::ConstantArray
        } else {
            scope
        };
        let ty = match ty_word {
            "BOOL" => ParamType::Bool,
            "BYTE" => ParamType::Byte,
            "INT" => ParamType::Int,
            "UINT" => ParamType::UInt,
            "FLOAT" => ParamType::Float,
            "VECTOR2" => ParamType::Vector2,
            "VECTOR" => ParamType::Vector,
            "RGB" => ParamType::Rgb,
            "RGBA" => ParamType::Rgba,
            "STRING" => ParamType::String,
            "MATRIX" => ParamType::Matrix,
            "NODE" => ParamType::Node,
            _ => return None,
        };
        if words.next().is_some() {
            return None;
        }
        Some(Self { scope, ty })
    }
}

impl fmt::Display for UserDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.scope.keyword(), self.ty.declaration_keyword())
    }
}

/// Link feeding a node input from another node's output (or one channel
/// of it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLink {
    pub source: NodeHandle,
    pub output: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderNode {
    pub name: String,
    pub entry: Arc<NodeEntry>,
    pub disabled: bool,
    params: HashMap<String, ParamValue>,
    user_params: HashMap<String, UserDeclaration>,
    links: HashMap<String, NodeLink>,
}

impl RenderNode {
    fn new(name: &str, entry: Arc<NodeEntry>) -> Self {
        Self {
            name: name.to_string(),
            entry,
            disabled: false,
            params: HashMap::new(),
            user_params: HashMap::new(),
            links: HashMap::new(),
        }
    }

    fn reset(&mut self) {
        self.params.clear();
        self.user_params.clear();
        self.links.clear();
        self.disabled = false;
    }

    /// Whether `input` names a built-in parameter or an element of a
    /// built-in array (`name[3]`).
    fn accepts_input(&self, input: &str) -> bool {
        if self.entry.has_param(input) {
            return true;
        }
        match split_element(input) {
            Some((base, _)) => self.entry.param(base).is_some_and(|d| d.array),
            None => false,
        }
    }
}

/// Splits `name[3]` into `("name", 3)`.
pub fn split_element(input: &str) -> Option<(&str, usize)> {
    let open = input.find('[')?;
    let inner = input[open + 1..].strip_suffix(']')?;
    Some((&input[..open], inner.parse().ok()?))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniverseStats {
    pub created: usize,
    pub destroyed: usize,
    pub live: usize,
}

#[derive(Default)]
struct UniverseInner {
    next_id: u64,
    nodes: HashMap<NodeHandle, RenderNode>,
    created: usize,
    destroyed: usize,
}

/// The renderer's shared render state.
pub struct RenderUniverse {
    catalog: Arc<RenderCatalog>,
    inner: Mutex<UniverseInner>,
}

impl RenderUniverse {
    pub fn new(catalog: Arc<RenderCatalog>) -> Self {
        Self {
            catalog,
            inner: Mutex::new(UniverseInner::default()),
        }
    }

    pub fn catalog(&self) -> &Arc<RenderCatalog> {
        &self.catalog
    }

    pub fn create_node(&self, entry: &str, name: &str) -> Result<NodeHandle, RenderError> {
        let entry = self
            .catalog
            .entry(entry)
            .cloned()
            .ok_or_else(|| RenderError::UnknownNodeEntry(entry.to_string()))?;
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let handle = NodeHandle(inner.next_id);
        inner.nodes.insert(handle, RenderNode::new(name, entry));
        inner.created += 1;
        Ok(handle)
    }

    pub fn destroy_node(&self, handle: NodeHandle) -> bool {
        let mut inner = self.inner.lock();
        if inner.nodes.remove(&handle).is_none() {
            return false;
        }
        inner.destroyed += 1;
        // Links pointing at a destroyed node are dangling; drop them.
        for node in inner.nodes.values_mut() {
            node.links.retain(|_, link| link.source != handle);
        }
        true
    }

    /// Restores every parameter to its default and drops user parameters and
    /// links. The node keeps its name and entry type.
    pub fn reset_node(&self, handle: NodeHandle) -> Result<(), RenderError> {
        self.with_node_mut(handle, RenderNode::reset)
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.inner.lock().nodes.contains_key(&handle)
    }

    pub fn entry(&self, handle: NodeHandle) -> Option<Arc<NodeEntry>> {
        self.inner.lock().nodes.get(&handle).map(|n| n.entry.clone())
    }

    pub fn entry_name(&self, handle: NodeHandle) -> Option<String> {
        self.inner.lock().nodes.get(&handle).map(|n| n.entry.name.clone())
    }

    pub fn node_name(&self, handle: NodeHandle) -> Option<String> {
        self.inner.lock().nodes.get(&handle).map(|n| n.name.clone())
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.inner
            .lock()
            .nodes
            .iter()
            .filter(|(_, n)| n.name == name)
            .map(|(h, _)| *h)
            .min()
    }

    /// Writes a built-in or previously declared user parameter. Values whose
    /// type does not fit the declaration are rejected.
    pub fn set_param(&self, handle: NodeHandle, name: &str, value: ParamValue) -> Result<(), RenderError> {
        self.with_node_mut(handle, |node| {
            let fits = if let Some(decl) = node.entry.param(name) {
                value.fits(decl.ty, decl.array)
            } else if let Some(decl) = node.user_params.get(name) {
                value.fits(decl.ty, decl.scope.is_array())
            } else {
                return Err(RenderError::UnknownParameter {
                    node: node.name.clone(),
                    param: name.to_string(),
                });
            };
            if !fits {
                return Err(RenderError::TypeMismatch {
                    node: node.name.clone(),
                    param: name.to_string(),
                });
            }
            node.params.insert(name.to_string(), value);
            Ok(())
        })?
    }

    /// Current value of a parameter, falling back to the built-in default.
    pub fn param(&self, handle: NodeHandle, name: &str) -> Option<ParamValue> {
        let inner = self.inner.lock();
        let node = inner.nodes.get(&handle)?;
        node.params
            .get(name)
            .cloned()
            .or_else(|| node.entry.param(name).map(ParamValue::default_for))
    }

    pub fn is_param_set(&self, handle: NodeHandle, name: &str) -> bool {
        self.inner
            .lock()
            .nodes
            .get(&handle)
            .is_some_and(|n| n.params.contains_key(name))
    }

    pub fn reset_param(&self, handle: NodeHandle, name: &str) -> Result<(), RenderError> {
        self.with_node_mut(handle, |node| {
            node.params.remove(name);
        })
    }

    pub fn user_param(&self, handle: NodeHandle, name: &str) -> Option<UserDeclaration> {
        self.inner
            .lock()
            .nodes
            .get(&handle)
            .and_then(|n| n.user_params.get(name).copied())
    }

    pub fn user_param_names(&self, handle: NodeHandle) -> Vec<String> {
        let inner = self.inner.lock();
        let mut names: Vec<String> = inner
            .nodes
            .get(&handle)
            .map(|n| n.user_params.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Declares a user parameter. Returns `false` when the name is already a
    /// built-in or an existing user parameter.
    pub fn declare(&self, handle: NodeHandle, name: &str, decl: UserDeclaration) -> Result<bool, RenderError> {
        self.with_node_mut(handle, |node| {
            if node.entry.has_param(name) || node.user_params.contains_key(name) {
                return false;
            }
            node.user_params.insert(name.to_string(), decl);
            true
        })
    }

    /// Removes a user parameter and its value.
    pub fn undeclare(&self, handle: NodeHandle, name: &str) -> Result<bool, RenderError> {
        self.with_node_mut(handle, |node| {
            let removed = node.user_params.remove(name).is_some();
            if removed {
                node.params.remove(name);
            }
            removed
        })
    }

    pub fn link(&self, source: NodeHandle, target: NodeHandle, input: &str) -> Result<(), RenderError> {
        self.link_output(source, None, target, input)
    }

    pub fn link_output(
        &self,
        source: NodeHandle,
        output: Option<&str>,
        target: NodeHandle,
        input: &str,
    ) -> Result<(), RenderError> {
        let mut inner = self.inner.lock();
        if !inner.nodes.contains_key(&source) {
            return Err(RenderError::InvalidHandle(source));
        }
        let node = inner
            .nodes
            .get_mut(&target)
            .ok_or(RenderError::InvalidHandle(target))?;
        if !node.accepts_input(input) {
            return Err(RenderError::UnknownParameter {
                node: node.name.clone(),
                param: input.to_string(),
            });
        }
        node.links.insert(
            input.to_string(),
            NodeLink {
                source,
                output: output.map(str::to_string),
            },
        );
        Ok(())
    }

    pub fn unlink(&self, target: NodeHandle, input: &str) -> Result<bool, RenderError> {
        self.with_node_mut(target, |node| node.links.remove(input).is_some())
    }

    pub fn link_of(&self, target: NodeHandle, input: &str) -> Option<NodeLink> {
        self.inner
            .lock()
            .nodes
            .get(&target)
            .and_then(|n| n.links.get(input).cloned())
    }

    pub fn links(&self, target: NodeHandle) -> Vec<(String, NodeLink)> {
        let inner = self.inner.lock();
        let mut links: Vec<(String, NodeLink)> = inner
            .nodes
            .get(&target)
            .map(|n| n.links.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        links.sort_by(|a, b| a.0.cmp(&b.0));
        links
    }

    pub fn set_disabled(&self, handle: NodeHandle, disabled: bool) -> Result<(), RenderError> {
        self.with_node_mut(handle, |node| node.disabled = disabled)
    }

    pub fn is_disabled(&self, handle: NodeHandle) -> bool {
        self.inner.lock().nodes.get(&handle).is_some_and(|n| n.disabled)
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn stats(&self) -> UniverseStats {
        let inner = self.inner.lock();
        UniverseStats {
            created: inner.created,
            destroyed: inner.destroyed,
            live: inner.nodes.len(),
        }
    }

    pub fn with_node<R>(&self, handle: NodeHandle, f: impl FnOnce(&RenderNode) -> R) -> Option<R> {
        self.inner.lock().nodes.get(&handle).map(f)
    }

    fn with_node_mut<R>(
        &self,
        handle: NodeHandle,
        f: impl FnOnce(&mut RenderNode) -> R,
    ) -> Result<R, RenderError> {
        let mut inner = self.inner.lock();
        let node = inner
            .nodes
            .get_mut(&handle)
            .ok_or(RenderError::InvalidHandle(handle))?;
        Ok(f(node))
    }
}
