//! Renderer reflection catalog: node entry types and their declared
//! parameters, loaded from the bundled `assets/node-catalog.json`.

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

const DEFAULT_NODE_CATALOG_JSON: &str = include_str!("../assets/node-catalog.json");

/// Declared type of a renderer parameter (or of an array's elements).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Bool,
    Byte,
    Int,
    #[serde(rename = "uint")]
    UInt,
    Float,
    Vector2,
    Vector,
    Rgb,
    Rgba,
    String,
    Enum,
    Matrix,
    Node,
}

impl ParamType {
    /// Number of float channels for vector-like types.
    pub fn channels(self) -> usize {
        match self {
            ParamType::Vector2 => 2,
            ParamType::Vector | ParamType::Rgb => 3,
            ParamType::Rgba => 4,
            _ => 1,
        }
    }

    /// Type keyword used in user-data declarations (`"constant ARRAY RGB"`).
    pub fn declaration_keyword(self) -> &'static str {
        match self {
            ParamType::Bool => "BOOL",
            ParamType::Byte => "BYTE",
            ParamType::Int => "INT",
            ParamType::UInt => "UINT",
            ParamType::Float => "FLOAT",
            ParamType::Vector2 => "VECTOR2",
            ParamType::Vector => "VECTOR",
            ParamType::Rgb => "RGB",
            ParamType::Rgba => "RGBA",
            ParamType::String | ParamType::Enum => "STRING",
            ParamType::Matrix => "MATRIX",
            ParamType::Node => "NODE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Options,
    Shape,
    Light,
    Shader,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParamDecl {
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub enum_values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeEntry {
    #[serde(skip)]
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub output: Option<ParamType>,
    #[serde(default)]
    pub params: HashMap<String, ParamDecl>,
}

impl NodeEntry {
    pub fn param(&self, name: &str) -> Option<&ParamDecl> {
        self.params.get(name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawCatalog {
    #[allow(dead_code)]
    version: String,
    nodes: HashMap<String, NodeEntry>,
}

/// Read-only table of every node entry the renderer exposes.
#[derive(Debug, Clone, Default)]
pub struct RenderCatalog {
    entries: HashMap<String, Arc<NodeEntry>>,
}

impl RenderCatalog {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawCatalog =
            serde_json::from_str(json).map_err(|e| anyhow!("failed to parse node catalog: {e}"))?;

        let mut errors: Vec<String> = Vec::new();
        let mut entries = HashMap::with_capacity(raw.nodes.len());
        for (name, mut entry) in raw.nodes {
            for (param_name, decl) in &entry.params {
                if decl.ty == ParamType::Enum && decl.enum_values.is_empty() {
                    errors.push(format!("{name}.{param_name}: enum parameter without enum_values"));
                }
                if decl.ty != ParamType::Enum && !decl.enum_values.is_empty() {
                    errors.push(format!("{name}.{param_name}: enum_values on a non-enum parameter"));
                }
            }
            if entry.output == Some(ParamType::Node) {
                errors.push(format!("{name}: node entries cannot output a node reference"));
            }
            entry.name = name.clone();
            entries.insert(name, Arc::new(entry));
        }

        if !errors.is_empty() {
            errors.sort();
            bail!("invalid node catalog:\n{}", errors.join("\n"));
        }
        Ok(Self { entries })
    }

    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read node catalog {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("failed to load node catalog {}", path.display()))
    }

    pub fn entry(&self, name: &str) -> Option<&Arc<NodeEntry>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn load_default_catalog() -> Result<RenderCatalog> {
    RenderCatalog::from_json_str(DEFAULT_NODE_CATALOG_JSON)
        .context("bundled assets/node-catalog.json is invalid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_loads() {
        let catalog = load_default_catalog().expect("bundled catalog");
        let mesh = catalog.entry("polymesh").expect("polymesh entry");
        assert_eq!(mesh.name, "polymesh");
        assert_eq!(mesh.kind, NodeKind::Shape);
        let vlist = mesh.param("vlist").unwrap();
        assert_eq!(vlist.ty, ParamType::Vector);
        assert!(vlist.array);
        assert_eq!(catalog.entry("image").unwrap().output, Some(ParamType::Rgba));
    }

    #[test]
    fn test_enum_without_values_is_rejected() {
        let json = r#"{
            "version": "1.0",
            "nodes": {
                "bad": { "kind": "shader", "params": { "mode": { "type": "enum" } } }
            }
        }"#;
        let err = RenderCatalog::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("bad.mode"));
    }

    #[test]
    fn test_uint_type_name_parses() {
        let json = r#"{
            "version": "1.0",
            "nodes": { "n": { "kind": "shape", "params": { "ids": { "type": "uint", "array": true } } } }
        }"#;
        let catalog = RenderCatalog::from_json_str(json).unwrap();
        assert_eq!(catalog.entry("n").unwrap().param("ids").unwrap().ty, ParamType::UInt);
    }
}
