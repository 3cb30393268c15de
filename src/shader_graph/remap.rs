//! Rewrites of portable shading nodes into renderer-native ones.
//!
//! Rules run on a copy of the network before any renderer node exists.
//! Defaults are injected before renames so authored values overwrite them.

use glam::{Mat4, Quat, Vec3};

use super::network::MaterialNetwork;
use crate::{
    marshal::convert,
    value::{Token, Value},
};

/// Rule applied to every node of one source type.
pub type RemapRule = fn(&mut NodeEditor<'_>);

/// Edits one node of a network, keeping incoming connections in step with
/// parameter renames.
pub struct NodeEditor<'a> {
    network: &'a mut MaterialNetwork,
    index: usize,
}

impl<'a> NodeEditor<'a> {
    pub fn new(network: &'a mut MaterialNetwork, index: usize) -> Self {
        Self { network, index }
    }

    fn path(&self) -> &str {
        &self.network.nodes[self.index].path
    }

    pub fn node_type(&self) -> &str {
        &self.network.nodes[self.index].node_type
    }

    pub fn set_type(&mut self, node_type: &str) {
        self.network.nodes[self.index].node_type = Token::new(node_type);
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.network.nodes[self.index].params.get(name)
    }

    pub fn set_param(&mut self, name: &str, value: impl Into<Value>) {
        self.network.nodes[self.index]
            .params
            .insert(Token::new(name), value.into());
    }

    /// Moves the value and the incoming connections of `from` to `to`.
    pub fn rename(&mut self, from: &str, to: &str) {
        let node = &mut self.network.nodes[self.index];
        if let Some(value) = node.params.shift_remove(from) {
            node.params.insert(Token::new(to), value);
        }
        let path = node.path.clone();
        for c in &mut self.network.connections {
            if c.downstream == path && c.downstream_input == from {
                c.downstream_input = Token::new(to);
            }
        }
    }

    /// Removes the value and the incoming connections of `name`.
    pub fn drop_param(&mut self, name: &str) {
        self.network.nodes[self.index].params.shift_remove(name);
        let path = self.path().to_string();
        self.network
            .connections
            .retain(|c| !(c.downstream == path && c.downstream_input == name));
    }

    fn text_param(&self, name: &str) -> Option<String> {
        self.param(name).and_then(convert::to_text)
    }
}

fn preview_surface(node: &mut NodeEditor<'_>) {
    node.set_type("standard_surface");
    node.set_param("base_color", Value::Vec3f([0.18; 3]));
    node.set_param("base", 1.0f32);
    node.set_param("emission", 1.0f32);
    node.set_param("emission_color", Value::Vec3f([0.0; 3]));
    node.set_param("specular_color", Value::Vec3f([1.0; 3]));
    node.set_param("specular_roughness", 0.5f32);
    node.set_param("specular_IOR", 1.5f32);
    node.set_param("coat", 0.0f32);
    node.set_param("coat_roughness", 0.01f32);

    let specular_workflow = node
        .param("useSpecularWorkflow")
        .and_then(convert::to_int)
        .is_some_and(|v| v == 1);
    if specular_workflow {
        node.rename("specularColor", "specular_color");
        node.drop_param("metallic");
    } else {
        node.rename("metallic", "metalness");
        node.drop_param("specularColor");
    }
    node.drop_param("useSpecularWorkflow");

    if let Some(Value::Float(opacity)) = node.param("opacity").cloned() {
        node.set_param("opacity", Value::Vec3f([opacity; 3]));
    }

    node.rename("diffuseColor", "base_color");
    node.rename("emissiveColor", "emission_color");
    node.rename("roughness", "specular_roughness");
    node.rename("ior", "specular_IOR");
    node.rename("clearcoat", "coat");
    node.rename("clearcoatRoughness", "coat_roughness");
    // Normal maps would need an extra node.
    node.drop_param("normal");
    node.drop_param("displacement");
}

fn uv_texture(node: &mut NodeEditor<'_>) {
    node.set_type("image");
    node.rename("file", "filename");
    node.rename("st", "uvcoords");
    node.rename("fallback", "missing_texture_color");
    node.rename("wrapS", "swrap");
    node.rename("wrapT", "twrap");
    for param in ["swrap", "twrap"] {
        match node.text_param(param).as_deref() {
            Some("useMetadata") => node.set_param(param, Value::Token(Token::new("file"))),
            Some("repeat") => node.set_param(param, Value::Token(Token::new("periodic"))),
            _ => {}
        }
    }
    node.rename("scale", "multiply");
    node.rename("bias", "offset");
    for param in ["multiply", "offset"] {
        if let Some(Value::Vec4f([x, y, z, _])) = node.param(param).cloned() {
            node.set_param(param, Value::Vec3f([x, y, z]));
        }
    }
}

fn primvar_reader(node: &mut NodeEditor<'_>, target: &str) {
    node.set_type(target);
    node.rename("varname", "attribute");
    node.rename("fallback", "default");
}

fn float_reader(node: &mut NodeEditor<'_>) {
    primvar_reader(node, "user_data_float");
}

/// `st` and `uv` are the shape's built-in coordinates, read by a utility
/// node rather than user data.
fn float2_reader(node: &mut NodeEditor<'_>) {
    if is_uv_varname(node.param("varname")) {
        node.set_type("utility");
        node.set_param("color_mode", Value::Token(Token::new("uv")));
        node.set_param("shade_mode", Value::Token(Token::new("flat")));
        node.drop_param("varname");
        node.rename("fallback", "default");
    } else {
        primvar_reader(node, "user_data_rgb");
    }
}

fn float3_reader(node: &mut NodeEditor<'_>) {
    primvar_reader(node, "user_data_rgb");
}

fn float4_reader(node: &mut NodeEditor<'_>) {
    primvar_reader(node, "user_data_rgba");
}

fn int_reader(node: &mut NodeEditor<'_>) {
    primvar_reader(node, "user_data_int");
}

fn string_reader(node: &mut NodeEditor<'_>) {
    primvar_reader(node, "user_data_string");
}

/// Scale, then rotate (degrees), then translate.
fn transform_2d(node: &mut NodeEditor<'_>) {
    node.set_type("matrix_multiply_vector");
    node.rename("in", "input");
    let mut matrix = Mat4::IDENTITY;
    if let Some([x, y]) = node.param("translation").and_then(convert::to_vec2) {
        matrix *= Mat4::from_translation(Vec3::new(x, y, 0.0));
    }
    if let Some(degrees) = node.param("rotation").and_then(convert::to_float) {
        matrix *= Mat4::from_quat(Quat::from_rotation_z(degrees.to_radians()));
    }
    if let Some([x, y]) = node.param("scale").and_then(convert::to_vec2) {
        matrix *= Mat4::from_scale(Vec3::new(x, y, 1.0));
    }
    node.drop_param("translation");
    node.drop_param("rotation");
    node.drop_param("scale");
    node.set_param("matrix", matrix);
}

/// Rule for a source node type, if any.
pub fn rule_for(node_type: &str) -> Option<RemapRule> {
    Some(match node_type {
        "UsdPreviewSurface" => preview_surface,
        "UsdUVTexture" => uv_texture,
        "UsdPrimvarReader_float" => float_reader,
        "UsdPrimvarReader_float2" => float2_reader,
        "UsdPrimvarReader_float3"
        | "UsdPrimvarReader_point"
        | "UsdPrimvarReader_normal"
        | "UsdPrimvarReader_vector" => float3_reader,
        "UsdPrimvarReader_float4" => float4_reader,
        "UsdPrimvarReader_int" => int_reader,
        "UsdPrimvarReader_string" => string_reader,
        "UsdTransform2d" => transform_2d,
        _ => return None,
    })
}

fn is_uv_varname(value: Option<&Value>) -> bool {
    value
        .and_then(convert::to_text)
        .is_some_and(|v| v == "st" || v == "uv")
}

/// Points a displacement terminal aimed at a preview surface at whatever
/// feeds its `displacement` input, or drops the terminal.
fn retarget_displacement(network: &mut MaterialNetwork) {
    let Some(target) = network.terminals.get("displacement").cloned() else {
        return;
    };
    let is_preview = network
        .node(&target)
        .is_some_and(|n| n.node_type == "UsdPreviewSurface");
    if !is_preview {
        return;
    }
    match network
        .input_connection(&target, "displacement")
        .map(|c| c.upstream.clone())
    {
        Some(upstream) if upstream != target => {
            network.terminals.insert(Token::new("displacement"), upstream);
        }
        _ => {
            network.terminals.shift_remove("displacement");
        }
    }
}

/// Severs `st` inputs of texture nodes fed by a built-in coordinate reader.
/// The reader itself stays in the network.
fn sever_uv_readers(network: &mut MaterialNetwork) {
    let is_uv_reader = |net: &MaterialNetwork, path: &str| {
        net.node(path).is_some_and(|n| {
            n.node_type == "UsdPrimvarReader_float2" && is_uv_varname(n.params.get("varname"))
        })
    };
    let is_texture =
        |net: &MaterialNetwork, path: &str| net.node(path).is_some_and(|n| n.node_type == "UsdUVTexture");
    let severed: Vec<usize> = network
        .connections
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            c.downstream_input == "st"
                && is_texture(network, &c.downstream)
                && is_uv_reader(network, &c.upstream)
        })
        .map(|(i, _)| i)
        .collect();
    for i in severed.into_iter().rev() {
        let c = network.connections.remove(i);
        log::debug!("severed `{}.st`: built-in coordinates are implicit", c.downstream);
    }
}

/// Applies every remap rule to a copy of `network`.
pub fn remap_network(network: &MaterialNetwork) -> MaterialNetwork {
    let mut out = network.clone();
    retarget_displacement(&mut out);
    sever_uv_readers(&mut out);
    for index in 0..out.nodes.len() {
        let mut editor = NodeEditor::new(&mut out, index);
        if let Some(rule) = rule_for(editor.node_type()) {
            rule(&mut editor);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> MaterialNetwork {
        let mut net = MaterialNetwork::new();
        net.add_node(
            "/mat/surf",
            "UsdPreviewSurface",
            [("roughness", Value::Float(0.3)), ("opacity", Value::Float(0.5))],
        )
        .add_node(
            "/mat/tex",
            "UsdUVTexture",
            [
                ("file", Value::from("wood.png")),
                ("wrapS", Value::Token(Token::new("repeat"))),
                ("scale", Value::Vec4f([2.0, 2.0, 2.0, 1.0])),
            ],
        )
        .add_node("/mat/st", "UsdPrimvarReader_float2", [("varname", Value::from("st"))])
        .connect("/mat/st", "result", "/mat/tex", "st")
        .connect("/mat/tex", "rgb", "/mat/surf", "diffuseColor")
        .set_terminal("surface", "/mat/surf");
        net
    }

    #[test]
    fn test_preview_surface_defaults_then_renames() {
        let out = remap_network(&network());
        let surf = out.node("/mat/surf").unwrap();
        assert_eq!(surf.node_type, "standard_surface");
        assert_eq!(surf.params.get("specular_roughness"), Some(&Value::Float(0.3)));
        assert_eq!(surf.params.get("coat_roughness"), Some(&Value::Float(0.01)));
        assert_eq!(surf.params.get("opacity"), Some(&Value::Vec3f([0.5; 3])));
        let feed = out.input_connection("/mat/surf", "base_color").unwrap();
        assert_eq!(feed.upstream, "/mat/tex");
    }

    #[test]
    fn test_specular_workflow_branch() {
        let mut net = MaterialNetwork::new();
        net.add_node(
            "/s",
            "UsdPreviewSurface",
            [
                ("useSpecularWorkflow", Value::Int(1)),
                ("specularColor", Value::Vec3f([0.2; 3])),
                ("metallic", Value::Float(1.0)),
            ],
        );
        let out = remap_network(&net);
        let s = out.node("/s").unwrap();
        assert_eq!(s.params.get("specular_color"), Some(&Value::Vec3f([0.2; 3])));
        assert!(!s.params.contains_key("metalness"));
        assert!(!s.params.contains_key("useSpecularWorkflow"));
    }

    #[test]
    fn test_uv_texture_and_reader() {
        let out = remap_network(&network());
        let tex = out.node("/mat/tex").unwrap();
        assert_eq!(tex.node_type, "image");
        assert_eq!(tex.params.get("swrap"), Some(&Value::Token(Token::new("periodic"))));
        assert_eq!(tex.params.get("multiply"), Some(&Value::Vec3f([2.0; 3])));
        assert_eq!(out.node("/mat/st").unwrap().node_type, "utility");
        assert!(out.input_connection("/mat/tex", "uvcoords").is_none());
        assert!(out.input_connection("/mat/tex", "st").is_none());
    }

    #[test]
    fn test_generic_float2_reader_keeps_its_link() {
        let mut net = network();
        net.node_mut("/mat/st")
            .unwrap()
            .params
            .insert(Token::new("varname"), Value::from("myCoords"));
        let out = remap_network(&net);
        assert_eq!(out.node("/mat/st").unwrap().node_type, "user_data_rgb");
        assert!(out.input_connection("/mat/tex", "uvcoords").is_some());
    }

    #[test]
    fn test_displacement_terminal_is_retargeted() {
        let mut net = network();
        net.add_node("/mat/disp", "render:flat", [])
            .connect("/mat/disp", "out", "/mat/surf", "displacement")
            .set_terminal("displacement", "/mat/surf");
        let out = remap_network(&net);
        assert_eq!(out.terminals.get("displacement").map(String::as_str), Some("/mat/disp"));

        let mut net = network();
        net.set_terminal("displacement", "/mat/surf");
        assert!(!remap_network(&net).terminals.contains_key("displacement"));
    }

    #[test]
    fn test_transform_2d_matrix() {
        let mut net = MaterialNetwork::new();
        net.add_node(
            "/t",
            "UsdTransform2d",
            [
                ("translation", Value::Vec2f([1.0, 0.0])),
                ("scale", Value::Vec2f([2.0, 2.0])),
            ],
        );
        let out = remap_network(&net);
        let Some(Value::Matrix4f(m)) = out.node("/t").unwrap().params.get("matrix").cloned() else {
            panic!("matrix not set");
        };
        let p = m.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(p, Vec3::new(3.0, 2.0, 0.0));
    }
}
