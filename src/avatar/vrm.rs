//! VRM asset parsing.
//!
//! The glTF crate gives us the node hierarchy; the VRM extension blocks
//! (humanoid bone map, expressions) are read straight from the JSON chunk.

use serde_json::Value;
use std::collections::HashMap;

use super::expression::ExpressionDef;
use super::skeleton::Skeleton;
use crate::animation::glb::GlbChunks;
use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrmVersion {
    /// `VRM` extension, avatar faces -Z
    V0,
    /// `VRMC_vrm` extension, avatar faces +Z
    V1,
}

/// Everything the stage needs from a VRM file.
#[derive(Debug, Clone)]
pub struct VrmDocument {
    pub version: VrmVersion,
    pub skeleton: Skeleton,
    /// VRM humanoid bone name → node index
    pub human_bones: HashMap<String, usize>,
    pub expressions: Vec<ExpressionDef>,
    pub mesh_count: usize,
    pub material_count: usize,
}

impl VrmDocument {
    /// Parse a VRM (GLB) buffer.
    pub fn from_glb(data: &[u8]) -> Result<Self, LoadError> {
        let chunks = GlbChunks::parse(data)?;
        let root = chunks
            .json_value()
            .map_err(|e| LoadError::Malformed(format!("JSON parse error: {}", e)))?;

        let version = detect_version(&root).ok_or(LoadError::NotVrm)?;

        let gltf = gltf::Gltf::from_slice(data)
            .map_err(|e| LoadError::Malformed(format!("Failed to load GLB: {}", e)))?;
        let document = gltf.document;

        let skeleton = Skeleton::from_document(&document);

        let mut human_bones = match version {
            VrmVersion::V1 => parse_human_bones_1_0(&root),
            VrmVersion::V0 => parse_human_bones_0x(&root),
        };
        human_bones.retain(|name, node| {
            let valid = *node < skeleton.len();
            if !valid {
                tracing::warn!("Human bone {} points at missing node {}", name, node);
            }
            valid
        });

        let expressions = match version {
            VrmVersion::V1 => parse_expressions_1_0(&root),
            VrmVersion::V0 => parse_expressions_0x(&root),
        };

        Ok(Self {
            version,
            skeleton,
            human_bones,
            expressions,
            mesh_count: document.meshes().count(),
            material_count: document.materials().count(),
        })
    }
}

fn vrm_extension<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    root.get("extensions").and_then(|e| e.get(key))
}

fn detect_version(root: &Value) -> Option<VrmVersion> {
    if vrm_extension(root, "VRMC_vrm").is_some() {
        Some(VrmVersion::V1)
    } else if vrm_extension(root, "VRM").is_some() {
        Some(VrmVersion::V0)
    } else {
        None
    }
}

/// Humanoid bones from `VRMC_vrm.humanoid.humanBones` (object keyed by bone name).
pub fn parse_human_bones_1_0(root: &Value) -> HashMap<String, usize> {
    let mut map = HashMap::new();

    if let Some(bones) = vrm_extension(root, "VRMC_vrm")
        .and_then(|v| v.get("humanoid"))
        .and_then(|h| h.get("humanBones"))
        .and_then(|b| b.as_object())
    {
        for (bone_name, data) in bones {
            if let Some(node_idx) = data.get("node").and_then(|n| n.as_u64()) {
                map.insert(bone_name.clone(), node_idx as usize);
            }
        }
    }

    map
}

/// Humanoid bones from `VRM.humanoid.humanBones` (array of `{bone, node}`).
pub fn parse_human_bones_0x(root: &Value) -> HashMap<String, usize> {
    let mut map = HashMap::new();

    if let Some(bones) = vrm_extension(root, "VRM")
        .and_then(|v| v.get("humanoid"))
        .and_then(|h| h.get("humanBones"))
        .and_then(|b| b.as_array())
    {
        for bone in bones {
            if let (Some(name), Some(node)) = (
                bone.get("bone").and_then(|b| b.as_str()),
                bone.get("node").and_then(|n| n.as_u64()),
            ) {
                map.insert(camel_to_lower(name), node as usize);
            }
        }
    }

    map
}

fn parse_expression_entries(block: Option<&Value>, out: &mut Vec<ExpressionDef>) {
    let Some(entries) = block.and_then(|b| b.as_object()) else {
        return;
    };
    for (name, expr) in entries {
        let is_binary = expr
            .get("isBinary")
            .and_then(|b| b.as_bool())
            .unwrap_or(false);
        out.push(ExpressionDef {
            name: name.clone(),
            is_binary,
        });
    }
}

/// Expressions from `VRMC_vrm.expressions` (`preset` first, then `custom`).
pub fn parse_expressions_1_0(root: &Value) -> Vec<ExpressionDef> {
    let mut defs = Vec::new();
    if let Some(expressions) = vrm_extension(root, "VRMC_vrm").and_then(|v| v.get("expressions")) {
        parse_expression_entries(expressions.get("preset"), &mut defs);
        parse_expression_entries(expressions.get("custom"), &mut defs);
    }
    defs
}

/// Expressions from VRM 0.x `blendShapeMaster`, renamed to VRM 1.0 presets.
pub fn parse_expressions_0x(root: &Value) -> Vec<ExpressionDef> {
    let mut defs = Vec::new();

    let Some(groups) = vrm_extension(root, "VRM")
        .and_then(|v| v.get("blendShapeMaster"))
        .and_then(|m| m.get("blendShapeGroups"))
        .and_then(|g| g.as_array())
    else {
        return defs;
    };

    for group in groups {
        // presetName is a standardized enum; name is freeform
        let raw_name = group
            .get("presetName")
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty() && *n != "unknown")
            .or_else(|| group.get("name").and_then(|n| n.as_str()));
        let Some(raw_name) = raw_name else {
            continue;
        };

        let is_binary = group
            .get("isBinary")
            .and_then(|b| b.as_bool())
            .unwrap_or(false);

        defs.push(ExpressionDef {
            name: preset_name_1_0(raw_name),
            is_binary,
        });
    }

    defs
}

/// Map a VRM 0.x preset name onto its VRM 1.0 equivalent.
fn preset_name_1_0(name: &str) -> String {
    let lower = name.to_lowercase();
    let mapped = match lower.as_str() {
        "a" => "aa",
        "i" => "ih",
        "u" => "ou",
        "e" => "ee",
        "o" => "oh",
        "blink" => "blink",
        "blink_l" => "blinkLeft",
        "blink_r" => "blinkRight",
        "joy" => "happy",
        "angry" => "angry",
        "sorrow" => "sad",
        "fun" => "relaxed",
        "neutral" => "neutral",
        "lookup" => "lookUp",
        "lookdown" => "lookDown",
        "lookleft" => "lookLeft",
        "lookright" => "lookRight",
        _ => return name.to_string(),
    };
    mapped.to_string()
}

/// VRM 0.x bone names: "Head" → "head", "LeftUpperArm" → "leftUpperArm".
fn camel_to_lower(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
