//! In-memory GLB fixtures for unit tests.

use serde_json::{json, Value};

use crate::animation::glb::{CHUNK_BIN, CHUNK_JSON, GLB_MAGIC, GLB_VERSION};

/// Frame a JSON document and optional binary payload as a GLB buffer.
pub fn build_glb(json: &[u8], bin: Option<&[u8]>) -> Vec<u8> {
    let mut json = json.to_vec();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let bin = bin.map(|b| {
        let mut b = b.to_vec();
        while b.len() % 4 != 0 {
            b.push(0);
        }
        b
    });

    let total = 12 + 8 + json.len() + bin.as_ref().map(|b| 8 + b.len()).unwrap_or(0);
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json);
    if let Some(bin) = bin {
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        out.extend_from_slice(&bin);
    }
    out
}

fn skeleton_nodes(with_eyes: bool) -> Value {
    let mut head_children = vec![];
    if with_eyes {
        head_children = vec![6, 7];
    }
    json!([
        { "name": "Armature", "children": [1] },
        { "name": "J_Bip_C_Hips", "translation": [0.0, 1.0, 0.0], "children": [2] },
        { "name": "J_Bip_C_Spine", "translation": [0.0, 0.1, 0.0], "children": [3] },
        { "name": "J_Bip_C_Chest", "translation": [0.0, 0.15, 0.0], "children": [4] },
        { "name": "J_Bip_C_Neck", "translation": [0.0, 0.2, 0.0], "children": [5] },
        { "name": "J_Bip_C_Head", "translation": [0.0, 0.1, 0.0], "children": head_children },
        { "name": "J_Adj_L_FaceEye", "translation": [0.03, 0.06, 0.05] },
        { "name": "J_Adj_R_FaceEye", "translation": [-0.03, 0.06, 0.05] }
    ])
}

/// A VRM 1.0 avatar with a hips-to-head chain, both eyes, two materials and the
/// given preset expressions.
pub fn avatar_glb(expressions: &[&str]) -> Vec<u8> {
    avatar_glb_with(expressions, true)
}

/// Same as [`avatar_glb`], optionally without eye bones.
pub fn avatar_glb_with(expressions: &[&str], with_eyes: bool) -> Vec<u8> {
    let mut human_bones = json!({
        "hips": { "node": 1 },
        "spine": { "node": 2 },
        "chest": { "node": 3 },
        "neck": { "node": 4 },
        "head": { "node": 5 }
    });
    if with_eyes {
        human_bones["leftEye"] = json!({ "node": 6 });
        human_bones["rightEye"] = json!({ "node": 7 });
    }

    let mut preset = serde_json::Map::new();
    for name in expressions {
        let is_binary = *name == "happy";
        preset.insert(
            name.to_string(),
            json!({ "isBinary": is_binary, "morphTargetBinds": [] }),
        );
    }

    let mut nodes = skeleton_nodes(with_eyes);
    if !with_eyes {
        if let Some(arr) = nodes.as_array_mut() {
            arr.truncate(6);
        }
    }

    let doc = json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": nodes,
        "materials": [{ "name": "Body" }, { "name": "Face" }],
        "extensions": {
            "VRMC_vrm": {
                "specVersion": "1.0",
                "humanoid": { "humanBones": human_bones },
                "expressions": { "preset": preset, "custom": { "smirk": {} } }
            }
        }
    });

    build_glb(doc.to_string().as_bytes(), None)
}

/// A VRM 0.x avatar using `blendShapeMaster` and array-style human bones.
pub fn vrm0_avatar_glb() -> Vec<u8> {
    let doc = json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": skeleton_nodes(true),
        "extensions": {
            "VRM": {
                "humanoid": {
                    "humanBones": [
                        { "bone": "hips", "node": 1 },
                        { "bone": "Neck", "node": 4 },
                        { "bone": "head", "node": 5 },
                        { "bone": "LeftEye", "node": 6 },
                        { "bone": "rightEye", "node": 7 }
                    ]
                },
                "blendShapeMaster": {
                    "blendShapeGroups": [
                        { "presetName": "a", "binds": [] },
                        { "presetName": "blink", "binds": [] },
                        { "presetName": "joy", "isBinary": true, "binds": [] }
                    ]
                }
            }
        }
    });
    build_glb(doc.to_string().as_bytes(), None)
}

/// A plain glTF with no VRM extension.
pub fn plain_glb() -> Vec<u8> {
    let doc = json!({
        "asset": { "version": "2.0" },
        "nodes": [{ "name": "Cube" }]
    });
    build_glb(doc.to_string().as_bytes(), None)
}

fn push_f32s(bin: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        bin.extend_from_slice(&v.to_le_bytes());
    }
}

/// An idle clip: hips translation and head rotation keyed at t=0 and t=1.
///
/// Head rotates from identity to 90 degrees about X; hips rise from y=1.0 to y=1.2.
pub fn idle_clip_glb() -> Vec<u8> {
    let half = std::f32::consts::FRAC_1_SQRT_2;
    let mut bin = Vec::new();
    // times: offset 0, 2 floats
    push_f32s(&mut bin, &[0.0, 1.0]);
    // head rotations: offset 8, 2 x VEC4
    push_f32s(&mut bin, &[0.0, 0.0, 0.0, 1.0, half, 0.0, 0.0, half]);
    // hips translations: offset 40, 2 x VEC3
    push_f32s(&mut bin, &[0.0, 1.0, 0.0, 0.0, 1.2, 0.0]);

    let doc = json!({
        "asset": { "version": "2.0" },
        "nodes": [
            { "name": "hips", "translation": [0.0, 1.0, 0.0], "children": [1] },
            { "name": "head", "translation": [0.0, 0.5, 0.0] },
            { "name": "tail" }
        ],
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 8, "byteLength": 32 },
            { "buffer": 0, "byteOffset": 40, "byteLength": 24 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 2, "type": "SCALAR", "min": [0.0], "max": [1.0] },
            { "bufferView": 1, "componentType": 5126, "count": 2, "type": "VEC4" },
            { "bufferView": 2, "componentType": 5126, "count": 2, "type": "VEC3" }
        ],
        "animations": [{
            "name": "idle",
            "samplers": [
                { "input": 0, "output": 1, "interpolation": "LINEAR" },
                { "input": 0, "output": 2, "interpolation": "LINEAR" },
                { "input": 0, "output": 2, "interpolation": "LINEAR" }
            ],
            "channels": [
                { "sampler": 0, "target": { "node": 1, "path": "rotation" } },
                { "sampler": 1, "target": { "node": 0, "path": "translation" } },
                { "sampler": 2, "target": { "node": 2, "path": "translation" } }
            ]
        }],
        "extensions": {
            "VRMC_vrm_animation": {
                "specVersion": "1.0",
                "humanoid": {
                    "humanBones": { "hips": { "node": 0 }, "head": { "node": 1 } }
                }
            }
        }
    });

    build_glb(doc.to_string().as_bytes(), Some(&bin))
}

/// A single head rotation track with the given keyframe times.
///
/// `time_count` is written to the times accessor as-is, so it may disagree
/// with the data actually present.
pub fn head_clip_glb(times: &[f32], time_count: u64) -> Vec<u8> {
    let mut bin = Vec::new();
    push_f32s(&mut bin, times);
    let times_len = bin.len();
    for _ in times {
        push_f32s(&mut bin, &[0.0, 0.0, 0.0, 1.0]);
    }

    let doc = json!({
        "asset": { "version": "2.0" },
        "nodes": [{ "name": "head" }],
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": times_len },
            { "buffer": 0, "byteOffset": times_len, "byteLength": bin.len() - times_len }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": time_count, "type": "SCALAR" },
            { "bufferView": 1, "componentType": 5126, "count": times.len(), "type": "VEC4" }
        ],
        "animations": [{
            "name": "nod",
            "samplers": [{ "input": 0, "output": 1 }],
            "channels": [{ "sampler": 0, "target": { "node": 0, "path": "rotation" } }]
        }]
    });

    build_glb(doc.to_string().as_bytes(), Some(&bin))
}
