//! Humanoid animation clips (VRMA) decoded from a GLB container.
//!
//! Only what an idle loop needs: FLOAT keyframes, hips translation and
//! per-bone rotation, mapped onto humanoid bone names.

use glam::{Mat4, Quat, Vec3};
use gltf::accessor::{DataType, Dimensions};
use gltf::animation::util::ReadOutputs;
use gltf::animation::Property;
use gltf::buffer::Source;
use gltf::{Accessor, Document};
use serde_json::Value;
use std::collections::HashMap;

use super::glb::GlbChunks;
use crate::avatar::skeleton::Skeleton;
use crate::avatar::vrm::VrmVersion;
use crate::error::ClipError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
    /// Tangents are dropped; values are interpolated linearly
    CubicSpline,
}

impl From<gltf::animation::Interpolation> for Interpolation {
    fn from(mode: gltf::animation::Interpolation) -> Self {
        match mode {
            gltf::animation::Interpolation::Linear => Self::Linear,
            gltf::animation::Interpolation::Step => Self::Step,
            gltf::animation::Interpolation::CubicSpline => Self::CubicSpline,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackValues {
    Translation(Vec<Vec3>),
    Rotation(Vec<Quat>),
}

/// One keyframe curve targeting a humanoid bone.
#[derive(Debug, Clone)]
pub struct Track {
    pub bone: String,
    pub times: Vec<f32>,
    pub values: TrackValues,
    pub interpolation: Interpolation,
}

/// Find the keyframe pair around `t` and the blend factor between them.
fn keyframe(times: &[f32], t: f32) -> (usize, usize, f32) {
    if times.len() < 2 || t.is_nan() || t <= times[0] {
        return (0, 0, 0.0);
    }
    let last = times.len() - 1;
    if t >= times[last] {
        return (last, last, 0.0);
    }
    // Clamped so unordered keys still index inside the track
    let next = times.partition_point(|&k| k <= t).clamp(1, last);
    let prev = next - 1;
    let span = times[next] - times[prev];
    let f = if span > 0.0 { (t - times[prev]) / span } else { 0.0 };
    (prev, next, f)
}

impl Track {
    pub fn sample_translation(&self, t: f32) -> Option<Vec3> {
        let TrackValues::Translation(values) = &self.values else {
            return None;
        };
        let (a, b, f) = keyframe(&self.times, t);
        let va = *values.get(a)?;
        let vb = *values.get(b)?;
        Some(match self.interpolation {
            Interpolation::Step => va,
            _ => va.lerp(vb, f),
        })
    }

    pub fn sample_rotation(&self, t: f32) -> Option<Quat> {
        let TrackValues::Rotation(values) = &self.values else {
            return None;
        };
        let (a, b, f) = keyframe(&self.times, t);
        let qa = *values.get(a)?;
        let qb = *values.get(b)?;
        Some(match self.interpolation {
            Interpolation::Step => qa,
            _ => qa.slerp(qb, f).normalize(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub tracks: Vec<Track>,
    /// Rest height of the clip's hips, used to rescale hips translation
    pub hips_rest_height: Option<f32>,
}

impl AnimationClip {
    /// Decode the first animation of a VRMA buffer.
    pub fn from_glb(data: &[u8]) -> Result<Self, ClipError> {
        let chunks = GlbChunks::parse(data)?;
        let root = chunks
            .json_value()
            .map_err(|e| ClipError::Json(e.to_string()))?;
        let gltf = gltf::Gltf::from_slice(data)
            .map_err(|e| ClipError::Json(format!("Failed to load GLB: {}", e)))?;
        let document = &gltf.document;
        let blob = gltf.blob.as_deref().unwrap_or(&[]);

        let animation = document
            .animations()
            .next()
            .ok_or(ClipError::NoAnimation)?;
        let bone_names = node_bone_names(&root, document);

        let mut tracks = Vec::new();
        let mut duration = 0.0f32;

        for channel in animation.channels() {
            let target = channel.target();
            let node = target.node().index();
            let Some(bone) = bone_names.get(&node) else {
                tracing::debug!("Skipping channel on unmapped node {}", node);
                continue;
            };
            let output_dims = match target.property() {
                Property::Rotation => Dimensions::Vec4,
                // Only the hips carry root motion
                Property::Translation if bone == "hips" => Dimensions::Vec3,
                _ => continue,
            };

            let sampler = channel.sampler();
            let input = sampler.input();
            let output = sampler.output();
            check_accessor(&input, blob.len(), Dimensions::Scalar)?;
            check_accessor(&output, blob.len(), output_dims)?;

            let reader = channel.reader(|buffer| match buffer.source() {
                Source::Bin => Some(blob),
                Source::Uri(_) => None,
            });
            let times: Vec<f32> = reader
                .read_inputs()
                .ok_or_else(|| accessor_error(&input, "keyframe times unreadable"))?
                .collect();
            check_times(&input, &times)?;

            let interpolation = Interpolation::from(sampler.interpolation());
            let values = match reader.read_outputs() {
                Some(ReadOutputs::Rotations(rotations)) => {
                    let values: Vec<Quat> = rotations
                        .into_f32()
                        .map(|q| Quat::from_array(q).normalize())
                        .collect();
                    if !values.iter().all(|q| q.is_finite()) {
                        return Err(accessor_error(&output, "non-finite rotation"));
                    }
                    TrackValues::Rotation(keep_values(values, interpolation))
                }
                Some(ReadOutputs::Translations(translations)) => {
                    let values: Vec<Vec3> = translations.map(Vec3::from).collect();
                    if !values.iter().all(|v| v.is_finite()) {
                        return Err(accessor_error(&output, "non-finite translation"));
                    }
                    TrackValues::Translation(keep_values(values, interpolation))
                }
                _ => return Err(accessor_error(&output, "keyframe values unreadable")),
            };

            if let Some(&end) = times.last() {
                duration = duration.max(end);
            }
            tracks.push(Track {
                bone: bone.clone(),
                times,
                values,
                interpolation,
            });
        }

        let hips_rest_height = bone_names
            .iter()
            .find(|(_, name)| name.as_str() == "hips")
            .and_then(|(&node, _)| node_world_position(document, node))
            .map(|p| p.y);

        Ok(Self {
            name: animation.name().unwrap_or_default().to_string(),
            duration,
            tracks,
            hips_rest_height,
        })
    }

    /// Resolve tracks against an avatar. Bones the avatar lacks are dropped.
    pub fn bind(
        &self,
        human_bones: &HashMap<String, usize>,
        skeleton: &Skeleton,
        version: VrmVersion,
    ) -> BoundClip {
        let hips_scale = match (
            self.hips_rest_height,
            human_bones
                .get("hips")
                .and_then(|&n| skeleton.world_position(n)),
        ) {
            (Some(clip), Some(avatar)) if clip.abs() > f32::EPSILON => avatar.y / clip,
            _ => 1.0,
        };

        let tracks = self
            .tracks
            .iter()
            .filter_map(|track| {
                let Some(&node) = human_bones.get(&track.bone) else {
                    tracing::debug!("Avatar has no bone {}, dropping track", track.bone);
                    return None;
                };
                let values = match &track.values {
                    TrackValues::Translation(v) => TrackValues::Translation(
                        v.iter()
                            .map(|p| flip_translation(*p * hips_scale, version))
                            .collect(),
                    ),
                    TrackValues::Rotation(q) => TrackValues::Rotation(
                        q.iter().map(|r| flip_rotation(*r, version)).collect(),
                    ),
                };
                Some(BoundTrack {
                    node,
                    track: Track {
                        bone: track.bone.clone(),
                        times: track.times.clone(),
                        values,
                        interpolation: track.interpolation,
                    },
                })
            })
            .collect();

        BoundClip {
            name: self.name.clone(),
            duration: self.duration,
            tracks,
        }
    }
}

// VRM 0.x rigs face -Z, so clip data authored for +Z is mirrored around Y
fn flip_translation(v: Vec3, version: VrmVersion) -> Vec3 {
    match version {
        VrmVersion::V0 => Vec3::new(-v.x, v.y, -v.z),
        VrmVersion::V1 => v,
    }
}

fn flip_rotation(q: Quat, version: VrmVersion) -> Quat {
    match version {
        VrmVersion::V0 => Quat::from_xyzw(-q.x, q.y, -q.z, q.w),
        VrmVersion::V1 => q,
    }
}

#[derive(Debug, Clone)]
pub struct BoundTrack {
    pub node: usize,
    pub track: Track,
}

/// A clip whose tracks point at skeleton node indices.
#[derive(Debug, Clone)]
pub struct BoundClip {
    pub name: String,
    pub duration: f32,
    pub tracks: Vec<BoundTrack>,
}

impl BoundClip {
    /// Write the pose at time `t` into the skeleton.
    pub fn apply(&self, t: f32, skeleton: &mut Skeleton) {
        for bound in &self.tracks {
            let Some(joint) = skeleton.joint_mut(bound.node) else {
                continue;
            };
            match bound.track.values {
                TrackValues::Translation(_) => {
                    if let Some(v) = bound.track.sample_translation(t) {
                        joint.translation = v;
                    }
                }
                TrackValues::Rotation(_) => {
                    if let Some(q) = bound.track.sample_rotation(t) {
                        joint.rotation = q;
                    }
                }
            }
        }
    }
}

/// Cubic spline outputs come as (in-tangent, value, out-tangent) triples;
/// only the value is kept.
fn keep_values<T: Copy>(values: Vec<T>, interpolation: Interpolation) -> Vec<T> {
    match interpolation {
        Interpolation::CubicSpline => values.chunks_exact(3).map(|triple| triple[1]).collect(),
        _ => values,
    }
}

fn accessor_error(accessor: &Accessor, message: &str) -> ClipError {
    ClipError::Accessor {
        index: accessor.index(),
        message: message.to_string(),
    }
}

/// Bounds-check a FLOAT accessor against the embedded binary chunk before
/// any reader touches it.
fn check_accessor(
    accessor: &Accessor,
    blob_len: usize,
    dimensions: Dimensions,
) -> Result<(), ClipError> {
    let fail = |message: String| ClipError::Accessor {
        index: accessor.index(),
        message,
    };

    if accessor.data_type() != DataType::F32 {
        return Err(fail(format!(
            "unsupported component type {:?}",
            accessor.data_type()
        )));
    }
    if accessor.dimensions() != dimensions {
        return Err(fail(format!(
            "expected {:?}, found {:?}",
            dimensions,
            accessor.dimensions()
        )));
    }
    if accessor.sparse().is_some() {
        return Err(fail("sparse accessors are not supported".into()));
    }

    let view = accessor
        .view()
        .ok_or_else(|| fail("accessor has no buffer view".into()))?;
    if !matches!(view.buffer().source(), Source::Bin) {
        return Err(fail("only the embedded binary chunk is supported".into()));
    }

    let size = accessor.size();
    let stride = view.stride().unwrap_or(size);
    if stride < size {
        return Err(fail(format!("stride {} below element size {}", stride, size)));
    }

    let count = accessor.count();
    if count == 0 {
        return Err(fail("accessor is empty".into()));
    }
    let end = stride
        .checked_mul(count - 1)
        .and_then(|n| n.checked_add(size))
        .and_then(|n| n.checked_add(accessor.offset()));
    if !end.is_some_and(|end| end <= view.length()) {
        return Err(fail(format!("{} elements exceed buffer view", count)));
    }
    let view_end = view.offset().checked_add(view.length());
    if !view_end.is_some_and(|end| end <= blob_len) {
        return Err(fail("buffer view exceeds binary chunk".into()));
    }

    Ok(())
}

/// Keyframe times must be finite and ascending.
fn check_times(accessor: &Accessor, times: &[f32]) -> Result<(), ClipError> {
    if !times.iter().all(|t| t.is_finite()) {
        return Err(accessor_error(accessor, "non-finite keyframe time"));
    }
    if times.windows(2).any(|w| w[1] < w[0]) {
        return Err(accessor_error(accessor, "keyframe times are not ascending"));
    }
    Ok(())
}

/// Node index → humanoid bone name, from `VRMC_vrm_animation` or node names.
fn node_bone_names(root: &Value, document: &Document) -> HashMap<usize, String> {
    let mut map = HashMap::new();

    if let Some(bones) = root
        .get("extensions")
        .and_then(|e| e.get("VRMC_vrm_animation"))
        .and_then(|v| v.get("humanoid"))
        .and_then(|h| h.get("humanBones"))
        .and_then(|b| b.as_object())
    {
        for (bone_name, data) in bones {
            if let Some(node) = data.get("node").and_then(|n| n.as_u64()) {
                map.insert(node as usize, bone_name.clone());
            }
        }
    }

    if map.is_empty() {
        for node in document.nodes() {
            if let Some(name) = node.name() {
                map.insert(node.index(), name.to_string());
            }
        }
    }

    map
}

fn node_world_position(document: &Document, node: usize) -> Option<Vec3> {
    let nodes: Vec<gltf::Node> = document.nodes().collect();
    let mut parents = vec![None; nodes.len()];
    for n in &nodes {
        for child in n.children() {
            if let Some(slot) = parents.get_mut(child.index()) {
                *slot = Some(n.index());
            }
        }
    }

    let mut current = Some(node);
    let mut m = Mat4::IDENTITY;
    // Bounded walk so a malformed cycle cannot spin forever
    for _ in 0..nodes.len() {
        let Some(idx) = current else { break };
        let local = Mat4::from_cols_array_2d(&nodes.get(idx)?.transform().matrix());
        m = local * m;
        current = parents[idx];
    }
    Some(m.w_axis.truncate())
}
