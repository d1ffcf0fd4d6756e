//! Scene membership.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneObject {
    Camera,
    KeyLight,
    AmbientLight,
    /// Parented to the camera
    Microphone,
    Avatar,
}

#[derive(Debug, Default)]
pub struct Scene {
    objects: Vec<SceneObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object. Adding one that is already present is a no-op.
    pub fn add(&mut self, object: SceneObject) {
        if !self.contains(object) {
            self.objects.push(object);
        }
    }

    /// Returns false when the object was not in the scene.
    pub fn remove(&mut self, object: SceneObject) -> bool {
        let before = self.objects.len();
        self.objects.retain(|o| *o != object);
        self.objects.len() != before
    }

    pub fn contains(&self, object: SceneObject) -> bool {
        self.objects.contains(&object)
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }
}
