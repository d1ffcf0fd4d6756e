//! Expression slot table: named blend weights in [0, 1].

use std::collections::HashMap;

/// Stable handle to one slot in an [`ExpressionSlots`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An expression definition as declared by the avatar asset.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionDef {
    pub name: String,
    /// Binary expressions snap to 0 or 1 when read
    pub is_binary: bool,
}

impl ExpressionDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_binary: false,
        }
    }

    pub fn binary(mut self) -> Self {
        self.is_binary = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpressionSlots {
    defs: Vec<ExpressionDef>,
    weights: Vec<f32>,
    by_name: HashMap<String, usize>,
}

impl ExpressionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_defs(defs: impl IntoIterator<Item = ExpressionDef>) -> Self {
        let mut slots = Self::new();
        for def in defs {
            slots.insert(def);
        }
        slots
    }

    /// Add a slot. A second definition with the same name replaces the first.
    pub fn insert(&mut self, def: ExpressionDef) -> SlotId {
        if let Some(&idx) = self.by_name.get(&def.name) {
            self.defs[idx] = def;
            return SlotId(idx);
        }
        let idx = self.defs.len();
        self.by_name.insert(def.name.clone(), idx);
        self.defs.push(def);
        self.weights.push(0.0);
        SlotId(idx)
    }

    pub fn find(&self, name: &str) -> Option<SlotId> {
        self.by_name.get(name).copied().map(SlotId)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn name(&self, id: SlotId) -> Option<&str> {
        self.defs.get(id.0).map(|d| d.name.as_str())
    }

    /// Write a weight, clamped to [0, 1].
    pub fn set(&mut self, id: SlotId, weight: f32) {
        if let Some(w) = self.weights.get_mut(id.0) {
            *w = if weight.is_nan() { 0.0 } else { weight.clamp(0.0, 1.0) };
        }
    }

    pub fn set_by_name(&mut self, name: &str, weight: f32) -> bool {
        match self.find(name) {
            Some(id) => {
                self.set(id, weight);
                true
            }
            None => false,
        }
    }

    /// Effective weight. Binary slots snap at 0.5.
    pub fn get(&self, id: SlotId) -> f32 {
        let Some(&w) = self.weights.get(id.0) else {
            return 0.0;
        };
        match self.defs.get(id.0) {
            Some(def) if def.is_binary => {
                if w > 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            _ => w,
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<f32> {
        self.find(name).map(|id| self.get(id))
    }

    /// Zero every weight.
    pub fn clear(&mut self) {
        self.weights.iter_mut().for_each(|w| *w = 0.0);
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.iter().map(|d| d.name.as_str())
    }

    /// (name, effective weight) for every slot with a non-zero weight.
    pub fn active(&self) -> Vec<(&str, f32)> {
        (0..self.defs.len())
            .map(|i| (self.defs[i].name.as_str(), self.get(SlotId(i))))
            .filter(|(_, w)| *w > 0.0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clamps() {
        let mut slots = ExpressionSlots::from_defs([ExpressionDef::new("aa")]);
        let aa = slots.find("aa").unwrap();

        slots.set(aa, 1.7);
        assert_eq!(slots.get(aa), 1.0);
        slots.set(aa, -0.3);
        assert_eq!(slots.get(aa), 0.0);
        slots.set(aa, f32::NAN);
        assert_eq!(slots.get(aa), 0.0);
    }

    #[test]
    fn test_binary_snaps() {
        let mut slots = ExpressionSlots::from_defs([ExpressionDef::new("happy").binary()]);
        let happy = slots.find("happy").unwrap();

        slots.set(happy, 0.4);
        assert_eq!(slots.get(happy), 0.0);
        slots.set(happy, 0.6);
        assert_eq!(slots.get(happy), 1.0);
    }

    #[test]
    fn test_unknown_name_is_absent() {
        let mut slots = ExpressionSlots::from_defs([ExpressionDef::new("blink")]);
        assert!(slots.find("aa").is_none());
        assert!(!slots.set_by_name("aa", 1.0));
        assert_eq!(slots.get_by_name("aa"), None);
    }

    #[test]
    fn test_insert_duplicate_keeps_id() {
        let mut slots = ExpressionSlots::new();
        let a = slots.insert(ExpressionDef::new("aa"));
        let b = slots.insert(ExpressionDef::new("aa").binary());
        assert_eq!(a, b);
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn test_active_and_clear() {
        let mut slots =
            ExpressionSlots::from_defs([ExpressionDef::new("aa"), ExpressionDef::new("blink")]);
        slots.set_by_name("blink", 0.5);
        assert_eq!(slots.active(), vec![("blink", 0.5)]);
        slots.clear();
        assert!(slots.active().is_empty());
    }
}
