use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SkillError;
use crate::skill::builtin::{
    BackgroundBlurSkill, BackgroundReplacementSkill, FaceDetectionSkill, IntruderDetectionSkill,
};
use crate::skill::runtime::{Skill, SkillDescriptor};

/// Registry of available skills, keyed by descriptor name.
///
/// Skills themselves are stateless factories and shared as `Arc`; per-device
/// state lives in the instances they create.
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
    default_name: Option<String>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            skills: HashMap::new(),
            default_name: None,
        }
    }

    /// A registry holding the four built-in skills, with background blur
    /// as the default.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BackgroundBlurSkill::new()));
        registry.register(Arc::new(BackgroundReplacementSkill::new()));
        registry.register(Arc::new(FaceDetectionSkill::new()));
        registry.register(Arc::new(IntruderDetectionSkill::new()));
        registry
    }

    /// Register a skill. The first registered skill becomes the default.
    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        let name = skill.descriptor().name.to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.skills.insert(name, skill);
    }

    /// Set the default skill by name.
    pub fn set_default(&mut self, name: &str) -> Result<(), SkillError> {
        if !self.skills.contains_key(name) {
            return Err(SkillError::UnknownSkill(name.to_string()));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.get(name).cloned()
    }

    /// Look up a skill, erroring with the unknown name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Skill>, SkillError> {
        self.get(name)
            .ok_or_else(|| SkillError::UnknownSkill(name.to_string()))
    }

    pub fn default_skill(&self) -> Option<Arc<dyn Skill>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Descriptors of all registered skills, sorted by name.
    pub fn list(&self) -> Vec<SkillDescriptor> {
        let mut descriptors: Vec<SkillDescriptor> = self
            .skills
            .values()
            .map(|s| s.descriptor().clone())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(b.name));
        descriptors
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_register_with_blur_as_default() {
        let registry = SkillRegistry::with_builtins();
        let names: Vec<&str> = registry.list().iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "background_blur",
                "background_replacement",
                "face_detection",
                "intruder_detection"
            ]
        );
        assert_eq!(
            registry
                .default_skill()
                .expect("default set")
                .descriptor()
                .name,
            "background_blur"
        );
    }

    #[test]
    fn resolve_names_the_missing_skill() {
        let registry = SkillRegistry::with_builtins();
        let err = registry.resolve("pose_estimation").unwrap_err();
        assert!(matches!(err, SkillError::UnknownSkill(name) if name == "pose_estimation"));
    }

    #[test]
    fn set_default_requires_a_registered_name() {
        let mut registry = SkillRegistry::with_builtins();
        assert!(registry.set_default("face_detection").is_ok());
        assert_eq!(
            registry.default_skill().unwrap().descriptor().name,
            "face_detection"
        );
        assert!(registry.set_default("nope").is_err());
    }
}
