use indexmap::IndexMap;
use routine_interfaces::{MatchConfig, Region};

use crate::error::ActionError;

/// A named image's default match parameters, populated once at startup and
/// never mutated afterward — reads need no lock, matching the read-only-
/// after-population discipline the shared registries follow.
#[derive(Debug, Clone, Copy)]
pub struct TemplateConfig {
    /// Default confidence threshold for this template, if it overrides the
    /// bot's configured `default_template_threshold`.
    pub threshold: Option<f32>,
    /// Default search region, if the template is normally constrained to
    /// part of the screen.
    pub region: Option<Region>,
}

impl TemplateConfig {
    /// Creates a template config with the given default threshold.
    #[must_use]
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: Some(threshold),
            region: None,
        }
    }

    /// Creates a template config with no threshold of its own; resolution
    /// falls back to the bot's configured default.
    #[must_use]
    pub fn without_threshold() -> Self {
        Self {
            threshold: None,
            region: None,
        }
    }

    /// Sets the default search region.
    #[must_use]
    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }
}

/// The process-wide catalog of known templates, consulted by `Validate`
/// for name-existence checks and by `execute` to resolve final match
/// parameters. The concrete template contents (images) are out of scope;
/// only the name-to-defaults mapping lives here.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: IndexMap<String, TemplateConfig>,
}

impl TemplateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a template's default config.
    pub fn register(&mut self, name: impl Into<String>, config: TemplateConfig) {
        self.templates.insert(name.into(), config);
    }

    /// True if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Looks up a template's defaults.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<TemplateConfig> {
        self.templates.get(name).copied()
    }

    /// Resolves the final `MatchConfig` for a named template lookup,
    /// applying the action-overrides-template precedence rule: an action's
    /// `threshold`/`region`, if set, override the template's own defaults.
    /// `default_threshold` is the bot's configured fallback, used when
    /// neither the action nor the template itself pins one down.
    pub fn resolve(
        &self,
        name: &str,
        action_threshold: Option<f32>,
        action_region: Option<Region>,
        default_threshold: f32,
    ) -> Result<MatchConfig, ActionError> {
        let config = self
            .get(name)
            .ok_or_else(|| ActionError::TemplateNotFound(name.to_string()))?;
        Ok(MatchConfig {
            threshold: action_threshold.or(config.threshold).unwrap_or(default_threshold),
            search_region: action_region.or(config.region),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_threshold_overrides_template_default() {
        let mut registry = TemplateRegistry::new();
        registry.register("Pack", TemplateConfig::new(0.8));
        let resolved = registry.resolve("Pack", Some(0.95), None, 0.7).unwrap();
        assert_eq!(resolved.threshold, 0.95);
    }

    #[test]
    fn missing_threshold_falls_through_to_template_default() {
        let mut registry = TemplateRegistry::new();
        registry.register("Pack", TemplateConfig::new(0.8));
        let resolved = registry.resolve("Pack", None, None, 0.7).unwrap();
        assert_eq!(resolved.threshold, 0.8);
    }

    #[test]
    fn template_without_threshold_falls_through_to_bot_default() {
        let mut registry = TemplateRegistry::new();
        registry.register("Pack", TemplateConfig::without_threshold());
        let resolved = registry.resolve("Pack", None, None, 0.7).unwrap();
        assert_eq!(resolved.threshold, 0.7);
    }

    #[test]
    fn unregistered_template_is_an_error() {
        let registry = TemplateRegistry::new();
        assert!(registry.resolve("Missing", None, None, 0.7).is_err());
    }
}
