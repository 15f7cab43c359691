use async_trait::async_trait;
use indexmap::IndexMap;
use routine_interfaces::Region;
use serde_json::Value;

use crate::context::BotContext;
use crate::error::ActionError;
use crate::parse::{field_f64, field_region, require_array, require_str};

/// A boolean-valued predicate evaluated against live bot state, used by the
/// generic `If`/`While`/`Until` actions.
#[async_trait]
pub trait Condition: Send + Sync {
    /// Evaluates this condition against the bot's current state.
    async fn evaluate(&self, bot: &dyn BotContext) -> Result<bool, ActionError>;
}

/// True if the named template is found in the current frame.
pub struct ImageExists {
    /// The template name to look up.
    pub template: String,
    /// Optional threshold override.
    pub threshold: Option<f32>,
    /// Optional search-region override.
    pub region: Option<Region>,
}

#[async_trait]
impl Condition for ImageExists {
    async fn evaluate(&self, bot: &dyn BotContext) -> Result<bool, ActionError> {
        let config = bot
            .templates()
            .resolve(&self.template, self.threshold, self.region)?;
        let result = bot.cv().find_template(&self.template, config).await?;
        Ok(result.found)
    }
}

/// True if the named template is not found in the current frame.
pub struct ImageNotExists {
    /// The underlying lookup this negates.
    pub inner: ImageExists,
}

#[async_trait]
impl Condition for ImageNotExists {
    async fn evaluate(&self, bot: &dyn BotContext) -> Result<bool, ActionError> {
        Ok(!self.inner.evaluate(bot).await?)
    }
}

/// Logical negation.
pub struct Not {
    /// The condition to negate.
    pub inner: Box<dyn Condition>,
}

#[async_trait]
impl Condition for Not {
    async fn evaluate(&self, bot: &dyn BotContext) -> Result<bool, ActionError> {
        Ok(!self.inner.evaluate(bot).await?)
    }
}

/// True if every nested condition is true; short-circuits on the first
/// false.
pub struct All {
    /// The nested conditions, evaluated in order.
    pub conditions: Vec<Box<dyn Condition>>,
}

#[async_trait]
impl Condition for All {
    async fn evaluate(&self, bot: &dyn BotContext) -> Result<bool, ActionError> {
        for condition in &self.conditions {
            if !condition.evaluate(bot).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// True if any nested condition is true; short-circuits on the first true.
pub struct Any {
    /// The nested conditions, evaluated in order.
    pub conditions: Vec<Box<dyn Condition>>,
}

#[async_trait]
impl Condition for Any {
    async fn evaluate(&self, bot: &dyn BotContext) -> Result<bool, ActionError> {
        for condition in &self.conditions {
            if condition.evaluate(bot).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// True if no nested condition is true; short-circuits on the first true.
pub struct NoneOf {
    /// The nested conditions, evaluated in order.
    pub conditions: Vec<Box<dyn Condition>>,
}

#[async_trait]
impl Condition for NoneOf {
    async fn evaluate(&self, bot: &dyn BotContext) -> Result<bool, ActionError> {
        for condition in &self.conditions {
            if condition.evaluate(bot).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// The comparator a `Variable*` condition applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Codepoint-exact string equality.
    Equals,
    /// Codepoint-exact string inequality.
    NotEquals,
    /// Numeric `>`.
    GreaterThan,
    /// Numeric `<`.
    LessThan,
    /// Numeric `>=`.
    GreaterThanOrEqual,
    /// Numeric `<=`.
    LessThanOrEqual,
    /// Substring containment.
    Contains,
    /// String prefix match.
    StartsWith,
    /// String suffix match.
    EndsWith,
}

impl Comparator {
    fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::LessThan | Self::GreaterThanOrEqual | Self::LessThanOrEqual
        )
    }
}

/// Compares a variable's current value against a literal, by name.
pub struct VariableComparison {
    /// The variable to read.
    pub variable: String,
    /// The comparison to apply.
    pub comparator: Comparator,
    /// The literal to compare against.
    pub value: String,
}

#[async_trait]
impl Condition for VariableComparison {
    async fn evaluate(&self, bot: &dyn BotContext) -> Result<bool, ActionError> {
        let actual = bot
            .variables()
            .get(&self.variable)
            .ok_or_else(|| ActionError::VariableUndefined(self.variable.clone()))?;

        if self.comparator.is_numeric() {
            let actual: f64 = actual
                .parse()
                .map_err(|_| ActionError::NotANumber(actual.clone()))?;
            let expected: f64 = self
                .value
                .parse()
                .map_err(|_| ActionError::NotANumber(self.value.clone()))?;
            return Ok(match self.comparator {
                Comparator::GreaterThan => actual > expected,
                Comparator::LessThan => actual < expected,
                Comparator::GreaterThanOrEqual => actual >= expected,
                Comparator::LessThanOrEqual => actual <= expected,
                _ => unreachable!("non-numeric comparator filtered above"),
            });
        }

        Ok(match self.comparator {
            Comparator::Equals => actual == self.value,
            Comparator::NotEquals => actual != self.value,
            Comparator::Contains => actual.contains(&self.value),
            Comparator::StartsWith => actual.starts_with(&self.value),
            Comparator::EndsWith => actual.ends_with(&self.value),
            _ => unreachable!("numeric comparator filtered above"),
        })
    }
}

/// Maps lowercased `type` strings to condition constructors, mirroring
/// `ActionRegistry`'s dispatch-by-name approach for the nested `Condition`
/// sum type.
pub struct ConditionRegistry {
    factories: IndexMap<String, fn(&Value) -> Result<Box<dyn Condition>, ActionError>>,
}

impl ConditionRegistry {
    /// Builds the registry with every built-in condition type registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut factories: IndexMap<String, fn(&Value) -> Result<Box<dyn Condition>, ActionError>> =
            IndexMap::new();
        factories.insert("imageexists".into(), build_image_exists);
        factories.insert("imagenotexists".into(), build_image_not_exists);
        factories.insert("not".into(), build_not);
        factories.insert("all".into(), build_all);
        factories.insert("any".into(), build_any);
        factories.insert("none".into(), build_none);
        factories.insert("variableequals".into(), build_comparator(Comparator::Equals));
        factories.insert("variablenotequals".into(), build_comparator(Comparator::NotEquals));
        factories.insert("greaterthan".into(), build_comparator(Comparator::GreaterThan));
        factories.insert("lessthan".into(), build_comparator(Comparator::LessThan));
        factories.insert(
            "greaterthanorequal".into(),
            build_comparator(Comparator::GreaterThanOrEqual),
        );
        factories.insert(
            "lessthanorequal".into(),
            build_comparator(Comparator::LessThanOrEqual),
        );
        factories.insert("contains".into(), build_comparator(Comparator::Contains));
        factories.insert("startswith".into(), build_comparator(Comparator::StartsWith));
        factories.insert("endswith".into(), build_comparator(Comparator::EndsWith));
        Self { factories }
    }

    /// Builds a condition tree from its deserialized `{type, ...}` record.
    pub fn build(&self, value: &Value) -> Result<Box<dyn Condition>, ActionError> {
        let type_name = require_str(value, "condition", "type")?.to_lowercase();
        let factory = self.factories.get(&type_name).ok_or_else(|| {
            ActionError::Validation(format!(
                "unknown condition type '{type_name}', registered: {:?}",
                self.factories.keys().collect::<Vec<_>>()
            ))
        })?;
        factory(value)
    }
}

fn build_image_exists(value: &Value) -> Result<Box<dyn Condition>, ActionError> {
    let template = require_str(value, "ImageExists", "template")?.to_string();
    let threshold = field_f64(value, "threshold").map(|f| f as f32);
    let region = field_region(value, "region");
    Ok(Box::new(ImageExists {
        template,
        threshold,
        region,
    }))
}

fn build_image_not_exists(value: &Value) -> Result<Box<dyn Condition>, ActionError> {
    let template = require_str(value, "ImageNotExists", "template")?.to_string();
    let threshold = field_f64(value, "threshold").map(|f| f as f32);
    let region = field_region(value, "region");
    Ok(Box::new(ImageNotExists {
        inner: ImageExists {
            template,
            threshold,
            region,
        },
    }))
}

fn build_not(value: &Value) -> Result<Box<dyn Condition>, ActionError> {
    let nested = value
        .get("condition")
        .ok_or_else(|| ActionError::Validation("Not: missing nested field 'condition'".into()))?;
    let registry = ConditionRegistry::with_builtins();
    let inner = registry.build(nested)?;
    Ok(Box::new(Not { inner }))
}

fn build_all(value: &Value) -> Result<Box<dyn Condition>, ActionError> {
    build_combinator(value, "All", |conditions| Box::new(All { conditions }))
}

fn build_any(value: &Value) -> Result<Box<dyn Condition>, ActionError> {
    build_combinator(value, "Any", |conditions| Box::new(Any { conditions }))
}

fn build_none(value: &Value) -> Result<Box<dyn Condition>, ActionError> {
    build_combinator(value, "None", |conditions| Box::new(NoneOf { conditions }))
}

fn build_combinator(
    value: &Value,
    name: &str,
    make: impl FnOnce(Vec<Box<dyn Condition>>) -> Box<dyn Condition>,
) -> Result<Box<dyn Condition>, ActionError> {
    let array = require_array(value, name, "conditions")?;
    let registry = ConditionRegistry::with_builtins();
    let conditions = array
        .iter()
        .map(|v| registry.build(v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(make(conditions))
}

fn build_comparator(
    comparator: Comparator,
) -> fn(&Value) -> Result<Box<dyn Condition>, ActionError> {
    match comparator {
        Comparator::Equals => |v| build_variable_comparison(v, Comparator::Equals),
        Comparator::NotEquals => |v| build_variable_comparison(v, Comparator::NotEquals),
        Comparator::GreaterThan => |v| build_variable_comparison(v, Comparator::GreaterThan),
        Comparator::LessThan => |v| build_variable_comparison(v, Comparator::LessThan),
        Comparator::GreaterThanOrEqual => {
            |v| build_variable_comparison(v, Comparator::GreaterThanOrEqual)
        }
        Comparator::LessThanOrEqual => {
            |v| build_variable_comparison(v, Comparator::LessThanOrEqual)
        }
        Comparator::Contains => |v| build_variable_comparison(v, Comparator::Contains),
        Comparator::StartsWith => |v| build_variable_comparison(v, Comparator::StartsWith),
        Comparator::EndsWith => |v| build_variable_comparison(v, Comparator::EndsWith),
    }
}

fn build_variable_comparison(
    value: &Value,
    comparator: Comparator,
) -> Result<Box<dyn Condition>, ActionError> {
    let variable = require_str(value, "VariableComparison", "variable")?.to_string();
    let compare_value = match value.get("value") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
        None => {
            return Err(ActionError::Validation(
                "VariableComparison: missing field 'value'".into(),
            ))
        }
    };
    Ok(Box::new(VariableComparison {
        variable,
        comparator,
        value: compare_value,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_builds_nested_all_of_any() {
        let registry = ConditionRegistry::with_builtins();
        let value = json!({
            "type": "All",
            "conditions": [
                {"type": "VariableEquals", "variable": "x", "value": "1"},
                {"type": "Any", "conditions": [
                    {"type": "VariableEquals", "variable": "y", "value": "2"}
                ]}
            ]
        });
        assert!(registry.build(&value).is_ok());
    }

    #[test]
    fn unknown_condition_type_is_an_error() {
        let registry = ConditionRegistry::with_builtins();
        assert!(registry.build(&json!({"type": "Bogus"})).is_err());
    }
}
