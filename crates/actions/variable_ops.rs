use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::action::Action;
use crate::builder::StepBuilder;
use crate::context::{BotContext, BuildContext};
use crate::error::ActionError;
use crate::parse::{field_bool, field_f64, require_str};
use crate::step::StepExec;

/// Sets a variable, interpolating `value` against the current store first.
pub struct SetVariable {
    /// The variable name to write.
    pub name: String,
    /// The literal or `${...}`-templated value.
    pub value: String,
    /// If true, the variable survives `clear_non_persistent` between loop
    /// iterations.
    pub persist: bool,
}

impl Action for SetVariable {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        if self.name.is_empty() {
            return Err(ActionError::Validation("SetVariable: empty name".into()));
        }
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "SetVariable",
            Arc::new(SetVariableExec {
                name: self.name.clone(),
                value: self.value.clone(),
                persist: self.persist,
            }),
        );
        Ok(())
    }
}

struct SetVariableExec {
    name: String,
    value: String,
    persist: bool,
}

#[async_trait]
impl StepExec for SetVariableExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let resolved = routine_variables::interpolate(&self.value, bot.variables())?;
        if self.persist {
            bot.variables().set_persistent(self.name.clone(), resolved);
        } else {
            bot.variables().set(self.name.clone(), resolved);
        }
        Ok(())
    }
}

/// Reads a variable's current value and aliases it under another name.
pub struct GetVariable {
    /// The variable to read.
    pub name: String,
    /// The name to write the read value under.
    pub save_as: String,
}

impl Action for GetVariable {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        if self.name.is_empty() || self.save_as.is_empty() {
            return Err(ActionError::Validation(
                "GetVariable: 'name' and 'saveAs' must both be non-empty".into(),
            ));
        }
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "GetVariable",
            Arc::new(GetVariableExec {
                name: self.name.clone(),
                save_as: self.save_as.clone(),
            }),
        );
        Ok(())
    }
}

struct GetVariableExec {
    name: String,
    save_as: String,
}

#[async_trait]
impl StepExec for GetVariableExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let value = bot
            .variables()
            .get(&self.name)
            .ok_or_else(|| ActionError::VariableUndefined(self.name.clone()))?;
        bot.variables().set(self.save_as.clone(), value);
        Ok(())
    }
}

enum Step {
    Increment,
    Decrement,
}

/// Adds `amount` (interpolated, parsed as `f64`) to a numeric variable.
pub struct Increment {
    /// The variable to adjust.
    pub name: String,
    /// The amount to add, interpolated before parsing.
    pub amount: String,
}

impl Action for Increment {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        if self.name.is_empty() {
            return Err(ActionError::Validation("Increment: empty name".into()));
        }
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "Increment",
            Arc::new(AdjustExec {
                name: self.name.clone(),
                amount: self.amount.clone(),
                step: Step::Increment,
            }),
        );
        Ok(())
    }
}

/// Subtracts `amount` (interpolated, parsed as `f64`) from a numeric
/// variable.
pub struct Decrement {
    /// The variable to adjust.
    pub name: String,
    /// The amount to subtract, interpolated before parsing.
    pub amount: String,
}

impl Action for Decrement {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        if self.name.is_empty() {
            return Err(ActionError::Validation("Decrement: empty name".into()));
        }
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "Decrement",
            Arc::new(AdjustExec {
                name: self.name.clone(),
                amount: self.amount.clone(),
                step: Step::Decrement,
            }),
        );
        Ok(())
    }
}

struct AdjustExec {
    name: String,
    amount: String,
    step: Step,
}

#[async_trait]
impl StepExec for AdjustExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let amount_str = routine_variables::interpolate(&self.amount, bot.variables())?;
        let amount: f64 = amount_str
            .parse()
            .map_err(|_| ActionError::NotANumber(amount_str))?;

        let current_str = bot.variables().get(&self.name).unwrap_or_else(|| "0".into());
        let current: f64 = current_str
            .parse()
            .map_err(|_| ActionError::NotANumber(current_str))?;

        let updated = match self.step {
            Step::Increment => current + amount,
            Step::Decrement => current - amount,
        };
        bot.variables().set(self.name.clone(), format_number(updated));
        Ok(())
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub(crate) fn build_set_variable(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(SetVariable {
        name: require_str(value, "SetVariable", "name")?.to_string(),
        value: require_str(value, "SetVariable", "value")?.to_string(),
        persist: field_bool(value, "persist", false),
    }))
}

pub(crate) fn build_get_variable(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(GetVariable {
        name: require_str(value, "GetVariable", "name")?.to_string(),
        save_as: require_str(value, "GetVariable", "saveAs")?.to_string(),
    }))
}

pub(crate) fn build_increment(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(Increment {
        name: require_str(value, "Increment", "name")?.to_string(),
        amount: amount_field(value, "1"),
    }))
}

pub(crate) fn build_decrement(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(Decrement {
        name: require_str(value, "Decrement", "name")?.to_string(),
        amount: amount_field(value, "1"),
    }))
}

fn amount_field(value: &Value, default: &str) -> String {
    match value.get("amount") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => field_f64(value, "amount").map_or_else(|| default.to_string(), |f| f.to_string()),
        None => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestBotContext;

    #[tokio::test]
    async fn increment_parses_and_adds() {
        let bot = TestBotContext::new().with_variable("count", "4");
        AdjustExec {
            name: "count".into(),
            amount: "3".into(),
            step: Step::Increment,
        }
        .run(&bot)
        .await
        .unwrap();
        assert_eq!(bot.variables().get("count").as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn decrement_on_missing_variable_starts_from_zero() {
        let bot = TestBotContext::new();
        AdjustExec {
            name: "count".into(),
            amount: "2".into(),
            step: Step::Decrement,
        }
        .run(&bot)
        .await
        .unwrap();
        assert_eq!(bot.variables().get("count").as_deref(), Some("-2"));
    }

    #[tokio::test]
    async fn get_variable_aliases_value() {
        let bot = TestBotContext::new().with_variable("source", "hello");
        GetVariableExec {
            name: "source".into(),
            save_as: "alias".into(),
        }
        .run(&bot)
        .await
        .unwrap();
        assert_eq!(bot.variables().get("alias").as_deref(), Some("hello"));
    }
}
