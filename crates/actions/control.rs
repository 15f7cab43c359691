use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use routine_controller::ControllerError;
use serde_json::Value;

use crate::action::Action;
use crate::builder::StepBuilder;
use crate::condition::{Condition, ConditionRegistry};
use crate::context::{BotContext, BuildContext};
use crate::error::ActionError;
use crate::parse::{field_u64, require_array, require_str};
use crate::step::{Step, StepExec};

const LOOP_YIELD: Duration = Duration::from_millis(100);

async fn run_steps(steps: &[Step], bot: &dyn BotContext) -> Result<(), ActionError> {
    for step in steps {
        step.execute(bot).await?;
    }
    Ok(())
}

/// One `elseif` branch: a condition plus the actions to run if it matches.
pub struct ElseIf {
    /// The branch's condition.
    pub condition: Arc<dyn Condition>,
    /// The actions to run if `condition` is true and no earlier branch
    /// matched.
    pub then_branch: Vec<Box<dyn Action>>,
}

/// Evaluates its primary condition, else the first matching `elseif`, else
/// the `else` branch if present.
pub struct If {
    /// The primary condition.
    pub condition: Arc<dyn Condition>,
    /// Actions to run if the primary condition is true.
    pub then_branch: Vec<Box<dyn Action>>,
    /// `elseif` branches, tried in order.
    pub else_ifs: Vec<ElseIf>,
    /// Actions to run if nothing else matched.
    pub else_branch: Vec<Box<dyn Action>>,
}

impl Action for If {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        for (index, action) in self.then_branch.iter().enumerate() {
            action
                .validate(ctx)
                .map_err(|e| e.with_path_prefix(&format!("If -> nested action {index}")))?;
        }
        for else_if in &self.else_ifs {
            for (index, action) in else_if.then_branch.iter().enumerate() {
                action
                    .validate(ctx)
                    .map_err(|e| e.with_path_prefix(&format!("If (elseif) -> nested action {index}")))?;
            }
        }
        for (index, action) in self.else_branch.iter().enumerate() {
            action
                .validate(ctx)
                .map_err(|e| e.with_path_prefix(&format!("If (else) -> nested action {index}")))?;
        }
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        let then_steps = builder.build_nested(|sub| {
            for action in &self.then_branch {
                action.build(sub)?;
            }
            Ok(())
        })?;

        let mut else_if_steps = Vec::with_capacity(self.else_ifs.len());
        for else_if in &self.else_ifs {
            let steps = builder.build_nested(|sub| {
                for action in &else_if.then_branch {
                    action.build(sub)?;
                }
                Ok(())
            })?;
            else_if_steps.push((else_if.condition.clone(), steps));
        }

        let else_steps = builder.build_nested(|sub| {
            for action in &self.else_branch {
                action.build(sub)?;
            }
            Ok(())
        })?;

        builder.push(
            "If",
            Arc::new(IfExec {
                condition: self.condition.clone(),
                then_steps,
                else_ifs: else_if_steps,
                else_steps,
            }),
        );
        Ok(())
    }
}

struct IfExec {
    condition: Arc<dyn Condition>,
    then_steps: Vec<Step>,
    else_ifs: Vec<(Arc<dyn Condition>, Vec<Step>)>,
    else_steps: Vec<Step>,
}

#[async_trait]
impl StepExec for IfExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        if self.condition.evaluate(bot).await? {
            return run_steps(&self.then_steps, bot).await;
        }
        for (condition, steps) in &self.else_ifs {
            if condition.evaluate(bot).await? {
                return run_steps(steps, bot).await;
            }
        }
        run_steps(&self.else_steps, bot).await
    }
}

/// Loops while `condition` is true.
pub struct While {
    /// The loop condition.
    pub condition: Arc<dyn Condition>,
    /// Bound on iterations, 0 = unbounded.
    pub max_attempts: u32,
    /// The loop body.
    pub actions: Vec<Box<dyn Action>>,
}

impl Action for While {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        validate_body("While", &self.actions, ctx)
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        let steps = builder.build_nested(|sub| {
            for action in &self.actions {
                action.build(sub)?;
            }
            Ok(())
        })?;
        builder.push(
            "While",
            Arc::new(LoopExec {
                condition: self.condition.clone(),
                negate: false,
                max_attempts: self.max_attempts,
                steps,
            }),
        );
        Ok(())
    }
}

/// Loops while `condition` is false (i.e. until it becomes true).
pub struct Until {
    /// The loop condition; the loop continues while this is false.
    pub condition: Arc<dyn Condition>,
    /// Bound on iterations, 0 = unbounded.
    pub max_attempts: u32,
    /// The loop body.
    pub actions: Vec<Box<dyn Action>>,
}

impl Action for Until {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        validate_body("Until", &self.actions, ctx)
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        let steps = builder.build_nested(|sub| {
            for action in &self.actions {
                action.build(sub)?;
            }
            Ok(())
        })?;
        builder.push(
            "Until",
            Arc::new(LoopExec {
                condition: self.condition.clone(),
                negate: true,
                max_attempts: self.max_attempts,
                steps,
            }),
        );
        Ok(())
    }
}

fn validate_body(
    name: &str,
    actions: &[Box<dyn Action>],
    ctx: &BuildContext<'_>,
) -> Result<(), ActionError> {
    if actions.is_empty() {
        return Err(ActionError::Validation(format!("{name}: empty action list")));
    }
    for (index, action) in actions.iter().enumerate() {
        action
            .validate(ctx)
            .map_err(|e| e.with_path_prefix(&format!("{name} -> nested action {index}")))?;
    }
    Ok(())
}

struct LoopExec {
    condition: Arc<dyn Condition>,
    negate: bool,
    max_attempts: u32,
    steps: Vec<Step>,
}

#[async_trait]
impl StepExec for LoopExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        let mut iterations: u32 = 0;
        loop {
            bot.controller().checkpoint(bot.sentry_originated())?;
            let raw = self.condition.evaluate(bot).await?;
            let should_continue = if self.negate { !raw } else { raw };
            if !should_continue {
                return Ok(());
            }

            if self.max_attempts > 0 && iterations >= self.max_attempts {
                return Err(ActionError::MaxAttemptsExceeded(self.max_attempts));
            }
            iterations += 1;

            match run_steps(&self.steps, bot).await {
                Ok(()) => {}
                Err(err) if err.is_break() => return Ok(()),
                Err(err) => return Err(err),
            }

            tokio::time::sleep(LOOP_YIELD).await;
        }
    }
}

/// Runs a fixed number of iterations, unconditionally.
pub struct Repeat {
    /// Iteration count.
    pub count: u32,
    /// The loop body.
    pub actions: Vec<Box<dyn Action>>,
}

impl Action for Repeat {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        validate_body("Repeat", &self.actions, ctx)
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        let steps = builder.build_nested(|sub| {
            for action in &self.actions {
                action.build(sub)?;
            }
            Ok(())
        })?;
        builder.push(
            "Repeat",
            Arc::new(RepeatExec {
                count: self.count,
                steps,
            }),
        );
        Ok(())
    }
}

struct RepeatExec {
    count: u32,
    steps: Vec<Step>,
}

#[async_trait]
impl StepExec for RepeatExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        for _ in 0..self.count {
            bot.controller().checkpoint(bot.sentry_originated())?;
            match run_steps(&self.steps, bot).await {
                Ok(()) => {}
                Err(err) if err.is_break() => return Ok(()),
                Err(err) => return Err(err),
            }
            tokio::time::sleep(LOOP_YIELD).await;
        }
        Ok(())
    }
}

/// Unwinds exactly the innermost enclosing loop.
pub struct Break;

impl Action for Break {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push("Break", Arc::new(BreakExec));
        Ok(())
    }
}

struct BreakExec;

#[async_trait]
impl StepExec for BreakExec {
    async fn run(&self, _bot: &dyn BotContext) -> Result<(), ActionError> {
        Err(ActionError::from(ControllerError::BreakLoop))
    }
}

/// Resolves and executes a named sub-routine, seeding declared config
/// overrides into the bot's variable store first.
pub struct RunRoutine {
    /// The sub-routine's registered name.
    pub routine: String,
    /// Config-param overrides to seed before execution.
    pub config: IndexMap<String, String>,
}

impl Action for RunRoutine {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        if self.routine.is_empty() {
            return Err(ActionError::Validation("RunRoutine: empty routine name".into()));
        }
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "RunRoutine",
            Arc::new(RunRoutineExec {
                routine: self.routine.clone(),
                config: self.config.clone(),
            }),
        );
        Ok(())
    }
}

struct RunRoutineExec {
    routine: String,
    config: IndexMap<String, String>,
}

#[async_trait]
impl StepExec for RunRoutineExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        bot.run_sub_routine(&self.routine, &self.config)
            .await
            .map_err(|cause| ActionError::SubRoutine {
                routine: self.routine.clone(),
                cause: cause.to_string(),
            })
    }
}

fn nested_actions(value: &Value, action: &str, field: &str) -> Result<Vec<Box<dyn Action>>, ActionError> {
    let array = require_array(value, action, field)?;
    array.iter().map(crate::registry::build_action_from_value).collect()
}

fn optional_nested_actions(value: &Value, field: &str) -> Result<Vec<Box<dyn Action>>, ActionError> {
    match value.get(field).and_then(Value::as_array) {
        Some(array) => array.iter().map(crate::registry::build_action_from_value).collect(),
        None => Ok(Vec::new()),
    }
}

fn nested_condition(value: &Value, action: &str, field: &str) -> Result<Arc<dyn Condition>, ActionError> {
    let raw = value
        .get(field)
        .ok_or_else(|| ActionError::Validation(format!("{action}: missing nested field '{field}'")))?;
    Ok(Arc::from(ConditionRegistry::with_builtins().build(raw)?))
}

pub(crate) fn build_if(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    let else_ifs = match value.get("elseIfs").and_then(Value::as_array) {
        Some(array) => array
            .iter()
            .map(|entry| {
                Ok(ElseIf {
                    condition: nested_condition(entry, "If (elseif)", "condition")?,
                    then_branch: nested_actions(entry, "If (elseif)", "then")?,
                })
            })
            .collect::<Result<Vec<_>, ActionError>>()?,
        None => Vec::new(),
    };

    Ok(Box::new(If {
        condition: nested_condition(value, "If", "condition")?,
        then_branch: nested_actions(value, "If", "then")?,
        else_ifs,
        else_branch: optional_nested_actions(value, "else")?,
    }))
}

pub(crate) fn build_while(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(While {
        condition: nested_condition(value, "While", "condition")?,
        max_attempts: field_u64(value, "maxAttempts", 0) as u32,
        actions: nested_actions(value, "While", "actions")?,
    }))
}

pub(crate) fn build_until(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(Until {
        condition: nested_condition(value, "Until", "condition")?,
        max_attempts: field_u64(value, "maxAttempts", 0) as u32,
        actions: nested_actions(value, "Until", "actions")?,
    }))
}

pub(crate) fn build_repeat(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(Repeat {
        count: field_u64(value, "count", 1) as u32,
        actions: nested_actions(value, "Repeat", "actions")?,
    }))
}

pub(crate) fn build_break(_value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(Break))
}

pub(crate) fn build_run_routine(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    let routine = require_str(value, "RunRoutine", "routine")?.to_string();
    let mut config = IndexMap::new();
    if let Some(map) = value.get("config").and_then(Value::as_object) {
        for (key, entry) in map {
            let entry_str = entry
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| entry.to_string());
            config.insert(key.clone(), entry_str);
        }
    }
    Ok(Box::new(RunRoutine { routine, config }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestBotContext;
    use serde_json::json;

    #[tokio::test]
    async fn while_loop_breaks_on_break_action() {
        let action = build_while(&json!({
            "condition": {"type": "VariableEquals", "variable": "flag", "value": "yes"},
            "actions": [{"type": "Break"}]
        }))
        .unwrap();

        let templates = crate::template::TemplateRegistry::new();
        action.validate(&BuildContext::new(&templates)).unwrap();

        let mut builder = StepBuilder::new(&templates);
        action.build(&mut builder).unwrap();
        let steps = builder.into_steps();

        let bot = TestBotContext::new().with_variable("flag", "yes");
        for step in &steps {
            step.execute(&bot).await.unwrap();
        }
    }

    #[tokio::test]
    async fn if_else_if_chain_picks_first_match() {
        let action = build_if(&json!({
            "condition": {"type": "VariableEquals", "variable": "x", "value": "1"},
            "then": [{"type": "SetVariable", "name": "picked", "value": "primary"}],
            "elseIfs": [
                {
                    "condition": {"type": "VariableEquals", "variable": "x", "value": "2"},
                    "then": [{"type": "SetVariable", "name": "picked", "value": "elseif"}]
                }
            ],
            "else": [{"type": "SetVariable", "name": "picked", "value": "fallback"}]
        }))
        .unwrap();

        let templates = crate::template::TemplateRegistry::new();
        action.validate(&BuildContext::new(&templates)).unwrap();
        let mut builder = StepBuilder::new(&templates);
        action.build(&mut builder).unwrap();
        let steps = builder.into_steps();

        let bot = TestBotContext::new().with_variable("x", "2");
        for step in &steps {
            step.execute(&bot).await.unwrap();
        }
        assert_eq!(bot.variables().get("picked").as_deref(), Some("elseif"));
    }
}
