use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::action::Action;
use crate::builder::StepBuilder;
use crate::context::{BotContext, BuildContext};
use crate::error::ActionError;
use crate::parse::{require_i64, require_str};
use crate::step::StepExec;

/// Taps the screen at a fixed point.
pub struct Click {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
}

impl Action for Click {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        if self.x < 0 || self.y < 0 {
            return Err(ActionError::Validation(format!(
                "Click: coordinates must be non-negative, got ({}, {})",
                self.x, self.y
            )));
        }
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push("Click", Arc::new(ClickExec { x: self.x, y: self.y }));
        Ok(())
    }
}

struct ClickExec {
    x: i32,
    y: i32,
}

#[async_trait]
impl StepExec for ClickExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        bot.adb().click(self.x, self.y).await?;
        Ok(())
    }
}

/// Drags from one point to another over `duration_ms`.
pub struct Swipe {
    /// Starting X coordinate.
    pub x1: i32,
    /// Starting Y coordinate.
    pub y1: i32,
    /// Ending X coordinate.
    pub x2: i32,
    /// Ending Y coordinate.
    pub y2: i32,
    /// Drag duration in milliseconds.
    pub duration_ms: u64,
}

impl Action for Swipe {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        if [self.x1, self.y1, self.x2, self.y2].iter().any(|v| *v < 0) {
            return Err(ActionError::Validation(
                "Swipe: coordinates must be non-negative".into(),
            ));
        }
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "Swipe",
            Arc::new(SwipeExec {
                x1: self.x1,
                y1: self.y1,
                x2: self.x2,
                y2: self.y2,
                duration_ms: self.duration_ms,
            }),
        );
        Ok(())
    }
}

struct SwipeExec {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    duration_ms: u64,
}

#[async_trait]
impl StepExec for SwipeExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        bot.adb()
            .swipe(self.x1, self.y1, self.x2, self.y2, self.duration_ms)
            .await?;
        Ok(())
    }
}

/// Sends a named key event.
pub struct SendKey {
    /// Key name, e.g. `"KEYCODE_BACK"`.
    pub key: String,
}

impl Action for SendKey {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        if self.key.is_empty() {
            return Err(ActionError::Validation("SendKey: empty key name".into()));
        }
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "SendKey",
            Arc::new(SendKeyExec {
                key: self.key.clone(),
            }),
        );
        Ok(())
    }
}

struct SendKeyExec {
    key: String,
}

#[async_trait]
impl StepExec for SendKeyExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        bot.adb().send_key(&self.key).await?;
        Ok(())
    }
}

/// Types literal (interpolated) text into the focused field.
pub struct Input {
    /// The text to type, interpolated against the variable store.
    pub text: String,
}

impl Action for Input {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "Input",
            Arc::new(InputExec {
                text: self.text.clone(),
            }),
        );
        Ok(())
    }
}

struct InputExec {
    text: String,
}

#[async_trait]
impl StepExec for InputExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let resolved = routine_variables::interpolate(&self.text, bot.variables())?;
        bot.adb().input(&resolved).await?;
        Ok(())
    }
}

/// Blocks for a fixed duration, interruptible by a controller force-stop.
pub struct Sleep {
    /// Duration in milliseconds.
    pub ms: u64,
}

impl Action for Sleep {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push("Sleep", Arc::new(SleepExec { ms: self.ms }));
        Ok(())
    }
}

struct SleepExec {
    ms: u64,
}

#[async_trait]
impl StepExec for SleepExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let controller = bot.controller();
        tokio::task::block_in_place(|| {
            match controller.wait_timeout_or_stop(Duration::from_millis(self.ms)) {
                routine_controller::CheckOutcome::Continue => Ok(()),
                routine_controller::CheckOutcome::Stop => {
                    Err(ActionError::from(routine_controller::ControllerError::StoppedByController))
                }
            }
        })
    }
}

/// Sleeps `count * bot.delay_between_actions_ms()`.
pub struct Delay {
    /// Number of configured delay units to wait.
    pub count: u32,
}

impl Action for Delay {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push("Delay", Arc::new(DelayExec { count: self.count }));
        Ok(())
    }
}

struct DelayExec {
    count: u32,
}

#[async_trait]
impl StepExec for DelayExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let total_ms = u64::from(self.count) * bot.delay_between_actions_ms();
        let controller = bot.controller();
        tokio::task::block_in_place(|| {
            match controller.wait_timeout_or_stop(Duration::from_millis(total_ms)) {
                routine_controller::CheckOutcome::Continue => Ok(()),
                routine_controller::CheckOutcome::Stop => {
                    Err(ActionError::from(routine_controller::ControllerError::StoppedByController))
                }
            }
        })
    }
}

pub(crate) fn build_click(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(Click {
        x: require_i64(value, "Click", "x")? as i32,
        y: require_i64(value, "Click", "y")? as i32,
    }))
}

pub(crate) fn build_swipe(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(Swipe {
        x1: require_i64(value, "Swipe", "x1")? as i32,
        y1: require_i64(value, "Swipe", "y1")? as i32,
        x2: require_i64(value, "Swipe", "x2")? as i32,
        y2: require_i64(value, "Swipe", "y2")? as i32,
        duration_ms: crate::parse::field_u64(value, "duration", 0),
    }))
}

pub(crate) fn build_send_key(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(SendKey {
        key: require_str(value, "SendKey", "key")?.to_string(),
    }))
}

pub(crate) fn build_input(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(Input {
        text: require_str(value, "Input", "text")?.to_string(),
    }))
}

pub(crate) fn build_sleep(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(Sleep {
        ms: crate::parse::field_u64(value, "duration", 0),
    }))
}

pub(crate) fn build_delay(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(Delay {
        count: crate::parse::field_u64(value, "count", 1) as u32,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestBotContext;
    use routine_interfaces::FakeAdb;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn click_invokes_adb_at_coordinates() {
        let adb = StdArc::new(FakeAdb::new());
        let bot = TestBotContext::new().with_adb(adb.clone());
        ClickExec { x: 10, y: 20 }.run(&bot).await.unwrap();
        assert_eq!(adb.click_count(10, 20), 1);
    }

    #[test]
    fn click_rejects_negative_coordinates() {
        let click = Click { x: -1, y: 0 };
        let templates = crate::template::TemplateRegistry::new();
        assert!(click.validate(&BuildContext::new(&templates)).is_err());
    }
}
