use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use routine_interfaces::Region;
use serde_json::Value;

use crate::action::Action;
use crate::builder::StepBuilder;
use crate::context::{BotContext, BuildContext};
use crate::error::ActionError;
use crate::parse::{field_f64, field_region, field_u64, require_str};
use crate::step::StepExec;

fn validate_template(action: &str, ctx: &BuildContext<'_>, template: &str) -> Result<(), ActionError> {
    if template.is_empty() {
        return Err(ActionError::Validation(format!("{action}: empty template name")));
    }
    if !ctx.templates().contains(template) {
        return Err(ActionError::Validation(format!(
            "{action}: template '{template}' not found in registry"
        )));
    }
    Ok(())
}

/// Looks up a template, recording whether it was found but taking no
/// device action either way.
pub struct FindImage {
    /// The template name to look up.
    pub template: String,
    /// Optional threshold override.
    pub threshold: Option<f32>,
    /// Optional search-region override.
    pub region: Option<Region>,
}

impl Action for FindImage {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        validate_template("FindImage", ctx, &self.template)
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "FindImage",
            Arc::new(FindImageExec {
                template: self.template.clone(),
                threshold: self.threshold,
                region: self.region,
            }),
        );
        Ok(())
    }
}

struct FindImageExec {
    template: String,
    threshold: Option<f32>,
    region: Option<Region>,
}

#[async_trait]
impl StepExec for FindImageExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let config = bot.templates()
            .resolve(&self.template, self.threshold, self.region, bot.default_template_threshold())?;
        bot.cv().find_template(&self.template, config).await?;
        Ok(())
    }
}

/// Clicks a fixed point if the named template is found.
pub struct ClickIfImageFound {
    /// The template to look up.
    pub template: String,
    /// X coordinate to click if found.
    pub x: i32,
    /// Y coordinate to click if found.
    pub y: i32,
    /// Optional threshold override.
    pub threshold: Option<f32>,
    /// Optional search-region override.
    pub region: Option<Region>,
}

impl Action for ClickIfImageFound {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        validate_template("ClickIfImageFound", ctx, &self.template)
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "ClickIfImageFound",
            Arc::new(ClickIfFoundExec {
                template: self.template.clone(),
                x: self.x,
                y: self.y,
                threshold: self.threshold,
                region: self.region,
                invert: false,
            }),
        );
        Ok(())
    }
}

/// Clicks a fixed point if the named template is not found.
pub struct ClickIfImageNotFound {
    /// The template to look up.
    pub template: String,
    /// X coordinate to click if not found.
    pub x: i32,
    /// Y coordinate to click if not found.
    pub y: i32,
    /// Optional threshold override.
    pub threshold: Option<f32>,
    /// Optional search-region override.
    pub region: Option<Region>,
}

impl Action for ClickIfImageNotFound {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        validate_template("ClickIfImageNotFound", ctx, &self.template)
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "ClickIfImageNotFound",
            Arc::new(ClickIfFoundExec {
                template: self.template.clone(),
                x: self.x,
                y: self.y,
                threshold: self.threshold,
                region: self.region,
                invert: true,
            }),
        );
        Ok(())
    }
}

struct ClickIfFoundExec {
    template: String,
    x: i32,
    y: i32,
    threshold: Option<f32>,
    region: Option<Region>,
    invert: bool,
}

#[async_trait]
impl StepExec for ClickIfFoundExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let config = bot.templates()
            .resolve(&self.template, self.threshold, self.region, bot.default_template_threshold())?;
        let result = bot.cv().find_template(&self.template, config).await?;
        if result.found != self.invert {
            bot.adb().click(self.x, self.y).await?;
        }
        Ok(())
    }
}

/// Polls for a template until found or `timeout_ms` elapses.
pub struct WaitForImage {
    /// The template to wait for.
    pub template: String,
    /// Timeout in milliseconds.
    pub timeout_ms: u64,
    /// Optional threshold override.
    pub threshold: Option<f32>,
    /// Optional search-region override.
    pub region: Option<Region>,
}

impl Action for WaitForImage {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        validate_template("WaitForImage", ctx, &self.template)
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "WaitForImage",
            Arc::new(WaitForImageExec {
                template: self.template.clone(),
                timeout_ms: self.timeout_ms,
                threshold: self.threshold,
                region: self.region,
            }),
        );
        Ok(())
    }
}

struct WaitForImageExec {
    template: String,
    timeout_ms: u64,
    threshold: Option<f32>,
    region: Option<Region>,
}

#[async_trait]
impl StepExec for WaitForImageExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let config = bot.templates()
            .resolve(&self.template, self.threshold, self.region, bot.default_template_threshold())?;
        let result = bot
            .cv()
            .wait_for_template(&self.template, config, Duration::from_millis(self.timeout_ms))
            .await?;
        if result.found {
            Ok(())
        } else {
            Err(ActionError::Timeout(self.template.clone()))
        }
    }
}

pub(crate) fn build_find_image(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(FindImage {
        template: require_str(value, "FindImage", "template")?.to_string(),
        threshold: field_f64(value, "threshold").map(|f| f as f32),
        region: field_region(value, "region"),
    }))
}

pub(crate) fn build_click_if_found(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(ClickIfImageFound {
        template: require_str(value, "ClickIfImageFound", "template")?.to_string(),
        x: field_u64(value, "x", 0) as i32,
        y: field_u64(value, "y", 0) as i32,
        threshold: field_f64(value, "threshold").map(|f| f as f32),
        region: field_region(value, "region"),
    }))
}

pub(crate) fn build_click_if_not_found(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(ClickIfImageNotFound {
        template: require_str(value, "ClickIfImageNotFound", "template")?.to_string(),
        x: field_u64(value, "x", 0) as i32,
        y: field_u64(value, "y", 0) as i32,
        threshold: field_f64(value, "threshold").map(|f| f as f32),
        region: field_region(value, "region"),
    }))
}

pub(crate) fn build_wait_for_image(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(WaitForImage {
        template: require_str(value, "WaitForImage", "template")?.to_string(),
        timeout_ms: field_u64(value, "timeout", 5000),
        threshold: field_f64(value, "threshold").map(|f| f as f32),
        region: field_region(value, "region"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{TemplateConfig, TemplateRegistry};
    use crate::test_support::TestBotContext;
    use routine_interfaces::{FakeAdb, FakeCv, TemplateMatch};
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn click_if_found_clicks_only_when_present() {
        let cv = StdArc::new(FakeCv::new().with_responses(
            "Pack",
            vec![TemplateMatch::found_at(routine_interfaces::Point::new(1, 1), 0.9)],
        ));
        let adb = StdArc::new(FakeAdb::new());
        let mut templates = TemplateRegistry::new();
        templates.register("Pack", TemplateConfig::new(0.8));
        let bot = TestBotContext::new()
            .with_cv(cv)
            .with_adb(adb.clone())
            .with_templates(templates);

        ClickIfFoundExec {
            template: "Pack".into(),
            x: 5,
            y: 6,
            threshold: None,
            region: None,
            invert: false,
        }
        .run(&bot)
        .await
        .unwrap();

        assert_eq!(adb.click_count(5, 6), 1);
    }
}
