//! Legacy image-condition control-flow actions, kept for routines authored
//! before the generic `If`/`While`/`Until` + `Condition` model existed. Each
//! is a thin wrapper that builds the equivalent generic condition and
//! delegates to the shared control-flow execution logic.

use std::sync::Arc;

use routine_interfaces::Region;
use serde_json::Value;

use crate::action::Action;
use crate::builder::StepBuilder;
use crate::condition::{All, Any, Condition, ImageExists, ImageNotExists, NoneOf};
use crate::context::BuildContext;
use crate::control::{ElseIf, If, Until, While};
use crate::error::ActionError;
use crate::parse::{field_f64, field_region, field_u64, require_array, require_str};

fn image_exists(template: &str, threshold: Option<f32>, region: Option<Region>) -> Arc<dyn Condition> {
    Arc::new(ImageExists {
        template: template.to_string(),
        threshold,
        region,
    })
}

fn image_not_exists(template: &str, threshold: Option<f32>, region: Option<Region>) -> Arc<dyn Condition> {
    Arc::new(ImageNotExists {
        inner: ImageExists {
            template: template.to_string(),
            threshold,
            region,
        },
    })
}

fn any_of(templates: &[String]) -> Arc<dyn Condition> {
    Arc::new(Any {
        conditions: templates
            .iter()
            .map(|t| Box::new(ImageExists { template: t.clone(), threshold: None, region: None }) as Box<dyn Condition>)
            .collect(),
    })
}

fn all_of(templates: &[String]) -> Arc<dyn Condition> {
    Arc::new(All {
        conditions: templates
            .iter()
            .map(|t| Box::new(ImageExists { template: t.clone(), threshold: None, region: None }) as Box<dyn Condition>)
            .collect(),
    })
}

fn none_of(templates: &[String]) -> Arc<dyn Condition> {
    Arc::new(NoneOf {
        conditions: templates
            .iter()
            .map(|t| Box::new(ImageExists { template: t.clone(), threshold: None, region: None }) as Box<dyn Condition>)
            .collect(),
    })
}

/// Loops while a single template is found.
pub struct WhileImageFound {
    inner: While,
}

impl Action for WhileImageFound {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        self.inner.validate(ctx)
    }
    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        self.inner.build(builder)
    }
}

/// Loops until a single template is found.
pub struct UntilImageFound {
    inner: Until,
}

impl Action for UntilImageFound {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        self.inner.validate(ctx)
    }
    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        self.inner.build(builder)
    }
}

/// Loops while any of several templates is found.
pub struct WhileAnyImagesFound {
    inner: While,
}

impl Action for WhileAnyImagesFound {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        self.inner.validate(ctx)
    }
    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        self.inner.build(builder)
    }
}

/// Loops until any of several templates is found.
pub struct UntilAnyImagesFound {
    inner: Until,
}

impl Action for UntilAnyImagesFound {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        self.inner.validate(ctx)
    }
    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        self.inner.build(builder)
    }
}

/// Runs `then` if a single template is found, else `else`.
pub struct IfImageFound {
    inner: If,
}

impl Action for IfImageFound {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        self.inner.validate(ctx)
    }
    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        self.inner.build(builder)
    }
}

/// Runs `then` if a single template is not found, else `else`.
pub struct IfImageNotFound {
    inner: If,
}

impl Action for IfImageNotFound {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        self.inner.validate(ctx)
    }
    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        self.inner.build(builder)
    }
}

/// Runs `then` if any of several templates is found, else `else`.
pub struct IfAnyImagesFound {
    inner: If,
}

impl Action for IfAnyImagesFound {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        self.inner.validate(ctx)
    }
    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        self.inner.build(builder)
    }
}

/// Runs `then` if every one of several templates is found, else `else`.
pub struct IfAllImagesFound {
    inner: If,
}

impl Action for IfAllImagesFound {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        self.inner.validate(ctx)
    }
    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        self.inner.build(builder)
    }
}

/// Runs `then` if none of several templates is found, else `else`.
pub struct IfNoImagesFound {
    inner: If,
}

impl Action for IfNoImagesFound {
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        self.inner.validate(ctx)
    }
    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        self.inner.build(builder)
    }
}

fn nested_actions(value: &Value, action: &str, field: &str) -> Result<Vec<Box<dyn Action>>, ActionError> {
    let array = require_array(value, action, field)?;
    array.iter().map(crate::registry::build_action_from_value).collect()
}

fn templates_field(value: &Value, action: &str) -> Result<Vec<String>, ActionError> {
    let array = require_array(value, action, "templates")?;
    array
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| ActionError::Validation(format!("{action}: 'templates' entries must be strings")))
        })
        .collect()
}

pub(crate) fn build_while_image_found(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    let template = require_str(value, "WhileImageFound", "template")?.to_string();
    let threshold = field_f64(value, "threshold").map(|f| f as f32);
    let region = field_region(value, "region");
    Ok(Box::new(WhileImageFound {
        inner: While {
            condition: image_exists(&template, threshold, region),
            max_attempts: field_u64(value, "maxAttempts", 0) as u32,
            actions: nested_actions(value, "WhileImageFound", "actions")?,
        },
    }))
}

pub(crate) fn build_until_image_found(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    let template = require_str(value, "UntilImageFound", "template")?.to_string();
    let threshold = field_f64(value, "threshold").map(|f| f as f32);
    let region = field_region(value, "region");
    Ok(Box::new(UntilImageFound {
        inner: Until {
            condition: image_exists(&template, threshold, region),
            max_attempts: field_u64(value, "maxAttempts", 0) as u32,
            actions: nested_actions(value, "UntilImageFound", "actions")?,
        },
    }))
}

pub(crate) fn build_while_any_images_found(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    let templates = templates_field(value, "WhileAnyImagesFound")?;
    Ok(Box::new(WhileAnyImagesFound {
        inner: While {
            condition: any_of(&templates),
            max_attempts: field_u64(value, "maxAttempts", 0) as u32,
            actions: nested_actions(value, "WhileAnyImagesFound", "actions")?,
        },
    }))
}

pub(crate) fn build_until_any_images_found(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    let templates = templates_field(value, "UntilAnyImagesFound")?;
    Ok(Box::new(UntilAnyImagesFound {
        inner: Until {
            condition: any_of(&templates),
            max_attempts: field_u64(value, "maxAttempts", 0) as u32,
            actions: nested_actions(value, "UntilAnyImagesFound", "actions")?,
        },
    }))
}

pub(crate) fn build_if_image_found(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    let template = require_str(value, "IfImageFound", "template")?.to_string();
    let threshold = field_f64(value, "threshold").map(|f| f as f32);
    let region = field_region(value, "region");
    Ok(Box::new(IfImageFound {
        inner: If {
            condition: image_exists(&template, threshold, region),
            then_branch: nested_actions(value, "IfImageFound", "then")?,
            else_ifs: Vec::<ElseIf>::new(),
            else_branch: optional_nested_actions(value, "else")?,
        },
    }))
}

pub(crate) fn build_if_image_not_found(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    let template = require_str(value, "IfImageNotFound", "template")?.to_string();
    let threshold = field_f64(value, "threshold").map(|f| f as f32);
    let region = field_region(value, "region");
    Ok(Box::new(IfImageNotFound {
        inner: If {
            condition: image_not_exists(&template, threshold, region),
            then_branch: nested_actions(value, "IfImageNotFound", "then")?,
            else_ifs: Vec::<ElseIf>::new(),
            else_branch: optional_nested_actions(value, "else")?,
        },
    }))
}

pub(crate) fn build_if_any_images_found(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    let templates = templates_field(value, "IfAnyImagesFound")?;
    Ok(Box::new(IfAnyImagesFound {
        inner: If {
            condition: any_of(&templates),
            then_branch: nested_actions(value, "IfAnyImagesFound", "then")?,
            else_ifs: Vec::<ElseIf>::new(),
            else_branch: optional_nested_actions(value, "else")?,
        },
    }))
}

pub(crate) fn build_if_all_images_found(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    let templates = templates_field(value, "IfAllImagesFound")?;
    Ok(Box::new(IfAllImagesFound {
        inner: If {
            condition: all_of(&templates),
            then_branch: nested_actions(value, "IfAllImagesFound", "then")?,
            else_ifs: Vec::<ElseIf>::new(),
            else_branch: optional_nested_actions(value, "else")?,
        },
    }))
}

pub(crate) fn build_if_no_images_found(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    let templates = templates_field(value, "IfNoImagesFound")?;
    Ok(Box::new(IfNoImagesFound {
        inner: If {
            condition: none_of(&templates),
            then_branch: nested_actions(value, "IfNoImagesFound", "then")?,
            else_ifs: Vec::<ElseIf>::new(),
            else_branch: optional_nested_actions(value, "else")?,
        },
    }))
}

fn optional_nested_actions(value: &Value, field: &str) -> Result<Vec<Box<dyn Action>>, ActionError> {
    match value.get(field).and_then(Value::as_array) {
        Some(array) => array.iter().map(crate::registry::build_action_from_value).collect(),
        None => Ok(Vec::new()),
    }
}
