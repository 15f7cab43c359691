use indexmap::IndexMap;
use serde_json::Value;

use crate::account_ops::{build_complete_account, build_inject_next_account, build_mark_account_failed, build_return_account};
use crate::action::Action;
use crate::control::{build_break, build_if, build_repeat, build_run_routine, build_until, build_while};
use crate::database_ops::{
    build_get_account_field, build_increment_account_field, build_update_account_field, build_update_routine_metrics,
};
use crate::error::ActionError;
use crate::input::{build_click, build_delay, build_input, build_send_key, build_sleep, build_swipe};
use crate::legacy::{
    build_if_all_images_found, build_if_any_images_found, build_if_image_found, build_if_image_not_found,
    build_if_no_images_found, build_until_any_images_found, build_until_image_found, build_while_any_images_found,
    build_while_image_found,
};
use crate::parse::require_str;
use crate::template_actions::{build_click_if_found, build_click_if_not_found, build_find_image, build_wait_for_image};
use crate::variable_ops::{build_decrement, build_get_variable, build_increment, build_set_variable};

type ActionFactory = fn(&Value) -> Result<Box<dyn Action>, ActionError>;

/// Maps lowercased `type` strings in a deserialized routine step to the
/// `Action` constructor for that variant.
pub struct ActionRegistry {
    factories: IndexMap<String, ActionFactory>,
}

impl ActionRegistry {
    /// Builds the registry with every built-in action type registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut factories: IndexMap<String, ActionFactory> = IndexMap::new();

        factories.insert("click".into(), build_click);
        factories.insert("swipe".into(), build_swipe);
        factories.insert("sendkey".into(), build_send_key);
        factories.insert("input".into(), build_input);
        factories.insert("sleep".into(), build_sleep);
        factories.insert("delay".into(), build_delay);

        factories.insert("findimage".into(), build_find_image);
        factories.insert("clickifimagefound".into(), build_click_if_found);
        factories.insert("clickifimagenotfound".into(), build_click_if_not_found);
        factories.insert("waitforimage".into(), build_wait_for_image);

        factories.insert("if".into(), build_if);
        factories.insert("while".into(), build_while);
        factories.insert("until".into(), build_until);
        factories.insert("repeat".into(), build_repeat);
        factories.insert("break".into(), build_break);
        factories.insert("runroutine".into(), build_run_routine);

        factories.insert("setvariable".into(), build_set_variable);
        factories.insert("getvariable".into(), build_get_variable);
        factories.insert("increment".into(), build_increment);
        factories.insert("decrement".into(), build_decrement);

        factories.insert("injectnextaccount".into(), build_inject_next_account);
        factories.insert("completeaccount".into(), build_complete_account);
        factories.insert("returnaccount".into(), build_return_account);
        factories.insert("markaccountfailed".into(), build_mark_account_failed);

        factories.insert("updateaccountfield".into(), build_update_account_field);
        factories.insert("incrementaccountfield".into(), build_increment_account_field);
        factories.insert("getaccountfield".into(), build_get_account_field);
        factories.insert("updateroutinemetrics".into(), build_update_routine_metrics);

        factories.insert("whileimagefound".into(), build_while_image_found);
        factories.insert("untilimagefound".into(), build_until_image_found);
        factories.insert("whileanyimagesfound".into(), build_while_any_images_found);
        factories.insert("untilanyimagesfound".into(), build_until_any_images_found);
        factories.insert("untilanyfound".into(), build_until_any_images_found);
        factories.insert("ifimagefound".into(), build_if_image_found);
        factories.insert("ifimagenotfound".into(), build_if_image_not_found);
        factories.insert("ifanyimagesfound".into(), build_if_any_images_found);
        factories.insert("ifallimagesfound".into(), build_if_all_images_found);
        factories.insert("ifnoimagesfound".into(), build_if_no_images_found);

        Self { factories }
    }

    /// Builds an action from its deserialized `{type, ...}` record.
    pub fn build(&self, value: &Value) -> Result<Box<dyn Action>, ActionError> {
        let type_name = require_str(value, "action", "type")?.to_lowercase();
        let factory = self.factories.get(&type_name).ok_or_else(|| {
            ActionError::Validation(format!(
                "unknown action type '{type_name}', registered: {:?}",
                self.factories.keys().collect::<Vec<_>>()
            ))
        })?;
        factory(value)
    }
}

/// Recursive entry point used by composite actions (`If`/`While`/`Until`/
/// `Repeat` and the legacy image-condition wrappers) to lower a nested
/// action record without depending on a shared registry instance.
pub(crate) fn build_action_from_value(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    ActionRegistry::with_builtins().build(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_builds_click_and_rejects_unknown_type() {
        let registry = ActionRegistry::with_builtins();
        assert!(registry.build(&json!({"type": "Click", "x": 1, "y": 2})).is_ok());
        assert!(registry.build(&json!({"type": "Bogus"})).is_err());
    }

    #[test]
    fn registry_builds_nested_if_action() {
        let registry = ActionRegistry::with_builtins();
        let value = json!({
            "type": "If",
            "condition": {"type": "VariableEquals", "variable": "x", "value": "1"},
            "then": [{"type": "Click", "x": 1, "y": 1}]
        });
        assert!(registry.build(&value).is_ok());
    }
}
