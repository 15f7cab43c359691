use std::sync::Arc;

use async_trait::async_trait;
use routine_interfaces::AccountField;
use serde_json::Value;

use crate::action::Action;
use crate::builder::StepBuilder;
use crate::context::{BotContext, BuildContext};
use crate::error::ActionError;
use crate::parse::{field_str, require_account_field, require_i64, require_str};
use crate::step::StepExec;

const DEFAULT_ACCOUNT_VAR: &str = "device_account_id";

async fn resolve_account_id(bot: &dyn BotContext, account_var: &str) -> Result<String, ActionError> {
    let device_account = bot
        .variables()
        .get(account_var)
        .ok_or_else(|| ActionError::VariableUndefined(account_var.to_string()))?;
    let database = bot.database().ok_or(ActionError::NoDatabase)?;
    database
        .get_account_id_by_device_account(&device_account)
        .await?
        .ok_or_else(|| ActionError::Validation(format!(
            "no account row found for device account '{device_account}'"
        )))
}

/// Writes a single allow-listed field on the injected account's row.
pub struct UpdateAccountField {
    /// The variable holding the device-account identifier to resolve.
    pub account_var: String,
    /// The column to write.
    pub field: AccountField,
    /// The value to write, interpolated against the variable store first.
    pub value: String,
}

impl Action for UpdateAccountField {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "UpdateAccountField",
            Arc::new(UpdateAccountFieldExec {
                account_var: self.account_var.clone(),
                field: self.field,
                value: self.value.clone(),
            }),
        );
        Ok(())
    }
}

struct UpdateAccountFieldExec {
    account_var: String,
    field: AccountField,
    value: String,
}

#[async_trait]
impl StepExec for UpdateAccountFieldExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let account_id = resolve_account_id(bot, &self.account_var).await?;
        let resolved = routine_variables::interpolate(&self.value, bot.variables())?;
        bot.database()
            .ok_or(ActionError::NoDatabase)?
            .update_field(&account_id, self.field, &resolved)
            .await?;
        Ok(())
    }
}

/// Adds `amount` to a numeric allow-listed field on the injected account's
/// row, reading the current value first.
pub struct IncrementAccountField {
    /// The variable holding the device-account identifier to resolve.
    pub account_var: String,
    /// The column to adjust.
    pub field: AccountField,
    /// The amount to add.
    pub amount: i64,
}

impl Action for IncrementAccountField {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "IncrementAccountField",
            Arc::new(IncrementAccountFieldExec {
                account_var: self.account_var.clone(),
                field: self.field,
                amount: self.amount,
            }),
        );
        Ok(())
    }
}

struct IncrementAccountFieldExec {
    account_var: String,
    field: AccountField,
    amount: i64,
}

#[async_trait]
impl StepExec for IncrementAccountFieldExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let account_id = resolve_account_id(bot, &self.account_var).await?;
        let database = bot.database().ok_or(ActionError::NoDatabase)?;

        let current_str = database
            .get_field(&account_id, self.field)
            .await?
            .unwrap_or_else(|| "0".to_string());
        let current: i64 = current_str
            .parse()
            .map_err(|_| ActionError::NotANumber(current_str))?;

        database
            .update_field(&account_id, self.field, &(current + self.amount).to_string())
            .await?;
        Ok(())
    }
}

/// Reads a single allow-listed field off the injected account's row and
/// aliases it under a variable name.
pub struct GetAccountField {
    /// The variable holding the device-account identifier to resolve.
    pub account_var: String,
    /// The column to read.
    pub field: AccountField,
    /// The variable name to write the result under.
    pub save_as: String,
}

impl Action for GetAccountField {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        if self.save_as.is_empty() {
            return Err(ActionError::Validation("GetAccountField: empty saveAs".into()));
        }
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "GetAccountField",
            Arc::new(GetAccountFieldExec {
                account_var: self.account_var.clone(),
                field: self.field,
                save_as: self.save_as.clone(),
            }),
        );
        Ok(())
    }
}

struct GetAccountFieldExec {
    account_var: String,
    field: AccountField,
    save_as: String,
}

#[async_trait]
impl StepExec for GetAccountFieldExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let account_id = resolve_account_id(bot, &self.account_var).await?;
        let value = bot
            .database()
            .ok_or(ActionError::NoDatabase)?
            .get_field(&account_id, self.field)
            .await?
            .unwrap_or_default();
        bot.variables().set(self.save_as.clone(), value);
        Ok(())
    }
}

/// Records packs/picks progress against the enclosing routine execution.
pub struct UpdateRoutineMetrics {
    /// Packs opened, interpolated then parsed as an integer.
    pub packs: String,
    /// Wonder Picks used, interpolated then parsed as an integer.
    pub picks: String,
}

impl Action for UpdateRoutineMetrics {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "UpdateRoutineMetrics",
            Arc::new(UpdateRoutineMetricsExec {
                packs: self.packs.clone(),
                picks: self.picks.clone(),
            }),
        );
        Ok(())
    }
}

struct UpdateRoutineMetricsExec {
    packs: String,
    picks: String,
}

#[async_trait]
impl StepExec for UpdateRoutineMetricsExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let execution_id = bot
            .execution_id()
            .ok_or_else(|| ActionError::Validation("UpdateRoutineMetrics: no execution id set".into()))?;

        let packs_str = routine_variables::interpolate(&self.packs, bot.variables())?;
        let picks_str = routine_variables::interpolate(&self.picks, bot.variables())?;
        let packs: i64 = packs_str.parse().map_err(|_| ActionError::NotANumber(packs_str))?;
        let picks: i64 = picks_str.parse().map_err(|_| ActionError::NotANumber(picks_str))?;

        bot.database()
            .ok_or(ActionError::NoDatabase)?
            .update_routine_execution_metrics(execution_id, packs, picks)
            .await?;
        Ok(())
    }
}

pub(crate) fn build_update_account_field(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(UpdateAccountField {
        account_var: field_str(value, "accountVar").unwrap_or(DEFAULT_ACCOUNT_VAR).to_string(),
        field: require_account_field(value, "UpdateAccountField", "field")?,
        value: require_str(value, "UpdateAccountField", "value")?.to_string(),
    }))
}

pub(crate) fn build_increment_account_field(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(IncrementAccountField {
        account_var: field_str(value, "accountVar").unwrap_or(DEFAULT_ACCOUNT_VAR).to_string(),
        field: require_account_field(value, "IncrementAccountField", "field")?,
        amount: require_i64(value, "IncrementAccountField", "amount")?,
    }))
}

pub(crate) fn build_get_account_field(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(GetAccountField {
        account_var: field_str(value, "accountVar").unwrap_or(DEFAULT_ACCOUNT_VAR).to_string(),
        field: require_account_field(value, "GetAccountField", "field")?,
        save_as: require_str(value, "GetAccountField", "saveAs")?.to_string(),
    }))
}

pub(crate) fn build_update_routine_metrics(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(UpdateRoutineMetrics {
        packs: field_str(value, "packs").unwrap_or("0").to_string(),
        picks: field_str(value, "picks").unwrap_or("0").to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestBotContext;
    use routine_interfaces::InMemoryDatabase;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn update_then_get_account_field_round_trips() {
        let db = StdArc::new(InMemoryDatabase::new());
        db.seed_account("acct-1", "dev-1");
        let bot = TestBotContext::new()
            .with_database(db)
            .with_variable(DEFAULT_ACCOUNT_VAR, "dev-1");

        UpdateAccountFieldExec {
            account_var: DEFAULT_ACCOUNT_VAR.into(),
            field: AccountField::PacksOpened,
            value: "5".into(),
        }
        .run(&bot)
        .await
        .unwrap();

        GetAccountFieldExec {
            account_var: DEFAULT_ACCOUNT_VAR.into(),
            field: AccountField::PacksOpened,
            save_as: "packs".into(),
        }
        .run(&bot)
        .await
        .unwrap();

        assert_eq!(bot.variables().get("packs").as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn increment_account_field_adds_to_existing_value() {
        let db = StdArc::new(InMemoryDatabase::new());
        db.seed_account("acct-1", "dev-1");
        db.update_field("acct-1", AccountField::Shinedust, "10").await.unwrap();
        let bot = TestBotContext::new()
            .with_database(db.clone())
            .with_variable(DEFAULT_ACCOUNT_VAR, "dev-1");

        IncrementAccountFieldExec {
            account_var: DEFAULT_ACCOUNT_VAR.into(),
            field: AccountField::Shinedust,
            amount: 7,
        }
        .run(&bot)
        .await
        .unwrap();

        let value = db.get_field("acct-1", AccountField::Shinedust).await.unwrap();
        assert_eq!(value.as_deref(), Some("17"));
    }
}
