use std::sync::Arc;

use async_trait::async_trait;
use routine_interfaces::AccountOutcome;
use serde_json::Value;

use crate::action::Action;
use crate::builder::StepBuilder;
use crate::context::{BotContext, BuildContext};
use crate::error::ActionError;
use crate::parse::{field_str, field_u64, require_str};
use crate::step::StepExec;

/// The reserved variable `InjectNextAccount` writes the checked-out
/// device-account identifier to, unless overridden.
const DEFAULT_DEVICE_ACCOUNT_VAR: &str = "device_account_id";
/// The reserved variable `InjectNextAccount` writes the pool-internal
/// account id to, consumed by the other account-lifecycle actions.
const POOL_ACCOUNT_ID_VAR: &str = "account_pool_id";

/// Checks out the next available account from the shared pool, skipping
/// accounts already checked out per the database (when one is configured),
/// up to a bounded number of attempts.
pub struct InjectNextAccount {
    /// The variable to write the device-account identifier to.
    pub save_as: String,
    /// Bound on checkout attempts before giving up. `None` falls back to
    /// the bot's configured `max_account_retries` at execution time.
    pub max_attempts: Option<u32>,
}

impl Action for InjectNextAccount {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        if self.save_as.is_empty() {
            return Err(ActionError::Validation("InjectNextAccount: empty saveAs".into()));
        }
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "InjectNextAccount",
            Arc::new(InjectNextAccountExec {
                save_as: self.save_as.clone(),
                max_attempts: self.max_attempts,
            }),
        );
        Ok(())
    }
}

struct InjectNextAccountExec {
    save_as: String,
    max_attempts: Option<u32>,
}

#[async_trait]
impl StepExec for InjectNextAccountExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let pool = bot.account_pool().ok_or(ActionError::NoAccountPool)?;
        let max_attempts = self.max_attempts.unwrap_or_else(|| bot.max_account_retries()).max(1);

        for _ in 0..max_attempts {
            let account = pool.get_next().await?;

            if let Some(db) = bot.database() {
                if db.is_account_checked_out(&account.device_account).await?.is_some() {
                    pool.return_account(&account.id).await?;
                    continue;
                }
                db.checkout_account(&account.device_account, bot.bot_instance(), bot.bot_instance())
                    .await?;
            }

            bot.variables()
                .set_persistent(self.save_as.clone(), account.device_account.clone());
            bot.variables()
                .set_persistent(POOL_ACCOUNT_ID_VAR, account.id.clone());
            return Ok(());
        }

        Err(ActionError::Validation(format!(
            "InjectNextAccount: no account available after {max_attempts} attempts"
        )))
    }
}

fn account_ref(bot: &dyn BotContext) -> Result<String, ActionError> {
    bot.variables()
        .get(POOL_ACCOUNT_ID_VAR)
        .ok_or_else(|| ActionError::VariableUndefined(POOL_ACCOUNT_ID_VAR.to_string()))
}

/// Marks the currently injected account completed, recording its outcome.
pub struct CompleteAccount {
    /// Packs opened during the run.
    pub packs_opened: u32,
    /// Cards found during the run.
    pub cards_found: u32,
    /// Stars earned during the run.
    pub stars_total: u32,
    /// Items kept during the run.
    pub keep_count: u32,
}

impl Action for CompleteAccount {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "CompleteAccount",
            Arc::new(CompleteAccountExec {
                packs_opened: self.packs_opened,
                cards_found: self.cards_found,
                stars_total: self.stars_total,
                keep_count: self.keep_count,
            }),
        );
        Ok(())
    }
}

struct CompleteAccountExec {
    packs_opened: u32,
    cards_found: u32,
    stars_total: u32,
    keep_count: u32,
}

#[async_trait]
impl StepExec for CompleteAccountExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let pool = bot.account_pool().ok_or(ActionError::NoAccountPool)?;
        let id = account_ref(bot)?;
        pool.mark_used(
            &id,
            AccountOutcome {
                success: true,
                packs_opened: self.packs_opened,
                cards_found: self.cards_found,
                stars_total: self.stars_total,
                keep_count: self.keep_count,
                error: None,
                duration_ms: 0,
            },
        )
        .await?;
        Ok(())
    }
}

/// Returns the currently injected account to the pool without marking it
/// used or failed.
pub struct ReturnAccount;

impl Action for ReturnAccount {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push("ReturnAccount", Arc::new(ReturnAccountExec));
        Ok(())
    }
}

struct ReturnAccountExec;

#[async_trait]
impl StepExec for ReturnAccountExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let pool = bot.account_pool().ok_or(ActionError::NoAccountPool)?;
        let id = account_ref(bot)?;
        pool.return_account(&id).await?;
        Ok(())
    }
}

/// Marks the currently injected account failed, recording a reason.
pub struct MarkAccountFailed {
    /// The failure reason recorded against the account.
    pub reason: String,
}

impl Action for MarkAccountFailed {
    fn validate(&self, _ctx: &BuildContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError> {
        builder.push(
            "MarkAccountFailed",
            Arc::new(MarkAccountFailedExec {
                reason: self.reason.clone(),
            }),
        );
        Ok(())
    }
}

struct MarkAccountFailedExec {
    reason: String,
}

#[async_trait]
impl StepExec for MarkAccountFailedExec {
    async fn run(&self, bot: &dyn BotContext) -> Result<(), ActionError> {
        bot.controller().checkpoint(bot.sentry_originated())?;
        let pool = bot.account_pool().ok_or(ActionError::NoAccountPool)?;
        let id = account_ref(bot)?;
        pool.mark_failed(&id, &self.reason).await?;
        Ok(())
    }
}

pub(crate) fn build_inject_next_account(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(InjectNextAccount {
        save_as: field_str(value, "saveAs")
            .unwrap_or(DEFAULT_DEVICE_ACCOUNT_VAR)
            .to_string(),
        max_attempts: value.get("maxAttempts").and_then(Value::as_u64).map(|n| n as u32),
    }))
}

pub(crate) fn build_complete_account(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(CompleteAccount {
        packs_opened: field_u64(value, "packsOpened", 0) as u32,
        cards_found: field_u64(value, "cardsFound", 0) as u32,
        stars_total: field_u64(value, "starsTotal", 0) as u32,
        keep_count: field_u64(value, "keepCount", 0) as u32,
    }))
}

pub(crate) fn build_return_account(_value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(ReturnAccount))
}

pub(crate) fn build_mark_account_failed(value: &Value) -> Result<Box<dyn Action>, ActionError> {
    Ok(Box::new(MarkAccountFailed {
        reason: require_str(value, "MarkAccountFailed", "reason")?.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestBotContext;
    use routine_interfaces::{InterfaceError, PooledAccountRef};
    use std::sync::Arc as StdArc;
    use tokio::sync::Mutex as AsyncMutex;

    struct FakePool {
        accounts: AsyncMutex<Vec<PooledAccountRef>>,
        marked_used: AsyncMutex<Vec<(String, AccountOutcome)>>,
    }

    #[async_trait]
    impl routine_interfaces::AccountPoolHandle for FakePool {
        async fn get_next(&self) -> Result<PooledAccountRef, InterfaceError> {
            self.accounts
                .lock()
                .await
                .pop()
                .ok_or_else(|| InterfaceError::Unavailable("no accounts".into()))
        }

        async fn return_account(&self, id: &str) -> Result<(), InterfaceError> {
            self.accounts.lock().await.push(PooledAccountRef {
                id: id.to_string(),
                device_account: id.to_string(),
            });
            Ok(())
        }

        async fn mark_used(&self, id: &str, outcome: AccountOutcome) -> Result<(), InterfaceError> {
            self.marked_used.lock().await.push((id.to_string(), outcome));
            Ok(())
        }

        async fn mark_failed(&self, _id: &str, _reason: &str) -> Result<(), InterfaceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn inject_next_account_sets_reserved_variables() {
        let pool = StdArc::new(FakePool {
            accounts: AsyncMutex::new(vec![PooledAccountRef {
                id: "acct-1".into(),
                device_account: "dev-1".into(),
            }]),
            marked_used: AsyncMutex::new(vec![]),
        });
        let bot = TestBotContext::new().with_account_pool(pool);

        InjectNextAccountExec {
            save_as: DEFAULT_DEVICE_ACCOUNT_VAR.into(),
            max_attempts: Some(10),
        }
        .run(&bot)
        .await
        .unwrap();

        assert_eq!(
            bot.variables().get(DEFAULT_DEVICE_ACCOUNT_VAR).as_deref(),
            Some("dev-1")
        );
        assert_eq!(bot.variables().get(POOL_ACCOUNT_ID_VAR).as_deref(), Some("acct-1"));
    }

    #[tokio::test]
    async fn complete_account_marks_pool_with_outcome() {
        let pool = StdArc::new(FakePool {
            accounts: AsyncMutex::new(vec![]),
            marked_used: AsyncMutex::new(vec![]),
        });
        let bot = TestBotContext::new()
            .with_account_pool(pool.clone())
            .with_variable(POOL_ACCOUNT_ID_VAR, "acct-1");

        CompleteAccountExec {
            packs_opened: 3,
            cards_found: 10,
            stars_total: 2,
            keep_count: 1,
        }
        .run(&bot)
        .await
        .unwrap();

        let recorded = pool.marked_used.lock().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "acct-1");
        assert_eq!(recorded[0].1.packs_opened, 3);
    }
}
