mod habits;
mod helpers;
mod meal;
mod shopping;
mod summary;
mod weight;

use anyhow::Result;

use crate::config::Config;
use crate::gemini::GeminiClient;
use nutri_core::service::NutriService;

use helpers::match_id;

pub(crate) use habits::{cmd_exercise_rm, cmd_exercise_toggle, cmd_water_add, cmd_water_rm};
pub(crate) use meal::{
    MealInput, cmd_meal_add, cmd_meal_copy_day, cmd_meal_edit, cmd_meal_rm, cmd_meal_toggle,
};
pub(crate) use shopping::{cmd_shop_generate, cmd_shop_show, cmd_shop_toggle};
pub(crate) use summary::{cmd_profile, cmd_today, cmd_week};
pub(crate) use weight::{cmd_weight_history, cmd_weight_log, cmd_weight_rm};

/// Everything a single CLI command works with.
pub(crate) struct Session<'a> {
    pub svc: NutriService,
    pub user: String,
    pub config: &'a Config,
    pub rt: tokio::runtime::Handle,
}

impl<'a> Session<'a> {
    pub fn new(
        svc: NutriService,
        user: Option<&str>,
        config: &'a Config,
        rt: tokio::runtime::Handle,
    ) -> Result<Self> {
        let user = match user {
            Some(name) => svc.resolve_user(name)?,
            None => svc.household().default_user().to_string(),
        };
        Ok(Self {
            svc,
            user,
            config,
            rt,
        })
    }

    /// Gemini client; fails with `ConfigError::MissingCredential` without a key.
    pub fn advisor(&self) -> Result<GeminiClient> {
        let key = self.config.require_api_key()?;
        GeminiClient::new(&self.config.ai, key, self.rt.clone())
    }

    pub fn resolve_meal_id(&mut self, wanted: &str) -> Result<Option<String>> {
        let state = self.svc.snapshot();
        match_id(
            state
                .meals
                .iter()
                .filter(|m| m.user_id == self.user)
                .map(|m| m.id.as_str()),
            wanted,
        )
    }

    pub fn resolve_shopping_id(&mut self, wanted: &str) -> Result<Option<String>> {
        let state = self.svc.snapshot();
        match_id(
            state
                .shopping_lists
                .iter()
                .filter(|i| i.user_id == self.user)
                .map(|i| i.id.as_str()),
            wanted,
        )
    }
}
