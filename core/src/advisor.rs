use anyhow::Result;

use crate::models::Meal;

/// Generative nutrition helper.
///
/// The CLI implements this over the Gemini REST API with reqwest. Called
/// synchronously from `NutriService`; async callers (the REST server) use the
/// client's async methods and hand the result to the service instead.
pub trait NutritionAdvisor: Send + Sync {
    /// Integer calorie estimate for `amount` of `food`.
    fn estimate_calories(&self, food: &str, amount: &str) -> Result<i64>;

    /// Deduplicated grocery item names needed to prepare `meals`.
    fn suggest_shopping_list(&self, meals: &[Meal]) -> Result<Vec<String>>;
}
