use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

use nutri_core::advisor::NutritionAdvisor;
use nutri_core::gemini::{
    GenerateContentRequest, GenerateContentResponse, calorie_prompt, calorie_schema,
    parse_calories, parse_shopping_items, shopping_prompt, shopping_schema,
};
use nutri_core::models::Meal;

use crate::config::AiConfig;

pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    rt: tokio::runtime::Handle,
}

impl GeminiClient {
    pub fn new(ai: &AiConfig, api_key: &str, rt: tokio::runtime::Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "nutri-cli/{} (meal planner)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(ai.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: generate_endpoint(&ai.base_url, &ai.model),
            api_key: api_key.to_string(),
            rt,
        })
    }

    async fn generate(&self, prompt: String, schema: Value) -> Result<String> {
        let body = GenerateContentRequest::json(prompt, schema);
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to reach Gemini API")?
            .error_for_status()
            .context("Gemini API returned an error")?;

        let data: GenerateContentResponse = resp
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        data.text().context("Gemini response had no text")
    }

    pub async fn estimate_calories_async(&self, food: &str, amount: &str) -> Result<i64> {
        let text = self
            .generate(calorie_prompt(food, amount), calorie_schema())
            .await?;
        let calories = parse_calories(&text)?;
        tracing::debug!(food, amount, calories, "calorie estimate received");
        Ok(calories)
    }

    pub async fn suggest_shopping_list_async(&self, meals: &[Meal]) -> Result<Vec<String>> {
        let text = self
            .generate(shopping_prompt(meals), shopping_schema())
            .await?;
        let items = parse_shopping_items(&text)?;
        tracing::debug!(meals = meals.len(), items = items.len(), "shopping list received");
        Ok(items)
    }
}

impl NutritionAdvisor for GeminiClient {
    fn estimate_calories(&self, food: &str, amount: &str) -> Result<i64> {
        self.rt.block_on(self.estimate_calories_async(food, amount))
    }

    fn suggest_shopping_list(&self, meals: &[Meal]) -> Result<Vec<String>> {
        self.rt.block_on(self.suggest_shopping_list_async(meals))
    }
}

fn generate_endpoint(base_url: &str, model: &str) -> String {
    format!(
        "{}/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutri_core::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};

    fn ai_config() -> AiConfig {
        AiConfig {
            api_key: std::env::var("NUTRI_API_KEY").ok(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            generate_endpoint("https://example.test/v1beta/", "gemini-3-flash-preview"),
            "https://example.test/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[tokio::test]
    async fn test_client_uses_configured_endpoint() {
        let mut ai = ai_config();
        ai.base_url = "http://localhost:9/v1beta".to_string();
        ai.model = "test-model".to_string();
        let client = GeminiClient::new(&ai, "k", tokio::runtime::Handle::current()).unwrap();
        assert_eq!(
            client.endpoint,
            "http://localhost:9/v1beta/models/test-model:generateContent"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let mut ai = ai_config();
        ai.base_url = "http://127.0.0.1:9".to_string();
        ai.timeout_secs = 2;
        let client = GeminiClient::new(&ai, "k", tokio::runtime::Handle::current()).unwrap();
        assert!(client.estimate_calories_async("arroz", "100g").await.is_err());
    }

    // --- Integration tests (hit the real Gemini API) ---

    #[tokio::test]
    #[ignore = "hits Gemini API, needs NUTRI_API_KEY"]
    async fn test_estimate_calories_live() {
        let ai = ai_config();
        let key = ai.api_key.clone().expect("NUTRI_API_KEY must be set");
        let client = GeminiClient::new(&ai, &key, tokio::runtime::Handle::current()).unwrap();
        let calories = client
            .estimate_calories_async("arroz branco cozido", "100g")
            .await
            .unwrap();
        assert!(calories > 0);
    }
}
