use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::models::Meal;

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// --- Request ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<RequestContent>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct RequestContent {
    pub parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
pub struct RequestPart {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub response_schema: Value,
}

impl GenerateContentRequest {
    /// Single-turn prompt constrained to JSON matching `schema`.
    #[must_use]
    pub fn json(prompt: String, schema: Value) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: schema,
            },
        }
    }
}

// --- Response ---

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct CalorieEstimate {
    calories: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ShoppingSuggestion {
    #[serde(default)]
    items: Vec<String>,
}

// --- Calorie estimate ---

#[must_use]
pub fn calorie_prompt(food: &str, amount: &str) -> String {
    format!(
        "Você é um nutricionista experiente. Estime as calorias da refeição \"{amount} de {food}\".\n\
         Regras:\n\
         - Use a tabela TACO ou USDA como referência.\n\
         - Responda apenas com um objeto JSON com o campo \"calories\".\n\
         - \"calories\" deve ser um número inteiro.\n\
         - Se a descrição for vaga, use uma porção média.\n\
         Exemplo: {{\"calories\": 300}}"
    )
}

#[must_use]
pub fn calorie_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": { "calories": { "type": "INTEGER" } },
        "required": ["calories"]
    })
}

/// Read `{"calories": n}`; a missing or non-positive value is 0.
pub fn parse_calories(text: &str) -> Result<i64> {
    let estimate: CalorieEstimate =
        serde_json::from_str(text).context("calorie estimate is not valid JSON")?;
    Ok(match estimate.calories {
        Some(c) if c.is_finite() && c > 0.0 => c.round() as i64,
        _ => 0,
    })
}

// --- Shopping list ---

#[must_use]
pub fn shopping_prompt(meals: &[Meal]) -> String {
    let list = meals
        .iter()
        .map(|m| {
            if m.amount.trim().is_empty() {
                m.food.clone()
            } else {
                format!("{} de {}", m.amount, m.food)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Você é um assistente de nutrição. Monte uma lista de compras consolidada \
         para as seguintes refeições: [{list}].\n\
         Liste apenas os ingredientes crus necessários para preparar os pratos, \
         agrupando itens repetidos. Responda com um objeto JSON com o campo \"items\"."
    )
}

#[must_use]
pub fn shopping_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "items": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["items"]
    })
}

pub fn parse_shopping_items(text: &str) -> Result<Vec<String>> {
    let suggestion: ShoppingSuggestion =
        serde_json::from_str(text).context("shopping list is not valid JSON")?;
    Ok(dedup_items(suggestion.items))
}

/// Trim, drop blanks and remove case-insensitive duplicates, keeping the first
/// spelling.
#[must_use]
pub fn dedup_items<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let name = item.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.to_lowercase()) {
            out.push(name.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MealCategory;

    fn meal(food: &str, amount: &str) -> Meal {
        Meal {
            id: "m1".to_string(),
            user_id: "Thiago".to_string(),
            week_number: 1,
            day_of_week: 0,
            category: MealCategory::Lunch,
            food: food.to_string(),
            amount: amount.to_string(),
            calories: 0,
            consumed: false,
        }
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let req = GenerateContentRequest::json("hi".to_string(), calorie_schema());
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(
            value["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(value["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[test]
    fn test_response_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"calo"},{"text":"ries\": 250}"}]}}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.text().as_deref(), Some(r#"{"calories": 250}"#));
    }

    #[test]
    fn test_response_without_candidates() {
        let resp: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.text().is_none());

        let blocked: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(blocked.text().is_none());
    }

    #[test]
    fn test_parse_calories() {
        assert_eq!(parse_calories(r#"{"calories": 300}"#).unwrap(), 300);
        assert_eq!(parse_calories(r#"{"calories": 152.6}"#).unwrap(), 153);
        assert_eq!(parse_calories(r#"{"calories": -5}"#).unwrap(), 0);
        assert_eq!(parse_calories(r#"{"kcal": 300}"#).unwrap(), 0);
        assert!(parse_calories("three hundred").is_err());
    }

    #[test]
    fn test_calorie_prompt_mentions_meal() {
        let prompt = calorie_prompt("arroz branco", "200g");
        assert!(prompt.contains("200g de arroz branco"));
        assert!(prompt.contains("\"calories\""));
    }

    #[test]
    fn test_shopping_prompt_lists_meals() {
        let prompt = shopping_prompt(&[meal("frango grelhado", "150g"), meal("maçã", "")]);
        assert!(prompt.contains("[150g de frango grelhado, maçã]"));
    }

    #[test]
    fn test_parse_shopping_items_dedups() {
        let items =
            parse_shopping_items(r#"{"items": ["Arroz", " arroz ", "Feijão", "", "Ovos"]}"#)
                .unwrap();
        assert_eq!(items, ["Arroz", "Feijão", "Ovos"]);
        assert!(parse_shopping_items("{}").unwrap().is_empty());
        assert!(parse_shopping_items("[").is_err());
    }
}
