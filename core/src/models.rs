use std::fmt;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::calendar::{MAX_WEEK, WORKDAYS};
use crate::slot;

/// Household members used when no configuration overrides them.
pub const DEFAULT_HOUSEHOLD: &[&str] = &["Thiago", "Marcela"];

/// The five fixed meal categories of the weekly grid, in serving order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MealCategory {
    Breakfast,
    Lunch,
    Snack,
    Dinner,
    LateSnack,
}

impl MealCategory {
    pub const ALL: [MealCategory; 5] = [
        MealCategory::Breakfast,
        MealCategory::Lunch,
        MealCategory::Snack,
        MealCategory::Dinner,
        MealCategory::LateSnack,
    ];

    /// Label stored in the household document and shown to users.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Breakfast => "Café da Manhã",
            Self::Lunch => "Almoço",
            Self::Snack => "Lanche",
            Self::Dinner => "Jantar",
            Self::LateSnack => "Ceia",
        }
    }

    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Snack => "snack",
            Self::Dinner => "dinner",
            Self::LateSnack => "late-snack",
        }
    }

    /// Exact label match, no fallback.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

impl fmt::Display for MealCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for MealCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

// Older documents stored a clock time ("07:00") instead of a label.
impl<'de> Deserialize<'de> for MealCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(slot::categorize(&raw))
    }
}

/// Strict parser for user input: accepts slugs and labels (case-insensitive).
pub fn parse_meal_category(input: &str) -> Result<MealCategory> {
    let wanted = input.trim().to_lowercase();
    let found = MealCategory::ALL.into_iter().find(|c| {
        c.slug() == wanted
            || c.label().to_lowercase() == wanted
            || c.slug().replace('-', "") == wanted
    });
    match found {
        Some(c) => Ok(c),
        None => bail!(
            "Invalid meal category '{input}'. Must be one of: {}",
            MealCategory::ALL.map(MealCategory::slug).join(", ")
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: String,
    pub user_id: String,
    #[serde(deserialize_with = "deserialize_week")]
    pub week_number: u32,
    #[serde(deserialize_with = "deserialize_day")]
    pub day_of_week: u8,
    #[serde(rename = "time")]
    pub category: MealCategory,
    pub food: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default, deserialize_with = "deserialize_calories")]
    pub calories: i64,
    #[serde(default)]
    pub consumed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightLog {
    pub user_id: String,
    pub date: NaiveDate,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterLog {
    pub user_id: String,
    pub date: NaiveDate,
    #[serde(deserialize_with = "deserialize_calories")]
    pub amount_ml: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseLog {
    pub user_id: String,
    pub date: NaiveDate,
    #[serde(default = "default_true")]
    pub completed: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    pub id: String,
    #[serde(deserialize_with = "deserialize_week")]
    pub week_number: u32,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub bought: bool,
}

/// The whole household document, replicated wholesale on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub meals: Vec<Meal>,
    #[serde(default)]
    pub weight_logs: Vec<WeightLog>,
    #[serde(default)]
    pub water_logs: Vec<WaterLog>,
    #[serde(default)]
    pub exercise_logs: Vec<ExerciseLog>,
    #[serde(default)]
    pub shopping_lists: Vec<ShoppingItem>,
}

#[derive(Debug, Clone)]
pub struct NewMeal {
    pub week: u32,
    pub day: u8,
    pub category: MealCategory,
    pub food: String,
    pub amount: String,
    /// `None` or a non-positive value asks the advisor for an estimate.
    pub calories: Option<i64>,
}

// --- Views ---

#[derive(Debug, Clone, Serialize)]
pub struct DailyOverview {
    pub user: String,
    pub date: NaiveDate,
    pub week: u32,
    pub day: u8,
    pub day_name: &'static str,
    pub meals: Vec<Meal>,
    pub consumed_calories: i64,
    pub planned_calories: i64,
    pub water_ml: i64,
    pub exercised: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotCell {
    pub category: MealCategory,
    pub meals: Vec<Meal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayColumn {
    pub day: u8,
    pub day_name: &'static str,
    pub date: NaiveDate,
    pub consumed_calories: i64,
    pub slots: Vec<SlotCell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyGrid {
    pub user: String,
    pub week: u32,
    pub days: Vec<DayColumn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShoppingListView {
    pub user: String,
    pub week: u32,
    pub items: Vec<ShoppingItem>,
    pub bought: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_weight: Option<f64>,
    pub weights: Vec<WeightLog>,
    pub exercise_dates: Vec<NaiveDate>,
    pub exercise_count: usize,
    pub water_logs: Vec<WaterLog>,
}

// --- Household ---

/// The configured set of users sharing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Household {
    users: Vec<String>,
}

impl Household {
    pub fn new<I, S>(users: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = Vec::new();
        for user in users {
            let name = user.as_ref().trim();
            if name.is_empty() {
                bail!("Household user names must not be empty");
            }
            if names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                bail!("Duplicate household user '{name}'");
            }
            names.push(name.to_string());
        }
        if names.is_empty() {
            bail!("Household must have at least one user");
        }
        Ok(Self { users: names })
    }

    #[must_use]
    pub fn users(&self) -> &[String] {
        &self.users
    }

    #[must_use]
    pub fn default_user(&self) -> &str {
        &self.users[0]
    }

    /// Resolve a user name case-insensitively to its configured spelling.
    pub fn resolve(&self, name: &str) -> Result<String> {
        let name = name.trim();
        match self.users.iter().find(|u| u.to_lowercase() == name.to_lowercase()) {
            Some(u) => Ok(u.clone()),
            None => bail!(
                "Unknown user '{name}'. Must be one of: {}",
                self.users.join(", ")
            ),
        }
    }
}

impl Default for Household {
    fn default() -> Self {
        Self {
            users: DEFAULT_HOUSEHOLD.iter().map(|u| (*u).to_string()).collect(),
        }
    }
}

// --- Validation ---

pub fn validate_week(week: i64) -> Result<u32> {
    if week < 1 {
        bail!("Week must be 1 or greater (got {week})");
    }
    if week > i64::from(MAX_WEEK) {
        bail!("Week must be at most {MAX_WEEK} (got {week})");
    }
    Ok(week as u32)
}

/// Explicit day indices outside Monday-Friday are rejected, not clamped.
pub fn validate_day(day: i64) -> Result<u8> {
    if !(0..i64::from(WORKDAYS)).contains(&day) {
        bail!(
            "Day must be between 0 (Monday) and {} (Friday) (got {day})",
            WORKDAYS - 1
        );
    }
    Ok(day as u8)
}

pub fn validate_new_meal(meal: &NewMeal) -> Result<()> {
    validate_week(i64::from(meal.week))?;
    validate_day(i64::from(meal.day))?;
    if meal.food.trim().is_empty() {
        bail!("Food description must not be empty");
    }
    if meal.calories.is_some_and(|c| c < 0) {
        bail!("Calories must not be negative");
    }
    Ok(())
}

pub fn validate_weight(kg: f64) -> Result<()> {
    if !kg.is_finite() || kg <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    Ok(())
}

// --- Lenient document deserializers ---

fn deserialize_week<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    let week = raw.floor().clamp(1.0, f64::from(u32::MAX));
    if (week - raw).abs() > f64::EPSILON {
        tracing::warn!(raw, week, "clamped out-of-range week number in stored document");
    }
    Ok(week as u32)
}

fn deserialize_day<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    let day = raw.floor().clamp(0.0, f64::from(WORKDAYS - 1));
    if (day - raw).abs() > f64::EPSILON {
        tracing::warn!(raw, day, "clamped out-of-range day index in stored document");
    }
    Ok(day as u8)
}

fn deserialize_calories<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if raw.is_finite() && raw > 0.0 {
        Ok(raw.round() as i64)
    } else {
        Ok(0)
    }
}
