use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use anyhow::{Result, bail};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::advisor::NutritionAdvisor;
use crate::calendar::{self, DEFAULT_TIMEZONE, WORKDAYS, WeekDay};
use crate::debug_log::{DebugLog, LogLevel, LogSink};
use crate::gemini::dedup_items;
use crate::models::{
    AppState, DailyOverview, DayColumn, ExerciseLog, Household, Meal, MealCategory, NewMeal,
    ProfileSummary, ShoppingItem, ShoppingListView, SlotCell, WaterLog, WeeklyGrid, WeightLog,
    validate_day, validate_new_meal, validate_week, validate_weight,
};
use crate::store::{SqliteStateStore, StateStore};

/// Household operations over the shared document.
///
/// Every mutation adopts the latest snapshot pushed by the store, applies the
/// change, and writes the whole document back. Write failures are absorbed:
/// the in-memory state keeps the change and the failure goes to the log sink.
pub struct NutriService {
    store: Box<dyn StateStore>,
    updates: Receiver<AppState>,
    state: AppState,
    household: Household,
    tz: Tz,
    log: Arc<dyn LogSink>,
}

impl NutriService {
    pub fn new(
        store: Box<dyn StateStore>,
        household: Household,
        tz: Tz,
        log: Arc<dyn LogSink>,
    ) -> Result<Self> {
        let state = store.load()?;
        let updates = store.subscribe();
        Ok(Self {
            store,
            updates,
            state,
            household,
            tz,
            log,
        })
    }

    pub fn new_in_memory() -> Result<Self> {
        Self::new(
            Box::new(SqliteStateStore::open_in_memory()?),
            Household::default(),
            DEFAULT_TIMEZONE,
            Arc::new(DebugLog::default()),
        )
    }

    #[must_use]
    pub fn household(&self) -> &Household {
        &self.household
    }

    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Today's calendar date in the household timezone.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        calendar::today(Utc::now(), self.tz)
    }

    #[must_use]
    pub fn current_week_day(&self) -> WeekDay {
        calendar::current_week_day(Utc::now(), self.tz)
    }

    pub fn resolve_user(&self, user: &str) -> Result<String> {
        self.household.resolve(user)
    }

    /// Latest full document.
    pub fn snapshot(&mut self) -> AppState {
        self.refresh();
        self.state.clone()
    }

    fn refresh(&mut self) {
        if let Some(latest) = self.updates.try_iter().last() {
            self.state = latest;
        }
    }

    fn commit(&mut self, next: AppState) {
        self.state = next;
        if let Err(e) = self.store.save(&self.state) {
            let detail = format!("{e:#}");
            tracing::error!(error = %detail, "failed to persist household document");
            self.log
                .record(LogLevel::Error, &format!("Failed to save data: {detail}"));
        }
    }

    /// Replace the whole document.
    pub fn replace_state(&mut self, state: AppState) {
        self.refresh();
        tracing::info!(
            meals = state.meals.len(),
            shopping_items = state.shopping_lists.len(),
            "household document replaced"
        );
        self.commit(state);
    }

    // --- AI fallbacks ---

    /// Unwrap an advisor estimate, logging a failure and falling back to 0.
    pub fn absorb_estimate(&self, result: Result<i64>) -> i64 {
        match result {
            Ok(calories) => calories.max(0),
            Err(e) => {
                let detail = format!("{e:#}");
                tracing::warn!(error = %detail, "calorie estimate failed");
                self.log
                    .record(LogLevel::Warn, &format!("Calorie estimate failed: {detail}"));
                0
            }
        }
    }

    /// Unwrap advisor suggestions, logging a failure and falling back to none.
    pub fn absorb_suggestions(&self, result: Result<Vec<String>>) -> Vec<String> {
        match result {
            Ok(items) => dedup_items(items),
            Err(e) => {
                let detail = format!("{e:#}");
                tracing::warn!(error = %detail, "shopping list generation failed");
                self.log
                    .record(LogLevel::Warn, &format!("Shopping list failed: {detail}"));
                Vec::new()
            }
        }
    }

    pub fn estimate_calories(
        &self,
        advisor: &dyn NutritionAdvisor,
        food: &str,
        amount: &str,
    ) -> i64 {
        if food.trim().is_empty() || amount.trim().is_empty() {
            return 0;
        }
        self.absorb_estimate(advisor.estimate_calories(food, amount))
    }

    // --- Meals ---

    pub fn find_meal(&mut self, user: &str, id: &str) -> Result<Option<Meal>> {
        let user = self.resolve_user(user)?;
        self.refresh();
        Ok(self
            .state
            .meals
            .iter()
            .find(|m| m.id == id && m.user_id == user)
            .cloned())
    }

    /// Insert a new meal, or edit the meal `id` in place (keeping its id and
    /// consumed flag). Calories are stored as given, floored at 0.
    pub fn save_meal(&mut self, user: &str, new: NewMeal, id: Option<&str>) -> Result<Meal> {
        let user = self.resolve_user(user)?;
        validate_new_meal(&new)?;
        self.refresh();

        let calories = new.calories.unwrap_or(0).max(0);
        let mut next = self.state.clone();
        let meal = match id {
            Some(id) => {
                let Some(existing) = next
                    .meals
                    .iter_mut()
                    .find(|m| m.id == id && m.user_id == user)
                else {
                    bail!("Meal {id} not found");
                };
                existing.week_number = new.week;
                existing.day_of_week = new.day;
                existing.category = new.category;
                existing.food = new.food.trim().to_string();
                existing.amount = new.amount.trim().to_string();
                existing.calories = calories;
                existing.clone()
            }
            None => {
                let meal = Meal {
                    id: Uuid::new_v4().to_string(),
                    user_id: user.clone(),
                    week_number: new.week,
                    day_of_week: new.day,
                    category: new.category,
                    food: new.food.trim().to_string(),
                    amount: new.amount.trim().to_string(),
                    calories,
                    consumed: false,
                };
                next.meals.push(meal.clone());
                meal
            }
        };
        tracing::info!(
            user = %user,
            week = meal.week_number,
            day = meal.day_of_week,
            id = %meal.id,
            "meal saved"
        );
        self.commit(next);
        Ok(meal)
    }

    /// `save_meal`, asking the advisor for calories when none (or <= 0) were given.
    pub fn save_meal_estimated(
        &mut self,
        advisor: &dyn NutritionAdvisor,
        user: &str,
        mut new: NewMeal,
        id: Option<&str>,
    ) -> Result<Meal> {
        self.resolve_user(user)?;
        validate_new_meal(&new)?;
        if needs_estimate(&new) {
            new.calories = Some(self.estimate_calories(advisor, &new.food, &new.amount));
        }
        self.save_meal(user, new, id)
    }

    pub fn remove_meal(&mut self, user: &str, id: &str) -> Result<bool> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let mut next = self.state.clone();
        let before = next.meals.len();
        next.meals.retain(|m| !(m.id == id && m.user_id == user));
        if next.meals.len() == before {
            return Ok(false);
        }
        tracing::info!(user = %user, id, "meal removed");
        self.commit(next);
        Ok(true)
    }

    /// Flip the consumed flag. `None` when the meal does not exist.
    pub fn toggle_meal_consumed(&mut self, user: &str, id: &str) -> Result<Option<Meal>> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let mut next = self.state.clone();
        let Some(meal) = next
            .meals
            .iter_mut()
            .find(|m| m.id == id && m.user_id == user)
        else {
            return Ok(None);
        };
        meal.consumed = !meal.consumed;
        let meal = meal.clone();
        self.commit(next);
        Ok(Some(meal))
    }

    /// Replace the meals of `to_day` with fresh copies of the previous day's.
    /// Monday copies the previous week's Friday.
    pub fn copy_day_menu(&mut self, user: &str, week: u32, to_day: u8) -> Result<Vec<Meal>> {
        let user = self.resolve_user(user)?;
        let week = validate_week(i64::from(week))?;
        let to_day = validate_day(i64::from(to_day))?;
        let (from_week, from_day) = if to_day == 0 {
            (week - 1, WORKDAYS - 1)
        } else {
            (week, to_day - 1)
        };
        if from_week < 1 {
            bail!("There is no week before week 1 to copy from");
        }

        self.refresh();
        let source = self.meals_in_slot(&user, from_week, from_day);
        if source.is_empty() {
            bail!(
                "No meals planned for {} of week {from_week} to copy",
                calendar::day_name(from_day)
            );
        }

        let copies: Vec<Meal> = source
            .into_iter()
            .map(|m| Meal {
                id: Uuid::new_v4().to_string(),
                week_number: week,
                day_of_week: to_day,
                consumed: false,
                ..m
            })
            .collect();

        let mut next = self.state.clone();
        next.meals.retain(|m| {
            !(m.user_id == user && m.week_number == week && m.day_of_week == to_day)
        });
        next.meals.extend(copies.iter().cloned());
        tracing::info!(
            user = %user,
            week,
            day = to_day,
            copied = copies.len(),
            "day menu copied"
        );
        self.commit(next);
        Ok(copies)
    }

    /// The user's meals for one week, by day then category.
    pub fn week_meals(&mut self, user: &str, week: u32) -> Result<Vec<Meal>> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let mut meals: Vec<Meal> = self
            .state
            .meals
            .iter()
            .filter(|m| m.user_id == user && m.week_number == week)
            .cloned()
            .collect();
        meals.sort_by_key(|m| (m.day_of_week, m.category));
        Ok(meals)
    }

    fn meals_in_slot(&self, user: &str, week: u32, day: u8) -> Vec<Meal> {
        let mut meals: Vec<Meal> = self
            .state
            .meals
            .iter()
            .filter(|m| m.user_id == user && m.week_number == week && m.day_of_week == day)
            .cloned()
            .collect();
        meals.sort_by_key(|m| m.category);
        meals
    }

    /// Weeks with at least one meal, newest first. `[1]` when there are none.
    pub fn meal_weeks(&mut self, user: &str) -> Result<Vec<u32>> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let weeks: BTreeSet<u32> = self
            .state
            .meals
            .iter()
            .filter(|m| m.user_id == user)
            .map(|m| m.week_number)
            .collect();
        Ok(weeks_desc(weeks))
    }

    // --- Water ---

    /// Add `delta_ml` (may be negative) to the day's total, which never drops
    /// below 0.
    pub fn log_water(&mut self, user: &str, date: NaiveDate, delta_ml: i64) -> Result<WaterLog> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let mut next = self.state.clone();
        let log = match next
            .water_logs
            .iter_mut()
            .find(|w| w.user_id == user && w.date == date)
        {
            Some(existing) => {
                existing.amount_ml = existing.amount_ml.saturating_add(delta_ml).max(0);
                existing.clone()
            }
            None => {
                let log = WaterLog {
                    user_id: user.clone(),
                    date,
                    amount_ml: delta_ml.max(0),
                };
                next.water_logs.push(log.clone());
                log
            }
        };
        tracing::info!(user = %user, %date, total_ml = log.amount_ml, "water logged");
        self.commit(next);
        Ok(log)
    }

    pub fn remove_water_log(&mut self, user: &str, date: NaiveDate) -> Result<bool> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let mut next = self.state.clone();
        let before = next.water_logs.len();
        let keep = |w: &WaterLog| w.user_id != user || w.date != date;
        next.water_logs.retain(keep);
        if next.water_logs.len() == before {
            return Ok(false);
        }
        self.commit(next);
        Ok(true)
    }

    // --- Exercise ---

    /// Flip the day's exercise record; returns whether it is now present.
    pub fn toggle_exercise(&mut self, user: &str, date: NaiveDate) -> Result<bool> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let mut next = self.state.clone();
        let was_done = next
            .exercise_logs
            .iter()
            .any(|e| e.user_id == user && e.date == date && e.completed);
        let keep = |e: &ExerciseLog| e.user_id != user || e.date != date;
        next.exercise_logs.retain(keep);
        if !was_done {
            next.exercise_logs.push(ExerciseLog {
                user_id: user.clone(),
                date,
                completed: true,
            });
        }
        tracing::info!(user = %user, %date, done = !was_done, "exercise toggled");
        self.commit(next);
        Ok(!was_done)
    }

    pub fn remove_exercise(&mut self, user: &str, date: NaiveDate) -> Result<bool> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let mut next = self.state.clone();
        let before = next.exercise_logs.len();
        let keep = |e: &ExerciseLog| e.user_id != user || e.date != date;
        next.exercise_logs.retain(keep);
        if next.exercise_logs.len() == before {
            return Ok(false);
        }
        self.commit(next);
        Ok(true)
    }

    // --- Weight ---

    /// Record the day's weight, replacing any earlier value for that day.
    pub fn log_weight(&mut self, user: &str, date: NaiveDate, kg: f64) -> Result<WeightLog> {
        let user = self.resolve_user(user)?;
        validate_weight(kg)?;
        self.refresh();
        let mut next = self.state.clone();
        let keep = |w: &WeightLog| w.user_id != user || w.date != date;
        next.weight_logs.retain(keep);
        let log = WeightLog {
            user_id: user.clone(),
            date,
            weight: kg,
        };
        next.weight_logs.push(log.clone());
        tracing::info!(user = %user, %date, kg, "weight logged");
        self.commit(next);
        Ok(log)
    }

    pub fn remove_weight(&mut self, user: &str, date: NaiveDate) -> Result<bool> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let mut next = self.state.clone();
        let before = next.weight_logs.len();
        let keep = |w: &WeightLog| w.user_id != user || w.date != date;
        next.weight_logs.retain(keep);
        if next.weight_logs.len() == before {
            return Ok(false);
        }
        self.commit(next);
        Ok(true)
    }

    // --- Shopping ---

    /// Flip the bought flag. `None` when the item does not exist.
    pub fn toggle_shopping_item(&mut self, user: &str, id: &str) -> Result<Option<ShoppingItem>> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let mut next = self.state.clone();
        let Some(item) = next
            .shopping_lists
            .iter_mut()
            .find(|i| i.id == id && i.user_id == user)
        else {
            return Ok(None);
        };
        item.bought = !item.bought;
        let item = item.clone();
        self.commit(next);
        Ok(Some(item))
    }

    /// Replace the user's list for `week` with `names` (deduplicated, unbought).
    pub fn replace_shopping_list(
        &mut self,
        user: &str,
        week: u32,
        names: Vec<String>,
    ) -> Result<Vec<ShoppingItem>> {
        let user = self.resolve_user(user)?;
        let week = validate_week(i64::from(week))?;
        self.refresh();

        let items: Vec<ShoppingItem> = dedup_items(names)
            .into_iter()
            .map(|name| ShoppingItem {
                id: Uuid::new_v4().to_string(),
                week_number: week,
                user_id: user.clone(),
                name,
                bought: false,
            })
            .collect();

        let mut next = self.state.clone();
        let keep = |i: &ShoppingItem| i.user_id != user || i.week_number != week;
        next.shopping_lists.retain(keep);
        next.shopping_lists.extend(items.iter().cloned());
        tracing::info!(user = %user, week, items = items.len(), "shopping list replaced");
        self.commit(next);
        Ok(items)
    }

    /// Ask the advisor for the week's groceries. A failed request still
    /// replaces the list, with no items.
    pub fn generate_shopping_list(
        &mut self,
        advisor: &dyn NutritionAdvisor,
        user: &str,
        week: u32,
    ) -> Result<Vec<ShoppingItem>> {
        let week = validate_week(i64::from(week))?;
        let meals = self.week_meals(user, week)?;
        let names = if meals.is_empty() {
            Vec::new()
        } else {
            self.absorb_suggestions(advisor.suggest_shopping_list(&meals))
        };
        self.replace_shopping_list(user, week, names)
    }

    pub fn shopping_list(&mut self, user: &str, week: u32) -> Result<ShoppingListView> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let items: Vec<ShoppingItem> = self
            .state
            .shopping_lists
            .iter()
            .filter(|i| i.user_id == user && i.week_number == week)
            .cloned()
            .collect();
        let bought = items.iter().filter(|i| i.bought).count();
        Ok(ShoppingListView {
            user,
            week,
            total: items.len(),
            bought,
            items,
        })
    }

    /// Weeks with a shopping list, newest first. `[1]` when there are none.
    pub fn shopping_weeks(&mut self, user: &str) -> Result<Vec<u32>> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let weeks: BTreeSet<u32> = self
            .state
            .shopping_lists
            .iter()
            .filter(|i| i.user_id == user)
            .map(|i| i.week_number)
            .collect();
        Ok(weeks_desc(weeks))
    }

    // --- Views ---

    pub fn daily_overview(&mut self, user: &str, date: NaiveDate) -> Result<DailyOverview> {
        let user = self.resolve_user(user)?;
        self.refresh();
        let slot = calendar::week_day_of(date);
        let meals = self.meals_in_slot(&user, slot.week, slot.day);
        let consumed_calories = meals.iter().filter(|m| m.consumed).map(|m| m.calories).sum();
        let planned_calories = meals.iter().map(|m| m.calories).sum();
        let water_ml = self
            .state
            .water_logs
            .iter()
            .find(|w| w.user_id == user && w.date == date)
            .map_or(0, |w| w.amount_ml);
        let exercised = self
            .state
            .exercise_logs
            .iter()
            .any(|e| e.user_id == user && e.date == date && e.completed);
        Ok(DailyOverview {
            user,
            date,
            week: slot.week,
            day: slot.day,
            day_name: calendar::day_name(slot.day),
            meals,
            consumed_calories,
            planned_calories,
            water_ml,
            exercised,
        })
    }

    pub fn weekly_grid(&mut self, user: &str, week: u32) -> Result<WeeklyGrid> {
        let user = self.resolve_user(user)?;
        let week = validate_week(i64::from(week))?;
        self.refresh();
        let days = (0..WORKDAYS)
            .map(|day| {
                let meals = self.meals_in_slot(&user, week, day);
                let consumed_calories = meals
                    .iter()
                    .filter(|m| m.consumed)
                    .map(|m| m.calories)
                    .sum();
                let slots = MealCategory::ALL
                    .into_iter()
                    .map(|category| SlotCell {
                        category,
                        meals: meals
                            .iter()
                            .filter(|m| m.category == category)
                            .cloned()
                            .collect(),
                    })
                    .collect();
                DayColumn {
                    day,
                    day_name: calendar::day_name(day),
                    date: calendar::date_of(week, day),
                    consumed_calories,
                    slots,
                }
            })
            .collect();
        Ok(WeeklyGrid { user, week, days })
    }

    pub fn profile(&mut self, user: &str) -> Result<ProfileSummary> {
        let user = self.resolve_user(user)?;
        self.refresh();

        let mut weights: Vec<WeightLog> = self
            .state
            .weight_logs
            .iter()
            .filter(|w| w.user_id == user)
            .cloned()
            .collect();
        weights.sort_by(|a, b| b.date.cmp(&a.date));

        let mut exercise_dates: Vec<NaiveDate> = self
            .state
            .exercise_logs
            .iter()
            .filter(|e| e.user_id == user && e.completed)
            .map(|e| e.date)
            .collect();
        exercise_dates.sort_unstable_by(|a, b| b.cmp(a));
        exercise_dates.dedup();

        let mut water_logs: Vec<WaterLog> = self
            .state
            .water_logs
            .iter()
            .filter(|w| w.user_id == user)
            .cloned()
            .collect();
        water_logs.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(ProfileSummary {
            current_weight: weights.first().map(|w| w.weight),
            exercise_count: exercise_dates.len(),
            user,
            weights,
            exercise_dates,
            water_logs,
        })
    }
}

/// Whether saving `meal` should ask the advisor for calories.
#[must_use]
pub fn needs_estimate(meal: &NewMeal) -> bool {
    meal.calories.is_none_or(|c| c <= 0)
}

fn weeks_desc(weeks: BTreeSet<u32>) -> Vec<u32> {
    if weeks.is_empty() {
        return vec![1];
    }
    weeks.into_iter().rev().collect()
}
