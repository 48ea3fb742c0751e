use anyhow::{Result, bail};

use nutri_core::calendar;
use nutri_core::models::{Meal, NewMeal, parse_meal_category};
use nutri_core::service::needs_estimate;

use super::Session;
use super::helpers::{exit_not_found, print_json, print_meal_table, week_day_or_today};

/// Meal fields as given on the command line; `None` means "not given".
#[derive(Debug, Default)]
pub(crate) struct MealInput {
    pub food: Option<String>,
    pub amount: Option<String>,
    pub category: Option<String>,
    pub week: Option<u32>,
    pub day: Option<u8>,
    pub calories: Option<i64>,
}

pub(crate) fn cmd_meal_add(s: &mut Session<'_>, input: MealInput, json: bool) -> Result<()> {
    let slot = week_day_or_today(input.week, input.day, s.config.timezone);
    let new = NewMeal {
        week: slot.week,
        day: slot.day,
        category: parse_meal_category(input.category.as_deref().unwrap_or("snack"))?,
        food: input.food.unwrap_or_default(),
        amount: input.amount.unwrap_or_default(),
        calories: input.calories,
    };
    let meal = save(s, new, None)?;

    if json {
        print_json(&meal)?;
    } else {
        println!(
            "Planned {} for {} {} of week {}: {} kcal (id {})",
            describe(&meal),
            meal.category,
            calendar::day_name(meal.day_of_week),
            meal.week_number,
            meal.calories,
            meal.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_meal_edit(
    s: &mut Session<'_>,
    id: &str,
    input: MealInput,
    json: bool,
) -> Result<()> {
    if input.food.is_none()
        && input.amount.is_none()
        && input.category.is_none()
        && input.week.is_none()
        && input.day.is_none()
        && input.calories.is_none()
    {
        bail!(
            "Nothing to update. Provide at least one of --food, --amount, --category, --week, --day or --calories"
        );
    }

    let existing = match s.resolve_meal_id(id)? {
        Some(full) => s.svc.find_meal(&s.user, &full)?,
        None => None,
    };
    let Some(existing) = existing else {
        exit_not_found(&format!("Meal {id} not found"), json);
    };

    let new = merge_edit(&existing, input)?;
    let meal = save(s, new, Some(&existing.id))?;

    if json {
        print_json(&meal)?;
    } else {
        println!(
            "Updated meal {}: {} for {} {} of week {}, {} kcal",
            meal.id,
            describe(&meal),
            meal.category,
            calendar::day_name(meal.day_of_week),
            meal.week_number,
            meal.calories
        );
    }
    Ok(())
}

pub(crate) fn cmd_meal_rm(s: &mut Session<'_>, id: &str, json: bool) -> Result<()> {
    let removed = match s.resolve_meal_id(id)? {
        Some(full) => s.svc.remove_meal(&s.user, &full)?.then_some(full),
        None => None,
    };
    let Some(full) = removed else {
        exit_not_found(&format!("Meal {id} not found"), json);
    };

    if json {
        println!("{}", serde_json::json!({ "deleted": full }));
    } else {
        println!("Deleted meal {full}");
    }
    Ok(())
}

pub(crate) fn cmd_meal_toggle(s: &mut Session<'_>, id: &str, json: bool) -> Result<()> {
    let toggled = match s.resolve_meal_id(id)? {
        Some(full) => s.svc.toggle_meal_consumed(&s.user, &full)?,
        None => None,
    };
    let Some(meal) = toggled else {
        exit_not_found(&format!("Meal {id} not found"), json);
    };

    if json {
        print_json(&meal)?;
    } else if meal.consumed {
        println!("Marked {} as eaten ({} kcal)", describe(&meal), meal.calories);
    } else {
        println!("Marked {} as not eaten", describe(&meal));
    }
    Ok(())
}

pub(crate) fn cmd_meal_copy_day(
    s: &mut Session<'_>,
    week: Option<u32>,
    day: Option<u8>,
    json: bool,
) -> Result<()> {
    let slot = week_day_or_today(week, day, s.config.timezone);
    let user = s.user.clone();
    let copies = s.svc.copy_day_menu(&user, slot.week, slot.day)?;

    if json {
        print_json(&copies)?;
    } else {
        let count = copies.len();
        println!(
            "Copied {count} meals into {} of week {}",
            calendar::day_name(slot.day),
            slot.week
        );
        print_meal_table(&copies);
    }
    Ok(())
}

/// Save through the advisor only when an estimate is needed and possible, so a
/// missing key only matters for meals without calories.
fn save(s: &mut Session<'_>, new: NewMeal, id: Option<&str>) -> Result<Meal> {
    let user = s.user.clone();
    if needs_estimate(&new) && !new.food.trim().is_empty() && !new.amount.trim().is_empty() {
        let advisor = s.advisor()?;
        s.svc.save_meal_estimated(&advisor, &user, new, id)
    } else {
        s.svc.save_meal(&user, new, id)
    }
}

/// Apply the given fields over `existing`. Changing the food or amount without
/// new calories asks for a fresh estimate.
fn merge_edit(existing: &Meal, input: MealInput) -> Result<NewMeal> {
    let described_changed = input.food.as_ref().is_some_and(|f| *f != existing.food)
        || input.amount.as_ref().is_some_and(|a| *a != existing.amount);
    let calories = match input.calories {
        Some(c) => Some(c),
        None if described_changed => None,
        None => Some(existing.calories),
    };
    Ok(NewMeal {
        week: input.week.unwrap_or(existing.week_number),
        day: input.day.unwrap_or(existing.day_of_week),
        category: match input.category {
            Some(c) => parse_meal_category(&c)?,
            None => existing.category,
        },
        food: input.food.unwrap_or_else(|| existing.food.clone()),
        amount: input.amount.unwrap_or_else(|| existing.amount.clone()),
        calories,
    })
}

fn describe(meal: &Meal) -> String {
    if meal.amount.is_empty() {
        meal.food.clone()
    } else {
        format!("{} ({})", meal.food, meal.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutri_core::models::MealCategory;

    fn existing() -> Meal {
        Meal {
            id: "m1".to_string(),
            user_id: "Thiago".to_string(),
            week_number: 2,
            day_of_week: 1,
            category: MealCategory::Lunch,
            food: "Frango".to_string(),
            amount: "150g".to_string(),
            calories: 250,
            consumed: true,
        }
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let new = merge_edit(
            &existing(),
            MealInput {
                day: Some(3),
                ..MealInput::default()
            },
        )
        .unwrap();
        assert_eq!((new.week, new.day), (2, 3));
        assert_eq!(new.category, MealCategory::Lunch);
        assert_eq!(new.food, "Frango");
        assert_eq!(new.calories, Some(250));
    }

    #[test]
    fn test_merge_new_food_drops_calories() {
        let new = merge_edit(
            &existing(),
            MealInput {
                food: Some("Peixe".to_string()),
                ..MealInput::default()
            },
        )
        .unwrap();
        assert_eq!(new.calories, None);
        assert!(needs_estimate(&new));
    }

    #[test]
    fn test_merge_explicit_calories_win() {
        let new = merge_edit(
            &existing(),
            MealInput {
                amount: Some("300g".to_string()),
                calories: Some(500),
                ..MealInput::default()
            },
        )
        .unwrap();
        assert_eq!(new.calories, Some(500));
    }

    #[test]
    fn test_merge_rejects_unknown_category() {
        let input = MealInput {
            category: Some("brunch".to_string()),
            ..MealInput::default()
        };
        assert!(merge_edit(&existing(), input).is_err());
    }

    #[test]
    fn test_describe() {
        let mut meal = existing();
        assert_eq!(describe(&meal), "Frango (150g)");
        meal.amount.clear();
        assert_eq!(describe(&meal), "Frango");
    }
}
