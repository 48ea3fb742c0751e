use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nutri_core::models::{MealCategory, WeeklyGrid};

use super::Session;
use super::helpers::{parse_date, print_json, short_id, truncate};

pub(crate) fn cmd_today(s: &mut Session<'_>, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date, s.config.timezone)?;
    let user = s.user.clone();
    let day = s.svc.daily_overview(&user, date)?;

    if json {
        return print_json(&day);
    }

    println!(
        "=== {} · {} {} (week {}) ===\n",
        day.user, day.day_name, day.date, day.week
    );

    if day.meals.is_empty() {
        println!("  No meals planned");
    }
    for meal in &day.meals {
        let mark = if meal.consumed { "✓" } else { " " };
        let id = short_id(&meal.id);
        let amount = if meal.amount.is_empty() {
            String::new()
        } else {
            format!(" — {}", meal.amount)
        };
        println!(
            "  [{mark}] {:<14} {}{amount} — {} kcal  ({id})",
            meal.category.label(),
            meal.food,
            meal.calories
        );
    }

    println!();
    println!(
        "  EATEN: {} of {} kcal planned",
        day.consumed_calories, day.planned_calories
    );
    println!("  WATER: {} ml", day.water_ml);
    println!(
        "  EXERCISE: {}",
        if day.exercised { "done" } else { "not yet" }
    );

    Ok(())
}

pub(crate) fn cmd_week(s: &mut Session<'_>, week: Option<u32>, json: bool) -> Result<()> {
    let user = s.user.clone();
    let week = match week {
        Some(w) => w,
        None => s.svc.current_week_day().week,
    };
    let grid = s.svc.weekly_grid(&user, week)?;

    if json {
        return print_json(&grid);
    }

    let total: usize = grid
        .days
        .iter()
        .flat_map(|d| d.slots.iter())
        .map(|slot| slot.meals.len())
        .sum();
    if total == 0 {
        let weeks = s.svc.meal_weeks(&user)?;
        eprintln!(
            "No meals planned for {user} in week {week}. Weeks with meals: {}",
            weeks
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        process::exit(2);
    }

    println!("{}", render_grid(&grid));
    Ok(())
}

fn render_grid(grid: &WeeklyGrid) -> String {
    let mut builder = Builder::default();

    let mut header = vec![format!("Week {}", grid.week)];
    header.extend(
        grid.days
            .iter()
            .map(|d| format!("{} {}", d.day_name, d.date.format("%d/%m"))),
    );
    builder.push_record(header);

    for (i, category) in MealCategory::ALL.iter().enumerate() {
        let mut row = vec![category.label().to_string()];
        row.extend(grid.days.iter().map(|d| {
            d.slots[i]
                .meals
                .iter()
                .map(|m| {
                    let mark = if m.consumed { "✓ " } else { "" };
                    format!("{mark}{} ({})", truncate(&m.food, 18), m.calories)
                })
                .collect::<Vec<_>>()
                .join("\n")
        }));
        builder.push_record(row);
    }

    let mut totals = vec!["kcal eaten".to_string()];
    totals.extend(grid.days.iter().map(|d| d.consumed_calories.to_string()));
    builder.push_record(totals);

    builder.build().with(Style::rounded()).to_string()
}

pub(crate) fn cmd_profile(s: &mut Session<'_>, json: bool) -> Result<()> {
    let user = s.user.clone();
    let profile = s.svc.profile(&user)?;

    if json {
        return print_json(&profile);
    }

    println!("=== {} ===\n", profile.user);
    match profile.current_weight {
        Some(kg) => println!("  Current weight: {kg:.1} kg"),
        None => println!("  Current weight: -"),
    }
    println!("  Exercise days: {}", profile.exercise_count);
    if let Some(last) = profile.exercise_dates.first() {
        println!("  Last exercise: {last}");
    }

    if !profile.water_logs.is_empty() {
        #[derive(Tabled)]
        struct WaterRow {
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Water (ml)")]
            ml: i64,
        }

        let rows: Vec<WaterRow> = profile
            .water_logs
            .iter()
            .take(7)
            .map(|w| WaterRow {
                date: w.date.format("%Y-%m-%d").to_string(),
                ml: w.amount_ml,
            })
            .collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
            .to_string();
        println!("\n{table}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutri_core::models::NewMeal;
    use nutri_core::service::NutriService;

    #[test]
    fn test_render_grid_lists_meals_by_slot() {
        let mut svc = NutriService::new_in_memory().unwrap();
        svc.save_meal(
            "Thiago",
            NewMeal {
                week: 1,
                day: 2,
                category: MealCategory::Dinner,
                food: "Sopa de legumes".to_string(),
                amount: "1 prato".to_string(),
                calories: Some(180),
            },
            None,
        )
        .unwrap();
        let grid = svc.weekly_grid("Thiago", 1).unwrap();
        let rendered = render_grid(&grid);
        assert!(rendered.contains("Quarta 07/01"));
        assert!(rendered.contains("Sopa de legumes (180)"));
        assert!(rendered.contains("Jantar"));
    }
}
