use std::process;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nutri_core::calendar::{self, WeekDay};
use nutri_core::models::Meal;

pub(crate) fn parse_date(date_str: Option<String>, tz: Tz) -> Result<NaiveDate> {
    let today = calendar::today(Utc::now(), tz);
    match date_str {
        None => Ok(today),
        Some(s) => match s.as_str() {
            "today" => Ok(today),
            "yesterday" => Ok(today - chrono::Duration::days(1)),
            "tomorrow" => Ok(today + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Fill in a missing week or day from today's slot in `tz`.
pub(crate) fn week_day_or_today(week: Option<u32>, day: Option<u8>, tz: Tz) -> WeekDay {
    let now = calendar::current_week_day(Utc::now(), tz);
    WeekDay {
        week: week.unwrap_or(now.week),
        day: day.unwrap_or(now.day),
    }
}

/// Report a missing record and exit with status 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn print_meal_table(meals: &[Meal]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Day")]
        day: String,
        #[tabled(rename = "Meal")]
        category: String,
        #[tabled(rename = "Food")]
        food: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "kcal")]
        calories: i64,
        #[tabled(rename = "Eaten")]
        consumed: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            id: short_id(&m.id),
            day: calendar::day_name(m.day_of_week).to_string(),
            category: m.category.label().to_string(),
            food: truncate(&m.food, 35),
            amount: truncate(&m.amount, 15),
            calories: m.calories,
            consumed: if m.consumed { "✓" } else { "" }.to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(5..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// First block of a UUID, enough to recognise a row in a table.
pub(crate) fn short_id(id: &str) -> String {
    id.split('-').next().unwrap_or(id).to_string()
}

/// Expand an id or unique id prefix (as shown by `short_id`) to the full id.
pub(crate) fn match_id<'a, I>(candidates: I, wanted: &str) -> Result<Option<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let wanted = wanted.trim();
    if wanted.is_empty() {
        return Ok(None);
    }
    let matches: Vec<&str> = candidates
        .into_iter()
        .filter(|id| id.starts_with(wanted))
        .collect();
    if let Some(exact) = matches.iter().find(|id| **id == wanted) {
        return Ok(Some((*exact).to_string()));
    }
    match matches.as_slice() {
        [] => Ok(None),
        [one] => Ok(Some((*one).to_string())),
        _ => bail!("Id prefix '{wanted}' is ambiguous ({} matches)", matches.len()),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutri_core::calendar::DEFAULT_TIMEZONE;

    #[test]
    fn test_parse_date_none() {
        let today = calendar::today(Utc::now(), DEFAULT_TIMEZONE);
        assert_eq!(parse_date(None, DEFAULT_TIMEZONE).unwrap(), today);
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = calendar::today(Utc::now(), DEFAULT_TIMEZONE);
        assert_eq!(
            parse_date(Some("today".to_string()), DEFAULT_TIMEZONE).unwrap(),
            today
        );
        assert_eq!(
            parse_date(Some("yesterday".to_string()), DEFAULT_TIMEZONE).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string()), DEFAULT_TIMEZONE).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2026-01-15".to_string()), DEFAULT_TIMEZONE).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string()), DEFAULT_TIMEZONE).is_err());
    }

    #[test]
    fn test_week_day_or_today_keeps_explicit_values() {
        let slot = week_day_or_today(Some(7), Some(3), DEFAULT_TIMEZONE);
        assert_eq!((slot.week, slot.day), (7, 3));
        let slot = week_day_or_today(None, Some(1), DEFAULT_TIMEZONE);
        assert!(slot.week >= 1);
        assert_eq!(slot.day, 1);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("5f1c2a9e-1111-4222-8333-444455556666"), "5f1c2a9e");
        assert_eq!(short_id("k3j2h1g0f"), "k3j2h1g0f");
    }

    #[test]
    fn test_match_id() {
        let ids = ["5f1c2a9e-aaaa", "5f1c2a9e-bbbb", "77aa0000-cccc"];
        assert_eq!(
            match_id(ids, "77aa").unwrap().as_deref(),
            Some("77aa0000-cccc")
        );
        assert_eq!(
            match_id(ids, "5f1c2a9e-bbbb").unwrap().as_deref(),
            Some("5f1c2a9e-bbbb")
        );
        assert!(match_id(ids, "5f1c").is_err());
        assert!(match_id(ids, "ffff").unwrap().is_none());
        assert!(match_id(ids, "").unwrap().is_none());
    }

    #[test]
    fn test_json_error_escapes() {
        assert_eq!(json_error("bad \"id\""), r#"{"error":"bad \"id\""}"#);
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Feijão", 10), "Feijão");
        assert_eq!(truncate("Pão de queijo com requeijão", 10), "Pão de ...");
    }
}
