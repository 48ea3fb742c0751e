use anyhow::Result;

use super::Session;
use super::helpers::{exit_not_found, parse_date, print_json};

pub(crate) fn cmd_water_add(
    s: &mut Session<'_>,
    ml: i64,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date, s.config.timezone)?;
    let user = s.user.clone();
    let log = s.svc.log_water(&user, date, ml)?;

    if json {
        print_json(&log)?;
    } else {
        println!("Water on {}: {} ml total", log.date, log.amount_ml);
    }
    Ok(())
}

pub(crate) fn cmd_water_rm(s: &mut Session<'_>, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date, s.config.timezone)?;
    let user = s.user.clone();
    if !s.svc.remove_water_log(&user, date)? {
        exit_not_found(&format!("No water logged on {date}"), json);
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": date }));
    } else {
        println!("Cleared water for {date}");
    }
    Ok(())
}

pub(crate) fn cmd_exercise_toggle(
    s: &mut Session<'_>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date, s.config.timezone)?;
    let user = s.user.clone();
    let done = s.svc.toggle_exercise(&user, date)?;

    if json {
        println!("{}", serde_json::json!({ "date": date, "completed": done }));
    } else if done {
        println!("Exercise done on {date}");
    } else {
        println!("Exercise cleared for {date}");
    }
    Ok(())
}

pub(crate) fn cmd_exercise_rm(s: &mut Session<'_>, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date, s.config.timezone)?;
    let user = s.user.clone();
    if !s.svc.remove_exercise(&user, date)? {
        exit_not_found(&format!("No exercise logged on {date}"), json);
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": date }));
    } else {
        println!("Removed exercise for {date}");
    }
    Ok(())
}
