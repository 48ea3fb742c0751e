use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use super::Session;
use super::helpers::{exit_not_found, parse_date, print_json};

const KG_PER_LB: f64 = 0.453_592;

pub(crate) fn cmd_weight_log(
    s: &mut Session<'_>,
    value: f64,
    unit: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let kg = to_kg(value, unit)?;
    let date = parse_date(date, s.config.timezone)?;
    let user = s.user.clone();
    let log = s.svc.log_weight(&user, date, kg)?;

    if json {
        print_json(&log)?;
    } else {
        println!("Logged {:.1} kg for {} on {}", log.weight, log.user_id, log.date);
    }
    Ok(())
}

pub(crate) fn cmd_weight_history(s: &mut Session<'_>, json: bool) -> Result<()> {
    let user = s.user.clone();
    let weights = s.svc.profile(&user)?.weights;

    if json {
        return print_json(&weights);
    }
    if weights.is_empty() {
        eprintln!("No weight entries found. Use `nutri weight log` to record your weight.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct WeightRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight (kg)")]
        kg: String,
        #[tabled(rename = "Change")]
        change: String,
    }

    // Newest first; the change is against the previous (older) entry.
    let rows: Vec<WeightRow> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| WeightRow {
            date: w.date.format("%Y-%m-%d").to_string(),
            kg: format!("{:.1}", w.weight),
            change: weights
                .get(i + 1)
                .map(|older| format!("{:+.1}", w.weight - older.weight))
                .unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_weight_rm(s: &mut Session<'_>, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date, s.config.timezone)?;
    let user = s.user.clone();
    if !s.svc.remove_weight(&user, date)? {
        exit_not_found(&format!("No weight entry for {date}"), json);
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": date }));
    } else {
        println!("Deleted weight entry for {date}");
    }
    Ok(())
}

fn to_kg(value: f64, unit: &str) -> Result<f64> {
    if value <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    match unit.to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => {
            let kg = value * KG_PER_LB;
            eprintln!("Converting {value:.1} lbs → {kg:.2} kg");
            Ok(kg)
        }
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_kg() {
        assert!((to_kg(70.0, "kg").unwrap() - 70.0).abs() < f64::EPSILON);
        assert!((to_kg(100.0, "LBS").unwrap() - 45.3592).abs() < 1e-9);
        assert!(to_kg(70.0, "stone").is_err());
        assert!(to_kg(0.0, "kg").is_err());
    }
}
