use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use nutri_core::models::ShoppingListView;

use super::Session;
use super::helpers::{exit_not_found, print_json, short_id};

pub(crate) fn cmd_shop_generate(s: &mut Session<'_>, week: Option<u32>, json: bool) -> Result<()> {
    let user = s.user.clone();
    let week = week.unwrap_or_else(|| s.svc.current_week_day().week);
    let advisor = s.advisor()?;
    let items = s.svc.generate_shopping_list(&advisor, &user, week)?;

    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        eprintln!("{}", empty_list_hint(week));
        return Ok(());
    }
    let view = s.svc.shopping_list(&user, week)?;
    print_list(&view);
    Ok(())
}

pub(crate) fn cmd_shop_show(s: &mut Session<'_>, week: Option<u32>, json: bool) -> Result<()> {
    let user = s.user.clone();
    let week = week.unwrap_or_else(|| s.svc.current_week_day().week);
    let view = s.svc.shopping_list(&user, week)?;

    if json {
        return print_json(&view);
    }
    if view.items.is_empty() {
        let weeks = s.svc.shopping_weeks(&user)?;
        exit_not_found(
            &format!(
                "No shopping list for week {week}. Weeks with lists: {}",
                weeks
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            false,
        );
    }
    print_list(&view);
    Ok(())
}

pub(crate) fn cmd_shop_toggle(s: &mut Session<'_>, id: &str, json: bool) -> Result<()> {
    let toggled = match s.resolve_shopping_id(id)? {
        Some(full) => s.svc.toggle_shopping_item(&s.user, &full)?,
        None => None,
    };
    let Some(item) = toggled else {
        exit_not_found(&format!("Shopping item {id} not found"), json);
    };

    if json {
        print_json(&item)?;
    } else if item.bought {
        println!("Bought {}", item.name);
    } else {
        println!("{} back on the list", item.name);
    }
    Ok(())
}

/// A failed AI request has already been reported as a warning on stderr.
fn empty_list_hint(week: u32) -> String {
    format!(
        "No shopping items for week {week}. Plan some meals first, or check the warning above \
         (NUTRI_LOG=debug shows more detail)."
    )
}

fn print_list(view: &ShoppingListView) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Item")]
        name: String,
        #[tabled(rename = "Bought")]
        bought: String,
    }

    let rows: Vec<ItemRow> = view
        .items
        .iter()
        .map(|i| ItemRow {
            id: short_id(&i.id),
            name: i.name.clone(),
            bought: if i.bought { "✓" } else { "" }.to_string(),
        })
        .collect();

    println!("Week {} · {}/{} bought", view.week, view.bought, view.total);
    println!("{}", Table::new(&rows).with(Style::rounded()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_hint_points_at_stderr_logging() {
        let hint = empty_list_hint(3);
        assert!(hint.contains("week 3"));
        assert!(hint.contains("NUTRI_LOG"));
        assert!(!hint.contains("debug log"));
    }
}
