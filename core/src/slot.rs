use crate::models::MealCategory;

/// Map a stored time value to its meal category.
///
/// Category labels pass through unchanged. Anything else is read as a clock
/// time and bucketed by its leading hour; input without a leading number is a
/// snack.
#[must_use]
pub fn categorize(input: &str) -> MealCategory {
    let trimmed = input.trim();
    if let Some(category) = MealCategory::from_label(trimmed) {
        return category;
    }
    match leading_hour(trimmed) {
        Some(5..=10) => MealCategory::Breakfast,
        Some(11..=14) => MealCategory::Lunch,
        Some(15..=18) => MealCategory::Snack,
        Some(19..=21) => MealCategory::Dinner,
        Some(_) => MealCategory::LateSnack,
        None => MealCategory::Snack,
    }
}

fn leading_hour(s: &str) -> Option<u64> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some(s[..end].parse().unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_times() {
        assert_eq!(categorize("07:00").label(), "Café da Manhã");
        assert_eq!(categorize("12:00").label(), "Almoço");
        assert_eq!(categorize("16:00").label(), "Lanche");
        assert_eq!(categorize("20:00").label(), "Jantar");
        assert_eq!(categorize("23:00").label(), "Ceia");
    }

    #[test]
    fn test_labels_are_unchanged() {
        for category in MealCategory::ALL {
            assert_eq!(categorize(category.label()), category);
        }
        assert_eq!(categorize("Almoço").label(), "Almoço");
    }

    #[test]
    fn test_hour_band_edges() {
        assert_eq!(categorize("04:59"), MealCategory::LateSnack);
        assert_eq!(categorize("05:00"), MealCategory::Breakfast);
        assert_eq!(categorize("10:59"), MealCategory::Breakfast);
        assert_eq!(categorize("11:00"), MealCategory::Lunch);
        assert_eq!(categorize("14:30"), MealCategory::Lunch);
        assert_eq!(categorize("15:00"), MealCategory::Snack);
        assert_eq!(categorize("18:45"), MealCategory::Snack);
        assert_eq!(categorize("19:00"), MealCategory::Dinner);
        assert_eq!(categorize("21:59"), MealCategory::Dinner);
        assert_eq!(categorize("22:00"), MealCategory::LateSnack);
        assert_eq!(categorize("00:30"), MealCategory::LateSnack);
        assert_eq!(categorize("9"), MealCategory::Breakfast);
        assert_eq!(categorize("7h"), MealCategory::Breakfast);
    }

    #[test]
    fn test_unparseable_defaults_to_snack() {
        assert_eq!(categorize(""), MealCategory::Snack);
        assert_eq!(categorize("whenever"), MealCategory::Snack);
        assert_eq!(categorize(":30"), MealCategory::Snack);
        assert_eq!(categorize("almoço"), MealCategory::Snack);
    }

    #[test]
    fn test_huge_hour_is_late_snack() {
        assert_eq!(
            categorize("999999999999999999999999:00"),
            MealCategory::LateSnack
        );
    }
}
