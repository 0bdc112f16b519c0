use crate::error::{Error, Result};
use crate::models::{DailyProgress, DailyTotals, FoodLogEntry, NutrientProfile, NutritionAmount};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use uuid::Uuid;

pub fn scale(profile: &NutrientProfile, grams: f64) -> Result<NutritionAmount> {
    if !grams.is_finite() || grams <= 0.0 {
        return Err(Error::InvalidQuantity { grams });
    }
    let multiplier = grams / 100.0;
    Ok(NutritionAmount {
        kcal: (profile.kcal_per_100g * multiplier).round() as i64,
        protein_g: round1(profile.protein_g * multiplier),
        carb_g: round1(profile.carb_g * multiplier),
        fat_g: round1(profile.fat_g * multiplier),
        fiber_g: round1(profile.fiber_g * multiplier),
    })
}

/// Grams of `profile` that provide `kcal`.
pub fn grams_for_kcal(profile: &NutrientProfile, kcal: f64) -> Result<f64> {
    if !profile.kcal_per_100g.is_finite() || profile.kcal_per_100g <= 0.0 {
        return Err(Error::InvalidQuantity {
            grams: profile.kcal_per_100g,
        });
    }
    Ok(kcal / (profile.kcal_per_100g / 100.0))
}

/// Sums each field, then rounds the total to one decimal.
///
/// Values are added in ascending order so the result does not depend on input order.
pub fn aggregate(amounts: &[NutritionAmount]) -> DailyTotals {
    let field = |get: fn(&NutritionAmount) -> f64| {
        let mut values: Vec<f64> = amounts.iter().map(get).collect();
        values.sort_by(f64::total_cmp);
        round1(values.into_iter().sum())
    };
    DailyTotals {
        kcal: amounts.iter().map(|a| a.kcal).sum(),
        protein_g: field(|a| a.protein_g),
        carb_g: field(|a| a.carb_g),
        fat_g: field(|a| a.fat_g),
        fiber_g: field(|a| a.fiber_g),
        meal_count: amounts.len(),
    }
}

impl FoodLogEntry {
    pub fn new(profile: &NutrientProfile, grams: f64, date: NaiveDate) -> Result<Self> {
        let amount = scale(profile, grams)?;
        Ok(Self {
            id: Uuid::new_v4(),
            food_id: profile.id.clone(),
            food_name: profile.name_primary.clone(),
            grams,
            date,
            amount,
        })
    }
}

pub fn totals_for_date(entries: &[FoodLogEntry], date: NaiveDate) -> DailyTotals {
    let amounts: Vec<NutritionAmount> = entries
        .iter()
        .filter(|e| e.date == date)
        .map(|e| e.amount)
        .collect();
    aggregate(&amounts)
}

pub fn totals_by_date(entries: &[FoodLogEntry]) -> BTreeMap<NaiveDate, DailyTotals> {
    let mut grouped: BTreeMap<NaiveDate, Vec<NutritionAmount>> = BTreeMap::new();
    for entry in entries {
        grouped.entry(entry.date).or_default().push(entry.amount);
    }
    grouped
        .into_iter()
        .map(|(date, amounts)| (date, aggregate(&amounts)))
        .collect()
}

pub fn progress(totals: &DailyTotals, target_kcal: i64, date: Option<NaiveDate>) -> DailyProgress {
    let percent_of_target = if target_kcal > 0 {
        (totals.kcal as f64 * 100.0 / target_kcal as f64).round() as i64
    } else {
        0
    };
    DailyProgress {
        date,
        totals: *totals,
        target_kcal,
        remaining_kcal: target_kcal - totals.kcal,
        percent_of_target,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
