//! Energy expenditure and body-composition arithmetic.
//!
//! Basal metabolic rate uses the Mifflin-St Jeor equation:
//!
//! - Mifflin, M.D., et al. (1990). A new predictive equation for resting energy expenditure.
//!   *American Journal of Clinical Nutrition*, 51(2), 241-247.
//!
//! Every function here is pure; inputs are validated against [`EnergyLimits`].

use crate::config::EnergyLimits;
use crate::error::{Error, Result};
use crate::models::{
    BiometricProfile, BmiCategory, BmiResult, DailyTarget, EnergyGoal, EnergyResult, Gender,
    GoalKind, GoalRate, GoalTarget, MacroSplit, WeightRange,
};

const MSJ_WEIGHT_COEF: f64 = 10.0;
const MSJ_HEIGHT_COEF: f64 = 6.25;
const MSJ_AGE_COEF: f64 = -5.0;
const MSJ_MALE_CONSTANT: f64 = 5.0;
const MSJ_FEMALE_CONSTANT: f64 = -161.0;

const BMI_UNDERWEIGHT_BELOW: f64 = 18.5;
const BMI_NORMAL_BELOW: f64 = 25.0;
const BMI_OVERWEIGHT_BELOW: f64 = 30.0;
const IDEAL_BMI_MIN: f64 = 18.5;
const IDEAL_BMI_MAX: f64 = 24.9;

const PROTEIN_G_PER_KG: f64 = 1.9;
const FAT_ENERGY_SHARE: f64 = 0.25;
const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARB: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

/// Calculate BMR and TDEE for a biometric profile.
///
/// `bmr = round(10 x weight + 6.25 x height - 5 x age + (5 | -161))`
/// and `tdee = round(bmr x activity factor)`. TDEE is computed from the
/// rounded BMR so the two published figures stay consistent.
///
/// # Errors
///
/// Returns `InvalidBiometric` if age, weight or height is not positive or
/// exceeds the configured limits.
pub fn compute_energy(profile: &BiometricProfile, limits: &EnergyLimits) -> Result<EnergyResult> {
    validate_profile(profile, limits)?;

    let gender_constant = match profile.gender {
        Gender::Male => MSJ_MALE_CONSTANT,
        Gender::Female => MSJ_FEMALE_CONSTANT,
    };
    let raw = MSJ_WEIGHT_COEF * profile.weight_kg
        + MSJ_HEIGHT_COEF * profile.height_cm
        + MSJ_AGE_COEF * f64::from(profile.age_years)
        + gender_constant;
    let bmr = raw.round() as i64;
    let tdee = (bmr as f64 * profile.activity.factor()).round() as i64;
    Ok(EnergyResult { bmr, tdee })
}

/// Body-mass index rounded to one decimal.
///
/// The category is taken from the rounded value, inclusive below each
/// boundary: 18.5 is normal, 25.0 overweight, 30.0 obese.
pub fn compute_bmi(weight_kg: f64, height_cm: f64) -> Result<BmiResult> {
    positive("weight_kg", weight_kg)?;
    positive("height_cm", height_cm)?;
    let meters = height_cm / 100.0;
    let bmi = round1(weight_kg / (meters * meters));
    Ok(BmiResult {
        bmi,
        category: bmi_category(bmi),
    })
}

pub fn bmi_category(bmi: f64) -> BmiCategory {
    if bmi < BMI_UNDERWEIGHT_BELOW {
        BmiCategory::Underweight
    } else if bmi < BMI_NORMAL_BELOW {
        BmiCategory::Normal
    } else if bmi < BMI_OVERWEIGHT_BELOW {
        BmiCategory::Overweight
    } else {
        BmiCategory::Obese
    }
}

pub fn ideal_weight_range(height_cm: f64) -> Result<WeightRange> {
    positive("height_cm", height_cm)?;
    let meters = height_cm / 100.0;
    let area = meters * meters;
    Ok(WeightRange {
        min: (IDEAL_BMI_MIN * area).round() as i64,
        max: (IDEAL_BMI_MAX * area).round() as i64,
    })
}

/// Fixed kcal/day adjustment and the weekly change it stands for.
///
/// The weekly figures are the literal table values, not derived from an
/// energy-density constant.
pub fn goal_adjustment(kind: GoalKind, rate: GoalRate) -> (i64, f64) {
    match (kind, rate) {
        (GoalKind::Maintain, _) => (0, 0.0),
        (GoalKind::Lose, GoalRate::Slow) => (-250, -0.25),
        (GoalKind::Lose, GoalRate::Moderate) => (-500, -0.5),
        (GoalKind::Lose, GoalRate::Fast) => (-750, -0.75),
        (GoalKind::Gain, GoalRate::Slow) => (250, 0.25),
        (GoalKind::Gain, GoalRate::Moderate) => (500, 0.5),
        (GoalKind::Gain, GoalRate::Fast) => (750, 0.75),
    }
}

pub fn goal_calories(tdee: i64, kind: GoalKind, rate: GoalRate) -> GoalTarget {
    let (adjustment, weekly_change_kg) = goal_adjustment(kind, rate);
    let description = match kind {
        GoalKind::Maintain => "Maintain current weight".to_string(),
        GoalKind::Lose => format!("Lose {} kg per week", weekly_change_kg.abs()),
        GoalKind::Gain => format!("Gain {weekly_change_kg} kg per week"),
    };
    GoalTarget {
        daily_kcal: tdee + adjustment,
        weekly_change_kg,
        description,
    }
}

/// Default macro split for a daily energy figure.
///
/// Protein is `round(weight x 1.9)` g, fat is 25% of energy, carbohydrate
/// takes what is left (never negative). Percentages are rounded
/// independently and may not sum to exactly 100.
pub fn macro_split(daily_kcal: i64, weight_kg: f64) -> Result<MacroSplit> {
    positive("weight_kg", weight_kg)?;
    let kcal = daily_kcal.max(0) as f64;
    let protein_g = (weight_kg * PROTEIN_G_PER_KG).round();
    let protein_kcal = protein_g * KCAL_PER_G_PROTEIN;
    let fat_kcal = kcal * FAT_ENERGY_SHARE;
    let carb_kcal = (kcal - protein_kcal - fat_kcal).max(0.0);

    let pct = |part: f64| {
        if kcal > 0.0 {
            (part / kcal * 100.0).round() as i64
        } else {
            0
        }
    };
    Ok(MacroSplit {
        protein_g: protein_g as i64,
        fat_g: (fat_kcal / KCAL_PER_G_FAT).round() as i64,
        carb_g: (carb_kcal / KCAL_PER_G_CARB).round() as i64,
        protein_pct: pct(protein_kcal),
        fat_pct: pct(fat_kcal),
        carb_pct: pct(carb_kcal),
    })
}

/// Everything needed to contextualize a day's log for one profile and goal.
///
/// Macros are split from the goal-adjusted intake, not from raw TDEE.
pub fn daily_target(
    profile: &BiometricProfile,
    goal: EnergyGoal,
    limits: &EnergyLimits,
) -> Result<DailyTarget> {
    let energy = compute_energy(profile, limits)?;
    let bmi = compute_bmi(profile.weight_kg, profile.height_cm)?;
    let ideal_weight = ideal_weight_range(profile.height_cm)?;
    let goal = goal_calories(energy.tdee, goal.kind, goal.rate);
    let macros = macro_split(goal.daily_kcal, profile.weight_kg)?;
    Ok(DailyTarget {
        energy,
        bmi,
        ideal_weight,
        goal,
        macros,
    })
}

fn validate_profile(profile: &BiometricProfile, limits: &EnergyLimits) -> Result<()> {
    if profile.age_years == 0 || profile.age_years > limits.max_age_years {
        return Err(Error::InvalidBiometric {
            field: "age_years",
            value: f64::from(profile.age_years),
        });
    }
    positive("weight_kg", profile.weight_kg)?;
    if profile.weight_kg > limits.max_weight_kg {
        return Err(Error::InvalidBiometric {
            field: "weight_kg",
            value: profile.weight_kg,
        });
    }
    positive("height_cm", profile.height_cm)?;
    if profile.height_cm > limits.max_height_cm {
        return Err(Error::InvalidBiometric {
            field: "height_cm",
            value: profile.height_cm,
        });
    }
    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::InvalidBiometric { field, value });
    }
    Ok(())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
