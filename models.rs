use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

/// Per-100g reference record from the nutrient dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NutrientProfile {
    pub id: String,
    pub name_primary: String,
    #[serde(default)]
    pub name_secondary: String,
    #[serde(default)]
    pub category: String,
    pub kcal_per_100g: f64,
    pub protein_g: f64,
    pub carb_g: f64,
    pub fat_g: f64,
    #[serde(default)]
    pub fiber_g: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationCandidate {
    pub label: String,
    pub confidence: f32,
    pub nutrient_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct NutritionAmount {
    pub kcal: i64,
    pub protein_g: f64,
    pub carb_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DailyTotals {
    pub kcal: i64,
    pub protein_g: f64,
    pub carb_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    pub meal_count: usize,
}

/// One logged portion. The amount is always derived from the profile and grams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FoodLogEntry {
    pub id: Uuid,
    pub food_id: String,
    pub food_name: String,
    pub grams: f64,
    pub date: NaiveDate,
    pub amount: NutritionAmount,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyProgress {
    pub date: Option<NaiveDate>,
    pub totals: DailyTotals,
    pub target_kcal: i64,
    pub remaining_kcal: i64,
    pub percent_of_target: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    /// Little or no exercise.
    Sedentary,
    /// Exercise 1-3 days a week.
    LightlyActive,
    /// Exercise 3-5 days a week.
    ModeratelyActive,
    /// Exercise 6-7 days a week.
    VeryActive,
    /// Hard training twice a day or a physical job.
    ExtraActive,
}

impl ActivityLevel {
    pub fn factor(self) -> f64 {
        match self {
            Self::Sedentary => 1.2,
            Self::LightlyActive => 1.375,
            Self::ModeratelyActive => 1.55,
            Self::VeryActive => 1.725,
            Self::ExtraActive => 1.9,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BiometricProfile {
    pub gender: Gender,
    pub age_years: u32,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub activity: ActivityLevel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    Lose,
    Maintain,
    Gain,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GoalRate {
    Slow,
    Moderate,
    Fast,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EnergyGoal {
    pub kind: GoalKind,
    pub rate: GoalRate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnergyResult {
    pub bmr: i64,
    pub tdee: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Underweight => "underweight",
            Self::Normal => "normal",
            Self::Overweight => "overweight",
            Self::Obese => "obese",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BmiResult {
    pub bmi: f64,
    pub category: BmiCategory,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeightRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalTarget {
    pub daily_kcal: i64,
    pub weekly_change_kg: f64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MacroSplit {
    pub protein_g: i64,
    pub fat_g: i64,
    pub carb_g: i64,
    pub protein_pct: i64,
    pub fat_pct: i64,
    pub carb_pct: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyTarget {
    pub energy: EnergyResult,
    pub bmi: BmiResult,
    pub ideal_weight: WeightRange,
    pub goal: GoalTarget,
    pub macros: MacroSplit,
}
