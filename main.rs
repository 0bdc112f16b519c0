use clap::{Args, Parser, Subcommand, ValueEnum};
use meal_lens::config::Settings;
use meal_lens::energy;
use meal_lens::models::{
    ActivityLevel, BiometricProfile, EnergyGoal, Gender, GoalKind, GoalRate, NutrientProfile,
};
use meal_lens::nutrition;
use meal_lens::preprocess::RgbaBitmap;
use meal_lens::{ClassifierWorker, Error, FoodClassifier, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const SUPPORTED_EXT: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Parser)]
#[command(name = "meal-lens")]
#[command(about = "On-device food recognition and nutrition figures")]
struct Cli {
    /// Settings file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify one image and print ranked candidates
    Classify {
        image: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Classify every supported image under a folder
    ClassifyDir {
        dir: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
        /// Pending requests the worker queue holds
        #[arg(long, default_value_t = 16)]
        queue: usize,
    },
    /// Scale a per-100g profile from a JSON dataset to a portion
    Scale {
        #[arg(long)]
        foods: PathBuf,
        #[arg(long)]
        id: String,
        #[arg(long)]
        grams: f64,
    },
    /// Print BMR, TDEE, BMI, ideal weight, goal calories and macros
    Plan {
        #[arg(long, value_enum)]
        gender: GenderArg,
        #[arg(long)]
        age: u32,
        /// Body weight in kg
        #[arg(long)]
        weight: f64,
        /// Height in cm
        #[arg(long)]
        height: f64,
        #[arg(long, value_enum, default_value = "sedentary")]
        activity: ActivityArg,
        #[arg(long, value_enum, default_value = "maintain")]
        goal: GoalArg,
        #[arg(long, value_enum, default_value = "moderate")]
        rate: RateArg,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Model file; relative paths resolve against the models directory
    #[arg(long)]
    model: Option<PathBuf>,
    /// Label list; defaults to the `<model>.labels.txt` sidecar
    #[arg(long)]
    labels: Option<PathBuf>,
    #[arg(long)]
    top_k: Option<usize>,
    #[arg(long)]
    threshold: Option<f32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum GenderArg {
    Male,
    Female,
}

#[derive(Clone, Copy, ValueEnum)]
enum ActivityArg {
    Sedentary,
    Light,
    Moderate,
    Very,
    Extra,
}

#[derive(Clone, Copy, ValueEnum)]
enum GoalArg {
    Lose,
    Maintain,
    Gain,
}

#[derive(Clone, Copy, ValueEnum)]
enum RateArg {
    Slow,
    Moderate,
    Fast,
}

impl From<GenderArg> for Gender {
    fn from(arg: GenderArg) -> Self {
        match arg {
            GenderArg::Male => Gender::Male,
            GenderArg::Female => Gender::Female,
        }
    }
}

impl From<ActivityArg> for ActivityLevel {
    fn from(arg: ActivityArg) -> Self {
        match arg {
            ActivityArg::Sedentary => ActivityLevel::Sedentary,
            ActivityArg::Light => ActivityLevel::LightlyActive,
            ActivityArg::Moderate => ActivityLevel::ModeratelyActive,
            ActivityArg::Very => ActivityLevel::VeryActive,
            ActivityArg::Extra => ActivityLevel::ExtraActive,
        }
    }
}

impl From<GoalArg> for GoalKind {
    fn from(arg: GoalArg) -> Self {
        match arg {
            GoalArg::Lose => GoalKind::Lose,
            GoalArg::Maintain => GoalKind::Maintain,
            GoalArg::Gain => GoalKind::Gain,
        }
    }
}

impl From<RateArg> for GoalRate {
    fn from(arg: RateArg) -> Self {
        match arg {
            RateArg::Slow => GoalRate::Slow,
            RateArg::Moderate => GoalRate::Moderate,
            RateArg::Fast => GoalRate::Fast,
        }
    }
}

#[derive(Serialize)]
struct FileResult<'a, T: Serialize> {
    path: &'a Path,
    candidates: T,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        log::error!("{err}");
        eprintln!("error ({:?}): {err}", err.kind());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load_or_default(cli.config.as_deref())?;
    match cli.command {
        Command::Classify { image, model } => {
            apply_model_args(&mut settings, &model);
            let mut classifier = FoodClassifier::from_settings(&settings)?;
            let candidates = classifier.classify_file(&image)?;
            print_json(&candidates)
        }
        Command::ClassifyDir { dir, model, queue } => {
            apply_model_args(&mut settings, &model);
            classify_dir(&settings, &dir, queue)
        }
        Command::Scale { foods, id, grams } => {
            let contents = std::fs::read_to_string(&foods)?;
            let dataset: Vec<NutrientProfile> = serde_json::from_str(&contents)?;
            let profile = dataset
                .iter()
                .find(|p| p.id == id)
                .ok_or_else(|| Error::Config(format!("Food {id} not in {}", foods.display())))?;
            print_json(&nutrition::scale(profile, grams)?)
        }
        Command::Plan {
            gender,
            age,
            weight,
            height,
            activity,
            goal,
            rate,
        } => {
            let profile = BiometricProfile {
                gender: gender.into(),
                age_years: age,
                weight_kg: weight,
                height_cm: height,
                activity: activity.into(),
            };
            let goal = EnergyGoal {
                kind: goal.into(),
                rate: rate.into(),
            };
            print_json(&energy::daily_target(&profile, goal, &settings.energy)?)
        }
    }
}

fn apply_model_args(settings: &mut Settings, args: &ModelArgs) {
    if let Some(model) = &args.model {
        settings.classifier.model_path = model.clone();
    }
    if let Some(labels) = &args.labels {
        settings.classifier.labels_path = Some(labels.clone());
    }
    if let Some(top_k) = args.top_k {
        settings.classifier.top_k = top_k;
    }
    if let Some(threshold) = args.threshold {
        settings.classifier.confidence_threshold = threshold;
    }
}

fn classify_dir(settings: &Settings, dir: &Path, queue: usize) -> Result<()> {
    let classifier = FoodClassifier::from_settings(settings)?;
    let worker = ClassifierWorker::spawn(classifier, queue)?;
    log::info!("Classifying images under {} on {}", dir.display(), worker.backend());

    let mut processed = 0usize;
    let mut failed = 0usize;
    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !is_supported(path) {
            continue;
        }
        let outcome = RgbaBitmap::open(path).and_then(|bitmap| worker.classify(bitmap));
        match outcome {
            Ok(candidates) => {
                processed += 1;
                println!(
                    "{}",
                    serde_json::to_string(&FileResult {
                        path,
                        candidates: &candidates,
                    })?
                );
            }
            Err(err) => {
                failed += 1;
                log::warn!("Classification failed for {}: {}", path.display(), err);
            }
        }
    }
    log::info!("Classified {processed} images, {failed} failed");
    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXT.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
