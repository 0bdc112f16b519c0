use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which accelerated backends to try. The CPU baseline is always tried last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderChoice {
    Auto,
    CpuOnly,
    #[serde(rename = "prefer_directml", alias = "directml")]
    PreferDirectML,
}

impl ProviderChoice {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "cpu" | "cpu_only" => Some(Self::CpuOnly),
            "directml" | "dml" | "prefer_directml" => Some(Self::PreferDirectML),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    /// Falls back to the `<model>.labels.txt` sidecar when unset.
    #[serde(default)]
    pub labels_path: Option<PathBuf>,
    #[serde(default = "default_input_size")]
    pub input_size: usize,
    #[serde(default = "default_channel_means")]
    pub channel_means: [f32; 3],
    #[serde(default = "default_channel_stds")]
    pub channel_stds: [f32; 3],
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_provider")]
    pub provider: ProviderChoice,
    #[serde(default)]
    pub device_id: Option<u32>,
    #[serde(default = "default_nutrient_id_width")]
    pub nutrient_id_width: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("food_classifier.onnx"),
            labels_path: None,
            input_size: default_input_size(),
            channel_means: default_channel_means(),
            channel_stds: default_channel_stds(),
            top_k: default_top_k(),
            confidence_threshold: default_confidence_threshold(),
            provider: default_provider(),
            device_id: None,
            nutrient_id_width: default_nutrient_id_width(),
        }
    }
}

fn default_input_size() -> usize {
    224
}

fn default_channel_means() -> [f32; 3] {
    [0.485, 0.456, 0.406]
}

fn default_channel_stds() -> [f32; 3] {
    [0.229, 0.224, 0.225]
}

fn default_top_k() -> usize {
    5
}

fn default_confidence_threshold() -> f32 {
    0.05
}

fn default_provider() -> ProviderChoice {
    ProviderChoice::Auto
}

fn default_nutrient_id_width() -> usize {
    3
}

/// Sanity limits for biometric input. Not physiological law.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EnergyLimits {
    pub max_age_years: u32,
    pub max_weight_kg: f64,
    pub max_height_cm: f64,
}

impl Default for EnergyLimits {
    fn default() -> Self {
        Self {
            max_age_years: 120,
            max_weight_kg: 500.0,
            max_height_cm: 300.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub energy: EnergyLimits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            classifier: ClassifierConfig::default(),
            energy: EnergyLimits::default(),
        }
    }
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut settings: Settings = serde_json::from_str(&contents)?;
        settings.apply_env()?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Reads the file when given, otherwise starts from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let mut settings = Self::default();
                settings.apply_env()?;
                Ok(settings)
            }
        }
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("MEAL_LENS_PROVIDER") {
            self.classifier.provider = ProviderChoice::parse(&value).ok_or_else(|| {
                Error::Config(format!("Unknown MEAL_LENS_PROVIDER value: {value}"))
            })?;
        }
        if let Ok(value) = std::env::var("MEAL_LENS_MODEL") {
            if !value.trim().is_empty() {
                self.classifier.model_path = PathBuf::from(value);
            }
        }
        Ok(())
    }

    pub fn resolve_model(&self, name: &Path) -> PathBuf {
        if name.is_absolute() || name.exists() {
            name.to_path_buf()
        } else {
            self.models_dir.join(name)
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.resolve_model(&self.classifier.model_path)
    }

    pub fn labels_path(&self) -> Option<PathBuf> {
        self.classifier
            .labels_path
            .as_deref()
            .map(|p| self.resolve_model(p))
    }
}
