use crate::config::{ClassifierConfig, Settings};
use crate::error::Result;
use crate::labels;
use crate::models::ClassificationCandidate;
use crate::onnx::{InferenceExecutor, ModelHandle};
use crate::postprocess::{self, NutrientIdLookup, SequentialIds};
use crate::preprocess::{self, RgbaBitmap, Resampling};
use std::path::Path;

/// Preprocess, run and postprocess behind one caller-owned value.
pub struct FoodClassifier {
    handle: ModelHandle,
    channel_means: [f32; 3],
    channel_stds: [f32; 3],
    top_k: usize,
    confidence_threshold: f32,
    resampling: Resampling,
    lookup: Box<dyn NutrientIdLookup + Send>,
}

impl FoodClassifier {
    pub fn new(
        handle: ModelHandle,
        config: &ClassifierConfig,
        lookup: Box<dyn NutrientIdLookup + Send>,
    ) -> Self {
        Self {
            handle,
            channel_means: config.channel_means,
            channel_stds: config.channel_stds,
            top_k: config.top_k,
            confidence_threshold: config.confidence_threshold,
            resampling: Resampling::default(),
            lookup,
        }
    }

    /// Loads the configured model with its labels and positional nutrient ids.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let model_path = settings.model_path();
        let labels_path = settings.labels_path();
        Self::load(&settings.classifier, &model_path, labels_path.as_deref())
    }

    pub fn load(
        config: &ClassifierConfig,
        model_path: &Path,
        labels_path: Option<&Path>,
    ) -> Result<Self> {
        let labels = labels::load_labels_for_model(model_path, labels_path)?;
        let handle = InferenceExecutor::from_config(config).load(model_path, labels)?;
        let lookup = SequentialIds::with_width(config.nutrient_id_width);
        Ok(Self::new(handle, config, Box::new(lookup)))
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) {
        self.confidence_threshold = threshold;
    }

    pub fn classify(&mut self, bitmap: &RgbaBitmap) -> Result<Vec<ClassificationCandidate>> {
        let tensor = preprocess::preprocess_with(
            bitmap,
            self.handle.input_size(),
            self.channel_means,
            self.channel_stds,
            self.resampling,
        )?;
        let scores = self.handle.run(tensor)?;
        postprocess::postprocess(
            scores.as_slice(),
            self.handle.labels(),
            self.top_k,
            self.confidence_threshold,
            &*self.lookup,
        )
    }

    pub fn classify_file(&mut self, path: &Path) -> Result<Vec<ClassificationCandidate>> {
        let bitmap = RgbaBitmap::open(path)?;
        self.classify(&bitmap)
    }

    pub fn backend(&self) -> &str {
        self.handle.backend()
    }

    pub fn labels(&self) -> &[String] {
        self.handle.labels()
    }

    pub fn dispose(&mut self) {
        self.handle.dispose();
    }
}
