use crate::config::{ClassifierConfig, ProviderChoice};
use crate::error::{Error, Result};
use crate::preprocess::Tensor;
use std::path::{Path, PathBuf};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

#[cfg(target_os = "windows")]
use ort::execution_providers::{DirectMLExecutionProvider, ExecutionProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InferenceProvider {
    Cpu,
    DirectML { device_id: u32 },
}

impl InferenceProvider {
    pub fn label(self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::DirectML { .. } => "GPU (DirectML)",
        }
    }

    pub fn device_id(self) -> Option<u32> {
        match self {
            Self::DirectML { device_id } => Some(device_id),
            Self::Cpu => None,
        }
    }
}

/// Raw logits for one forward pass, index-aligned with the label list.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector(Vec<f32>);

impl ScoreVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// A loaded model on one backend. `forward` may only touch scratch state.
pub trait ModelSession: Send {
    fn forward(&mut self, input: &Tensor) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend does not exist on this machine or build.
    Unavailable(String),
    /// The backend exists but could not load or execute the model.
    Failed(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "unavailable: {reason}"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

pub trait BackendStrategy: Send + Sync {
    fn name(&self) -> String;
    fn open(&self, model_path: &Path) -> std::result::Result<Box<dyn ModelSession>, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Loaded,
    Unavailable(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAttempt {
    pub backend: String,
    pub outcome: AttemptOutcome,
}

/// Tries accelerated backends in order, then the baseline, which is not allowed to be skipped.
pub struct InferenceExecutor {
    accelerated: Vec<Box<dyn BackendStrategy>>,
    baseline: Box<dyn BackendStrategy>,
    input_size: usize,
}

impl InferenceExecutor {
    pub fn new(
        accelerated: Vec<Box<dyn BackendStrategy>>,
        baseline: Box<dyn BackendStrategy>,
        input_size: usize,
    ) -> Self {
        Self {
            accelerated,
            baseline,
            input_size,
        }
    }

    pub fn from_config(cfg: &ClassifierConfig) -> Self {
        let device_id = cfg.device_id.unwrap_or(0);
        let mut accelerated: Vec<Box<dyn BackendStrategy>> = Vec::new();
        if matches!(cfg.provider, ProviderChoice::Auto | ProviderChoice::PreferDirectML) {
            accelerated.push(Box::new(OrtBackend::new(InferenceProvider::DirectML {
                device_id,
            })));
        }
        Self::new(
            accelerated,
            Box::new(OrtBackend::new(InferenceProvider::Cpu)),
            cfg.input_size,
        )
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.accelerated
            .iter()
            .map(|b| b.name())
            .chain(std::iter::once(self.baseline.name()))
            .collect()
    }

    pub fn load(&self, model_path: &Path, labels: Vec<String>) -> Result<ModelHandle> {
        let mut attempts = Vec::new();
        for strategy in &self.accelerated {
            let backend = strategy.name();
            match self.open_and_probe(strategy.as_ref(), model_path) {
                Ok((session, outputs)) => {
                    attempts.push(BackendAttempt {
                        backend: backend.clone(),
                        outcome: AttemptOutcome::Loaded,
                    });
                    return self.finish(session, outputs, labels, backend, attempts, model_path);
                }
                Err(err) => {
                    log::warn!(
                        "{backend} backend {err}; falling back for {}",
                        model_path.display()
                    );
                    attempts.push(BackendAttempt {
                        backend,
                        outcome: match err {
                            BackendError::Unavailable(reason) => AttemptOutcome::Unavailable(reason),
                            BackendError::Failed(reason) => AttemptOutcome::Failed(reason),
                        },
                    });
                }
            }
        }

        let backend = self.baseline.name();
        match self.open_and_probe(self.baseline.as_ref(), model_path) {
            Ok((session, outputs)) => {
                attempts.push(BackendAttempt {
                    backend: backend.clone(),
                    outcome: AttemptOutcome::Loaded,
                });
                self.finish(session, outputs, labels, backend, attempts, model_path)
            }
            Err(BackendError::Unavailable(reason)) | Err(BackendError::Failed(reason)) => {
                Err(Error::ModelLoad { backend, reason })
            }
        }
    }

    fn open_and_probe(
        &self,
        strategy: &dyn BackendStrategy,
        model_path: &Path,
    ) -> std::result::Result<(Box<dyn ModelSession>, usize), BackendError> {
        let mut session = strategy.open(model_path)?;
        let probe = Tensor::zeros(self.input_size);
        let outputs = session
            .forward(&probe)
            .map_err(|e| BackendError::Failed(format!("probe run failed: {e}")))?;
        Ok((session, outputs.len()))
    }

    fn finish(
        &self,
        session: Box<dyn ModelSession>,
        outputs: usize,
        labels: Vec<String>,
        backend: String,
        attempts: Vec<BackendAttempt>,
        model_path: &Path,
    ) -> Result<ModelHandle> {
        if outputs != labels.len() {
            return Err(Error::LabelMismatch {
                labels: labels.len(),
                outputs,
            });
        }
        log::info!(
            "Loaded food classifier {} on {backend} ({outputs} classes)",
            model_path.display()
        );
        Ok(ModelHandle {
            session: Some(session),
            labels,
            input_size: self.input_size,
            backend,
            attempts,
            model_path: model_path.to_path_buf(),
        })
    }
}

/// Caller-owned loaded model. Not shared; wrap it in a worker to serialize access.
pub struct ModelHandle {
    session: Option<Box<dyn ModelSession>>,
    labels: Vec<String>,
    input_size: usize,
    backend: String,
    attempts: Vec<BackendAttempt>,
    model_path: PathBuf,
}

impl ModelHandle {
    pub fn run(&mut self, tensor: Tensor) -> Result<ScoreVector> {
        let session = self.session.as_mut().ok_or(Error::HandleDisposed)?;
        let expected = [1, 3, self.input_size, self.input_size];
        if tensor.shape() != expected {
            return Err(Error::Inference(format!(
                "input tensor shape {:?} does not match {expected:?}",
                tensor.shape()
            )));
        }
        let scores = session.forward(&tensor)?;
        if scores.len() != self.labels.len() {
            return Err(Error::Inference(format!(
                "model returned {} scores, expected {}",
                scores.len(),
                self.labels.len()
            )));
        }
        Ok(ScoreVector(scores))
    }

    pub fn dispose(&mut self) {
        if self.session.take().is_some() {
            log::info!("Released {} backend for {}", self.backend, self.model_path.display());
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.session.is_none()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn attempts(&self) -> &[BackendAttempt] {
        &self.attempts
    }
}

pub struct OrtBackend {
    provider: InferenceProvider,
}

impl OrtBackend {
    pub fn new(provider: InferenceProvider) -> Self {
        Self { provider }
    }
}

impl BackendStrategy for OrtBackend {
    fn name(&self) -> String {
        self.provider.label().to_string()
    }

    fn open(&self, model_path: &Path) -> std::result::Result<Box<dyn ModelSession>, BackendError> {
        if !model_path.exists() {
            return Err(BackendError::Failed(format!(
                "Model not found: {}",
                model_path.display()
            )));
        }
        let session = build_session(model_path, self.provider)?;
        Ok(Box::new(OrtSession { session }))
    }
}

struct OrtSession {
    session: Session,
}

impl ModelSession for OrtSession {
    fn forward(&mut self, input: &Tensor) -> Result<Vec<f32>> {
        let tensor = TensorRef::from_array_view(input.as_array())
            .map_err(|e| Error::Inference(format!("Invalid input tensor: {e}")))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| Error::Inference(format!("Failed to run food classifier: {e}")))?;
        if outputs.len() == 0 {
            return Err(Error::Inference("Food classifier returned no outputs".into()));
        }
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Inference(format!("Output extraction: {e}")))?;
        Ok(data.to_vec())
    }
}

#[cfg(target_os = "windows")]
fn prepend_path_dir(dir: &Path) {
    let paths = std::env::var_os("PATH").unwrap_or_default();
    let mut new_paths = std::ffi::OsString::new();
    new_paths.push(dir);
    new_paths.push(";");
    new_paths.push(&paths);
    std::env::set_var("PATH", new_paths);
}

#[cfg(target_os = "windows")]
fn resolve_ort_dylib_path() -> Option<(PathBuf, PathBuf)> {
    if let Ok(path) = std::env::var("ORT_DYLIB_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            let dir = path.parent()?.to_path_buf();
            return Some((path, dir));
        }
    }
    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            candidates.push(parent.join("onnxruntime").join("onnxruntime.dll"));
        }
    }
    candidates.push(
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("vendor")
            .join("onnxruntime")
            .join("win-x64-directml")
            .join("onnxruntime.dll"),
    );
    candidates.into_iter().find(|c| c.exists()).and_then(|dll| {
        let dir = dll.parent()?.to_path_buf();
        Some((dll, dir))
    })
}

fn ensure_environment() -> std::result::Result<(), BackendError> {
    #[cfg(target_os = "windows")]
    {
        if let Some((dll_path, dll_dir)) = resolve_ort_dylib_path() {
            std::env::set_var("ORT_DYLIB_PATH", &dll_path);
            prepend_path_dir(&dll_dir);
        }
    }
    let committed = std::panic::catch_unwind(|| ort::init().with_name("meal-lens").commit())
        .map_err(|_| BackendError::Unavailable("ONNX Runtime library could not be loaded".into()))?
        .map_err(|e| BackendError::Failed(format!("Failed to init ORT environment: {e}")))?;
    if committed {
        log::info!("ONNX Runtime environment initialised");
    }
    Ok(())
}

fn failed<E: std::fmt::Display>(e: E) -> BackendError {
    BackendError::Failed(format!("{e}"))
}

fn build_session(
    model_path: &Path,
    provider: InferenceProvider,
) -> std::result::Result<Session, BackendError> {
    #[cfg(not(target_os = "windows"))]
    {
        if let InferenceProvider::DirectML { .. } = provider {
            return Err(BackendError::Unavailable(
                "DirectML is only available on Windows".into(),
            ));
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let InferenceProvider::DirectML { .. } = provider {
            match DirectMLExecutionProvider::default().is_available() {
                Ok(true) => {}
                _ => {
                    return Err(BackendError::Unavailable(
                        "DirectML execution provider not available".into(),
                    ))
                }
            }
        }
    }
    ensure_environment()?;

    let build = || -> std::result::Result<Session, BackendError> {
        #[allow(unused_mut)]
        let mut builder = Session::builder()
            .map_err(failed)?
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .map_err(failed)?
            .with_parallel_execution(false)
            .map_err(failed)?;
        #[cfg(target_os = "windows")]
        {
            if let Some(device_id) = provider.device_id() {
                builder = builder.with_memory_pattern(false).map_err(failed)?;
                let ep = DirectMLExecutionProvider::default()
                    .with_device_id(device_id as i32)
                    .build();
                builder = builder.with_execution_providers([ep]).map_err(failed)?;
            }
        }
        builder.commit_from_file(model_path).map_err(failed)
    };
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(build)) {
        Ok(res) => res,
        Err(_) => Err(BackendError::Failed(
            "ONNX Runtime panicked while building session".into(),
        )),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns fixed logits; counts forward passes.
    pub(crate) struct FixedSession {
        pub scores: Vec<f32>,
        pub calls: Arc<AtomicUsize>,
    }

    impl ModelSession for FixedSession {
        fn forward(&mut self, _input: &Tensor) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scores.clone())
        }
    }

    pub(crate) struct FakeBackend {
        pub name: &'static str,
        pub result: std::result::Result<Vec<f32>, BackendError>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        pub fn ok(name: &'static str, scores: Vec<f32>) -> Self {
            Self {
                name,
                result: Ok(scores),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn err(name: &'static str, err: BackendError) -> Self {
            Self {
                name,
                result: Err(err),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl BackendStrategy for FakeBackend {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn open(&self, _model_path: &Path) -> std::result::Result<Box<dyn ModelSession>, BackendError> {
            match &self.result {
                Ok(scores) => Ok(Box::new(FixedSession {
                    scores: scores.clone(),
                    calls: self.calls.clone(),
                })),
                Err(err) => Err(err.clone()),
            }
        }
    }

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("food_{i}")).collect()
    }

    #[test]
    fn first_working_backend_wins() {
        let executor = InferenceExecutor::new(
            vec![
                Box::new(FakeBackend::err("npu", BackendError::Unavailable("no device".into()))),
                Box::new(FakeBackend::ok("gpu", vec![0.1, 0.2, 0.3])),
            ],
            Box::new(FakeBackend::ok("cpu", vec![0.0, 0.0, 0.0])),
            4,
        );
        let handle = executor.load(Path::new("food.onnx"), labels(3)).unwrap();
        assert_eq!(handle.backend(), "gpu");
        assert_eq!(
            handle.attempts(),
            &[
                BackendAttempt {
                    backend: "npu".into(),
                    outcome: AttemptOutcome::Unavailable("no device".into()),
                },
                BackendAttempt {
                    backend: "gpu".into(),
                    outcome: AttemptOutcome::Loaded,
                },
            ]
        );
    }

    #[test]
    fn baseline_failure_is_propagated_verbatim() {
        let executor = InferenceExecutor::new(
            vec![Box::new(FakeBackend::err("gpu", BackendError::Failed("driver".into())))],
            Box::new(FakeBackend::err("cpu", BackendError::Failed("corrupt model".into()))),
            4,
        );
        match executor.load(Path::new("food.onnx"), labels(3)) {
            Err(Error::ModelLoad { backend, reason }) => {
                assert_eq!(backend, "cpu");
                assert_eq!(reason, "corrupt model");
            }
            other => panic!("expected model load error, got {:?}", other.map(|h| h.backend().to_string())),
        }
    }

    #[test]
    fn label_count_is_checked_at_load() {
        let executor = InferenceExecutor::new(
            Vec::new(),
            Box::new(FakeBackend::ok("cpu", vec![0.0; 5])),
            4,
        );
        match executor.load(Path::new("food.onnx"), labels(4)) {
            Err(Error::LabelMismatch { labels, outputs }) => {
                assert_eq!((labels, outputs), (4, 5));
            }
            _ => panic!("expected label mismatch"),
        }
    }

    #[test]
    fn run_is_repeatable_and_fails_after_dispose() {
        let backend = FakeBackend::ok("cpu", vec![1.0, 2.0]);
        let calls = backend.calls.clone();
        let executor = InferenceExecutor::new(Vec::new(), Box::new(backend), 4);
        let mut handle = executor.load(Path::new("food.onnx"), labels(2)).unwrap();

        let first = handle.run(Tensor::zeros(4)).unwrap();
        let second = handle.run(Tensor::zeros(4)).unwrap();
        assert_eq!(first, second);
        // probe + two runs
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        handle.dispose();
        assert!(handle.is_disposed());
        assert!(matches!(handle.run(Tensor::zeros(4)), Err(Error::HandleDisposed)));
    }

    #[test]
    fn run_rejects_wrong_tensor_shape() {
        let executor = InferenceExecutor::new(
            Vec::new(),
            Box::new(FakeBackend::ok("cpu", vec![1.0])),
            4,
        );
        let mut handle = executor.load(Path::new("food.onnx"), labels(1)).unwrap();
        assert!(matches!(handle.run(Tensor::zeros(8)), Err(Error::Inference(_))));
    }

    #[test]
    fn config_orders_directml_before_cpu() {
        let executor = InferenceExecutor::from_config(&ClassifierConfig::default());
        assert_eq!(executor.backend_names(), vec!["GPU (DirectML)", "CPU"]);

        let cpu_only = ClassifierConfig {
            provider: ProviderChoice::CpuOnly,
            ..ClassifierConfig::default()
        };
        assert_eq!(InferenceExecutor::from_config(&cpu_only).backend_names(), vec!["CPU"]);

        let prefer_dml = ClassifierConfig {
            provider: ProviderChoice::PreferDirectML,
            ..ClassifierConfig::default()
        };
        assert_eq!(
            InferenceExecutor::from_config(&prefer_dml).backend_names(),
            vec!["GPU (DirectML)", "CPU"]
        );
    }

    #[test]
    fn missing_model_fails_on_baseline() {
        let executor = InferenceExecutor::new(
            Vec::new(),
            Box::new(OrtBackend::new(InferenceProvider::Cpu)),
            4,
        );
        let err = executor
            .load(Path::new("definitely_missing_food_model.onnx"), labels(2))
            .err()
            .unwrap();
        assert!(matches!(err, Error::ModelLoad { ref backend, .. } if backend == "CPU"));
    }
}
