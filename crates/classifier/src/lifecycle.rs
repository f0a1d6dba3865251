//! Service startup: builds the immutable context shared by all requests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, error, info};

use crate::config::ClassifierConfig;
use crate::{
    ClassLabelTable, ExecutionDevice, ForwardPass, InferenceExecutor, OnnxModel, Preprocessor,
    StartupError,
};

/// Read-only state built once at startup and passed into every request
pub struct ServiceContext {
    labels: ClassLabelTable,
    preprocessor: Preprocessor,
    executor: InferenceExecutor,
    deadline: Duration,
    workers: Arc<Semaphore>,
}

impl ServiceContext {
    /// Load the model artifact and build the context.
    ///
    /// A missing artifact fails with a listing of the model directory so
    /// operators can see what was actually staged.
    pub fn load(config: &ClassifierConfig) -> Result<Self, StartupError> {
        let path = config.model.artifact_path();
        ensure_artifact(&config.model.model_dir, &path)?;

        let preprocessor = Preprocessor::new(&config.preprocess)?;
        let model = OnnxModel::load(&path, preprocessor.input_shape())?;
        Self::assemble(model, preprocessor, config)
    }

    /// Build the context around an already constructed model
    pub fn with_model(
        model: impl ForwardPass + 'static,
        config: &ClassifierConfig,
    ) -> Result<Self, StartupError> {
        let preprocessor = Preprocessor::new(&config.preprocess)?;
        Self::assemble(model, preprocessor, config)
    }

    fn assemble(
        model: impl ForwardPass + 'static,
        preprocessor: Preprocessor,
        config: &ClassifierConfig,
    ) -> Result<Self, StartupError> {
        config.inference.validate()?;
        let labels = ClassLabelTable::new(config.model.labels.clone())?;
        labels.check_outputs(model.output_classes())?;

        let device = ExecutionDevice::select(config.model.device);
        info!(
            "Classifier ready: {} classes, device={}, deadline={}ms, workers={}",
            labels.len(),
            device.as_str(),
            config.inference.timeout_ms,
            config.inference.max_concurrency
        );

        Ok(Self {
            labels,
            preprocessor,
            executor: InferenceExecutor::new(Arc::new(model), device),
            deadline: config.inference.timeout(),
            workers: Arc::new(Semaphore::new(config.inference.max_concurrency)),
        })
    }

    pub fn labels(&self) -> &ClassLabelTable {
        &self.labels
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn executor(&self) -> &InferenceExecutor {
        &self.executor
    }

    pub fn device(&self) -> ExecutionDevice {
        self.executor.device()
    }

    /// Per-request execution deadline
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Permits for in-flight preprocessing and forward passes
    pub(crate) fn workers(&self) -> &Arc<Semaphore> {
        &self.workers
    }
}

fn ensure_artifact(model_dir: &Path, path: &Path) -> Result<(), StartupError> {
    if path.is_file() {
        return Ok(());
    }

    let listing = describe_dir(model_dir);
    error!("Model file not found at {} ({})", path.display(), listing);
    Err(StartupError::ArtifactMissing {
        path: path.to_path_buf(),
        listing,
    })
}

fn describe_dir(dir: &Path) -> String {
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            let mut names: Vec<String> = entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            format!("files in model directory: [{}]", names.join(", "))
        }
        Err(_) => format!("model directory {} does not exist", dir.display()),
    }
}

/// Guards single execution of startup.
///
/// The first successful `initialize` builds the context; later calls return
/// that same context without reloading anything. A failed attempt leaves the
/// lifecycle uninitialized.
#[derive(Default)]
pub struct Lifecycle {
    context: OnceCell<Arc<ServiceContext>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the configured artifact, once
    pub async fn initialize(
        &self,
        config: &ClassifierConfig,
    ) -> Result<Arc<ServiceContext>, StartupError> {
        self.initialize_with(|| ServiceContext::load(config)).await
    }

    /// Run `init` unless a context already exists
    pub async fn initialize_with<F>(&self, init: F) -> Result<Arc<ServiceContext>, StartupError>
    where
        F: FnOnce() -> Result<ServiceContext, StartupError>,
    {
        if self.context.initialized() {
            debug!("Service already initialized, ignoring repeated startup");
        }

        let context = self
            .context
            .get_or_try_init(|| async move {
                info!("Starting initialization...");
                init().map(Arc::new)
            })
            .await?;

        Ok(Arc::clone(context))
    }

    /// Context, if startup has completed
    pub fn get(&self) -> Option<Arc<ServiceContext>> {
        self.context.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.context.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PredictError;
    use ndarray::Array4;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Uniform(usize);

    impl ForwardPass for Uniform {
        fn forward(&self, _input: &Array4<f32>) -> Result<Vec<f32>, PredictError> {
            Ok(vec![0.0; self.0])
        }

        fn output_classes(&self) -> Option<usize> {
            Some(self.0)
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nutriscan-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_missing_artifact_lists_directory() {
        let dir = scratch_dir("listing");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("model_2.pth"), b"weights").unwrap();

        let mut config = ClassifierConfig::default();
        config.model.model_dir = dir.clone();

        match ServiceContext::load(&config) {
            Err(StartupError::ArtifactMissing { path, listing }) => {
                assert_eq!(path, dir.join("model.onnx"));
                assert!(listing.contains("model_2.pth"));
            }
            other => panic!("expected ArtifactMissing, got {:?}", other.err()),
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory_reported() {
        let mut config = ClassifierConfig::default();
        config.model.model_dir = scratch_dir("absent");

        match ServiceContext::load(&config) {
            Err(StartupError::ArtifactMissing { listing, .. }) => {
                assert!(listing.contains("does not exist"));
            }
            other => panic!("expected ArtifactMissing, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_label_mismatch_is_fatal() {
        let result = ServiceContext::with_model(Uniform(1000), &ClassifierConfig::default());
        assert!(matches!(
            result,
            Err(StartupError::LabelMismatch { labels: 6, outputs: 1000 })
        ));
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let lifecycle = Lifecycle::new();
        let calls = AtomicUsize::new(0);
        let config = ClassifierConfig::default();

        let init = || {
            calls.fetch_add(1, Ordering::SeqCst);
            ServiceContext::with_model(Uniform(6), &config)
        };
        let first = lifecycle.initialize_with(init).await.unwrap();
        let second = lifecycle.initialize_with(init).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(lifecycle.is_initialized());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_load_once() {
        let lifecycle = Arc::new(Lifecycle::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    lifecycle
                        .initialize_with(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            // Slow load keeps the other callers waiting on the cell
                            std::thread::sleep(std::time::Duration::from_millis(50));
                            ServiceContext::with_model(Uniform(6), &ClassifierConfig::default())
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut contexts = Vec::new();
        for handle in handles {
            contexts.push(handle.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(contexts.iter().all(|c| Arc::ptr_eq(c, &contexts[0])));
    }

    #[tokio::test]
    async fn test_failed_initialize_can_retry() {
        let lifecycle = Lifecycle::new();
        let config = ClassifierConfig::default();

        let failed = lifecycle
            .initialize_with(|| ServiceContext::with_model(Uniform(3), &config))
            .await;
        assert!(failed.is_err());
        assert!(lifecycle.get().is_none());

        lifecycle
            .initialize_with(|| ServiceContext::with_model(Uniform(6), &config))
            .await
            .unwrap();
        assert!(lifecycle.get().is_some());
    }
}
