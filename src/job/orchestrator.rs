use std::{sync::Arc, time::Duration};

use tokio::{sync::Semaphore, task::JoinError};
use tracing::{Instrument as _, debug, info, warn};

use crate::{
    capture::{CaptureOpts, Rasterizer},
    encode::EncoderFactory,
    foundation::{
        config::{RenderConfig, RenderOverrides, artifact_filename},
        error::{Svg2GifError, Svg2GifResult},
    },
    job::{Artifact, JobId, JobRegistry, JobSnapshot, JobSubscription},
    pipeline,
};

#[derive(Clone, Debug)]
pub struct OrchestratorOpts {
    /// How long a `done` job's artifact stays retrievable.
    pub done_retention: Duration,
    /// How long an `error` job stays observable.
    pub error_retention: Duration,
    /// Jobs beyond this many wait in `pending`.
    pub max_concurrent_jobs: usize,
    pub max_markup_bytes: usize,
    /// Per-job broadcast buffer. Slower subscribers skip progress events.
    pub event_capacity: usize,
    pub capture: CaptureOpts,
}

impl Default for OrchestratorOpts {
    fn default() -> Self {
        Self {
            done_retention: Duration::from_secs(600),
            error_retention: Duration::from_secs(60),
            max_concurrent_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_markup_bytes: 10 * 1024 * 1024,
            event_capacity: 256,
            capture: CaptureOpts::default(),
        }
    }
}

/// Runs conversions in the background and tracks them in a shared [`JobRegistry`].
pub struct JobOrchestrator<R, E> {
    registry: Arc<JobRegistry>,
    rasterizer: Arc<R>,
    encoders: Arc<E>,
    base: RenderConfig,
    opts: OrchestratorOpts,
    permits: Arc<Semaphore>,
}

impl<R: Rasterizer, E: EncoderFactory> JobOrchestrator<R, E> {
    pub fn new(rasterizer: R, encoders: E, base: RenderConfig, opts: OrchestratorOpts) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new(opts.event_capacity)),
            rasterizer: Arc::new(rasterizer),
            encoders: Arc::new(encoders),
            base,
            permits: Arc::new(Semaphore::new(opts.max_concurrent_jobs.max(1))),
            opts,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn base_config(&self) -> &RenderConfig {
        &self.base
    }

    /// Validate input, create a `pending` job and start it in the background.
    ///
    /// Must be called from within a Tokio runtime. Input problems are returned here and never
    /// create a job; everything that goes wrong later is reported through the job itself.
    pub fn submit(
        &self,
        markup: impl Into<String>,
        overrides: &RenderOverrides,
    ) -> Svg2GifResult<JobId> {
        let markup = markup.into();
        self.check_markup(&markup)?;
        let cfg = overrides.apply(&self.base);
        cfg.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Svg2GifError::Other(anyhow::anyhow!("job submission needs a Tokio runtime: {e}"))
        })?;

        let display_name = artifact_filename(overrides.output_name.as_deref());
        let id = self.registry.insert(display_name.clone());
        info!(job = %id, name = %display_name, "job submitted");

        runtime.spawn(run_job(
            JobContext {
                registry: self.registry.clone(),
                rasterizer: self.rasterizer.clone(),
                encoders: self.encoders.clone(),
                permits: self.permits.clone(),
                opts: self.opts.clone(),
            },
            id.clone(),
            markup,
            cfg,
        ));
        Ok(id)
    }

    pub fn subscribe(&self, id: &JobId) -> Svg2GifResult<JobSubscription> {
        self.registry.subscribe(id)
    }

    pub fn fetch_result(&self, id: &JobId) -> Svg2GifResult<Artifact> {
        self.registry.fetch_result(id)
    }

    pub fn status(&self, id: &JobId) -> Option<JobSnapshot> {
        self.registry.status(id)
    }

    fn check_markup(&self, markup: &str) -> Svg2GifResult<()> {
        if markup.trim().is_empty() {
            return Err(Svg2GifError::invalid_input("no SVG markup provided"));
        }
        if markup.len() > self.opts.max_markup_bytes {
            return Err(Svg2GifError::invalid_input(format!(
                "markup is {} bytes, limit is {}",
                markup.len(),
                self.opts.max_markup_bytes
            )));
        }
        if !markup.contains("<svg") {
            return Err(Svg2GifError::invalid_input(
                "markup does not contain an <svg> element",
            ));
        }
        Ok(())
    }
}

struct JobContext<R, E> {
    registry: Arc<JobRegistry>,
    rasterizer: Arc<R>,
    encoders: Arc<E>,
    permits: Arc<Semaphore>,
    opts: OrchestratorOpts,
}

#[tracing::instrument(name = "job", skip_all, fields(job = %id))]
async fn run_job<R: Rasterizer, E: EncoderFactory>(
    ctx: JobContext<R, E>,
    id: JobId,
    markup: String,
    cfg: RenderConfig,
) {
    let JobContext {
        registry,
        rasterizer,
        encoders,
        permits,
        opts,
    } = ctx;
    let Ok(permit) = permits.acquire_owned().await else {
        registry.fail(&id, "job scheduler is shut down".to_owned());
        return;
    };
    if !registry.mark_running(&id) {
        return;
    }
    info!("job running");

    let progress = registry.clone();
    let progress_id = id.clone();
    let capture = opts.capture.clone();
    // A panicking collaborator ends this task with a JoinError; the job still reaches `error`.
    let pipeline = tokio::spawn(
        async move {
            pipeline::generate(
                &markup,
                &cfg,
                &*rasterizer,
                encoders,
                &capture,
                move |event| progress.publish_progress(&progress_id, event),
            )
            .await
        }
        .in_current_span(),
    );
    let result = pipeline.await.unwrap_or_else(|e| Err(pipeline_aborted(e)));
    drop(permit);

    let retention = match result {
        Ok(bytes) => {
            info!(bytes = bytes.len(), "job done");
            registry.complete(&id, bytes);
            opts.done_retention
        }
        Err(e) => {
            let reason = e.to_string();
            warn!(error = %reason, "job failed");
            registry.fail(&id, reason);
            opts.error_retention
        }
    };

    tokio::time::sleep(retention).await;
    if registry.remove(&id) {
        debug!("job record expired");
    }
}

/// A pipeline task that panicked or was cancelled, as a job failure.
fn pipeline_aborted(err: JoinError) -> Svg2GifError {
    if !err.is_panic() {
        return Svg2GifError::Other(anyhow::anyhow!("conversion was cancelled"));
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    Svg2GifError::Other(match detail {
        Some(msg) => anyhow::anyhow!("conversion panicked: {msg}"),
        None => anyhow::anyhow!("conversion panicked"),
    })
}
