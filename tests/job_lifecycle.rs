use std::{sync::Arc, time::Duration};

use svg2gif::{
    CaptureOpts, FrameRGBA, InMemoryEncoderFactory, JobEvent, JobId, JobOrchestrator, JobStatus,
    OrchestratorOpts, RenderConfig, RenderOverrides, SamplePhase, Svg2GifError, Svg2GifResult,
    Viewport,
    capture::{PageDocument, RasterSession, Rasterizer},
    job::JobSubscription,
};
use tokio::sync::Semaphore;

const MARKUP: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 4 2"><rect width="4" height="2"><animate attributeName="x" from="0" to="4" dur="1s"/></rect></svg>"#;

/// fps 4 over the 1 s minimum: 4 intervals, 5 samples, one hold.
const FRAMES: usize = 6;

/// Rasterizer whose captures wait for a permit and can fail or panic at a chosen capture.
#[derive(Clone)]
struct ScriptedRasterizer {
    gate: Arc<Semaphore>,
    fail_at_capture: Option<usize>,
    panic_at_capture: Option<usize>,
}

impl ScriptedRasterizer {
    fn open_gate() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            fail_at_capture: None,
            panic_at_capture: None,
        }
    }

    fn closed_gate() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            fail_at_capture: None,
            panic_at_capture: None,
        }
    }

    fn release(&self, captures: usize) {
        self.gate.add_permits(captures);
    }
}

struct ScriptedSession {
    viewport: Viewport,
    gate: Arc<Semaphore>,
    fail_at_capture: Option<usize>,
    panic_at_capture: Option<usize>,
    captures: usize,
}

impl Rasterizer for ScriptedRasterizer {
    type Session = ScriptedSession;

    async fn open(&self, viewport: Viewport) -> Svg2GifResult<ScriptedSession> {
        Ok(ScriptedSession {
            viewport,
            gate: self.gate.clone(),
            fail_at_capture: self.fail_at_capture,
            panic_at_capture: self.panic_at_capture,
            captures: 0,
        })
    }
}

impl RasterSession for ScriptedSession {
    async fn load(&mut self, _page: &PageDocument) -> Svg2GifResult<()> {
        Ok(())
    }

    async fn pause(&mut self) -> Svg2GifResult<()> {
        Ok(())
    }

    async fn seek(&mut self, _time_s: f64) -> Svg2GifResult<()> {
        Ok(())
    }

    async fn capture_bitmap(&mut self) -> Svg2GifResult<FrameRGBA> {
        self.gate
            .acquire()
            .await
            .map_err(|e| Svg2GifError::rasterizer(e.to_string()))?
            .forget();
        self.captures += 1;
        if self.fail_at_capture == Some(self.captures) {
            return Err(Svg2GifError::rasterizer("page crashed"));
        }
        if self.panic_at_capture == Some(self.captures) {
            panic!("renderer state corrupted");
        }
        let (w, h) = self.viewport.pixel_size();
        Ok(FrameRGBA {
            width: w,
            height: h,
            data: vec![255; (w * h * 4) as usize],
            premultiplied: false,
        })
    }

    async fn close(self) -> Svg2GifResult<()> {
        Ok(())
    }
}

fn base_config() -> RenderConfig {
    RenderConfig {
        fps: 4,
        width: 4,
        scale: 1.0,
        hold_s: 0.5,
        ..Default::default()
    }
}

fn opts(done_retention: Duration, error_retention: Duration) -> OrchestratorOpts {
    OrchestratorOpts {
        done_retention,
        error_retention,
        max_concurrent_jobs: 1,
        capture: CaptureOpts {
            settle: Duration::ZERO,
        },
        ..Default::default()
    }
}

fn orchestrator(
    rasterizer: ScriptedRasterizer,
    opts: OrchestratorOpts,
) -> JobOrchestrator<ScriptedRasterizer, InMemoryEncoderFactory> {
    JobOrchestrator::new(
        rasterizer,
        InMemoryEncoderFactory::new(),
        base_config(),
        opts,
    )
}

async fn drain(mut sub: JobSubscription) -> Vec<JobEvent> {
    let collect = async {
        let mut events = Vec::new();
        while let Some(event) = sub.next().await {
            events.push(event);
        }
        events
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("job did not finish in time")
}

fn progress_indices(events: &[JobEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress(p) => Some(p.current_index),
            _ => None,
        })
        .collect()
}

fn assert_not_found<T: std::fmt::Debug>(result: Svg2GifResult<T>) {
    match result {
        Err(Svg2GifError::JobNotFound(_)) => {}
        other => panic!("expected JobNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn job_runs_pending_running_done() {
    let raster = ScriptedRasterizer::closed_gate();
    let orch = orchestrator(
        raster.clone(),
        opts(Duration::from_secs(600), Duration::from_secs(60)),
    );

    let id = orch
        .submit(
            MARKUP,
            &RenderOverrides {
                output_name: Some("bounce.svg".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(orch.status(&id).unwrap().status, JobStatus::Pending);

    let mut sub = orch.subscribe(&id).unwrap();
    raster.release(1);
    let first = sub.next().await.unwrap();
    assert_eq!(
        first,
        JobEvent::Progress(svg2gif::ProgressEvent {
            current_index: 1,
            total_count: FRAMES,
            phase: SamplePhase::Sampling,
        })
    );
    assert_eq!(orch.status(&id).unwrap().status, JobStatus::Running);
    assert_not_found(orch.fetch_result(&id));

    raster.release(FRAMES);
    let rest = drain(sub).await;
    assert_eq!(progress_indices(&rest), (2..=FRAMES).collect::<Vec<_>>());
    let Some(JobEvent::Done { size }) = rest.last() else {
        panic!("expected done, got {rest:?}");
    };

    assert_eq!(orch.status(&id).unwrap().status, JobStatus::Done);
    let artifact = orch.fetch_result(&id).unwrap();
    assert_eq!(artifact.len(), *size);
    assert_eq!(artifact.filename, "bounce.gif");

    // Done is terminal: a new subscriber gets exactly the terminal event.
    let again = drain(orch.subscribe(&id).unwrap()).await;
    assert_eq!(again, vec![JobEvent::Done { size: *size }]);
}

#[tokio::test]
async fn mid_sequence_failure_marks_error_and_expires() {
    let raster = ScriptedRasterizer {
        fail_at_capture: Some(3),
        ..ScriptedRasterizer::open_gate()
    };
    let orch = orchestrator(
        raster,
        opts(Duration::from_secs(600), Duration::from_millis(100)),
    );

    let id = orch.submit(MARKUP, &RenderOverrides::default()).unwrap();
    let events = drain(orch.subscribe(&id).unwrap()).await;

    assert_eq!(progress_indices(&events), vec![1, 2]);
    let Some(JobEvent::Error { message }) = events.last() else {
        panic!("expected error, got {events:?}");
    };
    assert!(!message.is_empty());
    assert!(message.contains("page crashed"), "{message}");

    let snap = orch.status(&id).unwrap();
    assert_eq!(snap.status, JobStatus::Error);
    assert_eq!(snap.failure_reason.as_deref(), Some(message.as_str()));
    assert_not_found(orch.fetch_result(&id));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(orch.status(&id).is_none());
    assert_not_found(orch.fetch_result(&id));
    assert_not_found(orch.subscribe(&id));
}

#[tokio::test]
async fn panicking_rasterizer_fails_the_job_and_expires() {
    let raster = ScriptedRasterizer {
        panic_at_capture: Some(2),
        ..ScriptedRasterizer::open_gate()
    };
    let orch = orchestrator(
        raster,
        opts(Duration::from_secs(600), Duration::from_millis(100)),
    );

    let id = orch.submit(MARKUP, &RenderOverrides::default()).unwrap();
    let events = drain(orch.subscribe(&id).unwrap()).await;

    assert_eq!(progress_indices(&events), vec![1]);
    let Some(JobEvent::Error { message }) = events.last() else {
        panic!("expected error, got {events:?}");
    };
    assert!(message.contains("panicked"), "{message}");
    assert!(message.contains("renderer state corrupted"), "{message}");
    assert_eq!(orch.status(&id).unwrap().status, JobStatus::Error);

    // The permit is released: a following job still runs to completion.
    let next = orch.submit(MARKUP, &RenderOverrides::default()).unwrap();
    let tail = drain(orch.subscribe(&next).unwrap()).await;
    assert_eq!(progress_indices(&tail), vec![1]);
    assert!(matches!(tail.last(), Some(JobEvent::Error { .. })));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(orch.status(&id).is_none());
    assert_not_found(orch.subscribe(&id));
}

#[tokio::test]
async fn runaway_duration_ends_in_error() {
    let orch = orchestrator(
        ScriptedRasterizer::open_gate(),
        opts(Duration::from_secs(600), Duration::from_secs(60)),
    );
    let markup = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 4 2"><rect><animate attributeName="x" dur="1e300s"/></rect></svg>"#;

    let id = orch.submit(markup, &RenderOverrides::default()).unwrap();
    let events = drain(orch.subscribe(&id).unwrap()).await;

    assert!(progress_indices(&events).is_empty());
    let Some(JobEvent::Error { message }) = events.last() else {
        panic!("expected error, got {events:?}");
    };
    assert!(message.contains("limit is 60000"), "{message}");
    assert_eq!(orch.status(&id).unwrap().status, JobStatus::Error);
}

#[tokio::test]
async fn concurrent_subscribers_see_the_same_stream() {
    let raster = ScriptedRasterizer::closed_gate();
    let orch = orchestrator(
        raster.clone(),
        opts(Duration::from_secs(600), Duration::from_secs(60)),
    );
    let id = orch.submit(MARKUP, &RenderOverrides::default()).unwrap();

    let a = orch.subscribe(&id).unwrap();
    let b = orch.subscribe(&id).unwrap();
    let dropped = orch.subscribe(&id).unwrap();
    drop(dropped);

    raster.release(FRAMES);
    let (a, b) = tokio::join!(drain(a), drain(b));

    assert_eq!(a, b);
    assert_eq!(progress_indices(&a), (1..=FRAMES).collect::<Vec<_>>());
    assert!(matches!(a.last(), Some(JobEvent::Done { .. })));
    assert_eq!(orch.status(&id).unwrap().status, JobStatus::Done);
}

#[tokio::test]
async fn fetch_result_not_found_is_uniform() {
    let raster = ScriptedRasterizer::closed_gate();
    let orch = orchestrator(
        raster.clone(),
        opts(Duration::from_millis(100), Duration::from_secs(60)),
    );

    assert_not_found(orch.fetch_result(&JobId::from("0123456789abcdef")));

    let id = orch.submit(MARKUP, &RenderOverrides::default()).unwrap();
    let mut sub = orch.subscribe(&id).unwrap();
    raster.release(1);
    assert!(sub.next().await.is_some());
    assert_not_found(orch.fetch_result(&id));

    raster.release(FRAMES);
    drain(sub).await;
    assert!(orch.fetch_result(&id).is_ok());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_not_found(orch.fetch_result(&id));

    let messages: Vec<String> = [JobId::from("never-issued"), id]
        .iter()
        .map(|id| orch.fetch_result(id).unwrap_err().to_string())
        .map(|m| m.split(':').next().unwrap_or_default().to_owned())
        .collect();
    assert_eq!(messages[0], messages[1]);
}

#[tokio::test]
async fn jobs_beyond_the_cap_wait_in_pending() {
    let raster = ScriptedRasterizer::closed_gate();
    let orch = orchestrator(
        raster.clone(),
        opts(Duration::from_secs(600), Duration::from_secs(60)),
    );

    let first = orch.submit(MARKUP, &RenderOverrides::default()).unwrap();
    let second = orch.submit(MARKUP, &RenderOverrides::default()).unwrap();
    let mut first_events = orch.subscribe(&first).unwrap();

    raster.release(1);
    assert!(first_events.next().await.is_some());
    assert_eq!(orch.status(&first).unwrap().status, JobStatus::Running);
    assert_eq!(orch.status(&second).unwrap().status, JobStatus::Pending);

    raster.release(2 * FRAMES);
    let second_events = orch.subscribe(&second).unwrap();
    drain(first_events).await;
    let tail = drain(second_events).await;
    assert!(matches!(tail.last(), Some(JobEvent::Done { .. })));
    assert_eq!(orch.registry().len(), 2);
}
