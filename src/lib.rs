#![forbid(unsafe_code)]
//! Render SMIL-animated SVG documents into looping animated GIFs.
//!
//! The conversion chain is timing analysis ([`timing`]), frame planning ([`plan`]), frame capture
//! through a [`capture::Rasterizer`] and encoding through an [`encode::EncoderFactory`].
//! [`pipeline::generate`] runs it once; [`job::JobOrchestrator`] runs it in the background with
//! live progress for any number of observers.

pub mod capture;
pub mod encode;
pub mod foundation;
pub mod job;
pub mod pipeline;
pub mod plan;
pub mod timing;

pub use capture::{CaptureOpts, FrameRGBA, ResvgRasterizer, Viewport};
pub use encode::{GifEncoderFactory, InMemoryEncoderFactory};
pub use foundation::{
    color::{Rgba8, parse_color},
    config::{RenderConfig, RenderOverrides, artifact_filename},
    error::{Svg2GifError, Svg2GifResult},
};
pub use job::{Artifact, JobEvent, JobId, JobOrchestrator, JobStatus, OrchestratorOpts};
pub use pipeline::{ProgressEvent, generate};
pub use plan::{FramePlan, FrameSample, SamplePhase};
pub use timing::analyze::{AnimationSpec, analyze};
