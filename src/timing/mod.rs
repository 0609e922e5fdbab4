//! Timing Analyzer: animation duration and aspect ratio from SVG markup.

pub mod analyze;
pub mod markup;
