//! Text feature plugins for Sluice workflows.

mod merge_asr;

pub use merge_asr::{MergeAsrConfig, MergeAsrPlugin, merge_asr_output};
