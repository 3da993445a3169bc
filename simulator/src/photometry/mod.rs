//! Photometric models: templates, k-corrections, extinction and the
//! observed-frame light-curve transform.

pub mod extinction;
pub mod lightcurve;
pub mod template;

pub use lightcurve::{
    FilterCurve, LightCurvePipeline, ObservedLightCurve, UndetectableReason,
};
pub use template::{KCorrectionTable, TemplateError, TemplateLibrary, TransientTemplate};
