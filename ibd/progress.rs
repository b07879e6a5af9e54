use crate::identity::ModelKind;

/// Observer for reporting incremental progress while a chain runs.
pub trait SamplingProgress {
    fn on_start(&mut self, model: ModelKind, total_iterations: usize) {
        let _ = (model, total_iterations);
    }
    fn on_advance(&mut self, completed_iterations: usize) {
        let _ = completed_iterations;
    }
    fn on_finish(&mut self, model: ModelKind) {
        let _ = model;
    }
}

#[derive(Default)]
pub struct NoopSamplingProgress;

impl SamplingProgress for NoopSamplingProgress {}
