//! Multi-resolution cascade: a chain of [`WindowResampler`] stages over increasing widths.
//!
//! Stage `k` consumes the output of stage `k - 1`. Since every width divides the next
//! one, each coarse window is an exact union of finer windows and the cascade is
//! equivalent to resampling the raw input at the coarse width directly (for the
//! coalesced values; `numobs` counts the rows of the stage's own input).
//!
//! Each stage re-checks that its input is sorted. Stage outputs are sorted by
//! construction, so this costs one comparison per row and turns a broken upstream
//! ordering into an error instead of silently wrong buckets.
use arrow_array::RecordBatch;
use tracing::debug;

use crate::{
    ais_errors::AisError,
    resampling::{window_resampler::WindowResampler, ResampleSpec},
    time::Resolution,
};

#[derive(Debug, Clone)]
pub struct Cascade {
    stages: Vec<WindowResampler>,
}

impl Cascade {
    /// Validate the widths and build one stage per width.
    ///
    /// Return
    /// ----------
    /// * [`AisError::InvalidCascade`] when `resolutions` is empty, not strictly
    ///   increasing, or when a width does not divide the next one.
    pub fn new(resolutions: &[Resolution], spec: ResampleSpec) -> Result<Self, AisError> {
        if resolutions.is_empty() {
            return Err(AisError::InvalidCascade("no resolution given".into()));
        }
        for pair in resolutions.windows(2) {
            let (fine, coarse) = (pair[0], pair[1]);
            if fine >= coarse {
                return Err(AisError::InvalidCascade(format!(
                    "{fine} is not finer than {coarse}"
                )));
            }
            if !fine.divides(&coarse) {
                return Err(AisError::InvalidCascade(format!(
                    "{fine} does not divide {coarse}"
                )));
            }
        }

        Ok(Cascade {
            stages: resolutions
                .iter()
                .map(|&r| WindowResampler::new(spec.clone(), r))
                .collect(),
        })
    }

    pub fn resolutions(&self) -> Vec<Resolution> {
        self.stages.iter().map(|s| s.width()).collect()
    }

    /// Run every stage on `input`, handing each output to `sink` as soon as it exists.
    ///
    /// Return
    /// ----------
    /// * The output of the coarsest stage.
    pub fn run<F>(&self, input: &RecordBatch, sink: F) -> Result<RecordBatch, AisError>
    where
        F: FnMut(Resolution, &RecordBatch) -> Result<(), AisError>,
    {
        self.run_stages(input.clone(), &self.stages, sink)
    }

    /// Like [`Cascade::run`], with `base` already being the output of the first stage.
    ///
    /// `base` is sunk unchanged under the first resolution, then the remaining stages
    /// run on it.
    pub fn run_from_base<F>(
        &self,
        base: &RecordBatch,
        mut sink: F,
    ) -> Result<RecordBatch, AisError>
    where
        F: FnMut(Resolution, &RecordBatch) -> Result<(), AisError>,
    {
        let first = &self.stages[0];
        sink(first.width(), base)?;
        self.run_stages(base.clone(), &self.stages[1..], sink)
    }

    fn run_stages<F>(
        &self,
        mut current: RecordBatch,
        stages: &[WindowResampler],
        mut sink: F,
    ) -> Result<RecordBatch, AisError>
    where
        F: FnMut(Resolution, &RecordBatch) -> Result<(), AisError>,
    {
        for stage in stages {
            let next = stage.resample(&current)?;
            debug!(
                resolution = %stage.width(),
                rows_in = current.num_rows(),
                rows_out = next.num_rows(),
                "cascade stage done"
            );
            sink(stage.width(), &next)?;
            current = next;
        }
        Ok(current)
    }
}
