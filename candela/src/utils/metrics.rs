#[cfg(feature = "metrics")]
use std::time::{Duration, Instant};

/// Wall-clock timings of a frame's stages; compiles down to nothing unless
/// the `metrics` feature is enabled.
#[derive(Debug, Default)]
pub struct Metrics {
    #[cfg(feature = "metrics")]
    stages: Vec<(&'static str, Duration)>,
}

impl Metrics {
    pub fn measure<T>(&mut self, stage: &'static str, f: impl FnOnce() -> T) -> T {
        #[cfg(feature = "metrics")]
        {
            let tt = Instant::now();
            let result = f();

            self.stages.push((stage, tt.elapsed()));

            result
        }

        #[cfg(not(feature = "metrics"))]
        {
            _ = stage;

            f()
        }
    }

    /// Logs timings gathered so far and starts over.
    pub fn flush(&mut self, frame: u32) {
        #[cfg(feature = "metrics")]
        {
            let total: Duration = self.stages.iter().map(|(_, tt)| *tt).sum();

            log::debug!(
                "Frame {frame} took {}",
                humantime::format_duration(total)
            );

            for (stage, tt) in self.stages.drain(..) {
                log::debug!("- {stage}: {}", humantime::format_duration(tt));
            }
        }

        #[cfg(not(feature = "metrics"))]
        {
            _ = frame;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure() {
        let mut metrics = Metrics::default();

        assert_eq!(4, metrics.measure("stage", || 2 + 2));

        metrics.flush(1);
    }
}
