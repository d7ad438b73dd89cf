//! Per-tick CPU sampler
//!
//! Wraps a [`CpuSource`] and guarantees a usable reading every tick:
//! failed or short reads are replaced by a zero-filled, degraded sample.

use super::{CpuSource, SampleError};
use crate::models::{CpuTimes, HostSpec, RawSample};
use crate::thresholds::{ConfigError, PluginTuning};
use tracing::{debug, info, warn};

/// Reject host descriptions the aggregator cannot work with
pub fn validate_host(host: &HostSpec) -> Result<(), ConfigError> {
    if host.num_cores == 0 {
        return Err(ConfigError::NoCores);
    }

    if !host.rated_frequency_mhz.is_finite() || host.rated_frequency_mhz <= 0.0 {
        return Err(ConfigError::InvalidFrequency(host.rated_frequency_mhz));
    }

    Ok(())
}

/// One tick's worth of readings
#[derive(Debug, Clone)]
pub struct Sample {
    /// Tick number, starting at 1
    pub tick: u64,
    pub raw: RawSample,
    /// Secondary read, present only on cadence ticks that succeeded
    pub cpu_times: Option<Vec<CpuTimes>>,
    /// Why the primary read degraded, if it did
    pub error: Option<String>,
}

pub struct Sampler {
    source: Box<dyn CpuSource>,
    host: HostSpec,
    sample_every: u64,
    tick: u64,
}

impl Sampler {
    /// Warm up the source and read the host description.
    ///
    /// The first utilization reading after process start is meaningless on
    /// some platforms, so it is read once and discarded.
    pub fn init(mut source: Box<dyn CpuSource>, tuning: &PluginTuning) -> Result<Self, ConfigError> {
        if let Err(e) = source.per_core_percent() {
            debug!(error = %e, "Warm-up CPU read failed");
        }

        let host = source
            .host_spec()
            .map_err(ConfigError::HostInfo)?;
        validate_host(&host)?;

        if tuning.sample_every == 0 {
            return Err(ConfigError::ZeroSampleEvery);
        }

        info!(
            num_cores = host.num_cores,
            rated_frequency_mhz = host.rated_frequency_mhz,
            sample_every = tuning.sample_every,
            "CPU sampler initialized"
        );

        Ok(Self {
            source,
            host,
            sample_every: tuning.sample_every,
            tick: 0,
        })
    }

    pub fn host(&self) -> &HostSpec {
        &self.host
    }

    /// Minimum tick interval the underlying source supports
    pub fn min_interval(&self) -> std::time::Duration {
        self.source.min_interval()
    }

    /// Number of ticks sampled so far
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Take one reading. Never fails; see [`RawSample::degraded`].
    pub fn sample(&mut self) -> Sample {
        self.tick += 1;

        let (raw, error) = match self.read_primary() {
            Ok(values) => (
                RawSample {
                    utilization_per_core: values,
                    rated_frequency_mhz: self.host.rated_frequency_mhz,
                    degraded: false,
                },
                None,
            ),
            Err(e) => {
                warn!(tick = self.tick, error = %e, "CPU read failed, using zero-filled sample");
                (RawSample::zeroed(&self.host), Some(e.to_string()))
            }
        };

        let cpu_times = if self.secondary_due() {
            match self.source.cpu_times() {
                Ok(times) => Some(times),
                Err(e) => {
                    warn!(tick = self.tick, error = %e, "CPU times read failed");
                    None
                }
            }
        } else {
            None
        };

        Sample {
            tick: self.tick,
            raw,
            cpu_times,
            error,
        }
    }

    fn read_primary(&mut self) -> Result<Vec<f64>, SampleError> {
        let values = self.source.per_core_percent()?;

        if values.len() != self.host.num_cores {
            return Err(SampleError::CoreCountMismatch {
                expected: self.host.num_cores,
                actual: values.len(),
            });
        }

        Ok(values)
    }

    /// Tick 1 always reads, then every `sample_every` ticks
    fn secondary_due(&self) -> bool {
        (self.tick - 1) % self.sample_every == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted source returning queued readings
    struct ScriptedSource {
        readings: VecDeque<Result<Vec<f64>, SampleError>>,
        host: Result<HostSpec, SampleError>,
        times_calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(readings: Vec<Result<Vec<f64>, SampleError>>) -> Self {
            Self {
                readings: readings.into(),
                host: Ok(HostSpec {
                    rated_frequency_mhz: 2000.0,
                    num_cores: 2,
                }),
                times_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl CpuSource for ScriptedSource {
        fn per_core_percent(&mut self) -> Result<Vec<f64>, SampleError> {
            self.readings
                .pop_front()
                .unwrap_or_else(|| Ok(vec![10.0, 20.0]))
        }

        fn host_spec(&mut self) -> Result<HostSpec, SampleError> {
            match &self.host {
                Ok(host) => Ok(*host),
                Err(e) => Err(SampleError::Unavailable(e.to_string())),
            }
        }

        fn cpu_times(&mut self) -> Result<Vec<CpuTimes>, SampleError> {
            self.times_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![CpuTimes::default(); 2])
        }
    }

    fn unavailable() -> SampleError {
        SampleError::Unavailable("boom".to_string())
    }

    #[test]
    fn test_warm_up_reading_is_discarded() {
        let source = ScriptedSource::new(vec![Ok(vec![0.0, 0.0]), Ok(vec![40.0, 60.0])]);
        let mut sampler = Sampler::init(Box::new(source), &PluginTuning::default()).unwrap();

        let sample = sampler.sample();
        assert_eq!(sample.tick, 1);
        assert_eq!(sample.raw.utilization_per_core, vec![40.0, 60.0]);
        assert!(!sample.raw.degraded);
        assert!(sample.error.is_none());
    }

    #[test]
    fn test_warm_up_failure_is_tolerated() {
        let source = ScriptedSource::new(vec![Err(unavailable())]);
        assert!(Sampler::init(Box::new(source), &PluginTuning::default()).is_ok());
    }

    #[test]
    fn test_read_failure_zero_fills() {
        let source = ScriptedSource::new(vec![Ok(vec![0.0, 0.0]), Err(unavailable())]);
        let mut sampler = Sampler::init(Box::new(source), &PluginTuning::default()).unwrap();

        let sample = sampler.sample();
        assert_eq!(sample.raw.utilization_per_core, vec![0.0, 0.0]);
        assert!(sample.raw.degraded);
        assert!(sample.error.unwrap().contains("boom"));

        // Next tick recovers
        let sample = sampler.sample();
        assert!(!sample.raw.degraded);
    }

    #[test]
    fn test_core_count_mismatch_zero_fills() {
        let source = ScriptedSource::new(vec![Ok(vec![0.0, 0.0]), Ok(vec![10.0, 20.0, 30.0])]);
        let mut sampler = Sampler::init(Box::new(source), &PluginTuning::default()).unwrap();

        let sample = sampler.sample();
        assert!(sample.raw.degraded);
        assert_eq!(sample.raw.utilization_per_core.len(), 2);
    }

    #[test]
    fn test_zero_cores_rejected() {
        let mut source = ScriptedSource::new(vec![]);
        source.host = Ok(HostSpec {
            rated_frequency_mhz: 2000.0,
            num_cores: 0,
        });

        let result = Sampler::init(Box::new(source), &PluginTuning::default());
        assert!(matches!(result, Err(ConfigError::NoCores)));
    }

    #[test]
    fn test_non_positive_frequency_rejected() {
        for mhz in [0.0, -1.0, f64::NAN] {
            let mut source = ScriptedSource::new(vec![]);
            source.host = Ok(HostSpec {
                rated_frequency_mhz: mhz,
                num_cores: 2,
            });

            let result = Sampler::init(Box::new(source), &PluginTuning::default());
            assert!(matches!(result, Err(ConfigError::InvalidFrequency(_))));
        }
    }

    #[test]
    fn test_host_read_failure_is_config_error() {
        let mut source = ScriptedSource::new(vec![]);
        source.host = Err(unavailable());

        let result = Sampler::init(Box::new(source), &PluginTuning::default());
        let Err(err) = result else {
            panic!("host read failure should abort init");
        };
        assert!(matches!(err, ConfigError::HostInfo(SampleError::Unavailable(_))));

        let source = std::error::Error::source(&err).expect("source chain kept");
        assert!(source.to_string().contains("CPU information unavailable"));
    }

    #[test]
    fn test_secondary_read_every_tick_by_default() {
        let source = ScriptedSource::new(vec![]);
        let calls = source.times_calls.clone();
        let mut sampler = Sampler::init(Box::new(source), &PluginTuning::default()).unwrap();

        for _ in 0..3 {
            assert!(sampler.sample().cpu_times.is_some());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_secondary_read_cadence() {
        let source = ScriptedSource::new(vec![]);
        let calls = source.times_calls.clone();
        let tuning = PluginTuning {
            saturation: None,
            sample_every: 3,
        };
        let mut sampler = Sampler::init(Box::new(source), &tuning).unwrap();

        let due: Vec<bool> = (0..7).map(|_| sampler.sample().cpu_times.is_some()).collect();

        assert_eq!(due, vec![true, false, false, true, false, false, true]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sampler.ticks(), 7);
    }
}
