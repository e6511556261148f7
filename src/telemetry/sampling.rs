//! Sampling strategies
//!
//! Decisions are deterministic on the trace id so every process that sees
//! the same trace makes the same call.

use crate::context::{TraceContext, TraceId};

/// Sampling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingDecision {
    /// Record this span and mark its context sampled
    Sample,
    /// Do not record; the context still propagates with the flag cleared
    Drop,
}

impl SamplingDecision {
    pub fn is_sampled(&self) -> bool {
        matches!(self, SamplingDecision::Sample)
    }
}

/// Span sampler
#[derive(Debug, Clone, PartialEq)]
pub enum Sampler {
    /// Sample everything
    AlwaysOn,
    /// Sample nothing
    AlwaysOff,
    /// Sample a fraction of traces (0.0 to 1.0)
    TraceIdRatio(f64),
    /// Follow the parent's sampled flag; use the inner sampler for roots
    ParentBased(Box<Sampler>),
}

impl Sampler {
    /// Parent-based sampling with an always-on root sampler
    pub fn parent_based() -> Self {
        Sampler::ParentBased(Box::new(Sampler::AlwaysOn))
    }

    /// Decide whether a span in `trace_id` should be recorded
    ///
    /// # Arguments
    ///
    /// * `parent` - Valid parent context, `None` for a root span
    /// * `trace_id` - Trace the new span belongs to
    pub fn should_sample(&self, parent: Option<&TraceContext>, trace_id: TraceId) -> SamplingDecision {
        match self {
            Sampler::AlwaysOn => SamplingDecision::Sample,
            Sampler::AlwaysOff => SamplingDecision::Drop,
            Sampler::TraceIdRatio(rate) => ratio_decision(*rate, trace_id),
            Sampler::ParentBased(root) => match parent.filter(|p| p.is_valid()) {
                Some(parent) if parent.is_sampled() => SamplingDecision::Sample,
                Some(_) => SamplingDecision::Drop,
                None => root.should_sample(None, trace_id),
            },
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::parent_based()
    }
}

fn ratio_decision(rate: f64, trace_id: TraceId) -> SamplingDecision {
    if rate >= 1.0 {
        return SamplingDecision::Sample;
    }
    if rate <= 0.0 {
        return SamplingDecision::Drop;
    }

    // Low 64 bits of the trace id against the scaled threshold
    let threshold = (rate * u64::MAX as f64) as u64;
    if (trace_id.as_u128() as u64) <= threshold {
        SamplingDecision::Sample
    } else {
        SamplingDecision::Drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{SpanId, TraceFlags};

    fn parent(sampled: bool) -> TraceContext {
        TraceContext::new(
            TraceId::new(42),
            SpanId::new(7),
            TraceFlags::NOT_SAMPLED.with_sampled(sampled),
            true,
        )
    }

    #[test]
    fn test_always_and_never() {
        assert_eq!(
            Sampler::AlwaysOn.should_sample(None, TraceId::random()),
            SamplingDecision::Sample
        );
        assert_eq!(
            Sampler::AlwaysOff.should_sample(Some(&parent(true)), TraceId::random()),
            SamplingDecision::Drop
        );
    }

    #[test]
    fn test_ratio_is_deterministic_on_low_bits() {
        let sampler = Sampler::TraceIdRatio(0.5);

        let low = TraceId::new((u128::MAX << 64) | 1);
        let high = TraceId::new(u64::MAX as u128);

        assert_eq!(sampler.should_sample(None, low), SamplingDecision::Sample);
        assert_eq!(sampler.should_sample(None, high), SamplingDecision::Drop);
        assert_eq!(sampler.should_sample(None, low), sampler.should_sample(None, low));
    }

    #[test]
    fn test_ratio_matches_rate_for_random_trace_ids() {
        const SAMPLES: usize = 20_000;

        for rate in [0.1, 0.25, 0.5, 0.75] {
            let sampler = Sampler::TraceIdRatio(rate);
            let sampled = (0..SAMPLES)
                .filter(|_| sampler.should_sample(None, TraceId::random()).is_sampled())
                .count();

            let observed = sampled as f64 / SAMPLES as f64;
            assert!(
                (observed - rate).abs() < 0.03,
                "rate {} sampled {} of roots",
                rate,
                observed
            );
        }
    }

    #[test]
    fn test_ratio_bounds() {
        assert!(Sampler::TraceIdRatio(1.5)
            .should_sample(None, TraceId::new(u64::MAX as u128))
            .is_sampled());
        assert!(!Sampler::TraceIdRatio(0.0)
            .should_sample(None, TraceId::new(1))
            .is_sampled());
    }

    #[test]
    fn test_parent_based_follows_parent() {
        let sampler = Sampler::ParentBased(Box::new(Sampler::AlwaysOff));

        assert!(sampler.should_sample(Some(&parent(true)), TraceId::new(42)).is_sampled());
        assert!(!sampler.should_sample(Some(&parent(false)), TraceId::new(42)).is_sampled());
        // Roots use the inner sampler
        assert!(!sampler.should_sample(None, TraceId::new(42)).is_sampled());
    }
}
