//! Turns a total request count and a weighted mixture into the list of request types to run.
use std::iter;
use tracing::debug;
use volley_core::{RequestKind, TestMix};

/// Each entry gets `floor(total * ratio)` copies; any shortfall is filled with the fill kind.
/// Ratios summing past 1 overshoot `total` rather than being truncated.
#[derive(Debug, Clone)]
pub struct TrafficPlanner<K> {
    mix: Vec<(K, f64)>,
    fill: K,
}

impl TrafficPlanner<RequestKind> {
    pub fn from_mix(mix: &TestMix) -> Self {
        Self::new(mix.weights().to_vec(), RequestKind::DEFAULT)
    }
}

impl<K: Copy> TrafficPlanner<K> {
    pub fn new(mix: Vec<(K, f64)>, fill: K) -> Self {
        Self { mix, fill }
    }

    pub fn plan(&self, total: usize) -> Vec<K> {
        let mut plan = Vec::with_capacity(total);
        for &(kind, ratio) in &self.mix {
            let count = (total as f64 * ratio.max(0.)).floor() as usize;
            plan.extend(iter::repeat(kind).take(count));
        }

        let shortfall = total.saturating_sub(plan.len());
        if shortfall > 0 {
            debug!("Filling {shortfall} planned requests with the default kind");
            plan.extend(iter::repeat(self.fill).take(shortfall));
        }
        plan
    }
}
