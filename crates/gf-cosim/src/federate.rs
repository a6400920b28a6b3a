//! The broker-facing capability seam.

use std::collections::BTreeMap;

use crate::value::FedValue;
use crate::{CosimError, CosimResult};

/// Outcome flag of an iterative time request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationResult {
    /// The broker moved on; no further iteration at the current time.
    NextStep,
    /// The broker expects another iteration at the current time.
    Iterating,
}

/// A named participant in a co-simulation.
///
/// `request_time` blocks until the broker grants; liveness is the broker's
/// responsibility, not enforced locally.
pub trait Federate {
    fn publish(&mut self, key: &str, value: FedValue) -> CosimResult<()>;

    /// Latest value on a subscription, `None` when nothing has been
    /// published yet.
    fn read(&mut self, key: &str) -> CosimResult<Option<FedValue>>;

    fn subscription_keys(&self) -> Vec<String>;

    /// Blocking time request; returns the granted time.
    fn request_time(&mut self, target_seconds: f64) -> CosimResult<f64>;

    /// Iterative time request; the granted time does not advance while the
    /// broker still signals [`IterationResult::Iterating`].
    fn request_time_iterative(
        &mut self,
        target_seconds: f64,
    ) -> CosimResult<(f64, IterationResult)>;

    fn finalize(&mut self) -> CosimResult<()>;
}

/// In-memory federate with no broker behind it.
///
/// Grants every non-iterative request immediately, loops published values
/// back to same-named subscriptions, and lets tests script subscription
/// values and the number of iterations the "broker" demands per time grant.
#[derive(Debug, Default)]
pub struct LoopbackFederate {
    granted: f64,
    values: BTreeMap<String, FedValue>,
    /// Scripted per-key value queues consumed one entry per read.
    scripts: BTreeMap<String, Vec<FedValue>>,
    iterations_per_grant: usize,
    iterations_left: usize,
    time_requests: usize,
    iterative_requests: usize,
    finalized: bool,
}

impl LoopbackFederate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Demand `n` iterations at each requested time before granting it.
    pub fn with_iterations_per_grant(mut self, n: usize) -> Self {
        self.iterations_per_grant = n;
        self.iterations_left = n;
        self
    }

    /// Queue values returned by successive `read` calls for `key`; after the
    /// queue drains, reads fall back to the latest published value.
    pub fn script_subscription(&mut self, key: &str, values: Vec<FedValue>) {
        let mut values = values;
        values.reverse();
        self.scripts.insert(key.to_string(), values);
    }

    pub fn time_requests(&self) -> usize {
        self.time_requests
    }

    pub fn iterative_requests(&self) -> usize {
        self.iterative_requests
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl Federate for LoopbackFederate {
    fn publish(&mut self, key: &str, value: FedValue) -> CosimResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn read(&mut self, key: &str) -> CosimResult<Option<FedValue>> {
        if let Some(queue) = self.scripts.get_mut(key) {
            if let Some(v) = queue.pop() {
                self.values.insert(key.to_string(), v.clone());
                return Ok(Some(v));
            }
        }
        Ok(self.values.get(key).cloned())
    }

    fn subscription_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .keys()
            .chain(self.scripts.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    fn request_time(&mut self, target_seconds: f64) -> CosimResult<f64> {
        self.time_requests += 1;
        self.granted = self.granted.max(target_seconds);
        self.iterations_left = self.iterations_per_grant;
        Ok(self.granted)
    }

    fn request_time_iterative(
        &mut self,
        target_seconds: f64,
    ) -> CosimResult<(f64, IterationResult)> {
        self.iterative_requests += 1;
        if self.iterations_left > 0 {
            self.iterations_left -= 1;
            return Ok((self.granted, IterationResult::Iterating));
        }
        self.granted = self.granted.max(target_seconds);
        self.iterations_left = self.iterations_per_grant;
        Ok((self.granted, IterationResult::NextStep))
    }

    fn finalize(&mut self) -> CosimResult<()> {
        if self.finalized {
            return Err(CosimError::Federate {
                message: "federate already finalized".to_string(),
            });
        }
        self.finalized = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_grants_immediately() {
        let mut f = LoopbackFederate::new();
        assert_eq!(f.request_time(30.0).unwrap(), 30.0);
        // Granted time never regresses.
        assert_eq!(f.request_time(15.0).unwrap(), 30.0);
    }

    #[test]
    fn published_values_loop_back() {
        let mut f = LoopbackFederate::new();
        f.publish("gf/bus1.voltage", FedValue::Double(1.02)).unwrap();
        assert_eq!(
            f.read("gf/bus1.voltage").unwrap(),
            Some(FedValue::Double(1.02))
        );
    }

    #[test]
    fn scripted_subscription_drains_then_holds() {
        let mut f = LoopbackFederate::new();
        f.script_subscription(
            "ext/load",
            vec![FedValue::Double(10.0), FedValue::Double(20.0)],
        );
        assert_eq!(f.read("ext/load").unwrap(), Some(FedValue::Double(10.0)));
        assert_eq!(f.read("ext/load").unwrap(), Some(FedValue::Double(20.0)));
        // Queue drained; last value sticks.
        assert_eq!(f.read("ext/load").unwrap(), Some(FedValue::Double(20.0)));
    }

    #[test]
    fn iterative_grant_after_demanded_iterations() {
        let mut f = LoopbackFederate::new().with_iterations_per_grant(2);
        let (t, r) = f.request_time_iterative(5.0).unwrap();
        assert_eq!((t, r), (0.0, IterationResult::Iterating));
        let (t, r) = f.request_time_iterative(5.0).unwrap();
        assert_eq!((t, r), (0.0, IterationResult::Iterating));
        let (t, r) = f.request_time_iterative(5.0).unwrap();
        assert_eq!((t, r), (5.0, IterationResult::NextStep));
    }
}
