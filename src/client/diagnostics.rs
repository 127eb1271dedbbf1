use std::fmt::Debug;

/// Sink for client-sync telemetry (replay depth, coalesced inputs,
/// correction classes). Injected at construction so tests and tooling can
/// observe component behavior without a process-wide registry.
pub trait Diagnostics: Send + Sync + Debug {
    fn record(&self, _name: &'static str, _value: f64) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl Diagnostics for NoopDiagnostics {}

#[cfg(test)]
pub(crate) mod testing {
    use super::Diagnostics;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct RecordingDiagnostics {
        events: Mutex<HashMap<&'static str, Vec<f64>>>,
    }

    impl RecordingDiagnostics {
        pub fn values(&self, name: &'static str) -> Vec<f64> {
            self.events
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .unwrap_or_default()
        }
    }

    impl Diagnostics for RecordingDiagnostics {
        fn record(&self, name: &'static str, value: f64) {
            self.events.lock().unwrap().entry(name).or_default().push(value);
        }
    }
}
