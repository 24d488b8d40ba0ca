use fail::FailScenario;

/// Configures failpoints for one test and turns them off again when dropped.
///
/// Holding the guard also holds the global [`FailScenario`] lock, so failpoint tests of the same
/// binary run one after the other.
pub struct FailpointGuard<'a> {
    _scenario: FailScenario<'a>,
    configured: Vec<String>,
}

impl<'a> FailpointGuard<'a> {
    pub fn setup() -> FailpointGuard<'a> {
        Self {
            _scenario: FailScenario::setup(),
            configured: Vec::new(),
        }
    }

    /// Arms `failpoint` with a `fail` action such as `return` or `1*return->off`.
    pub fn arm(&mut self, failpoint: &str, action: &str) {
        fail::cfg(failpoint, action).expect("failpoint action is valid");
        self.configured.push(failpoint.to_owned());
    }

    /// Turns `failpoint` off, simulating a process that restarts without the fault.
    pub fn disarm(&mut self, failpoint: &str) {
        fail::remove(failpoint);
        self.configured.retain(|configured| configured != failpoint);
    }
}

impl Drop for FailpointGuard<'_> {
    fn drop(&mut self) {
        for failpoint in &self.configured {
            fail::remove(failpoint);
        }
    }
}
