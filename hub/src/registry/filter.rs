//! Registration filters for `ExecutorRegistry::find`

use crate::executor::{ExecutorRole, ExecutorStatus};

use super::Registration;

/// Arbitrary combination of registration criteria; the default matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutorFilter {
    /// Role, compared in normalized form
    pub role: Option<ExecutorRole>,

    pub status: Option<ExecutorStatus>,

    /// Matches when the registration has at least one of these
    pub specializations: Vec<String>,

    pub min_success_rate: Option<f64>,

    pub max_load: Option<f64>,

    /// Matches when the registration declares all of these
    pub tools: Vec<String>,
}

impl ExecutorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: impl Into<ExecutorRole>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn status(mut self, status: ExecutorStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn specializations<I, S>(mut self, specializations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specializations = specializations.into_iter().map(Into::into).collect();
        self
    }

    pub fn min_success_rate(mut self, rate: f64) -> Self {
        self.min_success_rate = Some(rate);
        self
    }

    pub fn max_load(mut self, load: f64) -> Self {
        self.max_load = Some(load);
        self
    }

    pub fn tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Check a registration against every set criterion
    pub fn matches(&self, registration: &Registration) -> bool {
        if let Some(role) = &self.role {
            if role.normalized() != registration.descriptor.role.normalized() {
                return false;
            }
        }

        if let Some(status) = self.status {
            if registration.status != status {
                return false;
            }
        }

        if !self.specializations.is_empty()
            && !registration.capabilities.has_any_specialization(&self.specializations)
        {
            return false;
        }

        if let Some(min) = self.min_success_rate {
            if registration.success_rate < min {
                return false;
            }
        }

        if let Some(max) = self.max_load {
            if registration.current_load > max {
                return false;
            }
        }

        self.tools
            .iter()
            .all(|tool| registration.capabilities.has_tool(tool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorDescriptor;

    fn registration(role: &str, tools: &[&str]) -> Registration {
        let descriptor = ExecutorDescriptor::new("E1", "worker", role)
            .with_tools(tools.iter().copied())
            .with_specializations(["rust"]);
        Registration::new(descriptor, 0, std::time::Duration::from_secs(30), 1)
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(ExecutorFilter::new().matches(&registration("BackendDev", &[])));
    }

    #[test]
    fn test_role_match_is_normalized() {
        let reg = registration("BackendDev", &[]);
        assert!(ExecutorFilter::new().role("backend-dev").matches(&reg));
        assert!(!ExecutorFilter::new().role("FrontendDev").matches(&reg));
    }

    #[test]
    fn test_tools_require_all() {
        let reg = registration("BackendDev", &["git", "cargo"]);
        assert!(ExecutorFilter::new().tools(["git"]).matches(&reg));
        assert!(!ExecutorFilter::new().tools(["git", "docker"]).matches(&reg));
    }

    #[test]
    fn test_specializations_require_any() {
        let reg = registration("BackendDev", &[]);
        assert!(ExecutorFilter::new().specializations(["go", "RUST"]).matches(&reg));
        assert!(!ExecutorFilter::new().specializations(["go"]).matches(&reg));
    }

    #[test]
    fn test_numeric_bounds() {
        let mut reg = registration("BackendDev", &[]);
        reg.success_rate = 70.0;
        reg.current_load = 40.0;

        assert!(ExecutorFilter::new().min_success_rate(70.0).max_load(40.0).matches(&reg));
        assert!(!ExecutorFilter::new().min_success_rate(75.0).matches(&reg));
        assert!(!ExecutorFilter::new().max_load(39.0).matches(&reg));
        assert!(!ExecutorFilter::new().status(ExecutorStatus::Busy).matches(&reg));
    }
}
