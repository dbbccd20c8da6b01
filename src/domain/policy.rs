//! Control policy
//!
//! A `Policy` is built once through `PolicyBuilder`, validated there, and
//! read-only afterwards. Each control domain is an optional, strongly typed
//! setting; `None` means the domain is inactive.

use crate::domain::{DeviceSelector, FanCurve, PowerLimit, Temperature};
use crate::error::{DomainError, FaultKind};
use std::time::Duration;

/// Default seconds between control ticks
pub const DEFAULT_LOOP_INTERVAL_SECS: f64 = 1.0;
/// Default seconds to wait before reopening a failed session
pub const DEFAULT_RETRY_INTERVAL_SECS: f64 = 2.0;

/// When and how the supervisor restarts after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Restart at all
    pub enabled: bool,
    /// Wait between closing the failed session and opening a new one
    pub interval: Duration,
    /// Treat permission errors as retryable
    ///
    /// A permission error rarely resolves on its own, but it cannot be told
    /// apart from a driver holding a transient lock.
    pub retry_permission_denied: bool,
    /// Give up after this many restarts; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Whether a failure of `fault` kind may be retried after `restarts` restarts
    pub fn allows(&self, fault: Option<FaultKind>, restarts: u32) -> bool {
        if !self.enabled {
            return false;
        }
        if self.max_attempts.is_some_and(|max| restarts >= max) {
            return false;
        }
        match fault {
            None | Some(FaultKind::DeviceNotFound) => false,
            Some(FaultKind::PermissionDenied) => self.retry_permission_denied,
            Some(FaultKind::Unsupported) | Some(FaultKind::Transient) => true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs_f64(DEFAULT_RETRY_INTERVAL_SECS),
            retry_permission_denied: true,
            max_attempts: None,
        }
    }
}

/// Validated, immutable control policy for one GPU
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    device: DeviceSelector,
    fan: Option<FanCurve>,
    power: Option<PowerLimit>,
    thermal: Option<Temperature>,
    loop_interval: Duration,
    retry: RetryPolicy,
    dry_run: bool,
    single_use: bool,
}

impl Policy {
    /// Start building a policy for `device`
    pub fn builder(device: DeviceSelector) -> PolicyBuilder {
        PolicyBuilder::new(device)
    }

    pub fn device(&self) -> &DeviceSelector {
        &self.device
    }

    /// Fan curve, when the fan domain is active
    pub fn fan(&self) -> Option<&FanCurve> {
        self.fan.as_ref()
    }

    /// Target power limit, when the power domain is active
    pub fn power(&self) -> Option<PowerLimit> {
        self.power
    }

    /// Target acoustic threshold, when the temperature domain is active
    pub fn thermal(&self) -> Option<Temperature> {
        self.thermal
    }

    pub fn loop_interval(&self) -> Duration {
        self.loop_interval
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn is_single_use(&self) -> bool {
        self.single_use
    }

    /// Same policy aimed at a different GPU
    pub fn for_device(&self, device: DeviceSelector) -> Self {
        Self {
            device,
            ..self.clone()
        }
    }
}

/// Builder for `Policy`
///
/// Zero power or acoustic targets leave the domain inactive, matching how
/// the command line treats an unset value.
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    device: DeviceSelector,
    fan: Option<FanCurve>,
    power_watts: u32,
    acoustic_celsius: i32,
    loop_interval_secs: f64,
    retry_interval_secs: f64,
    retry: RetryPolicy,
    dry_run: bool,
    single_use: bool,
}

impl PolicyBuilder {
    /// Create a builder with default cadence and retry enabled
    pub fn new(device: DeviceSelector) -> Self {
        Self {
            device,
            fan: None,
            power_watts: 0,
            acoustic_celsius: 0,
            loop_interval_secs: DEFAULT_LOOP_INTERVAL_SECS,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            retry: RetryPolicy::default(),
            dry_run: false,
            single_use: false,
        }
    }

    /// Activate the fan domain
    pub fn fan_curve(mut self, curve: FanCurve) -> Self {
        self.fan = Some(curve);
        self
    }

    /// Activate the power domain (0 leaves it inactive)
    pub fn power_limit_watts(mut self, watts: u32) -> Self {
        self.power_watts = watts;
        self
    }

    /// Activate the temperature domain (0 leaves it inactive)
    pub fn acoustic_limit_celsius(mut self, celsius: i32) -> Self {
        self.acoustic_celsius = celsius;
        self
    }

    pub fn loop_interval_secs(mut self, secs: f64) -> Self {
        self.loop_interval_secs = secs;
        self
    }

    pub fn retry_interval_secs(mut self, secs: f64) -> Self {
        self.retry_interval_secs = secs;
        self
    }

    pub fn retry(mut self, enabled: bool) -> Self {
        self.retry.enabled = enabled;
        self
    }

    pub fn retry_permission_denied(mut self, retry: bool) -> Self {
        self.retry.retry_permission_denied = retry;
        self
    }

    pub fn max_attempts(mut self, max: Option<u32>) -> Self {
        self.retry.max_attempts = max;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn single_use(mut self, single_use: bool) -> Self {
        self.single_use = single_use;
        self
    }

    /// Validate and build the policy
    ///
    /// # Errors
    /// - `DomainError::InvalidInterval` for negative or non-finite intervals
    /// - `DomainError::InvalidTemperature` for a negative acoustic target
    /// - `DomainError::NoActiveDomain` if no domain is active
    pub fn build(self) -> Result<Policy, DomainError> {
        let loop_interval = seconds("loop", self.loop_interval_secs)?;
        let retry_interval = seconds("retry", self.retry_interval_secs)?;

        if self.acoustic_celsius < 0 {
            return Err(DomainError::InvalidTemperature(self.acoustic_celsius));
        }

        let power = (self.power_watts > 0).then(|| PowerLimit::from_watts(self.power_watts));
        let thermal = (self.acoustic_celsius > 0).then(|| Temperature::new(self.acoustic_celsius));

        if self.fan.is_none() && power.is_none() && thermal.is_none() {
            return Err(DomainError::NoActiveDomain);
        }

        Ok(Policy {
            device: self.device,
            fan: self.fan,
            power,
            thermal,
            loop_interval,
            retry: RetryPolicy {
                interval: retry_interval,
                ..self.retry
            },
            dry_run: self.dry_run,
            single_use: self.single_use,
        })
    }
}

fn seconds(name: &'static str, value: f64) -> Result<Duration, DomainError> {
    if value < 0.0 {
        return Err(DomainError::InvalidInterval { name, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| DomainError::InvalidInterval { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FanCurvePoint, FanSpeed};

    fn selector() -> DeviceSelector {
        DeviceSelector::Name("RTX 4080".to_string())
    }

    fn curve() -> FanCurve {
        FanCurve::new(
            vec![FanCurvePoint::new(0, FanSpeed::new(50).unwrap())],
            FanSpeed::new(50).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_no_active_domain_rejected() {
        let result = Policy::builder(selector()).build();
        assert_eq!(result, Err(DomainError::NoActiveDomain));

        let result = Policy::builder(selector())
            .power_limit_watts(0)
            .acoustic_limit_celsius(0)
            .build();
        assert_eq!(result, Err(DomainError::NoActiveDomain));
    }

    #[test]
    fn test_single_domain_policies() {
        let policy = Policy::builder(selector()).power_limit_watts(250).build().unwrap();
        assert_eq!(policy.power(), Some(PowerLimit::from_watts(250)));
        assert!(policy.fan().is_none());
        assert!(policy.thermal().is_none());

        let policy = Policy::builder(selector())
            .acoustic_limit_celsius(70)
            .build()
            .unwrap();
        assert_eq!(policy.thermal(), Some(Temperature::new(70)));

        let policy = Policy::builder(selector()).fan_curve(curve()).build().unwrap();
        assert!(policy.fan().is_some());
    }

    #[test]
    fn test_defaults() {
        let policy = Policy::builder(selector()).power_limit_watts(100).build().unwrap();
        assert_eq!(policy.loop_interval(), Duration::from_secs(1));
        assert_eq!(policy.retry().interval, Duration::from_secs(2));
        assert!(policy.retry().enabled);
        assert!(!policy.is_dry_run());
        assert!(!policy.is_single_use());
    }

    #[test]
    fn test_intervals() {
        let policy = Policy::builder(selector())
            .power_limit_watts(100)
            .loop_interval_secs(0.5)
            .retry_interval_secs(0.0)
            .build()
            .unwrap();
        assert_eq!(policy.loop_interval(), Duration::from_millis(500));
        assert_eq!(policy.retry().interval, Duration::ZERO);

        let result = Policy::builder(selector())
            .power_limit_watts(100)
            .loop_interval_secs(-5.0)
            .build();
        assert!(matches!(
            result,
            Err(DomainError::InvalidInterval { name: "loop", .. })
        ));

        let result = Policy::builder(selector())
            .power_limit_watts(100)
            .retry_interval_secs(f64::NAN)
            .build();
        assert!(matches!(
            result,
            Err(DomainError::InvalidInterval { name: "retry", .. })
        ));
    }

    #[test]
    fn test_negative_acoustic_rejected() {
        let result = Policy::builder(selector()).acoustic_limit_celsius(-3).build();
        assert_eq!(result, Err(DomainError::InvalidTemperature(-3)));
    }

    #[test]
    fn test_for_device_keeps_settings() {
        let policy = Policy::builder(selector())
            .power_limit_watts(200)
            .dry_run(true)
            .build()
            .unwrap();
        let other = policy.for_device(DeviceSelector::Index(3));
        assert_eq!(other.device(), &DeviceSelector::Index(3));
        assert_eq!(other.power(), policy.power());
        assert!(other.is_dry_run());
    }

    #[test]
    fn test_retry_policy_allows() {
        let retry = RetryPolicy::default();
        assert!(retry.allows(Some(FaultKind::Transient), 0));
        assert!(retry.allows(Some(FaultKind::Unsupported), 0));
        assert!(retry.allows(Some(FaultKind::PermissionDenied), 5));
        assert!(!retry.allows(Some(FaultKind::DeviceNotFound), 0));
        assert!(!retry.allows(None, 0));

        let strict = RetryPolicy {
            retry_permission_denied: false,
            max_attempts: Some(2),
            ..RetryPolicy::default()
        };
        assert!(!strict.allows(Some(FaultKind::PermissionDenied), 0));
        assert!(strict.allows(Some(FaultKind::Transient), 1));
        assert!(!strict.allows(Some(FaultKind::Transient), 2));

        let disabled = RetryPolicy {
            enabled: false,
            ..RetryPolicy::default()
        };
        assert!(!disabled.allows(Some(FaultKind::Transient), 0));
    }
}
