/// Tunables supplied by the configuration collaborator. Defaults match the
/// standard working regime: 40h weeks, Mon–Fri, 8h days.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Fixed weekly capacity per person, in hours.
    pub weekly_hours: f64,
    /// Multiplier applied to a demand's effort before an in-execution item
    /// is flagged as at risk.
    pub at_risk_buffer: f64,
    /// Multiplier applied to queue-derived durations when suggesting an
    /// agreed deadline for new work.
    pub deadline_buffer: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weekly_hours: 40.0,
            at_risk_buffer: 1.2,
            deadline_buffer: 1.4,
        }
    }
}

impl EngineConfig {
    /// Read overrides from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            weekly_hours: env_f64("DEMANDFLOW_WEEKLY_HOURS", defaults.weekly_hours),
            at_risk_buffer: env_f64("DEMANDFLOW_AT_RISK_BUFFER", defaults.at_risk_buffer),
            deadline_buffer: env_f64("DEMANDFLOW_DEADLINE_BUFFER", defaults.deadline_buffer),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v: &f64| v.is_finite() && *v > 0.0)
        .unwrap_or(default)
}
