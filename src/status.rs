use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Health of a single dependency, or of the whole service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl CheckStatus {
    /// Rolls individual statuses up into one verdict. Any `Unhealthy` makes the whole
    /// set unhealthy; `Unknown` does not. An empty set is healthy.
    pub fn aggregate<'a, I>(statuses: I) -> CheckStatus
    where
        I: IntoIterator<Item = &'a CheckStatus>,
    {
        if statuses
            .into_iter()
            .any(|status| *status == CheckStatus::Unhealthy)
        {
            CheckStatus::Unhealthy
        } else {
            CheckStatus::Healthy
        }
    }

    pub fn is_healthy(&self) -> bool {
        *self == CheckStatus::Healthy
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Healthy => write!(f, "healthy"),
            CheckStatus::Unhealthy => write!(f, "unhealthy"),
            CheckStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// The result of running one checker once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(with = "nanoseconds")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl CheckOutcome {
    pub fn new(status: CheckStatus, duration: Duration) -> Self {
        CheckOutcome {
            name: String::new(),
            status,
            message: None,
            duration,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn healthy(duration: Duration) -> Self {
        Self::new(CheckStatus::Healthy, duration)
    }

    pub fn unhealthy(message: impl Into<String>, duration: Duration) -> Self {
        Self::new(CheckStatus::Unhealthy, duration).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Consumes the outcome and returns it under the name it was registered with.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// The result of one full health pass over every registered checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub status: CheckStatus,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub version: String,
    #[serde(with = "nanoseconds")]
    pub uptime: Duration,
    pub checks: Vec<CheckOutcome>,
}

impl AggregateReport {
    /// Builds the report, deriving the overall status from `checks`.
    pub fn new(service: &str, version: &str, uptime: Duration, checks: Vec<CheckOutcome>) -> Self {
        let status = CheckStatus::aggregate(checks.iter().map(|check| &check.status));
        AggregateReport {
            status,
            timestamp: Utc::now(),
            service: service.to_string(),
            version: version.to_string(),
            uptime,
            checks,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Returns the report as a human-readable string.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        for check in &self.checks {
            summary.push_str(&format!(
                "{}: {} ({:?})",
                check.name, check.status, check.duration
            ));
            if let Some(message) = &check.message {
                summary.push_str(&format!(" - {}", message));
            }
            summary.push('\n');
        }
        summary.push_str(&self.status.to_string());
        summary
    }
}

/// Durations travel as integer nanoseconds.
mod nanoseconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}
