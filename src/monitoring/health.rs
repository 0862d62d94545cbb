//! Agent health summary.

use crate::agents::{AgentHealth, HealthStatus};

/// Counts of agents per health status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSummary {
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
}

impl HealthSummary {
    pub fn from_reports(reports: &[AgentHealth]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            match report.status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Degraded => summary.degraded += 1,
                HealthStatus::Unhealthy => summary.unhealthy += 1,
            }
        }
        summary
    }

    pub fn all_healthy(&self) -> bool {
        self.degraded == 0 && self.unhealthy == 0
    }
}

/// Formats one line per agent followed by a summary line.
pub fn health_report(reports: &[AgentHealth]) -> String {
    let mut output = String::from("\nAgent Health:\n\n");

    for report in reports {
        output.push_str(&format!("{:12} {:10}", report.agent_id, report.status.to_string()));
        if let Some(message) = &report.message {
            output.push_str(&format!(" {}", message));
        }
        output.push('\n');
    }

    let summary = HealthSummary::from_reports(reports);
    output.push_str(&format!(
        "\n{} healthy, {} degraded, {} unhealthy\n",
        summary.healthy, summary.degraded, summary.unhealthy
    ));
    output
}
