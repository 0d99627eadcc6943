// SPDX-License-Identifier: MIT OR Apache-2.0
//! Health status shared by every level of the federation hierarchy.

use serde::{Deserialize, Serialize};

/// Health of one node or the aggregate health of a [`crate::Supervisor`]'s
/// children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Operating normally.
    Healthy,
    /// Running but experiencing issues.
    Degraded {
        /// Description of the degradation.
        reason: String,
    },
    /// Not functioning correctly.
    Unhealthy {
        /// Description of the failure.
        reason: String,
    },
    /// Not yet determined.
    Unknown,
}

impl HealthStatus {
    /// Roll a set of child statuses up into one aggregate: healthy iff
    /// every child is healthy, otherwise the strongest negative status
    /// among them (`Unhealthy` > `Degraded` > `Unknown`).
    #[must_use]
    pub fn aggregate(children: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
        let mut worst = HealthStatus::Healthy;
        for status in children {
            worst = match (&worst, &status) {
                (HealthStatus::Unhealthy { .. }, _) => worst,
                (_, HealthStatus::Unhealthy { .. }) => status,
                (HealthStatus::Degraded { .. }, _) => worst,
                (_, HealthStatus::Degraded { .. }) => status,
                (HealthStatus::Unknown, _) => worst,
                (_, HealthStatus::Unknown) => status,
                _ => worst,
            };
        }
        worst
    }
}
