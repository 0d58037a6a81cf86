//! The frozen description of one run.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    ConfigError, CoordinationConfig, FailureSchedule, ImpairmentProfile, ProtocolConfig,
    ScenarioSpec,
};
use crate::scenario::ImpairmentMap;

/// Run identifier used to key the result set.
pub type RunId = String;

/// Everything the orchestrator needs for one run. Constructed through
/// [`ScenarioRun::new`], which is the single validation gate; after the
/// orchestrator starts, the run lives behind an `Arc` and cannot change —
/// mid-run reconfiguration is rejected by construction rather than at
/// runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub run_id: RunId,
    pub scenario: ScenarioSpec,
    pub protocol: ProtocolConfig,
    /// Per-link impairment; links not listed use `default_impairment`.
    pub impairments: ImpairmentMap,
    pub default_impairment: ImpairmentProfile,
    pub failure_schedule: FailureSchedule,
    /// Present only for distributed runs.
    pub coordination: Option<CoordinationConfig>,
}

impl ScenarioRun {
    pub fn new(
        run_id: RunId,
        scenario: ScenarioSpec,
        protocol: ProtocolConfig,
        impairments: ImpairmentMap,
        default_impairment: ImpairmentProfile,
        failure_schedule: FailureSchedule,
        coordination: Option<CoordinationConfig>,
    ) -> Result<Self, ConfigError> {
        if scenario.populations.is_empty() {
            return Err(ConfigError::EmptyScenario(scenario.scenario_id.clone()));
        }
        scenario.validate()?;
        protocol.validate()?;
        default_impairment.validate()?;
        for profile in impairments.values() {
            profile.validate()?;
        }
        if let Some(coordination) = &coordination {
            coordination.validate()?;
        }
        Ok(Self {
            run_id,
            scenario,
            protocol,
            impairments,
            default_impairment,
            failure_schedule,
            coordination,
        })
    }

    /// Impairment for one link, falling back to the run default.
    pub fn impairment_for(&self, link: &str) -> &ImpairmentProfile {
        self.impairments.get(link).unwrap_or(&self.default_impairment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mode, PatternSpec, SensorPopulation};
    use provbank_core::sensors::SensorType;
    use provbank_core::NodeId;

    fn protocol() -> ProtocolConfig {
        ProtocolConfig {
            protocol_id: "loopback".into(),
            mode: Mode::Active,
            server_addr: "127.0.0.1:5000".parse().unwrap(),
            client_count: 1,
            server_binary: None,
            client_binary: None,
            receipt_log: None,
            start_timeout_ms: 5_000,
            send_timeout_ms: 1_000,
            drain_grace_ms: 100,
        }
    }

    fn scenario(populations: Vec<SensorPopulation>) -> ScenarioSpec {
        ScenarioSpec {
            scenario_id: "smart_home".into(),
            duration_secs: 5,
            seed: 1,
            populations,
        }
    }

    #[test]
    fn empty_scenario_is_rejected() {
        let err = ScenarioRun::new(
            "run-1".into(),
            scenario(vec![]),
            protocol(),
            ImpairmentMap::new(),
            ImpairmentProfile::default(),
            FailureSchedule::empty(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyScenario(_)));
    }

    #[test]
    fn invalid_loss_probability_is_rejected() {
        let bad = ImpairmentProfile {
            loss_probability: 2.0,
            ..ImpairmentProfile::default()
        };
        let err = ScenarioRun::new(
            "run-2".into(),
            scenario(vec![SensorPopulation {
                node_id: NodeId::from("core"),
                count: 1,
                sensor_type: SensorType::Temperature,
                pattern: PatternSpec::Periodic { interval_ms: 100 },
            }]),
            protocol(),
            ImpairmentMap::new(),
            bad,
            FailureSchedule::empty(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn impairment_lookup_falls_back_to_default() {
        let mut impairments = ImpairmentMap::new();
        impairments.insert(
            "edge-1".into(),
            ImpairmentProfile {
                latency_ms: 50,
                ..ImpairmentProfile::default()
            },
        );
        let run = ScenarioRun::new(
            "run-3".into(),
            scenario(vec![SensorPopulation {
                node_id: NodeId::from("edge-1"),
                count: 1,
                sensor_type: SensorType::Temperature,
                pattern: PatternSpec::Periodic { interval_ms: 100 },
            }]),
            protocol(),
            impairments,
            ImpairmentProfile::default(),
            FailureSchedule::empty(),
            None,
        )
        .unwrap();
        assert_eq!(run.impairment_for("edge-1").latency_ms, 50);
        assert_eq!(run.impairment_for("edge-2").latency_ms, 0);
    }
}
