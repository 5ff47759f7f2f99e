//! Router table: maps a routing decision (and, for `continue`, the project
//! phase) to the step the router hands control to.

use std::collections::BTreeMap;

use campflow_types::config::RouteConfig;
use campflow_types::workflow::{Decision, Phase};

use super::{ADJUSTMENT, CAMPAIGN_SETUP, DISCOVERY, INSIGHT, REFLECTION, ROUTER_TARGETS, SAVE};

/// Validated decision/phase → step mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    decisions: BTreeMap<Decision, String>,
    phases: BTreeMap<Phase, String>,
}

impl Default for RouteTable {
    fn default() -> Self {
        let decisions = [
            (Decision::Initialize, DISCOVERY),
            (Decision::Reflect, REFLECTION),
            (Decision::Enrich, DISCOVERY),
        ];
        let phases = [
            (Phase::Initialized, INSIGHT),
            (Phase::DataCollected, INSIGHT),
            (Phase::StrategyBuilt, CAMPAIGN_SETUP),
            (Phase::AwaitingResults, SAVE),
            (Phase::Optimizing, ADJUSTMENT),
            (Phase::Completed, SAVE),
        ];
        Self {
            decisions: decisions
                .into_iter()
                .map(|(d, s)| (d, s.to_string()))
                .collect(),
            phases: phases.into_iter().map(|(p, s)| (p, s.to_string())).collect(),
        }
    }
}

impl RouteTable {
    /// Build from configuration, or the built-in table when none is given.
    ///
    /// A configured table replaces the built-in one entirely and must cover
    /// every decision except `continue` and every phase.
    pub fn from_config(config: Option<&RouteConfig>) -> Result<Self, RouteError> {
        let table = match config {
            Some(config) => Self {
                decisions: config.decisions.clone(),
                phases: config.phases.clone(),
            },
            None => Self::default(),
        };
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), RouteError> {
        if self.decisions.contains_key(&Decision::Continue) {
            return Err(RouteError::ContinueMapped);
        }
        for decision in Decision::ALL {
            if decision != Decision::Continue && !self.decisions.contains_key(&decision) {
                return Err(RouteError::MissingDecision(decision));
            }
        }
        for phase in Phase::ALL {
            if !self.phases.contains_key(&phase) {
                return Err(RouteError::MissingPhase(phase));
            }
        }

        let targets = self
            .decisions
            .iter()
            .map(|(d, t)| (d.as_str(), t))
            .chain(self.phases.iter().map(|(p, t)| (p.as_str(), t)));
        for (key, target) in targets {
            if !ROUTER_TARGETS.contains(&target.as_str()) {
                return Err(RouteError::UnknownTarget {
                    key: key.to_string(),
                    target: target.clone(),
                });
            }
        }
        Ok(())
    }

    /// Step for `decision`, consulting the phase table for `continue`.
    pub fn target(&self, decision: Decision, phase: Phase) -> &str {
        let target = match decision {
            Decision::Continue => self.phases.get(&phase),
            other => self.decisions.get(&other),
        };
        // Validation guarantees coverage.
        target.map(String::as_str).unwrap_or(DISCOVERY)
    }
}

/// Invalid route configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("no route for decision '{0}'")]
    MissingDecision(Decision),

    #[error("no route for phase '{0}'")]
    MissingPhase(Phase),

    #[error("'continue' is routed by phase and cannot be mapped directly")]
    ContinueMapped,

    #[error("route '{key}' points at '{target}', which the router cannot reach")]
    UnknownTarget { key: String, target: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_valid_and_total() {
        let table = RouteTable::from_config(None).unwrap();
        for decision in Decision::ALL {
            for phase in Phase::ALL {
                assert!(ROUTER_TARGETS.contains(&table.target(decision, phase)));
            }
        }
    }

    #[test]
    fn test_default_routes() {
        let table = RouteTable::default();
        assert_eq!(table.target(Decision::Initialize, Phase::Completed), "discovery");
        assert_eq!(table.target(Decision::Reflect, Phase::Initialized), "reflection");
        assert_eq!(table.target(Decision::Enrich, Phase::Optimizing), "discovery");
        assert_eq!(table.target(Decision::Continue, Phase::Initialized), "insight");
        assert_eq!(table.target(Decision::Continue, Phase::StrategyBuilt), "campaign_setup");
        assert_eq!(table.target(Decision::Continue, Phase::AwaitingResults), "save");
        assert_eq!(table.target(Decision::Continue, Phase::Optimizing), "adjustment");
    }

    fn full_config() -> RouteConfig {
        let defaults = RouteTable::default();
        RouteConfig {
            decisions: defaults.decisions,
            phases: defaults.phases,
        }
    }

    #[test]
    fn test_configured_table_overrides() {
        let mut config = full_config();
        config.decisions.insert(Decision::Enrich, "user_input".into());
        let table = RouteTable::from_config(Some(&config)).unwrap();
        assert_eq!(table.target(Decision::Enrich, Phase::Initialized), "user_input");
    }

    #[test]
    fn test_partial_config_rejected() {
        let mut config = full_config();
        config.phases.remove(&Phase::Optimizing);
        assert_eq!(
            RouteTable::from_config(Some(&config)),
            Err(RouteError::MissingPhase(Phase::Optimizing))
        );

        let mut config = full_config();
        config.decisions.remove(&Decision::Reflect);
        assert_eq!(
            RouteTable::from_config(Some(&config)),
            Err(RouteError::MissingDecision(Decision::Reflect))
        );
    }

    #[test]
    fn test_unreachable_target_rejected() {
        let mut config = full_config();
        config.phases.insert(Phase::Completed, "load_context".into());
        assert!(matches!(
            RouteTable::from_config(Some(&config)),
            Err(RouteError::UnknownTarget { .. })
        ));

        let mut config = full_config();
        config.decisions.insert(Decision::Continue, "save".into());
        assert_eq!(
            RouteTable::from_config(Some(&config)),
            Err(RouteError::ContinueMapped)
        );
    }
}
