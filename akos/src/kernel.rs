//! AKOS core: the main system struct and initialization.
//!
//! Wires together the world model store, governance kernel, executor
//! dispatcher, lineage ledger, learning engine, and reconciler. This is the
//! primary entry point for embedding the kernel; the gateway serves the same
//! struct over HTTP.

use std::sync::{Arc, Mutex};

use crate::config::KernelConfig;
use crate::errors::KernelResult;
use crate::execution::ExecutionDispatcher;
use crate::governance_kernel::GovernanceKernel;
use crate::learning::LearningEngine;
use crate::lineage::LineageLedger;
use crate::reconciler::Reconciler;
use crate::strategy::{RuleLadderGenerator, StrategyGenerator};
use crate::world_model::WorldModelStore;

/// The assembled autonomy kernel. Shared components are behind `Arc`; the
/// world model and reconciler sit behind mutexes that form the per-model
/// serialization boundary.
#[derive(Clone)]
pub struct AKOS {
    pub world: Arc<Mutex<WorldModelStore>>,
    pub governance: Arc<GovernanceKernel>,
    pub dispatcher: Arc<ExecutionDispatcher>,
    pub ledger: Arc<LineageLedger>,
    pub learning: Arc<Mutex<LearningEngine>>,
    pub reconciler: Arc<Mutex<Reconciler>>,
}

impl AKOS {
    /// Build a kernel with the default rule-ladder strategy generator.
    pub fn new(config: KernelConfig) -> KernelResult<Self> {
        Self::with_strategy(config, Arc::new(RuleLadderGenerator::new()))
    }

    /// Build a kernel around a custom strategy backend.
    pub fn with_strategy(
        config: KernelConfig,
        strategy: Arc<dyn StrategyGenerator>,
    ) -> KernelResult<Self> {
        let world = Arc::new(Mutex::new(WorldModelStore::new()));
        let governance = Arc::new(GovernanceKernel::new());
        let dispatcher = Arc::new(ExecutionDispatcher::new());
        let ledger = Arc::new(match &config.ledger_path {
            Some(path) => LineageLedger::open(path)?,
            None => LineageLedger::in_memory()?,
        });
        let learning = Arc::new(Mutex::new(LearningEngine::new()));

        let reconciler = Arc::new(Mutex::new(Reconciler::new(
            world.clone(),
            governance.clone(),
            dispatcher.clone(),
            ledger.clone(),
            learning.clone(),
            strategy,
            config.reconciler,
        )));

        Ok(Self {
            world,
            governance,
            dispatcher,
            ledger,
            learning,
            reconciler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Constraint, Intent};
    use chrono::Utc;

    #[test]
    fn kernel_wires_shared_components() {
        let kernel = AKOS::new(KernelConfig::default()).unwrap();

        kernel.reconciler.lock().unwrap().register_intent(Intent {
            id: "sla".to_string(),
            objective: "Respond within 10 minutes".to_string(),
            priority: 80,
            hard_constraints: vec![Constraint::hard("gdpr_consent_required", "consent first")],
            soft_constraints: vec![],
            cost_ceiling: None,
            created_by: "operator".to_string(),
            created_at: Utc::now(),
            active: true,
        });

        assert_eq!(kernel.reconciler.lock().unwrap().intents().len(), 1);
        assert_eq!(kernel.ledger.count().unwrap(), 0);
        assert!(kernel.governance.validate_action_type("task_execution"));
    }
}
