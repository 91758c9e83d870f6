//! AKOS: Autonomy Kernel
//!
//! A control plane that drives external effects toward operator-declared
//! intents while keeping hard policy guarantees inviolable. The kernel
//! continuously compares its world model against declared intents, detects
//! drift, and runs a bounded constraint-guided loop: propose a strategy,
//! submit it to governance, reformulate from the machine-readable rejection
//! reason, and escalate to a human when the budget is exhausted. Every cycle
//! lands in a tamper-evident lineage ledger.

pub mod autonomy_loop;
pub mod config;
pub mod errors;
pub mod execution;
pub mod governance_kernel;
pub mod kernel;
pub mod learning;
pub mod lineage;
pub mod reconciler;
pub mod strategy;
pub mod types;
pub mod world_model;

#[cfg(feature = "server")]
pub mod gateway;

pub use crate::autonomy_loop::{AutonomyLoop, LoopOutcome, LoopVerdict};
pub use crate::config::KernelConfig;
pub use crate::errors::{KernelError, KernelResult};
pub use crate::execution::{ActionHandler, ExecutionDispatcher};
pub use crate::governance_kernel::GovernanceKernel;
pub use crate::kernel::AKOS;
pub use crate::learning::LearningEngine;
pub use crate::lineage::LineageLedger;
pub use crate::reconciler::{DriftRule, Reconciler, SlaDriftRule};
pub use crate::strategy::{RuleLadderGenerator, StrategyGenerator};
pub use crate::world_model::WorldModelStore;
