//! Exit policy engine.
//!
//! Every open position carries an [`ExitState`]. Each bar the state runs its
//! mode-specific logic (ladder, trailing, holding time or partial-exit
//! manager) and then the regular stop/target check.

pub mod calculator;
pub mod config;
pub mod ladder;
pub mod partial_manager;
pub mod ratchet;
pub mod state;

pub use calculator::{
    AtrSwingExitCalculator, ExitCalculator, ExitLevel, ExitPlan, ExitRequest, SmartExitConfig,
    StopConfig, StopType, TakeProfitConfig, TakeProfitType,
};
pub use config::{EnhancedPartialConfig, ExitConfig, ExitMode, TriggerSource};
pub use ladder::{LadderLevel, PartialLadder, RungStatus};
pub use partial_manager::{
    PartialExecution, PartialExitContext, PartialExitEvaluation, PartialExitManager,
    PartialLevelConfig, RecommendedLevel, Trigger, TriggerLadderManager,
};
pub use ratchet::{RatchetState, TrailingStop};
pub use state::{check_stop_target, plan_entry, BarContext, EntryContext, EntryPlan, ExitAction, ExitState};
