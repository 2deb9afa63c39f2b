//! Schedule result types
//!
//! The output of a `solve` call: status, dated task records, and the
//! statistics attached to them (line utilization, per-stage capacity,
//! deadline misses, changeovers). Nothing here persists beyond the call.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{LineId, ProductId, StageId};

// ============================================================================
// Status
// ============================================================================

/// Outcome classification of a solve call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleStatus {
    /// The solver proved the makespan optimal
    Optimal,
    /// A schedule was found but optimality was not proven in the budget
    Feasible,
    /// The solver proved no schedule exists
    Infeasible,
    /// No solution found within the time budget
    Timeout,
    /// Structural input error detected before model construction
    InvalidInput,
    /// Every product's demand is already covered by stock
    NoProductionNeeded,
    /// Internal consistency error
    Error,
}

impl ScheduleStatus {
    /// True when the result carries a usable schedule.
    pub fn has_schedule(&self) -> bool {
        matches!(self, ScheduleStatus::Optimal | ScheduleStatus::Feasible)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Optimal => "OPTIMAL",
            ScheduleStatus::Feasible => "FEASIBLE",
            ScheduleStatus::Infeasible => "INFEASIBLE",
            ScheduleStatus::Timeout => "TIMEOUT",
            ScheduleStatus::InvalidInput => "INVALID_INPUT",
            ScheduleStatus::NoProductionNeeded => "NO_PRODUCTION_NEEDED",
            ScheduleStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// One scheduled work unit on one line, fully dated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub product_id: ProductId,
    /// Display name at this stage (per-stage name map or pattern)
    pub display_name: String,
    pub stage_id: StageId,
    pub stage_order: u32,
    pub stage_name: String,
    pub line_id: LineId,
    pub line_name: String,
    pub quantity: u32,
    /// Start on the working-minutes axis
    pub start_minute: i64,
    /// End on the working-minutes axis; `end - start = processing`
    pub end_minute: i64,
    /// Wall-clock equivalents of start/end
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub processing_minutes: i64,
    /// Transfer wait inherited from the preceding stage
    pub stage_transfer_minutes: i64,
    /// Transfer wait caused by switching lines between stages
    pub line_transfer_minutes: i64,
    /// Product that ran before this one on the same (line, stage) track
    pub previous_product: Option<ProductId>,
    /// 1-based batch number within the split
    pub batch_number: u32,
    pub batch_count: u32,
}

// ============================================================================
// Statistics
// ============================================================================

/// A product whose last stage finished after its due date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissedDeadline {
    pub product_id: ProductId,
    pub due: NaiveDateTime,
    pub actual_end: NaiveDateTime,
    pub delay_minutes: i64,
    /// Delay expressed in whole working days
    pub delay_working_days: i64,
}

/// Required vs available working minutes for one stage across the fleet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapacityAnalysis {
    pub stage_id: StageId,
    pub stage_name: String,
    pub required_minutes: i64,
    pub available_minutes: i64,
    /// Set iff required exceeds available
    pub bottleneck: bool,
}

/// Busy vs available minutes for one line over the plan window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineUtilization {
    pub line_id: LineId,
    pub line_name: String,
    pub busy_minutes: i64,
    pub available_minutes: i64,
    /// `busy / available`, 0 when the line had no window
    pub utilization: f64,
}

/// Product switches observed on a line's stage tracks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeoverStats {
    pub line_id: LineId,
    pub changeovers: u32,
}

// ============================================================================
// Warnings
// ============================================================================

/// Non-fatal observations attached to a successful result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningCode {
    BottleneckStage,
    PrioritySortApplied,
    LotSplitsMaterialized,
    DeadlineMissed,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::BottleneckStage => "bottleneck-stage",
            WarningCode::PrioritySortApplied => "priority-sort-applied",
            WarningCode::LotSplitsMaterialized => "lot-splits-materialized",
            WarningCode::DeadlineMissed => "deadline-missed",
        }
    }
}

impl std::fmt::Display for WarningCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

// ============================================================================
// Result
// ============================================================================

/// The complete outcome of one solve call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleResult {
    pub status: ScheduleStatus,
    /// Minutes from the reference instant to the latest task end
    pub makespan_minutes: i64,
    pub solve_time_ms: u64,
    pub plan_start_date: Option<NaiveDateTime>,
    pub expected_completion_date: Option<NaiveDateTime>,
    pub tasks: Vec<ScheduledTask>,
    pub missed_deadlines: Vec<MissedDeadline>,
    pub capacity_analyses: Vec<CapacityAnalysis>,
    pub line_utilizations: Vec<LineUtilization>,
    pub changeover_stats: Vec<ChangeoverStats>,
    pub failure_reasons: Vec<String>,
    pub warnings: Vec<Warning>,
}

impl ScheduleResult {
    /// An empty result carrying only a status.
    pub fn empty(status: ScheduleStatus) -> Self {
        Self {
            status,
            makespan_minutes: 0,
            solve_time_ms: 0,
            plan_start_date: None,
            expected_completion_date: None,
            tasks: Vec::new(),
            missed_deadlines: Vec::new(),
            capacity_analyses: Vec::new(),
            line_utilizations: Vec::new(),
            changeover_stats: Vec::new(),
            failure_reasons: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// A failed result with diagnostic reasons.
    pub fn failed(status: ScheduleStatus, reasons: Vec<String>) -> Self {
        Self {
            failure_reasons: reasons,
            ..Self::empty(status)
        }
    }

    /// Tasks for one product, in start order.
    pub fn tasks_for(&self, product: &str) -> Vec<&ScheduledTask> {
        let mut tasks: Vec<&ScheduledTask> = self
            .tasks
            .iter()
            .filter(|t| t.product_id == product)
            .collect();
        tasks.sort_by_key(|t| (t.stage_order, t.batch_number, t.start_minute));
        tasks
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_matches_contract() {
        assert_eq!(ScheduleStatus::Optimal.to_string(), "OPTIMAL");
        assert_eq!(ScheduleStatus::InvalidInput.to_string(), "INVALID_INPUT");
        assert_eq!(
            ScheduleStatus::NoProductionNeeded.to_string(),
            "NO_PRODUCTION_NEEDED"
        );
    }

    #[test]
    fn only_solved_statuses_carry_schedules() {
        assert!(ScheduleStatus::Optimal.has_schedule());
        assert!(ScheduleStatus::Feasible.has_schedule());
        assert!(!ScheduleStatus::Timeout.has_schedule());
        assert!(!ScheduleStatus::Infeasible.has_schedule());
    }

    #[test]
    fn failed_result_keeps_reasons() {
        let result = ScheduleResult::failed(
            ScheduleStatus::InvalidInput,
            vec!["no stages configured".into()],
        );
        assert_eq!(result.status, ScheduleStatus::InvalidInput);
        assert_eq!(result.failure_reasons.len(), 1);
        assert!(result.tasks.is_empty());
    }
}
