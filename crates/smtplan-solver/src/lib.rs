//! # smtplan-solver
//!
//! Constraint-programming scheduler for SMT assembly shops.
//!
//! The pipeline runs leaves first: the working calendar is anchored into a
//! minutes axis ([`timeline`]), routings are resolved ([`catalog`]),
//! products are expanded into work units ([`lots`]), the units are compiled
//! into a pumpkin constraint model and minimized for makespan, and the
//! solution is decoded back into dated tasks with statistics.
//!
//! [`ShopScheduler::solve`] is the single public entry point; a solve call
//! moves through `Init -> Validated -> Planned -> Modeled -> Solving ->
//! {Decoded | Failed}` and never retries on its own.
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use smtplan_core::{Line, Product, Stage};
//! use smtplan_solver::{ShopInputs, ShopScheduler};
//!
//! let reference = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let due = NaiveDate::from_ymd_opt(2025, 3, 21).unwrap().and_hms_opt(0, 0, 0).unwrap();
//!
//! let mut inputs = ShopInputs::new(reference);
//! inputs.stages.push(Stage::new(1, "Pick & Place", 1));
//! inputs.lines.push(Line::new("SMT-1").capability(1, 1.0));
//! inputs.products.push(Product::new("PCB-100").order_qty(60).release(reference).due(due));
//!
//! let result = ShopScheduler::new(inputs).solve(10);
//! assert!(result.status.has_schedule());
//! ```

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::TimeDelta;
use tracing::{debug, info};

use smtplan_core::{
    Line, LineTransferMatrix, Product, ScheduleError, ScheduleResult, ScheduleStatus,
    SchedulerOptions, ShopCalendar, Stage, StageTransferMatrix, Warning, WarningCode,
};

pub mod catalog;
pub mod lots;
pub mod timeline;

mod decode;
mod model;

pub use catalog::RoutingCatalog;
pub use lots::{split_quantity, WorkUnit};
pub use timeline::WorkTimeline;

use decode::DecodeInput;
use lots::materialize_units;
use model::{CpModel, CpStatus, ModelInput};

/// Calendar days of slack added after the latest due date when sizing the
/// horizon.
const HORIZON_DUE_SLACK_DAYS: i64 = 30;

/// Working days guaranteed after the earliest release, as a feasibility
/// floor for the horizon.
const HORIZON_FLOOR_DAYS: i64 = 7;

// ============================================================================
// Inputs
// ============================================================================

/// Everything a solve call consumes. Logically immutable for the duration
/// of the call; the scheduler holds no other state.
#[derive(Clone, Debug)]
pub struct ShopInputs {
    pub stages: Vec<Stage>,
    pub lines: Vec<Line>,
    pub products: Vec<Product>,
    /// The zero of the working-minutes axis
    pub reference: chrono::NaiveDateTime,
    pub calendar: ShopCalendar,
    pub stage_transfers: StageTransferMatrix,
    pub line_transfers: LineTransferMatrix,
    pub options: SchedulerOptions,
}

impl ShopInputs {
    pub fn new(reference: chrono::NaiveDateTime) -> Self {
        Self {
            stages: Vec::new(),
            lines: Vec::new(),
            products: Vec::new(),
            reference,
            calendar: ShopCalendar::default(),
            stage_transfers: StageTransferMatrix::zero(),
            line_transfers: LineTransferMatrix::zero(),
            options: SchedulerOptions::default(),
        }
    }
}

/// Phases of one solve call. `Failed` is terminal; partial models are never
/// reused across calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SolvePhase {
    Init,
    Validated,
    Planned,
    Modeled,
    Solving,
    Decoded,
    Failed,
}

// ============================================================================
// Scheduler
// ============================================================================

/// The orchestrator owning the solve pipeline.
pub struct ShopScheduler {
    inputs: ShopInputs,
}

impl ShopScheduler {
    pub fn new(inputs: ShopInputs) -> Self {
        Self { inputs }
    }

    pub fn inputs(&self) -> &ShopInputs {
        &self.inputs
    }

    /// Compute a schedule within the wall-clock budget.
    ///
    /// Never panics and never retries; the caller re-invokes with modified
    /// inputs if the outcome is not good enough.
    pub fn solve(&self, time_limit_seconds: u64) -> ScheduleResult {
        let started = Instant::now();
        let span = tracing::info_span!("solve", time_limit_seconds);
        let _guard = span.enter();
        debug!(phase = ?SolvePhase::Init, "starting solve");

        let timeline = WorkTimeline::new(&self.inputs.calendar, self.inputs.reference);

        // ── Validated ───────────────────────────────────────────────────
        let reasons = self.validate(&timeline);
        if !reasons.is_empty() {
            debug!(phase = ?SolvePhase::Failed, ?reasons, "input validation failed");
            return finish(
                ScheduleResult::failed(ScheduleStatus::InvalidInput, reasons),
                started,
            );
        }
        debug!(phase = ?SolvePhase::Validated, "inputs validated");

        let mut stages = self.inputs.stages.clone();
        stages.sort_by_key(|s| s.order);

        let active_products: Vec<usize> = self
            .inputs
            .products
            .iter()
            .enumerate()
            .filter(|(_, p)| p.required_qty() > 0)
            .map(|(idx, _)| idx)
            .collect();
        if active_products.is_empty() {
            info!("all demand covered by stock, nothing to schedule");
            return finish(
                ScheduleResult::empty(ScheduleStatus::NoProductionNeeded),
                started,
            );
        }

        let catalog = match RoutingCatalog::build(
            &stages,
            &self.inputs.lines,
            &self.inputs.products,
            &self.inputs.options,
        ) {
            Ok(catalog) => catalog,
            Err(err) => {
                debug!(phase = ?SolvePhase::Failed, %err, "routing resolution failed");
                return finish(
                    ScheduleResult::failed(ScheduleStatus::InvalidInput, vec![err.to_string()]),
                    started,
                );
            }
        };

        // ── Planned ─────────────────────────────────────────────────────
        let release_minutes: Vec<i64> = self
            .inputs
            .products
            .iter()
            .map(|p| timeline.date_to_minutes(p.release, None))
            .collect();
        let due_minutes: Vec<i64> = self
            .inputs
            .products
            .iter()
            .map(|p| timeline.date_to_minutes(p.due, None))
            .collect();

        let mut warnings = Vec::new();
        let product_order = self.priority_order(&active_products, &release_minutes, &due_minutes);
        if self.inputs.options.enable_priority_scheduling && product_order.len() > 1 {
            warnings.push(Warning::new(
                WarningCode::PrioritySortApplied,
                format!("{} products ordered by priority tier and due date", product_order.len()),
            ));
        }

        let units = materialize_units(
            &self.inputs.products,
            &product_order,
            &catalog,
            self.inputs.options.enable_lot_splitting,
        );
        let split_count = units.iter().filter(|u| u.batch_count() > 1).count();
        if split_count > 0 {
            warnings.push(Warning::new(
                WarningCode::LotSplitsMaterialized,
                format!("{} work units flow as split lots", split_count),
            ));
        }
        debug!(phase = ?SolvePhase::Planned, units = units.len(), "work units materialized");

        // ── Modeled ─────────────────────────────────────────────────────
        let horizon = self.compute_horizon(
            &timeline,
            &catalog,
            &units,
            &release_minutes,
            &active_products,
        );
        let input = ModelInput {
            lines: &self.inputs.lines,
            products: &self.inputs.products,
            catalog: &catalog,
            units: &units,
            release_minutes: &release_minutes,
            due_minutes: &due_minutes,
            stage_transfers: &self.inputs.stage_transfers,
            line_transfers: &self.inputs.line_transfers,
            options: &self.inputs.options,
            horizon,
        };
        let cp_model = match CpModel::build(&input) {
            Ok(model) => model,
            Err(err @ (ScheduleError::NoCandidateLine { .. } | ScheduleError::InvalidRouting { .. })) => {
                debug!(phase = ?SolvePhase::Failed, %err, "model construction rejected inputs");
                return finish(
                    ScheduleResult::failed(ScheduleStatus::InvalidInput, vec![err.to_string()]),
                    started,
                );
            }
            Err(err) => {
                debug!(phase = ?SolvePhase::Failed, %err, "model construction failed");
                return finish(
                    ScheduleResult::failed(ScheduleStatus::Error, vec![err.to_string()]),
                    started,
                );
            }
        };
        debug!(phase = ?SolvePhase::Modeled, horizon, "constraint model built");

        // ── Solving ─────────────────────────────────────────────────────
        debug!(phase = ?SolvePhase::Solving, "handing over to the CP solver");
        let outcome = cp_model.solve(Duration::from_secs(time_limit_seconds));
        info!(
            status = ?outcome.status,
            makespan = ?outcome.makespan,
            solve_ms = outcome.solve_time.as_millis() as u64,
            "solver returned"
        );

        match outcome.status {
            CpStatus::Infeasible => {
                let reasons = self.infeasibility_reasons(
                    &catalog,
                    &release_minutes,
                    &due_minutes,
                    &active_products,
                );
                finish(
                    ScheduleResult::failed(ScheduleStatus::Infeasible, reasons),
                    started,
                )
            }
            CpStatus::Unknown => finish(
                ScheduleResult::failed(
                    ScheduleStatus::Timeout,
                    vec![format!(
                        "no feasible schedule found within {time_limit_seconds}s"
                    )],
                ),
                started,
            ),
            CpStatus::Optimal | CpStatus::Feasible => {
                let status = if outcome.status == CpStatus::Optimal {
                    ScheduleStatus::Optimal
                } else {
                    ScheduleStatus::Feasible
                };
                let decode_input = DecodeInput {
                    lines: &self.inputs.lines,
                    products: &self.inputs.products,
                    catalog: &catalog,
                    units: &units,
                    due_minutes: &due_minutes,
                    stage_transfers: &self.inputs.stage_transfers,
                    line_transfers: &self.inputs.line_transfers,
                    options: &self.inputs.options,
                    timeline: &timeline,
                };
                match decode::decode(&decode_input, &outcome.tasks) {
                    Err(err) => {
                        debug!(phase = ?SolvePhase::Failed, %err, "decoding failed");
                        finish(
                            ScheduleResult::failed(ScheduleStatus::Error, vec![err.to_string()]),
                            started,
                        )
                    }
                    Ok(decoded) => {
                        debug!(phase = ?SolvePhase::Decoded, tasks = decoded.tasks.len(), "schedule decoded");
                        self.assemble(status, decoded, outcome.makespan, warnings, &timeline, started)
                    }
                }
            }
        }
    }

    /// Build the final result from a decoded schedule.
    fn assemble(
        &self,
        status: ScheduleStatus,
        decoded: decode::Decoded,
        makespan: Option<i64>,
        mut warnings: Vec<Warning>,
        timeline: &WorkTimeline<'_>,
        started: Instant,
    ) -> ScheduleResult {
        let plan_start_date = timeline.minutes_to_date(decoded.plan_start_minute, None);
        let completion_date = timeline.minutes_to_date(decoded.completion_minute, None);
        let (plan_start_date, expected_completion_date) = match (plan_start_date, completion_date) {
            (Ok(start), Ok(end)) => (Some(start), Some(end)),
            (Err(err), _) | (_, Err(err)) => {
                return finish(
                    ScheduleResult::failed(ScheduleStatus::Error, vec![err.to_string()]),
                    started,
                );
            }
        };

        for analysis in &decoded.capacity_analyses {
            if analysis.bottleneck {
                warnings.push(Warning::new(
                    WarningCode::BottleneckStage,
                    format!(
                        "stage '{}' needs {} min but only {} min are available",
                        analysis.stage_name, analysis.required_minutes, analysis.available_minutes
                    ),
                ));
            }
        }
        for miss in &decoded.missed_deadlines {
            warnings.push(Warning::new(
                WarningCode::DeadlineMissed,
                format!(
                    "product '{}' finishes {} working day(s) late",
                    miss.product_id, miss.delay_working_days
                ),
            ));
        }

        let result = ScheduleResult {
            status,
            makespan_minutes: makespan.unwrap_or(decoded.completion_minute),
            solve_time_ms: 0, // set by finish()
            plan_start_date,
            expected_completion_date,
            tasks: decoded.tasks,
            missed_deadlines: decoded.missed_deadlines,
            capacity_analyses: decoded.capacity_analyses,
            line_utilizations: decoded.line_utilizations,
            changeover_stats: decoded.changeover_stats,
            failure_reasons: Vec::new(),
            warnings,
        };
        finish(result, started)
    }

    // ────────────────────────────────────────────────────────────────────
    // Validation
    // ────────────────────────────────────────────────────────────────────

    /// Structural prerequisites, checked before any model is built. All
    /// violations are collected so the caller sees them at once.
    fn validate(&self, timeline: &WorkTimeline<'_>) -> Vec<String> {
        let mut reasons = Vec::new();

        if self.inputs.stages.is_empty() {
            reasons.push(ScheduleError::NoStages.to_string());
            return reasons;
        }

        let mut sorted = self.inputs.stages.clone();
        sorted.sort_by_key(|s| s.order);
        for pair in sorted.windows(2) {
            if pair[1].order <= pair[0].order {
                reasons.push(format!(
                    "stages {} and {} share presentation order {}",
                    pair[0].id, pair[1].id, pair[1].order
                ));
            }
        }
        let mut seen_ids = HashSet::new();
        for stage in &sorted {
            if !seen_ids.insert(stage.id) {
                reasons.push(format!("duplicate stage id {}", stage.id));
            }
        }

        let active_lines: Vec<&Line> = self.inputs.lines.iter().filter(|l| l.active).collect();
        if active_lines.is_empty() {
            reasons.push(ScheduleError::NoActiveLines.to_string());
            return reasons;
        }

        for stage in &sorted {
            if !active_lines.iter().any(|l| l.supports(stage.id)) {
                reasons.push(
                    ScheduleError::UnsupportedStage {
                        id: stage.id,
                        name: stage.name.clone(),
                    }
                    .to_string(),
                );
            }
        }

        for product in &self.inputs.products {
            if product.required_qty() == 0 {
                continue;
            }
            if product.due <= product.release {
                reasons.push(ScheduleError::InvalidDateRange(product.id.clone()).to_string());
            } else if timeline.available_minutes_between(product.release, product.due, None) == 0 {
                reasons.push(ScheduleError::NoWorkingTime(product.id.clone()).to_string());
            }

            if let Some(routing) = &product.routing {
                let mut steps = routing.steps.clone();
                steps.sort_by_key(|s| s.sequence);
                for pair in steps.windows(2) {
                    if pair[1].sequence <= pair[0].sequence {
                        reasons.push(
                            ScheduleError::InvalidRouting {
                                product: product.id.clone(),
                                reason: format!(
                                    "step sequences must be strictly increasing (saw {} twice)",
                                    pair[1].sequence
                                ),
                            }
                            .to_string(),
                        );
                    }
                }
                for step in &steps {
                    if !self.inputs.stages.iter().any(|s| s.id == step.stage_id) {
                        reasons.push(
                            ScheduleError::InvalidRouting {
                                product: product.id.clone(),
                                reason: format!("unknown stage {}", step.stage_id),
                            }
                            .to_string(),
                        );
                    }
                }
            }
        }

        reasons
    }

    // ────────────────────────────────────────────────────────────────────
    // Ordering, horizon, diagnostics
    // ────────────────────────────────────────────────────────────────────

    /// Product indices in scheduling order. With priority scheduling
    /// enabled, sorts on the composite key (tier, due, release, id);
    /// otherwise keeps the declared order.
    fn priority_order(
        &self,
        active_products: &[usize],
        release_minutes: &[i64],
        due_minutes: &[i64],
    ) -> Vec<usize> {
        let mut order = active_products.to_vec();
        if self.inputs.options.enable_priority_scheduling {
            order.sort_by(|&a, &b| {
                let pa = &self.inputs.products[a];
                let pb = &self.inputs.products[b];
                (pa.priority.rank(), due_minutes[a], release_minutes[a], &pa.id).cmp(&(
                    pb.priority.rank(),
                    due_minutes[b],
                    release_minutes[b],
                    &pb.id,
                ))
            });
        }
        order
    }

    /// Horizon: generous enough for any feasible schedule, small enough to
    /// keep variable domains tight. The maximum of twice the total minimum
    /// processing load (plus a transfer buffer), the calendar window up to
    /// the latest due date plus slack, and a seven-working-day floor after
    /// the earliest release.
    fn compute_horizon(
        &self,
        timeline: &WorkTimeline<'_>,
        catalog: &RoutingCatalog,
        units: &[WorkUnit],
        release_minutes: &[i64],
        active_products: &[usize],
    ) -> i64 {
        let min_processing_sum: i64 = units
            .iter()
            .map(|unit| {
                let steps = catalog.steps(unit.product());
                match unit.stage_id() {
                    Some(stage_id) => steps
                        .iter()
                        .find(|s| s.stage_id == stage_id)
                        .map_or(0, |step| {
                            catalog.min_processing_minutes(step, unit.quantity(), &self.inputs.lines)
                        }),
                    None => steps
                        .iter()
                        .map(|step| {
                            catalog.min_processing_minutes(step, unit.quantity(), &self.inputs.lines)
                        })
                        .sum(),
                }
            })
            .sum();

        let max_transfer = if self.inputs.options.enable_stage_transfer_time {
            self.inputs.stage_transfers.max_minutes()
        } else {
            0
        } + if self.inputs.options.enable_line_transfer_time {
            self.inputs.line_transfers.max_minutes()
        } else {
            0
        };
        let transfer_buffer = max_transfer * units.len() as i64;

        let earliest_release = active_products
            .iter()
            .map(|&idx| release_minutes[idx])
            .min()
            .unwrap_or(0);
        let latest_due = active_products
            .iter()
            .map(|&idx| self.inputs.products[idx].due)
            .max()
            .unwrap_or(self.inputs.reference);

        let load_bound = earliest_release + 2 * min_processing_sum + transfer_buffer;
        let window_bound = timeline.date_to_minutes(
            latest_due + TimeDelta::days(HORIZON_DUE_SLACK_DAYS),
            None,
        );
        let floor = earliest_release
            + HORIZON_FLOOR_DAYS * self.inputs.calendar.default_shift.working_minutes();

        load_bound.max(window_bound).max(floor)
    }

    /// Post-hoc analysis for a proven-infeasible model: products whose
    /// unsplittable processing floor exceeds their release-to-due window,
    /// and products whose feeder demand no line can hold.
    fn infeasibility_reasons(
        &self,
        catalog: &RoutingCatalog,
        release_minutes: &[i64],
        due_minutes: &[i64],
        active_products: &[usize],
    ) -> Vec<String> {
        let mut reasons = Vec::new();
        let fleet_max_slots = self
            .inputs
            .lines
            .iter()
            .filter(|l| l.active)
            .map(|l| l.max_feeder_slots)
            .max()
            .unwrap_or(0);

        for &product_idx in active_products {
            let product = &self.inputs.products[product_idx];
            let min_required: i64 = catalog
                .steps(product_idx)
                .iter()
                .map(|step| {
                    catalog.min_processing_minutes(step, product.required_qty(), &self.inputs.lines)
                })
                .sum();
            let available = due_minutes[product_idx] - release_minutes[product_idx];
            if min_required > available {
                reasons.push(format!(
                    "product '{}' needs at least {} working minutes but only {} are available between release and due date",
                    product.id, min_required, available
                ));
            }
            if product.feeder_slots_required > fleet_max_slots {
                reasons.push(format!(
                    "product '{}' needs {} feeder slots but the largest line offers {}",
                    product.id, product.feeder_slots_required, fleet_max_slots
                ));
            }
        }

        if reasons.is_empty() {
            reasons.push("the solver proved the model infeasible".to_string());
        }
        reasons
    }
}

/// Stamp the elapsed wall-clock time onto a result.
fn finish(mut result: ScheduleResult, started: Instant) -> ScheduleResult {
    result.solve_time_ms = started.elapsed().as_millis() as u64;
    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(y: i32, m: u32, d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn base_inputs() -> ShopInputs {
        let mut inputs = ShopInputs::new(at(2025, 3, 3));
        inputs.stages.push(Stage::new(1, "Pick & Place", 1));
        inputs.lines.push(Line::new("SMT-1").capability(1, 1.0));
        inputs.products.push(
            Product::new("P1")
                .order_qty(10)
                .release(at(2025, 3, 3))
                .due(at(2025, 3, 21)),
        );
        inputs
    }

    #[test]
    fn missing_stages_is_invalid_input() {
        let mut inputs = base_inputs();
        inputs.stages.clear();

        let result = ShopScheduler::new(inputs).solve(5);
        assert_eq!(result.status, ScheduleStatus::InvalidInput);
        assert!(result.failure_reasons[0].contains("no stages"));
    }

    #[test]
    fn inactive_fleet_is_invalid_input() {
        let mut inputs = base_inputs();
        inputs.lines[0].active = false;

        let result = ShopScheduler::new(inputs).solve(5);
        assert_eq!(result.status, ScheduleStatus::InvalidInput);
        assert!(result.failure_reasons[0].contains("no active lines"));
    }

    #[test]
    fn unsupported_stage_is_invalid_input() {
        let mut inputs = base_inputs();
        inputs.stages.push(Stage::new(2, "AOI", 2));

        let result = ShopScheduler::new(inputs).solve(5);
        assert_eq!(result.status, ScheduleStatus::InvalidInput);
        assert!(result.failure_reasons[0].contains("AOI"));
    }

    #[test]
    fn due_before_release_is_invalid_input() {
        let mut inputs = base_inputs();
        inputs.products[0].due = at(2025, 3, 1);

        let result = ShopScheduler::new(inputs).solve(5);
        assert_eq!(result.status, ScheduleStatus::InvalidInput);
        assert!(result.failure_reasons[0].contains("due date"));
    }

    #[test]
    fn window_without_working_days_is_invalid_input() {
        let mut inputs = base_inputs();
        // Saturday to Sunday: no working time in between
        inputs.products[0].release = at(2025, 3, 8);
        inputs.products[0].due = at(2025, 3, 9);

        let result = ShopScheduler::new(inputs).solve(5);
        assert_eq!(result.status, ScheduleStatus::InvalidInput);
        assert!(result.failure_reasons[0].contains("no working time"));
    }

    #[test]
    fn stock_covered_demand_needs_no_production() {
        let mut inputs = base_inputs();
        inputs.products[0].stock_qty = 10;

        let result = ShopScheduler::new(inputs).solve(5);
        assert_eq!(result.status, ScheduleStatus::NoProductionNeeded);
        assert!(result.tasks.is_empty());
    }

    #[test]
    fn priority_order_puts_critical_first() {
        let mut inputs = base_inputs();
        inputs.products[0].priority = smtplan_core::PriorityTier::Low;
        inputs.products.push(
            Product::new("P2")
                .order_qty(10)
                .priority(smtplan_core::PriorityTier::Critical)
                .release(at(2025, 3, 3))
                .due(at(2025, 3, 21)),
        );

        let scheduler = ShopScheduler::new(inputs);
        let timeline = WorkTimeline::new(
            &scheduler.inputs.calendar,
            scheduler.inputs.reference,
        );
        let release: Vec<i64> = scheduler
            .inputs
            .products
            .iter()
            .map(|p| timeline.date_to_minutes(p.release, None))
            .collect();
        let due: Vec<i64> = scheduler
            .inputs
            .products
            .iter()
            .map(|p| timeline.date_to_minutes(p.due, None))
            .collect();

        let order = scheduler.priority_order(&[0, 1], &release, &due);
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn horizon_never_collapses_below_the_floor() {
        let inputs = base_inputs();
        let scheduler = ShopScheduler::new(inputs);
        let timeline = WorkTimeline::new(
            &scheduler.inputs.calendar,
            scheduler.inputs.reference,
        );
        let stages = scheduler.inputs.stages.clone();
        let catalog = RoutingCatalog::build(
            &stages,
            &scheduler.inputs.lines,
            &scheduler.inputs.products,
            &scheduler.inputs.options,
        )
        .unwrap();
        let units = materialize_units(&scheduler.inputs.products, &[0], &catalog, true);

        let horizon = scheduler.compute_horizon(&timeline, &catalog, &units, &[0], &[0]);
        assert!(horizon >= 7 * 480);
    }
}
