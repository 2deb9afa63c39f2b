//! Constraint model builder
//!
//! Compiles work units, routings, transfer matrices and the working-minutes
//! axis into a pumpkin constraint model and decodes the solver's variable
//! assignment back into raw line/time assignments.
//!
//! # Encoding
//!
//! Per (work unit, routing step, candidate line) the model carries a start
//! variable, an end variable, and a 0/1 assignment variable; exactly one
//! line is assigned per (unit, step). Optional-interval semantics are
//! emulated with big-M conditionals gated on the assignment variable, with
//! `M` equal to the horizon:
//!
//! - duration: `end = start + processing` (unconditional; an unassigned
//!   interval floats harmlessly)
//! - release: `start >= release x assigned`
//! - aggregation: `stage_start`/`stage_end` equal the assigned candidate's
//!   start/end
//! - no-overlap: every pair of intervals on the same (line, stage) track is
//!   ordered by a 0/1 sequencing variable when both are assigned
//!
//! Every constraint is a linear `greater_than_or_equals` over scaled views;
//! equalities are posted as two opposing inequalities. The makespan is a
//! variable lower-bounded by every unit's last stage end and minimized with
//! a linear SAT-UNSAT search under the caller's time budget.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use pumpkin_solver::constraints as cp;
use pumpkin_solver::optimisation::linear_sat_unsat::LinearSatUnsat;
use pumpkin_solver::optimisation::OptimisationDirection;
use pumpkin_solver::results::{OptimisationResult, ProblemSolution};
use pumpkin_solver::termination::TimeBudget;
use pumpkin_solver::variables::{DomainId, TransformableVariable};
use pumpkin_solver::Solver;

use smtplan_core::{
    Line, LineTransferMatrix, Product, ScheduleError, SchedulerOptions, StageId,
    StageTransferMatrix,
};

use crate::catalog::RoutingCatalog;
use crate::lots::WorkUnit;

/// Horizon ceiling keeping big-M linear terms far from `i32` overflow.
const MAX_HORIZON: i64 = 100_000_000;

// ============================================================================
// Inputs and outputs
// ============================================================================

/// Everything the builder needs, indexed by product/line position.
pub(crate) struct ModelInput<'a> {
    pub lines: &'a [Line],
    pub products: &'a [Product],
    pub catalog: &'a RoutingCatalog,
    pub units: &'a [WorkUnit],
    /// Release minute per product (indexed like `products`)
    pub release_minutes: &'a [i64],
    /// Due minute per product (indexed like `products`)
    pub due_minutes: &'a [i64],
    pub stage_transfers: &'a StageTransferMatrix,
    pub line_transfers: &'a LineTransferMatrix,
    pub options: &'a SchedulerOptions,
    pub horizon: i64,
}

/// Solver-facing status of one solve attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CpStatus {
    /// Makespan proven optimal
    Optimal,
    /// Solution found, optimality not proven within the budget
    Feasible,
    /// Proven unsatisfiable
    Infeasible,
    /// Budget exhausted without any solution
    Unknown,
}

/// One assigned interval read back from the solution.
#[derive(Clone, Debug)]
pub(crate) struct RawTask {
    pub unit_idx: usize,
    /// Position of the stage in the product's routing
    pub step_pos: usize,
    pub stage_id: StageId,
    pub line_idx: usize,
    pub start: i64,
    pub end: i64,
    pub processing: i64,
}

pub(crate) struct SolveOutcome {
    pub status: CpStatus,
    pub makespan: Option<i64>,
    pub tasks: Vec<RawTask>,
    pub solve_time: Duration,
}

// ============================================================================
// Variable bookkeeping
// ============================================================================

struct CandidateVars {
    line_idx: usize,
    start: DomainId,
    end: DomainId,
    assigned: DomainId,
    processing: i64,
}

struct StageVars {
    stage_id: StageId,
    /// Position of this stage in the product routing
    step_pos: usize,
    stage_start: DomainId,
    stage_end: DomainId,
    candidates: Vec<CandidateVars>,
}

struct UnitVars {
    stages: Vec<StageVars>,
}

/// A built, not yet solved, constraint model.
pub(crate) struct CpModel {
    solver: Solver,
    makespan: DomainId,
    units: Vec<UnitVars>,
}

// ============================================================================
// Posting helpers
// ============================================================================

/// Post `sum(coeff x var) >= rhs`.
fn post_ge(solver: &mut Solver, terms: &[(DomainId, i32)], rhs: i32) {
    let tag = solver.new_constraint_tag();
    let scaled: Vec<_> = terms
        .iter()
        .filter(|&&(_, coeff)| coeff != 0)
        .map(|&(var, coeff)| var.scaled(coeff))
        .collect();
    let _ = solver
        .add_constraint(cp::greater_than_or_equals(scaled, rhs, tag))
        .post();
}

/// Post `sum(coeff x var) <= rhs` by negating the inequality.
fn post_le(solver: &mut Solver, terms: &[(DomainId, i32)], rhs: i32) {
    let negated: Vec<_> = terms.iter().map(|&(var, coeff)| (var, -coeff)).collect();
    post_ge(solver, &negated, -rhs);
}

/// Post `sum(coeff x var) = rhs` as two opposing inequalities.
fn post_eq(solver: &mut Solver, terms: &[(DomainId, i32)], rhs: i32) {
    post_ge(solver, terms, rhs);
    post_le(solver, terms, rhs);
}

// ============================================================================
// Build
// ============================================================================

impl CpModel {
    pub fn build(input: &ModelInput<'_>) -> Result<Self, ScheduleError> {
        if input.horizon <= 0 || input.horizon > MAX_HORIZON {
            return Err(ScheduleError::Internal(format!(
                "horizon {} outside supported range",
                input.horizon
            )));
        }
        let horizon = input.horizon as i32;
        let big_m = horizon;

        let mut solver = Solver::default();
        let mut units: Vec<UnitVars> = Vec::with_capacity(input.units.len());

        // ────────────────────────────────────────────────────────────────
        // Variables: one optional interval per (unit, step, candidate line)
        // ────────────────────────────────────────────────────────────────
        for unit in input.units {
            let product_idx = unit.product();
            let product = &input.products[product_idx];
            let steps = input.catalog.steps(product_idx);
            let release = input.release_minutes[product_idx] as i32;

            let step_positions: Vec<usize> = match unit.stage_id() {
                // Stage batches cover exactly one routing step
                Some(stage_id) => {
                    let pos = steps.iter().position(|s| s.stage_id == stage_id).ok_or(
                        ScheduleError::NoCandidateLine {
                            product: product.id.clone(),
                            stage: stage_id,
                        },
                    )?;
                    vec![pos]
                }
                // Product batches traverse the whole routing
                None => (0..steps.len()).collect(),
            };

            let mut stage_vars = Vec::with_capacity(step_positions.len());
            for pos in step_positions {
                let step = &steps[pos];

                let stage_start = solver.new_bounded_integer(0, horizon);
                let stage_end = solver.new_bounded_integer(0, horizon);
                post_ge(&mut solver, &[(stage_start, 1)], release);

                let mut candidates = Vec::with_capacity(step.candidates.len());
                for &line_idx in &step.candidates {
                    let Some(processing) = input.catalog.processing_minutes(
                        step,
                        unit.quantity(),
                        input.lines,
                        line_idx,
                    ) else {
                        continue;
                    };
                    if processing > input.horizon {
                        // The interval can never fit; leaving the candidate
                        // out keeps the exactly-one constraint honest.
                        continue;
                    }

                    let start = solver.new_bounded_integer(0, horizon);
                    let end = solver.new_bounded_integer(0, horizon);
                    let assigned = solver.new_bounded_integer(0, 1);

                    // end = start + processing
                    post_eq(&mut solver, &[(end, 1), (start, -1)], processing as i32);
                    // start >= release x assigned
                    post_ge(&mut solver, &[(start, 1), (assigned, -release)], 0);

                    // stage_start/stage_end mirror the assigned candidate
                    post_ge(
                        &mut solver,
                        &[(stage_start, 1), (start, -1), (assigned, -big_m)],
                        -big_m,
                    );
                    post_le(
                        &mut solver,
                        &[(stage_start, 1), (start, -1), (assigned, big_m)],
                        big_m,
                    );
                    post_ge(
                        &mut solver,
                        &[(stage_end, 1), (end, -1), (assigned, -big_m)],
                        -big_m,
                    );
                    post_le(
                        &mut solver,
                        &[(stage_end, 1), (end, -1), (assigned, big_m)],
                        big_m,
                    );

                    candidates.push(CandidateVars {
                        line_idx,
                        start,
                        end,
                        assigned,
                        processing,
                    });
                }

                if candidates.is_empty() {
                    return Err(ScheduleError::NoCandidateLine {
                        product: product.id.clone(),
                        stage: step.stage_id,
                    });
                }

                // Exactly one line per (unit, step)
                let assignment_terms: Vec<(DomainId, i32)> =
                    candidates.iter().map(|c| (c.assigned, 1)).collect();
                post_eq(&mut solver, &assignment_terms, 1);

                stage_vars.push(StageVars {
                    stage_id: step.stage_id,
                    step_pos: pos,
                    stage_start,
                    stage_end,
                    candidates,
                });
            }

            units.push(UnitVars { stages: stage_vars });
        }

        // ────────────────────────────────────────────────────────────────
        // Precedence within a product batch's own routing
        // ────────────────────────────────────────────────────────────────
        for (unit_idx, unit) in input.units.iter().enumerate() {
            if unit.stage_id().is_some() {
                continue;
            }
            let vars = &units[unit_idx];
            for pair in 1..vars.stages.len() {
                let prev = &vars.stages[pair - 1];
                let next = &vars.stages[pair];
                let t_stage = stage_transfer(input, prev.stage_id, next.stage_id);

                post_ge(
                    &mut solver,
                    &[(next.stage_start, 1), (prev.stage_end, -1)],
                    t_stage as i32,
                );
                post_line_transfer_pairs(&mut solver, input, prev, next, t_stage, big_m);
            }
        }

        // ────────────────────────────────────────────────────────────────
        // Lot-split ordering and pipelining
        // ────────────────────────────────────────────────────────────────
        let mut stage_batches: BTreeMap<(usize, StageId), Vec<usize>> = BTreeMap::new();
        let mut product_batches: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (unit_idx, unit) in input.units.iter().enumerate() {
            match unit.stage_id() {
                Some(stage_id) => stage_batches
                    .entry((unit.product(), stage_id))
                    .or_default()
                    .push(unit_idx),
                None => product_batches.entry(unit.product()).or_default().push(unit_idx),
            }
        }

        // Intra-stage order: batch b starts after batch b-1 ends plus gap
        for batch_units in stage_batches.values() {
            for pair in batch_units.windows(2) {
                let gap = input.units[pair[1]].min_gap() as i32;
                let prev = &units[pair[0]].stages[0];
                let next = &units[pair[1]].stages[0];
                post_ge(
                    &mut solver,
                    &[(next.stage_start, 1), (prev.stage_end, -1)],
                    gap,
                );
            }
        }

        // Pipeline across stages: batch b waits for the corresponding batch
        // min(b, N_prev) of the preceding stage
        let mut split_products: Vec<usize> = stage_batches.keys().map(|&(p, _)| p).collect();
        split_products.sort_unstable();
        split_products.dedup();
        for product_idx in split_products {
            let steps = input.catalog.steps(product_idx);
            for pos in 1..steps.len() {
                let prev_key = (product_idx, steps[pos - 1].stage_id);
                let next_key = (product_idx, steps[pos].stage_id);
                let (Some(prev_units), Some(next_units)) =
                    (stage_batches.get(&prev_key), stage_batches.get(&next_key))
                else {
                    continue;
                };
                let t_stage = stage_transfer(input, steps[pos - 1].stage_id, steps[pos].stage_id);

                for (b_idx, &next_idx) in next_units.iter().enumerate() {
                    let corresponding = b_idx.min(prev_units.len() - 1);
                    let prev_idx = prev_units[corresponding];
                    let prev = &units[prev_idx].stages[0];
                    let next = &units[next_idx].stages[0];

                    post_ge(
                        &mut solver,
                        &[(next.stage_start, 1), (prev.stage_end, -1)],
                        t_stage as i32,
                    );
                    post_line_transfer_pairs(&mut solver, input, prev, next, t_stage, big_m);
                }
            }
        }

        // Product-level batches serialize per stage: batch b at stage s
        // waits for batch b-1 at the same stage
        for batch_units in product_batches.values() {
            for pair in batch_units.windows(2) {
                let gap = input.units[pair[1]].min_gap() as i32;
                let prev_stages = &units[pair[0]].stages;
                let next_stages = &units[pair[1]].stages;
                for (prev, next) in prev_stages.iter().zip(next_stages.iter()) {
                    post_ge(
                        &mut solver,
                        &[(next.stage_start, 1), (prev.stage_end, -1)],
                        gap,
                    );
                }
            }
        }

        // ────────────────────────────────────────────────────────────────
        // No overlap per (line, stage) track
        // ────────────────────────────────────────────────────────────────
        let mut tracks: BTreeMap<(usize, StageId), Vec<(DomainId, DomainId, DomainId)>> =
            BTreeMap::new();
        for unit_vars in &units {
            for stage in &unit_vars.stages {
                for candidate in &stage.candidates {
                    tracks
                        .entry((candidate.line_idx, stage.stage_id))
                        .or_default()
                        .push((candidate.start, candidate.end, candidate.assigned));
                }
            }
        }
        for intervals in tracks.values() {
            for i in 0..intervals.len() {
                for j in (i + 1)..intervals.len() {
                    let (start_i, end_i, assigned_i) = intervals[i];
                    let (start_j, end_j, assigned_j) = intervals[j];
                    let before = solver.new_bounded_integer(0, 1);

                    // before = 1 and both assigned: i runs first
                    post_ge(
                        &mut solver,
                        &[
                            (start_j, 1),
                            (end_i, -1),
                            (before, -big_m),
                            (assigned_i, -big_m),
                            (assigned_j, -big_m),
                        ],
                        -3 * big_m,
                    );
                    // before = 0 and both assigned: j runs first
                    post_ge(
                        &mut solver,
                        &[
                            (start_i, 1),
                            (end_j, -1),
                            (before, big_m),
                            (assigned_i, -big_m),
                            (assigned_j, -big_m),
                        ],
                        -2 * big_m,
                    );
                }
            }
        }

        // ────────────────────────────────────────────────────────────────
        // Deadlines and objective
        // ────────────────────────────────────────────────────────────────
        let makespan = solver.new_bounded_integer(0, horizon);

        if input.options.use_hard_deadline_constraint {
            for (unit_idx, unit) in input.units.iter().enumerate() {
                let due = input.due_minutes[unit.product()].min(input.horizon) as i32;
                if let Some(last) = units[unit_idx].stages.last() {
                    post_le(&mut solver, &[(last.stage_end, 1)], due);
                }
            }
        }

        for unit_vars in &units {
            if let Some(last) = unit_vars.stages.last() {
                post_ge(&mut solver, &[(makespan, 1), (last.stage_end, -1)], 0);
            }
        }

        Ok(Self {
            solver,
            makespan,
            units,
        })
    }

    /// Minimize the makespan within the wall-clock budget.
    pub fn solve(mut self, budget: Duration) -> SolveOutcome {
        let started = Instant::now();

        let mut brancher = self.solver.default_brancher();
        let mut termination = TimeBudget::starting_now(budget);

        fn noop_callback<B>(_: &Solver, _: pumpkin_solver::results::SolutionReference, _: &B) {}
        let result = self.solver.optimise(
            &mut brancher,
            &mut termination,
            LinearSatUnsat::new(OptimisationDirection::Minimise, self.makespan, noop_callback),
        );

        let (status, solution) = match result {
            OptimisationResult::Optimal(solution) => (CpStatus::Optimal, Some(solution)),
            OptimisationResult::Satisfiable(solution) => (CpStatus::Feasible, Some(solution)),
            OptimisationResult::Unsatisfiable => (CpStatus::Infeasible, None),
            OptimisationResult::Unknown => (CpStatus::Unknown, None),
        };

        let (makespan, tasks) = match solution {
            None => (None, Vec::new()),
            Some(solution) => {
                let mut tasks = Vec::new();
                for (unit_idx, unit_vars) in self.units.iter().enumerate() {
                    for stage in &unit_vars.stages {
                        for candidate in &stage.candidates {
                            if solution.get_integer_value(candidate.assigned) != 1 {
                                continue;
                            }
                            tasks.push(RawTask {
                                unit_idx,
                                step_pos: stage.step_pos,
                                stage_id: stage.stage_id,
                                line_idx: candidate.line_idx,
                                start: i64::from(solution.get_integer_value(candidate.start)),
                                end: i64::from(solution.get_integer_value(candidate.end)),
                                processing: candidate.processing,
                            });
                        }
                    }
                }
                let makespan = i64::from(solution.get_integer_value(self.makespan));
                (Some(makespan), tasks)
            }
        };

        SolveOutcome {
            status,
            makespan,
            tasks,
            solve_time: started.elapsed(),
        }
    }
}

/// Stage transfer minutes honoring the feature flag.
fn stage_transfer(input: &ModelInput<'_>, from: StageId, to: StageId) -> i64 {
    if input.options.enable_stage_transfer_time {
        input.stage_transfers.minutes(&from, &to)
    } else {
        0
    }
}

/// Gate the line-to-line transfer delay on the concrete line pair chosen for
/// two consecutive stages: for every (previous candidate, next candidate)
/// pair with a positive transfer, require
/// `next.start >= prev.end + t_stage + t_line` when both are assigned.
fn post_line_transfer_pairs(
    solver: &mut Solver,
    input: &ModelInput<'_>,
    prev: &StageVars,
    next: &StageVars,
    t_stage: i64,
    big_m: i32,
) {
    if !input.options.enable_line_transfer_time {
        return;
    }
    for prev_candidate in &prev.candidates {
        for next_candidate in &next.candidates {
            let t_line = input.line_transfers.minutes(
                &input.lines[prev_candidate.line_idx].id,
                &input.lines[next_candidate.line_idx].id,
            );
            if t_line <= 0 {
                continue;
            }
            post_ge(
                solver,
                &[
                    (next_candidate.start, 1),
                    (prev_candidate.end, -1),
                    (prev_candidate.assigned, -big_m),
                    (next_candidate.assigned, -big_m),
                ],
                (t_stage + t_line) as i32 - 2 * big_m,
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use smtplan_core::{Line, Product, Stage};

    use crate::lots::materialize_units;

    /// Minimal end-to-end model exercise: two stages on one line, one
    /// product, no transfers. Precedence forces the stages back to back.
    #[test]
    fn tiny_model_solves_sequentially() {
        let stages = vec![Stage::new(1, "A", 1), Stage::new(2, "B", 2)];
        let lines = vec![Line::new("L1").capability(1, 1.0).capability(2, 1.0)];
        let products = vec![Product::new("P1").order_qty(60)];
        let options = SchedulerOptions::default();
        let catalog = RoutingCatalog::build(&stages, &lines, &products, &options).unwrap();
        let units = materialize_units(&products, &[0], &catalog, true);

        let release = vec![0];
        let due = vec![10_000];
        let stage_transfers = StageTransferMatrix::zero();
        let line_transfers = LineTransferMatrix::zero();
        let input = ModelInput {
            lines: &lines,
            products: &products,
            catalog: &catalog,
            units: &units,
            release_minutes: &release,
            due_minutes: &due,
            stage_transfers: &stage_transfers,
            line_transfers: &line_transfers,
            options: &options,
            horizon: 10_000,
        };

        let model = CpModel::build(&input).unwrap();
        let outcome = model.solve(Duration::from_secs(10));

        assert_eq!(outcome.status, CpStatus::Optimal);
        // 60 units at 1.0 min/unit per stage, stages in sequence
        assert_eq!(outcome.makespan, Some(120));
        assert_eq!(outcome.tasks.len(), 2);
    }

    #[test]
    fn release_pushes_the_start() {
        let stages = vec![Stage::new(1, "A", 1)];
        let lines = vec![Line::new("L1").capability(1, 1.0)];
        let products = vec![Product::new("P1").order_qty(30)];
        let options = SchedulerOptions::default();
        let catalog = RoutingCatalog::build(&stages, &lines, &products, &options).unwrap();
        let units = materialize_units(&products, &[0], &catalog, true);

        let release = vec![500];
        let due = vec![10_000];
        let stage_transfers = StageTransferMatrix::zero();
        let line_transfers = LineTransferMatrix::zero();
        let input = ModelInput {
            lines: &lines,
            products: &products,
            catalog: &catalog,
            units: &units,
            release_minutes: &release,
            due_minutes: &due,
            stage_transfers: &stage_transfers,
            line_transfers: &line_transfers,
            options: &options,
            horizon: 10_000,
        };

        let outcome = CpModel::build(&input).unwrap().solve(Duration::from_secs(10));
        assert_eq!(outcome.status, CpStatus::Optimal);
        assert_eq!(outcome.tasks[0].start, 500);
        assert_eq!(outcome.makespan, Some(530));
    }

    #[test]
    fn impossible_hard_deadline_is_infeasible() {
        let stages = vec![Stage::new(1, "A", 1)];
        let lines = vec![Line::new("L1").capability(1, 1.0)];
        let products = vec![Product::new("P1").order_qty(1000)];
        let options = SchedulerOptions {
            use_hard_deadline_constraint: true,
            ..SchedulerOptions::default()
        };
        let catalog = RoutingCatalog::build(&stages, &lines, &products, &options).unwrap();
        let units = materialize_units(&products, &[0], &catalog, true);

        let release = vec![0];
        let due = vec![480];
        let stage_transfers = StageTransferMatrix::zero();
        let line_transfers = LineTransferMatrix::zero();
        let input = ModelInput {
            lines: &lines,
            products: &products,
            catalog: &catalog,
            units: &units,
            release_minutes: &release,
            due_minutes: &due,
            stage_transfers: &stage_transfers,
            line_transfers: &line_transfers,
            options: &options,
            horizon: 10_000,
        };

        let outcome = CpModel::build(&input).unwrap().solve(Duration::from_secs(10));
        assert_eq!(outcome.status, CpStatus::Infeasible);
        assert!(outcome.tasks.is_empty());
    }

    #[test]
    fn horizon_out_of_range_is_internal_error() {
        let stages = vec![Stage::new(1, "A", 1)];
        let lines = vec![Line::new("L1").capability(1, 1.0)];
        let products = vec![Product::new("P1").order_qty(1)];
        let options = SchedulerOptions::default();
        let catalog = RoutingCatalog::build(&stages, &lines, &products, &options).unwrap();
        let units = materialize_units(&products, &[0], &catalog, true);

        let release = vec![0];
        let due = vec![100];
        let stage_transfers = StageTransferMatrix::zero();
        let line_transfers = LineTransferMatrix::zero();
        let input = ModelInput {
            lines: &lines,
            products: &products,
            catalog: &catalog,
            units: &units,
            release_minutes: &release,
            due_minutes: &due,
            stage_transfers: &stage_transfers,
            line_transfers: &line_transfers,
            options: &options,
            horizon: MAX_HORIZON + 1,
        };

        assert!(matches!(
            CpModel::build(&input),
            Err(ScheduleError::Internal(_))
        ));
    }
}
