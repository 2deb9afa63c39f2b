//! Result decoder
//!
//! Turns the solver's raw line/time assignments back into dated task
//! records and attaches the statistics a planner reads: line utilization,
//! per-stage capacity with bottleneck flags, deadline misses, and
//! changeover counts per (line, stage) track.
//!
//! This is the only component that reaches back into the calendar to
//! convert working minutes to wall-clock dates.

use std::collections::HashMap;

use smtplan_core::{
    CapacityAnalysis, ChangeoverStats, Line, LineTransferMatrix, LineUtilization, MissedDeadline,
    Product, ScheduleError, ScheduledTask, SchedulerOptions, StageId, StageTransferMatrix,
};

use crate::catalog::RoutingCatalog;
use crate::lots::WorkUnit;
use crate::model::RawTask;
use crate::timeline::WorkTimeline;

/// Decoded schedule plus its statistics.
pub(crate) struct Decoded {
    pub tasks: Vec<ScheduledTask>,
    pub missed_deadlines: Vec<MissedDeadline>,
    pub capacity_analyses: Vec<CapacityAnalysis>,
    pub line_utilizations: Vec<LineUtilization>,
    pub changeover_stats: Vec<ChangeoverStats>,
    pub plan_start_minute: i64,
    pub completion_minute: i64,
}

pub(crate) struct DecodeInput<'a> {
    pub lines: &'a [Line],
    pub products: &'a [Product],
    pub catalog: &'a RoutingCatalog,
    pub units: &'a [WorkUnit],
    pub due_minutes: &'a [i64],
    pub stage_transfers: &'a StageTransferMatrix,
    pub line_transfers: &'a LineTransferMatrix,
    pub options: &'a SchedulerOptions,
    pub timeline: &'a WorkTimeline<'a>,
}

pub(crate) fn decode(input: &DecodeInput<'_>, raw: &[RawTask]) -> Result<Decoded, ScheduleError> {
    let mut raw: Vec<RawTask> = raw.to_vec();
    raw.sort_by_key(|t| (t.start, t.line_idx, t.stage_id, t.unit_idx));

    // Lookup from (unit, step position) to the raw task running it, for
    // predecessor resolution
    let by_unit_step: HashMap<(usize, usize), usize> = raw
        .iter()
        .enumerate()
        .map(|(idx, t)| ((t.unit_idx, t.step_pos), idx))
        .collect();

    // Stage-level batch lists per (product, stage), in batch order
    let mut stage_batches: HashMap<(usize, StageId), Vec<usize>> = HashMap::new();
    for (unit_idx, unit) in input.units.iter().enumerate() {
        if let Some(stage_id) = unit.stage_id() {
            stage_batches
                .entry((unit.product(), stage_id))
                .or_default()
                .push(unit_idx);
        }
    }

    // Previous product on each (line, stage) track, in start order
    let mut previous_on_track: Vec<Option<usize>> = vec![None; raw.len()];
    let mut track_last: HashMap<(usize, StageId), usize> = HashMap::new();
    for idx in 0..raw.len() {
        let key = (raw[idx].line_idx, raw[idx].stage_id);
        if let Some(&prev_idx) = track_last.get(&key) {
            previous_on_track[idx] = Some(prev_idx);
        }
        track_last.insert(key, idx);
    }

    let mut tasks = Vec::with_capacity(raw.len());
    for (idx, task) in raw.iter().enumerate() {
        let unit = &input.units[task.unit_idx];
        let product_idx = unit.product();
        let product = &input.products[product_idx];
        let steps = input.catalog.steps(product_idx);
        let step = &steps[task.step_pos];
        let line = &input.lines[task.line_idx];

        // Transfer breakdown against the predecessor interval feeding this
        // one: the previous step of the same product batch, or the
        // corresponding batch at the preceding stage for stage batches
        let predecessor = predecessor_of(input, task, unit, &stage_batches, &by_unit_step, &raw);
        let (stage_transfer_minutes, line_transfer_minutes) = match predecessor {
            None => (0, 0),
            Some(prev) => {
                let stage_minutes = if input.options.enable_stage_transfer_time {
                    input
                        .stage_transfers
                        .minutes(&steps[task.step_pos - 1].stage_id, &step.stage_id)
                } else {
                    0
                };
                let line_minutes = if input.options.enable_line_transfer_time {
                    input
                        .line_transfers
                        .minutes(&input.lines[prev.line_idx].id, &line.id)
                } else {
                    0
                };
                (stage_minutes, line_minutes)
            }
        };

        let previous_product = previous_on_track[idx]
            .map(|prev_idx| input.units[raw[prev_idx].unit_idx].product())
            .map(|p| input.products[p].id.clone());

        tasks.push(ScheduledTask {
            product_id: product.id.clone(),
            display_name: display_name(
                product,
                step.stage_id,
                step.stage_order,
                &step.stage_name,
                input.options,
            ),
            stage_id: step.stage_id,
            stage_order: step.stage_order,
            stage_name: step.stage_name.clone(),
            line_id: line.id.clone(),
            line_name: line.name.clone(),
            quantity: unit.quantity(),
            start_minute: task.start,
            end_minute: task.end,
            start: input.timeline.minutes_to_date(task.start, None)?,
            end: input.timeline.minutes_to_date(task.end, None)?,
            processing_minutes: task.processing,
            stage_transfer_minutes,
            line_transfer_minutes,
            previous_product,
            batch_number: unit.batch(),
            batch_count: unit.batch_count(),
        });
    }

    let plan_start_minute = raw.iter().map(|t| t.start).min().unwrap_or(0);
    let completion_minute = raw.iter().map(|t| t.end).max().unwrap_or(0);
    let plan_start = input.timeline.minutes_to_date(plan_start_minute, None)?;
    let completion = input.timeline.minutes_to_date(completion_minute, None)?;

    let missed_deadlines = missed_deadlines(input, &raw)?;
    let line_utilizations = line_utilizations(input, &tasks, plan_start, completion);
    let capacity_analyses = capacity_analyses(input, &tasks, plan_start, completion);
    let changeover_stats = changeover_stats(input, &tasks);

    Ok(Decoded {
        tasks,
        missed_deadlines,
        capacity_analyses,
        line_utilizations,
        changeover_stats,
        plan_start_minute,
        completion_minute,
    })
}

/// The raw task whose end feeds this task's start across a stage boundary.
fn predecessor_of<'a>(
    input: &DecodeInput<'_>,
    task: &RawTask,
    unit: &WorkUnit,
    stage_batches: &HashMap<(usize, StageId), Vec<usize>>,
    by_unit_step: &HashMap<(usize, usize), usize>,
    raw: &'a [RawTask],
) -> Option<&'a RawTask> {
    if task.step_pos == 0 {
        return None;
    }
    match unit.stage_id() {
        // Product batch: the same unit's previous routing step
        None => by_unit_step
            .get(&(task.unit_idx, task.step_pos - 1))
            .map(|&idx| &raw[idx]),
        // Stage batch: the corresponding batch at the previous stage
        Some(_) => {
            let prev_stage = input.catalog.steps(unit.product())[task.step_pos - 1].stage_id;
            let prev_units = stage_batches.get(&(unit.product(), prev_stage))?;
            let batch_idx = (unit.batch() as usize).saturating_sub(1);
            let corresponding = batch_idx.min(prev_units.len() - 1);
            by_unit_step
                .get(&(prev_units[corresponding], task.step_pos - 1))
                .map(|&idx| &raw[idx])
        }
    }
}

/// Display name of a product at a stage: explicit per-stage name, then the
/// name pattern, then the product name.
fn display_name(
    product: &Product,
    stage_id: StageId,
    stage_order: u32,
    stage_name: &str,
    options: &SchedulerOptions,
) -> String {
    if !options.enable_stage_naming {
        return product.name.clone();
    }
    if let Some(explicit) = product.stage_names.get(&stage_id) {
        return explicit.clone();
    }
    match &product.name_pattern {
        Some(pattern) => pattern
            .replace("{Name}", &product.name)
            .replace("{StageOrder}", &stage_order.to_string())
            .replace("{StageName}", stage_name),
        None => product.name.clone(),
    }
}

/// Products whose last-stage work finished after their due minute.
fn missed_deadlines(
    input: &DecodeInput<'_>,
    raw: &[RawTask],
) -> Result<Vec<MissedDeadline>, ScheduleError> {
    let mut last_end: HashMap<usize, i64> = HashMap::new();
    for task in raw {
        let product_idx = input.units[task.unit_idx].product();
        let last_pos = input.catalog.steps(product_idx).len() - 1;
        if task.step_pos == last_pos {
            let entry = last_end.entry(product_idx).or_insert(task.end);
            *entry = (*entry).max(task.end);
        }
    }

    let mut missed = Vec::new();
    let mut product_indices: Vec<usize> = last_end.keys().copied().collect();
    product_indices.sort_unstable();
    for product_idx in product_indices {
        let end_minute = last_end[&product_idx];
        let due_minute = input.due_minutes[product_idx];
        if end_minute <= due_minute {
            continue;
        }
        let product = &input.products[product_idx];
        let actual_end = input.timeline.minutes_to_date(end_minute, None)?;
        missed.push(MissedDeadline {
            product_id: product.id.clone(),
            due: product.due,
            actual_end,
            delay_minutes: end_minute - due_minute,
            delay_working_days: input.timeline.working_days_between(
                product.due.date(),
                actual_end.date(),
                None,
            ),
        });
    }
    Ok(missed)
}

/// Busy vs available minutes per line over the plan window.
fn line_utilizations(
    input: &DecodeInput<'_>,
    tasks: &[ScheduledTask],
    plan_start: chrono::NaiveDateTime,
    completion: chrono::NaiveDateTime,
) -> Vec<LineUtilization> {
    input
        .lines
        .iter()
        .filter(|line| line.active)
        .map(|line| {
            let busy: i64 = tasks
                .iter()
                .filter(|t| t.line_id == line.id)
                .map(|t| t.processing_minutes + t.stage_transfer_minutes + t.line_transfer_minutes)
                .sum();
            let available = input.timeline.available_minutes_between(
                plan_start,
                completion,
                Some(line.id.as_str()),
            );
            LineUtilization {
                line_id: line.id.clone(),
                line_name: line.name.clone(),
                busy_minutes: busy,
                available_minutes: available,
                utilization: if available > 0 {
                    busy as f64 / available as f64
                } else {
                    0.0
                },
            }
        })
        .collect()
}

/// Required vs available minutes per stage across the supporting fleet.
fn capacity_analyses(
    input: &DecodeInput<'_>,
    tasks: &[ScheduledTask],
    plan_start: chrono::NaiveDateTime,
    completion: chrono::NaiveDateTime,
) -> Vec<CapacityAnalysis> {
    let mut per_stage: HashMap<StageId, (String, i64)> = HashMap::new();
    for task in tasks {
        let entry = per_stage
            .entry(task.stage_id)
            .or_insert_with(|| (task.stage_name.clone(), 0));
        entry.1 += task.processing_minutes;
    }

    let mut stage_ids: Vec<StageId> = per_stage.keys().copied().collect();
    stage_ids.sort_unstable();
    stage_ids
        .into_iter()
        .map(|stage_id| {
            let (stage_name, required) = per_stage[&stage_id].clone();
            let available: i64 = input
                .lines
                .iter()
                .filter(|line| line.active && line.supports(stage_id))
                .map(|line| {
                    input.timeline.available_minutes_between(
                        plan_start,
                        completion,
                        Some(line.id.as_str()),
                    )
                })
                .sum();
            CapacityAnalysis {
                stage_id,
                stage_name,
                required_minutes: required,
                available_minutes: available,
                bottleneck: required > available,
            }
        })
        .collect()
}

/// Product switches per line, summed over its stage tracks.
fn changeover_stats(input: &DecodeInput<'_>, tasks: &[ScheduledTask]) -> Vec<ChangeoverStats> {
    input
        .lines
        .iter()
        .filter(|line| line.active)
        .map(|line| {
            let changeovers = tasks
                .iter()
                .filter(|t| t.line_id == line.id)
                .filter(|t| {
                    t.previous_product
                        .as_ref()
                        .is_some_and(|prev| *prev != t.product_id)
                })
                .count() as u32;
            ChangeoverStats {
                line_id: line.id.clone(),
                changeovers,
            }
        })
        .collect()
}
