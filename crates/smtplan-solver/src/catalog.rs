//! Routing catalog
//!
//! Resolves every product to an ordered sequence of effective routing steps:
//! either the product's configured routing or a synthesized default that
//! traverses all stages in declared order with a uniform base lead time.
//!
//! Each step carries its effective per-unit lead time
//! (`base × complexity × multiplier + fixed`) and the candidate lines that
//! may run it (active, supporting the stage, and passing the step's
//! allowed-line filter). Processing time on a candidate is
//! `ceil(leadtime × qty ÷ efficiency)`.

use std::collections::HashMap;

use smtplan_core::{Line, Product, ScheduleError, SchedulerOptions, Stage, StageId};

/// Lead time assumed for products without any configured routing,
/// in minutes per unit.
pub const DEFAULT_LEADTIME: f64 = 1.0;

/// One resolved routing step for one product.
#[derive(Clone, Debug)]
pub struct CatalogStep {
    pub stage_id: StageId,
    pub stage_order: u32,
    pub stage_name: String,
    /// Effective lead time in minutes per unit, all factors applied
    pub leadtime: f64,
    /// Candidate lines as indices into the input line slice
    pub candidates: Vec<usize>,
}

/// Resolved routings for all products, indexed like the product slice.
#[derive(Clone, Debug)]
pub struct RoutingCatalog {
    per_product: Vec<Vec<CatalogStep>>,
}

impl RoutingCatalog {
    /// Resolve all products against the stage set and line fleet.
    ///
    /// `stages` must already be sorted by `order`. Fails when a configured
    /// routing references an unknown stage, breaks sequence monotonicity,
    /// or leaves a step with no candidate line.
    pub fn build(
        stages: &[Stage],
        lines: &[Line],
        products: &[Product],
        options: &SchedulerOptions,
    ) -> Result<Self, ScheduleError> {
        let stage_by_id: HashMap<StageId, &Stage> = stages.iter().map(|s| (s.id, s)).collect();

        let mut per_product = Vec::with_capacity(products.len());
        for product in products {
            let routing = if options.enable_custom_routing {
                product.routing.as_ref()
            } else {
                None
            };

            let steps = match routing {
                Some(routing) if !routing.steps.is_empty() => {
                    let mut steps = routing.steps.clone();
                    steps.sort_by_key(|s| s.sequence);
                    let mut last_sequence = None;
                    let mut resolved = Vec::with_capacity(steps.len());
                    for step in &steps {
                        if last_sequence.is_some_and(|prev| step.sequence <= prev) {
                            return Err(ScheduleError::InvalidRouting {
                                product: product.id.clone(),
                                reason: format!(
                                    "step sequences must be strictly increasing (saw {} twice)",
                                    step.sequence
                                ),
                            });
                        }
                        last_sequence = Some(step.sequence);

                        let stage = stage_by_id.get(&step.stage_id).ok_or_else(|| {
                            ScheduleError::InvalidRouting {
                                product: product.id.clone(),
                                reason: format!("unknown stage {}", step.stage_id),
                            }
                        })?;

                        let base = routing
                            .stage_leadtimes
                            .get(&step.stage_id)
                            .copied()
                            .unwrap_or(routing.base_leadtime);
                        let leadtime =
                            base * routing.complexity * step.multiplier + step.fixed_minutes as f64;

                        let candidates = candidate_lines(
                            lines,
                            step.stage_id,
                            step.allowed_lines.as_deref(),
                        );
                        if candidates.is_empty() {
                            return Err(ScheduleError::NoCandidateLine {
                                product: product.id.clone(),
                                stage: step.stage_id,
                            });
                        }

                        resolved.push(CatalogStep {
                            stage_id: step.stage_id,
                            stage_order: stage.order,
                            stage_name: stage.name.clone(),
                            leadtime,
                            candidates,
                        });
                    }
                    resolved
                }
                _ => {
                    // Default routing: every stage in declared order. A
                    // routing without steps still contributes its lead time
                    // and complexity.
                    let (base, complexity) = routing
                        .map_or((DEFAULT_LEADTIME, 1.0), |r| (r.base_leadtime, r.complexity));
                    let mut resolved = Vec::with_capacity(stages.len());
                    for stage in stages {
                        let candidates = candidate_lines(lines, stage.id, None);
                        if candidates.is_empty() {
                            return Err(ScheduleError::NoCandidateLine {
                                product: product.id.clone(),
                                stage: stage.id,
                            });
                        }
                        resolved.push(CatalogStep {
                            stage_id: stage.id,
                            stage_order: stage.order,
                            stage_name: stage.name.clone(),
                            leadtime: base * complexity,
                            candidates,
                        });
                    }
                    resolved
                }
            };

            per_product.push(steps);
        }

        Ok(Self { per_product })
    }

    /// The resolved steps of one product, in routing order.
    pub fn steps(&self, product_idx: usize) -> &[CatalogStep] {
        &self.per_product[product_idx]
    }

    /// The resolved step of one product at a given stage, if routed.
    pub fn step_at(&self, product_idx: usize, stage_id: StageId) -> Option<&CatalogStep> {
        self.per_product[product_idx]
            .iter()
            .find(|s| s.stage_id == stage_id)
    }

    /// Processing minutes for `qty` units of a step on a candidate line.
    ///
    /// Returns `None` when the line is not a candidate for this step.
    pub fn processing_minutes(
        &self,
        step: &CatalogStep,
        qty: u32,
        lines: &[Line],
        line_idx: usize,
    ) -> Option<i64> {
        if !step.candidates.contains(&line_idx) {
            return None;
        }
        let efficiency = lines[line_idx].efficiency_at(step.stage_id)?;
        Some((step.leadtime * f64::from(qty) / efficiency).ceil() as i64)
    }

    /// The cheapest processing time for `qty` units over all candidates.
    pub fn min_processing_minutes(&self, step: &CatalogStep, qty: u32, lines: &[Line]) -> i64 {
        step.candidates
            .iter()
            .filter_map(|&idx| self.processing_minutes(step, qty, lines, idx))
            .min()
            .unwrap_or(0)
    }
}

/// Active lines that support `stage` and pass the allowed-line filter.
fn candidate_lines(lines: &[Line], stage: StageId, allowed: Option<&[String]>) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.active && line.supports(stage))
        .filter(|(_, line)| allowed.map_or(true, |ids| ids.iter().any(|id| *id == line.id)))
        .map(|(idx, _)| idx)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smtplan_core::{Routing, RoutingStep};

    fn stages() -> Vec<Stage> {
        vec![
            Stage::new(1, "Solder Paste", 1),
            Stage::new(2, "Pick & Place", 2),
            Stage::new(3, "Reflow", 3),
        ]
    }

    fn lines() -> Vec<Line> {
        vec![
            Line::new("SMT-1").capability(1, 1.0).capability(2, 1.0).capability(3, 1.0),
            Line::new("SMT-2").capability(2, 0.5),
        ]
    }

    #[test]
    fn default_routing_visits_all_stages_in_order() {
        let products = vec![Product::new("P1").order_qty(10)];
        let catalog =
            RoutingCatalog::build(&stages(), &lines(), &products, &SchedulerOptions::default())
                .unwrap();

        let steps = catalog.steps(0);
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps.iter().map(|s| s.stage_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(steps[0].leadtime, DEFAULT_LEADTIME);
    }

    #[test]
    fn custom_routing_applies_overrides_and_factors() {
        let routing = Routing::new(0.5)
            .complexity(2.0)
            .step(RoutingStep::new(1, 1))
            .step(RoutingStep::new(3, 2).multiplier(3.0).fixed_minutes(7))
            .stage_leadtime(3, 1.0);
        let products = vec![Product::new("P1").order_qty(10).routing(routing)];

        let catalog =
            RoutingCatalog::build(&stages(), &lines(), &products, &SchedulerOptions::default())
                .unwrap();

        let steps = catalog.steps(0);
        assert_eq!(steps.len(), 2);
        // base 0.5 x complexity 2.0 x multiplier 1.0
        assert_eq!(steps[0].leadtime, 1.0);
        // override 1.0 x complexity 2.0 x multiplier 3.0 + fixed 7
        assert_eq!(steps[1].leadtime, 13.0);
    }

    #[test]
    fn custom_routing_disabled_falls_back_to_default() {
        let routing = Routing::new(0.5).step(RoutingStep::new(2, 1));
        let products = vec![Product::new("P1").order_qty(10).routing(routing)];
        let options = SchedulerOptions {
            enable_custom_routing: false,
            ..SchedulerOptions::default()
        };

        let catalog = RoutingCatalog::build(&stages(), &lines(), &products, &options).unwrap();
        assert_eq!(catalog.steps(0).len(), 3);
    }

    #[test]
    fn allowed_line_filter_excludes_lines() {
        let routing = Routing::new(1.0)
            .step(RoutingStep::new(2, 1).allowed_lines(vec!["SMT-2".into()]));
        let products = vec![Product::new("P1").order_qty(10).routing(routing)];

        let catalog =
            RoutingCatalog::build(&stages(), &lines(), &products, &SchedulerOptions::default())
                .unwrap();

        // Only SMT-2 (index 1) remains a candidate
        assert_eq!(catalog.steps(0)[0].candidates, vec![1]);
    }

    #[test]
    fn empty_candidate_set_is_a_structural_error() {
        let routing = Routing::new(1.0)
            .step(RoutingStep::new(1, 1).allowed_lines(vec!["SMT-2".into()]));
        let products = vec![Product::new("P1").order_qty(10).routing(routing)];

        let err =
            RoutingCatalog::build(&stages(), &lines(), &products, &SchedulerOptions::default())
                .unwrap_err();
        assert!(matches!(err, ScheduleError::NoCandidateLine { stage: 1, .. }));
    }

    #[test]
    fn non_monotone_sequences_are_rejected() {
        let routing = Routing::new(1.0)
            .step(RoutingStep::new(1, 1))
            .step(RoutingStep::new(2, 1));
        let products = vec![Product::new("P1").order_qty(10).routing(routing)];

        let err =
            RoutingCatalog::build(&stages(), &lines(), &products, &SchedulerOptions::default())
                .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidRouting { .. }));
    }

    #[test]
    fn processing_time_divides_by_efficiency_and_rounds_up() {
        let products = vec![Product::new("P1").order_qty(10)];
        let catalog =
            RoutingCatalog::build(&stages(), &lines(), &products, &SchedulerOptions::default())
                .unwrap();
        let lines = lines();

        let step = &catalog.steps(0)[1]; // stage 2, supported by both lines
        assert_eq!(catalog.processing_minutes(step, 100, &lines, 0), Some(100));
        // SMT-2 runs stage 2 at half speed
        assert_eq!(catalog.processing_minutes(step, 100, &lines, 1), Some(200));
        assert_eq!(catalog.min_processing_minutes(step, 100, &lines), 100);
    }
}
