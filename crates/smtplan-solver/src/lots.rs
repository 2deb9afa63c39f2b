//! Lot-splitting planner
//!
//! Expands each product into the work units the constraint model schedules.
//! A product either flows as product-level batches (every batch traverses
//! the full routing) or as stage-level batches (each batch belongs to one
//! stage, pipelined against the neighbouring stages). The two modes are
//! mutually exclusive per product within one solve.

use smtplan_core::{LotConfig, LotStrategy, Product, StageId};

use crate::catalog::RoutingCatalog;

/// Upper bound on the auto-strategy batch size.
const AUTO_MAX_BATCH: u32 = 500;

// ============================================================================
// Work units
// ============================================================================

/// An indivisible scheduling atom.
///
/// `ProductBatch` traverses the product's whole routing; `StageBatch` covers
/// exactly one stage. Batch numbers are 1-based and contiguous.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkUnit {
    ProductBatch {
        /// Index into the product slice
        product: usize,
        batch: u32,
        of: u32,
        quantity: u32,
        /// Idle minutes required after the previous batch at the same stage
        min_gap: i64,
    },
    StageBatch {
        product: usize,
        stage_id: StageId,
        batch: u32,
        of: u32,
        quantity: u32,
        min_gap: i64,
    },
}

impl WorkUnit {
    pub fn product(&self) -> usize {
        match self {
            WorkUnit::ProductBatch { product, .. } | WorkUnit::StageBatch { product, .. } => {
                *product
            }
        }
    }

    pub fn quantity(&self) -> u32 {
        match self {
            WorkUnit::ProductBatch { quantity, .. } | WorkUnit::StageBatch { quantity, .. } => {
                *quantity
            }
        }
    }

    /// 1-based batch number within the split.
    pub fn batch(&self) -> u32 {
        match self {
            WorkUnit::ProductBatch { batch, .. } | WorkUnit::StageBatch { batch, .. } => *batch,
        }
    }

    pub fn batch_count(&self) -> u32 {
        match self {
            WorkUnit::ProductBatch { of, .. } | WorkUnit::StageBatch { of, .. } => *of,
        }
    }

    pub fn min_gap(&self) -> i64 {
        match self {
            WorkUnit::ProductBatch { min_gap, .. } | WorkUnit::StageBatch { min_gap, .. } => {
                *min_gap
            }
        }
    }

    /// The stage this unit is pinned to, for stage-level batches.
    pub fn stage_id(&self) -> Option<StageId> {
        match self {
            WorkUnit::ProductBatch { .. } => None,
            WorkUnit::StageBatch { stage_id, .. } => Some(*stage_id),
        }
    }
}

// ============================================================================
// Quantity splitting
// ============================================================================

/// Split `required` units into an ordered list of batch sizes.
///
/// The result is never empty for a positive quantity and always sums to
/// `required`. Splitting is suppressed below the config's
/// `min_qty_to_split` threshold.
pub fn split_quantity(required: u32, config: &LotConfig) -> Vec<u32> {
    if required == 0 {
        return Vec::new();
    }
    if !config.strategy.splits() || required < config.min_qty_to_split {
        return vec![required];
    }

    match config.strategy {
        LotStrategy::None => vec![required],
        LotStrategy::FixedQty(size) => fixed_qty_batches(required, size, config),
        LotStrategy::FixedBatches(count) => near_equal_batches(required, count),
        LotStrategy::Percentage(percent) => {
            let percent = percent.clamp(1, 100);
            let count = (100 + percent - 1) / percent;
            near_equal_batches(required, count)
        }
        LotStrategy::Auto => {
            let size = (required / 4)
                .max(config.min_batch_size.max(1))
                .min(AUTO_MAX_BATCH);
            fixed_qty_batches(required, size, config)
        }
    }
}

/// Repeated batches of `size`; an undersized tail is merged backwards when
/// the config forbids a small last batch.
fn fixed_qty_batches(required: u32, size: u32, config: &LotConfig) -> Vec<u32> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity((required / size + 1) as usize);
    let mut remaining = required;
    while remaining >= size {
        batches.push(size);
        remaining -= size;
    }
    if remaining > 0 {
        if remaining < config.min_batch_size && !config.allow_small_last_batch
            && !batches.is_empty()
        {
            let last = batches.len() - 1;
            batches[last] += remaining;
        } else {
            batches.push(remaining);
        }
    }
    batches
}

/// `count` near-equal batches, the remainder distributed one extra unit per
/// early batch.
fn near_equal_batches(required: u32, count: u32) -> Vec<u32> {
    let count = count.clamp(1, required);
    let base = required / count;
    let extra = required % count;
    (0..count)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

// ============================================================================
// Work unit materialization
// ============================================================================

/// Expand products into work units, in the given product order.
///
/// `product_order` is the priority-sorted sequence of product indices; units
/// of earlier products are emitted first. Products with nothing to produce
/// are skipped.
pub fn materialize_units(
    products: &[Product],
    product_order: &[usize],
    catalog: &RoutingCatalog,
    enable_lot_splitting: bool,
) -> Vec<WorkUnit> {
    let mut units = Vec::new();

    for &product_idx in product_order {
        let product = &products[product_idx];
        let required = product.required_qty();
        if required == 0 {
            continue;
        }

        let steps = catalog.steps(product_idx);
        let stage_level = enable_lot_splitting
            && steps.iter().any(|step| {
                product
                    .stage_lot_configs
                    .get(&step.stage_id)
                    .is_some_and(|c| c.strategy.splits())
            });

        if stage_level {
            for step in steps {
                let config = product
                    .stage_lot_configs
                    .get(&step.stage_id)
                    .copied()
                    .unwrap_or_default();
                let batches = split_quantity(required, &config);
                let of = batches.len() as u32;
                for (i, quantity) in batches.into_iter().enumerate() {
                    units.push(WorkUnit::StageBatch {
                        product: product_idx,
                        stage_id: step.stage_id,
                        batch: i as u32 + 1,
                        of,
                        quantity,
                        min_gap: config.min_gap_minutes,
                    });
                }
            }
        } else {
            let config = product
                .lot_config
                .filter(|_| enable_lot_splitting)
                .unwrap_or_default();
            let batches = split_quantity(required, &config);
            let of = batches.len() as u32;
            for (i, quantity) in batches.into_iter().enumerate() {
                units.push(WorkUnit::ProductBatch {
                    product: product_idx,
                    batch: i as u32 + 1,
                    of,
                    quantity,
                    min_gap: config.min_gap_minutes,
                });
            }
        }
    }

    units
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smtplan_core::{Line, SchedulerOptions, Stage};

    fn config(strategy: LotStrategy) -> LotConfig {
        LotConfig::new(strategy)
    }

    #[test]
    fn no_strategy_yields_one_batch() {
        assert_eq!(split_quantity(100, &config(LotStrategy::None)), vec![100]);
    }

    #[test]
    fn zero_quantity_yields_no_batches() {
        assert_eq!(split_quantity(0, &config(LotStrategy::FixedQty(10))), Vec::<u32>::new());
    }

    #[test]
    fn fixed_qty_splits_with_tail() {
        assert_eq!(
            split_quantity(250, &config(LotStrategy::FixedQty(100))),
            vec![100, 100, 50]
        );
    }

    #[test]
    fn fixed_qty_merges_small_tail_when_forbidden() {
        let cfg = config(LotStrategy::FixedQty(100))
            .min_batch_size(60)
            .merge_small_last_batch();
        assert_eq!(split_quantity(250, &cfg), vec![100, 150]);

        // A tail above min_batch_size survives
        let cfg = config(LotStrategy::FixedQty(100))
            .min_batch_size(40)
            .merge_small_last_batch();
        assert_eq!(split_quantity(250, &cfg), vec![100, 100, 50]);
    }

    #[test]
    fn fixed_batches_distributes_remainder_early() {
        assert_eq!(
            split_quantity(10, &config(LotStrategy::FixedBatches(3))),
            vec![4, 3, 3]
        );
    }

    #[test]
    fn percentage_implies_batch_count() {
        // 30% => ceil(100/30) = 4 near-equal batches
        assert_eq!(
            split_quantity(100, &config(LotStrategy::Percentage(30))),
            vec![25, 25, 25, 25]
        );
    }

    #[test]
    fn auto_derives_batch_size() {
        // 2000/4 = 500, already at the cap
        assert_eq!(
            split_quantity(2000, &config(LotStrategy::Auto)),
            vec![500, 500, 500, 500]
        );
        // 40/4 = 10, below min_batch_size 16
        let cfg = config(LotStrategy::Auto).min_batch_size(16);
        assert_eq!(split_quantity(40, &cfg), vec![16, 16, 8]);
    }

    #[test]
    fn split_suppressed_below_threshold() {
        let cfg = config(LotStrategy::FixedQty(10)).min_qty_to_split(50);
        assert_eq!(split_quantity(49, &cfg), vec![49]);
        assert_eq!(split_quantity(50, &cfg), vec![10, 10, 10, 10, 10]);
    }

    #[test]
    fn batches_always_sum_to_required() {
        let configs = [
            config(LotStrategy::FixedQty(7)),
            config(LotStrategy::FixedBatches(4)),
            config(LotStrategy::Percentage(33)),
            config(LotStrategy::Auto),
        ];
        for cfg in &configs {
            for required in [1u32, 13, 100, 999] {
                let total: u32 = split_quantity(required, cfg).iter().sum();
                assert_eq!(total, required, "strategy {:?} qty {}", cfg.strategy, required);
            }
        }
    }

    // ------------------------------------------------------------------
    // Materialization
    // ------------------------------------------------------------------

    fn two_stage_world() -> (Vec<Stage>, Vec<Line>) {
        let stages = vec![Stage::new(1, "SPI", 1), Stage::new(2, "Reflow", 2)];
        let lines = vec![Line::new("SMT-1").capability(1, 1.0).capability(2, 1.0)];
        (stages, lines)
    }

    #[test]
    fn stage_level_split_emits_units_per_stage_batch() {
        let (stages, lines) = two_stage_world();
        let products = vec![Product::new("P1")
            .order_qty(500)
            .stage_lot_config(1, config(LotStrategy::FixedBatches(2)))
            .stage_lot_config(2, config(LotStrategy::FixedBatches(5)))];
        let catalog =
            RoutingCatalog::build(&stages, &lines, &products, &SchedulerOptions::default())
                .unwrap();

        let units = materialize_units(&products, &[0], &catalog, true);
        assert_eq!(units.len(), 7);
        assert_eq!(
            units
                .iter()
                .filter(|u| u.stage_id() == Some(1))
                .map(WorkUnit::quantity)
                .collect::<Vec<_>>(),
            vec![250, 250]
        );
        assert_eq!(
            units
                .iter()
                .filter(|u| u.stage_id() == Some(2))
                .map(WorkUnit::quantity)
                .collect::<Vec<_>>(),
            vec![100, 100, 100, 100, 100]
        );
    }

    #[test]
    fn stage_split_on_one_stage_still_covers_all_stages() {
        let (stages, lines) = two_stage_world();
        let products = vec![Product::new("P1")
            .order_qty(100)
            .stage_lot_config(2, config(LotStrategy::FixedBatches(2)))];
        let catalog =
            RoutingCatalog::build(&stages, &lines, &products, &SchedulerOptions::default())
                .unwrap();

        let units = materialize_units(&products, &[0], &catalog, true);
        // Stage 1 has no split config: one batch; stage 2 has two
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].stage_id(), Some(1));
        assert_eq!(units[0].quantity(), 100);
    }

    #[test]
    fn product_level_split_emits_routing_spanning_units() {
        let (stages, lines) = two_stage_world();
        let products = vec![Product::new("P1")
            .order_qty(100)
            .lot_config(config(LotStrategy::FixedBatches(2)))];
        let catalog =
            RoutingCatalog::build(&stages, &lines, &products, &SchedulerOptions::default())
                .unwrap();

        let units = materialize_units(&products, &[0], &catalog, true);
        assert_eq!(
            units,
            vec![
                WorkUnit::ProductBatch { product: 0, batch: 1, of: 2, quantity: 50, min_gap: 0 },
                WorkUnit::ProductBatch { product: 0, batch: 2, of: 2, quantity: 50, min_gap: 0 },
            ]
        );
    }

    #[test]
    fn disabling_lot_splitting_collapses_to_single_units() {
        let (stages, lines) = two_stage_world();
        let products = vec![Product::new("P1")
            .order_qty(500)
            .lot_config(config(LotStrategy::FixedBatches(4)))
            .stage_lot_config(1, config(LotStrategy::FixedBatches(2)))];
        let catalog =
            RoutingCatalog::build(&stages, &lines, &products, &SchedulerOptions::default())
                .unwrap();

        let units = materialize_units(&products, &[0], &catalog, false);
        assert_eq!(
            units,
            vec![WorkUnit::ProductBatch { product: 0, batch: 1, of: 1, quantity: 500, min_gap: 0 }]
        );
    }

    #[test]
    fn covered_products_are_skipped() {
        let (stages, lines) = two_stage_world();
        let products = vec![
            Product::new("P1").order_qty(100).stock_qty(100),
            Product::new("P2").order_qty(10),
        ];
        let catalog =
            RoutingCatalog::build(&stages, &lines, &products, &SchedulerOptions::default())
                .unwrap();

        let units = materialize_units(&products, &[0, 1], &catalog, true);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].product(), 1);
    }
}
