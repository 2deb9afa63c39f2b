//! # smtplan-core
//!
//! Core domain model for the smtplan SMT assembly shop scheduling engine.
//!
//! This crate provides:
//! - Domain types: `Stage`, `Line`, `Product`, `Routing`, `LotConfig`,
//!   `ShopCalendar`, `TransferMatrix`
//! - Result types: `ScheduleResult`, `ScheduledTask` and its statistics
//! - The shared `ScheduleError` type
//!
//! ## Example
//!
//! ```rust
//! use smtplan_core::{Line, Product, Stage};
//! use chrono::NaiveDate;
//!
//! let stages = vec![Stage::new(1, "Solder Paste", 1), Stage::new(2, "Reflow", 2)];
//! let line = Line::new("SMT-1").capability(1, 1.0).capability(2, 1.0);
//!
//! let release = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let due = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let product = Product::new("PCB-100").order_qty(250).release(release).due(due);
//!
//! assert!(line.supports(1));
//! assert_eq!(product.required_qty(), 250);
//! assert_eq!(stages[0].order, 1);
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

pub mod calendar;
pub mod result;

pub use calendar::{Holiday, Shift, ShopCalendar, TimeRange};
pub use result::{
    CapacityAnalysis, ChangeoverStats, LineUtilization, MissedDeadline, ScheduleResult,
    ScheduleStatus, ScheduledTask, Warning, WarningCode,
};

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier for a production stage
pub type StageId = u32;

/// Unique identifier for a production line
pub type LineId = String;

/// Unique identifier for a product
pub type ProductId = String;

// ============================================================================
// Stage
// ============================================================================

/// A production step in the SMT process (e.g. Solder Paste, Pick & Place,
/// Reflow, AOI). Stage `order` defines the traversal sequence and must be
/// strictly monotone across the declared set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    /// Presentation and traversal order, strictly increasing across stages
    pub order: u32,
}

impl Stage {
    pub fn new(id: StageId, name: impl Into<String>, order: u32) -> Self {
        Self {
            id,
            name: name.into(),
            order,
        }
    }
}

// ============================================================================
// Line
// ============================================================================

/// Efficiency bounds for a stage capability.
pub const MIN_EFFICIENCY: f64 = 0.1;
pub const MAX_EFFICIENCY: f64 = 1.5;

/// A line's ability to run one stage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageCapability {
    pub enabled: bool,
    /// Relative speed factor; clamped into `[0.1, 1.5]` when read
    pub efficiency: f64,
}

impl StageCapability {
    pub fn new(efficiency: f64) -> Self {
        Self {
            enabled: true,
            efficiency,
        }
    }

    /// Efficiency clamped into the supported range.
    pub fn effective_efficiency(&self) -> f64 {
        self.efficiency.clamp(MIN_EFFICIENCY, MAX_EFFICIENCY)
    }
}

/// A physical assembly line supporting one or more stages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub name: String,
    /// Inactive lines are excluded from scheduling entirely
    pub active: bool,
    /// Feeder slot capacity of the line's placement machines
    pub max_feeder_slots: u32,
    /// Per-stage capabilities keyed by stage id
    pub capabilities: HashMap<StageId, StageCapability>,
}

impl Line {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            active: true,
            max_feeder_slots: 0,
            capabilities: HashMap::new(),
        }
    }

    /// Set the display name (builder pattern)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Mark the line inactive (builder pattern)
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Set the feeder slot capacity (builder pattern)
    pub fn feeder_slots(mut self, slots: u32) -> Self {
        self.max_feeder_slots = slots;
        self
    }

    /// Enable a stage capability with the given efficiency (builder pattern)
    pub fn capability(mut self, stage: StageId, efficiency: f64) -> Self {
        self.capabilities
            .insert(stage, StageCapability::new(efficiency));
        self
    }

    /// A stage is supported iff an enabled capability entry exists.
    pub fn supports(&self, stage: StageId) -> bool {
        self.capabilities.get(&stage).is_some_and(|c| c.enabled)
    }

    /// Clamped efficiency at a stage, if supported.
    pub fn efficiency_at(&self, stage: StageId) -> Option<f64> {
        self.capabilities
            .get(&stage)
            .filter(|c| c.enabled)
            .map(StageCapability::effective_efficiency)
    }
}

// ============================================================================
// Priority
// ============================================================================

/// Ordering priority tier for a product.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriorityTier {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl PriorityTier {
    /// Rank used in the composite ordering key; lower schedules earlier.
    pub fn rank(&self) -> u8 {
        match self {
            PriorityTier::Critical => 0,
            PriorityTier::High => 1,
            PriorityTier::Normal => 2,
            PriorityTier::Low => 3,
        }
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityTier::Critical => write!(f, "Critical"),
            PriorityTier::High => write!(f, "High"),
            PriorityTier::Normal => write!(f, "Normal"),
            PriorityTier::Low => write!(f, "Low"),
        }
    }
}

// ============================================================================
// Lot splitting configuration
// ============================================================================

/// Strategy for dividing a quantity into batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotStrategy {
    /// One batch of the full quantity
    #[default]
    None,
    /// Repeated batches of the given size
    FixedQty(u32),
    /// A fixed number of near-equal batches
    FixedBatches(u32),
    /// Batches of roughly the given percentage of the quantity
    Percentage(u32),
    /// Batch size derived from the quantity, clamped to sane bounds
    Auto,
}

impl LotStrategy {
    /// Does this strategy actually split?
    pub fn splits(&self) -> bool {
        !matches!(self, LotStrategy::None)
    }
}

/// Lot-splitting configuration for a product or a (product, stage) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotConfig {
    pub strategy: LotStrategy,
    /// Quantities below this threshold are never split
    pub min_qty_to_split: u32,
    /// Smallest batch the shop will run
    pub min_batch_size: u32,
    /// Idle minutes required between consecutive batches at the same stage
    pub min_gap_minutes: i64,
    /// Keep an undersized tail batch instead of merging it backwards
    pub allow_small_last_batch: bool,
}

impl Default for LotConfig {
    fn default() -> Self {
        Self {
            strategy: LotStrategy::None,
            min_qty_to_split: 0,
            min_batch_size: 1,
            min_gap_minutes: 0,
            allow_small_last_batch: true,
        }
    }
}

impl LotConfig {
    pub fn new(strategy: LotStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Set the split threshold (builder pattern)
    pub fn min_qty_to_split(mut self, qty: u32) -> Self {
        self.min_qty_to_split = qty;
        self
    }

    /// Set the smallest allowed batch (builder pattern)
    pub fn min_batch_size(mut self, qty: u32) -> Self {
        self.min_batch_size = qty;
        self
    }

    /// Set the inter-batch gap in minutes (builder pattern)
    pub fn min_gap_minutes(mut self, minutes: i64) -> Self {
        self.min_gap_minutes = minutes;
        self
    }

    /// Forbid an undersized tail batch (builder pattern)
    pub fn merge_small_last_batch(mut self) -> Self {
        self.allow_small_last_batch = false;
        self
    }
}

// ============================================================================
// Routing
// ============================================================================

/// One step of a product's routing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingStep {
    pub stage_id: StageId,
    /// Position in the routing; strictly increasing across steps
    pub sequence: u32,
    /// Lines this step may run on; `None` = any supporting line
    pub allowed_lines: Option<Vec<LineId>>,
    /// Multiplier applied to the effective lead time
    pub multiplier: f64,
    /// Fixed setup minutes added once per batch
    pub fixed_minutes: i64,
}

impl RoutingStep {
    pub fn new(stage_id: StageId, sequence: u32) -> Self {
        Self {
            stage_id,
            sequence,
            allowed_lines: None,
            multiplier: 1.0,
            fixed_minutes: 0,
        }
    }

    /// Restrict the step to specific lines (builder pattern)
    pub fn allowed_lines(mut self, lines: Vec<LineId>) -> Self {
        self.allowed_lines = Some(lines);
        self
    }

    /// Set the lead-time multiplier (builder pattern)
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the fixed setup minutes (builder pattern)
    pub fn fixed_minutes(mut self, minutes: i64) -> Self {
        self.fixed_minutes = minutes;
        self
    }
}

/// A product's route through the stages, with per-stage lead times.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Routing {
    /// Ordered steps; sequences strictly increasing
    pub steps: Vec<RoutingStep>,
    /// Base lead time in minutes per unit
    pub base_leadtime: f64,
    /// Product complexity factor applied to the base lead time
    pub complexity: f64,
    /// Per-stage lead-time overrides (replace `base_leadtime` when present)
    pub stage_leadtimes: HashMap<StageId, f64>,
}

impl Routing {
    pub fn new(base_leadtime: f64) -> Self {
        Self {
            steps: Vec::new(),
            base_leadtime,
            complexity: 1.0,
            stage_leadtimes: HashMap::new(),
        }
    }

    /// Append a routing step (builder pattern)
    pub fn step(mut self, step: RoutingStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the complexity factor (builder pattern)
    pub fn complexity(mut self, complexity: f64) -> Self {
        self.complexity = complexity;
        self
    }

    /// Override the lead time for one stage (builder pattern)
    pub fn stage_leadtime(mut self, stage: StageId, minutes_per_unit: f64) -> Self {
        self.stage_leadtimes.insert(stage, minutes_per_unit);
        self
    }
}

// ============================================================================
// Product
// ============================================================================

/// A product order to be scheduled.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Ordered quantity
    pub order_qty: u32,
    /// Quantity already on stock; subtracted from the order
    pub stock_qty: u32,
    /// Feeder slots this product needs on a placement machine
    pub feeder_slots_required: u32,
    /// Earliest instant work may start
    pub release: NaiveDateTime,
    /// Deadline for the last stage
    pub due: NaiveDateTime,
    pub priority: PriorityTier,
    /// Custom routing; `None` = default routing over all stages
    pub routing: Option<Routing>,
    /// Product-level lot config, used when no stage-level split exists
    pub lot_config: Option<LotConfig>,
    /// Per-stage lot configs; presence of any splitting strategy here
    /// switches the product to stage-level work units
    pub stage_lot_configs: HashMap<StageId, LotConfig>,
    /// Explicit display names per stage
    pub stage_names: HashMap<StageId, String>,
    /// Display-name pattern with `{Name}`, `{StageOrder}`, `{StageName}`
    pub name_pattern: Option<String>,
}

impl Product {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let epoch = NaiveDateTime::default();
        Self {
            name: id.clone(),
            id,
            order_qty: 0,
            stock_qty: 0,
            feeder_slots_required: 0,
            release: epoch,
            due: epoch,
            priority: PriorityTier::Normal,
            routing: None,
            lot_config: None,
            stage_lot_configs: HashMap::new(),
            stage_names: HashMap::new(),
            name_pattern: None,
        }
    }

    /// Set the display name (builder pattern)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the ordered quantity (builder pattern)
    pub fn order_qty(mut self, qty: u32) -> Self {
        self.order_qty = qty;
        self
    }

    /// Set the stock quantity (builder pattern)
    pub fn stock_qty(mut self, qty: u32) -> Self {
        self.stock_qty = qty;
        self
    }

    /// Set the feeder slot demand (builder pattern)
    pub fn feeder_slots(mut self, slots: u32) -> Self {
        self.feeder_slots_required = slots;
        self
    }

    /// Set the release instant (builder pattern)
    pub fn release(mut self, release: NaiveDateTime) -> Self {
        self.release = release;
        self
    }

    /// Set the due instant (builder pattern)
    pub fn due(mut self, due: NaiveDateTime) -> Self {
        self.due = due;
        self
    }

    /// Set the priority tier (builder pattern)
    pub fn priority(mut self, priority: PriorityTier) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a custom routing (builder pattern)
    pub fn routing(mut self, routing: Routing) -> Self {
        self.routing = Some(routing);
        self
    }

    /// Set the product-level lot config (builder pattern)
    pub fn lot_config(mut self, config: LotConfig) -> Self {
        self.lot_config = Some(config);
        self
    }

    /// Set a stage-level lot config (builder pattern)
    pub fn stage_lot_config(mut self, stage: StageId, config: LotConfig) -> Self {
        self.stage_lot_configs.insert(stage, config);
        self
    }

    /// Set an explicit display name for one stage (builder pattern)
    pub fn stage_name(mut self, stage: StageId, name: impl Into<String>) -> Self {
        self.stage_names.insert(stage, name.into());
        self
    }

    /// Set the display-name pattern (builder pattern)
    pub fn name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }

    /// Net quantity to produce after stock: `max(0, order - stock)`.
    pub fn required_qty(&self) -> u32 {
        self.order_qty.saturating_sub(self.stock_qty)
    }
}

// ============================================================================
// Transfer matrices
// ============================================================================

/// Transfer delay lookup between two keys of the same kind (stages or
/// lines). Same-key transfers are always free; unknown pairs fall back to
/// the default.
#[derive(Clone, Debug)]
pub struct TransferMatrix<K: Eq + Hash> {
    pub default_minutes: i64,
    entries: HashMap<(K, K), i64>,
}

impl<K: Eq + Hash + Clone> TransferMatrix<K> {
    pub fn new(default_minutes: i64) -> Self {
        Self {
            default_minutes,
            entries: HashMap::new(),
        }
    }

    /// A matrix where every transfer is free.
    pub fn zero() -> Self {
        Self::new(0)
    }

    /// Record a specific transfer delay.
    pub fn set(&mut self, from: K, to: K, minutes: i64) {
        self.entries.insert((from, to), minutes);
    }

    /// Record a specific transfer delay (builder pattern)
    pub fn with(mut self, from: K, to: K, minutes: i64) -> Self {
        self.set(from, to, minutes);
        self
    }

    /// Transfer minutes from one key to another.
    pub fn minutes(&self, from: &K, to: &K) -> i64 {
        if from == to {
            return 0;
        }
        self.entries
            .get(&(from.clone(), to.clone()))
            .copied()
            .unwrap_or(self.default_minutes)
    }

    /// The largest delay this matrix can yield, for horizon sizing.
    pub fn max_minutes(&self) -> i64 {
        self.entries
            .values()
            .copied()
            .chain(std::iter::once(self.default_minutes))
            .max()
            .unwrap_or(0)
    }
}

/// Stage-to-stage transfer delays (e.g. cooling after reflow).
pub type StageTransferMatrix = TransferMatrix<StageId>;

/// Line-to-line transfer delays (moving work in progress between lines).
pub type LineTransferMatrix = TransferMatrix<LineId>;

// ============================================================================
// Scheduler options
// ============================================================================

/// Feature flags controlling the scheduling pipeline.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SchedulerOptions {
    pub enable_lot_splitting: bool,
    pub enable_custom_routing: bool,
    pub enable_stage_transfer_time: bool,
    pub enable_line_transfer_time: bool,
    pub enable_priority_scheduling: bool,
    /// Hard deadlines make the model infeasible on a miss; the default is
    /// soft (misses are reported, not forbidden)
    pub use_hard_deadline_constraint: bool,
    pub enable_stage_naming: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            enable_lot_splitting: true,
            enable_custom_routing: true,
            enable_stage_transfer_time: true,
            enable_line_transfer_time: true,
            enable_priority_scheduling: true,
            use_hard_deadline_constraint: false,
            enable_stage_naming: true,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Scheduling error
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("no stages configured")]
    NoStages,

    #[error("no active lines configured")]
    NoActiveLines,

    #[error("stage {id} '{name}' has no active supporting line")]
    UnsupportedStage { id: StageId, name: String },

    #[error("product '{0}' has due date on or before its release date")]
    InvalidDateRange(ProductId),

    #[error("product '{0}' has no working time between release and due date")]
    NoWorkingTime(ProductId),

    #[error("product '{product}' has invalid routing: {reason}")]
    InvalidRouting { product: ProductId, reason: String },

    #[error("product '{product}' has no candidate line for stage {stage}")]
    NoCandidateLine { product: ProductId, stage: StageId },

    #[error("calendar conversion exceeded {0} days without consuming the minute budget")]
    CalendarOverrun(i64),

    #[error("internal error: {0}")]
    Internal(String),
}

// ============================================================================
// Tests
// ============================================================================
