//! Query Planner & Executor
//!
//! Turns a structured select request into a cost-estimated plan, then
//! drives an operator tree over it with a per-query memory budget.

pub mod cache;
pub mod executor;
pub mod planner;

pub use cache::{CacheStats, QueryCache};
pub use executor::memory::MemoryManager;
pub use executor::operator::Row;
pub use executor::{execute, RowSource};
pub use planner::{plan_select, IndexCatalog, OptimizationLevel, Plan, PlanNode, SelectRequest};
