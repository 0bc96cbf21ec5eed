//! Batch-oriented schema migrations: discovery, planning, execution and bookkeeping.

mod collector;
mod direction;
mod error;
mod executor;
mod ledger;
mod naming;
mod planner;
mod sequence;

mod definition;
pub mod sql;

pub use collector::collect;
pub use definition::{Definition, Registry, ResolvedDefinition};
pub use direction::MigrationDirection;
pub use error::{MigrationError, MigrationErrorKind};
pub use executor::{BatchExecutor, BatchSummary, ResetSummary};
pub use ledger::{DEFAULT_LEDGER_TABLE, Ledger, LedgerSnapshot};
pub use naming::{
    MigrationExtension, MigrationFile, class_name_for, format_name, is_compiled_artifact_name,
    is_source_migration_name, sequence_of, table_of,
};
pub use planner::{ApplyPlan, BatchPlanner, UndoPlan};
pub use sequence::{RemovalSummary, SequenceManager, next_file_name};
