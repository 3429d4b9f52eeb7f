//! Engine module: naming, dedup, progress, ledger, reporting and the CLI surface

pub mod arg_parser;
pub mod cli;
pub mod dedup;
pub mod ledger;
pub mod progress;
pub mod report;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::Cli;
pub use cli::handle_run;
pub use dedup::{find_existing, output_path_for};
pub use ledger::{
    Reconciled, ResultLedger, RetrySetHandle, persist_failures, reconcile_retry_set,
};
pub use progress::ProgressAggregator;
pub use tools::move_no_clobber;
