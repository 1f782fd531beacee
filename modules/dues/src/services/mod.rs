pub mod charge_generator;
pub mod payment_history;
pub mod payment_ledger;
pub mod snapshot_aggregator;
pub mod status_matrix;
pub mod summary_reader;
