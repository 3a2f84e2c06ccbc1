pub mod api;
pub mod config;
pub mod driver;
pub mod humanize;
pub mod ledger;
pub mod observability;
pub mod queue;
pub mod records;
pub mod reporting;
pub mod storage;
pub mod worker;
