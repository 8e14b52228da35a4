pub mod ledger;

pub use ledger::DeviceLedger;
