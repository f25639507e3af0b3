pub mod availability;
pub mod checkout;
pub mod ledger;
pub mod payments;
pub mod projector;
pub mod reconciler;
pub mod session;
pub mod sweeper;
