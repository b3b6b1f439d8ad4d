pub mod capture;
pub mod matcher;
pub mod reconcile;
pub mod reposition;
