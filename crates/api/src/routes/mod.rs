pub mod branches;
pub mod health;
pub mod mall;
pub mod metrics;
