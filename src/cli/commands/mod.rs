pub mod audit_cmd;
pub mod hash;
pub mod maintain;
pub mod rotate;
pub mod schedule;
