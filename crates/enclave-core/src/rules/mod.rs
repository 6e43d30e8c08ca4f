pub mod invariants;
pub mod validation;
