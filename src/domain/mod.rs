// Domain layer - Core types, errors and bounds rules

pub mod errors;
pub mod model;
pub mod rules;
