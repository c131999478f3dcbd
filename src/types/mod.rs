//! Core types: reference frames, typed transforms and identifiers

pub mod ids;
pub mod spaces;
pub mod transforms;
