//! Detection and risk parameters with layered overrides.

pub mod set;
pub mod store;

pub use set::{ParamError, ParamField, ParameterSet, PartialParameterSet};
pub use store::{OverrideScope, OverrideStore, ParameterResolver, ParameterStore};
