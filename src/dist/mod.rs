//! Distributed dense fields: block row ownership and the field type the
//! coarsening algorithm operates on.

pub mod field;
pub mod layout;
