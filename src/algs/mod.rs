//! Communication backends, wire formats, and deterministic collectives.

pub mod communicator;
pub mod reduction;
pub mod wire;
