//! Transaction propagation state

pub mod propagation;
pub mod savepoint;
pub mod stack;

pub use propagation::Propagation;
pub use savepoint::SavepointStack;
pub use stack::{Popped, TxStack};
