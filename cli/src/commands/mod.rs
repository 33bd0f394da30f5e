//! Command implementations

pub mod check;
pub mod collect;
pub mod deps;
pub mod down;
pub mod load;
pub mod status;
pub mod up;
