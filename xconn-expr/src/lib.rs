pub mod error;
pub mod expr;
pub mod pred;
pub mod sql;

pub use crate::expr::*;
pub use crate::pred::*;
