//! Region-based memory pool, and the array/list containers built on top of
//! it.
//!
//! [`pool::Pool`] is a bump-allocating arena that falls back to the system
//! allocator for large requests and reclaims everything it owns in one
//! step, at [`pool::Pool::destroy`]. [`array::Array`] and [`list::List`]
//! are sequence containers whose element storage lives in a `Pool`;
//! `Array` cooperates with its pool to grow in place when possible, `List`
//! never relocates an element once pushed.

pub mod array;
pub mod list;
pub mod log;
pub mod platform;
pub mod pool;

pub use array::Array;
pub use list::List;
pub use log::Log;
pub use pool::{FreeOutcome, Pool};
