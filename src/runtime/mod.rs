//! Runtime subsystem modules.

mod core;
pub mod dispatcher;
pub(crate) mod guard;

pub use self::core::Runtime;
pub use dispatcher::{Action, Dispatcher, TickDispatcher};
pub use guard::Timer;
