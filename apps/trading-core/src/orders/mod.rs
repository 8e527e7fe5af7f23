//! Order lifecycle: the order model, its status state machine, and the
//! manager that places orders and verifies execution.

mod manager;
mod order;
mod status;

pub use manager::{FailedOrder, OrderManager, OrderOutcome, OrderStats};
pub use order::Order;
pub use status::OrderStatus;
