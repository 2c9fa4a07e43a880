mod event;
mod event_broker;

pub use event::*;
pub use event_broker::*;
