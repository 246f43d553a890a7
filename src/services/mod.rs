pub mod delivery;
pub mod order_events;
pub mod scheduler;
