pub mod database;
pub mod fcm;
pub mod health;
pub mod memory;
pub mod messaging;
pub mod rbmq;
pub mod store;
