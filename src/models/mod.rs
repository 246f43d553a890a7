pub mod fcm;
pub mod health;
pub mod message;
pub mod notification;
pub mod order;
pub mod response;
pub mod retry;
pub mod validation;
