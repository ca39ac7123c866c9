pub mod fcm;
pub mod log;
pub mod notification;
pub mod template;
