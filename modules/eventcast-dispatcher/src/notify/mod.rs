pub mod backend;
pub mod fcm;
pub mod noop;
