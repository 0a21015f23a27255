pub mod intent;
pub mod message;
pub mod receipt;
pub mod reminder;
