pub mod interview;
pub mod question;
pub mod usage;
pub mod user;
