pub mod assignment;
pub mod notification;
pub mod operator;
pub mod request;
pub mod worker;
