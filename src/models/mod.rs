pub mod announcement;
pub mod auth;
pub mod contact;
