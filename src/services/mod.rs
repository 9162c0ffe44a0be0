pub mod announcements;
pub mod contact;
pub mod uploads;
