pub mod permission;
pub mod request;
