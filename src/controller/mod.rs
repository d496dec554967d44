pub mod notify;
pub mod subscribe;
