pub mod account;
pub mod rate;
pub mod request;
