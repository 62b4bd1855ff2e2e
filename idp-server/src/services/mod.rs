pub mod auth;
pub mod fetch;
pub mod idp;
pub mod local;
