pub mod codec;
pub mod content;
pub mod credentials;
pub mod error;
pub mod model;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod repository;
pub mod session;
pub mod users;
pub mod views;
pub mod visibility;

pub use error::{Error, Result};
