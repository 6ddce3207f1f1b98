// src/models/mod.rs
pub mod driver;
pub mod ride;
pub mod user;

pub use driver::*;
pub use ride::*;
pub use user::*;
