//! Domain models owned by the server rather than the engine.

pub mod restaurant;
pub mod user;

pub use restaurant::{NewRestaurant, Restaurant};
pub use user::{Identity, User};
