pub mod avatar;
pub mod health;
pub mod public;
pub mod story;
