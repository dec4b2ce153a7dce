//! Database module: models, schema, and queries for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and conversions
//! - `schema.rs`: SQL DDL for initializing the database (MySQL)
//! - `mysql.rs`: pooled query layer

pub mod models;
pub mod mysql;
pub mod schema;

pub use models::{AuthType, Avatar, AvatarStatus, PublicStory, Story, StoryStatus, User};
pub use mysql::{MySqlPool, Storage};
pub use schema::MYSQL_INIT;
