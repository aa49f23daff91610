pub mod api;
pub mod applications;
pub mod auth;
pub mod chats;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod join;
pub mod model;
pub mod seed;
pub mod users;
