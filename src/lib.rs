pub mod api;
pub mod config;
pub mod conversations;
pub mod db;
pub mod error;
pub mod events;
pub mod likes;
pub mod matches;
pub mod messages;
pub mod model;
pub mod presence;
pub mod profiles;
