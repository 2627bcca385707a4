//! HTTP API handlers for moodlist-server

pub mod camera;
pub mod detect;
pub mod health;
pub mod playlist;

pub use camera::camera_routes;
pub use detect::detect_routes;
pub use health::health_routes;
pub use playlist::playlist_routes;
