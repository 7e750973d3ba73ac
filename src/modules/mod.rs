pub mod api;
pub mod broadcast;
pub mod locale;
pub mod models;
pub mod notifications;
pub mod polling;
pub mod resources;
