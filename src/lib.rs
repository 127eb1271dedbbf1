pub mod app;
pub mod client;
pub mod game;
pub mod protocol;
pub mod shared;
pub mod transport;
