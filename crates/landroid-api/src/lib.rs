// landroid-api: Async Rust client for the Landroid mower cloud (OAuth + REST + MQTT link)

pub mod auth;
pub mod client;
pub mod cloud;
pub mod error;
pub mod link;
pub mod models;
pub mod mqtt;
pub mod transport;

pub use auth::{CustomAuthHeaders, Session};
pub use client::CloudClient;
pub use cloud::{Cloud, CloudEndpoints};
pub use error::Error;
pub use link::{LinkConnector, LinkEvent, LinkOptions, PubSubLink, ReconnectConfig};
pub use models::{LastStatus, MqttTopics, ProductItem, UserProfile};
pub use mqtt::MqttConnector;
pub use transport::TransportConfig;
