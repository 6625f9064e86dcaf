pub mod config;
pub mod logger;
pub mod message;
pub mod node;
pub mod plaid;
pub mod schema;
pub mod secret;
