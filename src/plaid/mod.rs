//! Plaid financial-data node: transactions, accounts, auth numbers,
//! institutions, items, identity and Link token issuance over Plaid's REST API.

pub mod auth;
pub mod client;
pub mod credentials;
pub mod environment;
pub mod error;
pub mod helpers;
pub mod mapping;
pub mod node;
pub mod operation;
pub mod sandbox;
pub mod settings;

pub use auth::{AccessTokenResolver, AuthMethod, exchange_public_token, resolver_for};
pub use client::PlaidClient;
pub use credentials::PlaidCredentials;
pub use environment::{PlaidEnvironment, ResolvedEnvironment, resolve_environment};
pub use error::PlaidError;
pub use node::PlaidNode;
pub use operation::PlaidOperation;
pub use settings::PlaidSettings;
