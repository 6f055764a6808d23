pub mod client;
pub mod query;

pub use self::client::StashClient;
