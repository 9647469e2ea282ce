//! Shared HTTP client factory.
//!
//! Provides consistent HTTP client configuration across the codebase.

use reqwest::Client;
use std::time::Duration;

/// Default timeout for catalog and listing calls (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for chat traffic (10 seconds).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a new HTTP client with the default timeout.
pub fn create_client() -> Client {
    create_client_with_timeout(DEFAULT_TIMEOUT)
}

/// Create a new HTTP client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

/// Create a client for chat calls.
///
/// Only connecting is bounded. A whole-request timeout would cut long
/// token streams off mid-response.
pub fn create_chat_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .expect("Failed to create HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_client_returns_valid_client() {
        let client = create_client();
        assert!(std::mem::size_of_val(&client) > 0);
    }

    #[test]
    fn create_chat_client_returns_valid_client() {
        let _client = create_chat_client();
    }

    #[test]
    fn default_timeout_is_30_seconds() {
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(30));
    }
}
