//! # RC Test Utilities
//!
//! Shared test utilities for the Race Controller.
//!
//! - `mock_store` - fault-injecting `RaceStore`
//! - `mock_client` - in-process event channel client
//! - `fixtures` - races, configuration and access codes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = MockRaceStore::new();
//!     TestRace::new(1).driver("Alice", 1).driver("Bob", 2).seed(&store).await;
//!
//!     let (session, _task) = spawn_test_session(store.shared(), false);
//!     let mut client = MockClient::connect(&session, RoleSet::empty()).await;
//!     client.expect_event("devMode").await;
//! }
//! ```

pub mod fixtures;
pub mod mock_client;
pub mod mock_store;

pub use fixtures::*;
pub use mock_client::*;
pub use mock_store::*;
