//! Common test utilities for trellis-lifecycle integration tests

pub mod mock_repos;

#[allow(unused_imports)]
pub use mock_repos::{
    MockSubscriptionRepository, MockUserRepository, RecordingNotifier, RecordingPublisher,
};
