pub mod clock;
pub mod column_store;
pub mod config;
pub mod domain;
pub mod error;
pub mod gatekeeper;
pub mod metrics;
pub mod migration;
pub mod pagination;
pub mod repository;
pub mod services;

pub use config::Config;
pub use domain::edge::FollowEdge;
pub use domain::feed::FeedEntry;
pub use domain::post::{Post, PostCounter};
pub use error::{TimelineError, TimelineResult, ValidationError};
pub use pagination::{Cursor, CursorParams, Page, Paginator};
pub use repository::GraphBackendSwitch;
pub use services::{EngagementService, FriendshipService, NewsFeedService, PostService};
