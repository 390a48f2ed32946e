mod engagement;
mod friendship;
mod newsfeed;
mod posts;

pub use engagement::EngagementService;
pub use friendship::FriendshipService;
pub use newsfeed::NewsFeedService;
pub use posts::PostService;
