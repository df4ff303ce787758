/// Business logic layer for the social feed service
///
/// Every write goes through the `Coordinator` so that multi-record changes are
/// applied as one unit. Reads that do not mutate go straight to the store.
pub mod comments;
pub mod feed;
pub mod news;
pub mod notifications;
pub mod posts;
pub mod social_graph;
pub mod users;

pub use comments::{CommentListing, CommentService, CommentView};
pub use feed::{paginate, FeedService, PostPage};
pub use news::{NewsDeletion, NewsService, NewsView};
pub use notifications::{NotificationService, NotificationView};
pub use posts::{LikeListing, LikeView, PostDeletion, PostService, PostView};
pub use social_graph::{FollowToggle, LikeToggle, SocialGraphService};
pub use users::{SyncOutcome, UserProfile, UserService};
