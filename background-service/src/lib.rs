pub mod jobs;
pub mod report;
pub mod scheduler;

pub use jobs::{
    RedditPostsJob, TwitterRegionsJob, TwitterTrendsJob, REDDIT_POSTS_JOB, TWITTER_REGIONS_JOB,
    TWITTER_TRENDS_JOB,
};
pub use report::{JobPhase, JobStats, RunContext, RunReport};
pub use scheduler::{Job, JobScheduler, ScheduledJob};
