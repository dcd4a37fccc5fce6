pub mod blocks;
pub mod jobs;
pub mod leaderboard;
pub mod summary;
pub mod table;
