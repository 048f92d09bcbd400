pub mod blocks;
pub mod core;
pub mod lessons;
pub mod periods;
pub mod schedules;
pub mod setup;
