pub mod attendance;
pub mod core;
pub mod directory;
pub mod reports;
pub mod roster;
pub mod sessions;
