pub mod auth;
pub mod participation;
pub mod raffle;
pub mod webhook;

pub use auth::auth_config;
pub use participation::participation_config;
pub use raffle::raffle_config;
pub use webhook::webhook_config;
