pub mod gateway;
pub mod notifier;
pub mod stripe;

pub use self::gateway::*;
pub use self::notifier::*;
pub use self::stripe::StripeService;
