pub mod catalog;
pub mod common;
pub mod pagination;
pub mod participation;
pub mod payment;
pub mod raffle;
pub mod user;

pub use catalog::*;
pub use common::*;
pub use pagination::*;
pub use participation::*;
pub use payment::*;
pub use raffle::*;
pub use user::*;
