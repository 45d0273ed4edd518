pub mod jwt;
pub mod password;
pub mod validation;

pub use jwt::*;
pub use password::*;
