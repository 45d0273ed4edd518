pub mod allocation_service;
pub mod auth_service;
pub mod participation_service;
pub mod payment_service;
pub mod raffle_service;
pub mod reconciliation_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use allocation_service::AllocationService;
pub use auth_service::AuthService;
pub use participation_service::ParticipationService;
pub use payment_service::PaymentService;
pub use raffle_service::RaffleService;
pub use reconciliation_service::ReconciliationService;
