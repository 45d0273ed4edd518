pub mod participation_elements;
pub mod participations;
pub mod payment_events;
pub mod raffles;
pub mod users;

pub use participation_elements as participation_element_entity;
pub use participations as participation_entity;
pub use payment_events as payment_event_entity;
pub use raffles as raffle_entity;
pub use users as user_entity;

pub use participations::{ParticipationStatus, StatusReason};
pub use payment_events::{PaymentOutcomeKind, ReconcileResult};
pub use raffles::ElementKind;
pub use users::UserRole;
