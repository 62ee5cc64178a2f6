pub mod identity;
pub mod registration;

pub use identity::IdentityService;
pub use registration::RegistrationService;
