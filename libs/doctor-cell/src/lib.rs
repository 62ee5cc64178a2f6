pub mod handlers;
pub mod router;
pub mod models;
pub mod services;

pub use models::{ApprovalDecision, Doctor, DoctorError, DocumentResubmission, MAX_DOCUMENTS_PER_UPLOAD};
pub use router::doctor_routes;
pub use services::DoctorService;
