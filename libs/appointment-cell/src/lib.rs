pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Appointment, AppointmentError, AppointmentStatus};
pub use router::appointment_routes;
pub use services::{
    AppointmentApprovalService, AppointmentBookingService, ExpirySweeper, PaymentProofService,
    ReminderSweeper, Sweep, SweepReport, SweepScheduler,
};
