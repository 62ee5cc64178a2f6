pub mod approval;
pub mod booking;
pub mod lifecycle;
pub mod payment;
pub mod sweeper;

pub use approval::AppointmentApprovalService;
pub use booking::AppointmentBookingService;
pub use payment::PaymentProofService;
pub use sweeper::{ExpirySweeper, ReminderSweeper, Sweep, SweepReport, SweepScheduler};
