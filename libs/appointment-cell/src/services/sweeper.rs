// libs/appointment-cell/src/services/sweeper.rs
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, SecondsFormat};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use notification_cell::{NewNotification, NotificationService, NotificationType};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::clock::Clock;

use crate::models::{AppointmentError, AppointmentStatus};
use crate::services::lifecycle::AppointmentLifecycle;

/// Outcome of one sweep: rows that matched the selection and rows actually
/// changed (status moved, notification inserted).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub matched: usize,
    pub changed: usize,
}

#[async_trait]
pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<SweepReport, AppointmentError>;
}

/// Moves unpaid pending appointments past the grace period to `expired`.
pub struct ExpirySweeper {
    supabase: Arc<SupabaseClient>,
    clock: Arc<dyn Clock>,
    grace_days: i64,
    system_key: String,
}

impl ExpirySweeper {
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            clock,
            grace_days: config.appointment_expiry_days,
            system_key: config.system_key().to_string(),
        }
    }
}

#[async_trait]
impl Sweep for ExpirySweeper {
    fn name(&self) -> &'static str {
        "expiry"
    }

    #[instrument(skip(self))]
    async fn run(&self) -> Result<SweepReport, AppointmentError> {
        let cutoff = AppointmentLifecycle::expiry_cutoff(self.clock.now(), self.grace_days)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let stale_filter = format!(
            "status=eq.{}&payment_screenshot_url=is.null",
            AppointmentStatus::Pending
        );

        let select_path = format!(
            "/rest/v1/appointments?select=id&{}&created_at=lt.{}",
            stale_filter,
            urlencoding::encode(&cutoff)
        );
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &select_path,
            Some(&self.system_key),
            None,
        ).await?;

        let ids = related_ids(&rows, "id");
        if ids.is_empty() {
            debug!("No stale appointments before {}", cutoff);
            return Ok(SweepReport::default());
        }

        // The update repeats the stale filter so a proof uploaded since the
        // select keeps its appointment alive.
        let update_path = format!(
            "/rest/v1/appointments?id=in.({})&{}",
            join_ids(&ids),
            stale_filter
        );
        let updated: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &update_path,
            Some(&self.system_key),
            Some(json!({
                "status": AppointmentStatus::Expired,
                "updated_at": self.clock.now().to_rfc3339()
            })),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        Ok(SweepReport { matched: ids.len(), changed: updated.len() })
    }
}

/// Sends one reminder per approved appointment scheduled for tomorrow.
pub struct ReminderSweeper {
    supabase: Arc<SupabaseClient>,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
    system_key: String,
}

impl ReminderSweeper {
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            notifications: NotificationService::with_client(Arc::clone(&supabase), config),
            supabase,
            clock,
            system_key: config.system_key().to_string(),
        }
    }
}

#[async_trait]
impl Sweep for ReminderSweeper {
    fn name(&self) -> &'static str {
        "reminders"
    }

    #[instrument(skip(self))]
    async fn run(&self) -> Result<SweepReport, AppointmentError> {
        let tomorrow = self.clock.today() + ChronoDuration::days(1);

        let path = format!(
            "/rest/v1/appointments?select=id,patient_id,appointment_time&status=eq.{}&appointment_date=eq.{}",
            AppointmentStatus::Approved,
            tomorrow
        );
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.system_key),
            None,
        ).await?;

        let candidates: Vec<(Uuid, Uuid, String)> = rows.iter()
            .filter_map(|row| {
                let id = Uuid::parse_str(row["id"].as_str()?).ok()?;
                let patient_id = Uuid::parse_str(row["patient_id"].as_str()?).ok()?;
                let time = row["appointment_time"].as_str().unwrap_or_default();
                Some((id, patient_id, time.chars().take(5).collect()))
            })
            .collect();

        if candidates.is_empty() {
            return Ok(SweepReport::default());
        }

        let ids: Vec<Uuid> = candidates.iter().map(|(id, _, _)| *id).collect();
        let already_reminded = self.notifications
            .existing_related_ids(NotificationType::Reminder, &ids)
            .await?;

        let reminders: Vec<NewNotification> = candidates.iter()
            .filter(|(id, _, _)| !already_reminded.contains(id))
            .map(|(id, patient_id, time)| {
                NewNotification::new(
                    *patient_id,
                    NotificationType::Reminder,
                    "Appointment tomorrow",
                    format!("Reminder: you have an appointment tomorrow ({}) at {}.", tomorrow, time),
                )
                .related_to(*id)
            })
            .collect();

        // One insert per reminder: a concurrent sweep that got there first
        // trips the unique index and that reminder counts as already sent.
        let mut inserted = 0;
        for reminder in reminders {
            if self.notifications.create_unique(reminder).await? {
                inserted += 1;
            }
        }

        Ok(SweepReport { matched: candidates.len(), changed: inserted })
    }
}

/// Runs each sweep on its own task: once after `initial_delay`, then every
/// `period`, until the shutdown channel flips to `true` or its sender drops.
pub struct SweepScheduler {
    sweeps: Vec<Arc<dyn Sweep>>,
    initial_delay: Duration,
    period: Duration,
}

impl SweepScheduler {
    pub fn new(sweeps: Vec<Arc<dyn Sweep>>, initial_delay: Duration, period: Duration) -> Self {
        Self { sweeps, initial_delay, period }
    }

    /// Expiry and reminder sweeps with timing from config.
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let sweeps: Vec<Arc<dyn Sweep>> = vec![
            Arc::new(ExpirySweeper::new(config, Arc::clone(&clock))),
            Arc::new(ReminderSweeper::new(config, clock)),
        ];

        Self::new(
            sweeps,
            Duration::from_secs(config.sweep_initial_delay_seconds),
            Duration::from_secs(config.sweep_interval_seconds.max(1)),
        )
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            "Starting {} sweeps: first run in {:?}, then every {:?}",
            self.sweeps.len(), self.initial_delay, self.period
        );

        self.sweeps.into_iter()
            .map(|sweep| {
                let shutdown = shutdown.clone();
                let (initial_delay, period) = (self.initial_delay, self.period);
                tokio::spawn(run_periodically(sweep, initial_delay, period, shutdown))
            })
            .collect()
    }
}

async fn run_periodically(
    sweep: Arc<dyn Sweep>,
    initial_delay: Duration,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    if *shutdown.borrow() {
        return;
    }

    tokio::select! {
        _ = sleep(initial_delay) => {}
        _ = wait_for_shutdown(&mut shutdown) => {
            debug!("Sweep {} cancelled before first run", sweep.name());
            return;
        }
    }

    let mut ticker = interval_at(Instant::now(), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_once(sweep.as_ref()).await;
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("Sweep {} stopped", sweep.name());
                break;
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Runs a sweep once and logs the outcome. Failures are left for the next tick.
pub async fn run_once(sweep: &dyn Sweep) -> Option<SweepReport> {
    match sweep.run().await {
        Ok(report) => {
            info!(
                "Sweep {} finished: {} matched, {} changed",
                sweep.name(), report.matched, report.changed
            );
            Some(report)
        }
        Err(e) => {
            error!("Sweep {} failed: {}", sweep.name(), e);
            None
        }
    }
}

fn related_ids(rows: &[Value], column: &str) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row[column].as_str())
        .filter_map(|id| Uuid::parse_str(id).ok())
        .filter(|id| seen.insert(*id))
        .collect()
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",")
}
