// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot subcommands: `sweep`, `enroll`, `schedule`, `cancel`, `reactivate`,
//! `status` and `seed-templates`.
//!
//! Rows created here are only enqueued in-process, so a running `serve`
//! picks them up on its next sweep.

use std::sync::Arc;

use cadence_config::model::CadenceConfig;
use cadence_core::{CadenceError, ContactProfile, FixedTimezoneResolver, NoopQueue, Store};
use cadence_engine::{
    CancellationService, ComplianceHandle, ComplianceWindow, Engine, Enrollment, NewContact,
    ScheduleEngine, TemplateCatalog, seed_default_templates,
};
use cadence_sms::TwilioGateway;
use chrono::Utc;
use clap::Args;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::serve::{init_tracing, open_store};

/// Scheduling and cancellation without a gateway.
struct Offline {
    store: Arc<dyn Store>,
    schedule: Arc<ScheduleEngine>,
    cancellation: CancellationService,
    enrollment: Enrollment,
}

/// Contact details for `cadence enroll`.
#[derive(Args, Debug)]
pub struct EnrollArgs {
    /// Contact identifier.
    contact_id: String,
    /// E.164 phone number.
    phone: String,
    /// IANA timezone; resolved from the ZIP or state when omitted.
    #[arg(long)]
    timezone: Option<String>,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    vehicle_year: Option<u16>,
    #[arg(long)]
    vehicle_make: Option<String>,
    #[arg(long)]
    vehicle_model: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    zip: Option<String>,
    /// Quoted savings, rendered as-is.
    #[arg(long)]
    savings: Option<String>,
    /// Token used in tracked links.
    #[arg(long)]
    tracking_token: Option<String>,
}

impl EnrollArgs {
    pub fn into_new_contact(self) -> NewContact {
        NewContact {
            id: self.contact_id,
            phone: self.phone,
            timezone: self.timezone,
            profile: ContactProfile {
                first_name: self.first_name,
                last_name: self.last_name,
                vehicle_year: self.vehicle_year,
                vehicle_make: self.vehicle_make,
                vehicle_model: self.vehicle_model,
                city: self.city,
                state: self.state,
                zip: self.zip,
                savings: self.savings,
                tracking_token: self.tracking_token,
            },
        }
    }
}

async fn offline(config: &CadenceConfig) -> Result<Offline, CadenceError> {
    init_tracing(&config.service.log_level);
    let store: Arc<dyn Store> = open_store(config).await?;
    let compliance = ComplianceHandle::new(ComplianceWindow::from_config(&config.compliance)?);
    let catalog = Arc::new(TemplateCatalog::load(store.as_ref()).await?);
    let rng = match config.schedule.variant_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let schedule = Arc::new(ScheduleEngine::with_rng(
        Arc::clone(&store),
        catalog,
        compliance,
        Arc::new(NoopQueue),
        config.schedule.send_hour_offset,
        rng,
    ));
    let cancellation = CancellationService::new(Arc::clone(&store), Arc::clone(&schedule));
    let enrollment = Enrollment::new(
        Arc::clone(&store),
        Arc::clone(&schedule),
        Arc::new(FixedTimezoneResolver::new(
            config.compliance.default_timezone.clone(),
        )),
    );
    Ok(Offline {
        store,
        schedule,
        cancellation,
        enrollment,
    })
}

fn contact_not_found(id: &str) -> CadenceError {
    CadenceError::NotFound {
        entity: "contact",
        id: id.to_string(),
    }
}

pub async fn run_sweep(config: CadenceConfig) -> Result<(), CadenceError> {
    init_tracing(&config.service.log_level);
    let store = open_store(&config).await?;
    let gateway = Arc::new(TwilioGateway::new(&config.twilio)?);
    let engine = Engine::from_config(
        &config,
        Arc::clone(&store) as Arc<dyn Store>,
        gateway,
        Arc::new(NoopQueue),
    )
    .await?;

    let report = engine.delivery.sweep(Utc::now()).await;
    store.close().await?;
    println!(
        "swept {} touchpoints: {} delivered, {} deferred, {} retried, {} failed, {} cancelled, {} reclaimed, {} errors",
        report.processed(),
        report.delivered,
        report.deferred,
        report.retried,
        report.failed,
        report.cancelled,
        report.reclaimed,
        report.errors
    );
    Ok(())
}

pub async fn run_schedule(config: CadenceConfig, contact_id: &str) -> Result<(), CadenceError> {
    let offline = offline(&config).await?;
    let contact = offline
        .store
        .get_contact(contact_id)
        .await?
        .ok_or_else(|| contact_not_found(contact_id))?;

    let report = offline.schedule.build_timetable(&contact, Utc::now()).await?;
    println!(
        "{contact_id}: {} touchpoints created, {} already scheduled, {} days without a template",
        report.created.len(),
        report.existing_days.len(),
        report.skipped_days.len()
    );
    for row in &report.created {
        println!("  day {:>2}  variant {}  {}", row.day, row.variant, row.scheduled_for);
    }
    Ok(())
}

pub async fn run_enroll(config: CadenceConfig, args: EnrollArgs) -> Result<(), CadenceError> {
    let offline = offline(&config).await?;
    let enrolled = offline
        .enrollment
        .enroll(args.into_new_contact(), Utc::now())
        .await?;
    let contact = &enrolled.contact;
    if enrolled.created {
        println!("{}: enrolled in {}", contact.id, contact.timezone);
    } else {
        println!("{}: already enrolled", contact.id);
    }
    for row in &enrolled.timetable.created {
        println!("  day {:>2}  variant {}  {}", row.day, row.variant, row.scheduled_for);
    }
    Ok(())
}

pub async fn run_seed_templates(config: CadenceConfig, force: bool) -> Result<(), CadenceError> {
    init_tracing(&config.service.log_level);
    let store = open_store(&config).await?;
    let written = seed_default_templates(store.as_ref(), force).await?;
    store.close().await?;
    println!("{written} templates written");
    Ok(())
}

pub async fn run_cancel(config: CadenceConfig, contact_id: &str) -> Result<(), CadenceError> {
    let offline = offline(&config).await?;
    if offline.store.get_contact(contact_id).await?.is_none() {
        return Err(contact_not_found(contact_id));
    }
    let cancelled = offline.cancellation.cancel(contact_id, Utc::now()).await?;
    println!("{contact_id}: {cancelled} pending touchpoints cancelled");
    Ok(())
}

pub async fn run_reactivate(config: CadenceConfig, contact_id: &str) -> Result<(), CadenceError> {
    let offline = offline(&config).await?;
    let report = offline.cancellation.reactivate(contact_id, Utc::now()).await?;
    println!(
        "{contact_id}: reactivated, {} touchpoints restored",
        report.created.len()
    );
    Ok(())
}

pub async fn run_status(config: CadenceConfig, contact_id: &str) -> Result<(), CadenceError> {
    let store = open_store(&config).await?;
    let contact = store
        .get_contact(contact_id)
        .await?
        .ok_or_else(|| contact_not_found(contact_id))?;
    let touchpoints = store.list_scheduled_for_contact(contact_id).await?;
    let deliveries = store.list_deliveries(contact_id).await?;

    let status = serde_json::json!({
        "contact": {
            "id": contact.id,
            "status": contact.status,
            "timezone": contact.timezone,
        },
        "touchpoints": touchpoints,
        "deliveries": deliveries,
    });
    let rendered = serde_json::to_string_pretty(&status)
        .map_err(|e| CadenceError::Internal(format!("failed to render status: {e}")))?;
    println!("{rendered}");
    Ok(())
}
