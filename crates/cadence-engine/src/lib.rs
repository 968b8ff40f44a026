// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Follow-up scheduling and compliant delivery for Cadence.
//!
//! The [`Engine`] bundles the components that share a store, a gateway and a
//! delivery queue:
//! - [`ScheduleEngine`] builds one touchpoint per cadence day for a contact
//! - [`DeliveryCoordinator`] claims due touchpoints and sends them inside the
//!   recipient's compliance window
//! - [`CancellationService`] stops and restarts a contact's sequence
//! - [`InboundHandler`] logs replies and honours opt-out keywords
//! - [`Enrollment`] stores new contacts and starts their sequence

pub mod cancel;
pub mod catalog;
pub mod compliance;
pub mod delivery;
pub mod enroll;
pub mod inbound;
pub mod render;
pub mod schedule;
pub mod shutdown;
pub mod trigger;

use std::sync::Arc;

use cadence_config::model::CadenceConfig;
use cadence_core::{CadenceError, DeliveryQueue, FixedTimezoneResolver, SmsGateway, Store};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

pub use cancel::{CancellationService, StatusEffect};
pub use catalog::{TemplateCatalog, default_templates, seed_default_templates};
pub use compliance::{ComplianceDecision, ComplianceHandle, ComplianceWindow};
pub use delivery::{DeliveryCoordinator, DeliveryPolicy, DispatchOutcome, SweepReport};
pub use enroll::{Enrolled, Enrollment, NewContact};
pub use inbound::{InboundHandler, InboundOutcome, is_opt_out};
pub use render::MessageRenderer;
pub use schedule::{ScheduleEngine, TimetableReport};
pub use trigger::{TimerQueue, run_sweeper, run_timer_trigger};

/// All engine components wired against one store, gateway and queue.
#[derive(Clone)]
pub struct Engine {
    pub compliance: ComplianceHandle,
    pub catalog: Arc<TemplateCatalog>,
    pub schedule: Arc<ScheduleEngine>,
    pub delivery: Arc<DeliveryCoordinator>,
    pub cancellation: Arc<CancellationService>,
    pub inbound: Arc<InboundHandler>,
    pub enrollment: Arc<Enrollment>,
}

impl Engine {
    /// Build every component from configuration.
    ///
    /// Templates are read from the store once; the catalog is a snapshot for
    /// the life of the engine.
    pub async fn from_config(
        config: &CadenceConfig,
        store: Arc<dyn Store>,
        gateway: Arc<dyn SmsGateway>,
        queue: Arc<dyn DeliveryQueue>,
    ) -> Result<Self, CadenceError> {
        let compliance = ComplianceHandle::new(ComplianceWindow::from_config(&config.compliance)?);
        let catalog = Arc::new(TemplateCatalog::load(store.as_ref()).await?);
        let renderer = MessageRenderer::from_config(&config.render)?;
        let policy = DeliveryPolicy::from_config(&config.delivery, &config.compliance);

        let (schedule_rng, delivery_rng) = match config.schedule.variant_seed {
            Some(seed) => (
                StdRng::seed_from_u64(seed),
                StdRng::seed_from_u64(seed.wrapping_add(1)),
            ),
            None => (StdRng::from_entropy(), StdRng::from_entropy()),
        };

        let schedule = Arc::new(ScheduleEngine::with_rng(
            Arc::clone(&store),
            Arc::clone(&catalog),
            compliance.clone(),
            Arc::clone(&queue),
            config.schedule.send_hour_offset,
            schedule_rng,
        ));
        let delivery = Arc::new(
            DeliveryCoordinator::new(
                Arc::clone(&store),
                gateway,
                Arc::clone(&catalog),
                compliance.clone(),
                queue,
                renderer,
                policy,
            )
            .with_rng(delivery_rng),
        );
        let cancellation = Arc::new(CancellationService::new(
            Arc::clone(&store),
            Arc::clone(&schedule),
        ));
        let inbound = Arc::new(InboundHandler::new(
            Arc::clone(&store),
            Arc::clone(&cancellation),
        ));
        let enrollment = Arc::new(Enrollment::new(
            store,
            Arc::clone(&schedule),
            Arc::new(FixedTimezoneResolver::new(
                config.compliance.default_timezone.clone(),
            )),
        ));

        let window = compliance.current();
        info!(
            templates = catalog.len(),
            start_hour = window.start_hour(),
            end_hour = window.end_hour(),
            "engine ready"
        );

        Ok(Self {
            compliance,
            catalog,
            schedule,
            delivery,
            cancellation,
            inbound,
            enrollment,
        })
    }
}
