use std::sync::Arc;

use acopio_events::{EventBus, InMemoryEventBus};
use acopio_extraction::{InMemoryDocumentStore, ScriptedExtractor};
use acopio_infra::{
    command_dispatcher::CommandDispatcher,
    event_store::{InMemoryEventStore, PostgresEventStore},
    services::{
        Dispatcher, IdentityResolver, IntakeService, ProjectionSet, QualityService,
        RequestService, SharedBus, SharedStore, StockService,
    },
    settings::{EventStoreBackend, Settings},
};

/// Wired application state shared by all handlers.
///
/// Read models are in-memory in both backends; against Postgres they are
/// rebuilt from the event log at boot and kept current by the bus
/// subscriber. The dispatcher is generic over `Arc<dyn EventStore>`, so one
/// wiring covers both.
pub struct AppServices {
    pub settings: Settings,
    pub store: SharedStore,
    pub projections: Arc<ProjectionSet>,
    pub dispatcher: Arc<Dispatcher>,
    pub identity: Arc<IdentityResolver>,
    pub intake: Arc<IntakeService>,
    pub quality: Arc<QualityService>,
    pub stock: Arc<StockService>,
    pub requests: Arc<RequestService>,
}

pub async fn build_services(settings: Settings) -> AppServices {
    let store: SharedStore = match &settings.event_store {
        EventStoreBackend::Memory => Arc::new(InMemoryEventStore::new()),
        EventStoreBackend::Postgres { database_url } => {
            let store = PostgresEventStore::connect(database_url)
                .await
                .unwrap_or_else(|e| panic!("failed to connect event store: {e}"));
            store
                .ensure_schema()
                .await
                .unwrap_or_else(|e| panic!("failed to prepare event store schema: {e}"));
            Arc::new(store)
        }
    };

    let bus: SharedBus = Arc::new(InMemoryEventBus::new());

    let projections = Arc::new(ProjectionSet::in_memory(settings.movement_codes));

    // A fresh process against a persistent log starts with empty read
    // models; fold the full history before serving.
    if !matches!(settings.event_store, EventStoreBackend::Memory) {
        match projections.replay_all(store.as_ref()) {
            Ok(n) => tracing::info!(events = n, "read models rebuilt from the event log"),
            Err(e) => panic!("failed to rebuild read models: {e}"),
        }
    }

    // Background subscriber: bus -> projections. Committed events are also
    // applied inline by the services, so everything seen here is a
    // duplicate; the projection cursors absorb them.
    {
        let sub = bus.subscribe();
        let projections = projections.clone();
        tokio::task::spawn_blocking(move || loop {
            match sub.recv() {
                Ok(env) => {
                    if let Err(e) = projections.apply_envelope(&env) {
                        tracing::warn!("projection apply failed: {e}");
                        continue;
                    }
                }
                Err(_) => break,
            }
        });
    }

    let dispatcher: Arc<Dispatcher> = Arc::new(CommandDispatcher::new(store.clone(), bus));

    let identity = Arc::new(IdentityResolver::new(
        dispatcher.clone(),
        projections.clone(),
        store.clone(),
    ));
    let scans = Arc::new(InMemoryDocumentStore::new());
    let extractor = Arc::new(ScriptedExtractor::new());
    let intake = Arc::new(IntakeService::new(
        dispatcher.clone(),
        projections.clone(),
        identity.clone(),
        settings.clone(),
        scans,
        extractor,
    ));
    let quality = Arc::new(QualityService::new(
        dispatcher.clone(),
        projections.clone(),
        settings.clone(),
    ));
    let stock = Arc::new(StockService::new(dispatcher.clone(), projections.clone()));
    let requests = Arc::new(RequestService::new(
        dispatcher.clone(),
        projections.clone(),
        settings.clone(),
    ));

    AppServices {
        settings,
        store,
        projections,
        dispatcher,
        identity,
        intake,
        quality,
        stock,
        requests,
    }
}
