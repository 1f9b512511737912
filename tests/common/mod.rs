//! Shared wiring for integration tests: the public service over the
//! in-memory store, the mock gateway and a recording notifier.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use entitlements::adapters::{InMemoryEntitlementStore, MockPaymentGateway, RecordingNotifier};
use entitlements::application::{EntitlementService, ServiceDependencies};
use entitlements::config::TrialConfig;
use entitlements::domain::foundation::{DeviceId, UserId};

pub struct Harness {
    pub store: Arc<InMemoryEntitlementStore>,
    pub gateway: MockPaymentGateway,
    pub notifier: Arc<RecordingNotifier>,
    pub service: Arc<EntitlementService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_gateway(MockPaymentGateway::new())
    }

    pub fn with_gateway(gateway: MockPaymentGateway) -> Self {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let service = Arc::new(EntitlementService::new(
            ServiceDependencies {
                repository: store.clone(),
                reader: store.clone(),
                webhook_events: store.clone(),
                gateway: Arc::new(gateway.clone()),
                notifier: notifier.clone(),
            },
            &TrialConfig::default(),
            Duration::from_millis(250),
        ));
        Self {
            store,
            gateway,
            notifier,
            service,
        }
    }
}

pub fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

pub fn device(id: &str) -> DeviceId {
    DeviceId::new(id).unwrap()
}
