use std::time::Duration;

use mealkit_core::StoreSet;
use mealkit_order::{FulfillmentPolicy, FulfillmentService, ReportingService};
use mealkit_store::app_config::FulfillmentConfig;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub fulfillment: FulfillmentService,
    pub reporting: ReportingService,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(stores: StoreSet, config: &FulfillmentConfig, auth: AuthConfig) -> Self {
        let policy = FulfillmentPolicy {
            delivery_lead: chrono::Duration::days(config.delivery_lead_days),
            checkout_timeout: Duration::from_millis(config.checkout_timeout_ms),
        };

        Self {
            fulfillment: FulfillmentService::new(stores.clone(), policy),
            reporting: ReportingService::new(stores, config.low_stock_threshold),
            auth,
        }
    }
}
