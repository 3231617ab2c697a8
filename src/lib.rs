pub mod api;
pub mod config;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod pricing;
pub mod retry;
pub mod services;
pub mod store;
pub mod tron;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::OrderEngine;
use crate::pricing::PricingEngine;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub engine: Arc<OrderEngine>,
    pub pricing: Arc<PricingEngine>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}
