//! RPC gateway for the goods, stock and order services.
//!
//! Each RPC is a JSON `POST /{package}.{Service}/{Method}` endpoint. The
//! crate also wires the stores, the broker and the saga consumers together
//! (see [`state`]) and exposes health and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use state::{AppState, Services, StartupError, Stores, connect, run_migrations, seed_demo_data};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/goods.Goods/GetGoodsByRoom",
            post(routes::goods::get_goods_by_room),
        )
        .route(
            "/goods.Goods/GetGoodsDetail",
            post(routes::goods::get_goods_detail),
        )
        .route("/stock.Stock/GetStock", post(routes::stock::get_stock))
        .route(
            "/stock.Stock/BatchGetStock",
            post(routes::stock::batch_get_stock),
        )
        .route("/stock.Stock/ReduceStock", post(routes::stock::reduce_stock))
        .route(
            "/stock.Stock/BatchReduceStock",
            post(routes::stock::batch_reduce_stock),
        )
        .route(
            "/stock.Stock/RollbackStock",
            post(routes::stock::rollback_stock),
        )
        .route("/stock.Stock/SetStock", post(routes::stock::set_stock))
        .route("/order.Order/CreateOrder", post(routes::order::create_order))
        .route("/order.Order/GetOrder", post(routes::order::get_order))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
