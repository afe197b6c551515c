use axum::{http::Method, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod departures;
pub mod error;
pub mod health;
pub mod middleware;
pub mod payments;
pub mod resiliency;
pub mod state;
pub mod stream;
pub mod tickets;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let mut router = Router::new()
        .merge(departures::routes())
        .merge(tickets::routes())
        .merge(payments::routes())
        .merge(stream::routes())
        .merge(health::routes());

    // Needs ConnectInfo, which only the real listener provides.
    if state.redis.is_some() {
        router = router.layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
