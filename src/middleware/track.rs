use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    Router,
};

use super::feeder::Feeder;

/// Classify the request, forward it unchanged, then enqueue the event once
/// the response status is known.
pub async fn track_requests(State(feeder): State<Feeder>, request: Request, next: Next) -> Response {
    let pending = feeder.prepare(&request);

    let response = next.run(request).await;

    if let Some(event) = pending {
        feeder.complete(event, response.status());
    }

    response
}

/// Wrap every route of `router` with the tracking middleware.
pub fn with_tracking<S>(router: Router<S>, feeder: Feeder) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(feeder, track_requests))
}
