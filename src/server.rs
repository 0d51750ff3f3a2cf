use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::dimension::Extent;
use crate::error::{ExplorerError, FacetError, Result};
use crate::manager::Coordinator;

pub type SharedCoordinator = Arc<Mutex<Coordinator>>;

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub key: f64,
}

/// `range: null` clears the brush.
#[derive(Debug, Deserialize)]
pub struct BrushRequest {
    pub range: Option<[f64; 2]>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkBody {
    pub link: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn routes(
    coordinator: SharedCoordinator,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    // 1. GET /facets
    let facets = warp::get()
        .and(warp::path!("facets"))
        .and(with_coordinator(coordinator.clone()))
        .map(|c: SharedCoordinator| respond(with_lock(&c, |c| c.refresh())));

    // 2. POST /facets/{code}/toggle
    let toggle = warp::post()
        .and(warp::path!("facets" / String / "toggle"))
        .and(warp::body::json())
        .and(with_coordinator(coordinator.clone()))
        .map(|code: String, req: ToggleRequest, c: SharedCoordinator| {
            respond(with_lock(&c, |c| {
                let id = c.facet_id(&code)?;
                c.toggle(id, req.key)
            }))
        });

    // 3. POST /facets/{code}/reset
    let reset = warp::post()
        .and(warp::path!("facets" / String / "reset"))
        .and(with_coordinator(coordinator.clone()))
        .map(|code: String, c: SharedCoordinator| {
            respond(with_lock(&c, |c| {
                let id = c.facet_id(&code)?;
                c.reset(id)
            }))
        });

    // 4. POST /facets/{code}/brush
    let brush = warp::post()
        .and(warp::path!("facets" / String / "brush"))
        .and(warp::body::json())
        .and(with_coordinator(coordinator.clone()))
        .map(|code: String, req: BrushRequest, c: SharedCoordinator| {
            respond(with_lock(&c, |c| {
                let id = c.facet_id(&code)?;
                c.brush_set_externally(id, req.range.map(|[lo, hi]| Extent::new(lo, hi)))
            }))
        });

    // 5. GET /link
    let link = warp::get()
        .and(warp::path!("link"))
        .and(with_coordinator(coordinator.clone()))
        .map(|c: SharedCoordinator| respond(with_lock(&c, |c| Ok(LinkBody { link: c.link() }))));

    // 6. POST /link
    let restore = warp::post()
        .and(warp::path!("link"))
        .and(warp::body::json())
        .and(with_coordinator(coordinator))
        .map(|body: LinkBody, c: SharedCoordinator| {
            respond(with_lock(&c, |c| c.restore_link(&body.link)))
        });

    facets
        .or(toggle)
        .unify()
        .or(reset)
        .unify()
        .or(brush)
        .unify()
        .or(link)
        .unify()
        .or(restore)
        .unify()
}

pub async fn serve(coordinator: SharedCoordinator, addr: SocketAddr) {
    info!(%addr, "HTTP API listening");
    warp::serve(routes(coordinator)).run(addr).await;
}

fn with_coordinator(
    coordinator: SharedCoordinator,
) -> impl Filter<Extract = (SharedCoordinator,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || coordinator.clone())
}

fn with_lock<T>(coordinator: &SharedCoordinator, op: impl FnOnce(&mut Coordinator) -> Result<T>) -> Result<T> {
    let mut guard = coordinator.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    op(&mut guard)
}

fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(body) => warp::reply::json(&body).into_response(),
        Err(e) => {
            let status = match &e {
                ExplorerError::Facet(FacetError::UnknownFacet(_)) => StatusCode::NOT_FOUND,
                ExplorerError::Facet(FacetError::ModeMismatch { .. })
                | ExplorerError::Facet(FacetError::IllegalBucket { .. })
                | ExplorerError::Parse(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(error = %e, %status, "request failed");
            let body = ErrorBody { error: e.to_string() };
            warp::reply::with_status(warp::reply::json(&body), status).into_response()
        }
    }
}
