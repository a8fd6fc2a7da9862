//! All API endpoint setup

use axum::Router;
use axum::routing::get;
use axum::routing::post;

use crate::storage::Storage;

pub use owner::JwtKeys;
pub use owner::Owner;
pub use request::Form;
pub use request::PathParameters;
pub use request::QueryParameters;
pub use response::Error;
pub use response::Success;

mod links;
mod owner;
mod request;
mod response;

/// Get the Axum router for all API routes
pub fn router<S: Storage>() -> Router {
    let links = Router::new()
        .route("/", get(links::list::<S>).post(links::create::<S>))
        .route("/protected", post(links::create_protected::<S>))
        .route("/location", post(links::create_location::<S>))
        .route("/analytics", get(links::analytics::<S>))
        .route(
            "/{code}",
            get(links::single::<S>).delete(links::delete::<S>),
        )
        .route("/{code}/unlock", post(links::unlock::<S>));

    Router::new().nest("/links", links)
}
