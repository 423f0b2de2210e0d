use rocket::{Catcher, Route};

mod audit;
mod elections;
mod results;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(voting::routes());
    routes.extend(results::routes());
    routes.extend(audit::routes());
    routes.extend(elections::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![crate::error::default_catcher]
}
