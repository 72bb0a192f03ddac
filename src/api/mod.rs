use rocket::Route;

mod results;
mod tokens;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(voting::routes());
    routes.extend(tokens::routes());
    routes.extend(results::routes());
    routes
}
