mod config;
mod database;
mod error;
mod handlers;
mod model;
mod service;
mod session;

use actix_identity::IdentityMiddleware;
use actix_web::{middleware::Logger, web, App, HttpServer};
use config::Config;
use std::io;

fn startup_error<E: std::fmt::Display>(err: E, message: &'static str) -> io::Error {
    log::error!("{}: {}", message, err);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", message, err))
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("kinoticket=debug,actix_web=info"),
    )
    .init();

    let config = Config::from_env().map_err(|err| startup_error(err, "Configuration error"))?;
    let key = config.session_key();
    let tera = tera::Tera::new(&config.templates_glob())
        .map_err(|err| startup_error(err, "Template error"))?;
    let db = sled::open(&config.database_path)
        .map_err(|err| startup_error(err, "Database error"))?;
    let seeded = database::seed_films(&db).map_err(|err| startup_error(err, "Database error"))?;
    if seeded > 0 {
        log::info!("Seeded {} films", seeded);
    }

    let bind_addr = config.bind_addr.clone();
    let secure = config.secure_cookies;
    let tera = web::Data::new(tera);
    let db = web::Data::new(db);
    let config = web::Data::new(config);
    log::info!("Listening on http://{}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(IdentityMiddleware::default())
            .wrap(session::session_middleware(key.clone(), secure))
            .wrap(Logger::default())
            .app_data(tera.clone())
            .app_data(db.clone())
            .app_data(config.clone())
            .configure(handlers::routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}
