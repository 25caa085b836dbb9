mod api;
mod catalog;
mod config;
mod database;
mod error;
mod model;
mod pages;
mod session;

use actix_identity::{config::LogoutBehaviour, IdentityMiddleware};
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{cookie::Key, middleware::Logger, web, App, HttpServer};
use catalog::{Catalog, Tmdb};
use config::Config;
use database::{FileDb, LEGACY_LIKES_FILE};
use log::info;
use std::io;
use std::sync::Arc;

pub type Tera = web::Data<tera::Tera>;
pub type Db = web::Data<FileDb>;
pub type CatalogData = web::Data<dyn Catalog>;

const TEMPLATES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*");

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(pages::index))
        .route("/login", web::get().to(pages::login))
        .route("/login", web::post().to(pages::login_post))
        .route("/register", web::get().to(pages::register))
        .route("/register", web::post().to(pages::register_post))
        .route("/logout", web::get().to(pages::logout))
        .route("/dashboard", web::get().to(pages::dashboard))
        .route("/movie/{id}", web::get().to(pages::movie_detail))
        .route("/add-movie", web::get().to(pages::add_movie))
        .route("/add-movie", web::post().to(pages::add_movie_post))
        .route("/admin", web::get().to(pages::admin_panel))
        .route(
            "/admin/delete-like/{username}/{id}",
            web::post().to(pages::admin_delete_rating),
        )
        .service(
            web::scope("/api")
                .route("/movie", web::get().to(api::list_movies))
                .route("/movies", web::get().to(api::list_movies))
                .route("/movie/add", web::post().to(api::add_movie))
                .route("/movie/{id}", web::get().to(api::get_movie))
                .route("/movie/{id}", web::delete().to(api::delete_movie))
                .route("/movie/{id}/rate", web::get().to(api::get_rating))
                .route("/movie/{id}/rate", web::post().to(api::rate_movie))
                .route("/movie/{id}/trailer", web::get().to(api::trailer))
                .route("/like/{id}", web::post().to(api::like_movie)),
        );
}

pub fn identity_middleware() -> IdentityMiddleware {
    // keep the rest of the session alive on logout so the flash survives
    IdentityMiddleware::builder()
        .logout_behaviour(LogoutBehaviour::DeleteIdentityKeys)
        .build()
}

pub fn session_middleware(key: Key) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("auth-cookie".to_owned())
        .cookie_secure(false)
        .build()
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("movieshelf=debug,actix_web=info"),
    )
    .init();

    let config =
        Config::from_env().map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    let db = FileDb::open(&config.data_dir, config.passwords)?;
    db.import_legacy_likes(config.data_dir.join(LEGACY_LIKES_FILE))
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    let db = web::Data::new(db);

    let tmdb = Tmdb::new(
        &config.tmdb_base_url,
        &config.tmdb_api_key,
        &config.tmdb_language,
        config.tmdb_timeout,
    )
    .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    let catalog: CatalogData = web::Data::from(Arc::new(tmdb) as Arc<dyn Catalog>);

    let tera = tera::Tera::new(TEMPLATES).map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    let tera = web::Data::new(tera);
    let admin = web::Data::new(pages::Admin(config.admin_username.clone()));

    let key = match &config.session_key {
        Some(key) => Key::from(key.as_slice()),
        None => Key::generate(),
    };

    info!(
        "Serving on {}:{} with data in {}",
        config.host,
        config.port,
        config.data_dir.display()
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(identity_middleware())
            .wrap(session_middleware(key.clone()))
            .app_data(tera.clone())
            .app_data(db.clone())
            .app_data(catalog.clone())
            .app_data(admin.clone())
            .configure(routes)
            .default_service(web::to(pages::not_found))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
