use crate::catalog::{self, Catalog, MovieSummary};
use crate::database::*;
use crate::error::log_error;
use crate::model::*;
use crate::session::UserSession;
use crate::{CatalogData, Db, Tera};
use actix_web::{error, http::header, web, HttpResponse};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the account allowed into the admin panel.
pub struct Admin(pub String);

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

fn db_error(err: StoreError) -> error::Error {
    log_error(err, "Database error")
}

fn render(tera: &tera::Tera, template: &str, ctx: &tera::Context) -> actix_web::Result<HttpResponse> {
    let body = tera
        .render(template, ctx)
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::Ok().content_type("text/html").body(body))
}

/// Context every page starts from: the logged-in user and the pending
/// flash message, which is consumed here.
fn page_context(session: &UserSession) -> tera::Context {
    let mut ctx = tera::Context::new();
    ctx.insert("user", &session.user());
    ctx.insert("flash", &session.take_flash());
    ctx
}

#[derive(Serialize, Debug)]
struct MovieCard {
    id: u64,
    title: String,
    overview: String,
    poster: String,
    release_date: Option<String>,
    custom: bool,
    likes: u64,
}

impl From<CustomMovie> for MovieCard {
    fn from(movie: CustomMovie) -> Self {
        MovieCard {
            id: movie.id,
            title: movie.title,
            overview: movie.description,
            poster: movie.poster,
            release_date: None,
            custom: true,
            likes: 0,
        }
    }
}

impl From<MovieSummary> for MovieCard {
    fn from(movie: MovieSummary) -> Self {
        MovieCard {
            id: movie.id,
            poster: catalog::poster_url(movie.poster_path.as_deref())
                .unwrap_or_else(|| PLACEHOLDER_POSTER.to_owned()),
            title: movie.title,
            overview: movie.overview,
            release_date: movie.release_date,
            custom: false,
            likes: 0,
        }
    }
}

pub async fn index(session: UserSession) -> HttpResponse {
    match session.user() {
        Some(_) => redirect("/dashboard"),
        None => redirect("/login"),
    }
}

pub async fn login(session: UserSession, tera: Tera) -> actix_web::Result<HttpResponse> {
    render(&tera, "login.html", &page_context(&session))
}

#[derive(Serialize, Deserialize)]
pub struct LoginParams {
    identifier: String,
    password: String,
}

pub async fn login_post(
    params: web::Form<LoginParams>,
    session: UserSession,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    if let Some(username) = db
        .validate_user(params.identifier.trim(), &params.password)
        .map_err(db_error)?
    {
        session.login(&username)?;
        info!("User {} logged in", username);
        session.flash(format!("Welcome {}", username), "success");
        return Ok(redirect("/dashboard"));
    }
    session.flash("Invalid credentials", "error");
    Ok(redirect("/login"))
}

pub async fn register(session: UserSession, tera: Tera) -> actix_web::Result<HttpResponse> {
    render(&tera, "register.html", &page_context(&session))
}

#[derive(Serialize, Deserialize)]
pub struct RegisterParams {
    username: String,
    email: String,
    password: String,
}

pub async fn register_post(
    params: web::Form<RegisterParams>,
    session: UserSession,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let username = params.username.trim();
    let email = params.email.trim();
    if username.is_empty() || email.is_empty() || params.password.is_empty() {
        session.flash("All fields are required", "error");
        return Ok(redirect("/register"));
    }
    if db.user_exists(username, email).map_err(db_error)? {
        session.flash("Username or email already registered", "error");
        return Ok(redirect("/register"));
    }
    db.add_user(username, email, &params.password)
        .map_err(db_error)?;
    info!("Registered user {}", username);
    session.flash("Registration successful", "success");
    Ok(redirect("/login"))
}

pub async fn logout(session: UserSession) -> HttpResponse {
    session.logout();
    session.flash("Session closed", "success");
    redirect("/login")
}

#[derive(Deserialize)]
pub struct DashboardParams {
    page: Option<u32>,
    #[serde(default)]
    query: String,
}

pub async fn dashboard(
    params: web::Query<DashboardParams>,
    session: UserSession,
    tera: Tera,
    db: Db,
    catalog: CatalogData,
) -> actix_web::Result<HttpResponse> {
    if session.user().is_none() {
        return Ok(redirect("/login"));
    }
    let page = params.page.unwrap_or(1).max(1);
    let query = params.query.trim();
    let mut ctx = page_context(&session);
    ctx.insert("catalog_error", &false);

    let mut movies: Vec<MovieCard> = Vec::new();
    if page == 1 {
        let custom = if query.is_empty() {
            db.list_movies()
        } else {
            db.search_movies(query)
        }
        .map_err(db_error)?;
        movies.extend(custom.into_iter().map(MovieCard::from));
    }

    let fetched = if query.is_empty() {
        catalog.discover(page).await
    } else {
        catalog.search(query, page).await
    };
    match fetched {
        Ok(results) => movies.extend(results.into_iter().map(MovieCard::from)),
        Err(err) => {
            warn!("Catalog unavailable for dashboard: {}", err);
            ctx.insert("catalog_error", &true);
        }
    }

    let ids: Vec<u64> = movies.iter().map(|movie| movie.id).collect();
    let likes = db.like_counts(&ids).map_err(db_error)?;
    for movie in &mut movies {
        movie.likes = likes.get(&movie.id).copied().unwrap_or(0);
    }

    ctx.insert("movies", &movies);
    ctx.insert("page", &page);
    ctx.insert("prev_page", &page.checked_sub(1).filter(|prev| *prev > 0));
    ctx.insert("next_page", &page.checked_add(1));
    ctx.insert("query", query);
    render(&tera, "dashboard.html", &ctx)
}

#[derive(Serialize, Debug)]
struct MovieView {
    id: u64,
    title: String,
    overview: String,
    poster: String,
    release_date: Option<String>,
    runtime: Option<u32>,
    vote_average: Option<f64>,
    genres: Vec<String>,
    custom: bool,
}

pub async fn movie_detail(
    path: web::Path<u64>,
    session: UserSession,
    tera: Tera,
    db: Db,
    catalog: CatalogData,
) -> actix_web::Result<HttpResponse> {
    let user = match session.user() {
        Some(user) => user,
        None => return Ok(redirect("/login")),
    };
    let movie_id = path.into_inner();
    let mut ctx = page_context(&session);

    let mut recommendations: Vec<MovieCard> = Vec::new();
    let mut trailer_key = None;
    let movie = if let Some(movie) = db.get_movie(movie_id).map_err(db_error)? {
        MovieView {
            id: movie.id,
            title: movie.title,
            overview: movie.description,
            poster: movie.poster,
            release_date: None,
            runtime: None,
            vote_average: None,
            genres: Vec::new(),
            custom: true,
        }
    } else {
        let details = match catalog.details(movie_id).await {
            Ok(Some(details)) => details,
            Ok(None) => {
                ctx.insert("message", "Movie not found");
                let body = tera
                    .render("not_found.html", &ctx)
                    .map_err(|err| log_error(err, "Template error"))?;
                return Ok(HttpResponse::NotFound().content_type("text/html").body(body));
            }
            Err(err) => {
                warn!("Catalog unavailable for movie {}: {}", movie_id, err);
                return Err(error::ErrorBadGateway("Movie catalog unavailable"));
            }
        };
        match catalog.videos(movie_id).await {
            Ok(videos) => trailer_key = catalog::trailer_key(&videos).map(str::to_owned),
            Err(err) => warn!("No videos for movie {}: {}", movie_id, err),
        }
        match catalog.recommendations(movie_id).await {
            Ok(movies) => recommendations.extend(movies.into_iter().take(8).map(MovieCard::from)),
            Err(err) => warn!("No recommendations for movie {}: {}", movie_id, err),
        }
        MovieView {
            id: details.id,
            poster: catalog::poster_url(details.poster_path.as_deref())
                .unwrap_or_else(|| PLACEHOLDER_POSTER.to_owned()),
            title: details.title,
            overview: details.overview,
            release_date: details.release_date,
            runtime: details.runtime,
            vote_average: Some(details.vote_average),
            genres: details.genres.into_iter().map(|genre| genre.name).collect(),
            custom: false,
        }
    };

    ctx.insert("movie", &movie);
    ctx.insert("recommendations", &recommendations);
    ctx.insert("trailer_key", &trailer_key);
    ctx.insert("likes", &db.count_likes(movie_id).map_err(db_error)?);
    ctx.insert("dislikes", &db.count_dislikes(movie_id).map_err(db_error)?);
    ctx.insert(
        "user_rating",
        &db.get_user_rating(&user, movie_id).map_err(db_error)?.value(),
    );
    render(&tera, "movie.html", &ctx)
}

pub async fn add_movie(session: UserSession, tera: Tera) -> actix_web::Result<HttpResponse> {
    if session.user().is_none() {
        return Ok(redirect("/login"));
    }
    let mut ctx = page_context(&session);
    ctx.insert("error", &None::<&str>);
    ctx.insert("form", &AddMovieParams::default());
    render(&tera, "add_movie.html", &ctx)
}

#[derive(Serialize, Deserialize, Default)]
pub struct AddMovieParams {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    poster: Option<String>,
}

pub async fn add_movie_post(
    params: web::Form<AddMovieParams>,
    session: UserSession,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let user = match session.user() {
        Some(user) => user,
        None => return Ok(redirect("/login")),
    };
    let title = params.title.trim();
    if title.is_empty() {
        let mut ctx = page_context(&session);
        ctx.insert("error", "Title is required");
        ctx.insert("form", &*params);
        return render(&tera, "add_movie.html", &ctx);
    }
    let id = db
        .add_movie(title, params.description.trim(), params.poster.as_deref())
        .map_err(db_error)?;
    info!("User {} added movie {} ({})", user, id, title);
    session.flash("Movie added", "success");
    Ok(redirect(&format!("/movie/{}", id)))
}

#[derive(Serialize, Debug)]
struct AdminRow {
    username: String,
    movie_id: u64,
    title: String,
    rating: i8,
}

async fn resolve_title(db: &FileDb, catalog: &dyn Catalog, movie_id: u64) -> String {
    if let Ok(Some(movie)) = db.get_movie(movie_id) {
        return movie.title;
    }
    match catalog.details(movie_id).await {
        Ok(Some(details)) if !details.title.is_empty() => details.title,
        Ok(_) => format!("ID {}", movie_id),
        Err(err) => {
            warn!("Title lookup failed for movie {}: {}", movie_id, err);
            format!("ID {}", movie_id)
        }
    }
}

fn is_admin(session: &UserSession, admin: &Admin) -> bool {
    session.user().as_deref() == Some(admin.0.as_str())
}

pub async fn admin_panel(
    session: UserSession,
    tera: Tera,
    db: Db,
    catalog: CatalogData,
    admin: web::Data<Admin>,
) -> actix_web::Result<HttpResponse> {
    if !is_admin(&session, &admin) {
        session.flash("Access denied", "error");
        return Ok(redirect("/login"));
    }

    let ratings = db.list_ratings().map_err(db_error)?;
    let mut titles: HashMap<u64, String> = HashMap::new();
    let mut rows = Vec::with_capacity(ratings.len());
    for entry in ratings {
        if !titles.contains_key(&entry.movie_id) {
            let title = resolve_title(&db, catalog.get_ref(), entry.movie_id).await;
            titles.insert(entry.movie_id, title);
        }
        rows.push(AdminRow {
            title: titles[&entry.movie_id].clone(),
            username: entry.username,
            movie_id: entry.movie_id,
            rating: entry.rating.value(),
        });
    }

    let mut ctx = page_context(&session);
    ctx.insert("ratings", &rows);
    render(&tera, "admin.html", &ctx)
}

pub async fn admin_delete_rating(
    path: web::Path<(String, u64)>,
    session: UserSession,
    db: Db,
    admin: web::Data<Admin>,
) -> actix_web::Result<HttpResponse> {
    if !is_admin(&session, &admin) {
        return Ok(redirect("/login"));
    }
    let (username, movie_id) = path.into_inner();
    if db.remove_rating(&username, movie_id).map_err(db_error)? {
        info!("Admin removed rating of {} on movie {}", username, movie_id);
        session.flash("Rating deleted", "success");
    }
    Ok(redirect("/admin"))
}

pub async fn not_found(session: UserSession, tera: Tera) -> actix_web::Result<HttpResponse> {
    let mut ctx = page_context(&session);
    ctx.insert("message", "Page not found");
    let body = tera
        .render("not_found.html", &ctx)
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::NotFound().content_type("text/html").body(body))
}
