use crate::catalog;
use crate::database::*;
use crate::error::ApiError;
use crate::model::*;
use crate::session::UserSession;
use crate::{CatalogData, Db};
use actix_web::{web, Either, HttpResponse};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

type ApiResult = Result<HttpResponse, ApiError>;

/// Parameters sent either as a JSON body or in the query string.
type Params<T> = Either<web::Json<T>, web::Query<T>>;

fn into_params<T>(params: Params<T>) -> T {
    match params {
        Either::Left(json) => json.into_inner(),
        Either::Right(query) => query.into_inner(),
    }
}

fn require_user(session: &UserSession) -> Result<String, ApiError> {
    session.user().ok_or(ApiError::Unauthorized)
}

pub async fn list_movies(db: Db) -> ApiResult {
    let movies = db
        .list_movies()
        .map_err(ApiError::internal("Database error"))?;
    Ok(HttpResponse::Ok().json(json!({ "movies": movies })))
}

pub async fn get_movie(path: web::Path<u64>, db: Db) -> ApiResult {
    let movie = db
        .get_movie(path.into_inner())
        .map_err(ApiError::internal("Database error"))?
        .ok_or(ApiError::NotFound("Movie not found"))?;
    Ok(HttpResponse::Ok().json(movie))
}

#[derive(Deserialize)]
pub struct NewMovie {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    poster: Option<String>,
}

pub async fn add_movie(params: Params<NewMovie>, db: Db) -> ApiResult {
    let params = into_params(params);
    let title = params.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required"));
    }
    let id = db
        .add_movie(title, params.description.trim(), params.poster.as_deref())
        .map_err(ApiError::internal("Database error"))?;
    info!("Added movie {} ({}) through the API", id, title);
    Ok(HttpResponse::Created().json(json!({ "message": "created", "id": id })))
}

pub async fn delete_movie(path: web::Path<u64>, db: Db) -> ApiResult {
    let id = path.into_inner();
    if !db
        .delete_movie(id)
        .map_err(ApiError::internal("Database error"))?
    {
        return Err(ApiError::NotFound("Movie not found"));
    }
    info!("Deleted movie {}", id);
    Ok(HttpResponse::Ok().json(json!({ "message": "deleted", "status": "deleted", "id": id })))
}

fn rating_summary(db: &FileDb, username: &str, movie_id: u64) -> Result<serde_json::Value, ApiError> {
    let rating = db
        .get_user_rating(username, movie_id)
        .map_err(ApiError::internal("Database error"))?;
    let likes = db
        .count_likes(movie_id)
        .map_err(ApiError::internal("Database error"))?;
    let dislikes = db
        .count_dislikes(movie_id)
        .map_err(ApiError::internal("Database error"))?;
    Ok(json!({
        "movie_id": movie_id,
        "rating": rating,
        "likes": likes,
        "dislikes": dislikes,
    }))
}

pub async fn get_rating(path: web::Path<u64>, session: UserSession, db: Db) -> ApiResult {
    let username = require_user(&session)?;
    Ok(HttpResponse::Ok().json(rating_summary(&db, &username, path.into_inner())?))
}

#[derive(Deserialize)]
pub struct RateParams {
    rating: i64,
}

pub async fn rate_movie(
    path: web::Path<u64>,
    params: Result<Params<RateParams>, actix_web::Error>,
    session: UserSession,
    db: Db,
) -> ApiResult {
    let username = require_user(&session)?;
    let params = params
        .map(into_params)
        .map_err(|_| ApiError::BadRequest("Invalid rating"))?;
    let rating = match Rating::try_from(params.rating) {
        Ok(rating) if rating != Rating::None => rating,
        _ => return Err(ApiError::BadRequest("Invalid rating")),
    };
    let movie_id = path.into_inner();
    db.rate_movie(&username, movie_id, rating)
        .map_err(ApiError::internal("Database error"))?;
    let mut body = rating_summary(&db, &username, movie_id)?;
    body["message"] = json!("rating updated");
    Ok(HttpResponse::Ok().json(body))
}

pub async fn like_movie(path: web::Path<u64>, session: UserSession, db: Db) -> ApiResult {
    let username = require_user(&session)?;
    let movie_id = path.into_inner();
    db.rate_movie(&username, movie_id, Rating::Like)
        .map_err(ApiError::internal("Database error"))?;
    let likes = db
        .count_likes(movie_id)
        .map_err(ApiError::internal("Database error"))?;
    Ok(HttpResponse::Ok().json(json!({ "status": "ok", "likes": likes })))
}

pub async fn trailer(path: web::Path<u64>, catalog: CatalogData) -> ApiResult {
    let movie_id = path.into_inner();
    let videos = catalog.videos(movie_id).await.map_err(|err| {
        warn!("Trailer lookup failed for movie {}: {}", movie_id, err);
        ApiError::BadGateway("Movie catalog unavailable")
    })?;
    let key = catalog::trailer_key(&videos).ok_or(ApiError::NotFound("Trailer not found"))?;
    Ok(HttpResponse::Ok().json(json!({ "trailer_url": catalog::youtube_embed_url(key) })))
}
