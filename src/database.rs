use crate::model::*;
use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Password hashing error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

pub trait UserDb {
    type Error;
    fn user_exists(&self, username: &str, email: &str) -> Result<bool, Self::Error>;
    /// Returns the username of the account matching `identifier` (username
    /// or email) and `password`.
    fn validate_user(&self, identifier: &str, password: &str)
        -> Result<Option<String>, Self::Error>;
    fn add_user(&self, username: &str, email: &str, password: &str) -> Result<(), Self::Error>;
}

pub trait MovieDb {
    type Error;
    fn list_movies(&self) -> Result<Vec<CustomMovie>, Self::Error>;
    fn get_movie(&self, id: u64) -> Result<Option<CustomMovie>, Self::Error>;
    fn search_movies(&self, query: &str) -> Result<Vec<CustomMovie>, Self::Error>;
    fn add_movie(
        &self,
        title: &str,
        description: &str,
        poster: Option<&str>,
    ) -> Result<u64, Self::Error>;
    fn delete_movie(&self, id: u64) -> Result<bool, Self::Error>;
}

pub trait RatingDb {
    type Error;
    fn rate_movie(&self, username: &str, movie_id: u64, rating: Rating)
        -> Result<(), Self::Error>;
    fn get_user_rating(&self, username: &str, movie_id: u64) -> Result<Rating, Self::Error>;
    fn count_likes(&self, movie_id: u64) -> Result<u64, Self::Error>;
    fn count_dislikes(&self, movie_id: u64) -> Result<u64, Self::Error>;
    fn like_counts(&self, movie_ids: &[u64]) -> Result<HashMap<u64, u64>, Self::Error>;
    fn list_ratings(&self) -> Result<Vec<RatingEntry>, Self::Error>;
    fn remove_rating(&self, username: &str, movie_id: u64) -> Result<bool, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PasswordPolicy {
    Bcrypt(u32),
    Plaintext,
}

const USERS_FILE: &str = "users.csv";
const MOVIES_FILE: &str = "custom_movies.json";
const RATINGS_FILE: &str = "ratings.json";
pub const LEGACY_LIKES_FILE: &str = "likes.json";

/// Flat-file backing for the three stores. Every mutation reads the whole
/// file and rewrites it; the per-file locks only serialize writers inside
/// this process.
pub struct FileDb {
    users_path: PathBuf,
    movies_path: PathBuf,
    ratings_path: PathBuf,
    passwords: PasswordPolicy,
    users_lock: Mutex<()>,
    movies_lock: Mutex<()>,
    ratings_lock: Mutex<()>,
}

#[derive(Serialize, Deserialize, Default)]
struct MovieDocument {
    #[serde(default)]
    movies: Vec<CustomMovie>,
    #[serde(default)]
    last_id: u64,
}

/// Per-user entry as found on disk: the signed map, or a plain list of
/// liked ids written by older versions.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRatings {
    Signed(BTreeMap<String, i64>),
    Likes(Vec<u64>),
}

type RatingMap = BTreeMap<String, BTreeMap<u64, Rating>>;

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    match fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err.into()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

fn stored_to_ratings(username: &str, stored: StoredRatings) -> BTreeMap<u64, Rating> {
    match stored {
        StoredRatings::Likes(ids) => ids.into_iter().map(|id| (id, Rating::Like)).collect(),
        StoredRatings::Signed(entries) => entries
            .into_iter()
            .filter_map(|(id, value)| match (id.parse::<u64>(), Rating::try_from(value)) {
                (Ok(_), Ok(Rating::None)) => None,
                (Ok(id), Ok(rating)) => Some((id, rating)),
                _ => {
                    warn!("Skipping malformed rating {}={} of {}", id, value, username);
                    None
                }
            })
            .collect(),
    }
}

fn read_ratings(path: &Path) -> Result<RatingMap, StoreError> {
    let stored: BTreeMap<String, StoredRatings> = read_json(path)?;
    Ok(stored
        .into_iter()
        .map(|(username, entry)| {
            let ratings = stored_to_ratings(&username, entry);
            (username, ratings)
        })
        .collect())
}

fn write_ratings(path: &Path, ratings: &RatingMap) -> Result<(), StoreError> {
    let stored: BTreeMap<&str, BTreeMap<String, i8>> = ratings
        .iter()
        .map(|(username, movies)| {
            let movies = movies
                .iter()
                .map(|(id, rating)| (id.to_string(), rating.value()))
                .collect();
            (username.as_str(), movies)
        })
        .collect();
    write_json(path, &stored)
}

impl FileDb {
    pub fn open<P: AsRef<Path>>(data_dir: P, passwords: PasswordPolicy) -> io::Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        Ok(FileDb {
            users_path: data_dir.join(USERS_FILE),
            movies_path: data_dir.join(MOVIES_FILE),
            ratings_path: data_dir.join(RATINGS_FILE),
            passwords,
            users_lock: Mutex::new(()),
            movies_lock: Mutex::new(()),
            ratings_lock: Mutex::new(()),
        })
    }

    /// Copies a like-set file into the ratings file when no ratings file
    /// exists yet. Returns the number of imported ratings.
    pub fn import_legacy_likes<P: AsRef<Path>>(&self, legacy: P) -> Result<usize, StoreError> {
        let _guard = lock(&self.ratings_lock);
        let legacy = legacy.as_ref();
        if self.ratings_path.exists() || !legacy.exists() {
            return Ok(0);
        }
        let ratings = read_ratings(legacy)?;
        write_ratings(&self.ratings_path, &ratings)?;
        let count: usize = ratings.values().map(BTreeMap::len).sum();
        info!("Imported {} ratings from {}", count, legacy.display());
        Ok(count)
    }

    fn load_users(&self) -> Result<Vec<User>, StoreError> {
        if !self.users_path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.users_path)?;
        let users = reader.deserialize().collect::<Result<Vec<User>, _>>()?;
        Ok(users)
    }

    /// Hashed rows go through bcrypt; anything that does not parse as a
    /// hash is a plaintext row and compares exactly.
    fn password_matches(&self, stored: &str, password: &str) -> bool {
        if stored.starts_with("$2") {
            match bcrypt::verify(password, stored) {
                Ok(matches) => return matches,
                Err(err) => debug!("Stored password is not a bcrypt hash: {}", err),
            }
        }
        stored == password
    }
}

impl UserDb for FileDb {
    type Error = StoreError;

    fn user_exists(&self, username: &str, email: &str) -> Result<bool, StoreError> {
        Ok(self
            .load_users()?
            .iter()
            .any(|user| user.username == username || user.email == email))
    }

    fn validate_user(&self, identifier: &str, password: &str) -> Result<Option<String>, StoreError> {
        for user in self.load_users()? {
            if (user.username == identifier || user.email == identifier)
                && self.password_matches(&user.password, password)
            {
                return Ok(Some(user.username));
            }
        }
        Ok(None)
    }

    fn add_user(&self, username: &str, email: &str, password: &str) -> Result<(), StoreError> {
        let password = match self.passwords {
            PasswordPolicy::Bcrypt(cost) => bcrypt::hash(password, cost)?,
            PasswordPolicy::Plaintext => password.to_owned(),
        };
        let user = User {
            username: username.to_owned(),
            email: email.to_owned(),
            password,
        };

        let _guard = lock(&self.users_lock);
        let write_header = fs::metadata(&self.users_path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.users_path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(&user)?;
        writer.flush()?;
        Ok(())
    }
}

impl MovieDb for FileDb {
    type Error = StoreError;

    fn list_movies(&self) -> Result<Vec<CustomMovie>, StoreError> {
        Ok(read_json::<MovieDocument>(&self.movies_path)?.movies)
    }

    fn get_movie(&self, id: u64) -> Result<Option<CustomMovie>, StoreError> {
        Ok(self.list_movies()?.into_iter().find(|movie| movie.id == id))
    }

    fn search_movies(&self, query: &str) -> Result<Vec<CustomMovie>, StoreError> {
        let query = query.trim().to_lowercase();
        Ok(self
            .list_movies()?
            .into_iter()
            .filter(|movie| movie.title.to_lowercase().contains(&query))
            .collect())
    }

    fn add_movie(
        &self,
        title: &str,
        description: &str,
        poster: Option<&str>,
    ) -> Result<u64, StoreError> {
        let _guard = lock(&self.movies_lock);
        let mut document: MovieDocument = read_json(&self.movies_path)?;
        let id = document
            .movies
            .iter()
            .map(|movie| movie.id)
            .max()
            .unwrap_or(0)
            .max(document.last_id)
            .max(CUSTOM_MOVIE_ID_FLOOR)
            + 1;
        let poster = poster
            .map(str::trim)
            .filter(|poster| !poster.is_empty())
            .unwrap_or(PLACEHOLDER_POSTER);
        document.movies.push(CustomMovie {
            id,
            title: title.to_owned(),
            description: description.to_owned(),
            poster: poster.to_owned(),
        });
        document.last_id = id;
        write_json(&self.movies_path, &document)?;
        Ok(id)
    }

    fn delete_movie(&self, id: u64) -> Result<bool, StoreError> {
        let _guard = lock(&self.movies_lock);
        let mut document: MovieDocument = read_json(&self.movies_path)?;
        let before = document.movies.len();
        document.movies.retain(|movie| movie.id != id);
        if document.movies.len() == before {
            return Ok(false);
        }
        // keep the high water mark of documents written before it existed
        document.last_id = document.last_id.max(id);
        write_json(&self.movies_path, &document)?;
        Ok(true)
    }
}

impl RatingDb for FileDb {
    type Error = StoreError;

    fn rate_movie(&self, username: &str, movie_id: u64, rating: Rating) -> Result<(), StoreError> {
        let _guard = lock(&self.ratings_lock);
        let mut ratings = read_ratings(&self.ratings_path)?;
        if rating == Rating::None {
            if let Some(movies) = ratings.get_mut(username) {
                movies.remove(&movie_id);
            }
        } else {
            ratings
                .entry(username.to_owned())
                .or_default()
                .insert(movie_id, rating);
        }
        ratings.retain(|_, movies| !movies.is_empty());
        write_ratings(&self.ratings_path, &ratings)
    }

    fn get_user_rating(&self, username: &str, movie_id: u64) -> Result<Rating, StoreError> {
        Ok(read_ratings(&self.ratings_path)?
            .get(username)
            .and_then(|movies| movies.get(&movie_id).copied())
            .unwrap_or_default())
    }

    fn count_likes(&self, movie_id: u64) -> Result<u64, StoreError> {
        Ok(self.like_counts(&[movie_id])?.get(&movie_id).copied().unwrap_or(0))
    }

    fn count_dislikes(&self, movie_id: u64) -> Result<u64, StoreError> {
        Ok(read_ratings(&self.ratings_path)?
            .values()
            .filter(|movies| movies.get(&movie_id) == Some(&Rating::Dislike))
            .count() as u64)
    }

    fn like_counts(&self, movie_ids: &[u64]) -> Result<HashMap<u64, u64>, StoreError> {
        let ratings = read_ratings(&self.ratings_path)?;
        let mut counts: HashMap<u64, u64> = movie_ids.iter().map(|id| (*id, 0)).collect();
        for movies in ratings.values() {
            for (id, rating) in movies {
                if *rating == Rating::Like {
                    if let Some(count) = counts.get_mut(id) {
                        *count += 1;
                    }
                }
            }
        }
        Ok(counts)
    }

    fn list_ratings(&self) -> Result<Vec<RatingEntry>, StoreError> {
        Ok(read_ratings(&self.ratings_path)?
            .into_iter()
            .flat_map(|(username, movies)| {
                movies.into_iter().map(move |(movie_id, rating)| RatingEntry {
                    username: username.clone(),
                    movie_id,
                    rating,
                })
            })
            .collect())
    }

    fn remove_rating(&self, username: &str, movie_id: u64) -> Result<bool, StoreError> {
        let _guard = lock(&self.ratings_lock);
        let mut ratings = read_ratings(&self.ratings_path)?;
        let removed = ratings
            .get_mut(username)
            .and_then(|movies| movies.remove(&movie_id))
            .is_some();
        if removed {
            ratings.retain(|_, movies| !movies.is_empty());
            write_ratings(&self.ratings_path, &ratings)?;
        }
        Ok(removed)
    }
}
