use serde::{Deserialize, Serialize};
use std::fmt;

/// Curated movie ids are issued strictly above this value so they never
/// collide with the low ids handed out by the catalog.
pub const CUSTOM_MOVIE_ID_FLOOR: u64 = 100_000;

pub const PLACEHOLDER_POSTER: &str = "https://via.placeholder.com/300x450?text=No+Image";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,
    pub email: String,
    /// Either a bcrypt hash or, for rows written in plaintext mode, the raw
    /// password. The column keeps its historical name.
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CustomMovie {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub poster: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(into = "i8", try_from = "i8")]
pub enum Rating {
    Like,
    Dislike,
    #[default]
    None,
}

impl Rating {
    pub fn value(self) -> i8 {
        match self {
            Rating::Like => 1,
            Rating::Dislike => -1,
            Rating::None => 0,
        }
    }
}

impl From<Rating> for i8 {
    fn from(rating: Rating) -> i8 {
        rating.value()
    }
}

#[derive(Debug, PartialEq)]
pub struct InvalidRating(pub i64);

impl fmt::Display for InvalidRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rating value {}", self.0)
    }
}

impl TryFrom<i64> for Rating {
    type Error = InvalidRating;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Rating::Like),
            -1 => Ok(Rating::Dislike),
            0 => Ok(Rating::None),
            other => Err(InvalidRating(other)),
        }
    }
}

impl TryFrom<i8> for Rating {
    type Error = InvalidRating;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        Rating::try_from(i64::from(value))
    }
}

/// One row of the admin panel.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RatingEntry {
    pub username: String,
    pub movie_id: u64,
    pub rating: Rating,
}
