use bytes::Bytes;
use chrono::{DateTime, Utc};
use holgithub_core::{Image, RepoDto};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A holgithub account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    /// The argon2 hash of the password, in PHC string format
    pub password: String,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

impl SessionData {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// A repository in the game pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoData {
    pub id: PrimaryKey,
    /// The full name, like `owner/name`
    pub name: String,
    pub description: Option<String>,
    pub star_amount: u32,
    pub image: Bytes,
    pub image_type: String,
}

impl RepoData {
    /// The public fields of the repository, with the star count withheld
    pub fn to_hidden_dto(&self) -> RepoDto {
        RepoDto {
            name: self.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            star_amount: None,
        }
    }

    pub fn to_image(&self) -> Image {
        Image::new(self.image_type.clone(), self.image.clone())
    }
}

/// A finished round of the game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameData {
    pub id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub score: u32,
}

/// Aggregated results of a user's finished rounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreSummary {
    pub best: u32,
    pub played: u32,
}
