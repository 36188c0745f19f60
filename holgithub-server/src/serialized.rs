//! All schemas that are exposed from endpoints are defined here
//! along with the From<T> impls

use holgithub_collab::{ScoreSummary, UserData};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::Identity;

#[derive(Debug, Serialize, ToSchema)]
pub struct User {
    username: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Scores {
    /// The highest score of any finished round
    best: u32,
    /// How many rounds have been finished
    played: u32,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            username: self.username.clone(),
        }
    }
}

impl ToSerialized<User> for Identity {
    fn to_serialized(&self) -> User {
        User {
            username: self.username.clone(),
        }
    }
}

impl ToSerialized<Scores> for ScoreSummary {
    fn to_serialized(&self) -> Scores {
        Scores {
            best: self.best,
            played: self.played,
        }
    }
}
