//! Messages exchanged by the game endpoints.
//!
//! Both game responses are multipart messages whose schema is fixed by
//! position, so encoding and decoding of each live side by side here.

use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use crate::{DecodeError, Image, MultipartMessage, Part, PartReader};

/// The public fields of a repository.
/// `star_amount` stays empty until the repository has been resolved by a guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoDto {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub star_amount: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReposDto {
    pub first: RepoDto,
    pub second: RepoDto,
}

/// Which of the two repositories the player thinks has more stars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Choice {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChooseRequest {
    pub choice: Choice,
}

/// Sent as the text of the first part of a choose response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessResult {
    Correct,
    Wrong,
}

impl GuessResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correct => "CORRECT",
            Self::Wrong => "WRONG",
        }
    }
}

impl Display for GuessResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuessResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CORRECT" => Ok(Self::Correct),
            "WRONG" => Ok(Self::Wrong),
            other => Err(format!("unknown guess result {:?}", other)),
        }
    }
}

/// Response to starting a new game: `[image, image, json(ReposDto)]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGameMessage {
    pub first_image: Image,
    pub second_image: Image,
    pub repos: ReposDto,
}

impl NewGameMessage {
    pub fn into_multipart(self) -> Result<MultipartMessage, serde_json::Error> {
        Ok(MultipartMessage::new()
            .part(Part::image(self.first_image))
            .part(Part::image(self.second_image))
            .part(Part::json(&self.repos)?))
    }

    pub async fn decode(mut reader: PartReader<'_>) -> Result<Self, DecodeError> {
        let first_image = reader.image().await?;
        let second_image = reader.image().await?;
        let repos = reader.json().await?;

        reader.finish().await?;

        Ok(Self {
            first_image,
            second_image,
            repos,
        })
    }
}

/// Response to a guess: `[text(result), text(second repo stars)]`, followed by
/// `[image, json(RepoDto)]` for the next repository if the guess was correct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChooseMessage {
    Correct {
        second_repo_stars: u32,
        next_image: Image,
        next_repo: RepoDto,
    },
    Wrong {
        second_repo_stars: u32,
    },
}

impl ChooseMessage {
    pub fn result(&self) -> GuessResult {
        match self {
            Self::Correct { .. } => GuessResult::Correct,
            Self::Wrong { .. } => GuessResult::Wrong,
        }
    }

    /// The star count of the repository that was in the second slot when the guess was made
    pub fn second_repo_stars(&self) -> u32 {
        match self {
            Self::Correct {
                second_repo_stars, ..
            } => *second_repo_stars,
            Self::Wrong { second_repo_stars } => *second_repo_stars,
        }
    }

    pub fn into_multipart(self) -> Result<MultipartMessage, serde_json::Error> {
        let message = MultipartMessage::new()
            .part(Part::text(self.result().as_str()))
            .part(Part::text(self.second_repo_stars().to_string()));

        match self {
            Self::Correct {
                next_image,
                next_repo,
                ..
            } => Ok(message
                .part(Part::image(next_image))
                .part(Part::json(&next_repo)?)),
            Self::Wrong { .. } => Ok(message),
        }
    }

    pub async fn decode(mut reader: PartReader<'_>) -> Result<Self, DecodeError> {
        let result: GuessResult = reader.parse().await?;
        let second_repo_stars: u32 = reader.parse().await?;

        let message = match result {
            GuessResult::Correct => Self::Correct {
                second_repo_stars,
                next_image: reader.image().await?,
                next_repo: reader.json().await?,
            },
            GuessResult::Wrong => Self::Wrong { second_repo_stars },
        };

        reader.finish().await?;

        Ok(message)
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::{ChooseMessage, ChooseRequest, Choice, GuessResult, NewGameMessage, RepoDto, ReposDto};
    use crate::{DecodeError, Image, MultipartMessage, Part, PartReader, DEFAULT_READ_TIMEOUT};

    fn repo(name: &str, star_amount: Option<u32>) -> RepoDto {
        RepoDto {
            name: name.to_string(),
            description: format!("{} description", name),
            star_amount,
        }
    }

    fn reader(message: MultipartMessage) -> PartReader<'static> {
        let content_type = message.content_type();
        PartReader::from_content_type(message.into_stream(), &content_type, DEFAULT_READ_TIMEOUT)
            .unwrap()
    }

    #[tokio::test]
    async fn new_game_message_survives_the_wire() {
        let message = NewGameMessage {
            first_image: Image::jpeg(Bytes::from_static(b"first")),
            second_image: Image::new("image/png", Bytes::from_static(b"second")),
            repos: ReposDto {
                first: repo("torvalds/linux", None),
                second: repo("rust-lang/rust", None),
            },
        };

        let multipart = message.clone().into_multipart().unwrap();
        let decoded = NewGameMessage::decode(reader(multipart)).await.unwrap();

        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn correct_choice_carries_the_next_repo() {
        let message = ChooseMessage::Correct {
            second_repo_stars: 50,
            next_image: Image::jpeg(Bytes::from_static(b"next")),
            next_repo: repo("denoland/deno", None),
        };

        let multipart = message.clone().into_multipart().unwrap();
        assert_eq!(multipart.parts().len(), 4);

        let decoded = ChooseMessage::decode(reader(multipart)).await.unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.result(), GuessResult::Correct);
    }

    #[tokio::test]
    async fn wrong_choice_only_reveals_stars() {
        let message = ChooseMessage::Wrong {
            second_repo_stars: 7,
        };

        let multipart = message.clone().into_multipart().unwrap();
        assert_eq!(multipart.parts().len(), 2);

        let decoded = ChooseMessage::decode(reader(multipart)).await.unwrap();
        assert_eq!(decoded.second_repo_stars(), 7);
        assert_eq!(decoded.result(), GuessResult::Wrong);
    }

    #[tokio::test]
    async fn truncated_new_game_message_is_rejected() {
        let multipart = MultipartMessage::new()
            .part(Part::image(Image::jpeg(Bytes::from_static(b"first"))))
            .part(Part::image(Image::jpeg(Bytes::from_static(b"second"))));

        let error = NewGameMessage::decode(reader(multipart)).await.unwrap_err();

        assert!(matches!(error, DecodeError::MissingPart { index: 2 }));
    }

    #[tokio::test]
    async fn correct_choice_without_next_repo_is_rejected() {
        let multipart = MultipartMessage::new()
            .part(Part::text("CORRECT"))
            .part(Part::text("50"))
            .part(Part::image(Image::jpeg(Bytes::from_static(b"next"))));

        let error = ChooseMessage::decode(reader(multipart)).await.unwrap_err();

        assert!(matches!(error, DecodeError::MissingPart { index: 3 }));
    }

    #[tokio::test]
    async fn unknown_result_is_rejected() {
        let multipart = MultipartMessage::new()
            .part(Part::text("MAYBE"))
            .part(Part::text("50"));

        let error = ChooseMessage::decode(reader(multipart)).await.unwrap_err();

        assert!(matches!(error, DecodeError::InvalidPart { index: 0, .. }));
    }

    #[test]
    fn requests_use_uppercase_choices() {
        let json = serde_json::to_string(&ChooseRequest {
            choice: Choice::Second,
        })
        .unwrap();

        assert_eq!(json, r#"{"choice":"SECOND"}"#);
    }

    #[test]
    fn hidden_star_amount_is_null() {
        let json = serde_json::to_value(repo("a/b", None)).unwrap();

        assert_eq!(json["starAmount"], serde_json::Value::Null);
        assert_eq!(json["name"], "a/b");
    }
}
