use holgithub_core::{Choice, ChooseMessage, GuessResult, Image, NewGameMessage, RepoDto};

use crate::{ClientError, HolClient};

/// A repository as it is shown to the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoView {
    pub name: String,
    pub description: String,
    /// Known once revealed by a guess
    pub star_amount: Option<u32>,
    pub image: Image,
}

impl RepoView {
    fn new(repo: RepoDto, image: Image) -> Self {
        Self {
            name: repo.name,
            description: repo.description,
            star_amount: repo.star_amount,
            image,
        }
    }
}

/// Everything needed to draw the current state of a game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameView {
    pub first: RepoView,
    pub second: RepoView,
    pub score: u32,
    /// The result of the latest guess, if any
    pub last_result: Option<GuessResult>,
    /// Whether the round has ended with a wrong guess
    pub over: bool,
}

impl From<NewGameMessage> for GameView {
    fn from(message: NewGameMessage) -> Self {
        Self {
            first: RepoView::new(message.repos.first, message.first_image),
            second: RepoView::new(message.repos.second, message.second_image),
            score: 0,
            last_result: None,
            over: false,
        }
    }
}

impl GameView {
    /// The view after the server answered a guess
    pub fn after(&self, choice: Choice, message: ChooseMessage) -> Self {
        let mut revealed = self.second.clone();
        revealed.star_amount = Some(message.second_repo_stars());

        match message {
            ChooseMessage::Correct {
                next_image,
                next_repo,
                ..
            } => {
                let first = match choice {
                    Choice::First => self.first.clone(),
                    Choice::Second => revealed,
                };

                Self {
                    first,
                    second: RepoView::new(next_repo, next_image),
                    score: self.score + 1,
                    last_result: Some(GuessResult::Correct),
                    over: false,
                }
            }
            ChooseMessage::Wrong { .. } => Self {
                first: self.first.clone(),
                second: revealed,
                score: self.score,
                last_result: Some(GuessResult::Wrong),
                over: true,
            },
        }
    }
}

/// Drives a game against the server. The view is only replaced once a response has been fully decoded,
/// so a failed request leaves the previous view intact.
#[derive(Debug, Default)]
pub struct GameSession {
    view: Option<GameView>,
}

impl GameSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> Option<&GameView> {
        self.view.as_ref()
    }

    pub async fn start(&mut self, client: &HolClient) -> Result<&GameView, ClientError> {
        let message = client.new_game().await?;

        Ok(self.view.insert(message.into()))
    }

    pub async fn choose(
        &mut self,
        client: &HolClient,
        choice: Choice,
    ) -> Result<&GameView, ClientError> {
        let current = match &self.view {
            Some(view) if !view.over => view,
            _ => return Err(ClientError::InvalidGameState),
        };

        let message = client.choose(choice).await?;
        let next = current.after(choice, message);

        Ok(self.view.insert(next))
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use holgithub_core::{
        Choice, ChooseMessage, GuessResult, Image, NewGameMessage, RepoDto, ReposDto,
    };

    use super::{GameSession, GameView};
    use crate::{ClientError, HolClient};

    fn repo(name: &str) -> RepoDto {
        RepoDto {
            name: name.to_string(),
            description: format!("{} description", name),
            star_amount: None,
        }
    }

    fn image(byte: u8) -> Image {
        Image::jpeg(Bytes::from(vec![byte; 4]))
    }

    fn started() -> GameView {
        NewGameMessage {
            first_image: image(1),
            second_image: image(2),
            repos: ReposDto {
                first: repo("first"),
                second: repo("second"),
            },
        }
        .into()
    }

    fn correct(stars: u32) -> ChooseMessage {
        ChooseMessage::Correct {
            second_repo_stars: stars,
            next_image: image(3),
            next_repo: repo("third"),
        }
    }

    #[test]
    fn new_game_hides_stars() {
        let view = started();

        assert_eq!(view.first.name, "first");
        assert_eq!(view.second.image, image(2));
        assert_eq!(view.first.star_amount, None);
        assert_eq!(view.second.star_amount, None);
        assert_eq!(view.score, 0);
        assert!(!view.over);
    }

    #[test]
    fn correct_second_guess_slides_it_to_first() {
        let view = started().after(Choice::Second, correct(500));

        assert_eq!(view.first.name, "second");
        assert_eq!(view.first.star_amount, Some(500));
        assert_eq!(view.first.image, image(2));
        assert_eq!(view.second.name, "third");
        assert_eq!(view.second.star_amount, None);
        assert_eq!(view.score, 1);
        assert_eq!(view.last_result, Some(GuessResult::Correct));
    }

    #[test]
    fn correct_first_guess_keeps_it_in_place() {
        let view = started().after(Choice::First, correct(50));

        assert_eq!(view.first.name, "first");
        assert_eq!(view.second.name, "third");
        assert_eq!(view.score, 1);
    }

    #[test]
    fn wrong_guess_reveals_second_and_ends_round() {
        let view = started().after(
            Choice::Second,
            ChooseMessage::Wrong {
                second_repo_stars: 50,
            },
        );

        assert_eq!(view.second.star_amount, Some(50));
        assert_eq!(view.first.name, "first");
        assert_eq!(view.score, 0);
        assert!(view.over);
    }

    #[tokio::test]
    async fn choosing_without_a_game_is_refused_locally() {
        let client = HolClient::new("http://localhost:1");
        let mut session = GameSession::new();

        let error = session.choose(&client, Choice::First).await.unwrap_err();

        assert!(matches!(error, ClientError::InvalidGameState));
        assert!(session.view().is_none());
    }
}
