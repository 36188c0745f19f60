use dashmap::DashMap;
use holgithub_core::Choice;
use log::{debug, info};
use rand::{seq::SliceRandom, thread_rng};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{DatabaseError, NewGame, PrimaryKey, RepoData, SharedDatabase};

/// The game of every user, played one guess at a time
pub struct GameManager {
    db: SharedDatabase,
    /// Guarded separately per user, so two guesses from the same user never interleave
    games: DashMap<PrimaryKey, Arc<Mutex<GameState>>>,
}

#[derive(Debug, Clone, Default)]
pub enum GameState {
    #[default]
    NoGame,
    InRound(Round),
    RoundOver {
        score: u32,
    },
}

/// The two repositories in play and the score so far
#[derive(Debug, Clone)]
pub struct Round {
    pub first: RepoData,
    pub second: RepoData,
    pub score: u32,
}

/// The result of comparing the two repositories of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    /// The chosen repository has strictly more stars
    Correct,
    Wrong,
}

impl Round {
    fn new(first: RepoData, second: RepoData) -> Self {
        Self {
            first,
            second,
            score: 0,
        }
    }

    fn resolve(&self, choice: Choice) -> Resolution {
        let (chosen, other) = match choice {
            Choice::First => (&self.first, &self.second),
            Choice::Second => (&self.second, &self.first),
        };

        if chosen.star_amount > other.star_amount {
            Resolution::Correct
        } else {
            Resolution::Wrong
        }
    }

    fn winner(&self, choice: Choice) -> &RepoData {
        match choice {
            Choice::First => &self.first,
            Choice::Second => &self.second,
        }
    }
}

/// The outcome of a guess
#[derive(Debug, Clone)]
pub enum GuessOutcome {
    /// The round continues with the chosen repository in the first slot and `next` in the second
    Correct {
        /// Stars of the repository that was in the second slot
        revealed_stars: u32,
        next: RepoData,
        score: u32,
    },
    /// The round is over
    Wrong { revealed_stars: u32, score: u32 },
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("No game is in progress")]
    InvalidGameState,
    #[error("The game needs at least {required} repositories, but only {available} exist")]
    NotEnoughRepos { required: usize, available: usize },
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

impl GameManager {
    pub fn new(db: &SharedDatabase) -> Self {
        Self {
            db: db.clone(),
            games: Default::default(),
        }
    }

    /// Starts a new round with two random repositories.
    /// A round that is still in progress is finished with its current score.
    pub async fn new_game(&self, user_id: PrimaryKey) -> Result<Round, GameError> {
        let ids = self.draw_repo_ids(2, &[]).await?;

        let first = self.db.repo_by_id(ids[0]).await?;
        let second = self.db.repo_by_id(ids[1]).await?;

        self.begin(user_id, Round::new(first, second)).await
    }

    /// Compares the stars of the two repositories in play against the choice of the player
    pub async fn choose(
        &self,
        user_id: PrimaryKey,
        choice: Choice,
    ) -> Result<GuessOutcome, GameError> {
        let game = self.existing(user_id).ok_or(GameError::InvalidGameState)?;
        let mut state = game.lock().await;

        let GameState::InRound(round) = &*state else {
            return Err(GameError::InvalidGameState);
        };

        let revealed_stars = round.second.star_amount;

        match round.resolve(choice) {
            Resolution::Correct => {
                let winner = round.winner(choice).clone();
                let score = round.score + 1;

                let exclude = [round.first.id, round.second.id];
                let next_id = self.draw_repo_ids(1, &exclude).await?[0];
                let next = self.db.repo_by_id(next_id).await?;

                *state = GameState::InRound(Round {
                    first: winner,
                    second: next.clone(),
                    score,
                });

                Ok(GuessOutcome::Correct {
                    revealed_stars,
                    next,
                    score,
                })
            }
            Resolution::Wrong => {
                let score = round.score;
                self.record(user_id, score).await?;

                *state = GameState::RoundOver { score };

                Ok(GuessOutcome::Wrong {
                    revealed_stars,
                    score,
                })
            }
        }
    }

    /// Drops whatever game a user had, without recording it
    pub fn forget(&self, user_id: PrimaryKey) {
        if self.games.remove(&user_id).is_some() {
            debug!("Forgot the game of user {}", user_id);
        }
    }

    /// Returns a snapshot of the state of a user's game
    pub async fn state(&self, user_id: PrimaryKey) -> GameState {
        match self.existing(user_id) {
            Some(game) => game.lock().await.clone(),
            None => GameState::NoGame,
        }
    }

    async fn begin(&self, user_id: PrimaryKey, round: Round) -> Result<Round, GameError> {
        let game = self.game(user_id);
        let mut state = game.lock().await;

        if let GameState::InRound(abandoned) = &*state {
            self.record(user_id, abandoned.score).await?;
        }

        info!(
            "User {} started a round with {} and {}",
            user_id, round.first.name, round.second.name
        );

        *state = GameState::InRound(round.clone());
        Ok(round)
    }

    async fn record(&self, user_id: PrimaryKey, score: u32) -> Result<(), GameError> {
        self.db.create_game(NewGame { user_id, score }).await?;
        info!("User {} finished a round with a score of {}", user_id, score);

        Ok(())
    }

    fn game(&self, user_id: PrimaryKey) -> Arc<Mutex<GameState>> {
        self.games.entry(user_id).or_default().clone()
    }

    fn existing(&self, user_id: PrimaryKey) -> Option<Arc<Mutex<GameState>>> {
        self.games.get(&user_id).map(|game| game.clone())
    }

    /// Picks `amount` distinct random repositories that aren't excluded
    async fn draw_repo_ids(
        &self,
        amount: usize,
        exclude: &[PrimaryKey],
    ) -> Result<Vec<PrimaryKey>, GameError> {
        let candidates: Vec<_> = self
            .db
            .list_repo_ids()
            .await?
            .into_iter()
            .filter(|id| !exclude.contains(id))
            .collect();

        if candidates.len() < amount {
            return Err(GameError::NotEnoughRepos {
                required: amount + exclude.len(),
                available: candidates.len() + exclude.len(),
            });
        }

        let drawn = candidates
            .choose_multiple(&mut thread_rng(), amount)
            .copied()
            .collect();

        Ok(drawn)
    }
}
