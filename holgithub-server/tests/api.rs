use axum::{routing::post, Router};
use bytes::Bytes;
use holgithub_client::{ClientError, GameSession, HolClient};
use holgithub_collab::{Collab, Config, MemoryDatabase, NewRepo, SharedDatabase};
use holgithub_core::{
    Choice, ChooseMessage, DecodeError, GuessResult, Image, MultipartMessage, NewGameMessage,
    Part, RepoDto, ReposDto,
};
use holgithub_server::{serve, Multipart, ServerContext, SessionCookie};
use reqwest::StatusCode;
use std::{collections::HashMap, sync::Arc};
use tokio::net::TcpListener;

const STARS: [(&str, u32); 3] = [("big/repo", 300), ("mid/repo", 200), ("small/repo", 100)];

struct TestServer {
    url: String,
}

impl TestServer {
    async fn start() -> Self {
        let db: SharedDatabase = Arc::new(MemoryDatabase::new());

        let repos = STARS
            .iter()
            .map(|(name, stars)| NewRepo {
                name: name.to_string(),
                description: Some(format!("{} description", name)),
                star_amount: *stars,
                image: Bytes::from(name.as_bytes().to_vec()),
                image_type: "image/png".to_string(),
            })
            .collect();

        db.replace_repos(repos).await.unwrap();

        let collab = Collab::new(db.clone(), &Config::default()).unwrap();
        let context = ServerContext {
            collab: Arc::new(collab),
            cookie: SessionCookie::new(false),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(serve(listener, context));

        Self { url }
    }

    fn client(&self) -> HolClient {
        HolClient::new(&self.url)
    }

    async fn signed_in(&self, username: &str) -> HolClient {
        let client = self.client();

        client.sign_up(username, "password123").await.unwrap();
        client.sign_in(username, "password123").await.unwrap();

        client
    }
}

fn stars_of(name: &str) -> u32 {
    let stars: HashMap<_, _> = STARS.into_iter().collect();
    stars[name]
}

#[tokio::test]
async fn session_lifecycle() {
    let server = TestServer::start().await;
    let client = server.signed_in("john").await;

    assert!(client.is_signed_in());
    assert_eq!(client.me().await.unwrap().username, "john");

    client.sign_out().await.unwrap();

    assert!(!client.is_signed_in());
    assert!(matches!(client.me().await, Err(ClientError::Unauthorized)));
}

#[tokio::test]
async fn signed_out_session_no_longer_resolves() {
    let server = TestServer::start().await;
    let client = server.signed_in("john").await;

    // Capture the cookie before signing out
    let response = reqwest::Client::new()
        .post(format!("{}/user/signin", server.url))
        .json(&serde_json::json!({ "username": "john", "password": "password123" }))
        .send()
        .await
        .unwrap();
    let set_cookie = response.headers()[reqwest::header::SET_COOKIE]
        .to_str()
        .unwrap()
        .to_string();
    let cookie = set_cookie.split(';').next().unwrap().to_string();

    let second_client = reqwest::Client::new();
    let me = |cookie: String| {
        second_client
            .get(format!("{}/user/me", server.url))
            .header(reqwest::header::COOKIE, cookie)
            .send()
    };

    assert_eq!(me(cookie.clone()).await.unwrap().status(), StatusCode::OK);

    let response = second_client
        .post(format!("{}/user/signout", server.url))
        .header(reqwest::header::COOKIE, cookie.clone())
        .send()
        .await
        .unwrap();

    let deletion = response.headers()[reqwest::header::SET_COOKIE]
        .to_str()
        .unwrap();
    assert!(deletion.contains("Max-Age=0"));

    assert_eq!(me(cookie).await.unwrap().status(), StatusCode::UNAUTHORIZED);

    // Other sessions of the same user are unaffected
    assert_eq!(client.me().await.unwrap().username, "john");
}

#[tokio::test]
async fn bad_credentials_are_indistinguishable() {
    let server = TestServer::start().await;
    server.signed_in("john").await;

    let client = server.client();

    let wrong_password = client.sign_in("john", "wrong password").await;
    let unknown_user = client.sign_in("nobody", "password123").await;

    assert!(matches!(wrong_password, Err(ClientError::InvalidCredentials)));
    assert!(matches!(unknown_user, Err(ClientError::InvalidCredentials)));
    assert!(!client.is_signed_in());
}

#[tokio::test]
async fn usernames_are_unique() {
    let server = TestServer::start().await;
    server.signed_in("john").await;

    let result = server.client().sign_up("john", "password456").await;

    assert!(matches!(result, Err(ClientError::DuplicateUser(name)) if name == "john"));
}

#[tokio::test]
async fn anonymous_requests_are_limited_to_public_routes() {
    let server = TestServer::start().await;
    let http = reqwest::Client::new();

    for path in ["/user/me", "/game/scores"] {
        let status = http
            .get(format!("{}{}", server.url, path))
            .send()
            .await
            .unwrap()
            .status();

        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", path);
    }

    for path in ["/error", "/api.json"] {
        let status = http
            .get(format!("{}{}", server.url, path))
            .send()
            .await
            .unwrap()
            .status();

        assert_eq!(status, StatusCode::OK, "{}", path);
    }
}

#[tokio::test]
async fn forged_session_is_anonymous() {
    let server = TestServer::start().await;

    let status = reqwest::Client::new()
        .get(format!("{}/user/me", server.url))
        .header(reqwest::header::COOKIE, "HOLGITHUB_SESSION=forged")
        .send()
        .await
        .unwrap()
        .status();

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn choosing_without_a_game_conflicts() {
    let server = TestServer::start().await;
    let client = server.signed_in("john").await;

    let result = client.choose(Choice::First).await;

    assert!(matches!(result, Err(ClientError::InvalidGameState)));
}

#[tokio::test]
async fn game_is_served_as_multipart() {
    let server = TestServer::start().await;
    let client = server.signed_in("john").await;

    let message = client.new_game().await.unwrap();

    assert_ne!(message.repos.first.name, message.repos.second.name);
    assert_eq!(message.repos.first.star_amount, None);
    assert_eq!(message.repos.second.star_amount, None);
    assert_eq!(
        message.first_image.data,
        Bytes::from(message.repos.first.name.clone().into_bytes())
    );
    assert_eq!(message.second_image.content_type, "image/png");
}

#[tokio::test]
async fn full_round() {
    let server = TestServer::start().await;
    let client = server.signed_in("john").await;
    let mut session = GameSession::new();

    let view = session.start(&client).await.unwrap().clone();

    let (first, second) = (stars_of(&view.first.name), stars_of(&view.second.name));
    let winning = if first > second {
        Choice::First
    } else {
        Choice::Second
    };

    let view = session.choose(&client, winning).await.unwrap().clone();

    assert_eq!(view.last_result, Some(GuessResult::Correct));
    assert_eq!(view.score, 1);
    assert_eq!(stars_of(&view.first.name), first.max(second));
    assert_eq!(view.second.star_amount, None);

    // The remaining repository was drawn, so pick the loser on purpose
    let losing = if stars_of(&view.first.name) > stars_of(&view.second.name) {
        Choice::Second
    } else {
        Choice::First
    };

    let view = session.choose(&client, losing).await.unwrap().clone();

    assert_eq!(view.last_result, Some(GuessResult::Wrong));
    assert_eq!(view.score, 1);
    assert!(view.over);
    assert_eq!(view.second.star_amount, Some(stars_of(&view.second.name)));

    assert!(matches!(
        client.choose(Choice::First).await,
        Err(ClientError::InvalidGameState)
    ));

    let scores = client.scores().await.unwrap();
    assert_eq!(scores.best, 1);
    assert_eq!(scores.played, 1);
}

#[tokio::test]
async fn correct_guess_reveals_second_stars() {
    let server = TestServer::start().await;
    let client = server.signed_in("john").await;

    let message = client.new_game().await.unwrap();
    let second = stars_of(&message.repos.second.name);
    let first = stars_of(&message.repos.first.name);

    let choice = if first > second {
        Choice::First
    } else {
        Choice::Second
    };

    match client.choose(choice).await.unwrap() {
        ChooseMessage::Correct {
            second_repo_stars,
            next_repo,
            ..
        } => {
            assert_eq!(second_repo_stars, second);
            assert_eq!(next_repo.star_amount, None);
            assert_ne!(next_repo.name, message.repos.first.name);
            assert_ne!(next_repo.name, message.repos.second.name);
        }
        ChooseMessage::Wrong { .. } => panic!("Expected a correct guess"),
    }
}

/// Serves canned game responses, to see how the client copes with broken ones
async fn stub_server(new_game: MultipartMessage, choice: MultipartMessage) -> HolClient {
    let router = Router::new()
        .route("/game/new", post(move || async move { Multipart(new_game) }))
        .route("/game/choose", post(move || async move { Multipart(choice) }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move { axum::serve(listener, router).await });

    HolClient::new(url)
}

fn stub_new_game() -> MultipartMessage {
    let repo = |name: &str| RepoDto {
        name: name.to_string(),
        description: format!("{} description", name),
        star_amount: None,
    };

    NewGameMessage {
        first_image: Image::jpeg(vec![1, 1, 1]),
        second_image: Image::jpeg(vec![2, 2, 2]),
        repos: ReposDto {
            first: repo("first/repo"),
            second: repo("second/repo"),
        },
    }
    .into_multipart()
    .unwrap()
}

#[tokio::test]
async fn truncated_choice_leaves_the_view_untouched() {
    // A correct guess is missing its next image and repository
    let truncated = MultipartMessage::new()
        .part(Part::text("CORRECT"))
        .part(Part::text("200"));

    let client = stub_server(stub_new_game(), truncated).await;
    let mut session = GameSession::new();

    let before = session.start(&client).await.unwrap().clone();
    let error = session.choose(&client, Choice::First).await.unwrap_err();

    assert!(matches!(
        error,
        ClientError::MalformedResponse(DecodeError::MissingPart { index: 2 })
    ));
    assert_eq!(session.view(), Some(&before));
    assert_eq!(before.score, 0);
    assert_eq!(before.second.star_amount, None);
}

#[tokio::test]
async fn truncated_new_game_does_not_start_a_view() {
    let truncated = MultipartMessage::new().part(Part::image(Image::jpeg(vec![1, 1, 1])));
    let wrong = MultipartMessage::new().part(Part::text("WRONG"));

    let client = stub_server(truncated, wrong).await;
    let mut session = GameSession::new();

    let error = session.start(&client).await.unwrap_err();

    assert!(matches!(
        error,
        ClientError::MalformedResponse(DecodeError::MissingPart { index: 1 })
    ));
    assert!(session.view().is_none());

    // Without a view there is nothing to guess on
    assert!(matches!(
        session.choose(&client, Choice::First).await,
        Err(ClientError::InvalidGameState)
    ));
}
