//! Fills the repository pool with the most starred repositories on GitHub.

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use image::{DynamicImage, ImageFormat};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use reqwest::{header, Client};
use serde::Deserialize;
use std::{io::Cursor, time::Duration};
use thiserror::Error;
use url::Url;

use crate::{DatabaseError, NewRepo, SharedDatabase};

const SEARCH_URL: &str =
    "https://api.github.com/search/repositories?q=stars:>0&sort=stars&order=desc&per_page=100";
const USER_AGENT: &str = concat!("holgithub/", env!("CARGO_PKG_VERSION"));
const CONCURRENT_FETCHES: usize = 8;

const OG_IMAGE_HOST: &str = "opengraph.githubassets.com";
/// Generated social images are 600px tall, the bottom 150px being a footer bar
const OG_IMAGE_HEIGHT: u32 = 600 - 150;
const STORED_IMAGE_TYPE: &str = "image/jpeg";

lazy_static! {
    static ref OG_IMAGE_REGEX: Regex =
        Regex::new(r#"property="og:image"\s+content="([^"]+)""#).expect("regex is valid");
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{url} has no og:image")]
    MissingImage { url: String },
    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid image: {0}")]
    Image(#[from] image::ImageError),
    #[error("GitHub kept returning incomplete results")]
    Incomplete,
    #[error("No repositories could be fetched")]
    Empty,
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// How many times to ask again when GitHub reports incomplete results
    pub incomplete_retries: usize,
    pub retry_delay: Duration,
    /// Accept incomplete search results instead of retrying
    pub allow_incomplete: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            incomplete_retries: 5,
            retry_delay: Duration::from_secs(10),
            allow_incomplete: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    incomplete_results: bool,
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    full_name: String,
    html_url: String,
    description: Option<String>,
    stargazers_count: u32,
}

pub struct Scraper {
    client: Client,
    config: ScraperConfig,
}

impl Scraper {
    pub fn new(config: ScraperConfig) -> Result<Self, ScrapeError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self { client, config })
    }

    /// Replaces the repository pool with freshly scraped repositories
    pub async fn seed(&self, db: &SharedDatabase) -> Result<usize, ScrapeError> {
        let repos = self.scrape().await?;
        let count = db.replace_repos(repos).await?;

        info!("Saved {} repositories", count);
        Ok(count)
    }

    /// Fetches the most starred repositories along with their social images.
    /// Repositories that fail to load are skipped.
    pub async fn scrape(&self) -> Result<Vec<NewRepo>, ScrapeError> {
        let search = self.search().await?;

        let repos: Vec<_> = stream::iter(search.items)
            .map(|item| async move {
                let name = item.full_name.clone();
                let result = self.fetch_repo(item).await;

                if let Err(e) = &result {
                    warn!("Skipping {}: {}", name, e);
                }

                result.ok()
            })
            .buffer_unordered(CONCURRENT_FETCHES)
            .filter_map(|repo| async move { repo })
            .collect()
            .await;

        if repos.is_empty() {
            return Err(ScrapeError::Empty);
        }

        Ok(repos)
    }

    async fn search(&self) -> Result<SearchResponse, ScrapeError> {
        info!("Fetching the top 100 repositories by stars");

        for attempt in 0..=self.config.incomplete_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            let response: SearchResponse = self
                .client
                .get(SEARCH_URL)
                .header(header::ACCEPT, "application/vnd.github+json")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if !response.incomplete_results || self.config.allow_incomplete {
                return Ok(response);
            }

            warn!(
                "Incomplete results, retrying in {}s...",
                self.config.retry_delay.as_secs()
            );
        }

        Err(ScrapeError::Incomplete)
    }

    async fn fetch_repo(&self, item: SearchItem) -> Result<NewRepo, ScrapeError> {
        let image_url = self.image_url(&item.html_url).await?;
        let (image, image_type) = self.fetch_image(image_url).await?;

        Ok(NewRepo {
            name: item.full_name,
            description: item.description,
            star_amount: item.stargazers_count,
            image,
            image_type,
        })
    }

    /// Finds the og:image of a repository page
    async fn image_url(&self, repo_url: &str) -> Result<Url, ScrapeError> {
        debug!("Getting og:image url of {}", repo_url);

        let html = self
            .client
            .get(repo_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let image_url = extract_image_url(&html).ok_or_else(|| ScrapeError::MissingImage {
            url: repo_url.to_string(),
        })?;

        Ok(Url::parse(&image_url)?)
    }

    /// Downloads an image and stores it as jpeg. Generated social images have their footer cut off.
    async fn fetch_image(&self, image_url: Url) -> Result<(Bytes, String), ScrapeError> {
        debug!("Downloading {}", image_url);

        let crop = image_url.host_str() == Some(OG_IMAGE_HOST);
        let data = self
            .client
            .get(image_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        Ok((convert_image(&data, crop)?, STORED_IMAGE_TYPE.to_string()))
    }
}

fn convert_image(data: &[u8], crop: bool) -> Result<Bytes, ScrapeError> {
    let mut image = image::load_from_memory(data)?;

    if crop && image.height() > OG_IMAGE_HEIGHT {
        image = image.crop_imm(0, 0, image.width(), OG_IMAGE_HEIGHT);
    }

    // Jpeg has no alpha channel
    let mut encoded = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut encoded, ImageFormat::Jpeg)?;

    Ok(Bytes::from(encoded.into_inner()))
}

fn extract_image_url(html: &str) -> Option<String> {
    OG_IMAGE_REGEX
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
}

#[cfg(test)]
mod test {
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    use super::{convert_image, extract_image_url, SearchResponse, OG_IMAGE_HEIGHT};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut encoded = Cursor::new(Vec::new());

        RgbaImage::from_pixel(width, height, [200, 30, 30, 255].into())
            .write_to(&mut encoded, ImageFormat::Png)
            .unwrap();

        encoded.into_inner()
    }

    #[test]
    fn og_image_is_found_in_repo_page() {
        let html = r#"
            <meta property="og:site_name" content="GitHub">
            <meta property="og:image" content="https://opengraph.githubassets.com/abc/rust-lang/rust?a=1&amp;b=2" /><meta property="og:image:alt" content="">
        "#;

        assert_eq!(
            extract_image_url(html).as_deref(),
            Some("https://opengraph.githubassets.com/abc/rust-lang/rust?a=1&b=2")
        );
    }

    #[test]
    fn pages_without_og_image_yield_nothing() {
        assert_eq!(extract_image_url("<html></html>"), None);
    }

    #[test]
    fn search_results_are_parsed() {
        let json = r#"{
            "total_count": 1,
            "incomplete_results": false,
            "items": [{
                "full_name": "freeCodeCamp/freeCodeCamp",
                "html_url": "https://github.com/freeCodeCamp/freeCodeCamp",
                "description": null,
                "stargazers_count": 400000,
                "language": "TypeScript"
            }]
        }"#;

        let response: SearchResponse = serde_json::from_str(json).unwrap();

        assert!(!response.incomplete_results);
        assert_eq!(response.items[0].full_name, "freeCodeCamp/freeCodeCamp");
        assert_eq!(response.items[0].description, None);
        assert_eq!(response.items[0].stargazers_count, 400000);
    }

    #[test]
    fn social_image_footer_is_cropped() {
        let converted = convert_image(&png(20, 600), true).unwrap();
        let decoded = image::load_from_memory(&converted).unwrap();

        assert_eq!(image::guess_format(&converted).unwrap(), ImageFormat::Jpeg);
        assert_eq!((decoded.width(), decoded.height()), (20, OG_IMAGE_HEIGHT));
    }

    #[test]
    fn other_images_keep_their_size() {
        let converted = convert_image(&png(20, 600), false).unwrap();
        let decoded = image::load_from_memory(&converted).unwrap();

        assert_eq!((decoded.width(), decoded.height()), (20, 600));

        let short = convert_image(&png(20, 100), true).unwrap();
        assert_eq!(image::load_from_memory(&short).unwrap().height(), 100);
    }

    #[test]
    fn garbage_is_not_an_image() {
        assert!(convert_image(b"<html>", true).is_err());
    }
}
