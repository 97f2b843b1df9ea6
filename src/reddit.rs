use std::collections::HashSet;
use std::fs;
use std::path::Path;

use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
pub struct RedditListing {
    pub data: RedditListingData,
}

#[derive(Debug, Deserialize)]
pub struct RedditListingData {
    pub children: Vec<RedditChild>,
}

#[derive(Debug, Deserialize)]
pub struct RedditChild {
    pub data: RedditPost,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub is_self: Option<bool>,
    pub over_18: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Sort {
    Hot,
    New,
    Rising,
    Top,
}

impl Sort {
    fn as_str(self) -> &'static str {
        match self {
            Sort::Hot => "hot",
            Sort::New => "new",
            Sort::Rising => "rising",
            Sort::Top => "top",
        }
    }
}

/// Public JSON listing URL. The time filter only applies to `top`.
pub fn listing_url(subreddit: &str, sort: Sort, limit: usize, time_filter: &str) -> String {
    let mut url = format!(
        "https://www.reddit.com/r/{}/{}.json?limit={}",
        subreddit,
        sort.as_str(),
        limit.clamp(1, 100)
    );
    if sort == Sort::Top {
        url.push_str(&format!("&t={}", time_filter));
    }
    url
}

/// First post that is not NSFW, not already used, and has a title.
pub fn select_post(listing: RedditListing, used_ids: &HashSet<String>) -> Option<RedditPost> {
    for child in listing.data.children {
        let post = child.data;
        let nsfw = post.over_18.unwrap_or(false);
        if nsfw || used_ids.contains(&post.id) {
            debug!("Skipping post (NSFW or already used): {}", post.title);
            continue;
        }
        if post.title.trim().is_empty() {
            continue;
        }
        if !post.is_self.unwrap_or(true) {
            debug!("Link post, only the title will be used: {}", post.title);
        }
        return Some(post);
    }
    None
}

/// Fetches one fresh post from `r/{subreddit}` and records its id in `used_path`.
pub async fn fetch_post(
    subreddit: &str,
    sort: Sort,
    time_filter: &str,
    limit: usize,
    used_path: &Path,
) -> anyhow::Result<RedditPost> {
    let url = listing_url(subreddit, sort, limit, time_filter);
    info!("Fetching {}", url);
    let client = reqwest::Client::new();
    let res = client
        .get(&url)
        .header(USER_AGENT, "voicecast/0.1")
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let parsed: RedditListing = serde_json::from_str(&res)?;
    let mut used_ids = load_used_ids(used_path)?;

    let Some(post) = select_post(parsed, &used_ids) else {
        anyhow::bail!("No suitable posts found in subreddit {}", subreddit);
    };
    info!("Selected post: {}", post.title);
    used_ids.insert(post.id.clone());
    save_used_ids(used_path, &used_ids)?;
    Ok(post)
}

pub fn load_used_ids(path: &Path) -> anyhow::Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let data = fs::read_to_string(path)?;
    let ids: Vec<String> = serde_json::from_str(&data)?;
    Ok(ids.into_iter().collect())
}

pub fn save_used_ids(path: &Path, ids: &HashSet<String>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut sorted: Vec<&String> = ids.iter().collect();
    sorted.sort();
    let data = serde_json::to_string_pretty(&sorted)?;
    fs::write(path, data)?;
    Ok(())
}
