//! Deterministic output names: `{label}_{title}_{date}{ordinal}.mp3`.
//!
//! The ordinal is found by scanning the output directory, so two processes
//! rendering the same label on the same day can pick the same name. Callers
//! serialize runs against one directory.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\- _.]").unwrap());

const MAX_TITLE_LEN: usize = 80;
const TRACK_EXTENSIONS: [&str; 2] = ["mp3", "wav"];

/// Lowercases, collapses whitespace, and keeps only `[a-z0-9- _.]`, with
/// spaces turned into underscores.
pub fn sanitize_filename(text: &str) -> String {
    let lower = text.trim().to_lowercase();
    let collapsed = WHITESPACE.replace_all(&lower, " ").replace('/', "-");
    let kept = DISALLOWED.replace_all(&collapsed, "").replace(' ', "_");
    kept.chars().take(MAX_TITLE_LEN).collect()
}

/// English ordinal: 1st, 2nd, 3rd, 4th, 11th, 12th, 13th, 21st.
pub fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n / 10 % 10) {
        (_, 1) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// Day token such as `"05 aug_"`.
pub fn date_token(date: NaiveDate) -> String {
    format!("{:02} {}_", date.day(), date.format("%b").to_string().to_lowercase())
}

pub fn today_token() -> String {
    date_token(Local::now().date_naive())
}

/// Number of `.mp3`/`.wav` tracks for `label` on `date_token` in `dir`.
fn existing_tracks(dir: &Path, label: &str, date_token: &str) -> io::Result<usize> {
    let prefix = format!("{}_", label);
    let marker = format!("_{}", date_token);
    match fs::read_dir(dir) {
        Ok(entries) => Ok(entries
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| {
                name.starts_with(&prefix)
                    && name.contains(&marker)
                    && (name.ends_with(".mp3") || name.ends_with(".wav"))
            })
            .count()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// Ordinal following the tracks already rendered for `label` on `date_token`.
pub fn next_ordinal(dir: &Path, label: &str, date_token: &str) -> io::Result<String> {
    Ok(ordinal(existing_tracks(dir, label, date_token)? + 1))
}

/// File stem (no extension) for the next track of `label`. Starts after the
/// existing count and skips any stem whose `.mp3` or `.wav` is still on disk,
/// so a gap left by a deleted track never reuses a taken name.
pub fn next_base_name(
    dir: &Path,
    label: &str,
    safe_title: &str,
    date_token: &str,
) -> io::Result<String> {
    let mut n = existing_tracks(dir, label, date_token)? + 1;
    loop {
        let base = format!("{}_{}_{}{}", label, safe_title, date_token, ordinal(n));
        let taken = TRACK_EXTENSIONS
            .iter()
            .any(|ext| dir.join(format!("{}.{}", base, ext)).exists());
        if !taken {
            return Ok(base);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_and_joins() {
        assert_eq!(
            sanitize_filename("  What's up / Reddit?!  Big   News "),
            "whats_up_-_reddit_big_news"
        );
        assert_eq!(sanitize_filename("DJCara"), "djcara");
    }

    #[test]
    fn sanitize_truncates_long_titles() {
        let long = "a".repeat(200);
        assert_eq!(sanitize_filename(&long).len(), 80);
    }

    #[test]
    fn ordinals() {
        let got: Vec<String> = [1, 2, 3, 4, 11, 12, 13, 21, 22, 101, 111]
            .into_iter()
            .map(ordinal)
            .collect();
        assert_eq!(
            got,
            vec![
                "1st", "2nd", "3rd", "4th", "11th", "12th", "13th", "21st", "22nd", "101st",
                "111th"
            ]
        );
    }

    #[test]
    fn date_token_format() {
        let d = NaiveDate::from_ymd_opt(2025, 8, 5).unwrap();
        assert_eq!(date_token(d), "05 aug_");
    }

    #[test]
    fn ordinal_advances_with_existing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let token = "05 aug_";
        assert_eq!(next_ordinal(dir.path(), "rick", token).unwrap(), "1st");

        fs::write(dir.path().join("rick_story_05 aug_1st.mp3"), b"x").unwrap();
        fs::write(dir.path().join("morty_story_05 aug_1st.mp3"), b"x").unwrap();
        fs::write(dir.path().join("rick_story_06 aug_1st.mp3"), b"x").unwrap();
        fs::write(dir.path().join("rick_story_05 aug_2nd.txt"), b"x").unwrap();
        assert_eq!(next_ordinal(dir.path(), "rick", token).unwrap(), "2nd");
        assert_eq!(next_ordinal(dir.path(), "morty", token).unwrap(), "2nd");
        assert_eq!(next_ordinal(dir.path(), "djcara", token).unwrap(), "1st");
    }

    #[test]
    fn missing_directory_starts_at_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("not-yet");
        assert_eq!(
            next_base_name(&missing, "djcara", "title", "05 aug_").unwrap(),
            "djcara_title_05 aug_1st"
        );
    }

    #[test]
    fn gap_in_sequence_never_reuses_a_taken_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let token = "05 aug_";
        // 1st was deleted, 2nd is still there
        fs::write(dir.path().join("djcara_show_05 aug_2nd.wav"), b"x").unwrap();

        assert_eq!(
            next_base_name(dir.path(), "djcara", "show", token).unwrap(),
            "djcara_show_05 aug_3rd"
        );
    }

    #[test]
    fn taken_mp3_stem_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("rick_a_05 aug_2nd.mp3"), b"x").unwrap();
        fs::write(dir.path().join("rick_a_05 aug_3rd.mp3"), b"x").unwrap();

        assert_eq!(
            next_base_name(dir.path(), "rick", "a", "05 aug_").unwrap(),
            "rick_a_05 aug_4th"
        );
    }
}
