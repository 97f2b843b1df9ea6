//! Speakers (who says a line) and characters (which style a script is written in).

use std::sync::LazyLock;

use regex::Regex;

use crate::config::TtsConfig;
use crate::reddit::RedditPost;
use crate::script::Script;
use crate::utils::split_sentences;

static LABEL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(dj cara|djcara|cara|rick|morty):\s*").unwrap());

const BURP: &str = "*burp*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    Rick,
    Morty,
    DjCara,
}

impl Speaker {
    pub fn key(self) -> &'static str {
        match self {
            Speaker::Rick => "rick",
            Speaker::Morty => "morty",
            Speaker::DjCara => "djcara",
        }
    }

    /// Maps a line prefix or label (`"Rick"`, `"DJ Cara"`, `"cara"`) to a speaker.
    pub fn from_label(label: &str) -> Option<Speaker> {
        match label.trim().to_lowercase().as_str() {
            "rick" => Some(Speaker::Rick),
            "morty" => Some(Speaker::Morty),
            "djcara" | "dj cara" | "cara" => Some(Speaker::DjCara),
            _ => None,
        }
    }

    /// Reads the `Name:` prefix of a dialogue line.
    pub fn detect(line: &str) -> Option<Speaker> {
        line.split_once(':')
            .and_then(|(head, _)| Speaker::from_label(head))
    }

    pub fn default_voice(self, cfg: &TtsConfig) -> &str {
        match self {
            Speaker::DjCara => &cfg.djcara_voice,
            _ => &cfg.default_voice,
        }
    }

    /// Persona tuning layered under any caller overrides.
    pub fn default_params(self, cfg: &TtsConfig) -> crate::tts::SynthParams {
        match self {
            Speaker::DjCara => cfg.djcara.clone(),
            _ => crate::tts::SynthParams::default(),
        }
    }

    /// DJ Cara's fallback voice is slowed down so slang stays intelligible.
    pub fn slow_fallback(self) -> bool {
        self == Speaker::DjCara
    }

    /// Text actually spoken for this speaker's line.
    pub fn speakable(self, text: &str) -> String {
        match self {
            Speaker::Rick => text.split(BURP).collect::<Vec<_>>().join(" "),
            _ => text.to_string(),
        }
    }
}

/// Removes every recognized `Name:` label from a line.
pub fn strip_labels(line: &str) -> String {
    LABEL_PREFIX.replace_all(line, "").trim().to_string()
}

/// Script styles a post can be turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Character {
    /// Rick and Morty dialogue, one track per speaker
    Rickmorty,
    /// DJ Cara monologue, a single track
    Djcara,
}

impl Character {
    pub fn key(self) -> &'static str {
        match self {
            Character::Rickmorty => "rickmorty",
            Character::Djcara => "djcara",
        }
    }

    pub fn single_speaker(self) -> bool {
        matches!(self, Character::Djcara)
    }

    /// Template script for a post.
    pub fn generate(self, post: &RedditPost) -> Script {
        let title = post.title.trim();
        match self {
            Character::Rickmorty => Script::Dialogue(rick_morty_dialogue(title, post.selftext.trim())),
            Character::Djcara => Script::Monologue(dj_cara_monologue(title)),
        }
    }
}

fn summarise(body: &str, max_sentences: usize) -> String {
    split_sentences(body)
        .into_iter()
        .take(max_sentences)
        .collect::<Vec<_>>()
        .join(" ")
}

fn rick_morty_dialogue(title: &str, body: &str) -> Vec<String> {
    let question = if title.is_empty() {
        "Morty: Ah geez Rick, I found this thing on Reddit. What's the deal with that?".to_string()
    } else {
        format!(
            "Morty: Ah geez Rick, I was reading about '{}' on Reddit. W-what's that all about?",
            title
        )
    };

    let summary = summarise(body, 2);
    let answer = if !summary.is_empty() {
        format!(
            "Listen Morty, {} And that's *burp* the way the news goes!",
            summary.replace(". ", ". *burp* ")
        )
    } else if !title.is_empty() {
        format!(
            "Oh man Morty, it's about {}. *burp* That's all there is to it Morty!",
            title
        )
    } else {
        "The post is empty Morty! Empty like your *burp* understanding of quantum mechanics!"
            .to_string()
    };

    vec![question, format!("Rick: {}", answer)]
}

fn dj_cara_monologue(title: &str) -> String {
    let topic = if title.is_empty() {
        "Real ting trending right now"
    } else {
        title
    };
    format!(
        "We inside tonight, who ready fuh vibes? {}. Leh we talk about it nice and easy, \
         no rush, just de facts and a little flavour. Stay wid me, we going through it one time.",
        topic
    )
}
