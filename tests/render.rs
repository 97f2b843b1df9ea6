mod common;

use std::sync::Arc;

use common::*;
use voicecast::audio::decode_pcm;
use voicecast::error::RenderError;
use voicecast::render::{RenderMode, RenderOptions};
use voicecast::script::Script;

const DATE: &str = "05 aug_";

fn opts() -> RenderOptions {
    RenderOptions {
        date_token: Some(DATE.to_string()),
        ..Default::default()
    }
}

fn single(label: &str) -> RenderMode {
    RenderMode::SingleTrack {
        label: Some(label.to_string()),
    }
}

#[tokio::test]
async fn single_track_monologue_yields_one_named_file() {
    let out = tempfile::TempDir::new().unwrap();
    let r = renderer(None, Arc::new(ToneFallback::default()), "mp3", false);
    let script = Script::Monologue("Right, it's DJ Cara. Today's agenda: X.".to_string());

    let paths = r
        .render(&script, "Big News Today", out.path(), &single("djcara"), &opts())
        .await
        .unwrap();

    assert_eq!(file_names(&paths), vec!["djcara_big_news_today_05 aug_1st.mp3"]);
    assert!(paths[0].exists());
    assert!(!out.path().join(".tmp").exists());
}

#[tokio::test]
async fn rendering_twice_advances_the_ordinal() {
    let out = tempfile::TempDir::new().unwrap();
    let r = renderer(None, Arc::new(ToneFallback::default()), "mp3", false);
    let script = Script::Monologue("Same story again.".to_string());

    let first = r
        .render(&script, "Repeat", out.path(), &single("djcara"), &opts())
        .await
        .unwrap();
    let second = r
        .render(&script, "Repeat", out.path(), &single("djcara"), &opts())
        .await
        .unwrap();

    assert_eq!(file_names(&first), vec!["djcara_repeat_05 aug_1st.mp3"]);
    assert_eq!(file_names(&second), vec!["djcara_repeat_05 aug_2nd.mp3"]);
    assert!(first[0].exists());
}

#[tokio::test]
async fn deleted_track_leaves_a_gap_that_is_never_refilled() {
    let out = tempfile::TempDir::new().unwrap();
    let r = renderer(None, Arc::new(ToneFallback::default()), "mp3", false);
    let script = Script::Monologue("Show time.".to_string());
    let mode = single("djcara");

    let first = r.render(&script, "Show", out.path(), &mode, &opts()).await.unwrap();
    let second = r.render(&script, "Show", out.path(), &mode, &opts()).await.unwrap();
    let second_bytes = std::fs::read(&second[0]).unwrap();
    std::fs::remove_file(&first[0]).unwrap();

    let third = r.render(&script, "Show", out.path(), &mode, &opts()).await.unwrap();

    assert_eq!(file_names(&third), vec!["djcara_show_05 aug_3rd.mp3"]);
    assert_eq!(std::fs::read(&second[0]).unwrap(), second_bytes);
}

#[tokio::test]
async fn one_shot_backend_output_becomes_the_track() {
    let out = tempfile::TempDir::new().unwrap();
    let backend = Arc::new(ToneBackend::default());
    let fallback = Arc::new(ToneFallback::default());
    let r = renderer(Some(backend.clone()), fallback.clone(), "mp3", false);
    let script = Script::Dialogue(vec!["DJ Cara: Big tune".into(), "Cara: Stay wid me".into()]);

    let paths = r
        .render(&script, "Tunes", out.path(), &single("djcara"), &opts())
        .await
        .unwrap();

    assert_eq!(file_names(&paths), vec!["djcara_tunes_05 aug_1st.mp3"]);
    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].text, "Big tune\nStay wid me");
    assert_eq!(requests[0].voice, "DJ_Caralong.mp3");
    assert!(fallback.texts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn single_track_requiring_server_fails_without_it() {
    let out = tempfile::TempDir::new().unwrap();
    let r = renderer(
        Some(Arc::new(FailingBackend)),
        Arc::new(ToneFallback::default()),
        "mp3",
        true,
    );
    let script = Script::Monologue("Hello.".to_string());

    let err = r
        .render(&script, "t", out.path(), &single("djcara"), &opts())
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::ServerRequired(_)));
}

#[tokio::test]
async fn dialogue_round_trip_splits_by_speaker() {
    let out = tempfile::TempDir::new().unwrap();
    let r = renderer(
        Some(Arc::new(FailingBackend)),
        Arc::new(ToneFallback::default()),
        "mp3",
        false,
    );
    let script = Script::Dialogue(vec![
        "Rick: Hello *burp* world".into(),
        "Morty: Oh geez".into(),
    ]);
    let keep = RenderOptions {
        keep_parts: true,
        ..opts()
    };

    let paths = r
        .render(&script, "Portal", out.path(), &RenderMode::MultiTrack, &keep)
        .await
        .unwrap();

    assert_eq!(
        file_names(&paths),
        vec!["rick_portal_05 aug_1st.mp3", "morty_portal_05 aug_1st.mp3"]
    );
    let tmp = out.path().join(".tmp");
    assert!(tmp.join("rick_line_0.mp3").exists());
    assert!(tmp.join("morty_line_0.mp3").exists());
}

#[tokio::test]
async fn later_render_leaves_kept_parts_alone() {
    let out = tempfile::TempDir::new().unwrap();
    let r = renderer(None, Arc::new(ToneFallback::default()), "mp3", false);
    let dialogue = Script::Dialogue(vec!["Rick: Hello".into(), "Morty: Oh geez".into()]);
    let keep = RenderOptions {
        keep_parts: true,
        ..opts()
    };
    r.render(&dialogue, "Portal", out.path(), &RenderMode::MultiTrack, &keep)
        .await
        .unwrap();

    let bridge = Script::Monologue("Right, it's DJ Cara.".to_string());
    let paths = r
        .render(&bridge, "bridge", out.path(), &single("djcara"), &opts())
        .await
        .unwrap();

    assert_eq!(file_names(&paths), vec!["djcara_bridge_05 aug_1st.mp3"]);
    let tmp = out.path().join(".tmp");
    assert!(tmp.join("rick_line_0.mp3").exists());
    assert!(tmp.join("morty_line_0.mp3").exists());
    assert!(!tmp.join("djcara_line_0.mp3").exists());
}

#[tokio::test]
async fn multi_track_combines_each_speaker_in_line_order() {
    let out = tempfile::TempDir::new().unwrap();
    let fallback = Arc::new(ToneFallback::default());
    let r = renderer(None, fallback.clone(), "wav", false);
    let script = Script::Dialogue(vec![
        "Morty: one".into(),
        "Rick: two".into(),
        "Morty: three".into(),
        "Rick: four".into(),
        "Morty: five".into(),
    ]);

    let paths = r
        .render(&script, "Order", out.path(), &RenderMode::MultiTrack, &opts())
        .await
        .unwrap();

    assert_eq!(
        file_names(&paths),
        vec!["morty_order_05 aug_1st.wav", "rick_order_05 aug_1st.wav"]
    );
    let morty = decode_pcm(&paths[0]).unwrap();
    let rick = decode_pcm(&paths[1]).unwrap();
    assert!((morty.duration_secs() - 3.0 * LINE_SECS).abs() < 0.01);
    assert!((rick.duration_secs() - 2.0 * LINE_SECS).abs() < 0.01);

    // each line is voiced at its own level, so the windows give the order back
    let expect = |texts: &[&str]| texts.iter().map(|t| level_for(t)).collect::<Vec<_>>();
    for (got, want) in [
        (line_levels(&morty.samples), expect(&["one", "three", "five"])),
        (line_levels(&rick.samples), expect(&["two", "four"])),
    ] {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(&want) {
            assert!((g - w).abs() < 0.01, "levels {:?}, expected {:?}", got, want);
        }
    }
    assert_eq!(
        *fallback.texts.lock().unwrap(),
        vec!["one", "two", "three", "four", "five"]
    );
    assert!(!out.path().join(".tmp").exists());
}

#[tokio::test]
async fn batch_with_no_audio_is_an_error_after_forced_retry() {
    let out = tempfile::TempDir::new().unwrap();
    let dead = Arc::new(DeadFallback::default());
    let r = renderer(Some(Arc::new(FailingBackend)), dead.clone(), "mp3", false);
    let script = Script::Dialogue(vec!["Rick: a".into(), "Morty: b".into(), "c".into()]);

    let err = r
        .render(&script, "t", out.path(), &RenderMode::MultiTrack, &opts())
        .await
        .unwrap_err();

    assert!(matches!(err, RenderError::NoAudio));
    assert_eq!(*dead.calls.lock().unwrap(), 6);
}
