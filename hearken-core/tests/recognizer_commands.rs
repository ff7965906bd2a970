use std::sync::Arc;

use approx::assert_relative_eq;
use hearken_core::engine::stub::{SayOptions, StubController};
use hearken_core::{
    Command, CommandMatch, CommandOptions, ListeningOptions, MatchContext, Recognizer,
    RecognizerOptions, SessionConfig, SpeechSession,
};
use parking_lot::Mutex;
use regex::Regex;

type Calls = Arc<Mutex<Vec<CommandMatch>>>;

fn recording<F>(
    calls: &Calls,
    extra: F,
) -> impl Fn(&CommandMatch, &MatchContext<'_>) + Send + Sync + 'static
where
    F: Fn(&MatchContext<'_>) + Send + Sync + 'static,
{
    let calls = Arc::clone(calls);
    move |m: &CommandMatch, ctx: &MatchContext<'_>| {
        calls.lock().push(m.clone());
        extra(ctx);
    }
}

fn record(calls: &Calls) -> impl Fn(&CommandMatch, &MatchContext<'_>) + Send + Sync + 'static {
    recording(calls, |_| {})
}

fn setup() -> (StubController, SpeechSession) {
    let stub = StubController::new();
    let session = SpeechSession::spawn(SessionConfig::default(), Some(stub.factory()));
    (stub, session)
}

#[tokio::test]
async fn wildcard_command_receives_parameters() {
    let (stub, session) = setup();
    let calls = Calls::default();
    let recognizer = Recognizer::new(
        &session,
        RecognizerOptions::default(),
        vec![Command::new("I want to eat * and *", record(&calls)).unwrap()],
    );

    session.start_listening(ListeningOptions::default()).await.unwrap();
    stub.say("I want to eat pizza and fries");
    session.flush().await.unwrap();

    assert_eq!(
        *calls.lock(),
        vec![CommandMatch::Pattern {
            parameters: vec!["pizza".into(), "fries".into()],
        }]
    );
    assert_eq!(recognizer.final_transcript(), "I want to eat pizza and fries");
}

#[tokio::test]
async fn commands_match_each_update_not_the_accumulated_transcript() {
    let (stub, session) = setup();
    let calls = Calls::default();
    let recognizer = Recognizer::new(
        &session,
        RecognizerOptions::default(),
        vec![Command::new("hello", record(&calls)).unwrap()],
    );

    session.start_listening(ListeningOptions::continuous()).await.unwrap();
    stub.say("good morning");
    stub.say("hello");
    session.flush().await.unwrap();

    assert_eq!(calls.lock().len(), 1);
    assert_eq!(recognizer.final_transcript(), "good morning hello");
}

#[tokio::test]
async fn interim_matching_is_opt_in() {
    let (stub, session) = setup();
    let exact = Calls::default();
    let interim = Calls::default();
    let _recognizer = Recognizer::new(
        &session,
        RecognizerOptions::default(),
        vec![
            Command::new("This is", record(&exact)).unwrap(),
            Command::with_options(
                "This is",
                CommandOptions {
                    match_interim: true,
                    ..CommandOptions::default()
                },
                record(&interim),
            )
            .unwrap(),
        ],
    );

    session.start_listening(ListeningOptions::continuous()).await.unwrap();
    stub.say_with(
        "This is a test",
        SayOptions {
            only_first_result: false,
            mobile: false,
        },
    );
    session.flush().await.unwrap();

    assert!(exact.lock().is_empty());
    assert_eq!(interim.lock().len(), 1);
}

#[tokio::test]
async fn fuzzy_command_reports_similarity() {
    let (stub, session) = setup();
    let calls = Calls::default();
    let _recognizer = Recognizer::new(
        &session,
        RecognizerOptions::default(),
        vec![
            Command::with_options("I want to eat", CommandOptions::fuzzy(0.5), record(&calls))
                .unwrap(),
        ],
    );

    session.start_listening(ListeningOptions::default()).await.unwrap();
    stub.say("I want to drink");
    session.flush().await.unwrap();

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    let CommandMatch::Fuzzy {
        normalized_phrase,
        similarity,
    } = &calls[0]
    else {
        panic!("expected a fuzzy match");
    };
    assert_eq!(normalized_phrase, "I want to eat");
    assert_relative_eq!(*similarity, 0.6);
}

#[tokio::test]
async fn best_match_only_fires_once() {
    let (stub, session) = setup();
    let calls = Calls::default();
    let phrases = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&phrases);
    let callback = recording(&calls, move |ctx| {
        seen.lock().push(ctx.matched_phrase.to_string());
    });
    let _recognizer = Recognizer::new(
        &session,
        RecognizerOptions::default(),
        vec![Command::with_options(
            ["I want to sleep", "I want to eat"],
            CommandOptions {
                best_match_only: true,
                ..CommandOptions::fuzzy(0.2)
            },
            callback,
        )
        .unwrap()],
    );

    session.start_listening(ListeningOptions::default()).await.unwrap();
    stub.say("I want to leap");
    session.flush().await.unwrap();

    assert_eq!(calls.lock().len(), 1);
    assert_eq!(*phrases.lock(), vec!["I want to eat".to_string()]);
}

#[tokio::test]
async fn regex_command_captures_groups() {
    let (stub, session) = setup();
    let calls = Calls::default();
    let _recognizer = Recognizer::new(
        &session,
        RecognizerOptions::default(),
        vec![Command::new(
            Regex::new(r"set (?:a )?timer for (\d+) minutes?").unwrap(),
            record(&calls),
        )
        .unwrap()],
    );

    session.start_listening(ListeningOptions::default()).await.unwrap();
    stub.say("Set a timer for 5 minutes");
    session.flush().await.unwrap();

    assert_eq!(
        *calls.lock(),
        vec![CommandMatch::Pattern {
            parameters: vec!["5".into()],
        }]
    );
}

#[tokio::test]
async fn callback_can_reset_its_own_transcript() {
    let (stub, session) = setup();
    let calls = Calls::default();
    let recognizer = Recognizer::new(
        &session,
        RecognizerOptions::default(),
        vec![Command::new("clear", recording(&calls, |ctx| ctx.reset_transcript())).unwrap()],
    );

    session.start_listening(ListeningOptions::continuous()).await.unwrap();
    stub.say("some notes");
    stub.say("clear");
    session.flush().await.unwrap();
    session.flush().await.unwrap();

    assert_eq!(calls.lock().len(), 1);
    assert_eq!(recognizer.transcript(), "");
    assert!(session.is_listening());
    assert_eq!(stub.abort_calls(), 1);
}

#[tokio::test]
async fn reset_only_clears_one_recognizer() {
    let (stub, session) = setup();
    let first = Recognizer::new(&session, RecognizerOptions::default(), Vec::new());
    let second = Recognizer::new(&session, RecognizerOptions::default(), Vec::new());

    session.start_listening(ListeningOptions::continuous()).await.unwrap();
    stub.say("hello");
    session.flush().await.unwrap();
    assert_eq!(first.final_transcript(), "hello");
    assert_eq!(second.final_transcript(), "hello");

    first.reset_transcript().unwrap();
    session.flush().await.unwrap();
    assert_eq!(first.transcript(), "");
    assert_eq!(second.transcript(), "hello");
    assert!(session.is_listening());
}

#[tokio::test]
async fn clear_on_listen_is_per_recognizer() {
    let (stub, session) = setup();
    let clears = Recognizer::new(&session, RecognizerOptions::default(), Vec::new());
    let keeps = Recognizer::new(
        &session,
        RecognizerOptions {
            clear_transcript_on_listen: false,
            ..RecognizerOptions::default()
        },
        Vec::new(),
    );

    session.start_listening(ListeningOptions::default()).await.unwrap();
    stub.say("first");
    session.flush().await.unwrap();
    assert_eq!(clears.final_transcript(), "first");

    session.start_listening(ListeningOptions::default()).await.unwrap();
    assert_eq!(clears.final_transcript(), "");
    assert_eq!(keeps.final_transcript(), "first");
}

#[tokio::test]
async fn continuous_start_keeps_the_transcript() {
    let (stub, session) = setup();
    let recognizer = Recognizer::new(&session, RecognizerOptions::default(), Vec::new());

    session.start_listening(ListeningOptions::default()).await.unwrap();
    stub.say("first");
    session.flush().await.unwrap();

    session.start_listening(ListeningOptions::continuous()).await.unwrap();
    assert_eq!(recognizer.final_transcript(), "first");
}

#[tokio::test]
async fn matching_continues_when_not_transcribing() {
    let (stub, session) = setup();
    let calls = Calls::default();
    let recognizer = Recognizer::new(
        &session,
        RecognizerOptions {
            transcribing: false,
            ..RecognizerOptions::default()
        },
        vec![Command::new("lights on", record(&calls)).unwrap()],
    );

    session.start_listening(ListeningOptions::default()).await.unwrap();
    stub.say("lights on");
    session.flush().await.unwrap();

    assert_eq!(calls.lock().len(), 1);
    assert_eq!(recognizer.transcript(), "");
}

#[tokio::test]
async fn replaced_commands_apply_to_later_updates() {
    let (stub, session) = setup();
    let old = Calls::default();
    let new = Calls::default();
    let recognizer = Recognizer::new(
        &session,
        RecognizerOptions::default(),
        vec![Command::new("stop", record(&old)).unwrap()],
    );

    session.start_listening(ListeningOptions::continuous()).await.unwrap();
    stub.say("stop");
    session.flush().await.unwrap();
    recognizer.set_commands(vec![Command::new("stop", record(&new)).unwrap()]);
    stub.say("go");
    stub.say("stop");
    session.flush().await.unwrap();

    assert_eq!(old.lock().len(), 1);
    assert_eq!(new.lock().len(), 1);
}

#[tokio::test]
async fn recognizer_seeds_from_the_session() {
    let (_stub, session) = setup();
    session.start_listening(ListeningOptions::continuous()).await.unwrap();

    let recognizer = Recognizer::new(&session, RecognizerOptions::default(), Vec::new());
    assert!(recognizer.listening());
    assert!(recognizer.is_microphone_available());
    assert!(recognizer.supports_speech_recognition());
    assert!(recognizer.supports_continuous_listening());
}

#[tokio::test]
async fn dropped_recognizer_stops_matching() {
    let (stub, session) = setup();
    let calls = Calls::default();
    let recognizer = Recognizer::new(
        &session,
        RecognizerOptions::default(),
        vec![Command::new("ping", record(&calls)).unwrap()],
    );

    session.start_listening(ListeningOptions::continuous()).await.unwrap();
    drop(recognizer);
    stub.say("ping");
    session.flush().await.unwrap();
    assert!(calls.lock().is_empty());
}
