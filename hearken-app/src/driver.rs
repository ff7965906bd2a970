//! Line-driven input for the stub engine.
//!
//! ```text
//! <text>            speak a sentence (interim words, then the final)
//! :interim <text>   one interim hypothesis
//! {"results":...}   raw ResultEvent JSON
//! :start :stop :abort :reset :silence :deny :quit
//! # comment
//! ```
//!
//! Capture is started on demand before any speech line.

use anyhow::{bail, Context, Result};
use hearken_core::engine::stub::StubController;
use hearken_core::{ListeningOptions, Recognizer, ResultEvent, SpeechSession};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Say(String),
    Interim(String),
    Event(ResultEvent),
    Start,
    Stop,
    Abort,
    Reset,
    Silence,
    Deny,
    Quit,
}

impl Directive {
    fn is_speech(&self) -> bool {
        matches!(self, Directive::Say(_) | Directive::Interim(_) | Directive::Event(_))
    }
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Directive>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    if line.starts_with('{') {
        let event: ResultEvent =
            serde_json::from_str(line).with_context(|| format!("invalid result event: {line}"))?;
        return Ok(Some(Directive::Event(event)));
    }
    let Some(control) = line.strip_prefix(':') else {
        return Ok(Some(Directive::Say(line.to_string())));
    };

    let (keyword, rest) = control
        .split_once(char::is_whitespace)
        .map(|(k, r)| (k, r.trim()))
        .unwrap_or((control, ""));
    let directive = match keyword {
        "interim" if !rest.is_empty() => Directive::Interim(rest.to_string()),
        "start" => Directive::Start,
        "stop" => Directive::Stop,
        "abort" => Directive::Abort,
        "reset" => Directive::Reset,
        "silence" => Directive::Silence,
        "deny" => Directive::Deny,
        "quit" => Directive::Quit,
        other => bail!("unknown directive :{other}"),
    };
    Ok(Some(directive))
}

/// Feed every line of `reader` into the session until EOF or `:quit`.
pub async fn drive<R>(
    session: &SpeechSession,
    stub: &StubController,
    recognizer: &Recognizer,
    options: &ListeningOptions,
    reader: R,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(directive) = parse_line(&line)? else {
            continue;
        };
        debug!(?directive, "input");

        if directive.is_speech() && !stub.is_capturing() {
            session.start_listening(options.clone()).await?;
        }
        match directive {
            Directive::Say(text) => {
                stub.say(&text);
            }
            Directive::Interim(text) => {
                stub.say_interim(&text);
            }
            Directive::Event(event) => {
                stub.emit(event);
            }
            Directive::Start => session.start_listening(options.clone()).await?,
            Directive::Stop => session.stop_listening().await?,
            Directive::Abort => session.abort_listening().await?,
            Directive::Reset => recognizer.reset_transcript()?,
            Directive::Silence => stub.end_silently(),
            Directive::Deny => stub.deny_permission(),
            Directive::Quit => break,
        }
        session.flush().await?;
        info!(
            transcript = %recognizer.transcript(),
            listening = session.is_listening(),
            microphone = session.is_microphone_available(),
            "transcript"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearken_core::{RecognitionResult, RecognizerOptions, SessionConfig};

    #[test]
    fn parses_speech_and_controls() {
        assert_eq!(parse_line("  ").unwrap(), None);
        assert_eq!(parse_line("# note").unwrap(), None);
        assert_eq!(
            parse_line(" hello there ").unwrap(),
            Some(Directive::Say("hello there".into()))
        );
        assert_eq!(
            parse_line(":interim hel").unwrap(),
            Some(Directive::Interim("hel".into()))
        );
        assert_eq!(parse_line(":stop").unwrap(), Some(Directive::Stop));
        assert_eq!(parse_line(":quit").unwrap(), Some(Directive::Quit));
        assert!(parse_line(":interim").is_err());
        assert!(parse_line(":dance").is_err());
    }

    #[test]
    fn parses_result_event_json() {
        let line = r#"{"results":[{"alternatives":[{"transcript":"yes"}],"isFinal":true}],"resultIndex":0}"#;
        assert_eq!(
            parse_line(line).unwrap(),
            Some(Directive::Event(ResultEvent::new(vec![
                RecognitionResult::final_result("yes")
            ])))
        );
        assert!(parse_line("{ broken").is_err());
    }

    #[tokio::test]
    async fn drives_a_script() {
        let stub = StubController::new();
        let session = SpeechSession::spawn(SessionConfig::default(), Some(stub.factory()));
        let recognizer = Recognizer::new(&session, RecognizerOptions::default(), Vec::new());
        let script = b"good morning\n:interim and\n# ignored\nhave a nice day\n:stop\n:quit\nnever read\n";

        drive(
            &session,
            &stub,
            &recognizer,
            &ListeningOptions::continuous(),
            &script[..],
        )
        .await
        .unwrap();

        assert_eq!(recognizer.final_transcript(), "good morning have a nice day");
        assert!(!session.is_listening());
        assert_eq!(stub.start_calls(), 1);
    }

    #[tokio::test]
    async fn discontinuous_script_restarts_per_sentence() {
        let stub = StubController::new();
        let session = SpeechSession::spawn(SessionConfig::default(), Some(stub.factory()));
        let recognizer = Recognizer::new(
            &session,
            RecognizerOptions {
                clear_transcript_on_listen: false,
                ..RecognizerOptions::default()
            },
            Vec::new(),
        );

        drive(
            &session,
            &stub,
            &recognizer,
            &ListeningOptions::default(),
            &b"one\ntwo\n"[..],
        )
        .await
        .unwrap();

        assert_eq!(stub.start_calls(), 2);
        assert_eq!(recognizer.final_transcript(), "one two");
    }
}
