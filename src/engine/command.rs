//! Engines driven through external filter programs.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info};

use crate::config::EngineOptions;
use crate::engine::spec::{Decoder, Delivery, EngineSpec, TrainMode};
use crate::engine::{Classifier, Engine, Meat, Outcome, Trainer, Verdict};
use crate::error::EngineError;
use crate::store::Message;

static SPAMC_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?/-?\d+(\.\d+)?$").expect("valid regex"));

/// An engine backed by the programs described in an [`EngineSpec`].
pub struct CommandEngine {
    spec: &'static EngineSpec,
    classify_args: Vec<String>,
    batch_size: usize,
}

impl CommandEngine {
    pub fn new(spec: &'static EngineSpec, options: &EngineOptions) -> Self {
        Self {
            spec,
            classify_args: spec.classify.args(options),
            batch_size: options.batch_size.max(1),
        }
    }
}

#[async_trait]
impl Engine for CommandEngine {
    fn name(&self) -> &str {
        self.spec.name
    }

    async fn trainer(&self, meat: Meat, retrain: bool) -> Result<Box<dyn Trainer>, EngineError> {
        let train = &self.spec.train;
        let args = train.args(meat, retrain);

        let pending = match train.mode {
            TrainMode::PerMessage(delivery) => Pending::PerMessage(delivery),
            TrainMode::Batched => Pending::Batched {
                chunk: self.batch_size,
                paths: Vec::new(),
            },
            TrainMode::PathStream => {
                let mut child = Command::new(train.program)
                    .args(&args)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::null())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|source| EngineError::Spawn {
                        program: train.program.to_string(),
                        source,
                    })?;
                let stdin = child.stdin.take();
                debug!(program = train.program, ?args, "Started training process");
                Pending::Stream { child, stdin }
            }
        };

        info!(engine = self.spec.name, %meat, retrain, "Training batch started");
        Ok(Box::new(CommandTrainer {
            program: train.program,
            args,
            sync: train.sync,
            pending,
            added: 0,
        }))
    }

    fn classifier(&self) -> Box<dyn Classifier> {
        let classify = &self.spec.classify;
        Box::new(CommandClassifier {
            program: classify.program,
            args: self.classify_args.clone(),
            delivery: classify.delivery,
            decoder: classify.decoder,
        })
    }
}

/// Training input not yet committed.
enum Pending {
    PerMessage(Delivery),
    Batched { chunk: usize, paths: Vec<PathBuf> },
    Stream {
        // Killed on drop, so a batch abandoned without sync is never committed.
        child: Child,
        stdin: Option<ChildStdin>,
    },
}

struct CommandTrainer {
    program: &'static str,
    args: Vec<String>,
    sync: &'static [&'static [&'static str]],
    pending: Pending,
    added: usize,
}

#[async_trait]
impl Trainer for CommandTrainer {
    async fn add(&mut self, message: &dyn Message) -> Result<Option<String>, EngineError> {
        let path = message.path();

        match &mut self.pending {
            Pending::PerMessage(delivery) => {
                let output = run_with_message(self.program, &self.args, *delivery, path).await?;
                match output.code {
                    Some(0) => {}
                    Some(code) => {
                        return Err(EngineError::Training(format!(
                            "{} exited with status {code}{}",
                            self.program,
                            stderr_hint(&output.stderr)
                        )));
                    }
                    None => return Err(killed(self.program)),
                }
            }
            Pending::Batched { paths, .. } => {
                ensure_readable(path).await?;
                paths.push(path.to_path_buf());
            }
            Pending::Stream { stdin, .. } => {
                ensure_readable(path).await?;
                let line = match path.to_str() {
                    Some(s) if !s.contains('\n') => format!("{s}\n"),
                    _ => {
                        return Err(EngineError::Training(format!(
                            "{} cannot be passed to {} on a single line",
                            path.display(),
                            self.program
                        )));
                    }
                };
                let stdin = stdin.as_mut().ok_or_else(|| EngineError::Io {
                    program: self.program.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
                })?;
                stdin
                    .write_all(line.as_bytes())
                    .await
                    .map_err(|source| EngineError::Io {
                        program: self.program.to_string(),
                        source,
                    })?;
            }
        }

        self.added += 1;
        Ok(None)
    }

    async fn sync(self: Box<Self>) -> Result<(), EngineError> {
        let CommandTrainer {
            program,
            args,
            sync,
            pending,
            added,
        } = *self;

        if added == 0 {
            debug!(program, "Nothing to sync");
            return Ok(());
        }

        match pending {
            Pending::PerMessage(_) => {}
            Pending::Batched { chunk, paths } => {
                for batch in paths.chunks(chunk) {
                    debug!(program, messages = batch.len(), "Submitting training chunk");
                    let status = Command::new(program)
                        .args(&args)
                        .args(batch)
                        .stdin(Stdio::null())
                        .stdout(Stdio::null())
                        .status()
                        .await
                        .map_err(|source| spawn_error(program, source))?;
                    check_status(program, status)?;
                }
            }
            Pending::Stream { mut child, stdin } => {
                drop(stdin);
                let status = child.wait().await.map_err(|source| EngineError::Io {
                    program: program.to_string(),
                    source,
                })?;
                check_status(program, status)?;
            }
        }

        for command in sync {
            let Some((sync_program, sync_args)) = command.split_first() else {
                continue;
            };
            debug!(program = sync_program, "Running sync command");
            let status = Command::new(sync_program)
                .args(sync_args.iter())
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .status()
                .await
                .map_err(|source| spawn_error(sync_program, source))?;
            check_status(sync_program, status)?;
        }

        info!(program, messages = added, "Training committed");
        Ok(())
    }
}

struct CommandClassifier {
    program: &'static str,
    args: Vec<String>,
    delivery: Delivery,
    decoder: Decoder,
}

#[async_trait]
impl Classifier for CommandClassifier {
    async fn classify(&self, message: &dyn Message) -> Result<Outcome, EngineError> {
        let output =
            run_with_message(self.program, &self.args, self.delivery, message.path()).await?;
        decode(&self.decoder, self.program, &output)
    }
}

/// What an engine process left behind.
#[derive(Debug, Default)]
struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

async fn run_with_message(
    program: &str,
    args: &[String],
    delivery: Delivery,
    path: &Path,
) -> Result<ProcessOutput, EngineError> {
    let mut command = Command::new(program);
    command.args(args);

    match delivery {
        Delivery::PathArg => {
            ensure_readable(path).await?;
            command.arg(path).stdin(Stdio::null());
        }
        Delivery::Stdin => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|source| payload_error(path, source))?;
            command.stdin(Stdio::from(file.into_std().await));
        }
    }

    debug!(program, path = %path.display(), "Running engine");
    let output = command
        .output()
        .await
        .map_err(|source| spawn_error(program, source))?;

    Ok(ProcessOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn decode(decoder: &Decoder, program: &str, output: &ProcessOutput) -> Result<Outcome, EngineError> {
    let Some(code) = output.code else {
        return Err(killed(program));
    };

    match decoder {
        Decoder::ExitStatus { codes, evidence } => {
            let verdict = codes
                .iter()
                .find(|(known, _)| *known == code)
                .map(|(_, verdict)| *verdict)
                .ok_or_else(|| {
                    EngineError::Classification(format!(
                        "{program} exited with status {code}{}",
                        stderr_hint(&output.stderr)
                    ))
                })?;

            let mut outcome = Outcome::new(verdict);
            if let Some(index) = evidence {
                let field = output
                    .stdout
                    .split_whitespace()
                    .nth(*index)
                    .ok_or_else(|| unexpected_output(program, output))?;
                outcome = outcome.with_evidence(field);
            }
            Ok(outcome)
        }
        Decoder::Header { name, spam, ham } => {
            let value = output
                .stdout
                .lines()
                .take_while(|line| !line.trim().is_empty())
                .find_map(|line| header_value(line, name))
                .ok_or_else(|| {
                    EngineError::Classification(format!(
                        "{program} output has no {name} header{}",
                        stderr_hint(&output.stderr)
                    ))
                })?;

            let (flag, rest) = match value.split_once(char::is_whitespace) {
                Some((flag, rest)) => (flag, rest),
                None => (value, ""),
            };
            if flag.is_empty() {
                return Err(unexpected_output(program, output));
            }

            let verdict = if flag.eq_ignore_ascii_case(spam) {
                Verdict::Spam
            } else if flag.eq_ignore_ascii_case(ham) {
                Verdict::Ham
            } else {
                Verdict::Unknown
            };
            let evidence = rest.trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace());

            let outcome = Outcome::new(verdict);
            Ok(if evidence.is_empty() {
                outcome
            } else {
                outcome.with_evidence(evidence)
            })
        }
        Decoder::SpamcScore => {
            let score = output.stdout.trim();
            if !SPAMC_SCORE.is_match(score) {
                return Err(unexpected_output(program, output));
            }
            let verdict = match code {
                1 => Verdict::Spam,
                0 if score == "0/0" => Verdict::Unknown,
                0 => Verdict::Ham,
                other => {
                    return Err(EngineError::Classification(format!(
                        "{program} exited with status {other}{}",
                        stderr_hint(&output.stderr)
                    )));
                }
            };
            Ok(Outcome::new(verdict).with_evidence(score))
        }
    }
}

/// Trimmed value of `line` if it is the header `name` (matched case-insensitively).
fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let head = line.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    line.get(name.len()..).map(str::trim)
}

async fn ensure_readable(path: &Path) -> Result<(), EngineError> {
    tokio::fs::File::open(path)
        .await
        .map(drop)
        .map_err(|source| payload_error(path, source))
}

fn check_status(program: &str, status: ExitStatus) -> Result<(), EngineError> {
    if status.success() {
        return Ok(());
    }
    Err(EngineError::Exited {
        program: program.to_string(),
        status: match status.code() {
            Some(code) => format!("exited with status {code}"),
            None => "was killed by a signal".to_string(),
        },
    })
}

fn killed(program: &str) -> EngineError {
    EngineError::Exited {
        program: program.to_string(),
        status: "was killed by a signal".to_string(),
    }
}

fn spawn_error(program: &str, source: std::io::Error) -> EngineError {
    EngineError::Spawn {
        program: program.to_string(),
        source,
    }
}

fn payload_error(path: &Path, source: std::io::Error) -> EngineError {
    EngineError::Payload {
        path: path.to_path_buf(),
        source,
    }
}

fn unexpected_output(program: &str, output: &ProcessOutput) -> EngineError {
    EngineError::Classification(format!(
        "unexpected output from {program}: {:?}{}",
        output.stdout.trim(),
        stderr_hint(&output.stderr)
    ))
}

/// First stderr line, formatted as a suffix for error messages.
fn stderr_hint(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| format!(": {line}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spec::{BOGOFILTER, BSFILTER, CRM114, QSF, SPAMASSASSIN, SYLFILTER};

    fn output(code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn decode_with(spec: &EngineSpec, out: ProcessOutput) -> Result<Outcome, EngineError> {
        decode(&spec.classify.decoder, spec.classify.program, &out)
    }

    #[test]
    fn sylfilter_exit_codes() {
        let verdicts: Vec<Verdict> = (0..3)
            .map(|code| decode_with(&SYLFILTER, output(code, "", "")).unwrap().verdict)
            .collect();
        assert_eq!(verdicts, vec![Verdict::Spam, Verdict::Ham, Verdict::Unknown]);

        let err = decode_with(&SYLFILTER, output(3, "", "db missing\n")).unwrap_err();
        assert!(matches!(err, EngineError::Classification(_)));
        assert!(err.to_string().contains("db missing"));
    }

    #[test]
    fn bogofilter_evidence_is_second_field() {
        let outcome = decode_with(&BOGOFILTER, output(0, "S 0.999876\n", "")).unwrap();
        assert_eq!(outcome.verdict, Verdict::Spam);
        assert_eq!(outcome.evidence.as_deref(), Some("0.999876"));

        let err = decode_with(&BOGOFILTER, output(1, "H\n", "")).unwrap_err();
        assert!(matches!(err, EngineError::Classification(_)));
    }

    #[test]
    fn bsfilter_requires_fifth_field() {
        let err = decode_with(
            &BSFILTER,
            output(1, "combined probability\n", "cannot open db\n"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Classification(_)));
        assert!(err.to_string().contains("cannot open db"));

        let outcome = decode_with(
            &BSFILTER,
            output(1, "combined probability /mail/cur/1 1 0.120000\n", ""),
        )
        .unwrap();
        assert_eq!(outcome.verdict, Verdict::Ham);
        assert_eq!(outcome.evidence.as_deref(), Some("0.120000"));
    }

    #[test]
    fn spamc_score_decoding() {
        let spam = decode_with(&SPAMASSASSIN, output(1, "12.3/5.0\n", "")).unwrap();
        assert_eq!(spam.verdict, Verdict::Spam);
        assert_eq!(spam.evidence.as_deref(), Some("12.3/5.0"));

        let ham = decode_with(&SPAMASSASSIN, output(0, "-1.2/5.0\n", "")).unwrap();
        assert_eq!(ham.verdict, Verdict::Ham);

        let unknown = decode_with(&SPAMASSASSIN, output(0, "0/0\n", "")).unwrap();
        assert_eq!(unknown.verdict, Verdict::Unknown);

        let garbled = decode_with(&SPAMASSASSIN, output(0, "", "connection refused\n"));
        assert!(matches!(garbled, Err(EngineError::Classification(_))));

        let odd_code = decode_with(&SPAMASSASSIN, output(74, "1.0/5.0\n", ""));
        assert!(matches!(odd_code, Err(EngineError::Classification(_))));
    }

    #[test]
    fn crm114_header_decoding() {
        let echoed = "From: a@example.com\n\
            X-CRM114-Status: SPAM  ( -45.20 )\n\
            Subject: buy\n\
            \n\
            body\n";
        let outcome = decode_with(&CRM114, output(0, echoed, "")).unwrap();
        assert_eq!(outcome.verdict, Verdict::Spam);
        assert_eq!(outcome.evidence.as_deref(), Some("-45.20"));

        let unsure = "X-CRM114-Status: UNSURE ( 2.1 )\n\nbody\n";
        let outcome = decode_with(&CRM114, output(0, unsure, "")).unwrap();
        assert_eq!(outcome.verdict, Verdict::Unknown);
    }

    #[test]
    fn header_in_body_is_ignored() {
        let echoed = "Subject: hi\n\nX-Spam: YES\n";
        let err = decode_with(&QSF, output(0, echoed, "")).unwrap_err();
        assert!(matches!(err, EngineError::Classification(_)));
    }

    #[test]
    fn qsf_header_decoding() {
        let outcome = decode_with(&QSF, output(0, "x-spam: NO\n\nhello\n", "")).unwrap();
        assert_eq!(outcome.verdict, Verdict::Ham);
        assert_eq!(outcome.evidence, None);
    }

    #[test]
    fn killed_engine_is_fatal() {
        let out = ProcessOutput {
            code: None,
            ..ProcessOutput::default()
        };
        let err = decode(&SYLFILTER.classify.decoder, "sylfilter", &out).unwrap_err();
        assert!(matches!(err, EngineError::Exited { .. }));
    }

    #[test]
    fn stderr_hint_takes_first_line() {
        assert_eq!(stderr_hint("\n  oops \nmore"), ": oops");
        assert_eq!(stderr_hint(""), "");
    }
}
