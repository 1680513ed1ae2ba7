//! systemd journal input.
//!
//! Spawns `journalctl` in follow mode with JSON line framing and turns each
//! line into an entry. The `__REALTIME_TIMESTAMP` field (decimal
//! microseconds since epoch) becomes the entry timestamp and `__CURSOR` is
//! persisted under `lastReadCursor` so a restart resumes where the previous
//! run left off; both fields are removed from the record.
//!
//! The base argument vector is assembled once at build time and every
//! `start` extends a fresh clone with `--after-cursor`, so restarting the
//! operator never accumulates duplicate flags.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sift_core::helper::{InputConfig, InputOperator};
use sift_core::{
    BuildContext, BuilderConfig, ConfigError, LifecycleError, Operator, Persister,
    ProcessingError, WiringError,
};
use sift_entry::{Entry, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

const LAST_READ_CURSOR_KEY: &str = "lastReadCursor";
const SYNC_PERIOD: Duration = Duration::from_secs(1);

/// Configuration for the `journald_input` operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournaldInputConfig {
    #[serde(flatten)]
    pub input: InputConfig,
    /// Read from a journal directory instead of the system default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Read from specific journal files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl BuilderConfig for JournaldInputConfig {
    fn id(&self) -> String {
        self.input.id()
    }

    fn operator_type(&self) -> &str {
        "journald_input"
    }

    fn build(&self, context: &BuildContext) -> Result<Arc<dyn Operator>, ConfigError> {
        let operator: Arc<dyn Operator> = self.build_journald(context)?;
        Ok(operator)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl JournaldInputConfig {
    fn build_journald(&self, context: &BuildContext) -> Result<Arc<JournaldInput>, ConfigError> {
        let mut args = vec![
            // Export logs in UTC with JSON framing, and keep following.
            "--utc".to_string(),
            "--output=json".to_string(),
            "--follow".to_string(),
        ];
        match (&self.directory, self.files.as_slice()) {
            (Some(directory), _) => {
                args.push("--directory".to_string());
                args.push(directory.clone());
            }
            (None, files) => {
                for file in files {
                    args.push("--file".to_string());
                    args.push(file.clone());
                }
            }
        }

        let persister = context.database.scoped(self.id())?;
        Ok(Arc::new(JournaldInput {
            base: Arc::new(InputOperator::from_config(&self.input)),
            args,
            persister: Arc::new(persister),
            run: TokioMutex::new(None),
        }))
    }
}

struct RunState {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    flusher: JoinHandle<()>,
}

/// An operator that reads entries from the systemd journal.
pub struct JournaldInput {
    base: Arc<InputOperator>,
    /// Base `journalctl` arguments, frozen at build time.
    args: Vec<String>,
    persister: Arc<Persister>,
    run: TokioMutex<Option<RunState>>,
}

impl JournaldInput {
    /// The argument vector for one `start`, including the resume cursor
    /// when one has been persisted.
    fn start_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(cursor) = self.persister.get(LAST_READ_CURSOR_KEY) {
            args.push("--after-cursor".to_string());
            args.push(String::from_utf8_lossy(&cursor).into_owned());
        }
        args
    }
}

#[async_trait]
impl Operator for JournaldInput {
    fn id(&self) -> String {
        self.base.id()
    }

    fn operator_type(&self) -> &str {
        "journald_input"
    }

    fn can_process(&self) -> bool {
        false
    }

    fn can_output(&self) -> bool {
        true
    }

    fn output_ids(&self) -> Vec<String> {
        self.base.writer().output_ids()
    }

    fn set_outputs(&self, candidates: &[Arc<dyn Operator>]) -> Result<(), WiringError> {
        self.base.writer().resolve(&self.base.id(), candidates)
    }

    fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        self.base.writer().outputs()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return Ok(());
        }

        self.persister.load()?;

        let mut child = Command::new("journalctl")
            .args(self.start_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| LifecycleError::Start {
            id: self.id(),
            reason: "failed to capture journalctl stdout".to_string(),
        })?;

        let cancel = CancellationToken::new();

        // Periodically flush the cursor alongside the read loop.
        let flush_cancel = cancel.clone();
        let flush_persister = Arc::clone(&self.persister);
        let flusher = tokio::spawn(async move {
            let mut ticker = interval(SYNC_PERIOD);
            loop {
                tokio::select! {
                    () = flush_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = flush_persister.sync() {
                            error!(error = %err, "failed to sync journald cursor");
                        }
                    }
                }
            }
        });

        let reader_cancel = cancel.clone();
        let base = Arc::clone(&self.base);
        let persister = Arc::clone(&self.persister);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    () = reader_cancel.cancelled() => break,
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => match parse_journal_line(&base, &line) {
                                Ok((entry, cursor)) => {
                                    persister.set(LAST_READ_CURSOR_KEY, cursor.into_bytes());
                                    base.write(entry);
                                }
                                Err(err) => {
                                    warn!(error = %err, "failed to parse journal entry");
                                }
                            },
                            Ok(None) => break,
                            Err(err) => {
                                error!(error = %err, "error reading from journalctl stdout");
                                break;
                            }
                        }
                    }
                }
            }
            let _ = child.kill().await;
            if let Err(err) = persister.sync() {
                error!(error = %err, "failed to sync journald cursor");
            }
        });

        *run = Some(RunState {
            cancel,
            reader,
            flusher,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        let Some(state) = self.run.lock().await.take() else {
            return Ok(());
        };
        state.cancel.cancel();
        let _ = state.reader.await;
        let _ = state.flusher.await;
        Ok(())
    }

    fn process(&self, _entry: Entry) -> Result<(), ProcessingError> {
        Err(ProcessingError::CannotProcess(self.id()))
    }
}

/// Parses one `journalctl --output=json` line into an entry and its cursor.
fn parse_journal_line(
    base: &InputOperator,
    line: &str,
) -> Result<(Entry, String), ProcessingError> {
    let mut record: serde_json::Value =
        serde_json::from_str(line).map_err(|err| ProcessingError::Parse(err.to_string()))?;
    let object = record
        .as_object_mut()
        .ok_or_else(|| ProcessingError::Parse("journal line is not an object".to_string()))?;

    let timestamp = match object.remove("__REALTIME_TIMESTAMP") {
        Some(serde_json::Value::String(micros)) => micros,
        Some(_) => {
            return Err(ProcessingError::Parse(
                "journald timestamp field is not a string".to_string(),
            ))
        }
        None => {
            return Err(ProcessingError::Parse(
                "journald record missing __REALTIME_TIMESTAMP field".to_string(),
            ))
        }
    };
    let micros: i64 = timestamp
        .parse()
        .map_err(|err| ProcessingError::Parse(format!("parse timestamp: {err}")))?;

    let cursor = match object.remove("__CURSOR") {
        Some(serde_json::Value::String(cursor)) => cursor,
        Some(_) => {
            return Err(ProcessingError::Parse(
                "journald cursor field is not a string".to_string(),
            ))
        }
        None => {
            return Err(ProcessingError::Parse(
                "journald record missing __CURSOR field".to_string(),
            ))
        }
    };

    let mut entry = base.new_entry(Value::from(record));
    entry.timestamp = DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| ProcessingError::Time("journald timestamp out of range".to_string()))?;
    Ok((entry, cursor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::testutil::build_context;

    fn base_input() -> Arc<InputOperator> {
        let config: InputConfig =
            serde_yaml::from_str("id: journald\ntype: journald_input\noutput: next\n").unwrap();
        Arc::new(InputOperator::from_config(&config))
    }

    fn journald(config_yaml: &str) -> Arc<JournaldInput> {
        let config: JournaldInputConfig = serde_yaml::from_str(config_yaml).unwrap();
        config.build_journald(&build_context()).unwrap()
    }

    #[test]
    fn parses_journal_lines() {
        let base = base_input();
        let line = r#"{"__REALTIME_TIMESTAMP":"1587047866229317","__CURSOR":"s=1;i=2","MESSAGE":"started"}"#;

        let (entry, cursor) = parse_journal_line(&base, line).unwrap();
        assert_eq!(cursor, "s=1;i=2");
        assert_eq!(
            entry.timestamp,
            DateTime::<Utc>::from_timestamp_micros(1_587_047_866_229_317).unwrap()
        );

        // Both synthetic fields are removed from the record.
        let map = entry.record.as_map().unwrap();
        assert_eq!(map.get("MESSAGE"), Some(&Value::from("started")));
        assert!(!map.contains_key("__REALTIME_TIMESTAMP"));
        assert!(!map.contains_key("__CURSOR"));
    }

    #[test]
    fn rejects_malformed_journal_lines() {
        let base = base_input();
        for line in [
            "not json",
            "[1,2]",
            r#"{"__CURSOR":"c"}"#,
            r#"{"__REALTIME_TIMESTAMP":"123"}"#,
            r#"{"__REALTIME_TIMESTAMP":123,"__CURSOR":"c"}"#,
            r#"{"__REALTIME_TIMESTAMP":"abc","__CURSOR":"c"}"#,
        ] {
            assert!(parse_journal_line(&base, line).is_err(), "accepted {line}");
        }
    }

    #[test]
    fn start_args_append_the_cursor_without_accumulating() {
        let input = journald("id: journald\ntype: journald_input\noutput: next\n");
        assert_eq!(
            input.start_args(),
            vec!["--utc", "--output=json", "--follow"]
        );

        input.persister.set(LAST_READ_CURSOR_KEY, b"cursor-1".to_vec());

        let first = input.start_args();
        let second = input.start_args();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                "--utc",
                "--output=json",
                "--follow",
                "--after-cursor",
                "cursor-1"
            ]
        );
    }

    #[test]
    fn directory_takes_precedence_over_files() {
        let input = journald(
            "id: journald\ntype: journald_input\noutput: next\ndirectory: /var/log/journal\nfiles: [a.journal]\n",
        );
        assert!(input.args.contains(&"--directory".to_string()));
        assert!(!input.args.contains(&"--file".to_string()));

        let input = journald(
            "id: journald\ntype: journald_input\noutput: next\nfiles: [a.journal, b.journal]\n",
        );
        let file_flags = input.args.iter().filter(|a| *a == "--file").count();
        assert_eq!(file_flags, 2);
    }

    #[test]
    fn builds_through_the_registry_surface() {
        let config: JournaldInputConfig =
            serde_yaml::from_str("id: journald\ntype: journald_input\noutput: next\n").unwrap();
        let operator = config.build(&build_context()).unwrap();
        assert_eq!(operator.id(), "journald");
        assert!(operator.can_output());
        assert!(!operator.can_process());
    }
}
