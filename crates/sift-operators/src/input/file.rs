//! Polling file tailer.
//!
//! Watches a fixed set of paths, emitting one entry per appended line with
//! the record `{message, path}`. Per-path byte offsets are persisted through
//! the operator's scoped store and restored on start, so a restart resumes
//! where the previous run stopped reading. A file that shrinks below its
//! recorded offset is treated as truncated and read again from the
//! beginning. Only complete (newline-terminated) lines are emitted; a
//! partially written tail is left for the next poll.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::helper::{InputConfig, InputOperator};
use sift_core::{
    BuildContext, BuilderConfig, ConfigError, Duration, LifecycleError, Operator, Persister,
    ProcessingError, WiringError,
};
use sift_entry::{Entry, Map, Value};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

fn default_poll_interval() -> Duration {
    Duration::from_millis(200)
}

/// Where reading begins the first time a file is seen (persisted offsets
/// always win on later runs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartAt {
    Beginning,
    #[default]
    End,
}

/// Configuration for the `file_input` operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInputConfig {
    #[serde(flatten)]
    pub input: InputConfig,
    /// Paths to tail.
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,
    #[serde(default)]
    pub start_at: StartAt,
}

impl BuilderConfig for FileInputConfig {
    fn id(&self) -> String {
        self.input.id()
    }

    fn operator_type(&self) -> &str {
        "file_input"
    }

    fn build(&self, context: &BuildContext) -> Result<Arc<dyn Operator>, ConfigError> {
        if self.include.is_empty() {
            return Err(ConfigError::MissingRequiredField("include"));
        }
        if !self.poll_interval.is_positive() {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        let persister = context.database.scoped(self.id())?;
        let operator: Arc<dyn Operator> = Arc::new(FileInput {
            base: Arc::new(InputOperator::from_config(&self.input)),
            paths: self.include.iter().map(PathBuf::from).collect(),
            poll_interval: self.poll_interval.raw(),
            start_at: self.start_at,
            persister: Arc::new(persister),
            run: TokioMutex::new(None),
        });
        Ok(operator)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

struct RunState {
    cancel: CancellationToken,
    poller: JoinHandle<()>,
}

/// An operator that tails files for log entries.
pub struct FileInput {
    base: Arc<InputOperator>,
    paths: Vec<PathBuf>,
    poll_interval: std::time::Duration,
    start_at: StartAt,
    persister: Arc<Persister>,
    run: TokioMutex<Option<RunState>>,
}

#[async_trait]
impl Operator for FileInput {
    fn id(&self) -> String {
        self.base.id()
    }

    fn operator_type(&self) -> &str {
        "file_input"
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

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let base = Arc::clone(&self.base);
        let persister = Arc::clone(&self.persister);
        let paths = self.paths.clone();
        let poll_interval = self.poll_interval;
        let start_at = self.start_at;

        let poller = tokio::spawn(async move {
            // Resume from persisted offsets where available.
            let mut offsets: HashMap<PathBuf, u64> = HashMap::new();
            for path in &paths {
                if let Some(saved) = persister.get(&path.to_string_lossy()) {
                    if let Ok(offset) = String::from_utf8_lossy(&saved).parse::<u64>() {
                        offsets.insert(path.clone(), offset);
                    }
                }
            }

            let mut ticker = interval(poll_interval);
            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for path in &paths {
                            poll_file(&base, &persister, path, &mut offsets, start_at).await;
                        }
                        if let Err(err) = persister.sync() {
                            error!(error = %err, "failed to sync file offsets");
                        }
                    }
                }
            }

            if let Err(err) = persister.sync() {
                error!(error = %err, "failed to sync file offsets");
            }
        });

        *run = Some(RunState { cancel, poller });
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        let Some(state) = self.run.lock().await.take() else {
            return Ok(());
        };
        state.cancel.cancel();
        let _ = state.poller.await;
        Ok(())
    }

    fn process(&self, _entry: Entry) -> Result<(), ProcessingError> {
        Err(ProcessingError::CannotProcess(self.id()))
    }
}

/// Checks one file for growth or truncation and emits any complete new
/// lines. Missing files are skipped until they appear.
async fn poll_file(
    base: &InputOperator,
    persister: &Persister,
    path: &PathBuf,
    offsets: &mut HashMap<PathBuf, u64>,
    start_at: StartAt,
) {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(_) => return,
    };
    let size = metadata.len();

    let offset = offsets.entry(path.clone()).or_insert(match start_at {
        StartAt::Beginning => 0,
        StartAt::End => size,
    });

    if size < *offset {
        // Truncated since the last poll.
        *offset = 0;
    }
    if size == *offset {
        return;
    }

    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to open file");
            return;
        }
    };
    if let Err(err) = file.seek(SeekFrom::Start(*offset)).await {
        warn!(path = %path.display(), error = %err, "failed to seek file");
        return;
    }

    let mut buffer = Vec::with_capacity((size - *offset) as usize);
    if let Err(err) = file.take(size - *offset).read_to_end(&mut buffer).await {
        warn!(path = %path.display(), error = %err, "failed to read file");
        return;
    }

    // Emit only newline-terminated lines; the remainder waits for the
    // next poll.
    let Some(last_newline) = buffer.iter().rposition(|b| *b == b'\n') else {
        return;
    };
    for line in buffer[..last_newline].split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let mut record = Map::new();
        record.insert(
            "message".to_string(),
            Value::String(String::from_utf8_lossy(line).into_owned()),
        );
        record.insert(
            "path".to_string(),
            Value::String(path.to_string_lossy().into_owned()),
        );
        base.write(base.new_entry(Value::Map(record)));
    }

    *offset += (last_newline + 1) as u64;
    persister.set(
        path.to_string_lossy().into_owned(),
        offset.to_string().into_bytes(),
    );
}
