//! UDP socket input.
//!
//! Listens on a socket and emits one entry per datagram, with trailing
//! control bytes (newlines, NULs) trimmed. Datagrams arrive on a dedicated
//! reader task; shutdown cancels the task and waits for it to drain.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::helper::{InputConfig, InputOperator};
use sift_core::{
    BuildContext, BuilderConfig, ConfigError, LifecycleError, Operator, ProcessingError,
    WiringError,
};
use sift_entry::{Entry, Value};
use tokio::net::UdpSocket;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const MAX_DATAGRAM_SIZE: usize = 8192;

/// Configuration for the `udp_input` operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UdpInputConfig {
    #[serde(flatten)]
    pub input: InputConfig,
    #[serde(default)]
    pub listen_address: String,
}

impl BuilderConfig for UdpInputConfig {
    fn id(&self) -> String {
        self.input.id()
    }

    fn operator_type(&self) -> &str {
        "udp_input"
    }

    fn build(&self, _context: &BuildContext) -> Result<Arc<dyn Operator>, ConfigError> {
        let operator: Arc<dyn Operator> = self.build_udp()?;
        Ok(operator)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl UdpInputConfig {
    fn build_udp(&self) -> Result<Arc<UdpInput>, ConfigError> {
        if self.listen_address.is_empty() {
            return Err(ConfigError::MissingRequiredField("listen_address"));
        }
        let address: SocketAddr =
            self.listen_address
                .parse()
                .map_err(|err| ConfigError::InvalidValue {
                    field: "listen_address".to_string(),
                    reason: format!("{err}"),
                })?;

        Ok(Arc::new(UdpInput {
            base: Arc::new(InputOperator::from_config(&self.input)),
            address,
            local_addr: Mutex::new(None),
            run: TokioMutex::new(None),
        }))
    }
}

struct RunState {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

/// An operator that listens on a UDP socket for log entries.
pub struct UdpInput {
    base: Arc<InputOperator>,
    address: SocketAddr,
    local_addr: Mutex<Option<SocketAddr>>,
    run: TokioMutex<Option<RunState>>,
}

impl UdpInput {
    /// The bound socket address, available while running. Useful when the
    /// configured port is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Operator for UdpInput {
    fn id(&self) -> String {
        self.base.id()
    }

    fn operator_type(&self) -> &str {
        "udp_input"
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

        let socket = UdpSocket::bind(self.address).await?;
        let bound = socket.local_addr()?;
        *self.local_addr.lock().unwrap_or_else(|p| p.into_inner()) = Some(bound);
        info!(operator_id = %self.base.id(), address = %bound, "listening for udp messages");

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let base = Arc::clone(&self.base);

        let reader = tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    received = socket.recv_from(&mut buffer) => {
                        match received {
                            Ok((len, _peer)) => {
                                let message = trim_trailing_controls(&buffer[..len]);
                                let entry = base.new_entry(Value::String(message));
                                base.write(entry);
                            }
                            Err(err) => {
                                debug!(error = %err, "exiting udp message handler");
                                break;
                            }
                        }
                    }
                }
            }
        });

        *run = Some(RunState { cancel, reader });
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        let Some(state) = self.run.lock().await.take() else {
            return Ok(());
        };
        state.cancel.cancel();
        let _ = state.reader.await;
        *self.local_addr.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }

    fn process(&self, _entry: Entry) -> Result<(), ProcessingError> {
        Err(ProcessingError::CannotProcess(self.id()))
    }
}

/// Drops trailing newline, carriage-return, and NUL bytes.
fn trim_trailing_controls(buffer: &[u8]) -> String {
    let mut len = buffer.len();
    while len > 0 && buffer[len - 1] < 32 {
        len -= 1;
    }
    String::from_utf8_lossy(&buffer[..len]).into_owned()
}
