//! Standard output sink.
//!
//! Serializes each entry as one JSON line. The writer sits behind a lock so
//! entries from concurrent upstream tasks never interleave mid-line, and is
//! swappable for tests.

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::helper::{OutputConfig, OutputOperator};
use sift_core::{
    BuildContext, BuilderConfig, ConfigError, LifecycleError, Operator, ProcessingError,
};
use sift_entry::Entry;

/// Configuration for the `stdout` operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StdoutConfig {
    #[serde(flatten)]
    pub output: OutputConfig,
}

impl BuilderConfig for StdoutConfig {
    fn id(&self) -> String {
        self.output.id()
    }

    fn operator_type(&self) -> &str {
        "stdout"
    }

    fn build(&self, _context: &BuildContext) -> Result<Arc<dyn Operator>, ConfigError> {
        let operator: Arc<dyn Operator> = Arc::new(StdoutOutput::new(
            OutputOperator::from_config(&self.output),
            Box::new(std::io::stdout()),
        ));
        Ok(operator)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// An operator that writes entries as JSON lines to a locked writer.
pub struct StdoutOutput {
    base: OutputOperator,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl StdoutOutput {
    pub fn new(base: OutputOperator, writer: Box<dyn Write + Send>) -> Self {
        StdoutOutput {
            base,
            writer: Mutex::new(writer),
        }
    }

}

#[async_trait]
impl Operator for StdoutOutput {
    fn id(&self) -> String {
        self.base.id()
    }

    fn operator_type(&self) -> &str {
        "stdout"
    }

    fn can_process(&self) -> bool {
        true
    }

    fn can_output(&self) -> bool {
        false
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn process(&self, entry: Entry) -> Result<(), ProcessingError> {
        let line = serde_json::to_string(&entry)
            .map_err(|err| ProcessingError::Parse(format!("failed to encode entry: {err}")))?;
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        writeln!(writer, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::testutil::build_context;
    use sift_entry::Value;

    /// A `Write` handle into a shared buffer.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_output() -> (Arc<StdoutOutput>, SharedBuffer) {
        let config: StdoutConfig = serde_yaml::from_str("id: out\ntype: stdout\n").unwrap();
        let buffer = SharedBuffer::default();
        let operator = Arc::new(StdoutOutput::new(
            OutputOperator::from_config(&config.output),
            Box::new(buffer.clone()),
        ));
        (operator, buffer)
    }

    #[test]
    fn writes_one_json_line_per_entry() {
        let (operator, buffer) = capture_output();

        operator
            .process(Entry::from_record(Value::from("hello")))
            .unwrap();
        operator
            .process(Entry::from_record(Value::from("world")))
            .unwrap();

        let contents = buffer.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"record\":\"hello\""));
        assert!(lines[1].contains("\"record\":\"world\""));
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(parsed.is_object());
        }
    }

    #[test]
    fn id_defaults_to_the_type_name() {
        let config: StdoutConfig = serde_yaml::from_str("type: stdout\n").unwrap();
        assert_eq!(config.id(), "stdout");
    }

    #[test]
    fn builds_as_a_terminal_processor() {
        let config: StdoutConfig = serde_yaml::from_str("id: out\ntype: stdout\n").unwrap();
        let operator = config.build(&build_context()).unwrap();
        assert!(operator.can_process());
        assert!(!operator.can_output());
        assert_eq!(operator.id(), "out");
    }
}
