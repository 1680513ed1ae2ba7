//! Built-in operators for the sift agent.
//!
//! Inputs produce entries from the outside world (tailed files, UDP
//! datagrams, the systemd journal), parsers restructure raw text into
//! structured records, transformers reshape entries in place, and outputs
//! terminate the flow. All of them compose the bases from
//! [`sift_core::helper`].

use std::sync::Once;

use sift_core::registry;

pub mod input;
pub mod output;
pub mod parser;
pub mod transform;

static REGISTER: Once = Once::new();

/// Registers every built-in operator type. Hosts call this once before
/// decoding configuration.
pub fn register_defaults() {
    REGISTER.call_once(|| {
        registry::register::<input::file::FileInputConfig>("file_input");
        registry::register::<input::journald::JournaldInputConfig>("journald_input");
        registry::register::<input::udp::UdpInputConfig>("udp_input");
        registry::register::<parser::json::JsonParserConfig>("json_parser");
        registry::register::<parser::regex::RegexParserConfig>("regex_parser");
        registry::register::<parser::time::TimeParserOperatorConfig>("time_parser");
        registry::register::<transform::restructure::RestructureConfig>("restructure");
        registry::register::<output::stdout::StdoutConfig>("stdout");
    });
}
