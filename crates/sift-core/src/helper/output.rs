//! Base for terminal operators.

use serde::{Deserialize, Serialize};

use crate::helper::base::BasicConfig;

/// Configuration shared by output operators. Outputs have no downstream
/// neighbors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(flatten)]
    pub basic: BasicConfig,
}

impl OutputConfig {
    pub fn id(&self) -> String {
        self.basic.id()
    }
}

/// Runtime base for outputs: identity only.
#[derive(Debug)]
pub struct OutputOperator {
    id: String,
}

impl OutputOperator {
    pub fn from_config(config: &OutputConfig) -> Self {
        OutputOperator { id: config.id() }
    }

    pub fn id(&self) -> String {
        self.id.clone()
    }
}
