//! Reusable behavior mixed into concrete operators.
//!
//! Concrete operators compose these pieces instead of reimplementing them:
//! the capability bases (`input`, `transformer`, `parser`, `output`) carry
//! identity and fan-out dispatch, while [`time::TimeParser`] and
//! [`expr::ExprString`] provide timestamp extraction and expression
//! templating.

mod base;
pub mod expr;
pub mod input;
pub mod output;
pub mod parser;
pub mod time;
pub mod transformer;
pub mod writer;

pub use base::BasicConfig;
pub use expr::{ExprString, ExprStringConfig};
pub use input::{InputConfig, InputOperator};
pub use output::{OutputConfig, OutputOperator};
pub use parser::{ParserConfig, ParserOperator};
pub use time::{LayoutType, TimeParser, TimeParserConfig};
pub use transformer::{TransformerConfig, TransformerOperator};
pub use writer::{OutputIds, WriterConfig, WriterOperator};
