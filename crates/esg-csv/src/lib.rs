mod results;
mod worklist;
pub mod writer;

pub use results::{read_results, MISSING_VALUE, TIMESTAMP_FORMAT};
pub use worklist::{load_worklist, WorklistConfig};
pub use writer::{CsvSink, CsvTerminator, CsvWriterConfig};

pub use anyhow;
