//! Prazos SAP report engine: loads work-order (PEP) matrices, filters and
//! aggregates them into the dashboard's chart series, detail table and KPIs.
pub mod engine;
pub mod error;
pub mod filters;
pub mod loader;
pub mod logging;
pub mod output;
pub mod session;
pub mod source;
pub mod types;
pub mod util;

pub use engine::compute;
pub use error::ReportError;
pub use filters::FilterState;
pub use session::Session;
pub use source::{DataSource, FileSource, MatrixQuery};
