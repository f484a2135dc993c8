pub mod category;
pub mod clean;
pub mod config;
pub mod db;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod query;
pub mod report;
pub mod sources;
pub mod synthetic;

pub use category::NpsCategory;
pub use clean::{clean_table, load_dataset, load_tables, Dataset, LoadReport};
pub use config::DashboardConfig;
pub use models::{CanonicalField, CanonicalResponse, RawTable, YearMonth};
pub use query::{filter_responses, PeriodPreset, ResponseFilter, Window};
