//! National Water Model forecast taxonomy and resource URL builder.
//!
//! NWM output is published as one NetCDF file per (date, forecast cycle,
//! lead time) under a folder determined by the run type, variable group
//! and geography. This crate encodes that layout as static tables and
//! renders identifiers from them.
//!
//! # Example
//!
//! ```ignore
//! use nwm_urlgen::{ForecastRequest, Geography, RunType, Variable};
//!
//! let request = ForecastRequest::builder(RunType::ShortRange, Variable::Forcing, Geography::Conus)
//!     .date_range("20240601", None)?
//!     .cycles(vec![0])
//!     .lead_times(vec![1, 2, 3])
//!     .append_json(true)
//!     .build()?;
//!
//! for id in request.create_file_list() {
//!     println!("{}", id);
//! }
//! ```

pub mod builder;
pub mod tables;
pub mod taxonomy;
pub mod url_base;

pub use builder::{
    append_json, default_file, single_identifier, validate_combination, ForecastRequest,
    ForecastRequestBuilder, ResourceIdentifier, JSON_SUFFIX,
};
pub use tables::{default_entry, folder_name, HourSet};
pub use taxonomy::{EnsembleMember, Geography, RunType, Variable};
pub use url_base::UrlBase;
