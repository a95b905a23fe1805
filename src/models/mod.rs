pub mod filter;
pub mod package;

pub use filter::Filter;
pub use package::{current_timestamp, InstallState, PackageKey, PackageRecord, PACKAGE_ID_SEPARATOR};
