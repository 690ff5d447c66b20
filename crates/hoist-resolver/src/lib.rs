mod index;
mod pypi;
mod select;

pub use index::{index_url_for, parse_index_response, unresolved_message};
pub use pypi::PypiResolver;
pub use select::{parse_release_version, select_highest_release};

/// Determines the newest published version of a package.
///
/// Failures are reported as human-readable text; callers record it as the
/// problem of the `latest` record rather than aborting.
pub trait VersionResolver {
    fn latest_version(&self, index: &str, package: &str) -> Result<String, String>;
}

#[cfg(test)]
mod tests;
