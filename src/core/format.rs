//! Purpose: Centralize table fixture format versioning and upgrade guidance.
//! Exports: `FIXTURE_FORMAT_VERSION`, `SUPPORTED_FIXTURE_FORMAT_VERSIONS`, `fixture_version_error`.
//! Role: Shared policy for gating fixture compatibility in the reference store.
//! Invariants: Version list is additive; bump only for incompatible fixture changes.

use crate::core::error::{Error, ErrorKind};

pub const FIXTURE_FORMAT_VERSION: u32 = 1;
pub const SUPPORTED_FIXTURE_FORMAT_VERSIONS: &[u32] = &[FIXTURE_FORMAT_VERSION];

pub fn check_fixture_version(detected: u32) -> Result<(), Error> {
    if SUPPORTED_FIXTURE_FORMAT_VERSIONS.contains(&detected) {
        Ok(())
    } else {
        Err(fixture_version_error(detected))
    }
}

pub fn fixture_version_error(detected: u32) -> Error {
    let supported = SUPPORTED_FIXTURE_FORMAT_VERSIONS
        .iter()
        .map(|version| version.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Error::new(ErrorKind::Usage)
        .with_message(format!(
            "unsupported table fixture format {detected} (supported: {supported})"
        ))
        .with_hint("Regenerate the fixture with a matching fixtab release.")
}

#[cfg(test)]
mod tests {
    use super::{FIXTURE_FORMAT_VERSION, check_fixture_version};
    use crate::core::error::ErrorKind;

    #[test]
    fn only_known_versions_pass() {
        check_fixture_version(FIXTURE_FORMAT_VERSION).expect("current version");
        let err = check_fixture_version(99).expect_err("future version");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.message().unwrap_or_default().contains("99"));
        assert!(err.hint().is_some());
    }
}
