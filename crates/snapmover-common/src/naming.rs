//! Deterministic names shared with the mover controllers
//!
//! The mover controllers and this plugin find each other's objects purely by
//! name, so these conventions must not change.

use sha2::{Digest, Sha256};

use crate::crd::MoverFlavor;

/// Maximum length of a Kubernetes label value
pub const MAX_LABEL_LENGTH: usize = 63;

/// Number of hash characters appended to a shortened label value
const LABEL_HASH_CHARS: usize = 6;

/// Suffix of the replication destination the mover creates per restore request
pub const REPLICATION_DESTINATION_SUFFIX: &str = "-rep-dest";

/// Prefix of the statically bound snapshot content created on restore
pub const STATIC_CONTENT_PREFIX: &str = "vsr-vsc-";

/// Name of the mover backup request for a snapshot content, derived from the
/// name of the VolumeSnapshot that owns the content
pub fn backup_request_name(flavor: MoverFlavor, owning_snapshot: &str) -> String {
    format!("{}{}", flavor.backup_prefix(), owning_snapshot)
}

/// Name of the mover restore request for a source claim
pub fn restore_request_name(flavor: MoverFlavor, source_claim: &str) -> String {
    format!("{}{}", flavor.restore_prefix(), source_claim)
}

/// Name of the replication destination backing a mover restore request
pub fn replication_destination_name(restore_request: &str) -> String {
    format!("{restore_request}{REPLICATION_DESTINATION_SUFFIX}")
}

/// Name of the statically bound snapshot content for a source claim
pub fn static_content_name(source_claim: &str) -> String {
    format!("{STATIC_CONTENT_PREFIX}{source_claim}")
}

/// Shorten a value so it fits in a label, the same way Velero does.
///
/// Values of up to 63 characters are returned unchanged. Longer values keep
/// their first 57 characters followed by the first 6 hex characters of the
/// SHA-256 of the whole value, so distinct long names stay distinct.
pub fn valid_label_value(value: &str) -> String {
    if value.len() <= MAX_LABEL_LENGTH {
        return value.to_string();
    }

    let digest = Sha256::digest(value.as_bytes());
    let hex = digest
        .iter()
        .take(LABEL_HASH_CHARS / 2)
        .fold(String::with_capacity(LABEL_HASH_CHARS), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        });

    // Label values are ASCII, but don't split a multi-byte char if one slips in
    let mut cut = MAX_LABEL_LENGTH - LABEL_HASH_CHARS;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &value[..cut], hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_names_follow_flavor_prefixes() {
        assert_eq!(
            backup_request_name(MoverFlavor::DataMover, "snap-db"),
            "dmb-snap-db"
        );
        assert_eq!(
            backup_request_name(MoverFlavor::VolumeSnapshotMover, "snap-db"),
            "vsb-snap-db"
        );
        assert_eq!(
            restore_request_name(MoverFlavor::DataMover, "mssql-pvc"),
            "dmr-mssql-pvc"
        );
        assert_eq!(
            restore_request_name(MoverFlavor::VolumeSnapshotMover, "mssql-pvc"),
            "vsr-mssql-pvc"
        );
    }

    #[test]
    fn replication_destination_and_static_content() {
        assert_eq!(
            replication_destination_name("dmr-mssql-pvc"),
            "dmr-mssql-pvc-rep-dest"
        );
        assert_eq!(static_content_name("mssql-pvc"), "vsr-vsc-mssql-pvc");
    }

    #[test]
    fn short_label_values_are_unchanged() {
        assert_eq!(valid_label_value("nightly"), "nightly");
        let exact = "a".repeat(63);
        assert_eq!(valid_label_value(&exact), exact);
    }

    #[test]
    fn long_label_values_are_shortened_with_hash() {
        let long = format!("backup-{}", "x".repeat(80));
        let short = valid_label_value(&long);

        assert_eq!(short.len(), 63);
        assert!(short.starts_with(&long[..57]));
        assert!(short[57..].chars().all(|c| c.is_ascii_hexdigit()));
        // deterministic
        assert_eq!(short, valid_label_value(&long));
    }

    #[test]
    fn long_values_with_same_prefix_differ() {
        let a = format!("{}-a", "p".repeat(70));
        let b = format!("{}-b", "p".repeat(70));
        assert_ne!(valid_label_value(&a), valid_label_value(&b));
    }
}
