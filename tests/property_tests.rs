/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use proptest::prelude::*;
use rust_founder_probes::credentials::is_valid_email;
use rust_founder_probes::fixtures::{is_probe_email, probe_email};
use rust_founder_probes::rest_client::parse_content_range_total;
use rust_founder_probes::schema::{diff_columns, founders};
use rust_founder_probes::storage_client::public_url;

// Property: Content-Range parsing should never panic
proptest! {
    #[test]
    fn content_range_parsing_never_panics(value in "\\PC*") {
        let _ = parse_content_range_total(&value);
    }

    #[test]
    fn content_range_total_is_last_segment(start in 0u64..1000, len in 0u64..1000, total in 0u64..u64::MAX) {
        let header = format!("{}-{}/{}", start, start + len, total);
        prop_assert_eq!(parse_content_range_total(&header), Some(total));
    }

    #[test]
    fn unknown_total_is_none(start in 0u64..1000, end in 0u64..1000) {
        let header = format!("{}-{}/*", start, end);
        prop_assert_eq!(parse_content_range_total(&header), None);
    }
}

// Property: public URLs have exactly one slash between segments
proptest! {
    #[test]
    fn public_url_joins_cleanly(
        host in "[a-z]{3,12}",
        bucket in "[a-z]{3,10}",
        folder in "[a-z0-9]{1,8}",
        file in "[a-z0-9]{1,8}\\.png",
        trailing in proptest::bool::ANY,
        leading in proptest::bool::ANY,
    ) {
        let project = format!("https://{}.supabase.co{}", host, if trailing { "/" } else { "" });
        let object = format!("{}{}/{}", if leading { "/" } else { "" }, folder, file);
        let url = public_url(&project, &bucket, &object);

        prop_assert_eq!(
            url.clone(),
            format!("https://{}.supabase.co/storage/v1/object/public/{}/{}/{}", host, bucket, folder, file)
        );
        prop_assert!(!url["https://".len()..].contains("//"));
    }
}

// Property: probe identities are always recognisable
proptest! {
    #[test]
    fn probe_emails_are_tagged(domain in "[a-z]{2,10}\\.[a-z]{2,4}") {
        let email = probe_email(&domain);
        prop_assert!(is_probe_email(&email));
        let suffix = format!("@{}", domain);
        prop_assert!(email.ends_with(&suffix));
        prop_assert!(is_valid_email(&email));
    }

    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_valid_email(&email);
    }
}

// Property: dropping any pinned column is reported as missing
proptest! {
    #[test]
    fn dropped_column_is_missing(index in 0usize..founders::ALL.len()) {
        let live: Vec<String> = founders::ALL
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, c)| c.to_string())
            .collect();
        let drift = diff_columns(founders::ALL, founders::LEGACY_NAMES, &live);
        prop_assert_eq!(drift.missing, vec![founders::ALL[index].to_string()]);
        prop_assert!(drift.unexpected.is_empty());
    }
}
