//! End-to-end validation runs against repositories staged on disk

use pretty_assertions::assert_eq;
use serde_json::json;
use stagecheck_core::{FileStore, ValidationKey};
use stagecheck_test_fixtures::{
    ccd_key, packages, patch_key, source_catalog, FixtureType, TestFixtures, PACKAGES,
};
use stagecheck_verification::prelude::*;
use stagecheck_verification::{FileReferenceCatalog, KeyOutcome, State};

fn lines(outcome: &KeyOutcome) -> Vec<String> {
    outcome
        .records
        .iter()
        .map(|r| format!("{}: {}", r.description, r.outcome))
        .collect()
}

fn run(fixtures: &TestFixtures, variant: &str, keys: &[ValidationKey]) -> RunSummary {
    let registry = Registry::builtin().unwrap();
    validate(&registry, variant, &fixtures.location(), None, keys).unwrap()
}

#[test]
fn test_raw_validation_passes() {
    let fixtures = TestFixtures::new();
    fixtures.setup(FixtureType::Raw, &ccd_key());

    let summary = run(&fixtures, "RawValidation", &[ccd_key()]);
    assert!(summary.success());
    assert_eq!(
        lines(&summary.outcomes[0]),
        vec!["raw exists: PASS", "raw readable (exposure): PASS"]
    );
}

#[test]
fn test_every_variant_passes_on_its_fixture() {
    let fixtures = TestFixtures::new();
    for fixture in FixtureType::ALL {
        fixtures.setup_default(*fixture);
    }

    for fixture in FixtureType::ALL {
        let key = fixture.default_key();
        let summary = run(&fixtures, fixture.variant(), &[key]);
        let outcome = &summary.outcomes[0];
        assert!(
            summary.success(),
            "{} failed: {:?}",
            fixture.variant(),
            outcome.failure
        );
        assert_eq!(outcome.state, State::Done);
        assert!(outcome.records.iter().all(|r| r.outcome != Outcome::Fail));
    }
}

#[test]
fn test_sfm_runs_checks_in_state_order() {
    let fixtures = TestFixtures::new();
    fixtures.setup(FixtureType::Sfm, &ccd_key());

    let summary = run(&fixtures, "SfmValidation", &[ccd_key()]);
    let lines = lines(&summary.outcomes[0]);

    let position = |needle: &str| {
        lines
            .iter()
            .position(|l| l.starts_with(needle))
            .unwrap_or_else(|| panic!("no record starting with {}", needle))
    };
    assert!(position("processCcd_config exists") < position("ossThumb exists on disk"));
    assert!(position("plotEllipticityGrid has non-zero size") < position("Number of sources"));
    assert!(position("Number of sources") < position("Number of matches"));
    assert!(position("Number of matches") < position("Number of full matches"));
    assert!(position("Reference catalog unavailable") < position("Aperture correction fields"));
    assert!(position("Aperture correction fields") < position("Fraction of PSF stars"));

    assert!(lines.contains(&"Number of sources (150 > 100): PASS".to_string()));
    assert!(lines.contains(&"ossThumb has non-zero size (8 > 0): PASS".to_string()));
    assert_eq!(
        lines.last().map(String::as_str),
        Some("Fraction of PSF stars classified as point-like (1.000 >= 0.950): PASS")
    );
}

#[test]
fn test_too_few_sources_stops_measure_validation() {
    let fixtures = TestFixtures::new();
    let key = patch_key();
    fixtures.setup(FixtureType::Measure, &key);
    fixtures.write_dataset("deepCoadd_meas", &key, &source_catalog(50));

    let summary = run(&fixtures, "MeasureValidation", &[key]);
    let outcome = &summary.outcomes[0];
    let lines = lines(outcome);

    assert!(!summary.success());
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(outcome.state, State::SourceCheck);
    assert_eq!(
        lines.last().map(String::as_str),
        Some("Number of sources (50 > 100): FAIL")
    );
    assert!(!lines.iter().any(|l| l.starts_with("Number of matches")));
}

#[test]
fn test_nothing_runs_after_a_failure() {
    let fixtures = TestFixtures::new();
    let key = ccd_key();
    fixtures.setup(FixtureType::Sfm, &key);
    fixtures.remove_dataset("calexp", &key);

    let summary = run(&fixtures, "SfmValidation", &[key]);
    let outcome = &summary.outcomes[0];

    assert_eq!(outcome.records.last().map(|r| r.outcome), Some(Outcome::Fail));
    assert_eq!(
        outcome.records.iter().filter(|r| r.outcome == Outcome::Fail).count(),
        1
    );
    assert_eq!(
        lines(outcome),
        vec![
            "processCcd_config exists: PASS",
            "processCcd_config readable (document): PASS",
            "processCcd_metadata exists: PASS",
            "processCcd_metadata readable (property_set): PASS",
            "calexp exists: FAIL",
        ]
    );
}

#[test]
fn test_repeated_runs_are_identical() {
    let fixtures = TestFixtures::new();
    fixtures.setup(FixtureType::Coadd, &patch_key());

    let first = run(&fixtures, "CoaddValidation", &[patch_key()]);
    let second = run(&fixtures, "CoaddValidation", &[patch_key()]);
    assert_eq!(first.outcomes[0].records, second.outcomes[0].records);
}

#[test]
fn test_corrupt_metadata_is_tolerated() {
    let fixtures = TestFixtures::new();
    let key = ccd_key();
    fixtures.setup(FixtureType::Sfm, &key);
    fixtures.corrupt_dataset("processCcd_metadata", &key);

    let summary = run(&fixtures, "SfmValidation", &[key]);
    let outcome = &summary.outcomes[0];

    assert!(summary.success());
    let warning = outcome
        .records
        .iter()
        .find(|r| r.outcome == Outcome::Warn)
        .unwrap();
    assert_eq!(warning.description, "processCcd_metadata readable");
    assert!(warning.context.as_deref().unwrap().contains("could not be deserialized"));
}

#[test]
fn test_binary_metadata_is_tolerated() {
    let fixtures = TestFixtures::new();
    let key = ccd_key();
    fixtures.setup(FixtureType::Sfm, &key);
    fixtures.remove_dataset("processCcd_metadata", &key);
    fixtures.write_file("processCcd_metadata", &key, "json", &[0xff, 0xfe, 0x00, 0x01]);

    let summary = run(&fixtures, "SfmValidation", &[key]);
    let outcome = &summary.outcomes[0];

    assert!(summary.success(), "failed: {:?}", outcome.failure);
    assert_eq!(outcome.state, State::Done);
    let warnings: Vec<&str> = outcome
        .records
        .iter()
        .filter(|r| r.outcome == Outcome::Warn)
        .map(|r| r.description.as_str())
        .collect();
    assert_eq!(warnings, vec!["processCcd_metadata readable"]);
}

#[test]
fn test_corrupt_catalog_is_fatal() {
    let fixtures = TestFixtures::new();
    let key = ccd_key();
    fixtures.setup(FixtureType::Sfm, &key);
    fixtures.corrupt_dataset("icSrc", &key);

    let summary = run(&fixtures, "SfmValidation", &[key]);
    let outcome = &summary.outcomes[0];

    assert!(!summary.success());
    assert_eq!(
        lines(outcome).last().map(String::as_str),
        Some("icSrc readable: FAIL")
    );
}

#[test]
fn test_manifest_reports_first_missing_package_only() {
    let fixtures = TestFixtures::new();
    let partial: Vec<(&str, &str)> = PACKAGES
        .iter()
        .copied()
        .filter(|(name, _)| *name != "astropy" && *name != "ci_hsc")
        .collect();
    fixtures.write_dataset("packages", &ValidationKey::empty(), &packages(&partial));

    let summary = run(&fixtures, "VersionValidation", &[]);
    let outcome = &summary.outcomes[0];

    assert!(!summary.success());
    assert_eq!(
        lines(outcome),
        vec![
            "Package python is present: PASS",
            "Package numpy is present: PASS",
            "Package astropy is present: FAIL",
        ]
    );
}

#[test]
fn test_failed_key_does_not_stop_the_next() {
    let fixtures = TestFixtures::new();
    let good = ccd_key();
    let bad = ValidationKey::builder()
        .coord("visit", 903336)
        .coord("detector", 16)
        .build();
    fixtures.setup(FixtureType::Raw, &good);

    let summary = run(&fixtures, "RawValidation", &[bad, good]);
    let passed: Vec<bool> = summary.outcomes.iter().map(KeyOutcome::passed).collect();
    assert_eq!(passed, vec![false, true]);
    assert_eq!(summary.exit_code(), 1);
}

#[test]
fn test_reference_catalog_resolves_matches() {
    let fixtures = TestFixtures::new();
    let key = ccd_key();
    fixtures.setup(FixtureType::Sfm, &key);
    let refcat_path = fixtures.write_reference_catalog("gaia_dr3");

    let registry = Registry::builtin().unwrap();
    let summary = validate(
        &registry,
        "SfmValidation",
        &fixtures.location(),
        Some(&refcat_path),
        &[key],
    )
    .unwrap();

    assert!(summary.success());
    assert!(lines(&summary.outcomes[0])
        .contains(&"Number of matches resolved in gaia_dr3 (20 > 10): PASS".to_string()));
}

#[test]
fn test_reference_catalog_missing_ids_fail() {
    let fixtures = TestFixtures::new();
    let key = ccd_key();
    fixtures.setup(FixtureType::Sfm, &key);
    let refcat_path = fixtures.write_reference_catalog_with_ids("sparse", &[5000, 5001, 5002]);
    let refcat = FileReferenceCatalog::load(&refcat_path).unwrap();

    let registry = Registry::builtin().unwrap();
    let store = FileStore::open(&fixtures.location()).unwrap();
    let summary = Driver::new(&registry, &store)
        .with_reference_catalog(Some(&refcat))
        .run("SfmValidation", &[key])
        .unwrap();

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.state, State::MatchFullCheck);
    assert_eq!(
        lines(outcome).last().map(String::as_str),
        Some("Number of matches resolved in sparse (3 > 10): FAIL")
    );
}

#[test]
fn test_bright_object_mask_required() {
    let fixtures = TestFixtures::new();
    let key = patch_key();
    fixtures.setup(FixtureType::Coadd, &key);
    fixtures.write_dataset(
        "deepCoadd",
        &key,
        &json!({
            "kind": "exposure",
            "width": 2,
            "height": 1,
            "mask_planes": {"BRIGHT_OBJECT": 9},
            "mask": [0, 0],
        }),
    );

    let summary = run(&fixtures, "CoaddValidation", &[key]);
    assert_eq!(
        lines(&summary.outcomes[0]).last().map(String::as_str),
        Some("Pixels masked as BRIGHT_OBJECT (0 > 0): FAIL")
    );
}

#[test]
fn test_unknown_variant_is_rejected_before_io() {
    let registry = Registry::builtin().unwrap();
    let location = StoreLocation::new("/definitely/not/a/repository");
    let err = validate(&registry, "SfmValidationX", &location, None, &[]).unwrap_err();
    assert!(err.to_string().contains("Unknown validation variant 'SfmValidationX'"));
}
