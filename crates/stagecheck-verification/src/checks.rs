//! Stage-specific derived checks
//!
//! Each function here builds a [`DerivedCheck`] that a variant appends to
//! its spec. Catalog checks see the source catalog fetched by the source
//! check; store checks fetch what they need for the current key.

use std::collections::HashMap;
use std::fmt;

use stagecheck_core::artifact::{field_f64, field_flag, field_i64, Record};
use stagecheck_core::{Artifact, Catalog};
use tracing::debug;

use crate::reporter::{CheckResult, Reporter};
use crate::spec::{CheckContext, DerivedCheck};

pub const APERTURE_CORRECTION_ALGORITHMS: &[&str] = &["base_PsfFlux", "base_GaussianFlux"];
const APERTURE_CORRECTION_SUFFIXES: &[&str] = &["_apCorr", "_apCorrErr", "_flag_apCorr"];

pub const PSF_USED_COLUMN: &str = "calib_psf_used";
pub const EXTENDEDNESS_COLUMN: &str = "base_ClassificationExtendedness_value";
/// Extendedness below this is point-like.
pub const POINT_LIKE_EXTENDEDNESS: f64 = 0.5;

pub const MERGE_FOOTPRINT_PREFIX: &str = "merge_footprint_";
const ID_COLUMN: &str = "id";
const PARENT_COLUMN: &str = "parent";

pub const BRIGHT_OBJECT_PLANE: &str = "BRIGHT_OBJECT";
pub const VARIANCE_SCALE_KEY: &str = "VARIANCE_SCALE";

pub const PACKAGE_MANIFEST_DATASET: &str = "packages";
pub const REQUIRED_PACKAGES: &[&str] = &[
    "python",
    "numpy",
    "astropy",
    "afw",
    "daf_butler",
    "meas_algorithms",
    "pipe_tasks",
    "obs_subaru",
    "ci_hsc",
];

/// A ratio in `[0, 1]`, held at the three decimals it is printed with so a
/// logged comparison reads the same as its verdict.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Fraction(f64);

impl Fraction {
    pub fn new(value: f64) -> Self {
        Fraction((value * 1000.0).round() / 1000.0)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

pub fn aperture_corrections() -> DerivedCheck {
    DerivedCheck::catalog("aperture corrections", check_aperture_corrections)
}

pub fn check_aperture_corrections(catalog: &Catalog, reporter: &mut Reporter) -> CheckResult {
    for algorithm in APERTURE_CORRECTION_ALGORITHMS {
        let missing: Vec<String> = APERTURE_CORRECTION_SUFFIXES
            .iter()
            .map(|suffix| format!("{}{}", algorithm, suffix))
            .filter(|column| !catalog.has_column(column))
            .collect();

        reporter.record_with_context(
            format!("Aperture correction fields for {} are present", algorithm),
            missing.is_empty(),
            (!missing.is_empty()).then(|| format!("missing: {}", missing.join(", "))),
        )?;
    }
    Ok(())
}

pub fn psf_star_fraction(min_fraction: f64) -> DerivedCheck {
    DerivedCheck::catalog("psf star fraction", move |catalog, reporter| {
        check_psf_star_fraction(catalog, reporter, min_fraction)
    })
}

/// Among the stars used for PSF modelling, enough must look point-like.
pub fn check_psf_star_fraction(
    catalog: &Catalog,
    reporter: &mut Reporter,
    min_fraction: f64,
) -> CheckResult {
    let psf_stars: Vec<&Record> = catalog
        .records()
        .filter(|r| field_flag(r, PSF_USED_COLUMN).unwrap_or(false))
        .collect();
    reporter.assert_greater("Number of PSF stars", psf_stars.len(), 0)?;

    let point_like = psf_stars
        .iter()
        .filter(|r| {
            field_f64(r, EXTENDEDNESS_COLUMN).map_or(false, |e| e < POINT_LIKE_EXTENDEDNESS)
        })
        .count();
    let fraction = point_like as f64 / psf_stars.len() as f64;
    debug!("{} of {} PSF stars are point-like", point_like, psf_stars.len());

    reporter.assert_greater_equal(
        "Fraction of PSF stars classified as point-like",
        Fraction::new(fraction),
        Fraction::new(min_fraction),
    )
}

pub fn merge_footprint_consistency() -> DerivedCheck {
    DerivedCheck::catalog("merge footprint consistency", check_merge_footprints)
}

/// Children of a deblended parent must carry the parent's merge footprint
/// flags. A child whose parent is not in the catalog is an offender too.
pub fn check_merge_footprints(catalog: &Catalog, reporter: &mut Reporter) -> CheckResult {
    let columns: Vec<&str> = catalog.columns_with_prefix(MERGE_FOOTPRINT_PREFIX).collect();
    reporter.record_with_context(
        "Merge footprint columns are present",
        !columns.is_empty(),
        columns
            .is_empty()
            .then(|| format!("no {}* columns in schema", MERGE_FOOTPRINT_PREFIX)),
    )?;

    let by_id: HashMap<i64, &Record> = catalog
        .records()
        .filter_map(|r| field_i64(r, ID_COLUMN).map(|id| (id, r)))
        .collect();

    let mut offenders = Vec::new();
    for record in catalog.records() {
        let parent_id = field_i64(record, PARENT_COLUMN).unwrap_or(0);
        if parent_id == 0 {
            continue;
        }

        let consistent = match by_id.get(&parent_id) {
            Some(parent) => columns
                .iter()
                .all(|column| field_flag(record, column) == field_flag(parent, column)),
            None => false,
        };
        if !consistent {
            let id = field_i64(record, ID_COLUMN)
                .map(|id| id.to_string())
                .unwrap_or_else(|| "?".to_string());
            offenders.push(id);
        }
    }

    reporter.record_with_context(
        "Merge footprint flags of children match their parents",
        offenders.is_empty(),
        (!offenders.is_empty()).then(|| format!("offending ids: {}", offenders.join(", "))),
    )
}

pub fn bright_object_mask(dataset: impl Into<String>) -> DerivedCheck {
    let dataset = dataset.into();
    DerivedCheck::store("bright object mask", move |ctx, reporter| {
        check_bright_object_mask(ctx, reporter, &dataset)
    })
}

pub fn check_bright_object_mask(
    ctx: &CheckContext<'_>,
    reporter: &mut Reporter,
    dataset: &str,
) -> CheckResult {
    let exposure = ctx.fetch_exposure(reporter, dataset)?;
    let description = format!("Pixels masked as {}", BRIGHT_OBJECT_PLANE);
    match exposure.count_masked(BRIGHT_OBJECT_PLANE) {
        Some(count) => reporter.assert_greater(&description, count, 0),
        None => Err(reporter.fail(
            description,
            Some(format!("mask plane {} is not defined for {}", BRIGHT_OBJECT_PLANE, dataset)),
        )),
    }
}

pub fn transmission_curve(dataset: impl Into<String>) -> DerivedCheck {
    let dataset = dataset.into();
    DerivedCheck::store("transmission curve", move |ctx, reporter| {
        let exposure = ctx.fetch_exposure(reporter, &dataset)?;
        reporter.assert_true(
            format!("Transmission curve is attached to {}", dataset),
            exposure.transmission_curve.is_some(),
        )
    })
}

pub fn variance_scale(dataset: impl Into<String>) -> DerivedCheck {
    let dataset = dataset.into();
    DerivedCheck::store("variance scale", move |ctx, reporter| {
        check_variance_scale(ctx, reporter, &dataset)
    })
}

pub fn check_variance_scale(
    ctx: &CheckContext<'_>,
    reporter: &mut Reporter,
    dataset: &str,
) -> CheckResult {
    let exposure = ctx.fetch_exposure(reporter, dataset)?;
    let description = format!("{} of {}", VARIANCE_SCALE_KEY, dataset);
    match exposure.metadata.get_f64(VARIANCE_SCALE_KEY) {
        Some(scale) => reporter.assert_greater(&description, scale, 0.0),
        None => Err(reporter.fail(
            description,
            Some(format!("{} missing from metadata", VARIANCE_SCALE_KEY)),
        )),
    }
}

pub fn package_manifest(
    dataset: impl Into<String>,
    required: &'static [&'static str],
) -> DerivedCheck {
    let dataset = dataset.into();
    DerivedCheck::store("package manifest", move |ctx, reporter| {
        check_package_manifest(ctx, reporter, &dataset, required)
    })
}

/// Stops at the first missing package.
pub fn check_package_manifest(
    ctx: &CheckContext<'_>,
    reporter: &mut Reporter,
    dataset: &str,
    required: &[&str],
) -> CheckResult {
    let manifest = match ctx.fetch(reporter, dataset)? {
        Artifact::Packages(manifest) => manifest,
        other => {
            return Err(reporter.fail(
                format!("{} is a package manifest ({})", dataset, other.kind_name()),
                None,
            ))
        }
    };

    for name in required {
        if let Some(version) = manifest.packages.get(*name) {
            debug!("Package {} at version {}", name, version);
        }
        reporter.assert_true(format!("Package {} is present", name), manifest.contains(name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::Outcome;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use stagecheck_core::{
        DatasetRef, Exposure, MemoryStore, PackageManifest, TransmissionCurve, ValidationKey,
    };

    fn catalog(schema: &[&str], records: Value) -> Catalog {
        let mut catalog = Catalog::new(schema.iter().copied());
        if let Value::Array(rows) = records {
            for row in rows {
                catalog.push(row.as_object().cloned().unwrap_or_default());
            }
        }
        catalog
    }

    fn lines(reporter: &Reporter) -> Vec<String> {
        reporter
            .records()
            .iter()
            .map(|r| format!("{}: {}", r.description, r.outcome))
            .collect()
    }

    fn patch_key() -> ValidationKey {
        ValidationKey::builder()
            .coord("tract", 0)
            .coord("patch", 69)
            .coord("band", "i")
            .build()
    }

    #[test]
    fn test_aperture_corrections_present() {
        let cat = catalog(
            &[
                "id",
                "base_PsfFlux_apCorr",
                "base_PsfFlux_apCorrErr",
                "base_PsfFlux_flag_apCorr",
                "base_GaussianFlux_apCorr",
                "base_GaussianFlux_apCorrErr",
                "base_GaussianFlux_flag_apCorr",
            ],
            json!([]),
        );
        let mut reporter = Reporter::new();
        assert!(check_aperture_corrections(&cat, &mut reporter).is_ok());
        assert_eq!(
            lines(&reporter),
            vec![
                "Aperture correction fields for base_PsfFlux are present: PASS",
                "Aperture correction fields for base_GaussianFlux are present: PASS",
            ]
        );
    }

    #[test]
    fn test_aperture_corrections_missing_column_names_it() {
        let cat = catalog(&["id", "base_PsfFlux_apCorr", "base_PsfFlux_apCorrErr"], json!([]));
        let mut reporter = Reporter::new();
        let failure = check_aperture_corrections(&cat, &mut reporter).unwrap_err();
        assert_eq!(failure.context.as_deref(), Some("missing: base_PsfFlux_flag_apCorr"));
        assert_eq!(reporter.records().len(), 1);
    }

    #[test]
    fn test_psf_star_fraction_passes_at_threshold() {
        let cat = catalog(
            &[PSF_USED_COLUMN, EXTENDEDNESS_COLUMN],
            json!([
                {"calib_psf_used": true, "base_ClassificationExtendedness_value": 0.0},
                {"calib_psf_used": true, "base_ClassificationExtendedness_value": 0.0},
                {"calib_psf_used": true, "base_ClassificationExtendedness_value": 0.0},
                {"calib_psf_used": true, "base_ClassificationExtendedness_value": 1.0},
                {"calib_psf_used": false, "base_ClassificationExtendedness_value": 1.0}
            ]),
        );
        let mut reporter = Reporter::new();
        assert!(check_psf_star_fraction(&cat, &mut reporter, 0.75).is_ok());
        assert_eq!(
            lines(&reporter),
            vec![
                "Number of PSF stars (4 > 0): PASS",
                "Fraction of PSF stars classified as point-like (0.750 >= 0.750): PASS",
            ]
        );
    }

    #[test]
    fn test_fraction_verdict_matches_printed_value() {
        assert_eq!(Fraction::new(0.9496).to_string(), "0.950");
        assert!(Fraction::new(0.9496) >= Fraction::new(0.95));
        assert!(Fraction::new(0.9494) < Fraction::new(0.95));

        let mut reporter = Reporter::new();
        let failure = reporter
            .assert_greater_equal("Fraction", Fraction::new(0.9494), Fraction::new(0.95))
            .unwrap_err();
        assert_eq!(failure.description, "Fraction (0.949 >= 0.950)");
    }

    #[test]
    fn test_psf_star_fraction_missing_extendedness_is_not_point_like() {
        let cat = catalog(
            &[PSF_USED_COLUMN],
            json!([{"calib_psf_used": 1}, {"calib_psf_used": 1}]),
        );
        let mut reporter = Reporter::new();
        let failure = check_psf_star_fraction(&cat, &mut reporter, 0.95).unwrap_err();
        assert_eq!(
            failure.description,
            "Fraction of PSF stars classified as point-like (0.000 >= 0.950)"
        );
    }

    #[test]
    fn test_psf_star_fraction_requires_psf_stars() {
        let cat = catalog(&[PSF_USED_COLUMN], json!([{"calib_psf_used": false}]));
        let mut reporter = Reporter::new();
        let failure = check_psf_star_fraction(&cat, &mut reporter, 0.9).unwrap_err();
        assert_eq!(failure.description, "Number of PSF stars (0 > 0)");
        assert_eq!(reporter.records().len(), 1);
    }

    #[test]
    fn test_merge_footprints_consistent() {
        let cat = catalog(
            &["id", "parent", "merge_footprint_i", "merge_footprint_r"],
            json!([
                {"id": 1, "parent": 0, "merge_footprint_i": true, "merge_footprint_r": false},
                {"id": 2, "parent": 1, "merge_footprint_i": true, "merge_footprint_r": false},
                {"id": 3, "parent": 1, "merge_footprint_i": true, "merge_footprint_r": false}
            ]),
        );
        let mut reporter = Reporter::new();
        assert!(check_merge_footprints(&cat, &mut reporter).is_ok());
        assert_eq!(reporter.count(Outcome::Pass), 2);
    }

    #[test]
    fn test_merge_footprints_compare_flag_values() {
        let cat = catalog(
            &["id", "parent", "merge_footprint_i", "merge_footprint_r"],
            json!([
                {"id": 1, "parent": 0, "merge_footprint_i": true, "merge_footprint_r": 0},
                {"id": 2, "parent": 1, "merge_footprint_i": 1, "merge_footprint_r": false}
            ]),
        );
        let mut reporter = Reporter::new();
        assert!(check_merge_footprints(&cat, &mut reporter).is_ok());
        assert_eq!(reporter.count(Outcome::Fail), 0);
    }

    #[test]
    fn test_merge_footprints_lists_every_offender() {
        let cat = catalog(
            &["id", "parent", "merge_footprint_i"],
            json!([
                {"id": 1, "parent": 0, "merge_footprint_i": true},
                {"id": 2, "parent": 1, "merge_footprint_i": false},
                {"id": 3, "parent": 1, "merge_footprint_i": true},
                {"id": 4, "parent": 99, "merge_footprint_i": true}
            ]),
        );
        let mut reporter = Reporter::new();
        let failure = check_merge_footprints(&cat, &mut reporter).unwrap_err();
        assert_eq!(
            failure.description,
            "Merge footprint flags of children match their parents"
        );
        assert_eq!(failure.context.as_deref(), Some("offending ids: 2, 4"));
    }

    #[test]
    fn test_merge_footprints_without_columns_fails() {
        let cat = catalog(&["id", "parent"], json!([{"id": 1, "parent": 0}]));
        let mut reporter = Reporter::new();
        let failure = check_merge_footprints(&cat, &mut reporter).unwrap_err();
        assert_eq!(failure.description, "Merge footprint columns are present");
    }

    fn coadd(mask: Vec<u32>, with_curve: bool) -> Artifact {
        let mut exposure = Exposure {
            width: 2,
            height: 2,
            mask,
            ..Exposure::default()
        };
        exposure.mask_planes.insert("BAD".to_string(), 0);
        exposure.mask_planes.insert(BRIGHT_OBJECT_PLANE.to_string(), 9);
        if with_curve {
            exposure.transmission_curve = Some(TransmissionCurve {
                wavelengths: vec![7000.0, 8000.0],
                throughput: vec![0.5, 0.6],
            });
        }
        Artifact::Exposure(exposure)
    }

    #[test]
    fn test_bright_object_mask_counts_plane() {
        let key = patch_key();
        let mut store = MemoryStore::new();
        store.insert(
            &DatasetRef::new("deepCoadd", key.clone()),
            coadd(vec![0, 1 << 9, 1 << 9 | 1, 1], true),
        );
        let ctx = CheckContext::new(&store, &key);

        let mut reporter = Reporter::new();
        assert!(check_bright_object_mask(&ctx, &mut reporter, "deepCoadd").is_ok());
        assert_eq!(lines(&reporter), vec!["Pixels masked as BRIGHT_OBJECT (2 > 0): PASS"]);
    }

    #[test]
    fn test_bright_object_mask_absent_plane_fails() {
        let key = patch_key();
        let mut store = MemoryStore::new();
        store.insert(
            &DatasetRef::new("deepCoadd", key.clone()),
            Artifact::Exposure(Exposure::default()),
        );
        let ctx = CheckContext::new(&store, &key);

        let mut reporter = Reporter::new();
        let failure = check_bright_object_mask(&ctx, &mut reporter, "deepCoadd").unwrap_err();
        assert_eq!(failure.description, "Pixels masked as BRIGHT_OBJECT");
        assert!(failure.context.unwrap().contains("not defined"));
    }

    #[test]
    fn test_transmission_curve_required() {
        let key = patch_key();
        let mut store = MemoryStore::new();
        store.insert(&DatasetRef::new("deepCoadd", key.clone()), coadd(vec![0; 4], false));
        let ctx = CheckContext::new(&store, &key);

        let DerivedCheck::Store { check, .. } = transmission_curve("deepCoadd") else {
            panic!("transmission curve is a store check");
        };
        let mut reporter = Reporter::new();
        assert!((*check)(&ctx, &mut reporter).is_err());
        assert_eq!(lines(&reporter), vec!["Transmission curve is attached to deepCoadd: FAIL"]);
    }

    #[test]
    fn test_variance_scale() {
        let key = patch_key();
        let mut store = MemoryStore::new();
        let mut exposure = Exposure::default();
        exposure.metadata.set(VARIANCE_SCALE_KEY, 1.25);
        store.insert(
            &DatasetRef::new("deepCoadd_calexp", key.clone()),
            Artifact::Exposure(exposure),
        );
        let ctx = CheckContext::new(&store, &key);

        let mut reporter = Reporter::new();
        assert!(check_variance_scale(&ctx, &mut reporter, "deepCoadd_calexp").is_ok());
        assert_eq!(
            lines(&reporter),
            vec!["VARIANCE_SCALE of deepCoadd_calexp (1.25 > 0): PASS"]
        );
    }

    #[test]
    fn test_variance_scale_missing_fails() {
        let key = patch_key();
        let mut store = MemoryStore::new();
        store.insert(
            &DatasetRef::new("deepCoadd_calexp", key.clone()),
            Artifact::Exposure(Exposure::default()),
        );
        let ctx = CheckContext::new(&store, &key);

        let mut reporter = Reporter::new();
        let failure = check_variance_scale(&ctx, &mut reporter, "deepCoadd_calexp").unwrap_err();
        assert_eq!(failure.description, "VARIANCE_SCALE of deepCoadd_calexp");
    }

    #[test]
    fn test_package_manifest_stops_at_first_missing() {
        let key = ValidationKey::empty();
        let mut manifest = PackageManifest::default();
        for name in ["python", "numpy", "afw"] {
            manifest.packages.insert(name.to_string(), "1.0".to_string());
        }
        let mut store = MemoryStore::new();
        store.insert(
            &DatasetRef::new(PACKAGE_MANIFEST_DATASET, key.clone()),
            Artifact::Packages(manifest),
        );
        let ctx = CheckContext::new(&store, &key);

        let mut reporter = Reporter::new();
        let failure =
            check_package_manifest(&ctx, &mut reporter, PACKAGE_MANIFEST_DATASET, REQUIRED_PACKAGES)
                .unwrap_err();
        assert_eq!(failure.description, "Package astropy is present");
        assert_eq!(
            lines(&reporter),
            vec![
                "Package python is present: PASS",
                "Package numpy is present: PASS",
                "Package astropy is present: FAIL",
            ]
        );
    }

    #[test]
    fn test_package_manifest_wrong_kind() {
        let key = ValidationKey::empty();
        let mut store = MemoryStore::new();
        store.insert(
            &DatasetRef::new(PACKAGE_MANIFEST_DATASET, key.clone()),
            Artifact::Document { content: json!({"python": "3.11"}) },
        );
        let ctx = CheckContext::new(&store, &key);

        let mut reporter = Reporter::new();
        let failure =
            check_package_manifest(&ctx, &mut reporter, PACKAGE_MANIFEST_DATASET, &["python"])
                .unwrap_err();
        assert_eq!(failure.description, "packages is a package manifest (document)");
    }
}
