//! Built-in validator specs, one per pipeline stage

use crate::checks;
use crate::spec::ValidatorSpec;

pub const SFM_PSF_STAR_FRACTION: f64 = 0.95;
pub const MEASURE_PSF_STAR_FRACTION: f64 = 0.90;

/// Products of the single-frame measurement stage that are plots or
/// thumbnails; only their presence on disk is checked.
pub const SFM_FILES: &[&str] = &[
    "ossThumb",
    "flattenedThumb",
    "plotMagHist",
    "plotSeeingRough",
    "plotSeeingRobust",
    "plotSeeingMap",
    "plotEllipseMap",
    "plotEllipticityMap",
    "plotFwhmGrid",
    "plotEllipseGrid",
    "plotEllipticityGrid",
];

/// Config and metadata sidecars every pipeline task writes.
fn task_outputs(task: &str) -> [String; 2] {
    [format!("{}_config", task), format!("{}_metadata", task)]
}

/// A coadd stage writing `deepCoadd_<product>` sources plus a schema.
fn coadd_catalog_stage(name: &str, description: &str, task: &str, product: &str) -> ValidatorSpec {
    ValidatorSpec::new(name, description)
        .datasets(task_outputs(task))
        .datasets([format!("deepCoadd_{}_schema", product)])
        .source(format!("deepCoadd_{}", product))
}

pub fn raw() -> ValidatorSpec {
    ValidatorSpec::new("RawValidation", "Raw exposures were ingested").datasets(["raw"])
}

pub fn detrend() -> ValidatorSpec {
    ValidatorSpec::new("DetrendValidation", "Master calibrations are available")
        .datasets(["bias", "dark", "flat"])
}

pub fn sfm() -> ValidatorSpec {
    ValidatorSpec::new("SfmValidation", "Single-frame processing of one CCD")
        .datasets(task_outputs("processCcd"))
        .datasets(["calexp", "calexpBackground", "icSrc", "icSrc_schema", "src_schema"])
        .files(SFM_FILES.iter().copied())
        .source("src")
        .matches("srcMatch")
        .full_matches("srcMatchFull")
        .derive(checks::aperture_corrections())
        .derive(checks::psf_star_fraction(SFM_PSF_STAR_FRACTION))
}

pub fn skymap() -> ValidatorSpec {
    ValidatorSpec::new("SkymapValidation", "Sky map for coaddition").datasets(["deepCoadd_skyMap"])
}

pub fn warp() -> ValidatorSpec {
    ValidatorSpec::new("WarpValidation", "Warped exposures for one patch")
        .datasets(["deepCoadd_directWarp"])
        .datasets(task_outputs("deep_makeCoaddTempExp"))
}

pub fn coadd() -> ValidatorSpec {
    ValidatorSpec::new("CoaddValidation", "Assembled coadd for one patch and band")
        .datasets(["deepCoadd"])
        .datasets(task_outputs("deep_assembleCoadd"))
        .derive(checks::bright_object_mask("deepCoadd"))
        .derive(checks::transmission_curve("deepCoadd"))
}

pub fn detection() -> ValidatorSpec {
    ValidatorSpec::new("DetectionValidation", "Source detection on a coadd")
        .datasets(["deepCoadd_calexp", "deepCoadd_det_schema"])
        .datasets(task_outputs("detectCoaddSources"))
        .source("deepCoadd_det")
        .derive(checks::variance_scale("deepCoadd_calexp"))
}

pub fn merge_detections() -> ValidatorSpec {
    coadd_catalog_stage(
        "MergeDetectionsValidation",
        "Detections merged across bands",
        "mergeCoaddDetections",
        "mergeDet",
    )
}

pub fn measure() -> ValidatorSpec {
    coadd_catalog_stage(
        "MeasureValidation",
        "Measurement of merged detections on a coadd",
        "measureCoaddSources",
        "meas",
    )
    .matches("deepCoadd_measMatch")
    .full_matches("deepCoadd_measMatchFull")
    .derive(checks::psf_star_fraction(MEASURE_PSF_STAR_FRACTION))
    .derive(checks::merge_footprint_consistency())
}

pub fn merge_measurements() -> ValidatorSpec {
    coadd_catalog_stage(
        "MergeMeasurementsValidation",
        "Reference measurements merged across bands",
        "mergeCoaddMeasurements",
        "ref",
    )
}

pub fn forced_phot_coadd() -> ValidatorSpec {
    coadd_catalog_stage(
        "ForcedPhotCoaddValidation",
        "Forced photometry on a coadd",
        "forcedPhotCoadd",
        "forced_src",
    )
}

pub fn forced_phot_ccd() -> ValidatorSpec {
    ValidatorSpec::new("ForcedPhotCcdValidation", "Forced photometry on one CCD")
        .datasets(["forced_src_schema"])
        .datasets(task_outputs("forcedPhotCcd"))
        .source("forced_src")
}

pub fn version() -> ValidatorSpec {
    ValidatorSpec::new("VersionValidation", "Software versions recorded for the repository")
        .derive(checks::package_manifest(
            checks::PACKAGE_MANIFEST_DATASET,
            checks::REQUIRED_PACKAGES,
        ))
}
