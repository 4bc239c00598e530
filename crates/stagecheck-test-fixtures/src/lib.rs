//! Test fixtures for stagecheck
//!
//! Stages small but complete repositories on disk, laid out the way
//! `FileStore` reads them. Every fixture passes its variant's checks as
//! written; tests then remove or corrupt single datasets to provoke
//! failures.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

use stagecheck_core::{FileStore, StoreLocation, ValidationKey};

/// Rows in every staged source catalog.
pub const SOURCE_COUNT: usize = 150;
/// Rows in every staged match catalog.
pub const MATCH_COUNT: usize = 20;
/// First reference id used by staged matches.
pub const FIRST_REF_ID: i64 = 5000;

pub const PACKAGES: &[(&str, &str)] = &[
    ("python", "3.11.7"),
    ("numpy", "1.26.4"),
    ("astropy", "6.0.0"),
    ("afw", "g1a2b3c4d5"),
    ("daf_butler", "g2b3c4d5e6"),
    ("meas_algorithms", "g3c4d5e6f7"),
    ("pipe_tasks", "g4d5e6f7a8"),
    ("obs_subaru", "g5e6f7a8b9"),
    ("ci_hsc", "g6f7a8b9c0"),
];

const SFM_FILES: &[&str] = &[
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

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Test fixture categories, one per pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureType {
    Raw,
    Detrend,
    Sfm,
    Skymap,
    Warp,
    Coadd,
    Detection,
    MergeDetections,
    Measure,
    MergeMeasurements,
    ForcedPhotCoadd,
    ForcedPhotCcd,
    Version,
}

impl FixtureType {
    pub const ALL: &'static [FixtureType] = &[
        FixtureType::Raw,
        FixtureType::Detrend,
        FixtureType::Sfm,
        FixtureType::Skymap,
        FixtureType::Warp,
        FixtureType::Coadd,
        FixtureType::Detection,
        FixtureType::MergeDetections,
        FixtureType::Measure,
        FixtureType::MergeMeasurements,
        FixtureType::ForcedPhotCoadd,
        FixtureType::ForcedPhotCcd,
        FixtureType::Version,
    ];

    /// Registered variant this fixture satisfies.
    pub fn variant(self) -> &'static str {
        match self {
            FixtureType::Raw => "RawValidation",
            FixtureType::Detrend => "DetrendValidation",
            FixtureType::Sfm => "SfmValidation",
            FixtureType::Skymap => "SkymapValidation",
            FixtureType::Warp => "WarpValidation",
            FixtureType::Coadd => "CoaddValidation",
            FixtureType::Detection => "DetectionValidation",
            FixtureType::MergeDetections => "MergeDetectionsValidation",
            FixtureType::Measure => "MeasureValidation",
            FixtureType::MergeMeasurements => "MergeMeasurementsValidation",
            FixtureType::ForcedPhotCoadd => "ForcedPhotCoaddValidation",
            FixtureType::ForcedPhotCcd => "ForcedPhotCcdValidation",
            FixtureType::Version => "VersionValidation",
        }
    }

    /// Key the fixture is normally staged for.
    pub fn default_key(self) -> ValidationKey {
        match self {
            FixtureType::Raw | FixtureType::Sfm | FixtureType::ForcedPhotCcd => ccd_key(),
            FixtureType::Detrend => ValidationKey::builder()
                .coord("detector", 16)
                .coord("band", "i")
                .build(),
            FixtureType::Skymap | FixtureType::Version => ValidationKey::empty(),
            _ => patch_key(),
        }
    }
}

/// `{visit: 903334, detector: 16}`
pub fn ccd_key() -> ValidationKey {
    ValidationKey::builder()
        .coord("visit", 903334)
        .coord("detector", 16)
        .build()
}

/// `{tract: 0, patch: 69, band: "i"}`
pub fn patch_key() -> ValidationKey {
    ValidationKey::builder()
        .coord("tract", 0)
        .coord("patch", 69)
        .coord("band", "i")
        .build()
}

/// Main test fixtures provider
pub struct TestFixtures {
    temp_dir: tempfile::TempDir,
}

impl Default for TestFixtures {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixtures {
    pub fn new() -> Self {
        Self {
            temp_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn location(&self) -> StoreLocation {
        StoreLocation::new(self.root())
    }

    /// Stage everything `fixture_type`'s variant checks for `key`.
    pub fn setup(&self, fixture_type: FixtureType, key: &ValidationKey) -> &Self {
        match fixture_type {
            FixtureType::Raw => self.setup_raw(key),
            FixtureType::Detrend => self.setup_detrend(key),
            FixtureType::Sfm => self.setup_sfm(key),
            FixtureType::Skymap => self.setup_skymap(key),
            FixtureType::Warp => self.setup_warp(key),
            FixtureType::Coadd => self.setup_coadd(key),
            FixtureType::Detection => self.setup_detection(key),
            FixtureType::MergeDetections => {
                self.setup_coadd_catalog_stage(key, "mergeCoaddDetections", "mergeDet")
            }
            FixtureType::Measure => self.setup_measure(key),
            FixtureType::MergeMeasurements => {
                self.setup_coadd_catalog_stage(key, "mergeCoaddMeasurements", "ref")
            }
            FixtureType::ForcedPhotCoadd => {
                self.setup_coadd_catalog_stage(key, "forcedPhotCoadd", "forced_src")
            }
            FixtureType::ForcedPhotCcd => self.setup_forced_phot_ccd(key),
            FixtureType::Version => self.setup_version(key),
        }
        self
    }

    /// Stage a fixture for its default key.
    pub fn setup_default(&self, fixture_type: FixtureType) -> &Self {
        self.setup(fixture_type, &fixture_type.default_key())
    }

    pub fn dataset_path(
        &self,
        dataset_type: &str,
        key: &ValidationKey,
        extension: &str,
    ) -> PathBuf {
        self.root()
            .join(dataset_type)
            .join(format!("{}.{}", FileStore::stem(key), extension))
    }

    /// Write a JSON document for one dataset, replacing whatever was there.
    pub fn write_dataset(
        &self,
        dataset_type: &str,
        key: &ValidationKey,
        document: &Value,
    ) -> PathBuf {
        self.remove_dataset(dataset_type, key);
        let path = self.dataset_path(dataset_type, key, "json");
        write(&path, serde_json::to_string_pretty(document).unwrap().as_bytes());
        path
    }

    /// Write a dataset as YAML instead of JSON.
    pub fn write_yaml_dataset(
        &self,
        dataset_type: &str,
        key: &ValidationKey,
        document: &Value,
    ) -> PathBuf {
        self.remove_dataset(dataset_type, key);
        let path = self.dataset_path(dataset_type, key, "yaml");
        write(&path, serde_yaml::to_string(document).unwrap().as_bytes());
        path
    }

    /// Write an opaque file dataset such as a plot.
    pub fn write_file(
        &self,
        dataset_type: &str,
        key: &ValidationKey,
        extension: &str,
        content: &[u8],
    ) -> PathBuf {
        let path = self.dataset_path(dataset_type, key, extension);
        write(&path, content);
        path
    }

    /// Replace a dataset with a document that does not parse.
    pub fn corrupt_dataset(&self, dataset_type: &str, key: &ValidationKey) -> PathBuf {
        self.remove_dataset(dataset_type, key);
        let path = self.dataset_path(dataset_type, key, "json");
        write(&path, b"{\"kind\": \"property_set\", \"values\": ");
        path
    }

    /// Delete every persisted form of a dataset.
    pub fn remove_dataset(&self, dataset_type: &str, key: &ValidationKey) {
        for extension in ["json", "yaml", "yml", "png"] {
            let path = self.dataset_path(dataset_type, key, extension);
            if path.exists() {
                fs::remove_file(&path).unwrap();
            }
        }
    }

    /// Write `registry.yaml` declaring dimensions per dataset type.
    pub fn write_registry(&self, dataset_types: &[(&str, &[&str])]) -> PathBuf {
        let types: serde_json::Map<String, Value> = dataset_types
            .iter()
            .map(|(name, dims)| (name.to_string(), json!(dims)))
            .collect();
        let path = self.root().join("registry.yaml");
        let yaml = serde_yaml::to_string(&json!({ "dataset_types": types })).unwrap();
        write(&path, yaml.as_bytes());
        path
    }

    /// Write a reference catalog resolving every staged match, outside the
    /// repository root.
    pub fn write_reference_catalog(&self, name: &str) -> PathBuf {
        let ids: Vec<i64> = (0..MATCH_COUNT as i64).map(|i| FIRST_REF_ID + i).collect();
        self.write_reference_catalog_with_ids(name, &ids)
    }

    pub fn write_reference_catalog_with_ids(&self, name: &str, ids: &[i64]) -> PathBuf {
        let records: Vec<Value> = ids
            .iter()
            .map(|id| json!({"id": id, "coord_ra": 0.5, "coord_dec": -0.1}))
            .collect();
        let path = self.root().join("refcats").join(format!("{}.json", name));
        let document = catalog(&["id", "coord_ra", "coord_dec"], records);
        write(&path, serde_json::to_string_pretty(&document).unwrap().as_bytes());
        path
    }

    fn setup_task_outputs(&self, key: &ValidationKey, task: &str) {
        self.write_dataset(&format!("{}_config", task), key, &config(task));
        self.write_dataset(&format!("{}_metadata", task), key, &task_metadata(task));
    }

    fn setup_raw(&self, key: &ValidationKey) {
        self.write_dataset("raw", key, &exposure());
    }

    fn setup_detrend(&self, key: &ValidationKey) {
        for calib in ["bias", "dark", "flat"] {
            self.write_dataset(calib, key, &exposure());
        }
    }

    fn setup_sfm(&self, key: &ValidationKey) {
        self.setup_task_outputs(key, "processCcd");
        self.write_dataset("calexp", key, &exposure());
        self.write_dataset(
            "calexpBackground",
            key,
            &json!({"kind": "document", "content": {"bins": [64, 64]}}),
        );
        self.write_dataset("icSrc", key, &source_catalog(SOURCE_COUNT));
        self.write_dataset("icSrc_schema", key, &source_catalog(0));
        self.write_dataset("src_schema", key, &source_catalog(0));
        for file in SFM_FILES {
            self.write_file(file, key, "png", PNG_MAGIC);
        }
        self.write_dataset("src", key, &source_catalog(SOURCE_COUNT));
        self.write_dataset("srcMatch", key, &match_catalog(MATCH_COUNT));
        self.write_dataset("srcMatchFull", key, &match_catalog(MATCH_COUNT));
    }

    fn setup_skymap(&self, key: &ValidationKey) {
        self.write_dataset(
            "deepCoadd_skyMap",
            key,
            &json!({"kind": "document", "content": {"name": "rings", "numTracts": 1}}),
        );
    }

    fn setup_warp(&self, key: &ValidationKey) {
        self.write_dataset("deepCoadd_directWarp", key, &exposure());
        self.setup_task_outputs(key, "deep_makeCoaddTempExp");
    }

    fn setup_coadd(&self, key: &ValidationKey) {
        self.write_dataset("deepCoadd", key, &coadd_exposure());
        self.setup_task_outputs(key, "deep_assembleCoadd");
    }

    fn setup_detection(&self, key: &ValidationKey) {
        let mut calexp = coadd_exposure();
        calexp["metadata"]["values"]["VARIANCE_SCALE"] = json!(1.08);
        self.write_dataset("deepCoadd_calexp", key, &calexp);
        self.write_dataset("deepCoadd_det_schema", key, &source_catalog(0));
        self.setup_task_outputs(key, "detectCoaddSources");
        self.write_dataset("deepCoadd_det", key, &source_catalog(SOURCE_COUNT));
    }

    /// Config, metadata, `deepCoadd_<product>_schema` and
    /// `deepCoadd_<product>` for a coadd catalog stage.
    fn setup_coadd_catalog_stage(&self, key: &ValidationKey, task: &str, product: &str) {
        self.setup_task_outputs(key, task);
        self.write_dataset(&format!("deepCoadd_{}_schema", product), key, &source_catalog(0));
        self.write_dataset(
            &format!("deepCoadd_{}", product),
            key,
            &source_catalog(SOURCE_COUNT),
        );
    }

    fn setup_measure(&self, key: &ValidationKey) {
        self.setup_coadd_catalog_stage(key, "measureCoaddSources", "meas");
        self.write_dataset("deepCoadd_measMatch", key, &match_catalog(MATCH_COUNT));
        self.write_dataset("deepCoadd_measMatchFull", key, &match_catalog(MATCH_COUNT));
    }

    fn setup_forced_phot_ccd(&self, key: &ValidationKey) {
        self.write_dataset("forced_src_schema", key, &source_catalog(0));
        self.setup_task_outputs(key, "forcedPhotCcd");
        self.write_dataset("forced_src", key, &source_catalog(SOURCE_COUNT));
    }

    fn setup_version(&self, key: &ValidationKey) {
        self.write_dataset("packages", key, &packages(PACKAGES));
    }
}

fn write(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Columns of every staged source catalog.
pub const SOURCE_SCHEMA: &[&str] = &[
    "id",
    "parent",
    "coord_ra",
    "coord_dec",
    "calib_psf_used",
    "base_ClassificationExtendedness_value",
    "base_PsfFlux_apCorr",
    "base_PsfFlux_apCorrErr",
    "base_PsfFlux_flag_apCorr",
    "base_GaussianFlux_apCorr",
    "base_GaussianFlux_apCorrErr",
    "base_GaussianFlux_flag_apCorr",
    "merge_footprint_i",
    "merge_footprint_r",
];

pub fn catalog(schema: &[&str], records: Vec<Value>) -> Value {
    json!({"kind": "catalog", "schema": schema, "records": records})
}

/// A catalog of `n` sources with aperture corrections, point-like PSF
/// stars, and deblended children that inherit their parent's merge flags.
pub fn source_catalog(n: usize) -> Value {
    let parents = n.div_ceil(2);
    let records = (1..=n as i64)
        .map(|id| {
            let parent = if id as usize > parents { id - parents as i64 } else { 0 };
            let family = if parent == 0 { id } else { parent };
            json!({
                "id": id,
                "parent": parent,
                "coord_ra": 0.5 + id as f64 * 1e-5,
                "coord_dec": -0.1 - id as f64 * 1e-5,
                "calib_psf_used": id % 3 == 0,
                "base_ClassificationExtendedness_value": 0.0,
                "base_PsfFlux_apCorr": 1.01,
                "base_PsfFlux_apCorrErr": 0.002,
                "base_PsfFlux_flag_apCorr": false,
                "base_GaussianFlux_apCorr": 0.99,
                "base_GaussianFlux_apCorrErr": 0.003,
                "base_GaussianFlux_flag_apCorr": false,
                "merge_footprint_i": true,
                "merge_footprint_r": family % 2 == 0,
            })
        })
        .collect();
    catalog(SOURCE_SCHEMA, records)
}

/// A denormalised match catalog whose reference ids start at
/// [`FIRST_REF_ID`].
pub fn match_catalog(n: usize) -> Value {
    let records = (0..n as i64)
        .map(|i| json!({"src_id": i + 1, "ref_id": FIRST_REF_ID + i, "distance": 0.05}))
        .collect();
    catalog(&["src_id", "ref_id", "distance"], records)
}

/// A 4x4 exposure with no mask bits set.
pub fn exposure() -> Value {
    json!({
        "kind": "exposure",
        "width": 4,
        "height": 4,
        "mask_planes": {"BAD": 0, "SAT": 1, "DETECTED": 5},
        "mask": vec![0; 16],
        "metadata": {"values": {"FILTER": "HSC-I"}},
    })
}

/// A coadd with `BRIGHT_OBJECT` pixels and a transmission curve.
pub fn coadd_exposure() -> Value {
    let mut mask = vec![0u32; 16];
    mask[5] = 1 << 9;
    mask[6] = 1 << 9 | 1 << 5;
    json!({
        "kind": "exposure",
        "width": 4,
        "height": 4,
        "mask_planes": {"BAD": 0, "DETECTED": 5, "BRIGHT_OBJECT": 9},
        "mask": mask,
        "transmission_curve": {
            "wavelengths": [6800.0, 7600.0, 8400.0],
            "throughput": [0.2, 0.9, 0.3],
        },
        "metadata": {"values": {"FILTER": "HSC-I"}},
    })
}

pub fn config(task: &str) -> Value {
    json!({"kind": "document", "content": {"task": task, "doWrite": true}})
}

pub fn task_metadata(task: &str) -> Value {
    json!({
        "kind": "property_set",
        "values": {(format!("{}.runStartUtc", task)): "2024-01-01T00:00:00"},
    })
}

pub fn packages(entries: &[(&str, &str)]) -> Value {
    let packages: serde_json::Map<String, Value> = entries
        .iter()
        .map(|(name, version)| (name.to_string(), json!(version)))
        .collect();
    json!({"kind": "packages", "packages": packages})
}
