/*
Copyright 2024 The AERT Developers

This file is part of Anthropogenic Emissions Regridding Tool (AERT).

Anthropogenic Emissions Regridding Tool (AERT) is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

Anthropogenic Emissions Regridding Tool (AERT) is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with Anthropogenic Emissions Regridding Tool (AERT). If not, see https://www.gnu.org/licenses/.
*/

//! Species catalog: the single immutable lookup table
//! linking model tracers with inventory variables,
//! molecular weights, scale factors and derivation rules.
//!
//! The catalog is built once per run from the data source
//! and user overrides, and then passed by reference
//! to every other pipeline component.

use crate::errors::ConfigError;
use crate::Float;
use chrono::Datelike;
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;

/// Supported emission inventories.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
pub enum DataSource {
    #[serde(rename = "CAMS-GLOB-ANT")]
    CamsGlobAnt,
    #[serde(rename = "CEDS")]
    Ceds,
}

/// How CEDS files were obtained, which decides their layout on disk.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMethod {
    /// Gridded sectoral archive of the 2000-2019 release.
    Globus,
    /// Yearly files of the long historical record.
    Wget,
}

impl Default for DownloadMethod {
    fn default() -> Self {
        DownloadMethod::Globus
    }
}

/// How raw inventory data is laid out on disk.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum InputLayout {
    /// One CAMS file per species and year, with a `sum` variable
    /// and one variable per sector.
    CamsYearlyFiles,
    /// One multi-year CEDS file per species with a `sector` dimension.
    CedsArchive,
    /// Directory per year holding two CEDS files which together give
    /// the twelve months of that year, with a `sum` variable and
    /// one variable per sector named in full.
    CedsYearlyFiles,
}

impl InputLayout {
    pub fn new(source: DataSource, method: DownloadMethod) -> Self {
        match (source, method) {
            (DataSource::CamsGlobAnt, _) => InputLayout::CamsYearlyFiles,
            (DataSource::Ceds, DownloadMethod::Globus) => InputLayout::CedsArchive,
            (DataSource::Ceds, DownloadMethod::Wget) => InputLayout::CedsYearlyFiles,
        }
    }

    /// First year with published data.
    pub fn first_year(&self) -> i32 {
        match self {
            InputLayout::CamsYearlyFiles | InputLayout::CedsArchive => 2000,
            InputLayout::CedsYearlyFiles => 1950,
        }
    }

    /// Last year with published data.
    ///
    /// CEDS gridded files end with December 2019,
    /// CAMS is updated yearly so the previous year is the latest one.
    pub fn last_year(&self) -> i32 {
        match self {
            InputLayout::CamsYearlyFiles => chrono::Local::now().year() - 1,
            InputLayout::CedsArchive | InputLayout::CedsYearlyFiles => 2019,
        }
    }
}

/// Variable names of CEDS sectors in yearly files.
const CEDS_SECTOR_VARIABLES: [(&str, &str); 8] = [
    ("agr", "agriculture"),
    ("ene", "energy"),
    ("ind", "industrial"),
    ("tra", "transportation"),
    ("res", "residential"),
    ("sol", "solvents"),
    ("was", "waste"),
    ("shp", "ships"),
];

/// Full sector variable name used by CEDS yearly files.
pub fn ceds_sector_variable(sector: &str) -> Option<&'static str> {
    CEDS_SECTOR_VARIABLES
        .iter()
        .find(|(short, _)| *short == sector)
        .map(|(_, full)| *full)
}

/// Sectors of the sulfur inventory grouped by the emission
/// process categories used in model input files.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SulfurGroups {
    pub ag_sol_was: &'static [&'static str],
    pub res_tran: &'static [&'static str],
    pub ene_ind: &'static [&'static str],
    pub ship: &'static [&'static str],
}

impl DataSource {
    pub fn name(&self) -> &'static str {
        match self {
            DataSource::CamsGlobAnt => "CAMS-GLOB-ANT",
            DataSource::Ceds => "CEDS",
        }
    }

    pub fn versions(&self) -> &'static [&'static str] {
        match self {
            DataSource::CamsGlobAnt => &["v5.3", "v6.2"],
            DataSource::Ceds => &["v2021-04-21"],
        }
    }

    pub fn default_version(&self) -> &'static str {
        self.versions()[0]
    }

    /// Native resolution label of the inventory grid.
    pub fn native_resolution(&self) -> &'static str {
        match self {
            DataSource::CamsGlobAnt => "0.1x0.1",
            DataSource::Ceds => "0.5x0.5",
        }
    }

    /// Native grid spacing in degrees (equal in both directions).
    pub fn grid_spacing(&self) -> Float {
        match self {
            DataSource::CamsGlobAnt => 0.1,
            DataSource::Ceds => 0.5,
        }
    }

    /// Day of month at which monthly means are anchored.
    pub fn day_anchor(&self) -> u32 {
        match self {
            DataSource::CamsGlobAnt => 1,
            DataSource::Ceds => 16,
        }
    }

    /// Sector names in the order they are stored in inventory files.
    pub fn sectors(&self, version: &str) -> &'static [&'static str] {
        match self {
            DataSource::CamsGlobAnt if version == "v5.3" => &[
                "awb", "ene", "fef", "ind", "ref", "res", "shp", "swd", "tnr", "tro",
            ],
            DataSource::CamsGlobAnt => &[
                "awb", "com", "ene", "fef", "ind", "ref", "res", "shp", "tnr", "tro",
            ],
            DataSource::Ceds => &["agr", "ene", "ind", "tra", "res", "sol", "was", "shp"],
        }
    }

    pub fn sulfur_groups(&self, version: &str) -> SulfurGroups {
        match self {
            DataSource::CamsGlobAnt => SulfurGroups {
                ag_sol_was: if version == "v5.3" {
                    &["awb", "swd"]
                } else {
                    &["awb", "com"]
                },
                res_tran: &["res", "tro", "tnr"],
                ene_ind: &["ene", "ind", "ref", "fef"],
                ship: &["shp"],
            },
            DataSource::Ceds => SulfurGroups {
                ag_sol_was: &["agr", "sol", "was"],
                res_tran: &["res", "tra"],
                ene_ind: &["ene", "ind"],
                ship: &["shp"],
            },
        }
    }
}

/// Where a CEDS species is stored in the CEDS archive.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CedsFile {
    /// Bulk species with their own top-level directory.
    Bulk,
    /// Speciated VOC, stored under `VOC-speciated/{dir}`.
    Voc { dir: &'static str },
}

/// One species as reported by the inventories.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct InventorySpecies {
    /// Source-independent key, also used in intermediate file names.
    pub key: &'static str,
    pub cams_name: &'static str,
    pub ceds_name: &'static str,
    pub ceds_file: CedsFile,
    /// Molecular weight, only needed for composite sub-species.
    pub molecular_weight: Option<Float>,
}

impl InventorySpecies {
    /// Variable name of the species in the given inventory.
    pub fn source_name(&self, source: DataSource) -> &'static str {
        match source {
            DataSource::CamsGlobAnt => self.cams_name,
            DataSource::Ceds => self.ceds_name,
        }
    }
}

const fn bulk(key: &'static str, cams_name: &'static str, ceds_name: &'static str) -> InventorySpecies {
    InventorySpecies {
        key,
        cams_name,
        ceds_name,
        ceds_file: CedsFile::Bulk,
        molecular_weight: None,
    }
}

const fn voc(
    key: &'static str,
    cams_name: &'static str,
    ceds_name: &'static str,
    dir: &'static str,
    molecular_weight: Option<Float>,
) -> InventorySpecies {
    InventorySpecies {
        key,
        cams_name,
        ceds_name,
        ceds_file: CedsFile::Voc { dir },
        molecular_weight,
    }
}

static INVENTORY: [InventorySpecies; 27] = [
    bulk("bc", "bc", "BC"),
    bulk("co", "co", "CO"),
    bulk("nh3", "nh3", "NH3"),
    bulk("nox", "nox", "NOx"),
    bulk("oc", "oc", "OC"),
    bulk("so2", "so2", "SO2"),
    voc("alcohols", "alcohols", "VOC01-alcohols", "VOC01-alcohols", None),
    voc("ethane", "ethane", "VOC02-ethane", "VOC02-ethane", None),
    voc("propane", "propane", "VOC03-propane", "VOC03-propane", None),
    voc("butanes", "butanes", "VOC04-butanes", "VOC04-butanes", Some(58.0)),
    voc("pentanes", "pentanes", "VOC05-pentanes", "VOC05-pentanes", Some(72.0)),
    voc("hexanes", "hexanes", "VOC06-hexanes-pl", "VOC06-hexanes", Some(86.0)),
    voc("ethene", "ethene", "VOC07-ethene", "VOC07-ethene", None),
    voc("propene", "propene", "VOC08-propene", "VOC08-propene", None),
    voc("ethyne", "acetylene", "VOC09-ethyne", "VOC09-ethyne", None),
    voc(
        "other-alkenes-and-alkynes",
        "other-alkenes-and-alkynes",
        "VOC12-other-alke",
        "VOC12-other",
        None,
    ),
    voc("benzene", "benzene", "VOC13-benzene", "VOC13-benzene", None),
    voc("toluene", "toluene", "VOC14-toluene", "VOC14-toluene", None),
    voc("xylene", "xylene", "VOC15-xylene", "VOC15-xylene", Some(106.0)),
    voc(
        "trimethylbenzene",
        "trimethylbenzene",
        "VOC16-trimethylb",
        "VOC16-trimethylb",
        Some(120.0),
    ),
    voc(
        "other-aromatics",
        "other-aromatics",
        "VOC17-other-arom",
        "VOC17-other",
        Some(126.0),
    ),
    voc("esters", "esters", "VOC18-esters", "VOC18-esters", Some(184.0)),
    voc("ethers", "ethers", "VOC19-ethers", "VOC19-ethers", Some(81.0)),
    voc("methanal", "formaldehyde", "VOC21-methanal", "VOC21-methanal", None),
    voc(
        "other-aldehydes",
        "other-aldehydes",
        "VOC22-other-alka",
        "VOC22-other",
        None,
    ),
    voc("ketones", "total-ketones", "VOC23-ketones", "VOC23-ketones", None),
    voc("acids", "total-acids", "VOC24-acids", "VOC24-acids", None),
];

/// Looks up an inventory species by its key.
pub fn inventory_species(key: &str) -> Option<&'static InventorySpecies> {
    INVENTORY.iter().find(|s| s.key == key)
}

/// Children of a composite tracer.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CompositeParts {
    /// Inventory sub-species, read as regridded fields.
    Inventory(&'static [&'static str]),
    /// Other model tracers, read from their already written outputs.
    Tracers(&'static [&'static str]),
}

/// Rule by which a model tracer is computed.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum DerivationKind {
    /// Unit conversion of a single regridded inventory species.
    Plain { inventory: &'static str },

    /// Particle number flux derived from the parent's output.
    NumberTracer {
        parent: &'static str,
        density: Float,
        diameter: Float,
    },

    /// Minor species split off the parent's output
    /// with a fixed molar yield.
    MinorSplit { parent: &'static str, fraction: Float },

    /// Weighted sum of several species.
    Composite(CompositeParts),

    /// Sector-resolved sulfur handling.
    SulfurSectorSplit { inventory: &'static str },
}

impl DerivationKind {
    /// Inventory species read by the tracer and whether
    /// they are needed per sector.
    pub fn inventory_keys(&self) -> (&[&'static str], bool) {
        match self {
            DerivationKind::Plain { inventory } => (std::slice::from_ref(inventory), false),
            DerivationKind::SulfurSectorSplit { inventory } => {
                (std::slice::from_ref(inventory), true)
            }
            DerivationKind::Composite(CompositeParts::Inventory(parts)) => (*parts, false),
            _ => (&[], false),
        }
    }

    /// Tracers whose outputs are summed into this one.
    pub fn tracer_parts(&self) -> &'static [&'static str] {
        match self {
            DerivationKind::Composite(CompositeParts::Tracers(parts)) => *parts,
            _ => &[],
        }
    }
}

struct TracerEntry {
    name: &'static str,
    molecular_weight: Float,
    scale_factor: Float,
    kind: DerivationKind,
}

const fn plain(name: &'static str, inventory: &'static str, mw: Float, sf: Float) -> TracerEntry {
    TracerEntry {
        name,
        molecular_weight: mw,
        scale_factor: sf,
        kind: DerivationKind::Plain { inventory },
    }
}

const LUMPED_IVOC: &[&str] = &[
    "C3H6", "C3H8", "C2H6", "C2H4", "BIGENE", "BIGALK", "CH3COCH3", "MEK", "CH3CHO", "CH2O",
    "BENZENE", "TOLUENE", "XYLENES",
];

/// Requestable model tracers in their processing order.
/// Tracers composed from other tracers' outputs come last.
const TRACERS: [TracerEntry; 25] = [
    plain("bc_a4", "bc", 12.0, 1.0),
    plain("CO", "co", 28.0, 1.0),
    plain("NH3", "nh3", 17.0, 1.0),
    plain("NO", "nox", 30.0, 46.0 / 30.0),
    plain("pom_a4", "oc", 12.0, 1.4),
    TracerEntry {
        name: "SO2",
        molecular_weight: 64.0,
        scale_factor: 1.0,
        kind: DerivationKind::SulfurSectorSplit { inventory: "so2" },
    },
    plain("C2H6", "ethane", 30.0, 1.0),
    plain("C3H8", "propane", 44.0, 1.0),
    plain("C2H4", "ethene", 28.0, 1.0),
    plain("C3H6", "propene", 42.0, 1.0),
    plain("C2H2", "ethyne", 26.0, 1.0),
    plain("BIGENE", "other-alkenes-and-alkynes", 56.0, 1.0),
    plain("BENZENE", "benzene", 78.0, 1.0),
    plain("TOLUENE", "toluene", 92.0, 1.0),
    plain("CH2O", "methanal", 30.0, 1.0),
    plain("CH3CHO", "other-aldehydes", 44.0, 1.0),
    TracerEntry {
        name: "BIGALK",
        molecular_weight: 72.0,
        scale_factor: 1.0,
        kind: DerivationKind::Composite(CompositeParts::Inventory(&[
            "butanes", "pentanes", "hexanes", "esters", "ethers",
        ])),
    },
    TracerEntry {
        name: "XYLENES",
        molecular_weight: 106.0,
        scale_factor: 1.0,
        kind: DerivationKind::Composite(CompositeParts::Inventory(&[
            "xylene",
            "trimethylbenzene",
            "other-aromatics",
        ])),
    },
    plain("CH3OH", "alcohols", 32.0, 0.15),
    plain("C2H5OH", "alcohols", 46.0, 0.85),
    plain("CH3COCH3", "ketones", 58.0, 0.2),
    plain("MEK", "ketones", 72.0, 0.8),
    plain("HCOOH", "acids", 46.0, 0.5),
    plain("CH3COOH", "acids", 60.0, 0.5),
    TracerEntry {
        name: "IVOC",
        molecular_weight: 184.0,
        scale_factor: 0.2,
        kind: DerivationKind::Composite(CompositeParts::Tracers(LUMPED_IVOC)),
    },
];

/// Tracers that are never requested directly,
/// but fan out from their parent's output.
const DERIVED: [TracerEntry; 5] = [
    TracerEntry {
        name: "num_bc_a4",
        molecular_weight: 12.0,
        scale_factor: 1.0,
        kind: DerivationKind::NumberTracer {
            parent: "bc_a4",
            density: 1700.0,
            diameter: 0.134e-6,
        },
    },
    TracerEntry {
        name: "num_pom_a4",
        molecular_weight: 12.0,
        scale_factor: 1.0,
        kind: DerivationKind::NumberTracer {
            parent: "pom_a4",
            density: 1000.0,
            diameter: 0.134e-6,
        },
    },
    TracerEntry {
        name: "HCN",
        molecular_weight: 27.0,
        scale_factor: 1.0,
        kind: DerivationKind::MinorSplit {
            parent: "CO",
            fraction: 0.003,
        },
    },
    TracerEntry {
        name: "CH3CN",
        molecular_weight: 41.0,
        scale_factor: 1.0,
        kind: DerivationKind::MinorSplit {
            parent: "CO",
            fraction: 0.002,
        },
    },
    TracerEntry {
        name: "SVOC",
        molecular_weight: 310.0,
        scale_factor: 1.0,
        kind: DerivationKind::MinorSplit {
            parent: "pom_a4",
            fraction: 0.6,
        },
    },
];

/// Child of a composite tracer with the weight used
/// when its contribution is added to the parent.
#[derive(Clone, PartialEq, Debug)]
pub struct ChildSpec {
    /// Inventory key or model tracer name.
    pub name: String,
    pub molecular_weight: Float,
}

/// Fully resolved description of one model tracer.
#[derive(Clone, PartialEq, Debug)]
pub struct SpeciesSpec {
    pub model_name: String,
    /// Inventory variable names the tracer is read from
    /// (empty for tracers derived from other outputs).
    pub inventory_names: Vec<String>,
    pub molecular_weight: Float,
    pub scale_factor: Float,
    pub kind: DerivationKind,
    pub children: Vec<ChildSpec>,
}

/// Inventory species to aggregate and regrid before transformation.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct InventoryInput {
    pub species: &'static InventorySpecies,
    /// Sulfur needs sector-resolved regridded fields.
    pub sector_resolved: bool,
}

/// Result of resolving the requested tracer list.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Resolution {
    /// Requested tracers in processing order.
    pub tracers: Vec<String>,
    /// Prerequisites of lumped composites that were not requested,
    /// as `(composite, missing children)`.
    pub missing_prerequisites: Vec<(String, Vec<String>)>,
}

/// Immutable catalog of all tracers for one data source.
#[derive(Clone, Debug)]
pub struct SpeciesCatalog {
    pub source: DataSource,
    pub version: String,
    specs: FxHashMap<String, SpeciesSpec>,
    order: Vec<String>,
    derived: Vec<String>,
}

impl SpeciesCatalog {
    /// Builds the catalog applying user overrides of
    /// molecular weights and scale factors.
    ///
    /// Override keys must name a model tracer or, for molecular
    /// weights, a composite sub-species.
    pub fn new(
        source: DataSource,
        version: &str,
        mw_overrides: &FxHashMap<String, Float>,
        sf_overrides: &FxHashMap<String, Float>,
    ) -> Result<Self, ConfigError> {
        let known_mw: FxHashSet<&str> = TRACERS
            .iter()
            .chain(DERIVED.iter())
            .map(|t| t.name)
            .chain(
                INVENTORY
                    .iter()
                    .filter(|s| s.molecular_weight.is_some())
                    .map(|s| s.key),
            )
            .collect();
        let known_sf: FxHashSet<&str> = TRACERS.iter().map(|t| t.name).collect();

        check_override_keys("molecular_weights", mw_overrides, &known_mw)?;
        check_override_keys("scale_factors", sf_overrides, &known_sf)?;

        let tracer_mw = |name: &str, default: Float| -> Float {
            mw_overrides.get(name).copied().unwrap_or(default)
        };

        let mut specs = FxHashMap::default();

        for entry in TRACERS.iter().chain(DERIVED.iter()) {
            let inventory_names = match entry.kind {
                DerivationKind::Plain { inventory }
                | DerivationKind::SulfurSectorSplit { inventory } => {
                    vec![lookup_inventory(inventory)?.source_name(source).to_string()]
                }
                DerivationKind::Composite(CompositeParts::Inventory(parts)) => parts
                    .iter()
                    .map(|p| Ok(lookup_inventory(p)?.source_name(source).to_string()))
                    .collect::<Result<Vec<String>, ConfigError>>()?,
                _ => vec![],
            };

            let children = match entry.kind {
                DerivationKind::Composite(CompositeParts::Inventory(parts)) => parts
                    .iter()
                    .map(|p| {
                        let default = lookup_inventory(p)?
                            .molecular_weight
                            .unwrap_or(entry.molecular_weight);
                        Ok(ChildSpec {
                            name: (*p).to_string(),
                            molecular_weight: tracer_mw(*p, default),
                        })
                    })
                    .collect::<Result<Vec<ChildSpec>, ConfigError>>()?,
                DerivationKind::Composite(CompositeParts::Tracers(parts)) => parts
                    .iter()
                    .map(|p| {
                        let default = TRACERS
                            .iter()
                            .find(|t| t.name == *p)
                            .map_or(entry.molecular_weight, |t| t.molecular_weight);
                        ChildSpec {
                            name: (*p).to_string(),
                            molecular_weight: tracer_mw(*p, default),
                        }
                    })
                    .collect(),
                _ => vec![],
            };

            let spec = SpeciesSpec {
                model_name: entry.name.to_string(),
                inventory_names,
                molecular_weight: tracer_mw(entry.name, entry.molecular_weight),
                scale_factor: sf_overrides
                    .get(entry.name)
                    .copied()
                    .unwrap_or(entry.scale_factor),
                kind: entry.kind,
                children,
            };

            specs.insert(entry.name.to_string(), spec);
        }

        Ok(SpeciesCatalog {
            source,
            version: version.to_string(),
            specs,
            order: TRACERS.iter().map(|t| t.name.to_string()).collect(),
            derived: DERIVED.iter().map(|t| t.name.to_string()).collect(),
        })
    }

    pub fn spec(&self, name: &str) -> Option<&SpeciesSpec> {
        self.specs.get(name)
    }

    /// All requestable tracer names in processing order.
    pub fn all_tracers(&self) -> &[String] {
        &self.order
    }

    /// Tracers that fan out from the output of `parent`.
    pub fn derived_from<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a SpeciesSpec> + 'a {
        self.derived
            .iter()
            .filter_map(move |name| self.specs.get(name))
            .filter(move |spec| match spec.kind {
                DerivationKind::NumberTracer { parent: p, .. }
                | DerivationKind::MinorSplit { parent: p, .. } => p == parent,
                _ => false,
            })
    }

    /// Validates the requested tracers (all of them when `None`)
    /// and orders them so that every lumped composite is
    /// processed after its children.
    ///
    /// Unknown names are fatal. Lumped composites with missing
    /// children are only reported, their computation proceeds
    /// without the missing contributions.
    pub fn resolve(&self, requested: Option<&[String]>) -> Result<Resolution, ConfigError> {
        let requested: Vec<String> = match requested {
            Some(list) => list.to_vec(),
            None => self.order.clone(),
        };

        let unknown: Vec<String> = requested
            .iter()
            .filter(|name| !self.order.contains(name))
            .cloned()
            .collect();

        if !unknown.is_empty() {
            return Err(ConfigError::UnknownSpecies(unknown));
        }

        let requested_set: FxHashSet<&str> = requested.iter().map(String::as_str).collect();

        let (lumped, simple): (Vec<&String>, Vec<&String>) = self
            .order
            .iter()
            .filter(|name| requested_set.contains(name.as_str()))
            .partition(|name| self.is_lumped(name));

        let mut missing_prerequisites = vec![];

        for name in &lumped {
            let missing: Vec<String> = self.specs[name.as_str()]
                .children
                .iter()
                .filter(|child| !requested_set.contains(child.name.as_str()))
                .map(|child| child.name.clone())
                .collect();

            if !missing.is_empty() {
                warn!(
                    "{} is requested but its prerequisites {:?} are not, they will not contribute to it",
                    name, missing
                );
                missing_prerequisites.push(((*name).clone(), missing));
            }
        }

        let tracers = simple.into_iter().chain(lumped).cloned().collect();

        Ok(Resolution {
            tracers,
            missing_prerequisites,
        })
    }

    /// Unique inventory species needed to compute the given tracers.
    pub fn inventory_inputs(&self, tracers: &[String]) -> Result<Vec<InventoryInput>, ConfigError> {
        let mut inputs: Vec<InventoryInput> = vec![];

        for name in tracers {
            let (keys, sector_resolved) = match self.specs.get(name) {
                Some(spec) => spec.kind.inventory_keys(),
                None => continue,
            };

            for key in keys {
                if !inputs.iter().any(|i| i.species.key == *key) {
                    inputs.push(InventoryInput {
                        species: lookup_inventory(key)?,
                        sector_resolved,
                    });
                }
            }
        }

        Ok(inputs)
    }

    fn is_lumped(&self, name: &str) -> bool {
        matches!(
            self.specs.get(name).map(|s| s.kind),
            Some(DerivationKind::Composite(CompositeParts::Tracers(_)))
        )
    }
}

fn lookup_inventory(key: &str) -> Result<&'static InventorySpecies, ConfigError> {
    inventory_species(key).ok_or_else(|| ConfigError::UnknownSpecies(vec![key.to_string()]))
}

fn check_override_keys(
    table: &'static str,
    overrides: &FxHashMap<String, Float>,
    known: &FxHashSet<&str>,
) -> Result<(), ConfigError> {
    let mut unknown: Vec<String> = overrides
        .keys()
        .filter(|k| !known.contains(k.as_str()))
        .cloned()
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        unknown.sort();
        Err(ConfigError::UnknownOverride(table, unknown))
    }
}
