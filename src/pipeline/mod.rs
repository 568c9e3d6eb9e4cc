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

//! Module containing the processing pipeline.
//!
//! The run has two stages. First, every inventory species needed
//! by the requested tracers is summed over sectors ([`aggregator`]),
//! regridded to the model grid ([`regrid`]) and written as an
//! intermediate file. Then each tracer is computed from those
//! files ([`transform`]) and written in the model-ready layout.
//!
//! Species are independent units: a unit that fails is reported
//! and the run continues with the remaining ones. Tracers depending
//! on a failed unit fail too, intermediate files left by earlier runs
//! are never read in place of a failed one. Only configuration
//! errors and problems with regridder weights abort the whole run,
//! always before any inventory data is read.
//!
//! Lumped composites read outputs of other tracers, so they
//! are always transformed last.

pub mod aggregator;
pub mod catalog;
mod configuration;
pub mod field;
pub mod grid;
pub mod naming;
pub mod record;
pub mod regrid;
pub mod storage;
pub mod transform;

#[cfg(test)]
mod super_tests;

use self::aggregator::{native_chunks, Selection};
use self::catalog::{InventoryInput, Resolution, SpeciesCatalog};
use self::configuration::Config;
use self::field::GriddedField;
use self::grid::GridDescriptor;
use self::naming::FileNaming;
use self::record::{CompletedUnit, CompletionRecord, Stage};
use self::regrid::{ConservativeWeights, Regridder};
use self::storage::Storage;
use self::transform::schema::{title, OutputSchema, MAIN_VARIABLE};
use self::transform::Transformer;
use crate::{
    errors::{PipelineError, SpeciesError},
    ALLOCATOR,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use rustc_hash::FxHashSet;
use std::{fs, path::Path};

/// Main pipeline function, responsible for all processing steps.
///
/// It reads and checks the configuration, prepares the regridder
/// weights and then processes requested species one by one.
pub fn main() -> Result<(), PipelineError> {
    info!("Preparing the pipeline core");

    debug!("Reading configuration from config.yaml");
    let config = Config::new_from_file(Path::new("config.yaml"))?;

    debug!("Setting memory limit");
    ALLOCATOR
        .set_limit(config.resources.memory.saturating_mul(1024 * 1024))
        .map_err(|_| PipelineError::MemoryLimit(config.resources.memory))?;

    let core = Core::new(config, default_storage()?)?;

    let summary = run(&core)?;

    if !summary.failed.is_empty() {
        warn!(
            "Processing of {} units failed, check the log for details: {:?}",
            summary.failed.len(),
            summary.failed
        );
    }

    Ok(())
}

#[cfg(feature = "netcdf")]
fn default_storage() -> Result<Box<dyn Storage>, PipelineError> {
    Ok(Box::new(storage::NetcdfStorage))
}

#[cfg(not(feature = "netcdf"))]
fn default_storage() -> Result<Box<dyn Storage>, PipelineError> {
    Err(PipelineError::NoStorageBackend)
}

/// Structure containing everything needed to process species.
///
/// All of it is prepared and checked before any inventory
/// data is read, and stays unchanged during the run.
pub struct Core {
    pub config: Config,
    pub catalog: SpeciesCatalog,
    pub resolution: Resolution,
    pub naming: FileNaming,
    pub source_grid: GridDescriptor,
    pub target_grid: GridDescriptor,
    pub weights: ConservativeWeights,
    pub threadpool: ThreadPool,
    pub storage: Box<dyn Storage>,
}

impl Core {
    /// Pipeline [`Core`] constructor for the native
    /// inventory grid and the model grid.
    pub fn new(config: Config, storage: Box<dyn Storage>) -> Result<Self, PipelineError> {
        let source_grid = GridDescriptor::regular(config.source.grid_spacing())?;
        let target_grid = GridDescriptor::model_target();

        Core::with_grids(config, storage, source_grid, target_grid)
    }

    pub fn with_grids(
        config: Config,
        storage: Box<dyn Storage>,
        source_grid: GridDescriptor,
        target_grid: GridDescriptor,
    ) -> Result<Self, PipelineError> {
        let window = config.window.processing_window()?;

        debug!("Building species catalog");
        let catalog = SpeciesCatalog::new(
            config.source,
            config.version(),
            &config.molecular_weights,
            &config.scale_factors,
        )?;

        let resolution = catalog.resolve(config.species.as_deref())?;

        let naming = FileNaming {
            source: config.source,
            layout: config.layout(),
            version: config.version().to_string(),
            window,
            cdate: config.cdate(),
            input_dir: config.paths.input.clone(),
            regridded_dir: config.paths.regridded.clone(),
            output_dir: config.paths.output.clone(),
        };

        prepare_output_dirs(&config)?;

        debug!("Setting up ThreadPool");
        let threadpool = ThreadPoolBuilder::new()
            .num_threads(config.resources.threads as usize)
            .stack_size(2 * 1024 * 1024)
            .build()?;

        let weights = if config.regridder.regenerate {
            info!(
                "Generating regridder weights from {} to {}",
                config.source.native_resolution(),
                config.target_resolution
            );
            ConservativeWeights::generate_and_save(&source_grid, &target_grid, &config.paths.weights)?
        } else {
            debug!("Loading regridder weights from {}", config.paths.weights.display());
            ConservativeWeights::load(&config.paths.weights)?
        };

        Ok(Core {
            config,
            catalog,
            resolution,
            naming,
            source_grid,
            target_grid,
            weights,
            threadpool,
            storage,
        })
    }

    fn regridder(&self) -> Regridder {
        Regridder {
            source: &self.source_grid,
            target: &self.target_grid,
            weights: &self.weights,
            pool: &self.threadpool,
        }
    }

    fn title(&self) -> String {
        title(self.config.source, self.config.original_resolution())
    }
}

/// Units processed or failed during the run.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct RunSummary {
    pub completed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Processes all requested species, first regridding
/// inventory species and then transforming tracers.
pub fn run(core: &Core) -> Result<RunSummary, PipelineError> {
    let mut record = CompletionRecord::load(&core.naming.completion_record())?;
    let mut summary = RunSummary::default();

    let inputs = core.catalog.inventory_inputs(&core.resolution.tracers)?;
    let tracers = &core.resolution.tracers;

    info!(
        "Processing {} tracers from {} inventory species for {} to {}",
        tracers.len(),
        inputs.len(),
        core.naming.window.start,
        core.naming.window.end
    );

    let units_bar = ProgressBar::new((inputs.len() + tracers.len()) as u64);
    units_bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    units_bar.set_prefix("Processed species");

    let window = &core.naming.window;
    let cdate = &core.naming.cdate;

    let mut failed_inputs: FxHashSet<&str> = FxHashSet::default();
    let mut failed_tracers: FxHashSet<&str> = FxHashSet::default();

    for input in &inputs {
        let key = input.species.key;
        let unit = format!("regrid {}", key);
        units_bar.set_message(unit.clone());

        if core.config.resume && record.contains(Stage::Regrid, key, window, cdate) {
            debug!("{} is already regridded, skipping", key);
            summary.skipped.push(unit);
        } else {
            match regrid_inventory(core, input) {
                Ok(files) => {
                    record.append(CompletedUnit::new(Stage::Regrid, key, window, cdate, files))?;
                    summary.completed.push(unit);
                }
                Err(err) => {
                    error!("Regridding of {} failed due to an error: {}", key, err);
                    failed_inputs.insert(key);
                    summary.failed.push(unit);
                }
            }
        }

        units_bar.inc(1);
    }

    let transformer = Transformer {
        storage: core.storage.as_ref(),
        catalog: &core.catalog,
        naming: &core.naming,
        grid: &core.target_grid,
        title: core.title(),
        requested: tracers,
    };

    for tracer in tracers {
        let unit = format!("transform {}", tracer);
        units_bar.set_message(unit.clone());

        if core.config.resume && record.contains(Stage::Transform, tracer, window, cdate) {
            debug!("{} is already transformed, skipping", tracer);
            summary.skipped.push(unit);
        } else {
            let result = check_prerequisites(core, tracer, &failed_inputs, &failed_tracers)
                .and_then(|_| transformer.transform(tracer));

            match result {
                Ok(files) => {
                    record.append(CompletedUnit::new(
                        Stage::Transform,
                        tracer,
                        window,
                        cdate,
                        files.len(),
                    ))?;
                    summary.completed.push(unit);
                }
                Err(err) => {
                    error!("Transformation of {} failed due to an error: {}", tracer, err);
                    failed_tracers.insert(tracer);
                    summary.failed.push(unit);
                }
            }
        }

        units_bar.inc(1);
    }

    units_bar.finish_with_message("All species processed");

    Ok(summary)
}

/// Fails a tracer reading an inventory species or a tracer
/// output which failed earlier in this run.
fn check_prerequisites(
    core: &Core,
    tracer: &str,
    failed_inputs: &FxHashSet<&str>,
    failed_tracers: &FxHashSet<&str>,
) -> Result<(), SpeciesError> {
    let kind = match core.catalog.spec(tracer) {
        Some(spec) => spec.kind,
        None => return Ok(()),
    };

    let (keys, _) = kind.inventory_keys();
    let failed = keys
        .iter()
        .find(|key| failed_inputs.contains(**key))
        .or_else(|| {
            kind.tracer_parts()
                .iter()
                .find(|child| failed_tracers.contains(**child))
        });

    match failed {
        Some(name) => Err(SpeciesError::MissingPrerequisite(
            tracer.to_string(),
            name.to_string(),
        )),
        None => Ok(()),
    }
}

/// Aggregates, regrids and writes one inventory species,
/// returning the number of written files.
///
/// The sector sum and every sector are processed one after
/// another, each read from raw files one time chunk at a time.
fn regrid_inventory(core: &Core, input: &InventoryInput) -> Result<usize, SpeciesError> {
    let key = input.species.key;
    let window = &core.naming.window;
    let regridder = core.regridder();

    let mut selections = vec![Selection::Total];

    if input.sector_resolved {
        selections.extend(
            core.naming
                .source
                .sectors(&core.naming.version)
                .iter()
                .map(|sector| Selection::Sector(*sector)),
        );
    }

    for selection in &selections {
        let chunks = native_chunks(core.storage.as_ref(), &core.naming, input.species, *selection);
        let field = regridder.regrid_window(chunks, window)?;
        write_regridded(core, key, selection.sector(), field)?;
    }

    Ok(selections.len())
}

fn write_regridded(
    core: &Core,
    key: &str,
    sector: Option<&str>,
    field: GriddedField,
) -> Result<(), SpeciesError> {
    let path = core.naming.regridded(key, sector);

    let mut schema = OutputSchema::new(
        &core.title(),
        &core.naming.window,
        core.naming.source.day_anchor(),
        &core.target_grid,
    )?;
    schema.add_field(MAIN_VARIABLE, field.values, &field.units)?;

    core.storage.write_dataset(&path, &schema.finish())?;
    debug!("Written {}", path.display());

    Ok(())
}

/// Creates directories for regridded and output files
/// and for the weights file. Existing files are kept.
fn prepare_output_dirs(config: &Config) -> Result<(), PipelineError> {
    debug!("Checking and setting output directories");

    fs::create_dir_all(&config.paths.regridded)?;
    fs::create_dir_all(&config.paths.output)?;

    if let Some(parent) = config.paths.weights.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    Ok(())
}
