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

//! End-to-end runs of the pipeline on a coarse synthetic inventory.

use super::catalog::{inventory_species, DataSource};
use super::configuration::Config;
use super::grid::GridDescriptor;
use super::naming::{ceds_variable, FileNaming};
use super::storage::{Dataset, MemoryStorage, Storage, Values};
use super::transform::schema::MAIN_VARIABLE;
use super::{check_prerequisites, run, Core};
use crate::constants::{mass_per_particle, UNIT_FACTOR};
use crate::errors::{PipelineError, SpeciesError, WeightsError};
use crate::Float;
use float_cmp::approx_eq;
use ndarray::{Array2, Array4, Axis, Ix3};
use rustc_hash::FxHashSet;
use std::path::Path;
use tempfile::TempDir;

const SECTORS: usize = 8;

fn config(dir: &Path, species: &str, regenerate: bool) -> Config {
    let yaml = format!(
        "
source: CEDS
window:
  start_year: 2000
  start_month: 1
  end_year: 2000
  end_month: 2
species: [{species}]
cdate: '20240101'
paths:
  input: {dir}/input
  regridded: {dir}/regridded
  output: {dir}/output
  weights: {dir}/weights/ceds.bin
regridder:
  regenerate: {regenerate}
",
        species = species,
        dir = dir.display(),
        regenerate = regenerate
    );

    Config::new_from_slice(yaml.as_bytes()).unwrap()
}

/// Spatial pattern shared by all sectors, sector `s` is scaled by `s + 1`.
fn pattern(i: usize, j: usize) -> Float {
    1e-12 * (1.0 + i as Float + (j % 3) as Float)
}

/// Sectoral archive of SO2 with three months on a 45 degree grid
/// stored from the antimeridian.
fn so2_archive(storage: &MemoryStorage, naming: &FileNaming) {
    let grid = GridDescriptor::regular(45.0).unwrap();
    let species = inventory_species("so2").unwrap();

    let values = Array4::from_shape_fn((3, SECTORS, 4, 8), |(_, s, i, j)| {
        (s + 1) as Float * pattern(i, j)
    });

    let mut dataset = Dataset::new("synthetic CEDS");
    dataset.add_unlimited_dimension("time", 3);
    dataset.add_dimension("sector", SECTORS);
    dataset.add_dimension("lat", 4);
    dataset.add_dimension("lon", 8);
    dataset
        .add_variable("lat", &["lat"], Values::Float(grid.lats.clone().into_dyn()))
        .unwrap();
    dataset
        .add_variable(
            "lon",
            &["lon"],
            Values::Float(grid.lons.mapv(|lon| lon - 180.0).into_dyn()),
        )
        .unwrap();
    dataset
        .add_variable(
            &ceds_variable(species),
            &["time", "sector", "lat", "lon"],
            Values::Float(values.into_dyn()),
        )
        .unwrap();

    storage
        .write_dataset(&naming.ceds_archive_input(species), &dataset)
        .unwrap();
}

fn core(dir: &TempDir, species: &str) -> Core {
    let config = config(dir.path(), species, true);
    let storage = MemoryStorage::new();

    let naming = FileNaming {
        source: DataSource::Ceds,
        layout: config.layout(),
        version: config.version().to_string(),
        window: config.window.processing_window().unwrap(),
        cdate: config.cdate(),
        input_dir: config.paths.input.clone(),
        regridded_dir: config.paths.regridded.clone(),
        output_dir: config.paths.output.clone(),
    };
    so2_archive(&storage, &naming);

    Core::with_grids(
        config,
        Box::new(storage),
        GridDescriptor::regular(45.0).unwrap(),
        GridDescriptor::regular(90.0).unwrap(),
    )
    .unwrap()
}

fn read(core: &Core, path: &Path, variable: &str) -> ndarray::Array3<Float> {
    core.storage
        .read_variable(path, variable, None)
        .unwrap()
        .into_dimensionality::<Ix3>()
        .unwrap()
}

fn relative_error(a: Float, b: Float) -> Float {
    ((a - b) / b).abs()
}

#[test]
fn sulfur_dioxide_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let core = core(&dir, "SO2");

    let summary = run(&core).unwrap();

    assert!(summary.failed.is_empty());
    assert_eq!(summary.completed, vec!["regrid so2", "transform SO2"]);

    let source_grid = &core.source_grid;
    let target_grid = &core.target_grid;

    // total over sectors is conserved by regridding
    let source_total = (1..=SECTORS).sum::<usize>() as Float
        * source_grid.integrate(Array2::from_shape_fn((4, 8), |(i, j)| pattern(i, j)).view());

    let regridded = read(&core, &core.naming.regridded("so2", None), MAIN_VARIABLE);
    assert_eq!(regridded.dim(), (2, 2, 4));

    for t in 0..2 {
        let total = target_grid.integrate(regridded.index_axis(Axis(0), t));
        assert!(relative_error(total, source_total) < 1e-9);
    }

    // CEDS sectors: agr ene ind tra res sol was shp
    let ag_sol_was = (1 + 6 + 7) as Float;
    let res_tran = (5 + 4) as Float;
    let ene_ind = (2 + 3) as Float;
    let ship = 8.0;

    let factor = UNIT_FACTOR / 64.0;
    let pattern_integral =
        source_grid.integrate(Array2::from_shape_fn((4, 8), |(i, j)| pattern(i, j)).view());

    let so2_file = core.naming.output("SO2", Some("ag-ship-res"));
    let categories = [
        ("emiss_ag_sol_was", ag_sol_was),
        ("emiss_res_tran", res_tran),
        ("emiss_ship", ship),
    ];

    for (variable, weight) in &categories {
        let values = read(&core, &so2_file, variable);
        let integral = target_grid.integrate(values.index_axis(Axis(0), 1));

        assert!(relative_error(integral, weight * pattern_integral * 0.975 * factor) < 1e-9);
    }

    let so2_ene = read(&core, &core.naming.output("SO2", Some("ene")), "emiss_ene_ind");
    let so2_ene_integral = target_grid.integrate(so2_ene.index_axis(Axis(0), 0));
    assert!(relative_error(so2_ene_integral, ene_ind * pattern_integral * 0.975 * factor) < 1e-9);

    // surface SO2 and surface sulfate carry the same category flux
    let so2_ag = read(&core, &so2_file, "emiss_ag_sol_was");
    let so4_ag = read(
        &core,
        &core.naming.output("so4_a1", Some("ag-ship")),
        "emiss_ag_sol_was",
    );

    for (so2, so4) in so2_ag.iter().zip(so4_ag.iter()) {
        assert!(approx_eq!(Float, so4 / so2, 1.0, epsilon = 1e-12));
    }

    let so4_res = read(&core, &core.naming.output("so4_a2", Some("res")), "emiss_res_tran");
    let so4_res_integral = target_grid.integrate(so4_res.index_axis(Axis(0), 1));
    assert!(relative_error(so4_res_integral, res_tran * pattern_integral * 0.975 * factor) < 1e-9);

    let num_res = read(&core, &core.naming.output("num_so4_a2", Some("res")), "emiss_res_tran");
    let num_res_integral = target_grid.integrate(num_res.index_axis(Axis(0), 1));
    let particles = 115.0 / mass_per_particle(1770.0, 0.0504e-6);
    assert!(relative_error(num_res_integral, so4_res_integral * particles) < 1e-9);

    for tag in ["ag-ship", "ene-vertical"] {
        assert!(core.storage.exists(&core.naming.output("num_so4_a1", Some(tag))));
    }
    assert!(core.storage.exists(&core.naming.output("num_so4_a2", Some("res"))));
    assert!(core.storage.exists(&core.naming.output("so4_a2", Some("res"))));
}

#[test]
fn resumed_run_skips_completed_species() {
    let dir = tempfile::tempdir().unwrap();
    let mut core = core(&dir, "SO2");

    run(&core).unwrap();

    core.config.resume = true;
    let summary = run(&core).unwrap();

    assert!(summary.completed.is_empty());
    assert_eq!(summary.skipped, vec!["regrid so2", "transform SO2"]);
}

#[test]
fn failed_species_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let core = core(&dir, "CO, SO2");

    let summary = run(&core).unwrap();

    assert_eq!(summary.failed, vec!["regrid co", "transform CO"]);
    assert_eq!(summary.completed, vec!["regrid so2", "transform SO2"]);

    // fan-out tracers of a failed parent are not written
    assert!(!core.storage.exists(&core.naming.output("HCN", None)));
    assert!(core
        .storage
        .exists(&core.naming.output("SO2", Some("ene"))));
}

#[test]
fn stale_intermediate_files_are_not_read() {
    let dir = tempfile::tempdir().unwrap();
    let core = core(&dir, "SO2");

    run(&core).unwrap();

    let archive = core
        .naming
        .ceds_archive_input(inventory_species("so2").unwrap());
    core.storage.remove(&archive).unwrap();

    // regridded files of the first run are still in place
    assert!(core.storage.exists(&core.naming.regridded("so2", Some("shp"))));

    let summary = run(&core).unwrap();

    assert!(summary.completed.is_empty());
    assert_eq!(summary.failed, vec!["regrid so2", "transform SO2"]);
}

#[test]
fn dependants_of_failed_units_fail() {
    let dir = tempfile::tempdir().unwrap();
    let core = core(&dir, "SO2");

    let mut failed_inputs = FxHashSet::default();
    let mut failed_tracers = FxHashSet::default();

    assert!(check_prerequisites(&core, "IVOC", &failed_inputs, &failed_tracers).is_ok());

    failed_inputs.insert("pentanes");
    failed_tracers.insert("C3H6");

    for (tracer, prerequisite) in [("BIGALK", "pentanes"), ("IVOC", "C3H6")] {
        match check_prerequisites(&core, tracer, &failed_inputs, &failed_tracers) {
            Err(SpeciesError::MissingPrerequisite(name, missing)) => {
                assert_eq!(name, tracer);
                assert_eq!(missing, prerequisite);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    assert!(check_prerequisites(&core, "CO", &failed_inputs, &failed_tracers).is_ok());
}

#[test]
fn missing_weights_abort_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), "SO2", false);

    let result = Core::with_grids(
        config,
        Box::new(MemoryStorage::new()),
        GridDescriptor::regular(45.0).unwrap(),
        GridDescriptor::regular(90.0).unwrap(),
    );

    assert!(matches!(
        result,
        Err(PipelineError::Weights(WeightsError::NotFound(_)))
    ));
}
