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

//! Sulfur dioxide and primary sulfate files.
//!
//! Regridded sectors are grouped into four emission categories.
//! Surface SO2 and surface sulfate files carry the same category
//! mass scaled by `SURFACE_FRACTION`. Energy and industry sulfate
//! is injected into elevated layers only, scaled by `ELEVATED_FRACTION`.

use super::schema::{ALTITUDE, MOLECULE_FLUX_UNITS, NUMBER_FLUX_UNITS};
use super::{unit_factor, Transformer};
use crate::constants::mass_per_particle;
use crate::errors::SpeciesError;
use crate::pipeline::catalog::SpeciesSpec;
use crate::Float;
use ndarray::{Array3, Array4, Axis};
use std::ops::RangeInclusive;
use std::path::PathBuf;

/// Scaling of surface SO2 and surface sulfate fluxes.
const SURFACE_FRACTION: Float = 0.975;

/// Scaling of elevated energy and industry sulfate.
const ELEVATED_FRACTION: Float = 0.025;

const SULFATE_MOLECULAR_WEIGHT: Float = 115.0;
const SULFATE_DENSITY: Float = 1770.0;

/// Mode diameters of primary sulfate in m.
const DIAMETER_AG_SOL_WAS: Float = 0.134e-6;
const DIAMETER_SHIP: Float = 0.261e-6;
const DIAMETER_RES_TRAN: Float = 0.0504e-6;
const DIAMETER_ENE_IND: Float = 0.261e-6;

/// Altitude layers receiving energy and industry sulfate.
const INJECTION_LAYERS: RangeInclusive<usize> = 3..=6;

/// Thickness of an injection layer in cm.
const LAYER_THICKNESS: Float = 2e4;

/// Regridded mass fluxes summed within emission categories.
struct Categories {
    ag_sol_was: Array3<Float>,
    res_tran: Array3<Float>,
    ene_ind: Array3<Float>,
    ship: Array3<Float>,
}

/// Writes the five SO2 and sulfate files and
/// the three sulfate number files.
pub(super) fn transform_sulfur(
    transformer: &Transformer,
    spec: &SpeciesSpec,
    inventory: &str,
) -> Result<Vec<PathBuf>, SpeciesError> {
    let naming = transformer.naming;
    let groups = naming.source.sulfur_groups(&naming.version);

    let sum_sectors = |sectors: &[&str]| -> Result<Array3<Float>, SpeciesError> {
        let mut total = Array3::zeros(transformer.field_shape());
        for sector in sectors {
            total += &transformer.read_regridded(inventory, Some(*sector))?;
        }
        Ok(total)
    };

    let mass = Categories {
        ag_sol_was: sum_sectors(groups.ag_sol_was)?,
        res_tran: sum_sectors(groups.res_tran)?,
        ene_ind: sum_sectors(groups.ene_ind)?,
        ship: sum_sectors(groups.ship)?,
    };

    let factor = unit_factor(spec.molecular_weight, spec.scale_factor);
    let surface = |values: &Array3<Float>| values * (SURFACE_FRACTION * factor);
    let number =
        |diameter: Float| SULFATE_MOLECULAR_WEIGHT / mass_per_particle(SULFATE_DENSITY, diameter);

    let so4_vertical = elevated_layers(&(&mass.ene_ind * (ELEVATED_FRACTION * factor)));

    let mut written = vec![];

    let mut schema = transformer.schema()?;
    schema
        .add_field("emiss_ag_sol_was", surface(&mass.ag_sol_was), MOLECULE_FLUX_UNITS)?
        .add_field("emiss_res_tran", surface(&mass.res_tran), MOLECULE_FLUX_UNITS)?
        .add_field("emiss_ship", surface(&mass.ship), MOLECULE_FLUX_UNITS)?;
    written.push(transformer.write(&spec.model_name, Some("ag-ship-res"), schema)?);

    let mut schema = transformer.schema()?;
    schema.add_field("emiss_ene_ind", surface(&mass.ene_ind), MOLECULE_FLUX_UNITS)?;
    written.push(transformer.write(&spec.model_name, Some("ene"), schema)?);

    let mut schema = transformer.schema()?;
    schema
        .add_field("emiss_ag_sol_was", surface(&mass.ag_sol_was), MOLECULE_FLUX_UNITS)?
        .add_field("emiss_ship", surface(&mass.ship), MOLECULE_FLUX_UNITS)?;
    written.push(transformer.write("so4_a1", Some("ag-ship"), schema)?);

    let mut schema = transformer.schema()?;
    schema.add_field("emiss_res_tran", surface(&mass.res_tran), MOLECULE_FLUX_UNITS)?;
    written.push(transformer.write("so4_a2", Some("res"), schema)?);

    let mut schema = transformer.schema()?.with_altitude()?;
    schema.add_vertical_field("emiss_ene_ind", so4_vertical.clone(), MOLECULE_FLUX_UNITS)?;
    written.push(transformer.write("so4_a1", Some("ene-vertical"), schema)?);

    let mut schema = transformer.schema()?;
    schema
        .add_field(
            "emiss_ag_sol_was",
            surface(&mass.ag_sol_was) * number(DIAMETER_AG_SOL_WAS),
            NUMBER_FLUX_UNITS,
        )?
        .add_field(
            "emiss_ship",
            surface(&mass.ship) * number(DIAMETER_SHIP),
            NUMBER_FLUX_UNITS,
        )?;
    written.push(transformer.write("num_so4_a1", Some("ag-ship"), schema)?);

    let mut schema = transformer.schema()?;
    schema.add_field(
        "emiss_res_tran",
        surface(&mass.res_tran) * number(DIAMETER_RES_TRAN),
        NUMBER_FLUX_UNITS,
    )?;
    written.push(transformer.write("num_so4_a2", Some("res"), schema)?);

    let mut schema = transformer.schema()?.with_altitude()?;
    schema.add_vertical_field(
        "emiss_ene_ind",
        so4_vertical * number(DIAMETER_ENE_IND),
        NUMBER_FLUX_UNITS,
    )?;
    written.push(transformer.write("num_so4_a1", Some("ene-vertical"), schema)?);

    Ok(written)
}

/// Spreads a surface flux over the injection layers as a
/// volume flux, the remaining layers stay at zero.
fn elevated_layers(surface: &Array3<Float>) -> Array4<Float> {
    let (nt, nlat, nlon) = surface.dim();
    let mut vertical = Array4::zeros((nt, ALTITUDE.len(), nlat, nlon));
    let layer = surface / LAYER_THICKNESS;

    for level in INJECTION_LAYERS {
        vertical.index_axis_mut(Axis(1), level).assign(&layer);
    }

    vertical
}

#[cfg(test)]
mod tests {
    use super::elevated_layers;
    use crate::constants::{mass_per_particle, UNIT_FACTOR};
    use crate::pipeline::aggregator::INVENTORY_UNITS;
    use crate::pipeline::catalog::{DataSource, InputLayout, SpeciesCatalog};
    use crate::pipeline::field::{ProcessingWindow, YearMonth};
    use crate::pipeline::grid::GridDescriptor;
    use crate::pipeline::naming::FileNaming;
    use crate::pipeline::storage::{MemoryStorage, Storage};
    use crate::pipeline::transform::schema::{OutputSchema, MAIN_VARIABLE};
    use crate::pipeline::transform::Transformer;
    use crate::Float;
    use float_cmp::approx_eq;
    use ndarray::{Array3, ArrayD, IxDyn};
    use rustc_hash::FxHashMap;
    use std::path::PathBuf;

    #[test]
    fn injection_layers() {
        let surface = Array3::from_elem((2, 3, 4), 4e4);
        let vertical = elevated_layers(&surface);

        assert_eq!(vertical.dim(), (2, 8, 3, 4));

        for level in 0..8 {
            let expected = if (3..=6).contains(&level) { 2.0 } else { 0.0 };
            assert!(approx_eq!(Float, vertical[[1, level, 2, 3]], expected));
        }
    }

    #[test]
    fn sector_categories() {
        let window = ProcessingWindow::new(YearMonth::new(2015, 11), YearMonth::new(2015, 12)).unwrap();
        let grid = GridDescriptor::regular(90.0).unwrap();
        let storage = MemoryStorage::new();
        let catalog = SpeciesCatalog::new(
            DataSource::Ceds,
            "v2021-04-21",
            &FxHashMap::default(),
            &FxHashMap::default(),
        )
        .unwrap();
        let naming = FileNaming {
            source: DataSource::Ceds,
            layout: InputLayout::CedsArchive,
            version: "v2021-04-21".to_string(),
            window,
            cdate: "20240101".to_string(),
            input_dir: PathBuf::from("input"),
            regridded_dir: PathBuf::from("regridded"),
            output_dir: PathBuf::from("output"),
        };

        // sector i has flux (i + 1) * 1e-12
        let sectors = DataSource::Ceds.sectors("v2021-04-21");
        for (i, sector) in sectors.iter().enumerate() {
            let mut schema = OutputSchema::new("test", &window, 16, &grid).unwrap();
            schema
                .add_field(
                    MAIN_VARIABLE,
                    Array3::from_elem((2, 2, 4), (i + 1) as Float * 1e-12),
                    INVENTORY_UNITS,
                )
                .unwrap();
            storage
                .write_dataset(&naming.regridded("so2", Some(sector)), &schema.finish())
                .unwrap();
        }

        let requested = vec!["SO2".to_string()];
        let transformer = Transformer {
            storage: &storage,
            catalog: &catalog,
            naming: &naming,
            grid: &grid,
            title: "test".to_string(),
            requested: &requested,
        };

        let written = transformer.transform("SO2").unwrap();
        assert_eq!(written.len(), 8);

        let read = |tracer: &str, tag: &str, variable: &str| -> ArrayD<Float> {
            storage
                .read_variable(&naming.output(tracer, Some(tag)), variable, None)
                .unwrap()
        };

        let factor = UNIT_FACTOR / 64.0;

        // agr + sol + was = 1 + 6 + 7, res + tra = 5 + 4, ene + ind = 2 + 3, shp = 8
        let so2_ag = read("SO2", "ag-ship-res", "emiss_ag_sol_was");
        assert!(approx_eq!(Float, so2_ag[IxDyn(&[0, 0, 0])], 14e-12 * 0.975 * factor, ulps = 8));

        let so2_res = read("SO2", "ag-ship-res", "emiss_res_tran");
        assert!(approx_eq!(Float, so2_res[IxDyn(&[1, 1, 1])], 9e-12 * 0.975 * factor, ulps = 8));

        let so2_ene = read("SO2", "ene", "emiss_ene_ind");
        assert!(approx_eq!(Float, so2_ene[IxDyn(&[0, 1, 3])], 5e-12 * 0.975 * factor, ulps = 8));

        let so4_ship = read("so4_a1", "ag-ship", "emiss_ship");
        assert!(approx_eq!(Float, so4_ship[IxDyn(&[1, 0, 2])], 8e-12 * 0.975 * factor, ulps = 8));

        let so4_res = read("so4_a2", "res", "emiss_res_tran");
        assert!(approx_eq!(Float, so4_res[IxDyn(&[0, 0, 0])], 9e-12 * 0.975 * factor, ulps = 8));

        let vertical = read("so4_a1", "ene-vertical", "emiss_ene_ind");
        assert_eq!(vertical.shape(), &[2, 8, 2, 4]);
        assert!(approx_eq!(Float, vertical[IxDyn(&[0, 2, 0, 0])], 0.0));
        assert!(approx_eq!(
            Float,
            vertical[IxDyn(&[0, 4, 0, 0])],
            5e-12 * 0.025 * factor / 2e4,
            ulps = 8
        ));

        let num_res = read("num_so4_a2", "res", "emiss_res_tran");
        assert!(approx_eq!(
            Float,
            num_res[IxDyn(&[0, 1, 2])],
            9e-12 * 0.975 * factor * 115.0 / mass_per_particle(1770.0, 0.0504e-6),
            epsilon = 1e-9 * num_res[IxDyn(&[0, 1, 2])]
        ));

        let num_vertical = storage
            .dataset(&naming.output("num_so4_a1", Some("ene-vertical")))
            .unwrap();
        assert_eq!(
            num_vertical
                .variable("emiss_ene_ind")
                .unwrap()
                .attribute("units"),
            Some("(particles/cm2/s)(molecules/mole)(g/kg)")
        );
        assert!(num_vertical.variable("altitude_int").is_some());
    }
}
