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

//! Per-sector summation of raw inventory files.
//!
//! Produces fields still on the native inventory grid, split
//! into time chunks. The multi-year sectoral archive gives one
//! chunk already sliced to the processing window, yearly files
//! give one chunk per calendar year which is sliced after regridding.
//!
//! Chunks are read lazily and one selection (the sector sum or a single
//! sector) at a time, so only one native-grid chunk is held in memory.

use super::catalog::{ceds_sector_variable, InputLayout, InventorySpecies};
use super::field::{GriddedField, YearMonth};
use super::naming::{ceds_variable, FileNaming};
use super::storage::Storage;
use crate::errors::{SpeciesError, StorageError};
use crate::Float;
use log::debug;
use ndarray::{concatenate, Array1, Array3, Array4, ArrayD, Axis, Ix1, Ix3, Ix4};
use std::path::Path;

/// Units of raw inventory fluxes.
pub const INVENTORY_UNITS: &str = "kg m-2 s-1";

/// Variable name of the sector sum in yearly files.
const SUM_VARIABLE: &str = "sum";

/// Part of an inventory species to read.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Selection {
    /// Sum over all sectors.
    Total,
    Sector(&'static str),
}

impl Selection {
    pub fn sector(&self) -> Option<&'static str> {
        match self {
            Selection::Total => None,
            Selection::Sector(sector) => Some(*sector),
        }
    }
}

/// Time chunk of raw data.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Chunk {
    Archive,
    CamsYear(i32),
    CedsYear(i32),
}

/// Reads the inventory files of `species` covering the processing
/// window, yielding `selection` in consecutive time chunks.
///
/// Nothing is read until the iterator is advanced. A chunk fails with
/// [`SpeciesError::DataNotFound`] when any of its files is absent.
pub fn native_chunks<'a>(
    storage: &'a dyn Storage,
    naming: &'a FileNaming,
    species: &'a InventorySpecies,
    selection: Selection,
) -> impl Iterator<Item = Result<GriddedField, SpeciesError>> + 'a {
    debug!(
        "Aggregating {} {:?} from {} files",
        species.key,
        selection,
        naming.source.name()
    );

    let chunks: Vec<Chunk> = match naming.layout {
        InputLayout::CedsArchive => vec![Chunk::Archive],
        InputLayout::CamsYearlyFiles => naming.window.years().map(Chunk::CamsYear).collect(),
        InputLayout::CedsYearlyFiles => naming.window.years().map(Chunk::CedsYear).collect(),
    };

    chunks.into_iter().map(move |chunk| {
        match chunk {
            Chunk::Archive => read_archive(storage, naming, species, selection),
            Chunk::CamsYear(year) => read_cams_year(storage, naming, species, selection, year),
            Chunk::CedsYear(year) => read_ceds_year(storage, naming, species, selection, year),
        }
        .map_err(missing_as_not_found)
    })
}

/// Multi-year file with a variable of dimensions (time, sector, lat, lon),
/// sliced to the window with indices counted from the epoch.
fn read_archive(
    storage: &dyn Storage,
    naming: &FileNaming,
    species: &InventorySpecies,
    selection: Selection,
) -> Result<GriddedField, SpeciesError> {
    let path = naming.ceds_archive_input(species);
    let variable = ceds_variable(species);

    if !storage.exists(&path) {
        return Err(SpeciesError::DataNotFound(path));
    }

    let shape = storage.variable_shape(&path, &variable)?;
    let sectors = naming.source.sectors(&naming.version);

    if shape.len() != 4 || shape[1] != sectors.len() {
        return Err(SpeciesError::UnexpectedShape(variable, shape));
    }

    let window = &naming.window;
    let indices = window
        .epoch_indices()
        .ok_or_else(|| SpeciesError::WindowOutOfRange {
            requested: 0,
            available: shape[0],
            path: path.clone(),
        })?;

    if indices.end > shape[0] {
        return Err(SpeciesError::WindowOutOfRange {
            requested: indices.end - 1,
            available: shape[0],
            path,
        });
    }

    let (lats, lons) = read_coordinates(storage, &path)?;
    let values: Array4<Float> = into_dim::<Ix4>(
        &variable,
        storage.read_variable(&path, &variable, Some(indices))?,
    )?;

    let values = match selection {
        Selection::Total => values.sum_axis(Axis(1)),
        Selection::Sector(sector) => {
            let index = sectors
                .iter()
                .position(|s| *s == sector)
                .ok_or_else(|| StorageError::MissingVariable(sector.to_string(), path.clone()))?;
            values.index_axis_move(Axis(1), index)
        }
    };

    Ok(native_field(species, window.months(), lats, lons, values))
}

/// One CAMS file per calendar year with twelve monthly steps,
/// holding the sector sum in `sum` and each sector in its own variable.
fn read_cams_year(
    storage: &dyn Storage,
    naming: &FileNaming,
    species: &InventorySpecies,
    selection: Selection,
    year: i32,
) -> Result<GriddedField, SpeciesError> {
    let path = naming.cams_yearly_input(species, year);

    if !storage.exists(&path) {
        return Err(SpeciesError::DataNotFound(path));
    }

    let variable = selection.sector().unwrap_or(SUM_VARIABLE);
    let (lats, lons) = read_coordinates(storage, &path)?;
    let values = into_dim::<Ix3>(variable, storage.read_variable(&path, variable, None)?)?;

    year_field(species, year, lats, lons, values)
}

/// Two CEDS files in the directory of the year, named after the previous
/// and the current year, which joined along time give the twelve months
/// of the year. Sector variables carry full sector names.
fn read_ceds_year(
    storage: &dyn Storage,
    naming: &FileNaming,
    species: &InventorySpecies,
    selection: Selection,
    year: i32,
) -> Result<GriddedField, SpeciesError> {
    let paths = [
        naming.ceds_yearly_input(species, year, year - 1),
        naming.ceds_yearly_input(species, year, year),
    ];

    if let Some(missing) = paths.iter().find(|path| !storage.exists(path)) {
        return Err(SpeciesError::DataNotFound(missing.clone()));
    }

    let variable = match selection {
        Selection::Total => SUM_VARIABLE,
        Selection::Sector(sector) => ceds_sector_variable(sector)
            .ok_or_else(|| StorageError::MissingVariable(sector.to_string(), paths[1].clone()))?,
    };

    let (lats, lons) = read_coordinates(storage, &paths[1])?;

    let mut parts = vec![];
    for path in &paths {
        parts.push(into_dim::<Ix3>(
            variable,
            storage.read_variable(path, variable, None)?,
        )?);
    }

    let values = concatenate(Axis(0), &[parts[0].view(), parts[1].view()])
        .map_err(|e| StorageError::Shape(variable.to_string(), e))?;

    year_field(species, year, lats, lons, values)
}

/// Native field of one calendar year, which must have twelve steps.
fn year_field(
    species: &InventorySpecies,
    year: i32,
    lats: Array1<Float>,
    lons: Array1<Float>,
    values: Array3<Float>,
) -> Result<GriddedField, SpeciesError> {
    if values.len_of(Axis(0)) != 12 {
        return Err(SpeciesError::TimeAxisMismatch {
            expected: 12,
            found: values.len_of(Axis(0)),
        });
    }

    let times = (1..=12).map(|m| YearMonth::new(year, m)).collect();

    Ok(native_field(species, times, lats, lons, values))
}

fn native_field(
    species: &InventorySpecies,
    times: Vec<YearMonth>,
    lats: Array1<Float>,
    lons: Array1<Float>,
    values: Array3<Float>,
) -> GriddedField {
    GriddedField {
        species: species.key.to_string(),
        units: INVENTORY_UNITS.to_string(),
        times,
        lats,
        lons,
        values,
    }
}

/// Latitude and longitude centres stored in an inventory file.
fn read_coordinates(
    storage: &dyn Storage,
    path: &Path,
) -> Result<(Array1<Float>, Array1<Float>), SpeciesError> {
    let lats = into_dim::<Ix1>("lat", storage.read_variable(path, "lat", None)?)?;
    let lons = into_dim::<Ix1>("lon", storage.read_variable(path, "lon", None)?)?;

    Ok((lats, lons))
}

fn into_dim<D: ndarray::Dimension>(
    variable: &str,
    values: ArrayD<Float>,
) -> Result<ndarray::Array<Float, D>, SpeciesError> {
    let shape = values.shape().to_vec();

    values.into_dimensionality::<D>().map_err(|e| {
        debug!("Variable {} has shape {:?}: {}", variable, shape, e);
        SpeciesError::UnexpectedShape(variable.to_string(), shape)
    })
}

/// Converts storage errors about absent files into
/// the species-level missing data error.
fn missing_as_not_found(err: SpeciesError) -> SpeciesError {
    match err {
        SpeciesError::Storage(StorageError::NotFound(path)) => SpeciesError::DataNotFound(path),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::{native_chunks, Selection};
    use crate::errors::{SpeciesError, StorageError};
    use crate::pipeline::catalog::{inventory_species, DataSource, DownloadMethod, InputLayout};
    use crate::pipeline::field::{GriddedField, ProcessingWindow, YearMonth};
    use crate::pipeline::naming::{ceds_variable, FileNaming};
    use crate::pipeline::storage::{Dataset, MemoryStorage, Storage, Values};
    use crate::Float;
    use float_cmp::approx_eq;
    use ndarray::{Array1, ArrayD, IxDyn};
    use std::path::PathBuf;

    fn naming(source: DataSource, method: DownloadMethod, window: ProcessingWindow) -> FileNaming {
        FileNaming {
            source,
            layout: InputLayout::new(source, method),
            version: source.default_version().to_string(),
            window,
            cdate: "20240101".to_string(),
            input_dir: PathBuf::from("in"),
            regridded_dir: PathBuf::from("regridded"),
            output_dir: PathBuf::from("out"),
        }
    }

    fn window(sy: i32, sm: u32, ey: i32, em: u32) -> ProcessingWindow {
        ProcessingWindow::new(YearMonth::new(sy, sm), YearMonth::new(ey, em)).unwrap()
    }

    fn collect(
        storage: &MemoryStorage,
        naming: &FileNaming,
        key: &str,
        selection: Selection,
    ) -> Result<Vec<GriddedField>, SpeciesError> {
        native_chunks(storage, naming, inventory_species(key).unwrap(), selection).collect()
    }

    fn coordinates(ds: &mut Dataset) {
        ds.add_dimension("lat", 2);
        ds.add_dimension("lon", 4);
        ds.add_variable(
            "lat",
            &["lat"],
            Values::Float(Array1::from(vec![-45.0, 45.0]).into_dyn()),
        )
        .unwrap();
        ds.add_variable(
            "lon",
            &["lon"],
            Values::Float(Array1::from(vec![-135.0, -45.0, 45.0, 135.0]).into_dyn()),
        )
        .unwrap();
    }

    /// Archive with 24 months from the epoch, value = 100 * month index + sector + 1.
    fn ceds_archive(storage: &MemoryStorage, naming: &FileNaming) {
        let so2 = inventory_species("so2").unwrap();
        let mut ds = Dataset::new("archive");
        ds.add_unlimited_dimension("time", 24);
        ds.add_dimension("sector", 8);
        coordinates(&mut ds);
        ds.add_variable(
            &ceds_variable(so2),
            &["time", "sector", "lat", "lon"],
            Values::Float(ArrayD::from_shape_fn(IxDyn(&[24, 8, 2, 4]), |i| {
                (100 * i[0] + i[1] + 1) as Float
            })),
        )
        .unwrap();

        storage
            .write_dataset(&naming.ceds_archive_input(so2), &ds)
            .unwrap();
    }

    /// File with `steps` monthly steps of the given variables, each filled with a constant.
    fn monthly_file(steps: usize, variables: &[(&str, Float)]) -> Dataset {
        let mut ds = Dataset::new("yearly");
        ds.add_unlimited_dimension("time", steps);
        coordinates(&mut ds);

        for (name, value) in variables {
            ds.add_variable(
                name,
                &["time", "lat", "lon"],
                Values::Float(ArrayD::from_elem(IxDyn(&[steps, 2, 4]), *value)),
            )
            .unwrap();
        }

        ds
    }

    #[test]
    fn archive_slicing_and_sectors() {
        let storage = MemoryStorage::new();
        let naming = naming(DataSource::Ceds, DownloadMethod::Globus, window(2000, 11, 2001, 2));
        ceds_archive(&storage, &naming);

        let total = collect(&storage, &naming, "so2", Selection::Total).unwrap();

        assert_eq!(total.len(), 1);
        assert_eq!(total[0].values.shape(), &[4, 2, 4]);
        assert_eq!(total[0].times[0], YearMonth::new(2000, 11));

        // November 2000 is index 10, sectors sum to 8 * 1000 + 36
        assert!(approx_eq!(Float, total[0].values[[0, 0, 0]], 8036.0));
        assert!(approx_eq!(Float, total[0].values[[3, 1, 3]], 8.0 * 1300.0 + 36.0));

        let shp = collect(&storage, &naming, "so2", Selection::Sector("shp")).unwrap();
        assert_eq!(shp[0].values.shape(), &[4, 2, 4]);
        assert!(approx_eq!(Float, shp[0].values[[1, 0, 0]], 1108.0));

        assert!(matches!(
            collect(&storage, &naming, "so2", Selection::Sector("awb")),
            Err(SpeciesError::Storage(StorageError::MissingVariable(_, _)))
        ));
    }

    #[test]
    fn window_beyond_archive() {
        let storage = MemoryStorage::new();
        let naming = naming(DataSource::Ceds, DownloadMethod::Globus, window(2001, 6, 2002, 1));
        ceds_archive(&storage, &naming);

        let result = collect(&storage, &naming, "so2", Selection::Total);

        assert!(matches!(
            result,
            Err(SpeciesError::WindowOutOfRange { requested: 24, available: 24, .. })
        ));
    }

    #[test]
    fn missing_file() {
        let storage = MemoryStorage::new();
        let naming = naming(DataSource::Ceds, DownloadMethod::Globus, window(2000, 1, 2000, 3));

        let result = collect(&storage, &naming, "co", Selection::Total);

        assert!(matches!(result, Err(SpeciesError::DataNotFound(_))));
    }

    #[test]
    fn cams_yearly_files() {
        let storage = MemoryStorage::new();
        let naming = naming(DataSource::CamsGlobAnt, DownloadMethod::Globus, window(2010, 6, 2011, 5));
        let co = inventory_species("co").unwrap();

        for year in [2010, 2011] {
            storage
                .write_dataset(
                    &naming.cams_yearly_input(co, year),
                    &monthly_file(12, &[("sum", year as Float), ("ene", 1.0)]),
                )
                .unwrap();
        }

        let total = collect(&storage, &naming, "co", Selection::Total).unwrap();

        assert_eq!(total.len(), 2);
        assert_eq!(total[1].times[0], YearMonth::new(2011, 1));
        assert!(approx_eq!(Float, total[1].values[[0, 0, 0]], 2011.0));

        let ene = collect(&storage, &naming, "co", Selection::Sector("ene")).unwrap();
        assert!(approx_eq!(Float, ene[0].values[[5, 1, 2]], 1.0));

        assert!(collect(&storage, &naming, "co", Selection::Sector("shp")).is_err());
    }

    #[test]
    fn chunks_are_read_lazily() {
        let storage = MemoryStorage::new();
        let naming = naming(DataSource::CamsGlobAnt, DownloadMethod::Globus, window(2010, 1, 2011, 12));
        let co = inventory_species("co").unwrap();

        storage
            .write_dataset(&naming.cams_yearly_input(co, 2010), &monthly_file(12, &[("sum", 1.0)]))
            .unwrap();

        let mut chunks = native_chunks(&storage, &naming, co, Selection::Total);

        assert!(chunks.next().unwrap().is_ok());
        assert!(matches!(chunks.next(), Some(Err(SpeciesError::DataNotFound(_)))));
        assert!(chunks.next().is_none());
    }

    #[test]
    fn ceds_yearly_files() {
        let storage = MemoryStorage::new();
        let naming = naming(DataSource::Ceds, DownloadMethod::Wget, window(1970, 3, 1971, 2));
        let so2 = inventory_species("so2").unwrap();

        for year in [1970, 1971] {
            let base = year as Float;
            storage
                .write_dataset(
                    &naming.ceds_yearly_input(so2, year, year - 1),
                    &monthly_file(6, &[("sum", base), ("ships", 1.0)]),
                )
                .unwrap();
            storage
                .write_dataset(
                    &naming.ceds_yearly_input(so2, year, year),
                    &monthly_file(6, &[("sum", base + 0.5), ("ships", 2.0)]),
                )
                .unwrap();
        }

        let total = collect(&storage, &naming, "so2", Selection::Total).unwrap();

        assert_eq!(total.len(), 2);
        assert_eq!(total[0].values.shape(), &[12, 2, 4]);
        assert_eq!(total[0].times[0], YearMonth::new(1970, 1));
        assert_eq!(total[1].times[11], YearMonth::new(1971, 12));
        assert!(approx_eq!(Float, total[0].values[[5, 0, 0]], 1970.0));
        assert!(approx_eq!(Float, total[0].values[[6, 0, 0]], 1970.5));

        let ships = collect(&storage, &naming, "so2", Selection::Sector("shp")).unwrap();
        assert!(approx_eq!(Float, ships[1].values[[11, 1, 3]], 2.0));
    }

    #[test]
    fn ceds_yearly_files_need_both_halves() {
        let storage = MemoryStorage::new();
        let naming = naming(DataSource::Ceds, DownloadMethod::Wget, window(1970, 1, 1970, 12));
        let so2 = inventory_species("so2").unwrap();

        storage
            .write_dataset(
                &naming.ceds_yearly_input(so2, 1970, 1970),
                &monthly_file(12, &[("sum", 1.0)]),
            )
            .unwrap();

        match collect(&storage, &naming, "so2", Selection::Total) {
            Err(SpeciesError::DataNotFound(path)) => {
                assert_eq!(path, naming.ceds_yearly_input(so2, 1970, 1969))
            }
            other => panic!("unexpected result {:?}", other),
        }

        storage
            .write_dataset(
                &naming.ceds_yearly_input(so2, 1970, 1969),
                &monthly_file(12, &[("sum", 1.0)]),
            )
            .unwrap();

        assert!(matches!(
            collect(&storage, &naming, "so2", Selection::Total),
            Err(SpeciesError::TimeAxisMismatch { expected: 12, found: 24 })
        ));
    }
}
