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

//! Conversion of regridded inventory fluxes into model tracers.
//!
//! Every tracer is computed from mass fluxes (kg m-2 s-1) with
//! a single conversion into molecule fluxes (molecules cm-2 s-1):
//!
//! `molecule_flux = mass_flux * unit_factor / molecular_weight * scale_factor`
//!
//! where `unit_factor` is the Avogadro number with kg to g and
//! m2 to cm2 conversions folded in. Tracers derived from another
//! tracer (number tracers and minor species) are computed from the
//! parent's converted field right after the parent is written.

pub mod schema;
mod sulfur;

use self::schema::{OutputSchema, MAIN_VARIABLE, MOLECULE_FLUX_UNITS, NUMBER_FLUX_UNITS};
use super::catalog::{CompositeParts, DerivationKind, SpeciesCatalog, SpeciesSpec};
use super::grid::GridDescriptor;
use super::naming::FileNaming;
use super::storage::Storage;
use crate::constants::{mass_per_particle, UNIT_FACTOR};
use crate::errors::SpeciesError;
use crate::Float;
use log::{debug, info};
use ndarray::{Array3, Ix3};
use std::path::{Path, PathBuf};

/// Factor converting mass flux into molecule flux.
pub fn unit_factor(molecular_weight: Float, scale_factor: Float) -> Float {
    UNIT_FACTOR / molecular_weight * scale_factor
}

pub fn to_molecule_flux(
    mass_flux: &Array3<Float>,
    molecular_weight: Float,
    scale_factor: Float,
) -> Array3<Float> {
    mass_flux * unit_factor(molecular_weight, scale_factor)
}

/// Values and units of a tracer derived from its parent's output.
///
/// Returns `None` when `derived` does not fan out from a parent.
pub fn derive_from_parent(
    parent: &SpeciesSpec,
    derived: &SpeciesSpec,
    parent_values: &Array3<Float>,
) -> Option<(Array3<Float>, &'static str)> {
    match derived.kind {
        DerivationKind::NumberTracer {
            density, diameter, ..
        } => Some((
            parent_values * (derived.molecular_weight / mass_per_particle(density, diameter)),
            NUMBER_FLUX_UNITS,
        )),
        DerivationKind::MinorSplit { fraction, .. } => Some((
            parent_values * (fraction * parent.molecular_weight / derived.molecular_weight),
            MOLECULE_FLUX_UNITS,
        )),
        _ => None,
    }
}

/// Writes model-ready files from regridded inventory fields.
pub struct Transformer<'a> {
    pub storage: &'a dyn Storage,
    pub catalog: &'a SpeciesCatalog,
    pub naming: &'a FileNaming,
    pub grid: &'a GridDescriptor,
    pub title: String,
    /// Tracers requested in this run.
    pub requested: &'a [String],
}

impl<'a> Transformer<'a> {
    /// Computes and writes all files of the tracer,
    /// including tracers fanning out from it.
    ///
    /// Returns paths of the written files.
    pub fn transform(&self, tracer: &str) -> Result<Vec<PathBuf>, SpeciesError> {
        let spec = self
            .catalog
            .spec(tracer)
            .ok_or_else(|| SpeciesError::UnknownTracer(tracer.to_string()))?;

        let values = match spec.kind {
            DerivationKind::Plain { inventory } => {
                let mass = self.read_regridded(inventory, None)?;
                to_molecule_flux(&mass, spec.molecular_weight, spec.scale_factor)
            }
            DerivationKind::Composite(CompositeParts::Inventory(_)) => self.sum_inventory_parts(spec)?,
            DerivationKind::Composite(CompositeParts::Tracers(_)) => self.sum_tracer_outputs(spec)?,
            DerivationKind::SulfurSectorSplit { inventory } => {
                return sulfur::transform_sulfur(self, spec, inventory)
            }
            DerivationKind::NumberTracer { .. } | DerivationKind::MinorSplit { .. } => {
                return Err(SpeciesError::UnknownTracer(tracer.to_string()))
            }
        };

        let mut written = vec![];

        let mut schema = self.schema()?;
        schema.add_field(MAIN_VARIABLE, values.clone(), MOLECULE_FLUX_UNITS)?;
        written.push(self.write(&spec.model_name, None, schema)?);

        for derived in self.catalog.derived_from(tracer) {
            if let Some((derived_values, units)) = derive_from_parent(spec, derived, &values) {
                let mut schema = self.schema()?;
                schema.add_field(MAIN_VARIABLE, derived_values, units)?;
                written.push(self.write(&derived.model_name, None, schema)?);
            }
        }

        Ok(written)
    }

    /// Sum of inventory sub-species, each rescaled by `child_mw / mw`
    /// and converted with its own molecular weight.
    fn sum_inventory_parts(&self, spec: &SpeciesSpec) -> Result<Array3<Float>, SpeciesError> {
        let mut total = Array3::zeros(self.field_shape());

        for child in &spec.children {
            let mass = self.read_regridded(&child.name, None)?;
            let factor = child.molecular_weight / spec.molecular_weight
                * unit_factor(child.molecular_weight, spec.scale_factor);

            total.scaled_add(factor, &mass);
        }

        Ok(total)
    }

    /// Sum of already written outputs of other tracers,
    /// rescaled by `child_mw / mw * scale_factor`.
    ///
    /// Children not requested in this run contribute nothing,
    /// requested children without output are an error.
    fn sum_tracer_outputs(&self, spec: &SpeciesSpec) -> Result<Array3<Float>, SpeciesError> {
        let mut total = Array3::zeros(self.field_shape());

        for child in &spec.children {
            if !self.requested.contains(&child.name) {
                debug!(
                    "{} is not requested, skipping its contribution to {}",
                    child.name, spec.model_name
                );
                continue;
            }

            let path = self.naming.output(&child.name, None);

            if !self.storage.exists(&path) {
                return Err(SpeciesError::MissingPrerequisite(
                    spec.model_name.clone(),
                    child.name.clone(),
                ));
            }

            let values = self.read_field(&path)?;
            let factor = child.molecular_weight / spec.molecular_weight * spec.scale_factor;

            total.scaled_add(factor, &values);
        }

        Ok(total)
    }

    /// Regridded mass flux of an inventory species or one of its sectors.
    fn read_regridded(&self, key: &str, sector: Option<&str>) -> Result<Array3<Float>, SpeciesError> {
        let path = self.naming.regridded(key, sector);

        if !self.storage.exists(&path) {
            return Err(SpeciesError::DataNotFound(path));
        }

        self.read_field(&path)
    }

    fn read_field(&self, path: &Path) -> Result<Array3<Float>, SpeciesError> {
        let values = self.storage.read_variable(path, MAIN_VARIABLE, None)?;
        let shape = values.shape().to_vec();

        match values.into_dimensionality::<Ix3>() {
            Ok(values) if values.dim() == self.field_shape() => Ok(values),
            _ => Err(SpeciesError::UnexpectedShape(MAIN_VARIABLE.to_string(), shape)),
        }
    }

    fn field_shape(&self) -> (usize, usize, usize) {
        let (nlat, nlon) = self.grid.shape();
        (self.naming.window.len(), nlat, nlon)
    }

    fn schema(&self) -> Result<OutputSchema, SpeciesError> {
        Ok(OutputSchema::new(
            &self.title,
            &self.naming.window,
            self.naming.source.day_anchor(),
            self.grid,
        )?)
    }

    fn write(
        &self,
        tracer: &str,
        tag: Option<&str>,
        schema: OutputSchema,
    ) -> Result<PathBuf, SpeciesError> {
        let path = self.naming.output(tracer, tag);

        self.storage.write_dataset(&path, &schema.finish())?;
        info!("Written {}", path.display());

        Ok(path)
    }
}
