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

//! Gridded emission fields and their monthly time axis.

use crate::constants::{EPOCH_YEAR, NOLEAP_CUMULATIVE_DAYS};
use crate::errors::{ConfigError, SpeciesError};
use crate::Float;
use ndarray::{concatenate, Array1, Array3, Axis};
use std::fmt;
use std::ops::Range;

/// Calendar month.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        YearMonth { year, month }
    }

    /// Index of the month on the inventory time axis,
    /// January of the epoch year being 0.
    pub fn epoch_index(&self) -> i64 {
        i64::from(self.year - EPOCH_YEAR) * 12 + i64::from(self.month) - 1
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            YearMonth::new(self.year + 1, 1)
        } else {
            YearMonth::new(self.year, self.month + 1)
        }
    }

    /// Days since the epoch in the no-leap calendar
    /// of the given day in this month.
    pub fn noleap_days(&self, day: u32) -> Float {
        let days = i64::from(self.year - EPOCH_YEAR) * 365
            + NOLEAP_CUMULATIVE_DAYS[(self.month - 1) as usize]
            + i64::from(day)
            - 1;

        days as Float
    }

    /// Integer `YYYYMMDD` stamp of the given day in this month.
    pub fn date_stamp(&self, day: u32) -> i32 {
        self.year * 10_000 + (self.month as i32) * 100 + day as i32
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

/// Inclusive range of months to process.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ProcessingWindow {
    pub start: YearMonth,
    pub end: YearMonth,
}

impl ProcessingWindow {
    /// Checked constructor, the end must be strictly after the start.
    pub fn new(start: YearMonth, end: YearMonth) -> Result<Self, ConfigError> {
        if !(1..=12).contains(&start.month) || !(1..=12).contains(&end.month) {
            return Err(ConfigError::OutOfBounds("Month must be within 1 and 12"));
        }

        if end <= start {
            return Err(ConfigError::OutOfBounds(
                "End of the processing window must be after its start",
            ));
        }

        Ok(ProcessingWindow { start, end })
    }

    /// Checks the window against the years published by the inventory.
    pub fn check_years(&self, first_year: i32, last_year: i32) -> Result<(), ConfigError> {
        if self.start.year < first_year {
            return Err(ConfigError::OutOfBounds(
                "Start year is before the first year of the data source",
            ));
        }

        if self.end.year > last_year {
            return Err(ConfigError::OutOfBounds(
                "End year is after the last year of the data source",
            ));
        }

        Ok(())
    }

    pub fn months(&self) -> Vec<YearMonth> {
        let mut months = vec![self.start];
        let mut current = self.start;

        while current < self.end {
            current = current.next();
            months.push(current);
        }

        months
    }

    pub fn len(&self) -> usize {
        (self.end.epoch_index() - self.start.epoch_index() + 1) as usize
    }

    /// Calendar years touched by the window.
    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start.year..=self.end.year
    }

    /// Half-open range of inventory time indices covered by the window.
    ///
    /// Returns `None` when the window starts before the epoch.
    pub fn epoch_indices(&self) -> Option<Range<usize>> {
        let start = usize::try_from(self.start.epoch_index()).ok()?;
        let end = usize::try_from(self.end.epoch_index()).ok()?;

        Some(start..end + 1)
    }

    /// Numeric time values (no-leap days since epoch)
    /// and `YYYYMMDD` stamps of every month in the window.
    pub fn time_axis(&self, day: u32) -> (Vec<Float>, Vec<i32>) {
        self.months()
            .iter()
            .map(|m| (m.noleap_days(day), m.date_stamp(day)))
            .unzip()
    }
}

/// Flux or concentration field indexed by (time, lat, lon).
#[derive(Clone, PartialEq, Debug)]
pub struct GriddedField {
    pub species: String,
    pub units: String,
    pub times: Vec<YearMonth>,
    pub lats: Array1<Float>,
    pub lons: Array1<Float>,
    pub values: Array3<Float>,
}

impl GriddedField {
    /// Shape (lat, lon) of the field.
    pub fn spatial_shape(&self) -> (usize, usize) {
        let shape = self.values.shape();
        (shape[1], shape[2])
    }

    /// Joins consecutive fields along time.
    pub fn concat_time(fields: Vec<GriddedField>) -> Result<GriddedField, SpeciesError> {
        let mut fields = fields.into_iter();

        let mut joined = match fields.next() {
            Some(first) => first,
            None => return Err(SpeciesError::TimeAxisMismatch { expected: 1, found: 0 }),
        };

        for field in fields {
            if field.spatial_shape() != joined.spatial_shape() {
                return Err(SpeciesError::GridMismatch {
                    expected: joined.spatial_shape(),
                    found: field.spatial_shape(),
                });
            }

            joined.values = concatenate(Axis(0), &[joined.values.view(), field.values.view()])
                .map_err(|e| {
                    SpeciesError::Storage(crate::errors::StorageError::Shape(
                        joined.species.clone(),
                        e,
                    ))
                })?;
            joined.times.extend(field.times);
        }

        Ok(joined)
    }

    /// Keeps only the timesteps inside the window.
    ///
    /// Fails if any month of the window is missing.
    pub fn select_window(self, window: &ProcessingWindow) -> Result<GriddedField, SpeciesError> {
        let indices: Vec<usize> = self
            .times
            .iter()
            .enumerate()
            .filter(|(_, t)| **t >= window.start && **t <= window.end)
            .map(|(i, _)| i)
            .collect();

        if indices.len() != window.len() {
            return Err(SpeciesError::TimeAxisMismatch {
                expected: window.len(),
                found: indices.len(),
            });
        }

        let values = self.values.select(Axis(0), &indices);
        let times = indices.iter().map(|&i| self.times[i]).collect();

        Ok(GriddedField {
            values,
            times,
            ..self
        })
    }
}
