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

//! Module containg methods for conducting
//! binary search (bisection) within increasing
//! cell bounds to find cells overlapping an interval.

use crate::errors::SearchError;
use crate::Float;
use std::ops::Range;

/// Core bisection function, returns the lowest index
/// of a bound not smaller than `x`.
///
/// Bounds must be sorted ascendingly and `x` must lie between
/// the first and last bound.
fn binary_search(bounds: &[Float], x: Float) -> Result<usize, SearchError> {
    let (first, last) = match (bounds.first(), bounds.last()) {
        (Some(first), Some(last)) if bounds.len() > 1 => (*first, *last),
        _ => return Err(SearchError::EmptyArray),
    };

    if x < first || x > last {
        return Err(SearchError::OutOfBounds);
    }

    let mut lo = 0;
    let mut hi = bounds.len() - 1;

    while lo < hi {
        let mid = (lo + hi) / 2;

        if bounds[mid] >= x {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }

    Ok(lo)
}

/// Index of the closest bound to the left of `x` (or equal to it).
pub fn find_left_closest(bounds: &[Float], x: Float) -> Result<usize, SearchError> {
    let found_index = binary_search(bounds, x)?;

    if bounds[found_index] <= x {
        Ok(found_index)
    } else {
        Ok(found_index - 1)
    }
}

/// Index of the closest bound to the right of `x` (or equal to it).
pub fn find_right_closest(bounds: &[Float], x: Float) -> Result<usize, SearchError> {
    binary_search(bounds, x)
}

/// Indices of cells (between consecutive bounds) that
/// may overlap the interval `[lo, hi]`.
///
/// The range is empty when the interval lies entirely outside the bounds.
pub fn overlapping_cells(bounds: &[Float], lo: Float, hi: Float) -> Result<Range<usize>, SearchError> {
    let (first, last) = match (bounds.first(), bounds.last()) {
        (Some(first), Some(last)) if bounds.len() > 1 => (*first, *last),
        _ => return Err(SearchError::EmptyArray),
    };

    if hi <= first || lo >= last || hi <= lo {
        return Ok(0..0);
    }

    let start = find_left_closest(bounds, lo.max(first))?;
    let end = find_right_closest(bounds, hi.min(last))?;

    Ok(start..end)
}
