//! Tabulating the properties of many segments.

use std::fmt::{self, Display};

use itertools::Itertools;
use log::debug;

use crate::Label;
use crate::error::Result;
use crate::segmentation::properties::{Property, PropertyValue, SegmentProperties};

/// The scalar properties, used as columns unless chosen otherwise.
pub const DEFAULT_COLUMNS: [Property; 33] = [
    Property::Id,
    Property::XCentroid,
    Property::YCentroid,
    Property::SegmentSum,
    Property::SegmentSumErr,
    Property::BackgroundSum,
    Property::BackgroundMean,
    Property::BackgroundAtcentroid,
    Property::XMin,
    Property::XMax,
    Property::YMin,
    Property::YMax,
    Property::MinValue,
    Property::MaxValue,
    Property::MinvalXPos,
    Property::MinvalYPos,
    Property::MaxvalXPos,
    Property::MaxvalYPos,
    Property::Area,
    Property::EquivalentRadius,
    Property::Perimeter,
    Property::SemimajorAxisSigma,
    Property::SemiminorAxisSigma,
    Property::Eccentricity,
    Property::Orientation,
    Property::SeEllipticity,
    Property::SeElongation,
    Property::SeX2,
    Property::SeXy,
    Property::SeY2,
    Property::SeCxx,
    Property::SeCxy,
    Property::SeCyy,
];

/// One row per segment, one column per property.
///
/// Printing the table with a precision, e.g. `{:.3}`, rounds all floats.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertiesTable {
    columns: Vec<Property>,
    rows: Vec<Vec<PropertyValue>>,
}

impl PropertiesTable {
    /// Collect the properties of `props`, in order.
    ///
    /// Without `columns`, the table holds the [`DEFAULT_COLUMNS`] minus
    /// `exclude_columns`. Explicit `columns` take precedence and may also
    /// name non-scalar properties such as `data_cutout`.
    ///
    /// # Errors
    /// Fails if a name in `columns` or `exclude_columns` is not a property.
    pub fn new<L: Label>(
        props: &[SegmentProperties<L>],
        columns: Option<&[&str]>,
        exclude_columns: Option<&[&str]>,
    ) -> Result<Self> {
        let excluded: Vec<Property> = exclude_columns
            .unwrap_or_default()
            .iter()
            .map(|name| name.parse())
            .try_collect()?;
        let columns: Vec<Property> = match columns {
            Some(columns) => columns.iter().map(|name| name.parse()).try_collect()?,
            None => DEFAULT_COLUMNS
                .into_iter()
                .filter(|column| !excluded.contains(column))
                .collect(),
        };
        debug!("Tabulating {} columns of {} segments.", columns.len(), props.len());

        let rows = props
            .iter()
            .map(|p| columns.iter().map(|column| p.get(*column)).collect())
            .collect();
        Ok(Self { columns, rows })
    }

    /// Names of the columns, in order.
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    /// All values of the named column, or `None` if there is no such column.
    pub fn column(&self, name: &str) -> Option<Vec<&PropertyValue>> {
        let idx = self.columns.iter().position(|c| c.name() == name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// The values of one segment, in column order.
    pub fn row(&self, idx: usize) -> Option<&[PropertyValue]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    /// Number of segments.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }
}

impl Display for PropertiesTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|value| match f.precision() {
                        Some(p) => format!("{value:.p$}"),
                        None => value.to_string(),
                    })
                    .collect_vec()
            })
            .collect_vec();
        let widths = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                cells
                    .iter()
                    .map(|row| row[i].len())
                    .chain([column.name().len()])
                    .max()
                    .unwrap_or_default()
            })
            .collect_vec();

        let line = |f: &mut fmt::Formatter<'_>, items: Vec<String>| {
            writeln!(
                f,
                "{}",
                items
                    .iter()
                    .zip(&widths)
                    .map(|(item, width)| format!("{item:>width$}"))
                    .join(" ")
            )
        };
        line(f, self.column_names().into_iter().map(String::from).collect())?;
        line(f, widths.iter().map(|w| "-".repeat(*w)).collect())?;
        for row in cells {
            line(f, row)?;
        }
        Ok(())
    }
}
