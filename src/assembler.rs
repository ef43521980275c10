use std::collections::BTreeMap;

use crate::catalog::Region;
use crate::collection::ImageAsset;
use crate::reducer::{BandValues, ReductionError, ReductionResult};

pub const REGION_COLUMN: &str = "lake_id";
pub const DATE_COLUMN: &str = "date";
pub const APPROXIMATE_COLUMN: &str = "approximate";

/// One output row: a region, a day and its measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub region_id: String,
    /// Acquisition day, `YYYY-MM-DD`.
    pub date: String,
    pub fields: BTreeMap<String, Option<f64>>,
    pub approximate: bool,
}

/// Column value rendered as text; `None` for a missing value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell<'a> {
    Text(&'a str),
    Number(f64),
    Flag(bool),
}

impl Record {
    /// Value of `column`, `None` when the measurement is missing or unknown.
    pub fn cell(&self, column: &str) -> Option<Cell<'_>> {
        match column {
            REGION_COLUMN => Some(Cell::Text(&self.region_id)),
            DATE_COLUMN => Some(Cell::Text(&self.date)),
            APPROXIMATE_COLUMN => Some(Cell::Flag(self.approximate)),
            other => self.fields.get(other).copied().flatten().map(Cell::Number),
        }
    }
}

pub type RecordSet = Vec<Record>;

/// List-mode expansion: one record per pixel, the i-th record carrying the
/// i-th element of every band list.
pub fn expand_list(
    region: &Region,
    image: &ImageAsset,
    result: &ReductionResult,
) -> Result<Vec<Record>, ReductionError> {
    let Some(count) = result.pixel_count()? else {
        return Ok(Vec::new());
    };
    let date = image.date_string();

    let records = (0..count)
        .map(|i| Record {
            region_id: region.id().to_string(),
            date: date.clone(),
            fields: result
                .values
                .iter()
                .map(|(band, values)| {
                    let value = match values {
                        BandValues::List(list) => list[i],
                        BandValues::Scalar(v) => *v,
                    };
                    (band.clone(), value)
                })
                .collect(),
            approximate: result.approximate,
        })
        .collect();

    Ok(records)
}

/// Mean-mode expansion: a single record with one field per band.
pub fn expand_mean(region: &Region, image: &ImageAsset, result: &ReductionResult) -> Record {
    Record {
        region_id: region.id().to_string(),
        date: image.date_string(),
        fields: result
            .values
            .iter()
            .map(|(band, values)| {
                let value = match values {
                    BandValues::Scalar(v) => *v,
                    BandValues::List(list) => crate::reducer::mean(list),
                };
                (band.clone(), value)
            })
            .collect(),
        approximate: result.approximate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::Bbox;
    use crate::geometry::Geometry;
    use chrono::{TimeZone, Utc};

    fn region() -> Region {
        Region::new("ObjectID_42", Geometry::rectangle(0.0, 0.0, 1.0, 1.0).unwrap())
    }

    fn image() -> ImageAsset {
        ImageAsset::new(
            "img",
            "NASA/HLS/HLSL30/v002",
            Utc.with_ymd_and_hms(2024, 6, 2, 18, 45, 0).unwrap(),
            Bbox::new(0.0, 1.0, 0.0, 1.0).unwrap(),
        )
    }

    fn result(values: Vec<(&str, BandValues)>) -> ReductionResult {
        ReductionResult {
            region_id: "ObjectID_42".to_string(),
            values: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            approximate: false,
        }
    }

    #[test]
    fn test_expand_list_one_record_per_pixel() {
        let result = result(vec![
            ("NDSI", BandValues::List(vec![Some(0.1), None, Some(0.3)])),
            ("NIR_L", BandValues::List(vec![Some(1.0), Some(2.0), Some(3.0)])),
        ]);

        let records = expand_list(&region(), &image(), &result).unwrap();

        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.region_id, "ObjectID_42");
            assert_eq!(record.date, "2024-06-02");
            assert_eq!(record.fields["NIR_L"], Some(i as f64 + 1.0));
        }
        assert_eq!(records[1].fields["NDSI"], None);
        assert_eq!(records[2].fields["NDSI"], Some(0.3));
    }

    #[test]
    fn test_expand_list_of_empty_region() {
        let result = result(vec![("NDSI", BandValues::List(Vec::new()))]);
        assert!(expand_list(&region(), &image(), &result).unwrap().is_empty());
    }

    #[test]
    fn test_expand_list_rejects_misaligned_lists() {
        let result = result(vec![
            ("NDSI", BandValues::List(vec![Some(0.1), Some(0.2)])),
            ("NIR_S", BandValues::List(vec![Some(0.1)])),
        ]);
        assert!(expand_list(&region(), &image(), &result).is_err());
    }

    #[test]
    fn test_expand_mean_single_record() {
        let result = result(vec![
            ("tmax", BandValues::Scalar(Some(21.5))),
            ("tmin", BandValues::Scalar(None)),
        ]);

        let record = expand_mean(&region(), &image(), &result);
        assert_eq!(record.fields["tmax"], Some(21.5));
        assert_eq!(record.fields["tmin"], None);
    }

    #[test]
    fn test_cells() {
        let record = Record {
            region_id: "7".to_string(),
            date: "2024-06-02".to_string(),
            fields: BTreeMap::from([("tmax".to_string(), Some(3.5)), ("tmin".to_string(), None)]),
            approximate: true,
        };

        assert_eq!(record.cell("lake_id"), Some(Cell::Text("7")));
        assert_eq!(record.cell("date"), Some(Cell::Text("2024-06-02")));
        assert_eq!(record.cell("tmax"), Some(Cell::Number(3.5)));
        assert_eq!(record.cell("tmin"), None);
        assert_eq!(record.cell("approximate"), Some(Cell::Flag(true)));
        assert_eq!(record.cell("NDSI"), None);
    }
}
