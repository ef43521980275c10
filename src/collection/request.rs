use serde_json::Value;
use std::sync::Arc;

use super::{ImageAsset, ImageCollection};
use crate::backend::{BackendError, ImageBackend};
use crate::bbox::Bbox;
use crate::config::{DateWindow, MonthRange};
use crate::geometry::Geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Comparison {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Eq => lhs == rhs,
        }
    }
}

/// A single image-level filter. A request keeps an image only if every one of
/// its predicates holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Bounds(Bbox),
    Date(DateWindow),
    CalendarMonths(MonthRange),
    Property {
        key: String,
        op: Comparison,
        value: f64,
    },
}

impl Predicate {
    pub fn matches(&self, image: &ImageAsset) -> bool {
        match self {
            Predicate::Bounds(bbox) => image.footprint().intersects(bbox),
            Predicate::Date(window) => window.contains(image.time_start()),
            Predicate::CalendarMonths(months) => months.contains(image.time_start()),
            // An image lacking the property, or holding a non-numeric one,
            // cannot satisfy the comparison.
            Predicate::Property { key, op, value } => image
                .property(key)
                .and_then(Value::as_f64)
                .is_some_and(|v| op.holds(v, *value)),
        }
    }
}

/// Deferred description of a filtered, clipped view over one dataset. Nothing
/// is evaluated until [`CollectionRequest::execute`] hands it to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRequest {
    dataset: String,
    predicates: Vec<Predicate>,
    clip: Option<Arc<Geometry>>,
}

impl CollectionRequest {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            predicates: Vec::new(),
            clip: None,
        }
    }

    pub fn filter_bounds(mut self, envelope: Bbox) -> Self {
        self.predicates.push(Predicate::Bounds(envelope));
        self
    }

    pub fn filter_date(mut self, window: DateWindow) -> Self {
        self.predicates.push(Predicate::Date(window));
        self
    }

    pub fn filter_calendar_range(mut self, months: MonthRange) -> Self {
        self.predicates.push(Predicate::CalendarMonths(months));
        self
    }

    pub fn filter_property(mut self, key: impl Into<String>, op: Comparison, value: f64) -> Self {
        self.predicates.push(Predicate::Property {
            key: key.into(),
            op,
            value,
        });
        self
    }

    pub fn clip(mut self, geometry: Arc<Geometry>) -> Self {
        self.clip = Some(geometry);
        self
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn matches(&self, image: &ImageAsset) -> bool {
        image.dataset() == self.dataset && self.predicates.iter().all(|p| p.matches(image))
    }

    /// Apply the clip geometry, if any, to an asset that passed the filters.
    pub fn finish(&self, image: &ImageAsset) -> ImageAsset {
        match &self.clip {
            Some(geometry) => image.clipped(Arc::clone(geometry)),
            None => image.clone(),
        }
    }

    pub fn execute(&self, backend: &dyn ImageBackend) -> Result<ImageCollection, BackendError> {
        backend.query(self).map(ImageCollection::new)
    }
}
