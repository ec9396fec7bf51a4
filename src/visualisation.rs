// 📈 Visualisation table - every country series side by side
//
// Rows: (counterpart label, year), columns: one per country.
// Feeds the line chart explorer; cells without data stay empty.

use crate::cleaner::Observation;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One CSV cell; numbers go through the csv serializer like the country tables
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PivotCell {
    Label(String),
    Year(i32),
    Value(Option<f64>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterestPivot {
    countries: BTreeSet<String>,
    cells: BTreeMap<(String, i32), BTreeMap<String, f64>>,
}

impl InterestPivot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observations: &[Observation]) {
        for obs in observations {
            self.countries.insert(obs.country.clone());
            self.cells
                .entry((obs.counterpart_label(), obs.year))
                .or_default()
                .insert(obs.country.clone(), obs.value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec!["counterpart_name".to_string(), "year".to_string()];
        headers.extend(self.countries.iter().cloned());
        headers
    }

    /// Rows in (counterpart, year) order, aligned with `headers`
    pub fn rows(&self) -> Vec<Vec<PivotCell>> {
        self.cells
            .iter()
            .map(|((counterpart, year), values)| {
                let mut row = vec![PivotCell::Label(counterpart.clone()), PivotCell::Year(*year)];
                row.extend(
                    self.countries
                        .iter()
                        .map(|c| PivotCell::Value(values.get(c).copied())),
                );
                row
            })
            .collect()
    }
}
