use crate::source::MatrixQuery;
use crate::types::Dimension;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Active dashboard filters. Every field is optional; an absent value puts
/// no constraint on its dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    /// Labels picked by clicking a chart bar, at most one per dimension.
    pub chart: BTreeMap<Dimension, String>,
    /// Region chosen in the selector; `None` means all regions.
    pub region: Option<String>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub status_sap: Option<String>,
    pub tipo: Option<String>,
    /// Completion month, `YYYY-MM`.
    pub mes: Option<String>,
    pub pep_search: String,
}

impl FilterState {
    /// Apply `label` to `dimension`, or clear it if it is already the active
    /// label. Returns whether the dimension is filtered afterwards.
    pub fn toggle(&mut self, dimension: Dimension, label: impl Into<String>) -> bool {
        let label = label.into();
        if self.chart.get(&dimension) == Some(&label) {
            self.chart.remove(&dimension);
            false
        } else {
            self.chart.insert(dimension, label);
            true
        }
    }

    pub fn active(&self, dimension: Dimension) -> Option<&str> {
        self.chart.get(&dimension).map(String::as_str)
    }

    /// Region constraint for everything except the comparison chart. A
    /// comparison-chart click wins over the region selector.
    pub fn effective_region(&self) -> Option<&str> {
        self.active(Dimension::Comparison)
            .or(self.region.as_deref())
            .filter(|r| !r.trim().is_empty())
    }

    pub fn set_region(&mut self, region: Option<String>) {
        self.region = region
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
    }

    /// The "clear filters" button: region, chart picks, period and search.
    /// SAP status, type and month selectors keep their values.
    pub fn clear(&mut self) {
        self.region = None;
        self.chart.clear();
        self.date_range = None;
        self.pep_search.clear();
    }

    /// Parameters sent upstream when fetching records. Region and comparison
    /// stay client-side so the comparison chart always sees every region.
    pub fn upstream_query(&self) -> MatrixQuery {
        MatrixQuery {
            date_range: self.date_range,
            status_sap: self.status_sap.clone(),
            tipo: self.tipo.clone(),
            mes: self.mes.clone(),
            status_ener: self.active(Dimension::StatusEner).map(str::to_string),
            status_conc: self.active(Dimension::StatusConc).map(str::to_string),
            status_servico: self.active(Dimension::Reasons).map(str::to_string),
        }
    }
}
