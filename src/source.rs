// Data access behind the dashboard.
//
// `DataSource` answers the same questions the reporting API does: the record
// list for a set of query parameters, the distinct values that fill the
// selectors, and per-dimension count maps for payloads that lack the
// secondary status columns.
use crate::error::{ReportError, Result};
use crate::loader::load_matrix;
use crate::types::{CountMap, Dimension, Record};
use crate::util::{clean_label, format_date_br, month_key, parse_br_date};
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// ENER/CONC statuses the count endpoints leave out.
static IGNORED_FALLBACK_STATUSES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["em andamento", "fechada"].into_iter().collect());

/// Upstream query parameters. String filters accept comma-separated values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixQuery {
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub status_sap: Option<String>,
    pub tipo: Option<String>,
    pub mes: Option<String>,
    pub status_ener: Option<String>,
    pub status_conc: Option<String>,
    pub status_servico: Option<String>,
}

fn one_of(filter: &Option<String>, value: &str) -> bool {
    let Some(filter) = filter else { return true };
    let mut options = filter.split(',').map(str::trim).filter(|s| !s.is_empty()).peekable();
    if options.peek().is_none() {
        return true;
    }
    let value = value.trim();
    options.any(|o| o == value)
}

impl MatrixQuery {
    /// The same query without the chart-driven status filters; count maps
    /// are requested with this one.
    pub fn without_chart_filters(&self) -> MatrixQuery {
        MatrixQuery {
            status_ener: None,
            status_conc: None,
            status_servico: None,
            ..self.clone()
        }
    }

    /// Query-string form, using the API's parameter names.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some((start, end)) = self.date_range {
            params.push(("data_inicio", format_date_br(start)));
            params.push(("data_fim", format_date_br(end)));
        }
        let optional = [
            ("status_sap", &self.status_sap),
            ("tipo", &self.tipo),
            ("mes", &self.mes),
            ("status_ener", &self.status_ener),
            ("status_conc", &self.status_conc),
            ("status_servico", &self.status_servico),
        ];
        for (name, value) in optional {
            if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                params.push((name, v.to_string()));
            }
        }
        params
    }

    /// Whether `r` passes every constraint. Month and period filters drop
    /// records whose completion date does not parse.
    pub fn matches(&self, r: &Record) -> bool {
        if !one_of(&self.status_sap, &r.status_sap)
            || !one_of(&self.tipo, &r.tipo)
            || !one_of(&self.status_ener, r.field(Dimension::StatusEner))
            || !one_of(&self.status_conc, r.field(Dimension::StatusConc))
            || !one_of(&self.status_servico, r.field(Dimension::Reasons))
        {
            return false;
        }
        if let Some(mes) = self.mes.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            if month_key(&r.data_conclusao) != mes {
                return false;
            }
        }
        if let Some((start, end)) = self.date_range {
            match parse_br_date(&r.data_conclusao) {
                Some(d) if start <= d && d <= end => {}
                _ => return false,
            }
        }
        true
    }
}

pub fn filter_records(records: Vec<Record>, query: &MatrixQuery) -> Vec<Record> {
    records.into_iter().filter(|r| query.matches(r)).collect()
}

/// Sorted distinct values with blanks and sheet placeholders removed.
pub fn distinct_values<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|v| clean_label(Some(v)))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn completion_months(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| month_key(&r.data_conclusao))
        .filter(|m| !m.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// `status -> region -> count` for one secondary dimension. Rows without a
/// status or region are skipped, as are the "em andamento" and "fechada"
/// ENER/CONC statuses. The comparison dimension has no count map.
pub fn fallback_counts(records: &[Record], dimension: Dimension, query: &MatrixQuery) -> CountMap {
    let mut counts = CountMap::new();
    if dimension == Dimension::Comparison {
        return counts;
    }
    for r in records.iter().filter(|r| query.matches(r)) {
        let status = r.field(dimension).trim();
        let region = r.seccional.trim();
        if status.is_empty() || region.is_empty() {
            continue;
        }
        if dimension != Dimension::Reasons
            && IGNORED_FALLBACK_STATUSES.contains(status.to_lowercase().as_str())
        {
            continue;
        }
        *counts
            .entry(status.to_string())
            .or_default()
            .entry(region.to_string())
            .or_insert(0) += 1;
    }
    counts
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Records matching `query`. Region is never part of the query.
    async fn fetch_records(&self, query: &MatrixQuery) -> Result<Vec<Record>>;

    async fn status_sap_values(&self) -> Result<Vec<String>>;

    async fn tipo_values(&self) -> Result<Vec<String>>;

    /// Completion months present in the data, `YYYY-MM`, ascending.
    async fn completion_months(&self) -> Result<Vec<String>>;

    async fn regions(&self) -> Result<Vec<String>>;

    async fn fallback_counts(&self, dimension: Dimension, query: &MatrixQuery) -> Result<CountMap>;
}

/// Serves a matrix file (sheet CSV export or API JSON dump). The file is
/// re-read on every call, so edits show up on the next refresh.
///
/// Status counts for the fallback charts come from `counts` when set: a
/// separate sheet export that carries the status columns the matrix lacks.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    counts: Option<PathBuf>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            counts: None,
        }
    }

    pub fn with_counts(mut self, path: impl Into<PathBuf>) -> Self {
        self.counts = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn counts_path(&self) -> Option<&Path> {
        self.counts.as_deref()
    }

    async fn load(&self) -> Result<Vec<Record>> {
        read_file(&self.path).await
    }
}

async fn read_file(path: &Path) -> Result<Vec<Record>> {
    let owned = path.to_path_buf();
    let (records, report) = tokio::task::spawn_blocking(move || load_matrix(&owned))
        .await
        .map_err(|e| ReportError::Task(e.to_string()))??;
    debug!(
        path = %path.display(),
        rows = report.loaded_rows,
        parse_errors = report.parse_errors,
        "matrix file read"
    );
    Ok(records)
}

#[async_trait]
impl DataSource for FileSource {
    async fn fetch_records(&self, query: &MatrixQuery) -> Result<Vec<Record>> {
        let records = filter_records(self.load().await?, query);
        debug!(params = ?query.to_params(), rows = records.len(), "records fetched");
        Ok(records)
    }

    async fn status_sap_values(&self) -> Result<Vec<String>> {
        let records = self.load().await?;
        Ok(distinct_values(records.iter().map(|r| r.status_sap.as_str())))
    }

    async fn tipo_values(&self) -> Result<Vec<String>> {
        let records = self.load().await?;
        Ok(distinct_values(records.iter().map(|r| r.tipo.as_str())))
    }

    async fn completion_months(&self) -> Result<Vec<String>> {
        Ok(completion_months(&self.load().await?))
    }

    async fn regions(&self) -> Result<Vec<String>> {
        let records = self.load().await?;
        Ok(distinct_values(records.iter().map(|r| r.seccional.as_str())))
    }

    async fn fallback_counts(&self, dimension: Dimension, query: &MatrixQuery) -> Result<CountMap> {
        let path = self.counts.as_deref().unwrap_or(&self.path);
        Ok(fallback_counts(&read_file(path).await?, dimension, query))
    }
}
