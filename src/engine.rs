// Client-side aggregation and filtering behind the dashboard.
//
// Everything here is a pure function of (records, fallback maps, filters,
// sort). Callers recompute on every input change; nothing is cached.
use crate::filters::FilterState;
use crate::types::{
    CountMap, Dashboard, DetailRow, Dimension, FallbackMaps, Kpis, Record, SortDirection, SortKey,
    SortSpec, SummaryEntry,
};
use crate::util::parse_valor;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Which secondary dimensions actually carry data in the current payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub ener: bool,
    pub conc: bool,
    pub reasons: bool,
}

impl Capabilities {
    /// A dimension is supported if any record, before filtering, has a
    /// non-blank value for it.
    pub fn detect(records: &[Record]) -> Self {
        let any = |d: Dimension| records.iter().any(|r| !r.field(d).trim().is_empty());
        Self {
            ener: any(Dimension::StatusEner),
            conc: any(Dimension::StatusConc),
            reasons: any(Dimension::Reasons),
        }
    }

    pub fn has(&self, dimension: Dimension) -> bool {
        match dimension {
            Dimension::StatusEner => self.ener,
            Dimension::StatusConc => self.conc,
            Dimension::Reasons => self.reasons,
            Dimension::Comparison => true,
        }
    }

    pub fn missing(&self) -> Vec<Dimension> {
        Dimension::SECONDARY
            .into_iter()
            .filter(|d| !self.has(*d))
            .collect()
    }
}

fn matches_chart_filters(r: &Record, filters: &FilterState, caps: Capabilities) -> bool {
    Dimension::SECONDARY.into_iter().all(|d| match filters.active(d) {
        Some(label) if caps.has(d) => r.field(d).trim() == label,
        _ => true,
    })
}

/// Rows behind the ENER, CONC and reasons charts and the detail table:
/// region, then chart filters, then PEP search.
pub fn rows_for_others<'a>(
    records: &'a [Record],
    filters: &FilterState,
    caps: Capabilities,
) -> Vec<&'a Record> {
    let region = filters.effective_region();
    let search = filters.pep_search.trim().to_lowercase();
    records
        .iter()
        .filter(|r| region.map_or(true, |reg| r.seccional.trim() == reg))
        .filter(|r| matches_chart_filters(r, filters, caps))
        .filter(|r| search.is_empty() || r.pep.to_lowercase().contains(&search))
        .collect()
}

/// Rows behind the comparison chart: chart filters only, never region or
/// search, so every region stays visible while one is highlighted.
pub fn rows_for_comparison<'a>(
    records: &'a [Record],
    filters: &FilterState,
    caps: Capabilities,
) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|r| matches_chart_filters(r, filters, caps))
        .collect()
}

/// Group rows by the trimmed `dimension` key, summing normalized values.
/// Blank keys are skipped. Output is sorted by descending value; equal
/// values keep first-seen order.
pub fn group_by(rows: &[&Record], dimension: Dimension) -> Vec<SummaryEntry> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut entries: Vec<SummaryEntry> = Vec::new();
    for r in rows {
        let key = r.field(dimension).trim();
        if key.is_empty() {
            continue;
        }
        let i = *index.entry(key).or_insert_with(|| {
            entries.push(SummaryEntry {
                name: key.to_string(),
                value: 0.0,
                qtd: 0,
            });
            entries.len() - 1
        });
        entries[i].value += parse_valor(&r.valor);
        entries[i].qtd += 1;
    }
    sort_by_value_desc(&mut entries);
    entries
}

/// Summary built from a pre-aggregated `status -> region -> count` map.
/// Counts stand in for both value and quantity.
pub fn summarize_fallback(map: &CountMap, region: Option<&str>) -> Vec<SummaryEntry> {
    let mut entries: Vec<SummaryEntry> = map
        .iter()
        .filter(|(status, _)| !status.trim().is_empty())
        .map(|(status, by_region)| {
            let count = match region {
                Some(reg) => by_region.get(reg).copied().unwrap_or(0),
                None => by_region.values().sum(),
            };
            SummaryEntry {
                name: status.trim().to_string(),
                value: count as f64,
                qtd: count,
            }
        })
        .collect();
    sort_by_value_desc(&mut entries);
    entries
}

fn sort_by_value_desc(entries: &mut [SummaryEntry]) {
    entries.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
}

pub fn detail_rows(rows: &[&Record]) -> Vec<DetailRow> {
    rows.iter()
        .map(|r| DetailRow {
            pep: r.pep.clone(),
            prazo: r.prazo.clone(),
            data_conclusao: r.data_conclusao.clone(),
            status: r.status_sap.clone(),
            rs: parse_valor(&r.valor),
        })
        .collect()
}

fn text_key(row: &DetailRow, key: SortKey) -> &str {
    match key {
        SortKey::Pep => &row.pep,
        SortKey::Prazo => &row.prazo,
        SortKey::DataConclusao => &row.data_conclusao,
        SortKey::Status => &row.status,
        SortKey::Rs => "",
    }
}

/// Full stable re-sort of the detail table. Money compares numerically,
/// every other column as case-insensitive text.
pub fn sort_rows(rows: &mut [DetailRow], sort: SortSpec) {
    rows.sort_by(|a, b| {
        let ord = match sort.key {
            SortKey::Rs => a.rs.partial_cmp(&b.rs).unwrap_or(Ordering::Equal),
            key => text_key(a, key)
                .to_lowercase()
                .cmp(&text_key(b, key).to_lowercase()),
        };
        match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}

pub fn kpis(rows: &[DetailRow]) -> Kpis {
    Kpis {
        total_value: rows.iter().map(|r| r.rs).sum(),
        total_pep: rows.len(),
    }
}

/// Regions ordered by total value over the whole, unfiltered record set.
pub fn region_list(records: &[Record]) -> Vec<String> {
    let all: Vec<&Record> = records.iter().collect();
    group_by(&all, Dimension::Comparison)
        .into_iter()
        .map(|e| e.name)
        .collect()
}

/// Run the whole pipeline for one snapshot of inputs.
pub fn compute(
    records: &[Record],
    fallback: &FallbackMaps,
    filters: &FilterState,
    sort: Option<SortSpec>,
) -> Dashboard {
    let caps = Capabilities::detect(records);
    let others = rows_for_others(records, filters, caps);
    let comparison_rows = rows_for_comparison(records, filters, caps);
    let region = filters.effective_region();

    let series = |d: Dimension| match fallback.get(d) {
        Some(map) if !caps.has(d) => summarize_fallback(map, region),
        _ => group_by(&others, d),
    };

    let mut rows = detail_rows(&others);
    let kpis = kpis(&rows);
    if let Some(s) = sort {
        sort_rows(&mut rows, s);
    }

    Dashboard {
        status_ener: series(Dimension::StatusEner),
        status_conc: series(Dimension::StatusConc),
        comparison: group_by(&comparison_rows, Dimension::Comparison),
        reasons: series(Dimension::Reasons),
        rows,
        kpis,
        regions: region_list(records),
    }
}
