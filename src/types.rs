use crate::filters::FilterState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tabled::Tabled;

/// Monetary amount as it arrives from a data source: the API sends numbers,
/// the sheet export sends `R$ 1.234,56` strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Valor {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl From<f64> for Valor {
    fn from(v: f64) -> Self {
        Valor::Number(v)
    }
}

impl From<&str> for Valor {
    fn from(s: &str) -> Self {
        Valor::Text(s.to_string())
    }
}

/// One work order (PEP) as served by the `matriz-dados` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    pub pep: String,
    pub prazo: String,
    pub data_conclusao: String,
    /// `YYYY-MM` of `data_conclusao`, empty when the date does not parse.
    pub mes: String,
    pub status_sap: String,
    pub valor: Valor,
    pub seccional: String,
    pub tipo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_ener: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_conc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_servico: Option<String>,
}

impl Record {
    /// Raw grouping key of this record for `dimension`; empty when absent.
    pub fn field(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::StatusEner => self.status_ener.as_deref().unwrap_or(""),
            Dimension::StatusConc => self.status_conc.as_deref().unwrap_or(""),
            Dimension::Reasons => self.status_servico.as_deref().unwrap_or(""),
            Dimension::Comparison => &self.seccional,
        }
    }
}

/// A row of the "Prazos SAP" sheet exported to CSV. Header spellings vary
/// between sheet revisions and some exports carry more than one, so every
/// spelling gets its own field; the loader takes the first non-blank one.
#[derive(Debug, Deserialize)]
pub struct RawRow {
    #[serde(rename = "PEP")]
    pub pep: Option<String>,
    #[serde(rename = "PRAZO")]
    pub prazo: Option<String>,
    #[serde(rename = "Prazo")]
    pub prazo_alt: Option<String>,
    #[serde(rename = "DATA CONCLUSÃO")]
    pub data_conclusao: Option<String>,
    #[serde(rename = "Data Conclusão")]
    pub data_conclusao_alt: Option<String>,
    #[serde(rename = "STATUS SAP")]
    pub status_sap: Option<String>,
    #[serde(rename = "Status SAP")]
    pub status_sap_alt: Option<String>,
    #[serde(rename = "R$")]
    pub valor_rs: Option<String>,
    #[serde(rename = "RS")]
    pub valor_rs_plain: Option<String>,
    #[serde(rename = "VALOR")]
    pub valor_upper: Option<String>,
    #[serde(rename = "Valor")]
    pub valor: Option<String>,
    #[serde(rename = "SECCIONAL")]
    pub seccional: Option<String>,
    #[serde(rename = "SECCIONAL\nOBRA")]
    pub seccional_obra: Option<String>,
    #[serde(rename = "TIPO")]
    pub tipo: Option<String>,
    #[serde(rename = "Status ENER")]
    pub status_ener: Option<String>,
    #[serde(rename = "STATUS ENER")]
    pub status_ener_upper: Option<String>,
    #[serde(rename = "Status CONC")]
    pub status_conc: Option<String>,
    #[serde(rename = "STATUS CONC")]
    pub status_conc_upper: Option<String>,
    #[serde(rename = "status serviço")]
    pub status_servico: Option<String>,
    #[serde(rename = "STATUS SERVIÇO")]
    pub status_servico_upper: Option<String>,
    #[serde(rename = "Status Serviço")]
    pub status_servico_title: Option<String>,
}

/// The four chart dimensions a filter can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dimension {
    #[serde(rename = "statusENER")]
    StatusEner,
    #[serde(rename = "statusCONC")]
    StatusConc,
    #[serde(rename = "comparison")]
    Comparison,
    #[serde(rename = "reasons")]
    Reasons,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::StatusEner,
        Dimension::StatusConc,
        Dimension::Comparison,
        Dimension::Reasons,
    ];

    /// Dimensions whose record field may be missing from older payloads.
    pub const SECONDARY: [Dimension; 3] = [
        Dimension::StatusEner,
        Dimension::StatusConc,
        Dimension::Reasons,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Dimension::StatusEner => "statusENER",
            Dimension::StatusConc => "statusCONC",
            Dimension::Comparison => "comparison",
            Dimension::Reasons => "reasons",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Dimension::StatusEner => "Status ENER",
            Dimension::StatusConc => "Status CONC",
            Dimension::Comparison => "Comparativo por Seccional",
            Dimension::Reasons => "Motivos",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown dimension: {}", s))
    }
}

/// Sortable detail-table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Pep,
    Prazo,
    DataConclusao,
    Status,
    Rs,
}

impl SortKey {
    pub const ALL: [SortKey; 5] = [
        SortKey::Pep,
        SortKey::Prazo,
        SortKey::DataConclusao,
        SortKey::Status,
        SortKey::Rs,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Pep => "PEP",
            SortKey::Prazo => "Prazo",
            SortKey::DataConclusao => "Data Conclusão",
            SortKey::Status => "Status SAP",
            SortKey::Rs => "Valor (R$)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Column header click: a new column sorts ascending, the ascending
    /// column flips to descending, anything else goes back to ascending.
    pub fn toggle(current: Option<SortSpec>, key: SortKey) -> SortSpec {
        let direction = match current {
            Some(s) if s.key == key && s.direction == SortDirection::Asc => SortDirection::Desc,
            _ => SortDirection::Asc,
        };
        SortSpec { key, direction }
    }
}

fn display_brl(v: &f64) -> String {
    crate::util::format_brl(*v)
}

/// One bar of a chart: monetary sum and record count for a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct SummaryEntry {
    #[tabled(rename = "Nome")]
    pub name: String,
    #[tabled(rename = "Valor (R$)", display_with = "display_brl")]
    pub value: f64,
    #[tabled(rename = "Qtd")]
    pub qtd: u64,
}

/// A detail-table row; the serde names double as the CSV export headers.
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct DetailRow {
    #[serde(rename = "PEP")]
    #[tabled(rename = "PEP")]
    pub pep: String,
    #[serde(rename = "Prazo")]
    #[tabled(rename = "Prazo")]
    pub prazo: String,
    #[serde(rename = "Data Conclusão")]
    #[tabled(rename = "Data Conclusão")]
    pub data_conclusao: String,
    #[serde(rename = "Status SAP")]
    #[tabled(rename = "Status SAP")]
    pub status: String,
    #[serde(rename = "Valor (R$)")]
    #[tabled(rename = "Valor (R$)", display_with = "display_brl")]
    pub rs: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    pub total_value: f64,
    pub total_pep: usize,
}

/// `status -> region -> count`, as returned by the `*-pep` count endpoints.
pub type CountMap = BTreeMap<String, BTreeMap<String, u64>>;

/// Pre-aggregated counts used when the record payload lacks a dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FallbackMaps {
    pub ener: CountMap,
    pub conc: CountMap,
    pub reasons: CountMap,
}

impl FallbackMaps {
    pub fn get(&self, dimension: Dimension) -> Option<&CountMap> {
        match dimension {
            Dimension::StatusEner => Some(&self.ener),
            Dimension::StatusConc => Some(&self.conc),
            Dimension::Reasons => Some(&self.reasons),
            Dimension::Comparison => None,
        }
    }

    pub fn set(&mut self, dimension: Dimension, map: CountMap) {
        match dimension {
            Dimension::StatusEner => self.ener = map,
            Dimension::StatusConc => self.conc = map,
            Dimension::Reasons => self.reasons = map,
            Dimension::Comparison => {}
        }
    }
}

/// Everything the presentation layer draws for one set of inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    #[serde(rename = "statusENER")]
    pub status_ener: Vec<SummaryEntry>,
    #[serde(rename = "statusCONC")]
    pub status_conc: Vec<SummaryEntry>,
    pub comparison: Vec<SummaryEntry>,
    pub reasons: Vec<SummaryEntry>,
    pub rows: Vec<DetailRow>,
    pub kpis: Kpis,
    pub regions: Vec<String>,
}

impl Dashboard {
    pub fn series(&self, dimension: Dimension) -> &[SummaryEntry] {
        match dimension {
            Dimension::StatusEner => &self.status_ener,
            Dimension::StatusConc => &self.status_conc,
            Dimension::Comparison => &self.comparison,
            Dimension::Reasons => &self.reasons,
        }
    }
}

/// JSON export of the charts and KPIs under the filters that produced them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot<'a> {
    pub filters: &'a FilterState,
    pub sort: Option<SortSpec>,
    pub kpis: Kpis,
    #[serde(rename = "statusENER")]
    pub status_ener: &'a [SummaryEntry],
    #[serde(rename = "statusCONC")]
    pub status_conc: &'a [SummaryEntry],
    pub comparison: &'a [SummaryEntry],
    pub reasons: &'a [SummaryEntry],
}

impl<'a> DashboardSnapshot<'a> {
    pub fn new(dashboard: &'a Dashboard, filters: &'a FilterState, sort: Option<SortSpec>) -> Self {
        Self {
            filters,
            sort,
            kpis: dashboard.kpis,
            status_ener: &dashboard.status_ener,
            status_conc: &dashboard.status_conc,
            comparison: &dashboard.comparison,
            reasons: &dashboard.reasons,
        }
    }
}
